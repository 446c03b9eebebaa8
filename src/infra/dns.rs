//! Hostname resolution.
//!
//! A process-wide hickory resolver, lazily initialized on first use.
//! IP literals short-circuit without touching the network, so probing
//! raw addresses costs nothing in the `dns` timing phase.

use crate::error::TransferError;
use hickory_resolver::{config::*, TokioAsyncResolver};
use std::{net::IpAddr, sync::Arc};
use tokio::sync::OnceCell;

static RESOLVER: OnceCell<Arc<TokioAsyncResolver>> = OnceCell::const_new();

async fn resolver() -> Arc<TokioAsyncResolver> {
    RESOLVER
        .get_or_init(|| async {
            Arc::new(TokioAsyncResolver::tokio(
                ResolverConfig::default(),
                ResolverOpts::default(),
            ))
        })
        .await
        .clone()
}

/// Resolves `host` to its addresses.
pub async fn resolve(host: &str) -> Result<Vec<IpAddr>, TransferError> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(vec![ip]);
    }

    let resolver = resolver().await;
    match resolver.lookup_ip(host).await {
        Ok(answer) => {
            let ips: Vec<IpAddr> = answer.iter().collect();
            if ips.is_empty() {
                Err(TransferError::Dns {
                    host: host.to_string(),
                    message: "lookup returned no addresses".to_string(),
                })
            } else {
                Ok(ips)
            }
        }
        Err(e) => Err(TransferError::Dns {
            host: host.to_string(),
            message: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ipv4_literal_short_circuits() {
        let ips = resolve("127.0.0.1").await.unwrap();
        assert_eq!(ips.len(), 1);
        assert_eq!(ips[0].to_string(), "127.0.0.1");
    }

    #[tokio::test]
    async fn ipv6_literal_short_circuits() {
        let ips = resolve("::1").await.unwrap();
        assert_eq!(ips.len(), 1);
        assert_eq!(ips[0].to_string(), "::1");
    }
}
