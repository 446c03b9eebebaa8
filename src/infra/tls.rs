//! TLS client setup.
//!
//! rustls with the Mozilla root set via webpki-roots. Peer certificate and
//! hostname verification are the rustls defaults and stay on; a probe
//! against a host that fails either check fails the transfer. There is no
//! insecure escape hatch.

use crate::error::TransferError;
use rustls::pki_types::ServerName;
use std::{io, sync::Arc};
use tokio::net::TcpStream;
use tokio_rustls::{client::TlsStream, TlsConnector};

/// TLS client configuration shared by every handshake.
///
/// Supports TLS 1.2 and 1.3, no client authentication.
pub fn client_config() -> Arc<rustls::ClientConfig> {
    let roots = rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    Arc::new(
        rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth(),
    )
}

/// Runs the TLS handshake over an established TCP stream.
///
/// `host` doubles as the SNI name and the name the peer certificate must
/// match; IP literals are carried as `ServerName::IpAddress`.
pub async fn connect(tcp: TcpStream, host: &str) -> Result<TlsStream<TcpStream>, TransferError> {
    let connector = TlsConnector::from(client_config());

    let server_name = ServerName::try_from(host.to_string()).map_err(|e| TransferError::Tls {
        host: host.to_string(),
        source: io::Error::new(io::ErrorKind::InvalidInput, e.to_string()),
    })?;

    connector
        .connect(server_name, tcp)
        .await
        .map_err(|source| TransferError::Tls {
            host: host.to_string(),
            source,
        })
}

// TLS handshake behavior is exercised by the transfer tests in
// probe::executor, which drive a handshake against a non-TLS peer.
