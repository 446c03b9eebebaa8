use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Failure of a single probe transfer.
///
/// One of these is returned per failed `request` call; nothing is retried
/// and no partial response survives an error.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("dns lookup for {host} failed: {message}")]
    Dns { host: String, message: String },

    #[error("connect to {addr} failed")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("tls handshake with {host} failed")]
    Tls {
        host: String,
        #[source]
        source: io::Error,
    },

    #[error("transfer exceeded the {limit:?} time limit")]
    Timeout { limit: Duration },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("malformed response: {0}")]
    Protocol(String),

    #[error("redirect chain exceeded {0} hops")]
    TooManyRedirects(usize),

    #[error("i/o during transfer")]
    Io(#[from] io::Error),

    #[error("response body is not valid {charset}")]
    Decode { charset: String },
}

impl TransferError {
    /// True when the failure was the wall-clock timeout bound.
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransferError::Timeout { .. })
    }

    /// True when the peer could not be reached at all.
    pub fn is_connect(&self) -> bool {
        matches!(
            self,
            TransferError::Dns { .. } | TransferError::Connect { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_classification() {
        let err = TransferError::Timeout {
            limit: Duration::from_secs(10),
        };
        assert!(err.is_timeout());
        assert!(!err.is_connect());
    }

    #[test]
    fn connect_classification() {
        let err = TransferError::Dns {
            host: "nowhere.invalid".to_string(),
            message: "no records".to_string(),
        };
        assert!(err.is_connect());
        assert!(!err.is_timeout());
    }
}
