//! The probe handle: target configuration plus the single request operation.

use crate::error::TransferError;
use crate::probe::charset::CharsetPolicy;
use crate::probe::executor;
use crate::probe::types::{ProbeRequest, ProbeResponse};
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// A single-target HTTP(S) GET probe.
///
/// Holds the target host, optional port and default timeout. Each call to
/// [`HttpProbe::request`] performs one complete transfer — resolve,
/// connect, handshake, send, receive — and returns an immutable
/// [`ProbeResponse`]; the probe itself never changes, so it can be shared
/// across tasks. Callers scanning many hosts construct one probe per
/// target.
///
/// When no port is configured, the scheme default (443 for TLS, 80
/// otherwise) is derived fresh on every call.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    host: String,
    port: Option<u16>,
    timeout: Duration,
    charset_policy: CharsetPolicy,
}

impl Default for HttpProbe {
    fn default() -> Self {
        Self::new("127.0.0.1")
    }
}

impl HttpProbe {
    /// A probe for `host` with no explicit port and a 10 second timeout.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            timeout: DEFAULT_TIMEOUT,
            charset_policy: CharsetPolicy::default(),
        }
    }

    /// Pins the target port instead of the scheme default.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the default transfer timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the body decoding policy.
    pub fn with_charset_policy(mut self, policy: CharsetPolicy) -> Self {
        self.charset_policy = policy;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Performs one GET transfer and returns the response.
    pub async fn request(&self, request: &ProbeRequest) -> Result<ProbeResponse, TransferError> {
        executor::execute(self, request).await
    }

    /// GET `path` with default options.
    pub async fn get(&self, path: &str) -> Result<ProbeResponse, TransferError> {
        self.request(&ProbeRequest::path(path)).await
    }

    pub(crate) fn effective_port(&self, use_tls: bool) -> u16 {
        self.port.unwrap_or(if use_tls { 443 } else { 80 })
    }

    pub(crate) fn effective_timeout(&self, request: &ProbeRequest) -> Duration {
        request.timeout.unwrap_or(self.timeout)
    }

    pub(crate) fn charset_policy(&self) -> CharsetPolicy {
        self.charset_policy
    }
}
