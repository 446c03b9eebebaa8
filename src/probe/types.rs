use crate::probe::headers::HeaderMap;
use crate::shared::timing::TimingRecord;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

/// Parameters for one probe transfer.
#[derive(Debug, Clone)]
pub struct ProbeRequest {
    /// Request path; must begin with `/`.
    pub path: String,
    /// Extra request headers. These replace same-named defaults,
    /// compared case-insensitively, and go on the wire as given.
    pub headers: HashMap<String, String>,
    /// Probe over https instead of http.
    pub use_tls: bool,
    /// Per-call override of the probe's configured timeout.
    pub timeout: Option<Duration>,
}

impl Default for ProbeRequest {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            headers: HashMap::new(),
            use_tls: false,
            timeout: None,
        }
    }
}

impl ProbeRequest {
    /// A default request for `path`.
    pub fn path(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Switches the request to https.
    pub fn tls(mut self) -> Self {
        self.use_tls = true;
        self
    }

    /// Adds a request header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Overrides the probe's timeout for this call.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Everything one completed transfer produced.
///
/// An immutable value returned per call; two sequential requests on the
/// same probe share nothing.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeResponse {
    /// Final HTTP status code, after any redirects.
    pub status: u16,
    /// Reason phrase captured from the first status line, when one matched.
    pub reason: Option<String>,
    /// Response headers accumulated across all hops, last write wins.
    pub headers: HeaderMap,
    /// Body decoded per the probe's charset policy.
    pub body: String,
    /// HAR phase breakdown for the transfer.
    pub timings: TimingRecord,
}
