//! Single-request HTTP(S) GET probe with a HAR-style timing breakdown.
//!
//! A building block for scanning and probing tools: one [`HttpProbe`] per
//! target host performs one GET transfer per call and returns the status,
//! reason phrase, headers, decoded body and a [`TimingRecord`] with the
//! HAR phases `dns`, `connect`, `ssl`, `send`, `wait`, `receive` in
//! milliseconds (`ssl` is `-1` for plain-HTTP transfers).
//!
//! ```no_run
//! use har_probe::HttpProbe;
//!
//! # async fn run() -> Result<(), har_probe::TransferError> {
//! let probe = HttpProbe::new("example.org");
//! let response = probe.get("/").await?;
//! println!(
//!     "{} {} — waited {} ms",
//!     response.status,
//!     response.reason.as_deref().unwrap_or(""),
//!     response.timings.wait
//! );
//! # Ok(())
//! # }
//! ```
//!
//! The probe follows redirects, enforces peer and hostname verification
//! for TLS, and bounds the whole transfer with one wall-clock timeout.
//! It deliberately does not reuse connections, retry, speak methods other
//! than GET, interpret chunked transfer coding, or unfold obsolete
//! multi-line headers. Bodies without a declared charset decode as
//! ISO-8859-1, the HTTP default, even when the payload is binary.

pub mod error;
pub mod infra;
pub mod probe;
pub mod shared;

pub use error::TransferError;
pub use probe::{CharsetPolicy, HeaderMap, HttpProbe, ProbeRequest, ProbeResponse};
pub use shared::timing::{TimingRecord, SSL_NOT_APPLICABLE};
