//! Utilities shared across the probe: transfer timing capture.

pub mod timing;

pub use timing::{TimingRecord, TransferMarks, SSL_NOT_APPLICABLE};
