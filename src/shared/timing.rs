//! Transfer timing capture and the HAR-style breakdown.
//!
//! The executor stamps raw marks as the transfer progresses; after the
//! transfer the marks are folded into a [`TimingRecord`] with the phase
//! durations a HAR viewer expects.

use serde::Serialize;
use std::time::{Duration, Instant};

/// Value reported for `ssl` when the transfer did not use TLS.
pub const SSL_NOT_APPLICABLE: f64 = -1.0;

/// HAR phase breakdown for one completed transfer.
///
/// All values are milliseconds rounded to three decimal places. `ssl` is
/// [`SSL_NOT_APPLICABLE`] for plain-HTTP transfers. Differences are kept
/// as computed; a transport reporting non-monotonic or zero marks for very
/// fast local transfers can yield small negatives, which are not clamped.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimingRecord {
    pub dns: f64,
    pub connect: f64,
    pub ssl: f64,
    pub send: f64,
    pub wait: f64,
    pub receive: f64,
}

/// Raw transfer marks, each an offset from the start of the transfer.
///
/// Every mark is set-once: redirect hops after the first leave the
/// connection-establishment marks untouched, so the breakdown keeps
/// describing the initial connection.
#[derive(Debug)]
pub struct TransferMarks {
    start: Instant,
    name_lookup: Option<Duration>,
    connect: Option<Duration>,
    tls_handshake: Option<Duration>,
    pre_transfer: Option<Duration>,
    start_transfer: Option<Duration>,
    total: Option<Duration>,
}

fn set_once(slot: &mut Option<Duration>, elapsed: Duration) {
    if slot.is_none() {
        *slot = Some(elapsed);
    }
}

impl TransferMarks {
    /// Starts the transfer clock.
    pub fn begin() -> Self {
        Self {
            start: Instant::now(),
            name_lookup: None,
            connect: None,
            tls_handshake: None,
            pre_transfer: None,
            start_transfer: None,
            total: None,
        }
    }

    /// Name resolution finished.
    pub fn name_lookup_done(&mut self) {
        let elapsed = self.start.elapsed();
        set_once(&mut self.name_lookup, elapsed);
    }

    /// TCP connection established.
    pub fn connect_done(&mut self) {
        let elapsed = self.start.elapsed();
        set_once(&mut self.connect, elapsed);
    }

    /// TLS handshake completed.
    pub fn tls_done(&mut self) {
        let elapsed = self.start.elapsed();
        set_once(&mut self.tls_handshake, elapsed);
    }

    /// Request fully written to the wire.
    pub fn request_written(&mut self) {
        let elapsed = self.start.elapsed();
        set_once(&mut self.pre_transfer, elapsed);
    }

    /// First response byte received.
    pub fn first_byte(&mut self) {
        let elapsed = self.start.elapsed();
        set_once(&mut self.start_transfer, elapsed);
    }

    /// Body fully received; the transfer is over.
    pub fn finished(&mut self) {
        let elapsed = self.start.elapsed();
        set_once(&mut self.total, elapsed);
    }

    /// Folds the marks into the HAR phase breakdown.
    ///
    /// `used_tls` selects between the two derivations: with TLS the
    /// handshake mark splits the connection phase, without it `ssl` is the
    /// sentinel and `send` starts at the TCP connect mark.
    pub fn to_record(&self, used_tls: bool) -> TimingRecord {
        let dns = millis(self.name_lookup);
        let connect_mark = millis(self.connect);
        let pre_transfer = millis(self.pre_transfer);
        let start_transfer = millis(self.start_transfer);
        let total = millis(self.total);

        let (ssl, connect, send) = if used_tls {
            let tls = millis(self.tls_handshake);
            (
                round3(tls - connect_mark),
                round3(tls - dns),
                round3(pre_transfer - tls),
            )
        } else {
            (
                SSL_NOT_APPLICABLE,
                round3(connect_mark - dns),
                round3(pre_transfer - connect_mark),
            )
        };

        TimingRecord {
            dns: round3(dns),
            connect,
            ssl,
            send,
            wait: round3(start_transfer - pre_transfer),
            receive: round3(total - start_transfer),
        }
    }
}

fn millis(mark: Option<Duration>) -> f64 {
    mark.map(|d| d.as_secs_f64() * 1000.0).unwrap_or(0.0)
}

fn round3(ms: f64) -> f64 {
    (ms * 1000.0).round() / 1000.0
}
