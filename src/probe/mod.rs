//! The probe itself: request/response types, header parsing, charset
//! handling and the transfer executor behind [`HttpProbe`].

pub mod charset;
pub mod client;
mod executor;
pub mod headers;
pub mod types;

pub use charset::CharsetPolicy;
pub use client::HttpProbe;
pub use headers::{HeaderMap, ResponseHead};
pub use types::{ProbeRequest, ProbeResponse};
