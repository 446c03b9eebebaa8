//! Response body text decoding.
//!
//! The charset comes from the `content-type` header's `charset=` parameter
//! when present, resolved through the WHATWG label registry. Without one
//! the body decodes as ISO-8859-1, the HTTP default for textual content —
//! applied even to binary payloads, which therefore come out mangled.

use crate::error::TransferError;
use crate::probe::headers::HeaderMap;
use encoding_rs::Encoding;

/// How to treat bytes the selected charset cannot decode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CharsetPolicy {
    /// Replace malformed sequences with U+FFFD and keep going.
    #[default]
    Permissive,
    /// Fail the transfer when the declared or fallback charset cannot
    /// decode the body cleanly.
    Strict,
}

/// Charset label advertised by the response, if any.
///
/// Mirrors a `charset=(\S+)` scan over the lowercased content type: the
/// label is the non-whitespace run following `charset=`, taken verbatim.
pub(crate) fn declared_charset(headers: &HeaderMap) -> Option<String> {
    let content_type = headers.get("content-type")?.to_ascii_lowercase();
    let (_, rest) = content_type.split_once("charset=")?;
    let label: String = rest.chars().take_while(|c| !c.is_whitespace()).collect();
    if label.is_empty() {
        None
    } else {
        Some(label)
    }
}

/// Decodes the raw body per the declared charset and policy.
///
/// Unknown labels fall back to the ISO-8859-1 default rather than failing;
/// encoding_rs folds the ISO-8859-1 family into windows-1252 per the
/// WHATWG registry, which agrees with Latin-1 on every byte HTTP bodies
/// actually carry.
pub(crate) fn decode_body(
    bytes: &[u8],
    headers: &HeaderMap,
    policy: CharsetPolicy,
) -> Result<String, TransferError> {
    let encoding = declared_charset(headers)
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .unwrap_or(encoding_rs::WINDOWS_1252);

    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors && policy == CharsetPolicy::Strict {
        return Err(TransferError::Decode {
            charset: encoding.name().to_string(),
        });
    }
    Ok(text.into_owned())
}
