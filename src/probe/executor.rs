//! Transfer execution: resolve, connect, send, parse, follow redirects.
//!
//! One call performs one complete GET exchange. Redirects are followed up
//! to a fixed cap, each hop on a fresh connection; the request asks for
//! identity encoding and `Connection: close`, so the body is whatever the
//! peer sends until EOF. Chunked transfer coding is not interpreted.

use crate::error::TransferError;
use crate::infra::{dns, tls};
use crate::probe::charset;
use crate::probe::client::HttpProbe;
use crate::probe::headers::ResponseHead;
use crate::probe::types::{ProbeRequest, ProbeResponse};
use crate::shared::timing::TransferMarks;
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Maximum number of redirects to follow.
const MAX_REDIRECTS: usize = 20;

/// Target of one hop in a redirect chain.
#[derive(Debug, Clone)]
struct HopTarget {
    host: String,
    port: u16,
    path: String,
    use_tls: bool,
}

impl HopTarget {
    fn default_port(&self) -> u16 {
        if self.use_tls {
            443
        } else {
            80
        }
    }

    /// Rewrites the target from a `Location` header value.
    ///
    /// Absolute http(s) URLs replace scheme, host, port and path; a host
    /// that stays the same keeps a non-default port across the hop.
    /// Anything else is treated as a path on the current origin.
    fn follow(&mut self, location: &str) -> Result<(), TransferError> {
        if location.starts_with("http://") || location.starts_with("https://") {
            let parsed = url::Url::parse(location).map_err(|e| {
                TransferError::Protocol(format!("bad redirect target {location:?}: {e}"))
            })?;
            let use_tls = parsed.scheme() == "https";
            let host = parsed
                .host_str()
                .ok_or_else(|| {
                    TransferError::Protocol(format!("redirect target {location:?} has no host"))
                })?
                .to_string();
            let default_port = if use_tls { 443 } else { 80 };
            let port = match parsed.port() {
                Some(port) => port,
                None if host == self.host && self.port != self.default_port() => self.port,
                None => default_port,
            };
            let path = match parsed.query() {
                Some(query) => format!("{}?{}", parsed.path(), query),
                None => parsed.path().to_string(),
            };

            self.use_tls = use_tls;
            self.host = host;
            self.port = port;
            self.path = if path.is_empty() { "/".to_string() } else { path };
        } else if location.starts_with('/') {
            self.path = location.to_string();
        } else {
            self.path = format!("/{location}");
        }
        Ok(())
    }
}

/// What one hop produced, before redirect resolution.
struct HopOutcome {
    status: u16,
    location: Option<String>,
    body: Vec<u8>,
}

/// Runs one probe transfer under the effective wall-clock bound.
pub(crate) async fn execute(
    probe: &HttpProbe,
    request: &ProbeRequest,
) -> Result<ProbeResponse, TransferError> {
    if !request.path.starts_with('/') {
        return Err(TransferError::InvalidRequest(format!(
            "path {:?} must begin with '/'",
            request.path
        )));
    }

    let limit = probe.effective_timeout(request);
    let target = HopTarget {
        host: probe.host().to_string(),
        port: probe.effective_port(request.use_tls),
        path: request.path.clone(),
        use_tls: request.use_tls,
    };

    tracing::debug!(
        host = %target.host,
        port = target.port,
        path = %target.path,
        tls = target.use_tls,
        "starting probe transfer"
    );

    match timeout(limit, transfer(probe, request, target)).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(host = %probe.host(), ?limit, "probe transfer timed out");
            Err(TransferError::Timeout { limit })
        }
    }
}

async fn transfer(
    probe: &HttpProbe,
    request: &ProbeRequest,
    mut target: HopTarget,
) -> Result<ProbeResponse, TransferError> {
    let mut marks = TransferMarks::begin();
    let mut head = ResponseHead::new();
    let mut hops = 0usize;

    loop {
        let first_hop = hops == 0;
        let outcome =
            perform_hop(&target, &request.headers, &mut head, &mut marks, first_hop).await?;

        if (300..400).contains(&outcome.status) {
            if let Some(location) = outcome.location {
                hops += 1;
                if hops >= MAX_REDIRECTS {
                    return Err(TransferError::TooManyRedirects(MAX_REDIRECTS));
                }
                tracing::debug!(status = outcome.status, location = %location, "following redirect");
                target.follow(&location)?;
                continue;
            }
        }

        marks.finished();
        let body = charset::decode_body(&outcome.body, &head.headers, probe.charset_policy())?;
        return Ok(ProbeResponse {
            status: outcome.status,
            reason: head.reason,
            headers: head.headers,
            body,
            timings: marks.to_record(request.use_tls),
        });
    }
}

/// One request/response exchange against `target`.
///
/// Timing marks are stamped on the first hop only; redirect hops leave
/// them alone.
async fn perform_hop(
    target: &HopTarget,
    extra_headers: &HashMap<String, String>,
    head: &mut ResponseHead,
    marks: &mut TransferMarks,
    first_hop: bool,
) -> Result<HopOutcome, TransferError> {
    let ips = dns::resolve(&target.host).await?;
    if first_hop {
        marks.name_lookup_done();
    }

    let addr = SocketAddr::new(ips[0], target.port);
    let tcp = TcpStream::connect(addr)
        .await
        .map_err(|source| TransferError::Connect { addr, source })?;
    if first_hop {
        marks.connect_done();
    }

    let request_bytes = build_request(target, extra_headers);

    if target.use_tls {
        let stream = tls::connect(tcp, &target.host).await?;
        if first_hop {
            marks.tls_done();
        }
        exchange(stream, &request_bytes, head, marks, first_hop).await
    } else {
        exchange(tcp, &request_bytes, head, marks, first_hop).await
    }
}

/// Serializes the GET request head.
///
/// Caller headers replace same-named defaults, compared
/// case-insensitively; the wire keeps the caller's casing.
fn build_request(target: &HopTarget, extra: &HashMap<String, String>) -> Vec<u8> {
    let host_value = if target.port == target.default_port() {
        target.host.clone()
    } else {
        format!("{}:{}", target.host, target.port)
    };

    let mut header_lines: Vec<(String, String)> = vec![
        ("Host".to_string(), host_value),
        ("Accept-Encoding".to_string(), "identity".to_string()),
        ("Connection".to_string(), "close".to_string()),
    ];
    for (name, value) in extra {
        if let Some(slot) = header_lines
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
        {
            *slot = (name.clone(), value.clone());
        } else {
            header_lines.push((name.clone(), value.clone()));
        }
    }

    let mut out = format!("GET {} HTTP/1.1\r\n", target.path);
    for (name, value) in &header_lines {
        out.push_str(&format!("{name}: {value}\r\n"));
    }
    out.push_str("\r\n");
    out.into_bytes()
}

/// Writes the request and reads the full response off one connection.
async fn exchange<S>(
    stream: S,
    request_bytes: &[u8],
    head: &mut ResponseHead,
    marks: &mut TransferMarks,
    first_hop: bool,
) -> Result<HopOutcome, TransferError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut stream = BufReader::new(stream);
    stream.write_all(request_bytes).await?;
    stream.flush().await?;
    if first_hop {
        marks.request_written();
    }

    let mut status: Option<u16> = None;
    let mut location: Option<String> = None;
    let mut line = Vec::new();

    loop {
        line.clear();
        let n = stream.read_until(b'\n', &mut line).await?;
        if n == 0 {
            return Err(TransferError::Protocol(
                "connection closed before response head completed".to_string(),
            ));
        }
        if first_hop {
            marks.first_byte();
        }

        let text = String::from_utf8_lossy(&line).into_owned();
        let trimmed = text.trim_end_matches(|c| c == '\r' || c == '\n');

        if status.is_none() {
            status = Some(parse_status_code(trimmed)?);
        } else if let Some((name, value)) = trimmed.split_once(':') {
            if name.trim().eq_ignore_ascii_case("location") {
                location = Some(value.trim().to_string());
            }
        }

        let done = trimmed.is_empty();
        head.absorb_line(&text);
        if done {
            break;
        }
    }

    let Some(status) = status else {
        return Err(TransferError::Protocol("empty response head".to_string()));
    };

    let mut body = Vec::new();
    if let Err(e) = stream.read_to_end(&mut body).await {
        // Peers that drop the link without a clean TLS close are common;
        // the bytes read so far are the body.
        if e.kind() != io::ErrorKind::UnexpectedEof {
            return Err(e.into());
        }
    }

    Ok(HopOutcome {
        status,
        location,
        body,
    })
}

fn parse_status_code(status_line: &str) -> Result<u16, TransferError> {
    if !status_line.starts_with("HTTP/") {
        return Err(TransferError::Protocol(format!(
            "not an http status line: {status_line:?}"
        )));
    }
    status_line
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| TransferError::Protocol(format!("malformed status line {status_line:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::charset::CharsetPolicy;
    use crate::shared::timing::SSL_NOT_APPLICABLE;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    /// Serves `response` to a fixed number of connections, one at a time.
    async fn serve(responses: Vec<Vec<u8>>) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            for response in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                socket.write_all(&response).await.unwrap();
                socket.shutdown().await.unwrap();
            }
        });
        port
    }

    async fn serve_once(response: &[u8]) -> u16 {
        serve(vec![response.to_vec()]).await
    }

    fn probe(port: u16) -> HttpProbe {
        HttpProbe::new("127.0.0.1").with_port(port)
    }

    #[tokio::test]
    async fn status_reason_and_body_are_captured() {
        let port = serve_once(b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\r\nhello").await;
        let response = probe(port).get("/").await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.reason.as_deref(), Some("OK"));
        assert_eq!(response.body, "hello");
        assert_eq!(response.headers.get("content-type"), Some("text/plain"));
    }

    #[tokio::test]
    async fn custom_reason_phrase_is_preserved() {
        let port = serve_once(b"HTTP/1.1 404 Missing\r\n\r\n").await;
        let response = probe(port).get("/nope").await.unwrap();

        assert_eq!(response.status, 404);
        assert_eq!(response.reason.as_deref(), Some("Missing"));
        assert_eq!(response.body, "");
    }

    #[tokio::test]
    async fn header_casing_is_kept_but_lookup_is_insensitive() {
        let port = serve_once(
            b"HTTP/1.1 200 OK\r\nCoNtEnT-TyPe: text/html; charset=utf-8\r\nX-One: a\r\nx-one: b\r\n\r\n",
        )
        .await;
        let response = probe(port).get("/").await.unwrap();

        assert_eq!(
            response.headers.get("Content-Type"),
            Some("text/html; charset=utf-8")
        );
        // last occurrence wins, whatever the casing
        assert_eq!(response.headers.get("X-One"), Some("b"));
        let (name, _) = response
            .headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
            .unwrap();
        assert_eq!(name, "CoNtEnT-TyPe");
    }

    #[tokio::test]
    async fn garbage_head_lines_are_ignored() {
        let port = serve_once(
            b"HTTP/1.1 200 OK\r\nthis line has no colon\r\nX-Ok: yes\r\n\r\nbody",
        )
        .await;
        let response = probe(port).get("/").await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.headers.get("x-ok"), Some("yes"));
        assert_eq!(response.headers.len(), 1);
        assert_eq!(response.body, "body");
    }

    #[tokio::test]
    async fn body_decodes_per_declared_charset() {
        let mut response = b"HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\n\r\n"
            .to_vec();
        response.extend_from_slice("héllo wörld".as_bytes());
        let port = serve_once(&response).await;

        let result = probe(port).get("/").await.unwrap();
        assert_eq!(result.body, "héllo wörld");
    }

    #[tokio::test]
    async fn body_without_charset_decodes_as_latin1() {
        let mut response = b"HTTP/1.1 200 OK\r\n\r\n".to_vec();
        response.push(0xE9);
        let port = serve_once(&response).await;

        let result = probe(port).get("/").await.unwrap();
        assert_eq!(result.body, "\u{e9}");
    }

    #[tokio::test]
    async fn strict_charset_policy_fails_on_malformed_body() {
        let mut response =
            b"HTTP/1.1 200 OK\r\nContent-Type: text/plain; charset=utf-8\r\n\r\n".to_vec();
        response.push(0xFF);
        let port = serve_once(&response).await;

        let err = probe(port)
            .with_charset_policy(CharsetPolicy::Strict)
            .get("/")
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::Decode { .. }));
    }

    #[tokio::test]
    async fn plain_transfer_reports_ssl_sentinel() {
        let port = serve_once(b"HTTP/1.1 200 OK\r\n\r\nok").await;
        let response = probe(port).get("/").await.unwrap();

        let timings = response.timings;
        assert_eq!(timings.ssl, SSL_NOT_APPLICABLE);
        assert!(timings.dns >= 0.0);
        assert!(timings.connect >= 0.0);
        assert!(timings.send >= 0.0);
        assert!(timings.wait >= 0.0);
        assert!(timings.receive >= 0.0);
    }

    #[tokio::test]
    async fn timeout_override_classifies_as_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            // Hold the connection open without ever responding.
            tokio::time::sleep(Duration::from_secs(60)).await;
        });

        let request = ProbeRequest::path("/slow").timeout(Duration::from_millis(200));
        let err = probe(port).request(&request).await.unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn connection_refused_maps_to_connect_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = probe(port).get("/").await.unwrap_err();
        assert!(matches!(err, TransferError::Connect { .. }));
    }

    #[tokio::test]
    async fn tls_against_plain_peer_fails_with_tls_error() {
        let port = serve_once(b"HTTP/1.1 200 OK\r\n\r\n").await;
        let request = ProbeRequest::path("/").tls();
        let err = probe(port).request(&request).await.unwrap_err();
        assert!(matches!(err, TransferError::Tls { .. }));
    }

    #[tokio::test]
    async fn invalid_path_is_rejected_before_any_io() {
        let err = HttpProbe::new("127.0.0.1")
            .get("no-leading-slash")
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn sequential_requests_share_nothing() {
        let port = serve(vec![
            b"HTTP/1.1 200 OK\r\nX-First: 1\r\n\r\nalpha".to_vec(),
            b"HTTP/1.1 201 Created\r\nX-Second: 2\r\n\r\nbeta".to_vec(),
        ])
        .await;
        let probe = probe(port);

        let first = probe.get("/a").await.unwrap();
        assert_eq!(first.status, 200);
        assert_eq!(first.body, "alpha");
        assert!(first.headers.contains("x-first"));

        let second = probe.get("/b").await.unwrap();
        assert_eq!(second.status, 201);
        assert_eq!(second.body, "beta");
        assert!(second.headers.contains("x-second"));
        assert!(
            !second.headers.contains("x-first"),
            "headers must not leak across calls"
        );
    }

    #[tokio::test]
    async fn redirects_are_followed() {
        let port = serve(vec![
            b"HTTP/1.1 302 Found\r\nLocation: /next\r\n\r\n".to_vec(),
            b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\r\ndone".to_vec(),
        ])
        .await;
        let response = probe(port).get("/start").await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.body, "done");
        // The reason phrase is the first hop's and is never overwritten.
        assert_eq!(response.reason.as_deref(), Some("Found"));
        // Headers accumulate across hops.
        assert_eq!(response.headers.get("location"), Some("/next"));
        assert_eq!(response.headers.get("content-type"), Some("text/plain"));
    }

    #[tokio::test]
    async fn redirect_loop_is_cut_off() {
        let responses = vec![b"HTTP/1.1 302 Found\r\nLocation: /loop\r\n\r\n".to_vec(); 25];
        let port = serve(responses).await;

        let err = probe(port).get("/").await.unwrap_err();
        assert!(matches!(err, TransferError::TooManyRedirects(_)));
    }

    #[tokio::test]
    async fn caller_headers_reach_the_wire_and_override_defaults() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let mut filled = 0;
            loop {
                let n = socket.read(&mut buf[filled..]).await.unwrap();
                filled += n;
                if n == 0 || buf[..filled].windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
            let _ = tx.send(String::from_utf8_lossy(&buf[..filled]).into_owned());
            socket.write_all(b"HTTP/1.1 204 NoContent\r\n\r\n").await.unwrap();
            socket.shutdown().await.unwrap();
        });

        let request = ProbeRequest::path("/probe")
            .header("X-Scanner", "har-probe")
            .header("accept-encoding", "identity;q=1.0");
        let response = probe(port).request(&request).await.unwrap();
        assert_eq!(response.status, 204);

        let wire = rx.await.unwrap();
        assert!(wire.starts_with("GET /probe HTTP/1.1\r\n"));
        assert!(wire.contains(&format!("\r\nHost: 127.0.0.1:{port}\r\n")));
        assert!(wire.contains("\r\nConnection: close\r\n"));
        assert!(wire.contains("\r\nX-Scanner: har-probe\r\n"));
        // The caller's value and casing replace the default.
        assert!(wire.contains("\r\naccept-encoding: identity;q=1.0\r\n"));
        assert!(!wire.contains("Accept-Encoding: identity\r\n"));
    }

    #[test]
    fn follow_handles_absolute_and_relative_targets() {
        let mut target = HopTarget {
            host: "example.org".to_string(),
            port: 8080,
            path: "/start".to_string(),
            use_tls: false,
        };

        target.follow("/moved").unwrap();
        assert_eq!(target.path, "/moved");
        assert_eq!(target.port, 8080);

        target.follow("relative").unwrap();
        assert_eq!(target.path, "/relative");

        // Same host, no explicit port: a non-default port survives the hop.
        target.follow("http://example.org/elsewhere").unwrap();
        assert_eq!(target.host, "example.org");
        assert_eq!(target.port, 8080);
        assert_eq!(target.path, "/elsewhere");

        // Scheme upgrade to a different host resets to the scheme default.
        target.follow("https://secure.example.org/login?next=1").unwrap();
        assert!(target.use_tls);
        assert_eq!(target.host, "secure.example.org");
        assert_eq!(target.port, 443);
        assert_eq!(target.path, "/login?next=1");
    }

    #[test]
    fn status_code_parsing() {
        assert_eq!(parse_status_code("HTTP/1.1 200 OK").unwrap(), 200);
        assert_eq!(parse_status_code("HTTP/1.0 404 Not Found").unwrap(), 404);
        assert!(parse_status_code("SSH-2.0-OpenSSH").is_err());
        assert!(parse_status_code("HTTP/1.1").is_err());
    }
}
