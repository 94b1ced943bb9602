//! HTTP proxy ingress: request-head parsing for CONNECT tunnels and
//! absolute-form forwarding.
//!
//! See <https://www.rfc-editor.org/rfc/rfc9110.html#field.connection> for the
//! hop-by-hop fields a proxy must not forward.

use hopwire_core::{Error, Result};

pub const HOP_BY_HOP_FIELDS: &[&str] = &[
    "Connection",
    "Proxy-Connection",
    "Keep-Alive",
    "TE",
    "Transfer-Encoding",
    "Upgrade",
];

/// Reply that opens a CONNECT tunnel.
pub const CONNECT_ESTABLISHED: &[u8] = b"HTTP/1.1 200 OK\r\n\r\n";

const MAX_HEADERS: usize = 64;

/// A parsed proxy request head.
#[derive(Debug, PartialEq)]
pub enum ProxyRequest {
    /// Tunnel raw bytes to `authority` once the 200 reply has been sent.
    Connect { authority: String },
    /// Forward an absolute-form request: `head` is the re-serialized request
    /// head with hop-by-hop fields stripped and close-delimited semantics
    /// forced, so the upstream response ends with the connection.
    Forward { authority: String, head: Vec<u8> },
}

/// Parses one request head as received from a proxy client.
pub fn parse_request_head(head: &[u8]) -> Result<ProxyRequest> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut request = httparse::Request::new(&mut headers);

    match request.parse(head) {
        Ok(httparse::Status::Complete(_)) => {}
        Ok(httparse::Status::Partial) => {
            return Err(Error::handshake("incomplete proxy request"));
        }
        Err(e) => {
            return Err(Error::handshake(format!("bad proxy request: {e}")));
        }
    }

    let method = request
        .method
        .ok_or_else(|| Error::handshake("proxy request lacks a method"))?;
    let target = request
        .path
        .ok_or_else(|| Error::handshake("proxy request lacks a target"))?;

    if method.eq_ignore_ascii_case("CONNECT") {
        return Ok(ProxyRequest::Connect {
            authority: ensure_port(target, 443),
        });
    }

    let (authority, origin_path) = split_absolute_form(target)?;
    let authority = ensure_port(&authority, 80);

    let mut rewritten = format!("{method} {origin_path} HTTP/1.1\r\n").into_bytes();

    let mut saw_host = false;
    for header in request.headers.iter() {
        if is_hop_by_hop(header.name) {
            continue;
        }
        if header.name.eq_ignore_ascii_case("host") {
            saw_host = true;
        }

        rewritten.extend_from_slice(header.name.as_bytes());
        rewritten.extend_from_slice(b": ");
        rewritten.extend_from_slice(header.value);
        rewritten.extend_from_slice(b"\r\n");
    }

    if !saw_host {
        rewritten.extend_from_slice(format!("Host: {authority}\r\n").as_bytes());
    }
    rewritten.extend_from_slice(b"Connection: close\r\n\r\n");

    Ok(ProxyRequest::Forward {
        authority,
        head: rewritten,
    })
}

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_FIELDS
        .iter()
        .any(|field| field.eq_ignore_ascii_case(name))
}

/// Splits `http://host[:port]/rest` into the authority and the origin-form
/// target a server expects.
fn split_absolute_form(target: &str) -> Result<(String, String)> {
    let Some(rest) = target.strip_prefix("http://") else {
        return Err(Error::handshake(format!(
            "expected an absolute http target, got {target:?}"
        )));
    };

    match rest.split_once('/') {
        Some((authority, path)) => Ok((authority.to_string(), format!("/{path}"))),
        None => Ok((rest.to_string(), "/".to_string())),
    }
}

/// Appends `default_port` when the authority names none.
fn ensure_port(authority: &str, default_port: u16) -> String {
    let has_port = if let Some(rest) = authority.strip_prefix('[') {
        // Bracketed IPv6 literal; a port follows the closing bracket.
        rest.rsplit_once(']').is_some_and(|(_, tail)| tail.starts_with(':'))
    } else {
        authority.contains(':')
    };

    if has_port {
        authority.to_string()
    } else {
        format!("{authority}:{default_port}")
    }
}
