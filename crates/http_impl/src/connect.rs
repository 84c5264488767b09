//! Outbound CONNECT through an upstream HTTP proxy.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use error::{Error, Result};

pub fn encode_basic_auth(username: &str, password: &str) -> String {
    format!("Basic {}", BASE64.encode(format!("{username}:{password}")))
}

fn authority(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

pub fn build_connect_request(host: &str, port: u16, auth: Option<(&str, &str)>) -> Bytes {
    let target = authority(host, port);
    let mut request = format!("CONNECT {target} HTTP/1.1\r\nHost: {target}\r\n");
    if let Some((username, password)) = auth {
        request.push_str(&format!(
            "Proxy-Authorization: {}\r\n",
            encode_basic_auth(username, password)
        ));
    }
    request.push_str("Proxy-Connection: keep-alive\r\n\r\n");
    Bytes::from(request)
}

/// Status code of a complete response head, or `None` if more is needed.
pub fn parse_connect_response(buf: &[u8]) -> Result<Option<(u16, usize)>> {
    let mut headers = [httparse::EMPTY_HEADER; 32];
    let mut response = httparse::Response::new(&mut headers);
    let status = response
        .parse(buf)
        .map_err(|e| Error::Protocol(format!("invalid connect response {e:?}")))?;
    match status {
        httparse::Status::Partial => Ok(None),
        httparse::Status::Complete(len) => {
            let code = response
                .code
                .ok_or_else(|| Error::Protocol("connect response without status".to_string()))?;
            Ok(Some((code, len)))
        }
    }
}
