use std::str::FromStr;

use anyhow::Context;
use bytes::{Bytes, BytesMut};
use error::{Error, Result};
use http::Uri;
use tokio::io::AsyncWrite;

use crate::util::{remove_headers, rewrite_request_line};
use crate::{head_len, write_all, Protocol, RequestType};

const CONNECTION_ESTABLISHED: &[u8] = b"HTTP/1.1 200 Connection established\r\n\r\n";
const BAD_GATEWAY: &[u8] = b"HTTP/1.1 502 Bad Gateway\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";
const PROXY_HEADER_PREFIX: &str = "PROXY-";

/// An inbound request from an HTTP proxy client.
#[derive(Debug)]
pub struct HttpRequest {
    inner: BaseRequestInfo,
    forward: Bytes,
}

#[derive(Debug)]
struct BaseRequestInfo {
    host: String,
    port: u16,
    method: RequestType,
}

impl HttpRequest {
    pub fn new(buf: Bytes) -> Result<Self> {
        let mut headers = [httparse::EMPTY_HEADER; 64];
        let mut req = httparse::Request::new(&mut headers);
        let status = req
            .parse(&buf)
            .map_err(|e| Error::from(format!("parse content error {:?}", e)))?;
        if status.is_partial() {
            return Err(Error::Protocol("incomplete http request".to_string()));
        }
        let method = RequestType::from_str(req.method.context("do not find method")?)?;
        let path = req.path.context("do not find path")?;

        let uri = Uri::from_str(path)?;
        let authority = match uri.authority() {
            Some(authority) => authority.clone(),
            None => {
                let host = req
                    .headers
                    .iter()
                    .find(|h| h.name.eq_ignore_ascii_case("host"))
                    .context("do not find host")?;
                let host = std::str::from_utf8(host.value).context("invalid host header")?;
                Uri::from_str(host)?
                    .authority()
                    .cloned()
                    .context("invalid host header")?
            }
        };
        let host = authority.host().to_string();
        if host.is_empty() {
            return Err(Error::Protocol("empty host".to_string()));
        }
        let port = authority
            .port_u16()
            .unwrap_or_else(|| method.default_port());

        let head_end = head_len(&buf).unwrap_or(buf.len());
        let forward = match method {
            RequestType::Connect => buf.slice(head_end..),
            RequestType::Normal => {
                let target = uri
                    .path_and_query()
                    .map(|p| p.as_str())
                    .filter(|p| !p.is_empty())
                    .unwrap_or("/");
                let head = rewrite_request_line(&buf[..head_end], target);
                let head = remove_headers(&head, PROXY_HEADER_PREFIX);
                let mut content = BytesMut::from(&head[..]);
                content.extend_from_slice(&buf[head_end..]);
                content.freeze()
            }
        };

        Ok(Self {
            inner: BaseRequestInfo { host, port, method },
            forward,
        })
    }

    /// What the destination should see first: the rewritten request for
    /// plain HTTP, or whatever the client sent after a CONNECT.
    pub fn forward_content(&self) -> Bytes {
        self.forward.clone()
    }
}

#[async_trait::async_trait]
impl Protocol for HttpRequest {
    fn get_host(&self) -> &str {
        &self.inner.host
    }

    fn get_port(&self) -> u16 {
        self.inner.port
    }

    fn get_method(&self) -> RequestType {
        self.inner.method
    }

    async fn respond_command_result(&self, conn: &mut (dyn AsyncWrite + Unpin + Send), success: bool) -> Result<()> {
        if !success {
            write_all(conn, BAD_GATEWAY).await?;
        } else if self.inner.method == RequestType::Connect {
            write_all(conn, CONNECTION_ESTABLISHED).await?;
        }
        Ok(())
    }
}
