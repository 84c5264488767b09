//! Inbound SOCKS5, no authentication and CONNECT only.

use std::net::{Ipv4Addr, Ipv6Addr};

use error::{Error, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{write_all, Protocol, RequestType};

pub const SOCKS5_VERSION: u8 = 0x05;
const AUTH_NONE: u8 = 0x00;
const AUTH_NO_ACCEPTABLE: u8 = 0xFF;

const CMD_CONNECT: u8 = 0x01;

const ATYP_IPV4: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x03;
const ATYP_IPV6: u8 = 0x04;

const REP_SUCCESS: u8 = 0x00;
const REP_GENERAL_FAILURE: u8 = 0x01;
const REP_CMD_NOT_SUPPORTED: u8 = 0x07;
const REP_ATYP_NOT_SUPPORTED: u8 = 0x08;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Socks5Request {
    host: String,
    port: u16,
}

impl Socks5Request {
    /// Runs the greeting and reads the CONNECT request. The version byte of
    /// the greeting has already been consumed by the caller.
    pub async fn handshake<S>(stream: &mut S) -> Result<Self>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let nmethods = stream.read_u8().await? as usize;
        let mut methods = vec![0u8; nmethods];
        stream.read_exact(&mut methods).await?;

        if !methods.contains(&AUTH_NONE) {
            stream.write_all(&[SOCKS5_VERSION, AUTH_NO_ACCEPTABLE]).await?;
            return Err(Error::Socks5ParseError("no acceptable auth method".to_string()));
        }
        stream.write_all(&[SOCKS5_VERSION, AUTH_NONE]).await?;

        let mut header = [0u8; 4];
        stream.read_exact(&mut header).await?;
        if header[0] != SOCKS5_VERSION {
            return Err(Error::Socks5ParseError(format!("invalid version {}", header[0])));
        }

        let cmd = header[1];
        let atyp = header[3];
        let host = match atyp {
            ATYP_IPV4 => {
                let mut addr = [0u8; 4];
                stream.read_exact(&mut addr).await?;
                Ipv4Addr::from(addr).to_string()
            }
            ATYP_DOMAIN => {
                let len = stream.read_u8().await? as usize;
                let mut domain = vec![0u8; len];
                stream.read_exact(&mut domain).await?;
                String::from_utf8_lossy(&domain).to_string()
            }
            ATYP_IPV6 => {
                let mut addr = [0u8; 16];
                stream.read_exact(&mut addr).await?;
                Ipv6Addr::from(addr).to_string()
            }
            _ => {
                stream.write_all(&reply(REP_ATYP_NOT_SUPPORTED)).await?;
                return Err(Error::Socks5ParseError(format!("unsupported address type {atyp}")));
            }
        };
        let port = stream.read_u16().await?;

        if cmd != CMD_CONNECT {
            stream.write_all(&reply(REP_CMD_NOT_SUPPORTED)).await?;
            return Err(Error::Socks5ParseError(format!("unsupported command {cmd}")));
        }

        Ok(Self { host, port })
    }
}

fn reply(rep: u8) -> [u8; 10] {
    [SOCKS5_VERSION, rep, 0x00, ATYP_IPV4, 0, 0, 0, 0, 0, 0]
}

#[async_trait::async_trait]
impl Protocol for Socks5Request {
    fn get_host(&self) -> &str {
        &self.host
    }

    fn get_port(&self) -> u16 {
        self.port
    }

    fn get_method(&self) -> RequestType {
        RequestType::Connect
    }

    async fn respond_command_result(&self, conn: &mut (dyn AsyncWrite + Unpin + Send), success: bool) -> Result<()> {
        let rep = if success { REP_SUCCESS } else { REP_GENERAL_FAILURE };
        write_all(conn, &reply(rep)).await
    }
}

#[cfg(test)]
mod test {
    use super::*;

    async fn run(input: &[u8]) -> (Result<Socks5Request>, Vec<u8>) {
        let (mut client, mut server) = tokio::io::duplex(1024);
        client.write_all(input).await.unwrap();
        let result = Socks5Request::handshake(&mut server).await;
        drop(server);
        let mut written = Vec::new();
        client.read_to_end(&mut written).await.unwrap();
        (result, written)
    }

    #[tokio::test]
    async fn test_connect_ipv4() {
        let (req, written) = run(&[1, AUTH_NONE, 5, 1, 0, ATYP_IPV4, 10, 0, 0, 5, 0x1f, 0x90]).await;
        let req = req.unwrap();
        assert_eq!(req.get_host(), "10.0.0.5");
        assert_eq!(req.get_port(), 8080);
        assert_eq!(written, vec![SOCKS5_VERSION, AUTH_NONE]);
    }

    #[tokio::test]
    async fn test_connect_ipv6() {
        let mut input = vec![1, AUTH_NONE, 5, 1, 0, ATYP_IPV6];
        input.extend_from_slice(&Ipv6Addr::LOCALHOST.octets());
        input.extend_from_slice(&443u16.to_be_bytes());
        let (req, _) = run(&input).await;
        assert_eq!(req.unwrap().get_host(), "::1");
    }

    #[tokio::test]
    async fn test_rejects_auth_only_client() {
        let (req, written) = run(&[1, 0x02]).await;
        assert!(req.is_err());
        assert_eq!(written, vec![SOCKS5_VERSION, AUTH_NO_ACCEPTABLE]);
    }

    #[tokio::test]
    async fn test_rejects_udp_associate() {
        let (req, written) = run(&[1, AUTH_NONE, 5, 3, 0, ATYP_IPV4, 0, 0, 0, 0, 0, 0]).await;
        assert!(req.is_err());
        assert_eq!(&written[2..4], &[SOCKS5_VERSION, REP_CMD_NOT_SUPPORTED]);
    }

    #[tokio::test]
    async fn test_reply() {
        let req = Socks5Request {
            host: "a.com".to_string(),
            port: 80,
        };
        let mut out = Vec::new();
        req.respond_command_result(&mut out, false).await.unwrap();
        assert_eq!(out, reply(REP_GENERAL_FAILURE).to_vec());
    }
}
