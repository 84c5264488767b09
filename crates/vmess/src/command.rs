use cfb_mode::cipher::{AsyncStreamCipher, KeyIvInit};
use error::{Error, Result};
use rand::{Rng, RngCore};
use rk_common::{Address, Session};

use crate::auth::VmessAuth;
use crate::crypto::{md5, Aes128CfbEnc};
use crate::fnv::fnv1a;

const VERSION: u8 = 1;
const COMMAND_KEY_SALT: &[u8] = b"c48619fe-8f02-49e0-b9e9-edf763e17e21";

const ADDR_TYPE_IPV4: u8 = 0x01;
const ADDR_TYPE_DOMAIN: u8 = 0x02;
const ADDR_TYPE_IPV6: u8 = 0x03;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options(u8);

impl Options {
    /// standard chunk stream framing
    pub const CHUNK_STREAM: Options = Options(0x01);
    pub const REUSE: Options = Options(0x02);
    pub const CHUNK_MASKING: Options = Options(0x04);

    pub fn bits(&self) -> u8 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SecurityType {
    Aes128Cfb = 0x00,
    Aes128Gcm = 0x03,
    Chacha20Poly1305 = 0x04,
    None = 0x05,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    Tcp = 0x01,
    Udp = 0x02,
}

/// One-shot connection request, sent right after the auth signature.
#[derive(Debug, Clone)]
pub struct VmessCommand {
    version: u8,
    iv: [u8; 16],
    key: [u8; 16],
    verify: u8,
    options: Options,
    padding_len: u8,
    security: SecurityType,
    command: Command,
    port: u16,
    address: Address,
    padding: Vec<u8>,
}

impl VmessCommand {
    pub fn new(address: Address, port: u16) -> Result<Self> {
        if let Address::Domain(domain) = &address {
            if domain.is_empty() || domain.len() > u8::MAX as usize {
                return Err(Error::Protocol(format!("invalid domain length {}", domain.len())));
            }
        }
        let mut rng = rand::thread_rng();
        let mut iv = [0u8; 16];
        let mut key = [0u8; 16];
        rng.fill_bytes(&mut iv);
        rng.fill_bytes(&mut key);
        let padding_len: u8 = rng.gen_range(0..=15);
        let mut padding = vec![0u8; padding_len as usize];
        rng.fill_bytes(&mut padding);

        Ok(Self {
            version: VERSION,
            iv,
            key,
            verify: rng.r#gen(),
            options: Options::CHUNK_STREAM,
            padding_len,
            security: SecurityType::Aes128Cfb,
            command: Command::Tcp,
            port,
            address,
            padding,
        })
    }

    pub fn for_session(session: &Session) -> Result<Self> {
        Self::new(session.address(), session.port())
    }

    pub fn iv(&self) -> &[u8; 16] {
        &self.iv
    }

    pub fn key(&self) -> &[u8; 16] {
        &self.key
    }

    pub fn verify(&self) -> u8 {
        self.verify
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Plain command bytes, checksum included.
    pub fn encode(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(64 + self.padding.len());
        data.push(self.version);
        data.extend_from_slice(&self.iv);
        data.extend_from_slice(&self.key);
        data.push(self.verify);
        data.push(self.options.bits());
        data.push((self.padding_len << 4) | self.security as u8);
        // reserved
        data.push(0);
        data.push(self.command as u8);
        data.extend_from_slice(&self.port.to_be_bytes());
        match &self.address {
            Address::Ipv4(ip) => {
                data.push(ADDR_TYPE_IPV4);
                data.extend_from_slice(&ip.octets());
            }
            Address::Domain(domain) => {
                data.push(ADDR_TYPE_DOMAIN);
                data.push(domain.len() as u8);
                data.extend_from_slice(domain.as_bytes());
            }
            Address::Ipv6(ip) => {
                data.push(ADDR_TYPE_IPV6);
                data.extend_from_slice(&ip.octets());
            }
        }
        data.extend_from_slice(&self.padding);

        let hash = fnv1a(&data);
        data.extend_from_slice(&hash.to_be_bytes());
        data
    }

    /// Encrypted command. Only this header uses the user derived key, the
    /// body stream is keyed by the command's own iv/key.
    pub fn serialize(&self, auth: &VmessAuth) -> Vec<u8> {
        let mut data = self.encode();
        let (key, iv) = header_key_iv(auth);
        Aes128CfbEnc::new(&key.into(), &iv.into()).encrypt(&mut data);
        data
    }
}

/// key = md5(id ‖ salt), iv = md5(ts ‖ ts ‖ ts ‖ ts)
pub(crate) fn header_key_iv(auth: &VmessAuth) -> ([u8; 16], [u8; 16]) {
    let key = md5(&[&auth.identity()[..], COMMAND_KEY_SALT]);
    let ts = auth.timestamp();
    let iv = md5(&[&ts[..], &ts[..], &ts[..], &ts[..]]);
    (key, iv)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::Aes128CfbBufDec;
    use std::net::{Ipv4Addr, Ipv6Addr};
    use uuid::Uuid;

    fn fixed_command(address: Address) -> VmessCommand {
        VmessCommand {
            version: VERSION,
            iv: [1; 16],
            key: [2; 16],
            verify: 0x5a,
            options: Options::CHUNK_STREAM,
            padding_len: 3,
            security: SecurityType::Aes128Cfb,
            command: Command::Tcp,
            port: 443,
            address,
            padding: vec![9, 9, 9],
        }
    }

    #[test]
    fn test_encode_domain_layout() {
        let cmd = fixed_command(Address::Domain("example.com".to_string()));
        let data = cmd.encode();
        assert_eq!(data[0], 1);
        assert_eq!(&data[1..17], &[1; 16]);
        assert_eq!(&data[17..33], &[2; 16]);
        assert_eq!(data[33], 0x5a);
        assert_eq!(data[34], 0x01);
        assert_eq!(data[35], 0x30);
        assert_eq!(data[36], 0);
        assert_eq!(data[37], 0x01);
        assert_eq!(&data[38..40], &443u16.to_be_bytes());
        assert_eq!(data[40], ADDR_TYPE_DOMAIN);
        assert_eq!(data[41], 11);
        assert_eq!(&data[42..53], b"example.com");
        assert_eq!(&data[53..56], &[9, 9, 9]);
        let sum = u32::from_be_bytes(data[56..60].try_into().unwrap());
        assert_eq!(sum, fnv1a(&data[..56]));
        assert_eq!(data.len(), 60);
    }

    #[test]
    fn test_encode_ip_addresses() {
        let v4 = fixed_command(Address::Ipv4(Ipv4Addr::new(10, 0, 0, 5))).encode();
        assert_eq!(v4[40], ADDR_TYPE_IPV4);
        assert_eq!(&v4[41..45], &[10, 0, 0, 5]);
        assert_eq!(v4.len(), 41 + 4 + 3 + 4);

        let v6 = fixed_command(Address::Ipv6(Ipv6Addr::LOCALHOST)).encode();
        assert_eq!(v6[40], ADDR_TYPE_IPV6);
        assert_eq!(&v6[41..57], &Ipv6Addr::LOCALHOST.octets());
        assert_eq!(v6.len(), 41 + 16 + 3 + 4);
    }

    #[test]
    fn test_serialize_decrypts_with_user_key() {
        let uuid = Uuid::parse_str("b831381d-6324-4d53-ad4f-8cda48b30811").unwrap();
        let auth = VmessAuth::with_timestamp(uuid, 1_700_000_000);
        let cmd = fixed_command(Address::Domain("example.com".to_string()));

        let mut data = cmd.serialize(&auth);
        assert_ne!(data, cmd.encode());

        let (key, iv) = header_key_iv(&auth);
        let mut dec = Aes128CfbBufDec::new(&key.into(), &iv.into());
        dec.decrypt(&mut data);
        assert_eq!(data, cmd.encode());
    }

    #[test]
    fn test_random_command() {
        let cmd = VmessCommand::new(Address::Domain("a.com".to_string()), 80).unwrap();
        assert!(cmd.padding_len <= 15);
        assert_eq!(cmd.padding.len(), cmd.padding_len as usize);
        assert_ne!(cmd.iv, cmd.key);

        let long = "a".repeat(256);
        assert!(VmessCommand::new(Address::Domain(long), 80).is_err());
        assert!(VmessCommand::new(Address::Domain(String::new()), 80).is_err());
    }
}
