use bytes::{BufMut, Bytes, BytesMut};
use error::{Error, Result};

use crate::fnv::fnv1a;

const MIN_HEADER_LEN: usize = 4;
const MESSAGE_PREFIX_LEN: usize = 2;
const CHECKSUM_LEN: usize = 4;

/// Response header, seen once per session before any message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmessRespHeader {
    pub version: u8,
    pub options: u8,
    pub command: u8,
    pub command_data: Bytes,
}

impl VmessRespHeader {
    /// Returns the header and the number of bytes it used, or `None` when
    /// `buf` does not hold a complete header yet.
    pub fn parse(buf: &[u8]) -> Option<(Self, usize)> {
        if buf.len() < MIN_HEADER_LEN {
            return None;
        }
        let command_len = buf[3] as usize;
        let consumed = MIN_HEADER_LEN + command_len;
        if buf.len() < consumed {
            return None;
        }
        let header = Self {
            version: buf[0],
            options: buf[1],
            command: buf[2],
            command_data: Bytes::copy_from_slice(&buf[MIN_HEADER_LEN..consumed]),
        };
        Some((header, consumed))
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        dst.put_u8(self.version);
        dst.put_u8(self.options);
        dst.put_u8(self.command);
        dst.put_u8(self.command_data.len() as u8);
        dst.put_slice(&self.command_data);
    }
}

/// One response message: `len(2) ‖ fnv(4) ‖ body`, `len` covering the
/// checksum and the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmessRespMessage {
    pub checksum: u32,
    pub body: Bytes,
}

impl VmessRespMessage {
    pub fn new(body: Bytes) -> Self {
        Self {
            checksum: fnv1a(&body),
            body,
        }
    }

    /// `Ok(None)` means more data is needed. A declared length too short to
    /// hold the checksum cannot be recovered from and is an error.
    pub fn parse(buf: &[u8]) -> Result<Option<(Self, usize)>> {
        if buf.len() < MESSAGE_PREFIX_LEN {
            return Ok(None);
        }
        let len = u16::from_be_bytes([buf[0], buf[1]]) as usize;
        if len < CHECKSUM_LEN {
            return Err(Error::MalformedFrame(format!("vmess message length {len} too short")));
        }
        let consumed = MESSAGE_PREFIX_LEN + len;
        if buf.len() < consumed {
            return Ok(None);
        }
        let sum_at = MESSAGE_PREFIX_LEN;
        let checksum = u32::from_be_bytes([
            buf[sum_at],
            buf[sum_at + 1],
            buf[sum_at + 2],
            buf[sum_at + 3],
        ]);
        let body = Bytes::copy_from_slice(&buf[sum_at + CHECKSUM_LEN..consumed]);
        Ok(Some((Self { checksum, body }, consumed)))
    }

    pub fn verify(&self) -> Result<()> {
        let actual = fnv1a(&self.body);
        if actual != self.checksum {
            return Err(Error::ChecksumMismatch {
                expected: self.checksum,
                actual,
            });
        }
        Ok(())
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        dst.put_u16((self.body.len() + CHECKSUM_LEN) as u16);
        dst.put_u32(self.checksum);
        dst.put_slice(&self.body);
    }
}
