use bytes::{BufMut, Bytes, BytesMut};

use crate::fnv::fnv1a;

/// Largest payload carried by one body chunk.
pub const MAX_CHUNK_LEN: usize = 2 << 14;

const CHUNK_HEADER_LEN: usize = 2 + 4;

/// One plain body chunk: `len(2) ‖ fnv(4) ‖ payload` where `len` counts the
/// checksum too. An empty payload is the terminate frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmessRequest {
    payload: Bytes,
}

impl VmessRequest {
    pub fn new(payload: Bytes) -> Self {
        debug_assert!(payload.len() <= MAX_CHUNK_LEN);
        Self { payload }
    }

    pub fn terminate() -> Self {
        Self {
            payload: Bytes::new(),
        }
    }

    /// Cut a body into chunks of at most [`MAX_CHUNK_LEN`]. An empty body
    /// yields the single terminate chunk.
    pub fn split(data: &[u8]) -> Vec<VmessRequest> {
        if data.is_empty() {
            return vec![Self::terminate()];
        }
        data.chunks(MAX_CHUNK_LEN)
            .map(|chunk| Self::new(Bytes::copy_from_slice(chunk)))
            .collect()
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn is_terminate(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn encoded_len(&self) -> usize {
        CHUNK_HEADER_LEN + self.payload.len()
    }

    pub fn serialize(&self, dst: &mut BytesMut) {
        dst.reserve(self.encoded_len());
        dst.put_u16((self.payload.len() + 4) as u16);
        dst.put_u32(fnv1a(&self.payload));
        dst.put_slice(&self.payload);
    }
}
