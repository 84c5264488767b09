use bytes::{Buf, Bytes, BytesMut};
use cfb_mode::cipher::KeyIvInit;
use error::Result;
use tracing::trace;

use crate::auth::VmessAuth;
use crate::command::VmessCommand;
use crate::crypto::{md5, Aes128CfbBufDec, Aes128CfbBufEnc};
use crate::request::VmessRequest;
use crate::response::{VmessRespHeader, VmessRespMessage};

/// Codec state for one outbound VMess connection.
///
/// The body encryptor is keyed by the command's own iv/key; responses are
/// decrypted with the md5 of both.
pub struct VmessSession {
    auth: VmessAuth,
    command: VmessCommand,
    encryptor: Aes128CfbBufEnc,
    decryptor: Aes128CfbBufDec,
    recv_buf: BytesMut,
    resp_header: Option<VmessRespHeader>,
}

impl VmessSession {
    pub fn new(auth: VmessAuth, command: VmessCommand) -> Self {
        let (key, iv) = (*command.key(), *command.iv());
        let encryptor = Aes128CfbBufEnc::new(&key.into(), &iv.into());
        let resp_key = md5(&[&command.key()[..]]);
        let resp_iv = md5(&[&command.iv()[..]]);
        let decryptor = Aes128CfbBufDec::new(&resp_key.into(), &resp_iv.into());
        Self {
            auth,
            command,
            encryptor,
            decryptor,
            recv_buf: BytesMut::new(),
            resp_header: None,
        }
    }

    pub fn command(&self) -> &VmessCommand {
        &self.command
    }

    pub fn resp_header(&self) -> Option<&VmessRespHeader> {
        self.resp_header.as_ref()
    }

    /// `auth ‖ encrypted command`, signed with a fresh timestamp.
    pub fn pack_request_header(&mut self) -> Result<Bytes> {
        self.auth.update();
        let sig = self.auth.serialize()?;
        let command = self.command.serialize(&self.auth);
        let mut data = BytesMut::with_capacity(sig.len() + command.len());
        data.extend_from_slice(&sig);
        data.extend_from_slice(&command);
        Ok(data.freeze())
    }

    /// Frame and encrypt a body. Nothing is produced for an empty body, the
    /// terminate frame is only sent through [`Self::terminate_request`].
    pub fn pack_request(&mut self, body: &[u8]) -> Bytes {
        if body.is_empty() {
            return Bytes::new();
        }
        self.seal(VmessRequest::split(body))
    }

    pub fn terminate_request(&mut self) -> Bytes {
        self.seal(vec![VmessRequest::terminate()])
    }

    fn seal(&mut self, chunks: Vec<VmessRequest>) -> Bytes {
        let mut data = BytesMut::with_capacity(chunks.iter().map(|c| c.encoded_len()).sum());
        for chunk in &chunks {
            chunk.serialize(&mut data);
        }
        self.encryptor.encrypt(&mut data);
        data.freeze()
    }

    /// Decrypt raw bytes from the transport into the receive buffer.
    pub fn handle_response(&mut self, data: &[u8]) {
        let start = self.recv_buf.len();
        self.recv_buf.extend_from_slice(data);
        self.decryptor.decrypt(&mut self.recv_buf[start..]);
    }

    /// Next complete message body, `Ok(None)` while more data is needed.
    pub fn unpack_response(&mut self) -> Result<Option<Bytes>> {
        if self.resp_header.is_none() {
            match VmessRespHeader::parse(&self.recv_buf) {
                Some((header, used)) => {
                    trace!("vmess response header {:?}", header);
                    self.recv_buf.advance(used);
                    self.resp_header = Some(header);
                }
                None => return Ok(None),
            }
        }

        match VmessRespMessage::parse(&self.recv_buf)? {
            Some((message, used)) => {
                self.recv_buf.advance(used);
                message.verify()?;
                Ok(Some(message.body))
            }
            None => Ok(None),
        }
    }
}
