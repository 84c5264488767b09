use aes::Aes128;
use md5::{Digest, Md5};

pub(crate) type Aes128CfbEnc = cfb_mode::Encryptor<Aes128>;
pub(crate) type Aes128CfbBufEnc = cfb_mode::BufEncryptor<Aes128>;
pub(crate) type Aes128CfbBufDec = cfb_mode::BufDecryptor<Aes128>;

pub(crate) fn md5(parts: &[&[u8]]) -> [u8; 16] {
    let mut hasher = Md5::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}
