//! VMess (legacy AES-128-CFB) client codec.
//!
//! Everything in here is synchronous and buffer-in/buffer-out; the adapter
//! that owns a [`VmessSession`] decides when bytes hit the wire.

mod auth;
mod command;
mod crypto;
mod fnv;
mod request;
mod response;
mod session;

pub use auth::VmessAuth;
pub use command::{Command, Options, SecurityType, VmessCommand};
pub use fnv::fnv1a;
pub use request::{VmessRequest, MAX_CHUNK_LEN};
pub use response::{VmessRespHeader, VmessRespMessage};
pub use session::VmessSession;
