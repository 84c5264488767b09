//! Outbound side of a tunnel: adapters, the factories that build them and
//! the registry the rule engine resolves factory ids against.

mod core;
mod direct;
mod http;
mod manager;
pub mod transport;
mod vmess;

pub use crate::core::AdapterCore;
pub use crate::direct::{DirectAdapter, DirectAdapterFactory};
pub use crate::http::{HttpAdapter, HttpAdapterFactory, HttpProxyServer};
pub use crate::manager::{AdapterFactoryManager, DIRECT_ADAPTER_ID};
pub use crate::vmess::{VmessAdapter, VmessAdapterFactory, VmessServer};

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use error::{Error, Result};
use rk_common::Session;

/// What an adapter reports back to the tunnel owning it.
#[derive(Debug)]
pub enum AdapterEvent {
    Connected,
    Read(Bytes),
    Wrote(usize),
    Closed(Option<Error>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    Connecting,
    Connected,
    Forwarding,
    Closing,
    Closed,
}

/// One outbound connection. The adapter owns its transport exclusively.
#[async_trait]
pub trait AdapterSocket: Send {
    fn kind(&self) -> &'static str;

    fn state(&self) -> AdapterState;

    /// Connect and run any protocol handshake. Success queues `Connected`.
    async fn open(&mut self, session: &Session) -> Result<()>;

    async fn write(&mut self, data: Bytes) -> Result<()>;

    /// Next event; `Closed` is reported once and again on every later call.
    async fn next_event(&mut self) -> AdapterEvent;

    /// Graceful close after queued writes are flushed.
    async fn disconnect(&mut self, error: Option<Error>);

    fn force_disconnect(&mut self, error: Option<Error>);
}

pub trait AdapterFactory: Send + Sync {
    fn kind(&self) -> &'static str;

    fn adapter_for(&self, session: &Session) -> Box<dyn AdapterSocket>;
}

pub type AdapterFactoryRef = Arc<dyn AdapterFactory>;
