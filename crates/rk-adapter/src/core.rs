use std::collections::VecDeque;

use bytes::Bytes;
use error::{Error, Result};
use tracing::{debug, warn};

use crate::transport::RawTransport;
use crate::{AdapterEvent, AdapterState};

/// Bookkeeping every adapter shares: the transport, the state and the
/// events waiting to be handed to the tunnel.
pub struct AdapterCore {
    transport: Box<dyn RawTransport>,
    state: AdapterState,
    events: VecDeque<AdapterEvent>,
}

impl AdapterCore {
    pub fn new(transport: Box<dyn RawTransport>) -> Self {
        Self {
            transport,
            state: AdapterState::Connecting,
            events: VecDeque::new(),
        }
    }

    pub fn state(&self) -> AdapterState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, AdapterState::Closing | AdapterState::Closed)
    }

    pub async fn connect(&mut self, host: &str, port: u16) -> Result<()> {
        self.state = AdapterState::Connecting;
        if let Err(e) = self.transport.connect(host, port).await {
            self.transport.force_disconnect();
            self.state = AdapterState::Closed;
            return Err(e);
        }
        Ok(())
    }

    /// Handshake traffic: written before `Connected`, not reported.
    pub async fn send_raw(&mut self, raw: &[u8]) -> Result<()> {
        self.transport.write(raw).await
    }

    /// Handshake traffic read before `Connected`.
    pub async fn recv_raw(&mut self) -> Result<Option<Bytes>> {
        self.transport.read().await
    }

    pub fn did_connect(&mut self) {
        self.state = AdapterState::Connected;
        self.events.push_back(AdapterEvent::Connected);
    }

    pub fn did_read(&mut self, data: Bytes) {
        self.state = AdapterState::Forwarding;
        self.events.push_back(AdapterEvent::Read(data));
    }

    /// Write already framed bytes and queue `Wrote(payload_len)`.
    pub async fn write(&mut self, raw: &[u8], payload_len: usize) -> Result<()> {
        if self.is_closed() {
            return Err(Error::AdapterClosed);
        }
        if let Err(e) = self.transport.write(raw).await {
            self.transport.force_disconnect();
            self.close(None);
            return Err(e);
        }
        self.state = AdapterState::Forwarding;
        self.events.push_back(AdapterEvent::Wrote(payload_len));
        Ok(())
    }

    /// Queued events first, then reads from the transport until `decode`
    /// yields something. An empty decoded chunk marks the peer's end of
    /// stream. After the `Closed` event every call answers `Closed(None)`.
    pub async fn next_event<D>(&mut self, mut decode: D) -> AdapterEvent
    where
        D: FnMut(Bytes) -> Result<Vec<Bytes>> + Send,
    {
        loop {
            if let Some(event) = self.events.pop_front() {
                return event;
            }
            if self.state == AdapterState::Closed {
                return AdapterEvent::Closed(None);
            }
            match self.transport.read().await {
                Ok(Some(raw)) => match decode(raw) {
                    Ok(chunks) => {
                        for chunk in chunks {
                            if chunk.is_empty() {
                                self.close(None);
                                break;
                            }
                            self.did_read(chunk);
                        }
                    }
                    Err(e) => self.force_disconnect(Some(e)),
                },
                Ok(None) => {
                    debug!("peer closed the connection");
                    self.close(None);
                }
                Err(e) => self.force_disconnect(Some(e)),
            }
        }
    }

    /// Enter `Closed` and queue the one `Closed` event.
    fn close(&mut self, error: Option<Error>) {
        if self.state == AdapterState::Closed {
            return;
        }
        if let Some(e) = &error {
            warn!("adapter closed with error: {}", e);
        }
        self.state = AdapterState::Closed;
        self.events.push_back(AdapterEvent::Closed(error));
    }

    pub async fn disconnect(&mut self, error: Option<Error>) {
        if self.state == AdapterState::Closed {
            return;
        }
        self.state = AdapterState::Closing;
        if let Err(e) = self.transport.disconnect().await {
            debug!("graceful disconnect failed: {}", e);
        }
        self.transport.force_disconnect();
        self.close(error);
    }

    pub fn force_disconnect(&mut self, error: Option<Error>) {
        self.transport.force_disconnect();
        self.close(error);
    }
}
