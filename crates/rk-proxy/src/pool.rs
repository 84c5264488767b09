use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rk_common::TunnelId;
use rk_stat::{StatEvent, TunnelEvent};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info};

use crate::activity::Activity;

/// Eviction only starts once more tunnels than this are alive.
const MIN_TUNNELS_TO_RECYCLE: usize = 2;

/// What the pool keeps of a live tunnel.
#[derive(Debug, Clone)]
pub struct TunnelHandle {
    id: TunnelId,
    activity: Arc<Activity>,
    shutdown: broadcast::Sender<()>,
}

impl TunnelHandle {
    pub fn new(id: TunnelId, activity: Arc<Activity>, shutdown: broadcast::Sender<()>) -> Self {
        Self { id, activity, shutdown }
    }

    pub fn id(&self) -> TunnelId {
        self.id
    }

    pub fn last_active(&self) -> Instant {
        self.activity.last_active()
    }

    fn force_close(&self) {
        // the tunnel may already be gone
        let _ = self.shutdown.send(());
    }
}

/// The live set. Only the pool task touches it.
#[derive(Debug, Default)]
pub(crate) struct TunnelSet {
    tunnels: HashMap<TunnelId, TunnelHandle>,
}

impl TunnelSet {
    pub(crate) fn insert(&mut self, handle: TunnelHandle) {
        self.tunnels.insert(handle.id, handle);
    }

    pub(crate) fn remove(&mut self, id: TunnelId) -> Option<TunnelHandle> {
        self.tunnels.remove(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.tunnels.len()
    }

    /// The least recently active tunnel idle for longer than `cutoff`.
    pub(crate) fn recycle_candidate(&self, now: Instant, cutoff: Duration, except: Option<TunnelId>) -> Option<TunnelId> {
        if self.tunnels.len() <= MIN_TUNNELS_TO_RECYCLE {
            return None;
        }
        self.tunnels
            .values()
            .filter(|h| Some(h.id) != except)
            .map(|h| (h.id, h.last_active()))
            .filter(|(_, last)| now.saturating_duration_since(*last) > cutoff)
            .min_by_key(|(_, last)| *last)
            .map(|(id, _)| id)
    }

    /// Force close and drop at most one tunnel.
    pub(crate) fn recycle(&mut self, now: Instant, cutoff: Duration, except: Option<TunnelId>) -> Option<TunnelId> {
        let id = self.recycle_candidate(now, cutoff, except)?;
        let handle = self.remove(id)?;
        handle.force_close();
        Some(id)
    }

    pub(crate) fn earliest_active(&self) -> Option<Instant> {
        self.tunnels.values().map(|h| h.last_active()).min()
    }

    /// Force close everything.
    pub(crate) fn stop(&mut self) -> usize {
        let count = self.tunnels.len();
        for (_, handle) in self.tunnels.drain() {
            handle.force_close();
        }
        count
    }
}

enum PoolCommand {
    Register(TunnelHandle),
    Closed(TunnelId),
    Recycle {
        except: Option<TunnelId>,
        reply: oneshot::Sender<Option<TunnelId>>,
    },
    EarliestActive(oneshot::Sender<Option<Instant>>),
    Count(oneshot::Sender<usize>),
    Stop(oneshot::Sender<usize>),
}

/// Handle to the task owning the live tunnel set. Every mutation goes
/// through its channel, so they are applied one at a time.
#[derive(Clone)]
pub struct TunnelPool {
    tx: mpsc::UnboundedSender<PoolCommand>,
    next_id: Arc<AtomicU64>,
}

impl TunnelPool {
    /// Spawn the pool task on the current runtime.
    pub fn spawn(idle_cutoff: Duration, stat_sender: mpsc::UnboundedSender<StatEvent>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_pool(rx, idle_cutoff, stat_sender));
        Self {
            tx,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn next_id(&self) -> TunnelId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn register(&self, handle: TunnelHandle) {
        self.send(PoolCommand::Register(handle));
    }

    pub fn closed(&self, id: TunnelId) {
        self.send(PoolCommand::Closed(id));
    }

    /// Evict the least recently active tunnel, if any qualifies.
    pub async fn recycle(&self) -> Option<TunnelId> {
        self.recycle_inner(None).await
    }

    /// Same as [`TunnelPool::recycle`] but never picks `id`.
    pub async fn recycle_except(&self, id: TunnelId) -> Option<TunnelId> {
        self.recycle_inner(Some(id)).await
    }

    async fn recycle_inner(&self, except: Option<TunnelId>) -> Option<TunnelId> {
        let (reply, rx) = oneshot::channel();
        self.send(PoolCommand::Recycle { except, reply });
        rx.await.ok().flatten()
    }

    pub async fn earliest_active(&self) -> Option<Instant> {
        let (reply, rx) = oneshot::channel();
        self.send(PoolCommand::EarliestActive(reply));
        rx.await.ok().flatten()
    }

    pub async fn count(&self) -> usize {
        let (reply, rx) = oneshot::channel();
        self.send(PoolCommand::Count(reply));
        rx.await.unwrap_or_default()
    }

    /// Force close every live tunnel; returns how many there were.
    pub async fn stop(&self) -> usize {
        let (reply, rx) = oneshot::channel();
        self.send(PoolCommand::Stop(reply));
        rx.await.unwrap_or_default()
    }

    fn send(&self, command: PoolCommand) {
        if self.tx.send(command).is_err() {
            error!("tunnel pool is gone");
        }
    }
}

async fn run_pool(
    mut rx: mpsc::UnboundedReceiver<PoolCommand>,
    idle_cutoff: Duration,
    stat_sender: mpsc::UnboundedSender<StatEvent>,
) {
    let mut set = TunnelSet::default();
    while let Some(command) = rx.recv().await {
        match command {
            PoolCommand::Register(handle) => {
                debug!("tunnel {} registered", handle.id);
                set.insert(handle);
            }
            PoolCommand::Closed(id) => {
                set.remove(id);
            }
            PoolCommand::Recycle { except, reply } => {
                let evicted = set.recycle(Instant::now(), idle_cutoff, except);
                if let Some(id) = evicted {
                    info!("recycled tunnel {}, {} left", id, set.len());
                    let _ = stat_sender.send(StatEvent::Tunnel(TunnelEvent::Evicted));
                }
                let _ = reply.send(evicted);
            }
            PoolCommand::EarliestActive(reply) => {
                let _ = reply.send(set.earliest_active());
            }
            PoolCommand::Count(reply) => {
                let _ = reply.send(set.len());
            }
            PoolCommand::Stop(reply) => {
                let count = set.stop();
                info!("stop tunnel pool, closed {} tunnels", count);
                let _ = reply.send(count);
            }
        }
    }
    debug!("tunnel pool exit");
}
