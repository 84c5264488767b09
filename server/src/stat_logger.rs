use rk_common::stat::StatData;
use tokio::sync::{broadcast::Receiver, mpsc};
use tracing::{error, info};

/// Fans every subscribed stat stream into the log.
#[derive(Debug, Default)]
pub struct StatLogger {
    subscribes: Vec<Receiver<StatData>>,
}

impl StatLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_subscribe(&mut self, subscribe: Receiver<StatData>) {
        self.subscribes.push(subscribe);
    }

    pub async fn run(&mut self) {
        let (tx, mut rx) = mpsc::unbounded_channel::<StatData>();
        // listen all subscription
        for subscribe in self.subscribes.iter_mut() {
            let tx = tx.clone();
            let mut subscribe = subscribe.resubscribe();
            tokio::spawn(async move {
                loop {
                    match subscribe.recv().await {
                        Ok(stat) => {
                            if let Err(e) = tx.send(stat) {
                                error!("forward stat error: {}", e);
                                break;
                            }
                        }
                        Err(e) => {
                            error!("receive stat error: {}", e);
                            break;
                        }
                    }
                }
            });
        }
        drop(tx);

        while let Some(stat) = rx.recv().await {
            info!("[stat] {} @{}: {}", stat.stat_type, stat.timestamp, stat.data);
        }
    }
}
