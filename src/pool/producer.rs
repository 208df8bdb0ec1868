use tokio::sync::mpsc;
use tracing::debug;

use super::ResourceUnit;
use crate::shutdown::Shutdown;

/// Produces resource units into a bounded channel until cancelled.
pub struct Producer {
    tx: mpsc::Sender<ResourceUnit>,
    unit_size: usize,
    shutdown: Shutdown,
}

impl Producer {
    pub fn new(tx: mpsc::Sender<ResourceUnit>, unit_size: usize, shutdown: Shutdown) -> Self {
        Self {
            tx,
            unit_size,
            shutdown,
        }
    }

    /// Run until shutdown fires or the consumer goes away.
    ///
    /// Returns the number of units handed to the consumer. A unit is either
    /// delivered or dropped with the cancelled send, never both.
    pub async fn run(mut self) -> u64 {
        let mut delivered = 0u64;

        loop {
            if self.shutdown.is_triggered() {
                break;
            }

            let unit = ResourceUnit::new(delivered, self.unit_size);

            tokio::select! {
                biased;

                _ = self.shutdown.recv() => break,

                res = self.tx.send(unit) => {
                    if res.is_err() {
                        debug!("Consumer dropped, producer exiting after {} units", delivered);
                        break;
                    }
                    delivered += 1;
                }
            }
        }

        debug!("Producer stopped, {} units delivered", delivered);
        delivered
    }
}
