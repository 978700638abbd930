//! Fan-out of snapshots to consumers.
//!
//! The latest snapshot is always available through a watch channel. Streaming
//! subscribers get a bounded inbox; when a slow subscriber falls behind, the
//! oldest undelivered snapshots are dropped.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, watch};

use super::metrics::Snapshot;

pub const DEFAULT_INBOX_CAPACITY: usize = 16;

pub struct Publisher {
    current: watch::Sender<Arc<Snapshot>>,
    stream: Mutex<Option<broadcast::Sender<Arc<Snapshot>>>>,
}

impl Publisher {
    pub fn new(capacity: usize) -> Self {
        let (current, _) = watch::channel(Arc::new(Snapshot::empty()));
        let (stream, _) = broadcast::channel(capacity.max(1));
        Self {
            current,
            stream: Mutex::new(Some(stream)),
        }
    }

    /// Publish a snapshot. Never blocks; returns `false` once closed.
    pub fn publish(&self, snapshot: Arc<Snapshot>) -> bool {
        let stream = self.stream.lock();
        let Some(sender) = stream.as_ref() else {
            return false;
        };
        self.current.send_replace(snapshot.clone());
        // No subscribers is fine
        let _ = sender.send(snapshot);
        true
    }

    pub fn current(&self) -> Arc<Snapshot> {
        self.current.borrow().clone()
    }

    /// Receiver that always holds the latest snapshot
    pub fn watch(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.current.subscribe()
    }

    /// Subscribe to snapshots published from now on
    pub fn subscribe(&self) -> Subscription {
        let receiver = match self.stream.lock().as_ref() {
            Some(sender) => sender.subscribe(),
            None => {
                // Already closed: hand out a stream that ends immediately
                let (sender, receiver) = broadcast::channel(1);
                drop(sender);
                receiver
            }
        };
        Subscription {
            receiver,
            dropped: 0,
        }
    }

    /// Stop publishing. Subscribers drain what is queued, then see the end.
    pub fn close(&self) {
        if self.stream.lock().take().is_some() {
            log::debug!("Publisher closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.stream.lock().is_none()
    }
}

impl Default for Publisher {
    fn default() -> Self {
        Self::new(DEFAULT_INBOX_CAPACITY)
    }
}

pub struct Subscription {
    receiver: broadcast::Receiver<Arc<Snapshot>>,
    dropped: u64,
}

impl Subscription {
    /// Next snapshot, or `None` once the publisher is closed and drained
    pub async fn next(&mut self) -> Option<Arc<Snapshot>> {
        loop {
            match self.receiver.recv().await {
                Ok(snapshot) => return Some(snapshot),
                Err(RecvError::Lagged(skipped)) => self.dropped += skipped,
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`Subscription::next`]
    pub fn try_next(&mut self) -> Option<Arc<Snapshot>> {
        loop {
            match self.receiver.try_recv() {
                Ok(snapshot) => return Some(snapshot),
                Err(TryRecvError::Lagged(skipped)) => self.dropped += skipped,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    /// Snapshots skipped because this subscriber fell behind
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
