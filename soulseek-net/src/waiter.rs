use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::interval;

/// Identifies a family of waits a caller can block on — e.g. "a
/// `GetPeerAddressResponse` for this username" (§4.4 `WaitKey`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WaitKey {
    pub namespace: &'static str,
    pub discriminator: String,
}

impl WaitKey {
    pub fn new(namespace: &'static str, discriminator: impl Into<String>) -> Self {
        Self {
            namespace,
            discriminator: discriminator.into(),
        }
    }
}

const MONITOR_TICK: Duration = Duration::from_millis(500);

struct PendingWait<T> {
    tx: oneshot::Sender<Result<T, WaitError>>,
    deadline: Option<Instant>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WaitError {
    #[error("wait timed out")]
    TimedOut,
    #[error("wait was cancelled: {0}")]
    Cancelled(String),
}

/// Keyed FIFO queues of pending waits, with a background monitor that
/// expires timed-out entries every 500ms (§4.4). Each queue is drained in
/// arrival order: the first caller to register for a key gets the first
/// value that arrives for it.
pub struct Waiter<T> {
    queues: Mutex<HashMap<WaitKey, VecDeque<PendingWait<T>>>>,
}

impl<T: Send + 'static> Waiter<T> {
    pub fn new() -> std::sync::Arc<Self> {
        let waiter = std::sync::Arc::new(Self {
            queues: Mutex::new(HashMap::new()),
        });
        waiter.clone().spawn_monitor();
        waiter
    }

    /// Registers a wait for `key` that resolves on the next matching
    /// `complete` call, or times out after `timeout`.
    pub async fn wait(self: &std::sync::Arc<Self>, key: WaitKey, timeout: Duration) -> Result<T, WaitError> {
        let (tx, rx) = oneshot::channel();
        let deadline = Some(Instant::now() + timeout);
        self.queues
            .lock()
            .entry(key)
            .or_default()
            .push_back(PendingWait { tx, deadline });
        rx.await.unwrap_or(Err(WaitError::Cancelled("waiter dropped".into())))
    }

    /// Registers a wait for `key` with no timeout; only `complete`,
    /// `cancel`, or `cancel_all` resolve it.
    pub async fn wait_indefinitely(self: &std::sync::Arc<Self>, key: WaitKey) -> Result<T, WaitError> {
        let (tx, rx) = oneshot::channel();
        self.queues
            .lock()
            .entry(key)
            .or_default()
            .push_back(PendingWait { tx, deadline: None });
        rx.await.unwrap_or(Err(WaitError::Cancelled("waiter dropped".into())))
    }

    /// Resolves the oldest pending wait for `key`, if any. Returns `true`
    /// if a waiter was woken.
    pub fn complete(&self, key: &WaitKey, value: T) -> bool {
        let mut queues = self.queues.lock();
        let Some(queue) = queues.get_mut(key) else {
            return false;
        };
        let mut value = Some(value);
        while let Some(pending) = queue.pop_front() {
            match pending.tx.send(Ok(value.take().unwrap())) {
                Ok(()) => {
                    if queue.is_empty() {
                        queues.remove(key);
                    }
                    return true;
                }
                Err(Ok(v)) => {
                    // Receiver already dropped (caller gave up waiting);
                    // try the next one in the queue instead of discarding.
                    value = Some(v);
                }
                Err(Err(_)) => unreachable!(),
            }
        }
        queues.remove(key);
        false
    }

    /// Cancels every pending wait for `key` with the given reason.
    pub fn cancel(&self, key: &WaitKey, reason: impl Into<String>) {
        let reason = reason.into();
        if let Some(queue) = self.queues.lock().remove(key) {
            for pending in queue {
                let _ = pending.tx.send(Err(WaitError::Cancelled(reason.clone())));
            }
        }
    }

    /// Cancels every pending wait across all keys — used on disconnect
    /// (§4.4, §8).
    pub fn cancel_all(&self, reason: impl Into<String>) {
        let reason = reason.into();
        let mut queues = self.queues.lock();
        for (_, queue) in queues.drain() {
            for pending in queue {
                let _ = pending.tx.send(Err(WaitError::Cancelled(reason.clone())));
            }
        }
    }

    pub fn pending_count(&self, key: &WaitKey) -> usize {
        self.queues.lock().get(key).map(|q| q.len()).unwrap_or(0)
    }

    fn spawn_monitor(self: std::sync::Arc<Self>) {
        tokio::spawn(async move {
            let mut tick = interval(MONITOR_TICK);
            loop {
                tick.tick().await;
                let now = Instant::now();
                let mut queues = self.queues.lock();
                queues.retain(|_, queue| {
                    let mut i = 0;
                    while i < queue.len() {
                        let expired = queue[i].deadline.map(|d| now >= d).unwrap_or(false);
                        if expired {
                            let pending = queue.remove(i).unwrap();
                            let _ = pending.tx.send(Err(WaitError::TimedOut));
                        } else {
                            i += 1;
                        }
                    }
                    !queue.is_empty()
                });
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn completes_oldest_waiter_first() {
        let waiter: std::sync::Arc<Waiter<u32>> = Waiter::new();
        let key = WaitKey::new("test", "a");
        let w1 = { let waiter = waiter.clone(); let key = key.clone(); tokio::spawn(async move { waiter.wait(key, Duration::from_secs(5)).await }) };
        tokio::task::yield_now().await;
        waiter.complete(&key, 1);
        assert_eq!(w1.await.unwrap().unwrap(), 1);
    }

    #[tokio::test]
    async fn times_out_after_deadline() {
        let waiter: std::sync::Arc<Waiter<u32>> = Waiter::new();
        let key = WaitKey::new("test", "b");
        let result = waiter.wait(key, Duration::from_millis(10)).await;
        assert_eq!(result, Err(WaitError::TimedOut));
    }

    #[tokio::test]
    async fn cancel_all_resolves_every_pending_wait() {
        let waiter: std::sync::Arc<Waiter<u32>> = Waiter::new();
        let key_a = WaitKey::new("test", "a");
        let key_b = WaitKey::new("test", "b");
        let handle_a = { let waiter = waiter.clone(); let key = key_a.clone(); tokio::spawn(async move { waiter.wait_indefinitely(key).await }) };
        let handle_b = { let waiter = waiter.clone(); let key = key_b.clone(); tokio::spawn(async move { waiter.wait_indefinitely(key).await }) };
        tokio::task::yield_now().await;
        waiter.cancel_all("disconnected");
        assert!(matches!(handle_a.await.unwrap(), Err(WaitError::Cancelled(_))));
        assert!(matches!(handle_b.await.unwrap(), Err(WaitError::Cancelled(_))));
    }
}
