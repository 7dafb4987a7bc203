//! Per-task bounded admission
//!
//! Pools are keyed by task identity. A request either takes a running slot
//! immediately or parks on a per-request gate; completions hand freed slots
//! to the oldest queued gates in FIFO order. Pool entries are created lazily
//! and removed once nothing is running or queued.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

#[derive(Default)]
pub struct ProcessPools {
    inner: Mutex<HashMap<String, PoolState>>,
}

struct PoolState {
    capacity: usize,
    running: usize,
    queue: VecDeque<oneshot::Sender<()>>,
}

impl ProcessPools {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admits one invocation of `key`, blocking while the pool is full.
    ///
    /// The returned permit releases its slot on drop.
    pub async fn acquire(self: &Arc<Self>, key: &str, capacity: usize) -> PoolPermit {
        let gate = {
            let mut pools = self.inner.lock().expect("pool registry lock");
            let state = pools.entry(key.to_string()).or_insert_with(|| PoolState {
                capacity: capacity.max(1),
                running: 0,
                queue: VecDeque::new(),
            });
            if state.running < state.capacity {
                state.running += 1;
                None
            } else {
                let (tx, rx) = oneshot::channel();
                state.queue.push_back(tx);
                Some(rx)
            }
        };

        if let Some(rx) = gate {
            // parked until a completion hands this request a slot
            let _ = rx.await;
        }

        PoolPermit {
            pools: Arc::clone(self),
            key: key.to_string(),
        }
    }

    fn release(&self, key: &str) {
        let mut pools = self.inner.lock().expect("pool registry lock");
        let Some(state) = pools.get_mut(key) else {
            return;
        };
        state.running = state.running.saturating_sub(1);
        while state.running < state.capacity {
            match state.queue.pop_front() {
                // a gate whose requester gave up just frees the slot for the
                // next one in line
                Some(gate) => {
                    if gate.send(()).is_ok() {
                        state.running += 1;
                    }
                }
                None => break,
            }
        }
        if state.running == 0 && state.queue.is_empty() {
            pools.remove(key);
        }
    }

    /// Currently running invocations of `key`.
    pub fn running(&self, key: &str) -> usize {
        self.inner
            .lock()
            .expect("pool registry lock")
            .get(key)
            .map(|s| s.running)
            .unwrap_or(0)
    }

    /// Requests of `key` parked in the queue.
    pub fn queued(&self, key: &str) -> usize {
        self.inner
            .lock()
            .expect("pool registry lock")
            .get(key)
            .map(|s| s.queue.len())
            .unwrap_or(0)
    }

    /// True when no pool entry is live.
    pub fn is_idle(&self) -> bool {
        self.inner.lock().expect("pool registry lock").is_empty()
    }
}

/// One admitted slot in a bounded pool.
pub struct PoolPermit {
    pools: Arc<ProcessPools>,
    key: String,
}

impl Drop for PoolPermit {
    fn drop(&mut self) {
        self.pools.release(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::sleep;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_at_most_capacity_run_concurrently() {
        let pools = Arc::new(ProcessPools::new());
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let pools = Arc::clone(&pools);
            let current = Arc::clone(&current);
            let peak = Arc::clone(&peak);
            tasks.push(tokio::spawn(async move {
                let _permit = pools.acquire("crunch", 3).await;
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                sleep(Duration::from_millis(30)).await;
                current.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 3);
        assert!(pools.is_idle());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_queued_requests_release_in_fifo_order() {
        let pools = Arc::new(ProcessPools::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        let first = pools.acquire("serial", 1).await;
        assert_eq!(pools.running("serial"), 1);

        let mut tasks = Vec::new();
        for i in 0..4 {
            let pools = Arc::clone(&pools);
            let order = Arc::clone(&order);
            tasks.push(tokio::spawn(async move {
                let _permit = pools.acquire("serial", 1).await;
                order.lock().unwrap().push(i);
            }));
            // let each request enqueue before the next one arrives
            sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(pools.queued("serial"), 4);

        drop(first);
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
        assert!(pools.is_idle());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_abandoned_gate_frees_the_slot_for_the_next_waiter() {
        let pools = Arc::new(ProcessPools::new());

        let first = pools.acquire("flaky", 1).await;

        let abandoned = {
            let pools = Arc::clone(&pools);
            tokio::spawn(async move {
                let _permit = pools.acquire("flaky", 1).await;
            })
        };
        sleep(Duration::from_millis(20)).await;
        abandoned.abort();
        let _ = abandoned.await;

        let survivor = {
            let pools = Arc::clone(&pools);
            tokio::spawn(async move {
                let _permit = pools.acquire("flaky", 1).await;
                true
            })
        };
        sleep(Duration::from_millis(20)).await;

        drop(first);
        assert!(survivor.await.unwrap());
        assert!(pools.is_idle());
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_share_slots() {
        let pools = Arc::new(ProcessPools::new());
        let _a = pools.acquire("a", 1).await;
        let _b = pools.acquire("b", 1).await;
        assert_eq!(pools.running("a"), 1);
        assert_eq!(pools.running("b"), 1);
    }
}
