// At most one triggered job runs at a time; triggers that arrive while it
// runs are dropped, not queued.

use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

/// Single-occupancy slot for triggered background work
#[derive(Debug, Clone, Default)]
pub struct TriggerSlot {
    busy: Arc<Mutex<bool>>,
}

struct Release(Arc<Mutex<bool>>);

impl Drop for Release {
    fn drop(&mut self) {
        *self.0.lock() = false;
    }
}

impl TriggerSlot {
    /// Empty slot
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a job is running
    pub fn is_busy(&self) -> bool {
        *self.busy.lock()
    }

    /// Spawn `job` if the slot is free. Returns `None` and drops the job
    /// when another one is still running.
    ///
    /// The slot frees itself when the job finishes, panics or is aborted.
    pub fn try_spawn<F>(&self, job: F) -> Option<JoinHandle<F::Output>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        {
            let mut busy = self.busy.lock();
            if *busy {
                debug!("Trigger ignored; previous request still running");
                return None;
            }
            *busy = true;
        }

        let release = Release(Arc::clone(&self.busy));
        Some(tokio::spawn(async move {
            let _release = release;
            job.await
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_overlapping_trigger_is_dropped() {
        let slot = TriggerSlot::new();
        let (tx, rx) = oneshot::channel::<()>();

        let first = slot
            .try_spawn(async move {
                let _ = rx.await;
                1
            })
            .unwrap();
        assert!(slot.is_busy());
        assert!(slot.try_spawn(async { 2 }).is_none());

        tx.send(()).unwrap();
        assert_eq!(first.await.unwrap(), 1);
        assert!(!slot.is_busy());

        let third = slot.try_spawn(async { 3 }).unwrap();
        assert_eq!(third.await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_panicking_job_frees_slot() {
        let slot = TriggerSlot::new();
        let fail = true;
        let handle = slot
            .try_spawn(async move {
                if fail {
                    panic!("boom");
                }
            })
            .unwrap();
        assert!(handle.await.is_err());
        assert!(!slot.is_busy());
    }
}
