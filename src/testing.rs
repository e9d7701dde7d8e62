//! Test doubles shared by the unit tests

use crate::resource::{BoxError, Resource, ResourceFactory};

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;

/// Connection that records its own closing.
pub(crate) struct TestConn {
    pub id: u64,
    closed: Arc<Mutex<Vec<u64>>>,
}

impl Resource for TestConn {
    fn close(&self) -> Result<(), BoxError> {
        self.closed.lock().push(self.id);
        Ok(())
    }
}

/// Fake backend dialing numbered connections, with switchable failures.
#[derive(Clone)]
pub(crate) struct Backend {
    next: Arc<AtomicU64>,
    fail_after: Arc<AtomicU64>,
    down: Arc<AtomicBool>,
    hanging: Arc<AtomicBool>,
    closed: Arc<Mutex<Vec<u64>>>,
}

impl Default for Backend {
    fn default() -> Self {
        Self {
            next: Arc::new(AtomicU64::new(0)),
            fail_after: Arc::new(AtomicU64::new(u64::MAX)),
            down: Arc::new(AtomicBool::new(false)),
            hanging: Arc::new(AtomicBool::new(false)),
            closed: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl Backend {
    /// Refuse every dial once `count` connections were created.
    pub fn failing_after(self, count: u64) -> Self {
        self.fail_after.store(count, Ordering::SeqCst);
        self
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    /// Make dials wait for cancellation, then fail.
    pub fn set_hanging(&self, hanging: bool) {
        self.hanging.store(hanging, Ordering::SeqCst);
    }

    pub fn created(&self) -> u64 {
        self.next.load(Ordering::SeqCst)
    }

    /// Ids of closed connections, sorted.
    pub fn closed_ids(&self) -> Vec<u64> {
        let mut ids = self.closed.lock().clone();
        ids.sort_unstable();
        ids
    }
}

#[async_trait]
impl ResourceFactory for Backend {
    type Resource = TestConn;

    async fn create(&self, cancel: &CancellationToken) -> Result<TestConn, BoxError> {
        if self.hanging.load(Ordering::SeqCst) {
            cancel.cancelled().await;
        }
        if cancel.is_cancelled() {
            return Err("dial cancelled".into());
        }
        if self.down.load(Ordering::SeqCst) || self.created() >= self.fail_after.load(Ordering::SeqCst) {
            return Err("backend unavailable".into());
        }

        Ok(TestConn {
            id: self.next.fetch_add(1, Ordering::SeqCst),
            closed: Arc::clone(&self.closed),
        })
    }
}
