use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

/// A single-slot delayed job: scheduling replaces (and cancels) whatever was pending.
///
/// Cancellation only reaches the delay. Once the delay elapses the job runs on its own task and
/// is never aborted mid-flight.
#[derive(Debug, Default)]
pub(crate) struct DelayedTask {
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl DelayedTask {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn schedule<F>(&self, delay: Duration, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut slot = self.pending.lock();
        if let Some(previous) = slot.take() {
            previous.abort();
        }
        *slot = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            tokio::spawn(job);
        }));
    }

    /// Cancels the pending job. Returns `true` if one was still waiting.
    pub(crate) fn cancel(&self) -> bool {
        match self.pending.lock().take() {
            Some(handle) => {
                let waiting = !handle.is_finished();
                handle.abort();
                waiting
            }
            None => false,
        }
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for DelayedTask {
    fn drop(&mut self) {
        if let Some(handle) = self.pending.get_mut().take() {
            handle.abort();
        }
    }
}
