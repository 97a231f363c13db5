use std::future::Future;
use std::ops::ControlFlow;
use std::time::Duration;

use assessment_api::ApiError;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// A spawned delayed or periodic task owned by whoever holds this handle.
///
/// Dropping the handle aborts the task, so a timer never outlives the session
/// component that owns it.
#[derive(Debug)]
pub struct Timer {
    handle: JoinHandle<()>,
}

impl Timer {
    /// Run `task` once after `delay`.
    pub fn after<F>(delay: Duration, task: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        });
        Self { handle }
    }

    /// Call `tick` every `period`, first after one full period, until it
    /// returns `ControlFlow::Break`.
    pub fn every<F>(period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> ControlFlow<()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Burst);
            loop {
                interval.tick().await;
                if tick().is_break() {
                    break;
                }
            }
        });
        Self { handle }
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Await an API call with an upper bound so a hung request cannot leave the
/// caller waiting forever.
pub(crate) async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, ApiError>
where
    F: Future<Output = Result<T, ApiError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(ApiError::Timeout),
    }
}
