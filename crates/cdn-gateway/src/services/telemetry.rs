//! Bounded fire-and-forget counter updates.
//!
//! Each update is spawned on the runtime while holding a semaphore permit.
//! When every permit is taken the update is dropped and counted, so a slow
//! persistence layer can never pile up unbounded tasks behind CDN traffic.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::metrics;

/// Task labels used in logs and the dropped-task metric.
pub mod tasks {
    pub const ACCESS_COUNT: &str = "access_count";
    pub const DOWNLOAD_COUNT: &str = "download_count";
    pub const CACHE_HIT: &str = "cache_hit";
}

#[derive(Clone)]
pub struct TelemetryDispatcher {
    permits: Arc<Semaphore>,
    max_in_flight: u32,
    timeout: Duration,
}

impl TelemetryDispatcher {
    pub fn new(max_in_flight: usize, timeout: Duration) -> Self {
        let max_in_flight = u32::try_from(max_in_flight.max(1)).unwrap_or(u32::MAX);
        Self {
            permits: Arc::new(Semaphore::new(max_in_flight as usize)),
            max_in_flight,
            timeout,
        }
    }

    /// Spawn `update` in the background. Returns `false` when it was dropped
    /// because the in-flight cap was reached.
    pub fn dispatch<F, E>(&self, task: &'static str, update: F) -> bool
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: Display,
    {
        let permit = match Arc::clone(&self.permits).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                metrics::record_telemetry_dropped(task);
                debug!(task, "Telemetry cap reached, dropping update");
                return false;
            }
        };

        let timeout = self.timeout;
        tokio::spawn(async move {
            let _permit = permit;
            match tokio::time::timeout(timeout, update).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!(task, error = %e, "Telemetry update failed"),
                Err(_) => warn!(
                    task,
                    timeout_ms = timeout.as_millis() as u64,
                    "Telemetry update timed out"
                ),
            }
        });
        true
    }

    /// Updates currently running.
    pub fn in_flight(&self) -> usize {
        self.max_in_flight as usize - self.permits.available_permits()
    }

    /// Wait up to `wait` for every in-flight update to finish.
    pub async fn drain(&self, wait: Duration) -> bool {
        let in_flight = self.in_flight();
        match tokio::time::timeout(wait, self.permits.acquire_many(self.max_in_flight)).await {
            Ok(Ok(_all)) => {
                debug!(drained = in_flight, "Telemetry drained");
                true
            }
            Ok(Err(_)) => false,
            Err(_) => {
                warn!(remaining = self.in_flight(), "Telemetry drain timed out");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_dispatch_runs_update() {
        let dispatcher = TelemetryDispatcher::new(4, Duration::from_secs(1));
        let ran = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&ran);
        assert!(dispatcher.dispatch(tasks::ACCESS_COUNT, async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<(), String>(())
        }));

        assert!(dispatcher.drain(Duration::from_secs(1)).await);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_drops_when_cap_reached() {
        let dispatcher = TelemetryDispatcher::new(1, Duration::from_secs(5));
        let (release, wait) = oneshot::channel::<()>();

        assert!(dispatcher.dispatch(tasks::DOWNLOAD_COUNT, async move {
            let _ = wait.await;
            Ok::<(), String>(())
        }));
        assert_eq!(dispatcher.in_flight(), 1);
        assert!(!dispatcher.dispatch(tasks::DOWNLOAD_COUNT, async { Ok::<(), String>(()) }));

        release.send(()).unwrap();
        assert!(dispatcher.drain(Duration::from_secs(1)).await);
        assert_eq!(dispatcher.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_failures_and_timeouts_are_contained() {
        let dispatcher = TelemetryDispatcher::new(4, Duration::from_millis(20));

        dispatcher.dispatch(tasks::CACHE_HIT, async { Err::<(), _>("boom") });
        dispatcher.dispatch(tasks::CACHE_HIT, async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<(), String>(())
        });

        // The slow update is abandoned at its timeout, freeing its permit
        assert!(dispatcher.drain(Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn test_drain_times_out_on_stuck_update() {
        let dispatcher = TelemetryDispatcher::new(2, Duration::from_secs(30));
        let (_keep, wait) = oneshot::channel::<()>();
        dispatcher.dispatch(tasks::ACCESS_COUNT, async move {
            let _ = wait.await;
            Ok::<(), String>(())
        });

        assert!(!dispatcher.drain(Duration::from_millis(20)).await);
    }
}
