// Minute-boundary driver: wakes the scheduling pass at every wall-clock minute

use super::engine::{PassOutcome, SchedulingPass};
use crate::cursor::minute_floor;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::sleep;
use tracing::{error, info, instrument};

/// Time left until the next minute boundary after `now`
///
/// Exactly on a boundary, this is a full minute: a pass that finished in the
/// same instant it started must not run again immediately.
pub fn delay_until_next_minute(now: DateTime<Utc>) -> Duration {
    let next = minute_floor(now) + ChronoDuration::minutes(1);
    (next - now).to_std().unwrap_or(Duration::ZERO)
}

pub struct MinuteDriver {
    pass: Arc<dyn SchedulingPass>,
    shutdown_tx: broadcast::Sender<()>,
}

impl MinuteDriver {
    pub fn new(pass: Arc<dyn SchedulingPass>) -> Self {
        let (shutdown_tx, _shutdown_rx) = broadcast::channel(1);
        Self { pass, shutdown_tx }
    }

    /// Run one pass and report its result; never fails
    pub async fn tick(&self, now: DateTime<Utc>) {
        match self.pass.run_pass(now).await {
            Ok(PassOutcome::Completed(summary)) if summary.enqueued > 0 => {
                info!(
                    enqueued = summary.enqueued,
                    window = %summary.window,
                    "Cron jobs dispatched"
                );
            }
            Ok(_) => {}
            Err(e) => {
                error!(error = %e, "Cron scheduling error");
            }
        }
    }

    /// Loop until `stop` is called
    ///
    /// Stop is only observed while waiting for the next boundary, so a pass
    /// that has started always runs to its commit. Minutes slept through are
    /// not replayed here; the next pass's window covers them.
    #[instrument(skip(self))]
    pub async fn start(&self) {
        info!("Starting minute driver");
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            let delay = delay_until_next_minute(Utc::now());
            tokio::select! {
                _ = sleep(delay) => {
                    self.tick(Utc::now()).await;
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received, stopping minute driver");
                    break;
                }
            }
        }

        info!("Minute driver stopped");
    }

    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{SchedulerError, StorageError};
    use crate::scheduler::engine::MockSchedulingPass;
    use chrono::TimeZone;

    #[test]
    fn test_delay_until_next_minute() {
        let base = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
        assert_eq!(delay_until_next_minute(base), Duration::from_secs(60));
        assert_eq!(
            delay_until_next_minute(base + ChronoDuration::seconds(45)),
            Duration::from_secs(15)
        );
        assert_eq!(
            delay_until_next_minute(base + ChronoDuration::milliseconds(59_999)),
            Duration::from_millis(1)
        );
    }

    #[tokio::test]
    async fn test_tick_swallows_pass_errors() {
        let mut pass = MockSchedulingPass::new();
        pass.expect_run_pass().times(2).returning(|_| {
            Err(SchedulerError::LockFailed(StorageError::ConnectionFailed(
                "refused".into(),
            )))
        });
        let driver = MinuteDriver::new(Arc::new(pass));

        driver.tick(Utc::now()).await;
        driver.tick(Utc::now()).await;
    }

    #[tokio::test]
    async fn test_stop_ends_loop() {
        let mut pass = MockSchedulingPass::new();
        pass.expect_run_pass().returning(|_| Ok(PassOutcome::NotLeader));
        let driver = Arc::new(MinuteDriver::new(Arc::new(pass)));

        let running = driver.clone();
        let handle = tokio::spawn(async move { running.start().await });

        // Let the loop subscribe before signalling
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        driver.stop();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("driver should stop")
            .unwrap();
    }
}
