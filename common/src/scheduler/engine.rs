// Scheduling pass: one leader-guarded evaluation of the cron registry over
// the minutes since the last committed cursor

use crate::cursor::{cursor_instant, ScheduleWindow, MAX_CATCHUP_SECONDS};
use crate::errors::SchedulerError;
use crate::keys::KeySpace;
use crate::lock::LeaderLock;
use crate::models::CronDefinition;
use crate::registry::CronRegistry;
use crate::store::{CommitBatch, CoordinationStore, ListPush};
use crate::telemetry::{self, PassOutcomeLabel};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use chrono_tz::Tz;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Configuration for the scheduling pass
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// TTL of the leader lock (in seconds)
    pub lock_ttl_seconds: u64,
    /// Longest span of missed minutes replayed after downtime (in seconds);
    /// also the TTL of the schedule cursor
    pub max_catchup_seconds: u64,
    /// Timezone the cron fields are evaluated in
    pub timezone: Tz,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            lock_ttl_seconds: 90,
            max_catchup_seconds: 24 * 60 * 60,
            timezone: chrono_tz::UTC,
        }
    }
}

/// What a pass did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// Another process holds the leader lock; nothing was read or written
    NotLeader,
    Completed(PassSummary),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassSummary {
    pub window: ScheduleWindow,
    /// Definitions that matched at least one minute of the window
    pub matched: usize,
    /// Task payloads pushed onto pending lists
    pub enqueued: usize,
    pub catch_up: bool,
}

/// One unit of work the minute driver runs at every boundary
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SchedulingPass: Send + Sync {
    async fn run_pass(&self, now: DateTime<Utc>) -> Result<PassOutcome, SchedulerError>;
}

/// Dispatches matching cron definitions onto their pending lists
pub struct CronDispatcher {
    config: SchedulerConfig,
    store: Arc<dyn CoordinationStore>,
    registry: CronRegistry,
    lock: LeaderLock,
    keys: KeySpace,
}

impl CronDispatcher {
    pub fn new(
        config: SchedulerConfig,
        store: Arc<dyn CoordinationStore>,
        keys: KeySpace,
        identity: impl Into<String>,
    ) -> Self {
        let lock = LeaderLock::new(
            keys.lock(),
            identity,
            Duration::from_secs(config.lock_ttl_seconds),
        );
        let registry = CronRegistry::new(store.clone(), keys.clone());

        Self {
            config,
            store,
            registry,
            lock,
            keys,
        }
    }

    pub fn identity(&self) -> &str {
        self.lock.identity()
    }

    /// Catch-up bound in seconds, capped so it always fits a chrono duration
    fn max_catchup_seconds(&self) -> u64 {
        self.config.max_catchup_seconds.min(MAX_CATCHUP_SECONDS)
    }

    fn max_catchup(&self) -> ChronoDuration {
        i64::try_from(self.max_catchup_seconds())
            .ok()
            .and_then(ChronoDuration::try_seconds)
            .unwrap_or(ChronoDuration::MAX)
    }

    /// Definitions to dispatch this pass, each with the latest minute it
    /// matched. A definition matching several minutes appears once.
    pub fn select_due(
        &self,
        crons: &BTreeMap<String, CronDefinition>,
        window: &ScheduleWindow,
    ) -> BTreeMap<String, DateTime<Utc>> {
        let mut due = BTreeMap::new();
        for minute in window.minutes() {
            let local = minute.with_timezone(&self.config.timezone);
            for (name, cron) in crons {
                if cron.matches(&local) {
                    due.insert(name.clone(), minute);
                }
            }
        }
        due
    }

    async fn pass(&self, now: DateTime<Utc>) -> Result<PassOutcome, SchedulerError> {
        if !self
            .lock
            .try_acquire_or_confirm(self.store.as_ref())
            .await
            .map_err(SchedulerError::LockFailed)?
        {
            return Ok(PassOutcome::NotLeader);
        }

        let cursor_key = self.keys.schedule_cursor();
        let stored = self
            .store
            .get(&cursor_key)
            .await
            .map_err(SchedulerError::CursorReadFailed)?;
        let window = ScheduleWindow::compute(cursor_instant(stored.as_deref()), now, self.max_catchup());

        let crons = self.registry.list_active().await;

        if window.is_catch_up() {
            warn!(
                start = %window.start.to_rfc3339(),
                end = %window.end.to_rfc3339(),
                minutes = window.minute_count(),
                "Cron is catching up, scheduling missed minutes"
            );
            telemetry::record_catch_up(window.minute_count());
        }

        let due = self.select_due(&crons, &window);

        let mut pushes = Vec::new();
        for (name, scheduled_for) in &due {
            let Some(cron) = crons.get(name) else {
                continue;
            };
            if !cron.has_queue() {
                info!(
                    cron_name = %name,
                    command = %cron.command_line(),
                    "Cron matched but has no queue, not dispatched"
                );
                continue;
            }

            info!(
                cron_name = %name,
                queue = %cron.queue,
                command = %cron.command_line(),
                "Scheduling job"
            );
            telemetry::record_job_scheduled(name, &cron.queue);
            pushes.push(ListPush {
                list: self.keys.pending_list(&cron.queue),
                payload: cron.task(*scheduled_for).to_json()?,
            });
        }

        let enqueued = pushes.len();
        let batch = CommitBatch {
            pushes,
            cursor_key,
            cursor_value: window.end.timestamp(),
            cursor_ttl: Duration::from_secs(self.max_catchup_seconds()),
            lock_key: self.lock.key().to_string(),
            lock_ttl: self.lock.ttl(),
        };
        self.store
            .commit(&batch)
            .await
            .map_err(SchedulerError::CommitFailed)?;

        Ok(PassOutcome::Completed(PassSummary {
            window,
            matched: due.len(),
            enqueued,
            catch_up: window.is_catch_up(),
        }))
    }
}

#[async_trait]
impl SchedulingPass for CronDispatcher {
    /// Run one scheduling pass at `now`
    ///
    /// Errors before the commit leave the store untouched. A commit error may
    /// leave some jobs enqueued with the cursor not advanced, so the next pass
    /// dispatches them again; jobs are never dropped inside the catch-up bound.
    #[instrument(skip(self), fields(identity = %self.lock.identity()))]
    async fn run_pass(&self, now: DateTime<Utc>) -> Result<PassOutcome, SchedulerError> {
        let result = self.pass(now).await;

        match &result {
            Ok(PassOutcome::NotLeader) => {
                debug!("Not the leader, skipping pass");
                telemetry::record_pass(PassOutcomeLabel::NotLeader);
            }
            Ok(PassOutcome::Completed(summary)) => {
                debug!(
                    window = %summary.window,
                    matched = summary.matched,
                    enqueued = summary.enqueued,
                    "Scheduling pass completed"
                );
                telemetry::record_pass(PassOutcomeLabel::Completed);
            }
            Err(_) => telemetry::record_pass(PassOutcomeLabel::Failed),
        }

        result
    }
}
