use chrono::{FixedOffset, NaiveDateTime, Timelike};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use shared::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::dispatcher::{NotificationDispatcher, RecipientResolver};
use crate::repository::ReminderRepository;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchFailure {
    pub reminder_id: Uuid,
    pub error: String,
}

/// Outcome of one scheduler execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    pub slot: NaiveDateTime,
    /// Set when the slot had already been processed and nothing was dispatched.
    pub skipped: bool,
    pub matched: usize,
    pub dispatched: usize,
    pub failed: Vec<DispatchFailure>,
}

impl DispatchSummary {
    fn skipped(slot: NaiveDateTime) -> Self {
        Self {
            slot,
            skipped: true,
            matched: 0,
            dispatched: 0,
            failed: Vec::new(),
        }
    }
}

pub struct SchedulerConfig {
    /// Offset of the wall clock reminder times are expressed in.
    pub utc_offset: FixedOffset,
    pub db_timeout: Duration,
    pub dispatch_concurrency: usize,
}

/// Fires due reminders once per minute slot.
///
/// Executions are serialized: the mutex is held for the whole batch and remembers the last
/// processed slot, so overlapping or repeated runs within one minute dispatch nothing extra.
/// Missed minutes are not replayed.
pub struct ReminderScheduler {
    repo: Arc<dyn ReminderRepository>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    resolver: Arc<dyn RecipientResolver>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
    last_slot: Mutex<Option<NaiveDateTime>>,
}

impl ReminderScheduler {
    pub fn new(
        repo: Arc<dyn ReminderRepository>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        resolver: Arc<dyn RecipientResolver>,
        clock: Arc<dyn Clock>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            repo,
            dispatcher,
            resolver,
            clock,
            config,
            last_slot: Mutex::new(None),
        }
    }

    /// Current local wall-clock time truncated to the minute.
    pub fn current_slot(&self) -> NaiveDateTime {
        let local = self
            .clock
            .now()
            .with_timezone(&self.config.utc_offset)
            .naive_local();
        local.date().and_time(truncate_to_minute(local.time()))
    }

    fn until_next_minute(&self) -> Duration {
        let now = self.clock.now();
        let into_minute = Duration::from_secs(u64::from(now.second()))
            + Duration::from_nanos(u64::from(now.nanosecond()));
        Duration::from_secs(60).saturating_sub(into_minute)
    }

    pub async fn process_due_reminders(&self) -> Result<DispatchSummary, ServiceError> {
        let mut last_slot = self.last_slot.lock().await;

        let slot = self.current_slot();
        if last_slot.is_some_and(|last| slot <= last) {
            info!("Reminders for {} already processed, skipping", slot);
            return Ok(DispatchSummary::skipped(slot));
        }

        let due = bounded(self.config.db_timeout, self.repo.find_due(slot)).await?;
        *last_slot = Some(slot);

        let matched = due.len();
        let outcomes: Vec<(Uuid, anyhow::Result<()>)> = stream::iter(due)
            .map(|reminder| async move { (reminder.id, self.dispatch(&reminder).await) })
            .buffer_unordered(self.config.dispatch_concurrency.max(1))
            .collect()
            .await;

        let mut summary = DispatchSummary {
            slot,
            skipped: false,
            matched,
            dispatched: 0,
            failed: Vec::new(),
        };
        for (reminder_id, outcome) in outcomes {
            match outcome {
                Ok(()) => summary.dispatched += 1,
                Err(e) => {
                    error!("Failed to send reminder notification {}: {}", reminder_id, e);
                    summary.failed.push(DispatchFailure {
                        reminder_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        if summary.matched > 0 {
            info!(
                "Processed reminders for {}: {} matched, {} sent, {} failed",
                slot,
                summary.matched,
                summary.dispatched,
                summary.failed.len()
            );
        }
        Ok(summary)
    }

    async fn dispatch(&self, reminder: &Reminder) -> anyhow::Result<()> {
        let recipient = self.resolver.resolve(reminder.user_id).await?;
        self.dispatcher
            .send(
                &recipient,
                &reminder.notification_subject(),
                &reminder.notification_body(),
            )
            .await
    }

    /// Ticks at the top of every minute until `shutdown` flips to true or its sender is gone.
    ///
    /// A tick already running when shutdown arrives finishes; its notifications stand.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!("Reminder scheduler started");

        loop {
            let wait = self.until_next_minute();
            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    if let Err(e) = self.process_due_reminders().await {
                        warn!("Error processing scheduled reminders: {}", e);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Reminder scheduler stopped");
    }

    pub async fn statistics(&self) -> Result<ReminderStatistics, ServiceError> {
        let total_reminders = bounded(self.config.db_timeout, self.repo.count()).await?;
        let active_reminders = bounded(self.config.db_timeout, self.repo.count_active()).await?;
        Ok(ReminderStatistics {
            total_reminders,
            active_reminders,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::TemplateRecipientResolver;
    use crate::memory::MemoryReminderRepository;
    use async_trait::async_trait;
    use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct RecordingDispatcher {
        sent: StdMutex<Vec<(String, String, String)>>,
        fail_for: Option<String>,
        delay: Option<Duration>,
    }

    impl RecordingDispatcher {
        fn sent(&self) -> Vec<(String, String, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl NotificationDispatcher for RecordingDispatcher {
        async fn send(&self, recipient: &str, subject: &str, body: &str) -> anyhow::Result<()> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(name) = &self.fail_for {
                if subject.contains(name.as_str()) {
                    anyhow::bail!("mailbox unavailable");
                }
            }
            self.sent.lock().unwrap().push((
                recipient.to_string(),
                subject.to_string(),
                body.to_string(),
            ));
            Ok(())
        }
    }

    fn reminder(name: &str, slots: &[(u32, u32)]) -> Reminder {
        Reminder::create(
            ReminderRequest {
                user_id: 5,
                medicine_id: 9,
                medicine_name: name.to_string(),
                dosage: None,
                frequency: Some("Twice daily".to_string()),
                start_date: NaiveDate::from_ymd_opt(2024, 1, 1)
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap(),
                end_date: None,
                reminder_times: slots
                    .iter()
                    .map(|&(h, m)| NaiveTime::from_hms_opt(h, m, 0).unwrap())
                    .collect(),
                notes: None,
            },
            Utc::now(),
        )
        .unwrap()
    }

    struct Fixture {
        scheduler: Arc<ReminderScheduler>,
        repo: MemoryReminderRepository,
        dispatcher: Arc<RecordingDispatcher>,
        clock: Arc<ManualClock>,
    }

    fn fixture(dispatcher: RecordingDispatcher) -> Fixture {
        let repo = MemoryReminderRepository::new();
        let dispatcher = Arc::new(dispatcher);
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 12).unwrap(),
        ));
        let scheduler = Arc::new(ReminderScheduler::new(
            Arc::new(repo.clone()),
            dispatcher.clone(),
            Arc::new(TemplateRecipientResolver::new("user:{user_id}")),
            clock.clone(),
            SchedulerConfig {
                utc_offset: FixedOffset::east_opt(0).unwrap(),
                db_timeout: Duration::from_secs(1),
                dispatch_concurrency: 4,
            },
        ));
        Fixture {
            scheduler,
            repo,
            dispatcher,
            clock,
        }
    }

    #[tokio::test]
    async fn dispatches_due_reminder_once_per_minute() {
        let f = fixture(RecordingDispatcher::default());
        f.repo.insert(&reminder("Metformin", &[(9, 0)])).await.unwrap();

        let summary = f.scheduler.process_due_reminders().await.unwrap();
        assert_eq!(summary.matched, 1);
        assert_eq!(summary.dispatched, 1);
        assert!(!summary.skipped);

        f.clock.advance(chrono::Duration::seconds(30));
        let again = f.scheduler.process_due_reminders().await.unwrap();
        assert!(again.skipped);

        let sent = f.dispatcher.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "user:5");
        assert_eq!(sent[0].1, "Medicine Reminder - Metformin");
        assert!(sent[0].2.contains("Dosage: As prescribed"));
        assert!(sent[0].2.contains("Frequency: Twice daily"));
    }

    #[tokio::test]
    async fn concurrent_runs_do_not_duplicate() {
        let f = fixture(RecordingDispatcher {
            delay: Some(Duration::from_millis(50)),
            ..Default::default()
        });
        f.repo.insert(&reminder("Metformin", &[(9, 0)])).await.unwrap();

        let (a, b) = tokio::join!(
            f.scheduler.process_due_reminders(),
            f.scheduler.process_due_reminders()
        );
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a.dispatched + b.dispatched, 1);
        assert!(a.skipped != b.skipped);
        assert_eq!(f.dispatcher.sent().len(), 1);
    }

    #[tokio::test]
    async fn matches_only_configured_slots() {
        let f = fixture(RecordingDispatcher::default());
        f.repo
            .insert(&reminder("Atorvastatin", &[(8, 0), (20, 0)]))
            .await
            .unwrap();

        for (h, m, expected) in [(8, 0, 1), (8, 1, 0), (12, 0, 0), (20, 0, 1), (20, 59, 0)] {
            f.clock
                .set(Utc.with_ymd_and_hms(2024, 6, 3, h, m, 45).unwrap());
            let summary = f.scheduler.process_due_reminders().await.unwrap();
            assert_eq!(summary.dispatched, expected, "at {:02}:{:02}", h, m);
        }
    }

    #[tokio::test]
    async fn inactive_and_out_of_window_reminders_do_not_fire() {
        let f = fixture(RecordingDispatcher::default());
        let mut inactive = reminder("Inactive", &[(9, 0)]);
        inactive.is_active = false;
        f.repo.insert(&inactive).await.unwrap();

        let mut expired = reminder("Expired", &[(9, 0)]);
        expired.end_date = Some(
            NaiveDate::from_ymd_opt(2024, 6, 2)
                .unwrap()
                .and_hms_opt(23, 59, 0)
                .unwrap(),
        );
        f.repo.insert(&expired).await.unwrap();

        let mut future = reminder("Future", &[(9, 0)]);
        future.start_date = NaiveDate::from_ymd_opt(2024, 6, 4)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        f.repo.insert(&future).await.unwrap();

        let summary = f.scheduler.process_due_reminders().await.unwrap();
        assert_eq!(summary.matched, 0);
        assert!(f.dispatcher.sent().is_empty());
    }

    #[tokio::test]
    async fn missed_minutes_are_not_replayed() {
        let f = fixture(RecordingDispatcher::default());
        f.repo.insert(&reminder("Metformin", &[(9, 1)])).await.unwrap();

        let first = f.scheduler.process_due_reminders().await.unwrap();
        assert_eq!(first.matched, 0);

        // the 09:01 tick never ran
        f.clock.set(Utc.with_ymd_and_hms(2024, 6, 3, 9, 2, 3).unwrap());
        let late = f.scheduler.process_due_reminders().await.unwrap();
        assert!(!late.skipped);
        assert_eq!(late.dispatched, 0);
        assert!(f.dispatcher.sent().is_empty());
    }

    #[tokio::test]
    async fn one_failure_does_not_abort_the_batch() {
        let f = fixture(RecordingDispatcher {
            fail_for: Some("Warfarin".to_string()),
            ..Default::default()
        });
        let failing = reminder("Warfarin", &[(9, 0)]);
        f.repo.insert(&failing).await.unwrap();
        f.repo.insert(&reminder("Lisinopril", &[(9, 0)])).await.unwrap();
        f.repo.insert(&reminder("Levothyroxine", &[(9, 0)])).await.unwrap();

        let summary = f.scheduler.process_due_reminders().await.unwrap();
        assert_eq!(summary.matched, 3);
        assert_eq!(summary.dispatched, 2);
        assert_eq!(
            summary.failed,
            vec![DispatchFailure {
                reminder_id: failing.id,
                error: "mailbox unavailable".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn slot_uses_configured_offset() {
        let repo = MemoryReminderRepository::new();
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 6, 3, 7, 0, 5).unwrap(),
        ));
        let scheduler = ReminderScheduler::new(
            Arc::new(repo.clone()),
            Arc::new(RecordingDispatcher::default()),
            Arc::new(TemplateRecipientResolver::new("user:{user_id}")),
            clock,
            SchedulerConfig {
                utc_offset: FixedOffset::east_opt(2 * 3600).unwrap(),
                db_timeout: Duration::from_secs(1),
                dispatch_concurrency: 1,
            },
        );
        repo.insert(&reminder("Metformin", &[(9, 0)])).await.unwrap();

        assert_eq!(
            scheduler.current_slot(),
            NaiveDate::from_ymd_opt(2024, 6, 3)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap()
        );
        let summary = scheduler.process_due_reminders().await.unwrap();
        assert_eq!(summary.dispatched, 1);
    }

    #[tokio::test]
    async fn run_ticks_and_stops_on_shutdown() {
        let f = fixture(RecordingDispatcher::default());
        f.repo.insert(&reminder("Metformin", &[(9, 0)])).await.unwrap();
        // 50ms before the minute ends, so the first tick lands almost immediately.
        let almost = Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 59).unwrap()
            + chrono::Duration::milliseconds(950);
        f.clock.set(almost);

        let (tx, rx) = watch::channel(false);
        let scheduler = f.scheduler.clone();
        let handle = tokio::spawn(async move { scheduler.run(rx).await });

        tokio::time::sleep(Duration::from_millis(300)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("scheduler did not stop")
            .unwrap();

        assert_eq!(f.dispatcher.sent().len(), 1);
    }

    #[tokio::test]
    async fn statistics_count_all_and_active() {
        let f = fixture(RecordingDispatcher::default());
        f.repo.insert(&reminder("A", &[(9, 0)])).await.unwrap();
        let mut inactive = reminder("B", &[(9, 0)]);
        inactive.is_active = false;
        f.repo.insert(&inactive).await.unwrap();

        let stats = f.scheduler.statistics().await.unwrap();
        assert_eq!(stats.total_reminders, 2);
        assert_eq!(stats.active_reminders, 1);
    }
}
