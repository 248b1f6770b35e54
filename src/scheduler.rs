//! Trigger registry and ticker.
//!
//! Triggers bind a [`Handler`] to a schedule: periodic (cron), one-shot
//! (fixed time) or form submission. Clock triggers are polled by
//! [`spawn_ticker`]; form triggers are consulted by the webhook server.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::SchedulerError;

/// The procedure a trigger runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Handler {
    AutoRespond,
    SendNewsletter,
    Unsubscribe,
}

impl std::fmt::Display for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AutoRespond => write!(f, "auto_respond"),
            Self::SendNewsletter => write!(f, "send_newsletter"),
            Self::Unsubscribe => write!(f, "unsubscribe"),
        }
    }
}

/// When a trigger fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriggerSchedule {
    EveryMinutes { minutes: u32 },
    At { time: DateTime<Utc> },
    FormSubmit { form_id: String },
}

impl TriggerSchedule {
    pub fn is_clock(&self) -> bool {
        !matches!(self, Self::FormSubmit { .. })
    }
}

/// An installed trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    pub id: Uuid,
    pub handler: Handler,
    pub schedule: TriggerSchedule,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_fired: Option<DateTime<Utc>>,
}

/// Cron expression firing every `minutes` minutes, on the minute.
pub fn every_minutes_expr(minutes: u32) -> String {
    format!("0 */{minutes} * * * *")
}

fn parse_every_minutes(minutes: u32) -> Result<cron::Schedule, SchedulerError> {
    let expr = every_minutes_expr(minutes);
    if !(1..=59).contains(&minutes) {
        return Err(SchedulerError::InvalidCron {
            expr,
            reason: "interval must be between 1 and 59 minutes".into(),
        });
    }
    cron::Schedule::from_str(&expr).map_err(|e| SchedulerError::InvalidCron {
        expr: expr.clone(),
        reason: e.to_string(),
    })
}

impl Trigger {
    /// Whether a clock trigger should fire at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match &self.schedule {
            TriggerSchedule::At { time } => *time <= now,
            TriggerSchedule::EveryMinutes { minutes } => {
                let anchor = self.last_fired.unwrap_or(self.created_at);
                parse_every_minutes(*minutes)
                    .ok()
                    .and_then(|s| s.after(&anchor).next())
                    .is_some_and(|next| next <= now)
            }
            TriggerSchedule::FormSubmit { .. } => false,
        }
    }
}

/// Runs fired triggers.
#[async_trait]
pub trait TriggerHandler: Send + Sync {
    async fn fire(&self, trigger: &Trigger);
}

/// Trigger registry, optionally persisted as JSON.
///
/// With a file, the file is authoritative: it is re-read under the lock
/// before every read and mutation, so a `serve` process and CLI commands
/// on the same path see each other's changes.
pub struct JobScheduler {
    path: Option<PathBuf>,
    triggers: RwLock<Vec<Trigger>>,
}

/// Missing file = no triggers.
async fn read_file(path: &Path) -> Result<Vec<Trigger>, SchedulerError> {
    match tokio::fs::read_to_string(path).await {
        Ok(raw) if raw.trim().is_empty() => Ok(Vec::new()),
        Ok(raw) => Ok(serde_json::from_str(&raw)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

impl JobScheduler {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            triggers: RwLock::new(Vec::new()),
        }
    }

    /// Load `path`; every change is written back.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, SchedulerError> {
        let path = path.as_ref().to_path_buf();
        let triggers = read_file(&path).await?;
        Ok(Self {
            path: Some(path),
            triggers: RwLock::new(triggers),
        })
    }

    /// Replace the in-memory list with the file's contents.
    async fn reload(&self, triggers: &mut Vec<Trigger>) -> Result<(), SchedulerError> {
        if let Some(path) = &self.path {
            *triggers = read_file(path).await?;
        }
        Ok(())
    }

    /// Write to a sibling temp file, then rename over the target.
    async fn persist(&self, triggers: &[Trigger]) -> Result<(), SchedulerError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_string_pretty(triggers)?).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    /// Current triggers. A file that cannot be read is logged and the last
    /// known list is used.
    async fn snapshot(&self) -> Vec<Trigger> {
        let mut triggers = self.triggers.write().await;
        if let Err(e) = self.reload(&mut triggers).await {
            warn!(error = %e, "Could not reload triggers, using cached list");
        }
        triggers.clone()
    }

    /// Add a trigger. Periodic schedules must form a valid cron expression.
    pub async fn install(
        &self,
        handler: Handler,
        schedule: TriggerSchedule,
    ) -> Result<Trigger, SchedulerError> {
        if let TriggerSchedule::EveryMinutes { minutes } = &schedule {
            parse_every_minutes(*minutes)?;
        }
        let trigger = Trigger {
            id: Uuid::new_v4(),
            handler,
            schedule,
            created_at: Utc::now(),
            last_fired: None,
        };
        let mut triggers = self.triggers.write().await;
        self.reload(&mut triggers).await?;
        triggers.push(trigger.clone());
        self.persist(&triggers).await?;
        info!(handler = %handler, id = %trigger.id, "Trigger installed");
        Ok(trigger)
    }

    /// Remove every trigger of `handler`, then install one with `schedule`.
    pub async fn replace(
        &self,
        handler: Handler,
        schedule: TriggerSchedule,
    ) -> Result<Trigger, SchedulerError> {
        self.remove(handler).await?;
        self.install(handler, schedule).await
    }

    /// Remove every trigger of `handler`; returns how many were removed.
    pub async fn remove(&self, handler: Handler) -> Result<usize, SchedulerError> {
        let mut triggers = self.triggers.write().await;
        self.reload(&mut triggers).await?;
        let before = triggers.len();
        triggers.retain(|t| t.handler != handler);
        let removed = before - triggers.len();
        if removed > 0 {
            self.persist(&triggers).await?;
            info!(handler = %handler, removed, "Triggers removed");
        }
        Ok(removed)
    }

    pub async fn list(&self) -> Vec<Trigger> {
        self.snapshot().await
    }

    pub async fn for_handler(&self, handler: Handler) -> Vec<Trigger> {
        self.snapshot()
            .await
            .into_iter()
            .filter(|t| t.handler == handler)
            .collect()
    }

    /// The form trigger for `form_id`, if any.
    pub async fn form_trigger(&self, form_id: &str) -> Option<Trigger> {
        self.snapshot().await.into_iter().find(|t| {
            matches!(&t.schedule, TriggerSchedule::FormSubmit { form_id: f } if f == form_id)
        })
    }

    /// Clock triggers that should fire at `now`.
    pub async fn due(&self, now: DateTime<Utc>) -> Vec<Trigger> {
        self.snapshot()
            .await
            .into_iter()
            .filter(|t| t.is_due(now))
            .collect()
    }

    /// One-shots are removed; periodic triggers remember the run.
    pub async fn mark_fired(&self, id: Uuid, now: DateTime<Utc>) -> Result<(), SchedulerError> {
        let mut triggers = self.triggers.write().await;
        self.reload(&mut triggers).await?;
        let Some(index) = triggers.iter().position(|t| t.id == id) else {
            return Ok(());
        };
        if matches!(triggers[index].schedule, TriggerSchedule::At { .. }) {
            triggers.remove(index);
        } else {
            triggers[index].last_fired = Some(now);
        }
        self.persist(&triggers).await
    }
}

/// Spawn the background task that fires due clock triggers.
pub fn spawn_ticker(
    scheduler: Arc<JobScheduler>,
    handler: Arc<dyn TriggerHandler>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let now = Utc::now();
            for trigger in scheduler.due(now).await {
                debug!(handler = %trigger.handler, id = %trigger.id, "Trigger due");
                if let Err(e) = scheduler.mark_fired(trigger.id, now).await {
                    error!(id = %trigger.id, "Failed to record trigger run: {}", e);
                }
                handler.fire(&trigger).await;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, h, m, s).unwrap()
    }

    fn periodic(minutes: u32, created_at: DateTime<Utc>) -> Trigger {
        Trigger {
            id: Uuid::new_v4(),
            handler: Handler::AutoRespond,
            schedule: TriggerSchedule::EveryMinutes { minutes },
            created_at,
            last_fired: None,
        }
    }

    #[test]
    fn cron_expression_shape() {
        assert_eq!(every_minutes_expr(5), "0 */5 * * * *");
        assert!(parse_every_minutes(1).is_ok());
        assert!(parse_every_minutes(0).is_err());
        assert!(parse_every_minutes(60).is_err());
    }

    #[test]
    fn periodic_trigger_due_on_next_boundary() {
        let trigger = periodic(5, at(10, 1, 30));
        assert!(!trigger.is_due(at(10, 4, 59)));
        assert!(trigger.is_due(at(10, 5, 0)));
    }

    #[test]
    fn periodic_trigger_anchors_on_last_run() {
        let mut trigger = periodic(1, at(10, 0, 0));
        trigger.last_fired = Some(at(10, 7, 0));
        assert!(!trigger.is_due(at(10, 7, 30)));
        assert!(trigger.is_due(at(10, 8, 0)));
    }

    #[test]
    fn form_triggers_never_clock_due() {
        let trigger = Trigger {
            id: Uuid::new_v4(),
            handler: Handler::Unsubscribe,
            schedule: TriggerSchedule::FormSubmit { form_id: "f".into() },
            created_at: at(0, 0, 0),
            last_fired: None,
        };
        assert!(!trigger.is_due(at(23, 0, 0)));
    }

    #[tokio::test]
    async fn one_shot_removed_after_firing() {
        let scheduler = JobScheduler::in_memory();
        let trigger = scheduler
            .install(Handler::SendNewsletter, TriggerSchedule::At { time: at(16, 0, 0) })
            .await
            .unwrap();

        assert!(scheduler.due(at(15, 59, 0)).await.is_empty());
        assert_eq!(scheduler.due(at(16, 0, 0)).await.len(), 1);

        scheduler.mark_fired(trigger.id, at(16, 0, 0)).await.unwrap();
        assert!(scheduler.list().await.is_empty());
    }

    #[tokio::test]
    async fn replace_keeps_one_trigger_per_handler() {
        let scheduler = JobScheduler::in_memory();
        scheduler
            .install(Handler::AutoRespond, TriggerSchedule::EveryMinutes { minutes: 1 })
            .await
            .unwrap();
        scheduler
            .install(Handler::Unsubscribe, TriggerSchedule::FormSubmit { form_id: "f".into() })
            .await
            .unwrap();
        scheduler
            .replace(Handler::AutoRespond, TriggerSchedule::EveryMinutes { minutes: 5 })
            .await
            .unwrap();

        let responders = scheduler.for_handler(Handler::AutoRespond).await;
        assert_eq!(responders.len(), 1);
        assert_eq!(responders[0].schedule, TriggerSchedule::EveryMinutes { minutes: 5 });
        assert!(scheduler.form_trigger("f").await.is_some());
        assert!(scheduler.form_trigger("other").await.is_none());
    }

    #[tokio::test]
    async fn invalid_interval_rejected() {
        let scheduler = JobScheduler::in_memory();
        let err = scheduler
            .install(Handler::AutoRespond, TriggerSchedule::EveryMinutes { minutes: 0 })
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidCron { .. }));
        assert!(scheduler.list().await.is_empty());
    }

    #[tokio::test]
    async fn persisted_triggers_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("triggers.json");
        {
            let scheduler = JobScheduler::open(&path).await.unwrap();
            scheduler
                .install(Handler::SendNewsletter, TriggerSchedule::At { time: at(16, 0, 0) })
                .await
                .unwrap();
        }
        let reopened = JobScheduler::open(&path).await.unwrap();
        let triggers = reopened.list().await;
        assert_eq!(triggers.len(), 1);
        assert_eq!(triggers[0].handler, Handler::SendNewsletter);
        assert_eq!(reopened.remove(Handler::SendNewsletter).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn handles_on_one_file_keep_each_others_triggers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("triggers.json");
        let server = JobScheduler::open(&path).await.unwrap();
        let responder = server
            .install(Handler::AutoRespond, TriggerSchedule::EveryMinutes { minutes: 1 })
            .await
            .unwrap();

        let cli = JobScheduler::open(&path).await.unwrap();
        cli.install(Handler::SendNewsletter, TriggerSchedule::At { time: at(16, 0, 0) })
            .await
            .unwrap();
        cli.install(Handler::Unsubscribe, TriggerSchedule::FormSubmit { form_id: "f".into() })
            .await
            .unwrap();

        // The long-running handle sees the new triggers without reopening.
        assert!(server.form_trigger("f").await.is_some());
        server.mark_fired(responder.id, at(10, 1, 0)).await.unwrap();

        let on_disk = JobScheduler::open(&path).await.unwrap().list().await;
        let mut handlers: Vec<_> = on_disk.iter().map(|t| t.handler.to_string()).collect();
        handlers.sort();
        assert_eq!(handlers, vec!["auto_respond", "send_newsletter", "unsubscribe"]);
        let fired = on_disk.iter().find(|t| t.id == responder.id).unwrap();
        assert_eq!(fired.last_fired, Some(at(10, 1, 0)));
    }
}
