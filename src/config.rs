//! Configuration types.
//!
//! Every automation has a plain config struct whose `Default` carries the
//! production constants; `from_env()` applies environment overrides on top.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Read a string variable, falling back to `default` when unset.
pub fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Read an optional string variable; empty counts as unset.
pub fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Parse a variable, falling back to `default` when unset.
pub fn env_parse<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

/// Duration in milliseconds.
fn env_millis(key: &str, default: Duration) -> Result<Duration, ConfigError> {
    env_parse(key, default.as_millis() as u64).map(Duration::from_millis)
}

// ── Runtime ─────────────────────────────────────────────────────────

/// Process-wide settings shared by all automations.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Log full addresses instead of anonymised ones.
    pub debug: bool,
    /// Contact book JSON file.
    pub contacts_path: PathBuf,
    /// Trigger registry JSON file.
    pub schedule_path: PathBuf,
    /// Port of the webhook server.
    pub http_port: u16,
    /// How often the ticker checks for due triggers.
    pub tick_interval: Duration,
    /// Directory for rolling log files, if any.
    pub log_dir: Option<PathBuf>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            debug: false,
            contacts_path: PathBuf::from("./data/contacts.json"),
            schedule_path: PathBuf::from("./data/triggers.json"),
            http_port: 8080,
            tick_interval: Duration::from_secs(30),
            log_dir: None,
        }
    }
}

impl RuntimeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            debug: env_parse("AUTOMATIONS_DEBUG", defaults.debug)?,
            contacts_path: env_opt("AUTOMATIONS_CONTACTS_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.contacts_path),
            schedule_path: env_opt("AUTOMATIONS_SCHEDULE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.schedule_path),
            http_port: env_parse("AUTOMATIONS_HTTP_PORT", defaults.http_port)?,
            tick_interval: Duration::from_secs(env_parse(
                "AUTOMATIONS_TICK_SECS",
                defaults.tick_interval.as_secs(),
            )?),
            log_dir: env_opt("AUTOMATIONS_LOG_DIR").map(PathBuf::from),
        })
    }
}

// ── Auto-responder ──────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ResponderConfig {
    /// Subject of the default reply template draft (exact match).
    pub draft_subject: String,
    /// Subject of the feedback reply template draft (exact match).
    pub feedback_draft_subject: String,
    pub test_prefixes: Vec<String>,
    pub feedback_subject_prefix: String,
    pub feedback_reply_subject: String,
    pub max_threads_per_run: usize,
    pub check_interval_minutes: u32,
    /// Idempotency label applied to every handled conversation.
    pub label_name: String,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            draft_subject: "E-Mail Response Automation Draft - DO NOT DELETE".to_string(),
            feedback_draft_subject: "Feedback E-Mail Response Automation Draft - DO NOT DELETE"
                .to_string(),
            test_prefixes: vec!["Test: ".to_string()],
            feedback_subject_prefix: "Feedback zum App-Design".to_string(),
            feedback_reply_subject: "Vielen Dank für Ihr Feedback".to_string(),
            max_threads_per_run: 50,
            check_interval_minutes: 1,
            label_name: "AutoResponded".to_string(),
        }
    }
}

impl ResponderConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let d = Self::default();
        let config = Self {
            draft_subject: env_string("RESPONDER_DRAFT_SUBJECT", &d.draft_subject),
            feedback_draft_subject: env_string(
                "RESPONDER_FEEDBACK_DRAFT_SUBJECT",
                &d.feedback_draft_subject,
            ),
            test_prefixes: match std::env::var("RESPONDER_TEST_PREFIXES") {
                // Prefixes keep their trailing spaces.
                Ok(raw) => raw.split(',').map(String::from).collect(),
                Err(_) => d.test_prefixes,
            },
            feedback_subject_prefix: env_string(
                "RESPONDER_FEEDBACK_PREFIX",
                &d.feedback_subject_prefix,
            ),
            feedback_reply_subject: env_string(
                "RESPONDER_FEEDBACK_REPLY_SUBJECT",
                &d.feedback_reply_subject,
            ),
            max_threads_per_run: env_parse("RESPONDER_MAX_THREADS", d.max_threads_per_run)?,
            check_interval_minutes: env_parse(
                "RESPONDER_INTERVAL_MINUTES",
                d.check_interval_minutes,
            )?,
            label_name: env_string("RESPONDER_LABEL", &d.label_name),
        };
        if config.check_interval_minutes == 0 {
            return Err(ConfigError::InvalidValue {
                key: "RESPONDER_INTERVAL_MINUTES".into(),
                message: "must be at least 1".into(),
            });
        }
        Ok(config)
    }
}

// ── Data erasure ────────────────────────────────────────────────────

/// Sleeps between erasure steps, to stay under provider rate limits.
#[derive(Debug, Clone)]
pub struct Pacing {
    pub after_confirmation: Duration,
    pub between_contacts: Duration,
    pub between_batches: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            after_confirmation: Duration::from_secs(1),
            between_contacts: Duration::from_millis(300),
            between_batches: Duration::from_millis(500),
        }
    }
}

impl Pacing {
    /// No sleeping at all (tests).
    pub fn none() -> Self {
        Self {
            after_confirmation: Duration::ZERO,
            between_contacts: Duration::ZERO,
            between_batches: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ErasureConfig {
    pub target_address: Option<String>,
    /// Recipient of `send_test_confirmation`.
    pub test_address: Option<String>,
    pub draft_subject: String,
    pub final_subject: String,
    pub max_threads_per_batch: usize,
    /// Grace period between the warning and the first destructive step.
    pub start_delay: Duration,
    pub pacing: Pacing,
}

impl Default for ErasureConfig {
    fn default() -> Self {
        Self {
            target_address: None,
            test_address: None,
            draft_subject: "Confirm User Data Deletion Draft - DO NOT DELETE".to_string(),
            final_subject: "Wir haben ihre Nutzerdaten gelöscht".to_string(),
            max_threads_per_batch: 500,
            start_delay: Duration::from_secs(3),
            pacing: Pacing::default(),
        }
    }
}

impl ErasureConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let d = Self::default();
        let max_threads_per_batch = env_parse("ERASURE_BATCH_SIZE", d.max_threads_per_batch)?;
        if max_threads_per_batch == 0 {
            return Err(ConfigError::InvalidValue {
                key: "ERASURE_BATCH_SIZE".into(),
                message: "must be at least 1".into(),
            });
        }
        Ok(Self {
            target_address: env_opt("ERASURE_TARGET_ADDRESS"),
            test_address: env_opt("ERASURE_TEST_ADDRESS"),
            draft_subject: env_string("ERASURE_DRAFT_SUBJECT", &d.draft_subject),
            final_subject: env_string("ERASURE_FINAL_SUBJECT", &d.final_subject),
            max_threads_per_batch,
            start_delay: env_millis("ERASURE_START_DELAY_MS", d.start_delay)?,
            pacing: Pacing {
                after_confirmation: env_millis(
                    "ERASURE_PAUSE_CONFIRMATION_MS",
                    d.pacing.after_confirmation,
                )?,
                between_contacts: env_millis(
                    "ERASURE_PAUSE_CONTACT_MS",
                    d.pacing.between_contacts,
                )?,
                between_batches: env_millis("ERASURE_PAUSE_BATCH_MS", d.pacing.between_batches)?,
            },
        })
    }
}

// ── Newsletter ──────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct NewsletterConfig {
    /// Contact group whose members receive the newsletter.
    pub contact_label: String,
    pub sender_name: String,
    /// Send only to the account itself, subject prefixed `[TEST] `.
    pub test_mode: bool,
    /// The newsletter draft is the only draft whose subject contains this.
    pub draft_marker: String,
    /// `YYYY-MM-DD`, local time.
    pub scheduled_date: String,
    /// `HH:MM`, local time.
    pub scheduled_time: String,
    /// Greeting used when a contact has no usable name.
    pub fallback_name: String,
    pub pause_every: usize,
    pub pause: Duration,
    pub max_group_members: usize,
    pub batch_size: usize,
}

impl Default for NewsletterConfig {
    fn default() -> Self {
        Self {
            contact_label: "Newsletter Subscriber".to_string(),
            sender_name: "Haptigation".to_string(),
            test_mode: true,
            draft_marker: "Update zu Haptigation".to_string(),
            scheduled_date: String::new(),
            scheduled_time: String::new(),
            fallback_name: "LeserIn".to_string(),
            pause_every: 10,
            pause: Duration::from_secs(1),
            max_group_members: 500,
            batch_size: 50,
        }
    }
}

impl NewsletterConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let d = Self::default();
        Ok(Self {
            contact_label: env_string("NEWSLETTER_CONTACT_LABEL", &d.contact_label),
            sender_name: env_string("NEWSLETTER_SENDER_NAME", &d.sender_name),
            test_mode: env_parse("NEWSLETTER_TEST_MODE", d.test_mode)?,
            draft_marker: env_string("NEWSLETTER_DRAFT_MARKER", &d.draft_marker),
            scheduled_date: env_string("NEWSLETTER_DATE", &d.scheduled_date),
            scheduled_time: env_string("NEWSLETTER_TIME", &d.scheduled_time),
            fallback_name: env_string("NEWSLETTER_FALLBACK_NAME", &d.fallback_name),
            pause_every: env_parse("NEWSLETTER_PAUSE_EVERY", d.pause_every)?,
            pause: env_millis("NEWSLETTER_PAUSE_MS", d.pause)?,
            max_group_members: env_parse("NEWSLETTER_MAX_MEMBERS", d.max_group_members)?,
            batch_size: d.batch_size,
        })
    }
}

// ── Unsubscribe ─────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct UnsubscribeConfig {
    pub contact_label: String,
    pub form_id: String,
    pub confirmation_subject: String,
    pub sender_name: String,
    pub draft_marker: String,
    /// Receives failure notifications; none disables them.
    pub admin_address: Option<String>,
    /// Sender name on admin notifications.
    pub admin_sender_name: String,
    pub batch_size: usize,
    pub max_group_members: usize,
}

impl Default for UnsubscribeConfig {
    fn default() -> Self {
        Self {
            contact_label: "Newsletter Subscriber".to_string(),
            form_id: String::new(),
            confirmation_subject: "Haptigation Newsletter-Abmeldung bestätigt".to_string(),
            sender_name: "Haptigation Team".to_string(),
            draft_marker: "Unsubscribe Newsletter - DO NOT DELETE".to_string(),
            admin_address: None,
            admin_sender_name: "Haptigation Newsletter System".to_string(),
            batch_size: 50,
            max_group_members: 500,
        }
    }
}

impl UnsubscribeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let d = Self::default();
        Ok(Self {
            contact_label: env_string("UNSUBSCRIBE_CONTACT_LABEL", &d.contact_label),
            form_id: env_string("UNSUBSCRIBE_FORM_ID", &d.form_id),
            confirmation_subject: env_string(
                "UNSUBSCRIBE_CONFIRMATION_SUBJECT",
                &d.confirmation_subject,
            ),
            sender_name: env_string("UNSUBSCRIBE_SENDER_NAME", &d.sender_name),
            draft_marker: env_string("UNSUBSCRIBE_DRAFT_MARKER", &d.draft_marker),
            admin_address: env_opt("UNSUBSCRIBE_ADMIN_ADDRESS"),
            admin_sender_name: env_string("UNSUBSCRIBE_ADMIN_SENDER_NAME", &d.admin_sender_name),
            batch_size: d.batch_size,
            max_group_members: env_parse("UNSUBSCRIBE_MAX_MEMBERS", d.max_group_members)?,
        })
    }
}
