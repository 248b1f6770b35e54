//! Error types for the mailbox automations.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Mail error: {0}")]
    Mail(#[from] MailError),

    #[error("Contacts error: {0}")]
    Contacts(#[from] ContactsError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("Form error: {0}")]
    Form(#[from] FormError),

    #[error("Automation error: {0}")]
    Automation(#[from] AutomationError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Mail collaborator errors (IMAP, SMTP, in-memory mailbox).
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Connection to {host} failed: {reason}")]
    Connection { host: String, reason: String },

    #[error("IMAP command {command} failed: {reason}")]
    Protocol { command: String, reason: String },

    #[error("Failed to send mail to {to}: {reason}")]
    SendFailed { to: String, reason: String },

    #[error("Thread {0} not found")]
    ThreadNotFound(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),
}

/// Contacts directory errors.
#[derive(Debug, thiserror::Error)]
pub enum ContactsError {
    #[error("Contact {0} not found")]
    ContactNotFound(String),

    #[error("Contact group {0} not found")]
    GroupNotFound(String),

    #[error("Batch of {requested} exceeds the limit of {max}")]
    BatchTooLarge { requested: usize, max: usize },

    #[error("Contact book serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Trigger registry errors.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("Invalid cron expression {expr}: {reason}")]
    InvalidCron { expr: String, reason: String },

    #[error("Schedule serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Form response store errors.
#[derive(Debug, thiserror::Error)]
pub enum FormError {
    #[error("Form response {response_id} not found in form {form_id}")]
    ResponseNotFound { form_id: String, response_id: String },
}

/// Failures that abort an automation run before its side effects.
#[derive(Debug, thiserror::Error)]
pub enum AutomationError {
    #[error("No draft with subject \"{subject}\" found")]
    DraftMissing { subject: String },

    #[error("No drafts found in the mailbox")]
    NoDrafts,

    #[error("No draft containing \"{marker}\" in its subject found")]
    DraftNotFound { marker: String },

    #[error("{} drafts match, keep exactly one: {}", subjects.len(), subjects.join(", "))]
    AmbiguousDraft { subjects: Vec<String> },

    #[error("No contacts with label \"{label}\" found")]
    NoContacts { label: String },

    #[error("No target address configured")]
    MissingTarget,

    #[error("No form id configured")]
    MissingFormId,

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid schedule {date} {time}: {reason}")]
    InvalidSchedule {
        date: String,
        time: String,
        reason: String,
    },

    #[error("Scheduled time {0} is not in the future")]
    ScheduleInPast(String),

    #[error("Mail error: {0}")]
    Mail(#[from] MailError),

    #[error("Contacts error: {0}")]
    Contacts(#[from] ContactsError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("Form error: {0}")]
    Form(#[from] FormError),
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
