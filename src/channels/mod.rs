//! Mail collaborator: the `MailService` seam plus its IMAP/SMTP and
//! in-memory implementations.

pub mod email;
pub mod imap;
pub mod memory;
pub mod types;

pub use email::{EmailConfig, ImapSmtpMailbox};
pub use memory::InMemoryMailbox;
pub use types::*;

use async_trait::async_trait;

use crate::error::MailError;

/// Everything the automations need from a mailbox.
///
/// Implementations are pure I/O; filtering and templating live in the
/// automations that call them.
#[async_trait]
pub trait MailService: Send + Sync {
    /// The account's own address (used for reply-to, test sends, self-loop checks).
    fn account_address(&self) -> &str;

    /// Make sure a label exists. Returns `true` if it had to be created.
    async fn ensure_label(&self, label: &str) -> Result<bool, MailError>;

    /// Unread conversations that do not carry `label`, newest first, at most `max`.
    async fn unread_without_label(
        &self,
        label: &str,
        max: usize,
    ) -> Result<Vec<MailThread>, MailError>;

    /// Attach `label` to a conversation.
    async fn add_label(&self, thread_id: &str, label: &str) -> Result<(), MailError>;

    /// All drafts in the mailbox.
    async fn drafts(&self) -> Result<Vec<Draft>, MailError>;

    /// Send a message.
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError>;

    /// Conversations from or to `address`, paginated by `start`/`max`.
    async fn threads_involving(
        &self,
        address: &str,
        start: usize,
        max: usize,
    ) -> Result<Vec<MailThread>, MailError>;

    /// Move a conversation to the trash.
    async fn move_to_trash(&self, thread_id: &str) -> Result<(), MailError>;
}
