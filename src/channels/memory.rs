//! In-memory mailbox. Deterministic stand-in for a real account.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;

use crate::channels::{Draft, MailService, MailThread, OutgoingMail};
use crate::error::MailError;

#[derive(Debug, Clone)]
struct StoredThread {
    thread: MailThread,
    labels: HashSet<String>,
    trashed: bool,
}

#[derive(Debug, Default)]
struct MailboxState {
    threads: Vec<StoredThread>,
    labels: HashSet<String>,
    drafts: Vec<Draft>,
    sent: Vec<OutgoingMail>,
    failing_recipients: HashSet<String>,
    failing_trash: HashSet<String>,
}

/// Mailbox that keeps everything in memory and records sent mail.
pub struct InMemoryMailbox {
    account: String,
    state: Mutex<MailboxState>,
}

impl InMemoryMailbox {
    pub fn new(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            state: Mutex::new(MailboxState::default()),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MailboxState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Deliver a conversation into the inbox.
    pub fn add_thread(&self, thread: MailThread) {
        self.state().threads.push(StoredThread {
            thread,
            labels: HashSet::new(),
            trashed: false,
        });
    }

    pub fn add_draft(&self, draft: Draft) {
        self.state().drafts.push(draft);
    }

    /// Make every send to `recipient` fail.
    pub fn fail_sends_to(&self, recipient: impl Into<String>) {
        self.state().failing_recipients.insert(recipient.into());
    }

    /// Make trashing `thread_id` fail.
    pub fn fail_trash_of(&self, thread_id: impl Into<String>) {
        self.state().failing_trash.insert(thread_id.into());
    }

    /// Everything sent so far, in order.
    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.state().sent.clone()
    }

    pub fn has_label(&self, thread_id: &str, label: &str) -> bool {
        self.state()
            .threads
            .iter()
            .any(|t| t.thread.id == thread_id && t.labels.contains(label))
    }

    pub fn label_exists(&self, label: &str) -> bool {
        self.state().labels.contains(label)
    }

    pub fn is_trashed(&self, thread_id: &str) -> bool {
        self.state()
            .threads
            .iter()
            .any(|t| t.thread.id == thread_id && t.trashed)
    }
}

/// Sender-side match only; the in-memory store keeps no recipients.
fn involves(thread: &MailThread, address: &str) -> bool {
    let needle = address.to_lowercase();
    thread
        .messages
        .iter()
        .any(|m| m.from.to_lowercase().contains(&needle))
}

#[async_trait]
impl MailService for InMemoryMailbox {
    fn account_address(&self) -> &str {
        &self.account
    }

    async fn ensure_label(&self, label: &str) -> Result<bool, MailError> {
        Ok(self.state().labels.insert(label.to_string()))
    }

    async fn unread_without_label(
        &self,
        label: &str,
        max: usize,
    ) -> Result<Vec<MailThread>, MailError> {
        Ok(self
            .state()
            .threads
            .iter()
            .filter(|t| !t.trashed && !t.labels.contains(label))
            .filter(|t| t.thread.messages.iter().any(|m| m.is_unread))
            .take(max)
            .map(|t| t.thread.clone())
            .collect())
    }

    async fn add_label(&self, thread_id: &str, label: &str) -> Result<(), MailError> {
        let mut state = self.state();
        state.labels.insert(label.to_string());
        let stored = state
            .threads
            .iter_mut()
            .find(|t| t.thread.id == thread_id)
            .ok_or_else(|| MailError::ThreadNotFound(thread_id.to_string()))?;
        stored.labels.insert(label.to_string());
        Ok(())
    }

    async fn drafts(&self) -> Result<Vec<Draft>, MailError> {
        Ok(self.state().drafts.clone())
    }

    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        let mut state = self.state();
        if state.failing_recipients.contains(&mail.to) {
            return Err(MailError::SendFailed {
                to: mail.to,
                reason: "recipient rejected".into(),
            });
        }
        debug!(subject = %mail.subject, "Recorded outgoing mail");
        state.sent.push(mail);
        Ok(())
    }

    async fn threads_involving(
        &self,
        address: &str,
        start: usize,
        max: usize,
    ) -> Result<Vec<MailThread>, MailError> {
        Ok(self
            .state()
            .threads
            .iter()
            .filter(|t| !t.trashed && involves(&t.thread, address))
            .skip(start)
            .take(max)
            .map(|t| t.thread.clone())
            .collect())
    }

    async fn move_to_trash(&self, thread_id: &str) -> Result<(), MailError> {
        let mut state = self.state();
        if state.failing_trash.contains(thread_id) {
            return Err(MailError::Protocol {
                command: "trash".into(),
                reason: format!("thread {thread_id} is locked"),
            });
        }
        let stored = state
            .threads
            .iter_mut()
            .find(|t| t.thread.id == thread_id)
            .ok_or_else(|| MailError::ThreadNotFound(thread_id.to_string()))?;
        stored.trashed = true;
        Ok(())
    }
}
