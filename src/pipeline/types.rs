//! Shared types for the inbound classification pipeline.

use serde::{Deserialize, Serialize};

use crate::channels::MailMessage;

// ── Conversation snapshot ───────────────────────────────────────────

/// Read-only view of a conversation's latest message.
///
/// Built by the driver from whatever the mail service returns; the
/// classifier never mutates it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSnapshot {
    /// Bare sender address (may be empty when the service only gives a display field).
    pub sender_address: String,
    /// Raw `From` field, e.g. `Jane Doe <jane@example.com>`.
    pub sender_display: String,
    /// Subject line. Missing is treated as empty.
    pub subject: Option<String>,
    /// Plain-text body. Missing is treated as empty.
    pub plain_body: Option<String>,
    pub is_unread: bool,
}

impl ConversationSnapshot {
    /// Snapshot of a fetched mail message.
    pub fn from_message(message: &MailMessage) -> Self {
        Self {
            sender_address: crate::pipeline::classifier::extract_address(&message.from),
            sender_display: message.from.clone(),
            subject: message.subject.clone(),
            plain_body: message.plain_body.clone(),
            is_unread: message.is_unread,
        }
    }

    /// Subject or the empty string.
    pub fn subject_or_empty(&self) -> &str {
        self.subject.as_deref().unwrap_or_default()
    }

    /// Body or the empty string.
    pub fn body_or_empty(&self) -> &str {
        self.plain_body.as_deref().unwrap_or_default()
    }
}

// ── Policy ──────────────────────────────────────────────────────────

/// Immutable classification rules for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationPolicy {
    /// Case-sensitive subject prefixes marking test messages.
    pub test_prefixes: Vec<String>,
    /// Subject prefix routing a message to the feedback template.
    pub feedback_subject_prefix: String,
    /// Fixed subject used for feedback replies.
    pub feedback_reply_subject: String,
    /// The account's own address; messages from it are never answered.
    pub own_address: String,
}

// ── Classification result ───────────────────────────────────────────

/// Why a conversation gets no reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    EmojiReaction,
    TestMessage,
    SelfSent,
}

/// Which template a reply uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyTemplate {
    Default,
    Feedback,
}

/// Decision for a single conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Classification {
    Skip {
        reason: SkipReason,
    },
    Reply {
        template: ReplyTemplate,
        reply_subject: String,
    },
}

impl Classification {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Skip {
                reason: SkipReason::EmojiReaction,
            } => "skip_emoji",
            Self::Skip {
                reason: SkipReason::TestMessage,
            } => "skip_test",
            Self::Skip {
                reason: SkipReason::SelfSent,
            } => "skip_self",
            Self::Reply {
                template: ReplyTemplate::Default,
                ..
            } => "reply_default",
            Self::Reply {
                template: ReplyTemplate::Feedback,
                ..
            } => "reply_feedback",
        }
    }
}
