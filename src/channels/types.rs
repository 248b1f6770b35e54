//! Mail types shared by every `MailService` implementation.

use serde::{Deserialize, Serialize};

/// A single message inside a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailMessage {
    /// Raw `From` field, e.g. `Jane Doe <jane@example.com>`.
    pub from: String,
    pub subject: Option<String>,
    pub plain_body: Option<String>,
    pub html_body: Option<String>,
    pub is_unread: bool,
}

/// A conversation: one or more messages sharing a subject lineage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailThread {
    pub id: String,
    /// Oldest first.
    pub messages: Vec<MailMessage>,
}

impl MailThread {
    /// The most recent message, if any.
    pub fn latest(&self) -> Option<&MailMessage> {
        self.messages.last()
    }

    /// Subject of the first message, or empty.
    pub fn first_subject(&self) -> &str {
        self.messages
            .first()
            .and_then(|m| m.subject.as_deref())
            .unwrap_or_default()
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }
}

/// A binary part carried by a draft or an outgoing mail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailAttachment {
    /// File name; doubles as the content id of inline images.
    pub name: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// A pre-authored message used as a reply or mailing template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Draft {
    pub id: String,
    pub subject: String,
    pub plain_body: String,
    pub html_body: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<MailAttachment>,
}

/// An outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMail {
    /// Recipient, either a bare address or `Name <address>`.
    pub to: String,
    pub subject: String,
    pub plain_body: String,
    pub html_body: Option<String>,
    /// Display name for the `From` header.
    pub sender_name: Option<String>,
    pub reply_to: Option<String>,
    /// Parts referenced from the HTML body by content id.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inline_images: Vec<(String, MailAttachment)>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<MailAttachment>,
}

impl OutgoingMail {
    pub fn new(
        to: impl Into<String>,
        subject: impl Into<String>,
        plain_body: impl Into<String>,
    ) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            plain_body: plain_body.into(),
            html_body: None,
            sender_name: None,
            reply_to: None,
            inline_images: Vec::new(),
            attachments: Vec::new(),
        }
    }

    pub fn with_html(mut self, html: impl Into<String>) -> Self {
        self.html_body = Some(html.into());
        self
    }

    pub fn with_sender_name(mut self, name: impl Into<String>) -> Self {
        self.sender_name = Some(name.into());
        self
    }

    pub fn with_reply_to(mut self, address: impl Into<String>) -> Self {
        self.reply_to = Some(address.into());
        self
    }

    pub fn with_inline_image(
        mut self,
        content_id: impl Into<String>,
        image: MailAttachment,
    ) -> Self {
        self.inline_images.push((content_id.into(), image));
        self
    }

    pub fn with_attachment(mut self, attachment: MailAttachment) -> Self {
        self.attachments.push(attachment);
        self
    }
}
