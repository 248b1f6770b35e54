//! IMAP + SMTP mailbox: raw IMAP over rustls for reading, lettre for sending.
//!
//! Labels are IMAP keywords and every message is treated as its own
//! conversation (plain IMAP has no thread ids). Each operation opens a
//! short-lived session on a blocking thread.

use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use mail_parser::{MessageParser, MimeHeaders};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info, warn};

use crate::channels::imap::{FetchedMessage, ImapSession, search_string};
use crate::channels::{Draft, MailAttachment, MailMessage, MailService, MailThread, OutgoingMail};
use crate::config::{env_parse, env_string};
use crate::error::{ConfigError, MailError};

// ── Configuration ───────────────────────────────────────────────────

/// Mailbox configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub imap_host: String,
    pub imap_port: u16,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
    pub inbox_mailbox: String,
    pub drafts_mailbox: String,
    pub trash_mailbox: String,
}

impl EmailConfig {
    /// Build config from environment variables. `EMAIL_IMAP_HOST` is required.
    pub fn from_env() -> Result<Self, ConfigError> {
        let imap_host = std::env::var("EMAIL_IMAP_HOST")
            .map_err(|_| ConfigError::MissingEnvVar("EMAIL_IMAP_HOST".into()))?;
        let smtp_host = env_string("EMAIL_SMTP_HOST", &imap_host.replace("imap", "smtp"));
        let username = env_string("EMAIL_USERNAME", "");
        let from_address = env_string("EMAIL_FROM_ADDRESS", &username);

        Ok(Self {
            imap_port: env_parse("EMAIL_IMAP_PORT", 993)?,
            smtp_port: env_parse("EMAIL_SMTP_PORT", 587)?,
            password: SecretString::from(env_string("EMAIL_PASSWORD", "")),
            inbox_mailbox: env_string("EMAIL_INBOX_MAILBOX", "INBOX"),
            drafts_mailbox: env_string("EMAIL_DRAFTS_MAILBOX", "[Gmail]/Drafts"),
            trash_mailbox: env_string("EMAIL_TRASH_MAILBOX", "[Gmail]/Trash"),
            imap_host,
            smtp_host,
            username,
            from_address,
        })
    }
}

// ── Mailbox ─────────────────────────────────────────────────────────

/// `MailService` backed by a real IMAP/SMTP account.
pub struct ImapSmtpMailbox {
    config: EmailConfig,
}

impl ImapSmtpMailbox {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    /// Run `f` against a fresh session on a blocking thread, then log out.
    async fn with_session<T, F>(&self, mailbox: &str, f: F) -> Result<T, MailError>
    where
        T: Send + 'static,
        F: FnOnce(&mut ImapSession) -> Result<T, MailError> + Send + 'static,
    {
        let cfg = self.config.clone();
        let mailbox = mailbox.to_string();
        tokio::task::spawn_blocking(move || {
            let mut session = ImapSession::connect(
                &cfg.imap_host,
                cfg.imap_port,
                &cfg.username,
                cfg.password.expose_secret(),
            )?;
            session.select(&mailbox)?;
            let result = f(&mut session);
            session.logout();
            result
        })
        .await
        .map_err(|e| MailError::Protocol {
            command: "session".into(),
            reason: format!("IMAP task panicked: {e}"),
        })?
    }

    /// Send via SMTP (blocking transport on a blocking thread).
    fn send_blocking(config: &EmailConfig, mail: &OutgoingMail) -> Result<(), MailError> {
        let message = build_message(&config.from_address, mail)?;

        let creds = Credentials::new(
            config.username.clone(),
            config.password.expose_secret().to_string(),
        );
        let transport = SmtpTransport::relay(&config.smtp_host)
            .map_err(|e| MailError::SendFailed {
                to: mail.to.clone(),
                reason: format!("SMTP relay error: {e}"),
            })?
            .port(config.smtp_port)
            .credentials(creds)
            .timeout(Some(Duration::from_secs(30)))
            .build();

        transport.send(&message).map_err(|e| MailError::SendFailed {
            to: mail.to.clone(),
            reason: format!("SMTP send failed: {e}"),
        })?;
        Ok(())
    }
}

fn parse_uid(thread_id: &str) -> Result<u32, MailError> {
    thread_id
        .parse()
        .map_err(|_| MailError::ThreadNotFound(thread_id.to_string()))
}

/// Fetch and convert every UID, skipping messages that fail to parse.
fn fetch_threads(session: &mut ImapSession, uids: &[u32]) -> Result<Vec<MailThread>, MailError> {
    let mut threads = Vec::with_capacity(uids.len());
    for uid in uids {
        match session.uid_fetch(*uid)? {
            Some(fetched) => match to_thread(&fetched) {
                Some(thread) => threads.push(thread),
                None => warn!(uid, "Skipping unparseable message"),
            },
            None => debug!(uid, "Message vanished before fetch"),
        }
    }
    Ok(threads)
}

#[async_trait]
impl MailService for ImapSmtpMailbox {
    fn account_address(&self) -> &str {
        &self.config.from_address
    }

    async fn ensure_label(&self, _label: &str) -> Result<bool, MailError> {
        // Keywords spring into existence on first STORE.
        Ok(false)
    }

    async fn unread_without_label(
        &self,
        label: &str,
        max: usize,
    ) -> Result<Vec<MailThread>, MailError> {
        let criteria = format!("UNSEEN UNKEYWORD {}", keyword(label));
        self.with_session(&self.config.inbox_mailbox.clone(), move |session| {
            let mut uids = session.uid_search(&criteria)?;
            // Newest first.
            uids.reverse();
            uids.truncate(max);
            fetch_threads(session, &uids)
        })
        .await
    }

    async fn add_label(&self, thread_id: &str, label: &str) -> Result<(), MailError> {
        let uid = parse_uid(thread_id)?;
        let flag = keyword(label);
        self.with_session(&self.config.inbox_mailbox.clone(), move |session| {
            session.uid_add_flags(uid, &flag)
        })
        .await
    }

    async fn drafts(&self) -> Result<Vec<Draft>, MailError> {
        self.with_session(&self.config.drafts_mailbox.clone(), |session| {
            let uids = session.uid_search("ALL")?;
            let mut drafts = Vec::with_capacity(uids.len());
            for uid in uids {
                if let Some(fetched) = session.uid_fetch(uid)?
                    && let Some(draft) = to_draft(&fetched)
                {
                    drafts.push(draft);
                }
            }
            Ok(drafts)
        })
        .await
    }

    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        let config = self.config.clone();
        let to = mail.to.clone();
        tokio::task::spawn_blocking(move || Self::send_blocking(&config, &mail))
            .await
            .map_err(|e| MailError::SendFailed {
                to: to.clone(),
                reason: format!("SMTP task panicked: {e}"),
            })??;
        info!("Mail sent");
        Ok(())
    }

    async fn threads_involving(
        &self,
        address: &str,
        start: usize,
        max: usize,
    ) -> Result<Vec<MailThread>, MailError> {
        let needle = search_string(address);
        let criteria = format!("OR FROM {needle} TO {needle}");
        self.with_session(&self.config.inbox_mailbox.clone(), move |session| {
            let uids: Vec<u32> = session
                .uid_search(&criteria)?
                .into_iter()
                .skip(start)
                .take(max)
                .collect();
            fetch_threads(session, &uids)
        })
        .await
    }

    async fn move_to_trash(&self, thread_id: &str) -> Result<(), MailError> {
        let uid = parse_uid(thread_id)?;
        let trash = self.config.trash_mailbox.clone();
        self.with_session(&self.config.inbox_mailbox.clone(), move |session| {
            session.uid_copy(uid, &trash)?;
            session.uid_add_flags(uid, "\\Deleted")?;
            session.expunge()
        })
        .await
    }
}

// ── Conversion helpers (public for testing) ─────────────────────────

/// IMAP keywords are atoms: keep alphanumerics, `_`, `-`, `.`.
pub fn keyword(label: &str) -> String {
    let atom: String = label
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        .collect();
    if atom.is_empty() {
        "Label".to_string()
    } else {
        atom
    }
}

/// Strip HTML tags from content (basic).
pub fn strip_html(html: &str) -> String {
    let mut result = String::new();
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }
    result.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `From` header rendered as `Name <address>` (or just the address).
fn extract_from(parsed: &mail_parser::Message) -> String {
    let Some(addr) = parsed.from().and_then(|a| a.first()) else {
        return String::new();
    };
    match (addr.name(), addr.address()) {
        // Render through lettre so names with specials (`"Doe, Jane"`) stay
        // quoted. Line breaks cannot be encoded in a quoted string.
        (Some(name), Some(address)) => {
            let name = name.replace(['\r', '\n'], " ");
            match address.parse::<lettre::Address>() {
                Ok(parsed) => Mailbox::new(Some(name), parsed).to_string(),
                Err(_) => format!("\"{}\" <{address}>", name.replace('"', "")),
            }
        }
        (None, Some(address)) => address.to_string(),
        (Some(name), None) => name.to_string(),
        (None, None) => String::new(),
    }
}

fn plain_text(parsed: &mail_parser::Message) -> Option<String> {
    if let Some(text) = parsed.body_text(0) {
        return Some(text.to_string());
    }
    parsed.body_html(0).map(|html| strip_html(html.as_ref()))
}

/// Convert a fetched message into a single-message conversation.
pub fn to_thread(fetched: &FetchedMessage) -> Option<MailThread> {
    let parsed = MessageParser::default().parse(&fetched.raw)?;
    let message = MailMessage {
        from: extract_from(&parsed),
        subject: parsed.subject().map(String::from),
        plain_body: plain_text(&parsed),
        html_body: parsed.body_html(0).map(|h| h.to_string()),
        is_unread: !fetched.is_seen(),
    };
    Some(MailThread {
        id: fetched.uid.to_string(),
        messages: vec![message],
    })
}

/// Convert a fetched draft, keeping its binary parts.
pub fn to_draft(fetched: &FetchedMessage) -> Option<Draft> {
    let parsed = MessageParser::default().parse(&fetched.raw)?;
    let attachments = parsed
        .attachments()
        .enumerate()
        .map(|(index, part)| {
            let content_type = MimeHeaders::content_type(part)
                .map(|ct| match ct.subtype() {
                    Some(sub) => format!("{}/{}", ct.ctype(), sub),
                    None => ct.ctype().to_string(),
                })
                .unwrap_or_else(|| "application/octet-stream".to_string());
            let name = MimeHeaders::attachment_name(part)
                .map(String::from)
                .or_else(|| MimeHeaders::content_id(part).map(String::from))
                .unwrap_or_else(|| format!("part{index}"));
            MailAttachment {
                name,
                content_type,
                data: part.contents().to_vec(),
            }
        })
        .collect();

    Some(Draft {
        id: fetched.uid.to_string(),
        subject: parsed.subject().unwrap_or_default().to_string(),
        plain_body: plain_text(&parsed).unwrap_or_default(),
        html_body: parsed.body_html(0).map(|h| h.to_string()),
        attachments,
    })
}

fn send_error(mail: &OutgoingMail, reason: impl std::fmt::Display) -> MailError {
    MailError::SendFailed {
        to: mail.to.clone(),
        reason: reason.to_string(),
    }
}

fn content_type(mail: &OutgoingMail, raw: &str) -> Result<ContentType, MailError> {
    ContentType::parse(raw)
        .map_err(|e| send_error(mail, format!("invalid content type {raw}: {e}")))
}

/// Build the MIME message: alternative(plain, html) wrapped in `related`
/// when inline images exist and in `mixed` when attachments exist.
pub fn build_message(from_address: &str, mail: &OutgoingMail) -> Result<Message, MailError> {
    let from_addr = from_address
        .parse()
        .map_err(|e| send_error(mail, format!("invalid from address: {e}")))?;
    let from = Mailbox::new(mail.sender_name.clone(), from_addr);
    let to: Mailbox = mail
        .to
        .parse()
        .map_err(|e| send_error(mail, format!("invalid to address: {e}")))?;

    let mut builder = Message::builder().from(from).to(to).subject(&mail.subject);
    if let Some(reply_to) = &mail.reply_to {
        let reply_to: Mailbox = reply_to
            .parse()
            .map_err(|e| send_error(mail, format!("invalid reply-to address: {e}")))?;
        builder = builder.reply_to(reply_to);
    }

    if mail.html_body.is_none() && mail.attachments.is_empty() {
        return builder
            .singlepart(SinglePart::plain(mail.plain_body.clone()))
            .map_err(|e| send_error(mail, format!("failed to build mail: {e}")));
    }

    // Inline images only make sense next to an HTML body.
    let mut body = match &mail.html_body {
        Some(html) => {
            let mut body = MultiPart::alternative_plain_html(mail.plain_body.clone(), html.clone());
            if !mail.inline_images.is_empty() {
                let mut related = MultiPart::related().multipart(body);
                for (content_id, image) in &mail.inline_images {
                    related = related.singlepart(
                        Attachment::new_inline(content_id.clone())
                            .body(image.data.clone(), content_type(mail, &image.content_type)?),
                    );
                }
                body = related;
            }
            if mail.attachments.is_empty() {
                body
            } else {
                MultiPart::mixed().multipart(body)
            }
        }
        None => MultiPart::mixed().singlepart(SinglePart::plain(mail.plain_body.clone())),
    };

    for attachment in &mail.attachments {
        body = body.singlepart(
            Attachment::new(attachment.name.clone())
                .body(attachment.data.clone(), content_type(mail, &attachment.content_type)?),
        );
    }

    builder
        .multipart(body)
        .map_err(|e| send_error(mail, format!("failed to build mail: {e}")))
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn fetched(uid: u32, flags: &[&str], raw: &str) -> FetchedMessage {
        FetchedMessage {
            uid,
            flags: flags.iter().map(|f| f.to_string()).collect(),
            raw: raw.replace('\n', "\r\n").into_bytes(),
        }
    }

    const PLAIN: &str = "From: Jane Doe <jane@example.com>\n\
To: me@example.com\n\
Subject: Question about pricing\n\
Content-Type: text/plain; charset=utf-8\n\
\n\
How much does it cost?\n";

    #[test]
    fn keyword_sanitizes_label() {
        assert_eq!(keyword("AutoResponded"), "AutoResponded");
        assert_eq!(keyword("Auto Responded!"), "AutoResponded");
        assert_eq!(keyword("***"), "Label");
    }

    #[test]
    fn strip_html_basic() {
        assert_eq!(strip_html("<p>Hello</p>"), "Hello");
        assert_eq!(
            strip_html("<div><b>Bold</b>   and <i>italic</i></div>"),
            "Bold and italic"
        );
        assert_eq!(strip_html(""), "");
    }

    #[test]
    fn to_thread_reads_headers_and_flags() {
        let thread = to_thread(&fetched(42, &[], PLAIN)).unwrap();
        assert_eq!(thread.id, "42");
        let msg = thread.latest().unwrap();
        assert_eq!(msg.from, "Jane Doe <jane@example.com>");
        assert_eq!(msg.subject.as_deref(), Some("Question about pricing"));
        assert!(msg.plain_body.as_deref().unwrap().contains("How much"));
        assert!(msg.is_unread);

        let seen = to_thread(&fetched(42, &["\\Seen"], PLAIN)).unwrap();
        assert!(!seen.messages[0].is_unread);
    }

    #[test]
    fn reply_to_quoted_display_name_builds() {
        let raw = PLAIN.replace("From: Jane Doe <", "From: \"Doe, Jane\" <");
        let thread = to_thread(&fetched(43, &[], &raw)).unwrap();
        let from = &thread.latest().unwrap().from;
        assert_eq!(from, "\"Doe, Jane\" <jane@example.com>");
        assert!(from.parse::<Mailbox>().is_ok());

        let to = crate::pipeline::classifier::extract_address(from);
        assert_eq!(to, "jane@example.com");
        let reply = OutgoingMail::new(to, "Re: Question about pricing", "Thanks!");
        assert!(build_message("me@example.com", &reply).is_ok());
    }

    #[test]
    fn to_draft_without_attachments() {
        let draft = to_draft(&fetched(7, &["\\Draft"], PLAIN)).unwrap();
        assert_eq!(draft.id, "7");
        assert_eq!(draft.subject, "Question about pricing");
        assert!(draft.attachments.is_empty());
    }

    #[test]
    fn build_plain_message() {
        let mail = OutgoingMail::new("Jane <jane@example.com>", "Re: Hello", "Thanks!")
            .with_sender_name("Team")
            .with_reply_to("me@example.com");
        let message = build_message("me@example.com", &mail).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("Subject: Re: Hello"));
        assert!(raw.contains("Reply-To: me@example.com"));
        assert!(raw.contains("From: Team <me@example.com>"));
        assert!(raw.contains("Thanks!"));
    }

    #[test]
    fn build_html_message_with_inline_image_and_attachment() {
        let image = MailAttachment {
            name: "logo.png".into(),
            content_type: "image/png".into(),
            data: vec![0x89, 0x50, 0x4e, 0x47],
        };
        let pdf = MailAttachment {
            name: "terms.pdf".into(),
            content_type: "application/pdf".into(),
            data: vec![1, 2, 3],
        };
        let mail = OutgoingMail::new("jane@example.com", "Hi", "plain")
            .with_html("<img src=\"cid:img0\">")
            .with_inline_image("img0", image)
            .with_attachment(pdf);
        let message = build_message("me@example.com", &mail).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("multipart/mixed"));
        assert!(raw.contains("multipart/related"));
        assert!(raw.contains("multipart/alternative"));
        assert!(raw.contains("Content-ID: <img0>"));
        assert!(raw.contains("terms.pdf"));
    }

    #[test]
    fn build_plain_message_keeps_attachments() {
        let pdf = MailAttachment {
            name: "terms.pdf".into(),
            content_type: "application/pdf".into(),
            data: vec![1, 2, 3],
        };
        let mail = OutgoingMail::new("jane@example.com", "Hi", "plain").with_attachment(pdf);
        let message = build_message("me@example.com", &mail).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("multipart/mixed"));
        assert!(!raw.contains("multipart/alternative"));
        assert!(raw.contains("terms.pdf"));
    }

    #[test]
    fn build_rejects_bad_recipient() {
        let mail = OutgoingMail::new("not an address", "Hi", "plain");
        let err = build_message("me@example.com", &mail).unwrap_err();
        assert!(matches!(err, MailError::SendFailed { .. }));
    }

    #[test]
    fn config_from_env_requires_imap_host() {
        // SAFETY: no other test reads EMAIL_IMAP_HOST.
        unsafe { std::env::remove_var("EMAIL_IMAP_HOST") };
        assert!(matches!(
            EmailConfig::from_env(),
            Err(ConfigError::MissingEnvVar(_))
        ));
    }
}
