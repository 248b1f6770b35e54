//! User data erasure: confirm, delete contacts, trash every conversation.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::channels::MailService;
use crate::config::ErasureConfig;
use crate::contacts::{ContactsDirectory, Person};
use crate::error::AutomationError;
use crate::privacy::{Redactor, is_valid_email};
use crate::templates::{self, Rendered};

/// Placeholder replaced by the target address in the confirmation.
pub const EMAIL_PLACEHOLDER: &str = "{EMAIL}";

/// Outcome of one erasure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ErasureReport {
    pub confirmation_sent: bool,
    pub contacts_deleted: usize,
    pub threads_deleted: usize,
    /// Per-item failures that did not stop the erasure.
    pub errors: Vec<String>,
}

async fn pause(duration: Duration) {
    if !duration.is_zero() {
        tokio::time::sleep(duration).await;
    }
}

pub struct DataEraser {
    mail: Arc<dyn MailService>,
    contacts: Arc<dyn ContactsDirectory>,
    config: ErasureConfig,
    redactor: Redactor,
}

impl DataEraser {
    pub fn new(
        mail: Arc<dyn MailService>,
        contacts: Arc<dyn ContactsDirectory>,
        config: ErasureConfig,
        redactor: Redactor,
    ) -> Self {
        Self {
            mail,
            contacts,
            config,
            redactor,
        }
    }

    /// Erase the configured target address.
    pub async fn erase_configured(&self) -> Result<ErasureReport, AutomationError> {
        let target = self
            .config
            .target_address
            .clone()
            .ok_or(AutomationError::MissingTarget)?;
        self.erase(&target).await
    }

    /// Erase everything stored about `address`.
    pub async fn erase(&self, address: &str) -> Result<ErasureReport, AutomationError> {
        let address = address.trim();
        if !is_valid_email(address) {
            return Err(AutomationError::InvalidAddress(self.redactor.email(address)));
        }
        let target = self.redactor.email(address);

        warn!(
            target = %target,
            delay_ms = self.config.start_delay.as_millis() as u64,
            "Erasure starts after the grace period"
        );
        pause(self.config.start_delay).await;
        info!(target = %target, "Erasure started");

        let mut report = ErasureReport::default();

        match self.send_confirmation(address).await {
            Ok(()) => {
                report.confirmation_sent = true;
                pause(self.config.pacing.after_confirmation).await;
            }
            Err(e) => warn!(
                target = %target,
                error = %e,
                "Confirmation not sent, continuing with erasure"
            ),
        }

        report.contacts_deleted = self.delete_contacts(address, &mut report.errors).await?;
        report.threads_deleted = self.trash_threads(address, &mut report.errors).await?;

        info!(
            target = %target,
            contacts_deleted = report.contacts_deleted,
            threads_deleted = report.threads_deleted,
            confirmation_sent = report.confirmation_sent,
            errors = report.errors.len(),
            "Erasure finished"
        );
        Ok(report)
    }

    /// Contacts that `erase` would delete.
    pub async fn preview_contacts(&self, address: &str) -> Result<Vec<Person>, AutomationError> {
        let address = address.trim();
        Ok(self
            .contacts
            .connections()
            .await?
            .into_iter()
            .filter(|p| p.has_address(address))
            .collect())
    }

    /// Send the confirmation to the test address only.
    pub async fn send_test_confirmation(&self) -> Result<(), AutomationError> {
        let address = self
            .config
            .test_address
            .as_deref()
            .ok_or(AutomationError::MissingTarget)?;
        if !is_valid_email(address) {
            return Err(AutomationError::InvalidAddress(self.redactor.email(address)));
        }
        self.send_confirmation(address).await?;
        info!(to = %self.redactor.email(address), "Test confirmation sent");
        Ok(())
    }

    async fn send_confirmation(&self, address: &str) -> Result<(), AutomationError> {
        let drafts = self.mail.drafts().await?;
        let draft = templates::find_exact(&drafts, &self.config.draft_subject).ok_or_else(|| {
            AutomationError::DraftMissing {
                subject: self.config.draft_subject.clone(),
            }
        })?;

        let subject = templates::fill(&self.config.final_subject, &[EMAIL_PLACEHOLDER], address);
        let mail = Rendered::from_draft(draft, &[EMAIL_PLACEHOLDER], address)
            .into_mail_with_subject(address, subject);
        let mail = templates::attach_by_reference(mail, &draft.attachments);
        info!(
            to = %self.redactor.email(address),
            inline = mail.inline_images.len(),
            attachments = mail.attachments.len(),
            "Sending erasure confirmation"
        );

        self.mail.send(mail).await?;
        Ok(())
    }

    async fn delete_contacts(
        &self,
        address: &str,
        errors: &mut Vec<String>,
    ) -> Result<usize, AutomationError> {
        let matching = self.preview_contacts(address).await?;
        if matching.is_empty() {
            info!("No matching contacts");
            return Ok(0);
        }
        info!(count = matching.len(), "Deleting matching contacts");

        let mut deleted = 0;
        for person in &matching {
            match self.contacts.delete_contact(&person.resource_name).await {
                Ok(()) => {
                    deleted += 1;
                    info!(contact = %person.resource_name, "Contact deleted");
                }
                Err(e) => {
                    warn!(contact = %person.resource_name, error = %e, "Failed to delete contact");
                    errors.push(format!("contact {}: {e}", person.resource_name));
                }
            }
            pause(self.config.pacing.between_contacts).await;
        }
        Ok(deleted)
    }

    /// Trashed conversations leave the result set, so the next page starts
    /// at the number of conversations that could not be trashed.
    async fn trash_threads(
        &self,
        address: &str,
        errors: &mut Vec<String>,
    ) -> Result<usize, AutomationError> {
        let batch_size = self.config.max_threads_per_batch.max(1);
        let mut start = 0;
        let mut trashed = 0;
        let mut batch_number = 0;

        loop {
            let threads = self.mail.threads_involving(address, start, batch_size).await?;
            if threads.is_empty() {
                break;
            }
            batch_number += 1;
            info!(batch = batch_number, count = threads.len(), start, "Trashing conversations");

            for thread in &threads {
                match self.mail.move_to_trash(&thread.id).await {
                    Ok(()) => {
                        trashed += 1;
                        info!(
                            thread = %thread.id,
                            messages = thread.message_count(),
                            "Conversation moved to trash"
                        );
                    }
                    Err(e) => {
                        start += 1;
                        warn!(thread = %thread.id, error = %e, "Failed to trash conversation");
                        errors.push(format!("thread {}: {e}", thread.id));
                    }
                }
            }

            if threads.len() < batch_size {
                break;
            }
            pause(self.config.pacing.between_batches).await;
        }

        if trashed == 0 {
            info!("No conversations found");
        }
        Ok(trashed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::{Draft, InMemoryMailbox, MailAttachment, MailMessage, MailThread};
    use crate::config::Pacing;
    use crate::contacts::JsonContacts;

    const TARGET: &str = "max@example.com";

    fn config() -> ErasureConfig {
        ErasureConfig {
            start_delay: Duration::ZERO,
            pacing: Pacing::none(),
            test_address: Some("tester@example.com".into()),
            ..Default::default()
        }
    }

    fn confirmation_draft() -> Draft {
        Draft {
            id: "d1".into(),
            subject: ErasureConfig::default().draft_subject,
            plain_body: "Daten zu {EMAIL} gelöscht.".into(),
            html_body: Some("<p>{EMAIL}</p><img src=\"cid:logo.png\">".into()),
            attachments: vec![
                MailAttachment {
                    name: "logo.png".into(),
                    content_type: "image/png".into(),
                    data: vec![1],
                },
                MailAttachment {
                    name: "info.pdf".into(),
                    content_type: "application/pdf".into(),
                    data: vec![2],
                },
            ],
        }
    }

    fn thread(id: &str, from: &str) -> MailThread {
        MailThread {
            id: id.into(),
            messages: vec![MailMessage {
                from: from.into(),
                subject: Some("Hallo".into()),
                plain_body: Some("Text".into()),
                html_body: None,
                is_unread: false,
            }],
        }
    }

    async fn setup(config: ErasureConfig) -> (Arc<InMemoryMailbox>, Arc<JsonContacts>, DataEraser) {
        let mailbox = Arc::new(InMemoryMailbox::new("team@haptigation.de"));
        let contacts = Arc::new(JsonContacts::in_memory());
        let eraser =
            DataEraser::new(mailbox.clone(), contacts.clone(), config, Redactor::default());
        (mailbox, contacts, eraser)
    }

    #[tokio::test]
    async fn full_erasure() {
        let (mailbox, contacts, eraser) = setup(config()).await;
        mailbox.add_draft(confirmation_draft());
        mailbox.add_thread(thread("t1", "Max <MAX@example.com>"));
        mailbox.add_thread(thread("t2", TARGET));
        mailbox.add_thread(thread("t3", "other@example.com"));
        contacts.add_person("Max", &["Max@Example.com"]).await.unwrap();
        contacts.add_person("Other", &["other@example.com"]).await.unwrap();

        let report = eraser.erase(TARGET).await.unwrap();
        assert!(report.confirmation_sent);
        assert_eq!(report.contacts_deleted, 1);
        assert_eq!(report.threads_deleted, 2);
        assert!(report.errors.is_empty());
        assert!(!mailbox.is_trashed("t3"));
        assert_eq!(contacts.connections().await.unwrap().len(), 1);

        let sent = mailbox.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, TARGET);
        assert_eq!(sent[0].subject, "Wir haben ihre Nutzerdaten gelöscht");
        assert_eq!(sent[0].plain_body, "Daten zu max@example.com gelöscht.");
        assert_eq!(sent[0].inline_images.len(), 1);
        assert_eq!(sent[0].attachments[0].name, "info.pdf");
    }

    #[tokio::test]
    async fn invalid_address_touches_nothing() {
        let (mailbox, _contacts, eraser) = setup(config()).await;
        mailbox.add_draft(confirmation_draft());
        let err = eraser.erase("not-an-address").await.unwrap_err();
        assert!(matches!(err, AutomationError::InvalidAddress(_)));
        assert!(mailbox.sent().is_empty());
    }

    #[tokio::test]
    async fn missing_draft_does_not_stop_erasure() {
        let (mailbox, _contacts, eraser) = setup(config()).await;
        mailbox.add_thread(thread("t1", TARGET));

        let report = eraser.erase(TARGET).await.unwrap();
        assert!(!report.confirmation_sent);
        assert_eq!(report.threads_deleted, 1);
    }

    #[tokio::test]
    async fn pagination_skips_untrashable_threads() {
        let (mailbox, _contacts, eraser) = setup(ErasureConfig {
            max_threads_per_batch: 2,
            ..config()
        })
        .await;
        for i in 0..5 {
            mailbox.add_thread(thread(&format!("t{i}"), TARGET));
        }
        mailbox.fail_trash_of("t0");

        let report = eraser.erase(TARGET).await.unwrap();
        assert_eq!(report.threads_deleted, 4);
        assert_eq!(report.errors.len(), 1);
        assert!(!mailbox.is_trashed("t0"));
        for i in 1..5 {
            assert!(mailbox.is_trashed(&format!("t{i}")));
        }
    }

    #[tokio::test]
    async fn erase_configured_requires_target() {
        let (_mailbox, _contacts, eraser) = setup(config()).await;
        assert!(matches!(
            eraser.erase_configured().await,
            Err(AutomationError::MissingTarget)
        ));
    }

    #[tokio::test]
    async fn preview_lists_without_deleting() {
        let (_mailbox, contacts, eraser) = setup(config()).await;
        contacts.add_person("Max", &["work@x.com", TARGET]).await.unwrap();

        let preview = eraser.preview_contacts(TARGET).await.unwrap();
        assert_eq!(preview.len(), 1);
        assert_eq!(contacts.connections().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_confirmation_goes_to_test_address() {
        let (mailbox, _contacts, eraser) = setup(config()).await;
        mailbox.add_draft(confirmation_draft());

        eraser.send_test_confirmation().await.unwrap();
        let sent = mailbox.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "tester@example.com");
        assert!(sent[0].plain_body.contains("tester@example.com"));
    }
}
