//! Auto-responder: answers unread conversations from a draft template.
//!
//! Every handled conversation gets the idempotency label, so a run is safe
//! to repeat. Failures leave the conversation unlabelled and the next run
//! retries it.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::channels::{Draft, MailService, MailThread};
use crate::config::ResponderConfig;
use crate::error::{AutomationError, MailError};
use crate::pipeline::classifier::classify;
use crate::pipeline::types::{
    Classification, ClassificationPolicy, ConversationSnapshot, ReplyTemplate, SkipReason,
};
use crate::privacy::Redactor;
use crate::scheduler::{Handler, JobScheduler, Trigger, TriggerSchedule};
use crate::templates;

/// Counters for one responder run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResponderSummary {
    pub found: usize,
    pub sent: usize,
    pub failed: usize,
    pub skipped_emoji: usize,
    pub skipped_test: usize,
    pub skipped_self: usize,
    pub skipped_missing_template: usize,
}

impl ResponderSummary {
    fn count_skip(&mut self, reason: SkipReason) {
        match reason {
            SkipReason::EmojiReaction => self.skipped_emoji += 1,
            SkipReason::TestMessage => self.skipped_test += 1,
            SkipReason::SelfSent => self.skipped_self += 1,
        }
    }
}

/// What happened to one conversation.
enum Handled {
    Sent,
    Skipped(SkipReason),
    MissingTemplate,
    AlreadyRead,
}

pub struct AutoResponder {
    mail: Arc<dyn MailService>,
    config: ResponderConfig,
    redactor: Redactor,
}

impl AutoResponder {
    pub fn new(mail: Arc<dyn MailService>, config: ResponderConfig, redactor: Redactor) -> Self {
        Self {
            mail,
            config,
            redactor,
        }
    }

    pub fn config(&self) -> &ResponderConfig {
        &self.config
    }

    fn policy(&self) -> ClassificationPolicy {
        ClassificationPolicy {
            test_prefixes: self.config.test_prefixes.clone(),
            feedback_subject_prefix: self.config.feedback_subject_prefix.clone(),
            feedback_reply_subject: self.config.feedback_reply_subject.clone(),
            own_address: self.mail.account_address().to_string(),
        }
    }

    /// One pass over the inbox.
    pub async fn run(&self) -> Result<ResponderSummary, AutomationError> {
        let label = &self.config.label_name;
        if self.mail.ensure_label(label).await? {
            info!(label = %label, "Label created");
        }

        let threads = self
            .mail
            .unread_without_label(label, self.config.max_threads_per_run)
            .await?;
        let mut summary = ResponderSummary {
            found: threads.len(),
            ..Default::default()
        };
        if threads.is_empty() {
            info!("No new mail");
            return Ok(summary);
        }
        info!(count = threads.len(), "New conversations found");

        let drafts = self.mail.drafts().await?;
        let default_draft = templates::find_exact(&drafts, &self.config.draft_subject)
            .ok_or_else(|| AutomationError::DraftMissing {
                subject: self.config.draft_subject.clone(),
            })?;
        let feedback_draft = templates::find_exact(&drafts, &self.config.feedback_draft_subject);
        if feedback_draft.is_none() {
            warn!(
                subject = %self.config.feedback_draft_subject,
                "Feedback draft not found, feedback mails will be skipped"
            );
        }

        let policy = self.policy();
        for thread in &threads {
            let sender = thread.latest().map(|m| m.from.as_str()).unwrap_or_default();
            match self.handle(thread, &policy, default_draft, feedback_draft).await {
                Ok(Handled::Sent) => {
                    summary.sent += 1;
                    info!(to = %self.redactor.email(sender), "Auto-response sent");
                }
                Ok(Handled::Skipped(reason)) => {
                    summary.count_skip(reason);
                    debug!(from = %self.redactor.email(sender), reason = ?reason, "Skipped");
                }
                Ok(Handled::MissingTemplate) => {
                    summary.skipped_missing_template += 1;
                    info!(from = %self.redactor.email(sender), "Feedback draft missing, skipped");
                }
                Ok(Handled::AlreadyRead) => {}
                Err(e) => {
                    summary.failed += 1;
                    warn!(from = %self.redactor.email(sender), error = %e, "Auto-response failed");
                }
            }
        }

        info!(
            sent = summary.sent,
            failed = summary.failed,
            skipped_emoji = summary.skipped_emoji,
            skipped_test = summary.skipped_test,
            skipped_self = summary.skipped_self,
            skipped_missing_template = summary.skipped_missing_template,
            "Auto-responder run finished"
        );
        Ok(summary)
    }

    async fn handle(
        &self,
        thread: &MailThread,
        policy: &ClassificationPolicy,
        default_draft: &Draft,
        feedback_draft: Option<&Draft>,
    ) -> Result<Handled, MailError> {
        let Some(latest) = thread.latest() else {
            return Ok(Handled::AlreadyRead);
        };
        if !latest.is_unread {
            return Ok(Handled::AlreadyRead);
        }

        let snapshot = ConversationSnapshot::from_message(latest);
        let classification = classify(&snapshot, policy);
        debug!(thread = %thread.id, decision = classification.label(), "Classified");

        let (template, reply_subject) = match classification {
            Classification::Skip { reason } => {
                self.mail.add_label(&thread.id, &self.config.label_name).await?;
                return Ok(Handled::Skipped(reason));
            }
            Classification::Reply {
                template,
                reply_subject,
            } => (template, reply_subject),
        };

        let draft = match template {
            ReplyTemplate::Default => default_draft,
            ReplyTemplate::Feedback => match feedback_draft {
                Some(draft) => draft,
                None => {
                    self.mail.add_label(&thread.id, &self.config.label_name).await?;
                    return Ok(Handled::MissingTemplate);
                }
            },
        };

        let rendered = templates::Rendered::from_draft(draft, &[], "");
        let mail = rendered
            .into_mail_with_subject(&snapshot.sender_address, reply_subject)
            .with_reply_to(self.mail.account_address());
        let mail = templates::numbered_inline_images(mail, &draft.attachments);

        self.mail.send(mail).await?;
        self.mail.add_label(&thread.id, &self.config.label_name).await?;
        Ok(Handled::Sent)
    }
}

/// Replace any responder trigger with one firing every
/// `check_interval_minutes`.
pub async fn install_responder_trigger(
    scheduler: &JobScheduler,
    config: &ResponderConfig,
) -> Result<Trigger, AutomationError> {
    let trigger = scheduler
        .replace(
            Handler::AutoRespond,
            TriggerSchedule::EveryMinutes {
                minutes: config.check_interval_minutes,
            },
        )
        .await?;
    info!(minutes = config.check_interval_minutes, "Responder trigger installed");
    Ok(trigger)
}

/// Remove the responder trigger; returns how many were removed.
pub async fn remove_responder_trigger(scheduler: &JobScheduler) -> Result<usize, AutomationError> {
    Ok(scheduler.remove(Handler::AutoRespond).await?)
}
