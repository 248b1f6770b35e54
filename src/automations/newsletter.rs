//! Newsletter: one personalised mail per group member, sent now or at a
//! scheduled local time.

use std::sync::Arc;

use chrono::{DateTime, Local, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::channels::{Draft, MailService};
use crate::config::NewsletterConfig;
use crate::contacts::{ContactsDirectory, load_group};
use crate::error::AutomationError;
use crate::privacy::Redactor;
use crate::scheduler::{Handler, JobScheduler, Trigger, TriggerSchedule};
use crate::templates::{self, Rendered};

/// Name placeholders, in every supported spelling.
pub const NAME_PLACEHOLDERS: [&str; 3] = ["[NAME]", "[Name]", "[name]"];

/// Subject prefix of test-mode sends.
pub const TEST_PREFIX: &str = "[TEST] ";

/// Contacts shown by `contact_overview`.
const OVERVIEW_LIMIT: usize = 20;

/// A newsletter recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recipient {
    pub address: String,
    pub name: String,
}

/// Everything a send needs, checked up front.
#[derive(Debug, Clone)]
pub struct Prerequisites {
    pub draft: Draft,
    pub contacts: Vec<Recipient>,
}

/// Who started a send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOrigin {
    Manual,
    Scheduled,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SendReport {
    pub test_mode: bool,
    pub recipients: usize,
    pub sent: usize,
    pub failed: usize,
    /// `anonymised address: error` per failed recipient.
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduledNewsletter {
    pub trigger_id: Uuid,
    pub at: DateTime<Local>,
    pub subject: String,
    pub recipients: usize,
    pub test_mode: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContactOverview {
    pub total: usize,
    /// `name (anonymised address)` for the first contacts.
    pub entries: Vec<String>,
}

/// Greeting for `name`: the fallback when empty or "unbekannt".
pub fn greeting_name<'a>(name: &'a str, fallback: &'a str) -> &'a str {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("unbekannt") {
        fallback
    } else {
        name
    }
}

pub struct Newsletter {
    mail: Arc<dyn MailService>,
    contacts: Arc<dyn ContactsDirectory>,
    scheduler: Arc<JobScheduler>,
    config: NewsletterConfig,
    redactor: Redactor,
}

impl Newsletter {
    pub fn new(
        mail: Arc<dyn MailService>,
        contacts: Arc<dyn ContactsDirectory>,
        scheduler: Arc<JobScheduler>,
        config: NewsletterConfig,
        redactor: Redactor,
    ) -> Self {
        Self {
            mail,
            contacts,
            scheduler,
            config,
            redactor,
        }
    }

    /// Exactly one newsletter draft and at least one contact.
    pub async fn validate(&self) -> Result<Prerequisites, AutomationError> {
        let drafts = self.mail.drafts().await?;
        if drafts.is_empty() {
            return Err(AutomationError::NoDrafts);
        }

        let matching = templates::find_containing(&drafts, &self.config.draft_marker);
        let draft = match matching.as_slice() {
            [draft] => (*draft).clone(),
            [] => {
                for d in &drafts {
                    info!(subject = %d.subject, "Available draft");
                }
                return Err(AutomationError::DraftNotFound {
                    marker: self.config.draft_marker.clone(),
                });
            }
            many => {
                return Err(AutomationError::AmbiguousDraft {
                    subjects: many.iter().map(|d| d.subject.clone()).collect(),
                });
            }
        };

        let contacts = self.recipients().await?;
        if contacts.is_empty() {
            return Err(AutomationError::NoContacts {
                label: self.config.contact_label.clone(),
            });
        }

        info!(subject = %draft.subject, contacts = contacts.len(), "Newsletter prerequisites ok");
        Ok(Prerequisites { draft, contacts })
    }

    /// Members of the newsletter group with a usable address.
    pub async fn recipients(&self) -> Result<Vec<Recipient>, AutomationError> {
        let Some(group) = load_group(
            self.contacts.as_ref(),
            &self.config.contact_label,
            self.config.max_group_members,
            self.config.batch_size,
        )
        .await?
        else {
            return Ok(Vec::new());
        };

        let mut recipients = Vec::with_capacity(group.members.len());
        for person in &group.members {
            let Some(address) = person.primary_email() else {
                continue;
            };
            let Some((local, _)) = address.split_once('@') else {
                warn!(address = %self.redactor.email(address), "Skipping invalid address");
                continue;
            };
            recipients.push(Recipient {
                address: address.to_string(),
                name: person.display_name().unwrap_or(local).to_string(),
            });
        }
        Ok(recipients)
    }

    /// Send the newsletter. In test mode only the account itself receives it.
    pub async fn send(&self, origin: SendOrigin) -> Result<SendReport, AutomationError> {
        let Prerequisites { draft, contacts } = self.validate().await?;

        let recipients = if self.config.test_mode {
            vec![Recipient {
                address: self.mail.account_address().to_string(),
                name: "Test".to_string(),
            }]
        } else {
            contacts
        };

        let mode = if self.config.test_mode { "test" } else { "live" };
        info!(
            mode,
            recipients = recipients.len(),
            subject = %draft.subject,
            origin = ?origin,
            "Sending newsletter"
        );

        let mut report = SendReport {
            test_mode: self.config.test_mode,
            recipients: recipients.len(),
            ..Default::default()
        };

        for (index, recipient) in recipients.iter().enumerate() {
            let name = greeting_name(&recipient.name, &self.config.fallback_name);
            let rendered = Rendered::from_draft(&draft, &NAME_PLACEHOLDERS, name);
            let subject = if self.config.test_mode {
                format!("{TEST_PREFIX}{}", rendered.subject)
            } else {
                rendered.subject.clone()
            };
            let mail = rendered
                .into_mail_with_subject(&recipient.address, subject)
                .with_sender_name(&self.config.sender_name);

            match self.mail.send(mail).await {
                Ok(()) => {
                    report.sent += 1;
                    if index < 3 || index + 1 == recipients.len() {
                        info!(
                            n = index + 1,
                            of = recipients.len(),
                            to = %self.redactor.email(&recipient.address),
                            "Newsletter sent"
                        );
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    let anon = self.redactor.email(&recipient.address);
                    warn!(to = %anon, error = %e, "Newsletter send failed");
                    report.errors.push(format!("{anon}: {e}"));
                }
            }

            if self.config.pause_every > 0
                && (index + 1) % self.config.pause_every == 0
                && !self.config.pause.is_zero()
            {
                tokio::time::sleep(self.config.pause).await;
            }
        }

        if origin == SendOrigin::Scheduled {
            self.cancel().await?;
        }

        info!(sent = report.sent, failed = report.failed, "Newsletter finished");
        Ok(report)
    }

    /// Parse the configured local date and time.
    fn scheduled_at(&self) -> Result<DateTime<Local>, AutomationError> {
        let date_str = self.config.scheduled_date.trim();
        let time_str = self.config.scheduled_time.trim();
        let invalid = |reason: String| AutomationError::InvalidSchedule {
            date: date_str.to_string(),
            time: time_str.to_string(),
            reason,
        };
        if date_str.is_empty() || time_str.is_empty() {
            return Err(invalid("date (YYYY-MM-DD) and time (HH:MM) are required".into()));
        }
        let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
            .map_err(|e| invalid(format!("date must be YYYY-MM-DD: {e}")))?;
        let time = NaiveTime::parse_from_str(time_str, "%H:%M")
            .map_err(|e| invalid(format!("time must be HH:MM: {e}")))?;
        Local
            .from_local_datetime(&date.and_time(time))
            .earliest()
            .ok_or_else(|| invalid("time does not exist in the local time zone".into()))
    }

    /// Replace any pending send with one at the configured time.
    pub async fn schedule(
        &self,
        now: DateTime<Local>,
    ) -> Result<ScheduledNewsletter, AutomationError> {
        let at = self.scheduled_at()?;
        if at <= now {
            return Err(AutomationError::ScheduleInPast(at.format("%Y-%m-%d %H:%M").to_string()));
        }

        let Prerequisites { draft, contacts } = self.validate().await?;
        let trigger = self
            .scheduler
            .replace(
                Handler::SendNewsletter,
                TriggerSchedule::At {
                    time: at.with_timezone(&Utc),
                },
            )
            .await?;

        let recipients = if self.config.test_mode { 1 } else { contacts.len() };
        info!(at = %at.format("%Y-%m-%d %H:%M"), recipients, "Newsletter scheduled");
        Ok(ScheduledNewsletter {
            trigger_id: trigger.id,
            at,
            subject: draft.subject,
            recipients,
            test_mode: self.config.test_mode,
        })
    }

    /// Pending scheduled sends.
    pub async fn scheduled(&self) -> Vec<Trigger> {
        self.scheduler
            .for_handler(Handler::SendNewsletter)
            .await
            .into_iter()
            .filter(|t| t.schedule.is_clock())
            .collect()
    }

    /// Remove every scheduled send; returns how many were removed.
    pub async fn cancel(&self) -> Result<usize, AutomationError> {
        Ok(self.scheduler.remove(Handler::SendNewsletter).await?)
    }

    pub async fn contact_overview(&self) -> Result<ContactOverview, AutomationError> {
        let recipients = self.recipients().await?;
        let entries = recipients
            .iter()
            .take(OVERVIEW_LIMIT)
            .map(|r| format!("{} ({})", r.name, self.redactor.email(&r.address)))
            .collect();
        Ok(ContactOverview {
            total: recipients.len(),
            entries,
        })
    }

    pub async fn contact_groups(&self) -> Result<Vec<String>, AutomationError> {
        Ok(self
            .contacts
            .list_groups()
            .await?
            .into_iter()
            .map(|g| g.name)
            .collect())
    }
}
