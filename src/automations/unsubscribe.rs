//! Form-triggered unsubscribe: drop the submitter from the newsletter
//! group, confirm by mail and delete the form response.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::channels::{MailService, OutgoingMail};
use crate::config::UnsubscribeConfig;
use crate::contacts::{ContactsDirectory, load_group};
use crate::error::AutomationError;
use crate::forms::{FormResponses, FormSubmitEvent};
use crate::privacy::Redactor;
use crate::scheduler::{Handler, JobScheduler, Trigger, TriggerSchedule};
use crate::templates::{self, Rendered};

/// Placeholder replaced by the subscriber's address in the confirmation.
pub const EMAIL_PLACEHOLDER: &str = "[EMAIL]";

/// Which part of the event carried the address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressSource {
    Values,
    ItemResponse,
    NamedValues,
}

/// Normalised (trimmed, lower-cased) address from a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmittedAddress {
    pub address: String,
    pub source: AddressSource,
}

fn non_blank(value: Option<&String>) -> Option<&String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Pick the address out of a submission: the second value (the first is the
/// timestamp), else the first item response, else the first answer of the
/// first named question.
pub fn submitted_address(event: &FormSubmitEvent) -> Option<SubmittedAddress> {
    let from_values = event
        .values
        .as_ref()
        .filter(|v| v.len() > 1)
        .and_then(|v| non_blank(v.get(1)))
        .map(|a| (a, AddressSource::Values));
    let from_response = || {
        event
            .response
            .as_ref()
            .and_then(|r| non_blank(r.item_responses.first()))
            .map(|a| (a, AddressSource::ItemResponse))
    };
    let from_named = || {
        event
            .named_values
            .as_ref()
            .and_then(|m| m.values().next())
            .and_then(|answers| non_blank(answers.first()))
            .map(|a| (a, AddressSource::NamedValues))
    };

    from_values
        .or_else(from_response)
        .or_else(from_named)
        .map(|(address, source)| SubmittedAddress {
            address: address.trim().to_lowercase(),
            source,
        })
}

/// Result of handling one submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UnsubscribeOutcome {
    Unsubscribed,
    NotSubscribed,
    NoAddress,
    Failed { error: String },
}

pub struct Unsubscriber {
    mail: Arc<dyn MailService>,
    contacts: Arc<dyn ContactsDirectory>,
    forms: Arc<dyn FormResponses>,
    config: UnsubscribeConfig,
    redactor: Redactor,
}

impl Unsubscriber {
    pub fn new(
        mail: Arc<dyn MailService>,
        contacts: Arc<dyn ContactsDirectory>,
        forms: Arc<dyn FormResponses>,
        config: UnsubscribeConfig,
        redactor: Redactor,
    ) -> Self {
        Self {
            mail,
            contacts,
            forms,
            config,
            redactor,
        }
    }

    pub fn config(&self) -> &UnsubscribeConfig {
        &self.config
    }

    /// Handle one form submission.
    pub async fn handle(&self, event: &FormSubmitEvent) -> UnsubscribeOutcome {
        let Some(submitted) = submitted_address(event) else {
            warn!("Form submission without an address");
            return UnsubscribeOutcome::NoAddress;
        };
        let anon = self.redactor.email(&submitted.address);
        info!(address = %anon, source = ?submitted.source, "Unsubscribe requested");

        match self.remove_from_group(&submitted.address).await {
            Ok(true) => {
                self.send_confirmation(&submitted.address).await;
                self.delete_form_response(event).await;
                info!(address = %anon, "Unsubscribe completed");
                UnsubscribeOutcome::Unsubscribed
            }
            Ok(false) => {
                info!(address = %anon, "Address not on the newsletter list");
                UnsubscribeOutcome::NotSubscribed
            }
            Err(e) => {
                error!(address = %anon, error = %e, "Unsubscribe failed");
                self.notify_admin(&anon, &e).await;
                UnsubscribeOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    /// Returns whether a membership was removed.
    async fn remove_from_group(&self, address: &str) -> Result<bool, AutomationError> {
        let Some(group) = load_group(
            self.contacts.as_ref(),
            &self.config.contact_label,
            self.config.max_group_members,
            self.config.batch_size,
        )
        .await?
        else {
            return Ok(false);
        };

        let Some(person) = group.members.iter().find(|p| p.has_address(address)) else {
            return Ok(false);
        };

        self.contacts
            .remove_group_members(&group.group.resource_name, &[person.resource_name.clone()])
            .await?;
        info!(contact = %person.resource_name, group = %group.group.name, "Removed from group");
        Ok(true)
    }

    async fn send_confirmation(&self, address: &str) {
        let anon = self.redactor.email(address);
        let drafts = match self.mail.drafts().await {
            Ok(drafts) => drafts,
            Err(e) => {
                warn!(error = %e, "Could not load drafts, confirmation skipped");
                return;
            }
        };
        let Some(draft) = templates::find_containing(&drafts, &self.config.draft_marker)
            .into_iter()
            .next()
        else {
            warn!(marker = %self.config.draft_marker, "Confirmation draft not found");
            return;
        };

        let mail = Rendered::from_draft(draft, &[EMAIL_PLACEHOLDER], address)
            .into_mail_with_subject(address, &self.config.confirmation_subject)
            .with_sender_name(&self.config.sender_name);
        match self.mail.send(mail).await {
            Ok(()) => info!(to = %anon, "Unsubscribe confirmation sent"),
            Err(e) => warn!(to = %anon, error = %e, "Unsubscribe confirmation failed"),
        }
    }

    /// Delete the submission's response, or the latest one when the event
    /// carries no response id.
    async fn delete_form_response(&self, event: &FormSubmitEvent) {
        let form_id = &self.config.form_id;
        let response_id = match &event.response {
            Some(response) => Some(response.id.clone()),
            None => match self.forms.latest_response(form_id).await {
                Ok(latest) => latest,
                Err(e) => {
                    warn!(error = %e, "Could not look up latest form response");
                    return;
                }
            },
        };
        let Some(response_id) = response_id else {
            debug!(form = %form_id, "No form response to delete");
            return;
        };
        match self.forms.delete_response(form_id, &response_id).await {
            Ok(()) => info!(response = %response_id, "Form response deleted"),
            Err(e) => warn!(response = %response_id, error = %e, "Form response not deleted"),
        }
    }

    async fn notify_admin(&self, anon_address: &str, failure: &AutomationError) {
        let Some(admin) = &self.config.admin_address else {
            debug!("No admin address configured, failure not reported");
            return;
        };
        let body = format!(
            "Es gab einen Fehler bei der Abmeldung von: {anon_address}\n\n\
             Fehler: {failure}\n\n\
             Hinweis: E-Mail wurde anonymisiert. Für Details den Debug-Modus aktivieren.\n\n\
             Bitte manuell überprüfen."
        );
        let mail = OutgoingMail::new(admin, "⚠️ Fehler bei Newsletter-Abmeldung", body)
            .with_sender_name(&self.config.admin_sender_name);
        if let Err(e) = self.mail.send(mail).await {
            error!(error = %e, "Could not notify admin");
        }
    }
}

/// Replace any unsubscribe trigger with one for the configured form.
pub async fn install_form_trigger(
    scheduler: &JobScheduler,
    config: &UnsubscribeConfig,
) -> Result<Trigger, AutomationError> {
    if config.form_id.trim().is_empty() {
        return Err(AutomationError::MissingFormId);
    }
    let trigger = scheduler
        .replace(
            Handler::Unsubscribe,
            TriggerSchedule::FormSubmit {
                form_id: config.form_id.clone(),
            },
        )
        .await?;
    info!(form = %config.form_id, "Form trigger installed");
    Ok(trigger)
}

/// Remove the unsubscribe trigger; returns how many were removed.
pub async fn remove_form_trigger(scheduler: &JobScheduler) -> Result<usize, AutomationError> {
    Ok(scheduler.remove(Handler::Unsubscribe).await?)
}
