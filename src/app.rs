//! Wiring: the shared collaborators and the automations built on them.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::automations::{DataEraser, Newsletter, SendOrigin, UnsubscribeOutcome, Unsubscriber};
use crate::channels::MailService;
use crate::config::{ErasureConfig, NewsletterConfig, ResponderConfig, UnsubscribeConfig};
use crate::contacts::ContactsDirectory;
use crate::error::FormError;
use crate::forms::{FormResponses, FormSubmitEvent, SubmittedResponse};
use crate::pipeline::AutoResponder;
use crate::privacy::Redactor;
use crate::scheduler::{Handler, JobScheduler, Trigger, TriggerHandler};

/// Collaborators shared by every automation.
#[derive(Clone)]
pub struct AutomationDeps {
    pub mail: Arc<dyn MailService>,
    pub contacts: Arc<dyn ContactsDirectory>,
    pub forms: Arc<dyn FormResponses>,
    pub scheduler: Arc<JobScheduler>,
}

/// Per-automation settings.
#[derive(Debug, Clone, Default)]
pub struct AutomationConfigs {
    pub responder: ResponderConfig,
    pub erasure: ErasureConfig,
    pub newsletter: NewsletterConfig,
    pub unsubscribe: UnsubscribeConfig,
    pub redactor: Redactor,
}

/// Result of one webhook submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionResult {
    pub response_id: String,
    /// Present when the form has an unsubscribe trigger.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unsubscribe: Option<UnsubscribeOutcome>,
}

pub struct Automations {
    pub deps: AutomationDeps,
    pub responder: AutoResponder,
    pub eraser: DataEraser,
    pub newsletter: Newsletter,
    pub unsubscriber: Unsubscriber,
}

impl Automations {
    pub fn new(deps: AutomationDeps, configs: AutomationConfigs) -> Self {
        let redactor = configs.redactor;
        Self {
            responder: AutoResponder::new(deps.mail.clone(), configs.responder, redactor),
            eraser: DataEraser::new(
                deps.mail.clone(),
                deps.contacts.clone(),
                configs.erasure,
                redactor,
            ),
            newsletter: Newsletter::new(
                deps.mail.clone(),
                deps.contacts.clone(),
                deps.scheduler.clone(),
                configs.newsletter,
                redactor,
            ),
            unsubscriber: Unsubscriber::new(
                deps.mail.clone(),
                deps.contacts.clone(),
                deps.forms.clone(),
                configs.unsubscribe,
                redactor,
            ),
            deps,
        }
    }

    pub fn scheduler(&self) -> &Arc<JobScheduler> {
        &self.deps.scheduler
    }

    /// Store a submission for `form_id` and run the unsubscribe flow when
    /// that form has a trigger.
    pub async fn submit_form(
        &self,
        form_id: &str,
        mut event: FormSubmitEvent,
    ) -> Result<SubmissionResult, FormError> {
        let response_id = self.deps.forms.record(form_id, event.answers()).await?;
        if event.response.is_none() {
            event.response = Some(SubmittedResponse {
                id: response_id.clone(),
                item_responses: Vec::new(),
            });
        }
        info!(form = %form_id, response = %response_id, "Form response recorded");

        let unsubscribe = match self.deps.scheduler.form_trigger(form_id).await {
            Some(_) => Some(self.unsubscriber.handle(&event).await),
            None => None,
        };
        Ok(SubmissionResult {
            response_id,
            unsubscribe,
        })
    }
}

#[async_trait]
impl TriggerHandler for Automations {
    async fn fire(&self, trigger: &Trigger) {
        match trigger.handler {
            Handler::AutoRespond => match self.responder.run().await {
                Ok(summary) => info!(
                    found = summary.found,
                    sent = summary.sent,
                    failed = summary.failed,
                    "Scheduled auto-responder run finished"
                ),
                Err(e) => error!(error = %e, "Scheduled auto-responder run failed"),
            },
            Handler::SendNewsletter => match self.newsletter.send(SendOrigin::Scheduled).await {
                Ok(report) => info!(
                    sent = report.sent,
                    failed = report.failed,
                    "Scheduled newsletter finished"
                ),
                Err(e) => error!(error = %e, "Scheduled newsletter failed"),
            },
            Handler::Unsubscribe => {
                warn!(id = %trigger.id, "Unsubscribe triggers only fire on form submissions");
            }
        }
    }
}
