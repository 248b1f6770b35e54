//! Form submissions: the webhook payload and the response store.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::FormError;

/// The stored response a submission belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedResponse {
    pub id: String,
    /// Answers in question order.
    #[serde(default)]
    pub item_responses: Vec<String>,
}

/// A form submission as delivered to the webhook. Every part is optional;
/// senders fill in whichever shape they have.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormSubmitEvent {
    /// Flat answer row; index 0 is the timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<SubmittedResponse>,
    /// Question title → answers, in submission order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub named_values: Option<IndexMap<String, Vec<String>>>,
}

impl FormSubmitEvent {
    /// Every answer the event carries, in a stable order.
    pub fn answers(&self) -> Vec<String> {
        if let Some(response) = &self.response
            && !response.item_responses.is_empty()
        {
            return response.item_responses.clone();
        }
        if let Some(values) = &self.values {
            return values.iter().skip(1).cloned().collect();
        }
        self.named_values
            .iter()
            .flat_map(|m| m.values())
            .filter_map(|answers| answers.first().cloned())
            .collect()
    }
}

/// A stored form response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormResponse {
    pub id: String,
    pub form_id: String,
    pub submitted_at: DateTime<Utc>,
    pub answers: Vec<String>,
}

/// Where form responses live.
#[async_trait]
pub trait FormResponses: Send + Sync {
    /// Store a response; returns its id.
    async fn record(&self, form_id: &str, answers: Vec<String>) -> Result<String, FormError>;

    async fn delete_response(&self, form_id: &str, response_id: &str) -> Result<(), FormError>;

    /// Id of the most recently stored response.
    async fn latest_response(&self, form_id: &str) -> Result<Option<String>, FormError>;
}

/// In-process response store.
#[derive(Default)]
pub struct FormResponseStore {
    responses: Mutex<HashMap<String, Vec<FormResponse>>>,
}

impl FormResponseStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn responses(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<FormResponse>>> {
        self.responses
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn count(&self, form_id: &str) -> usize {
        self.responses().get(form_id).map_or(0, Vec::len)
    }
}

#[async_trait]
impl FormResponses for FormResponseStore {
    async fn record(&self, form_id: &str, answers: Vec<String>) -> Result<String, FormError> {
        let id = Uuid::new_v4().to_string();
        self.responses()
            .entry(form_id.to_string())
            .or_default()
            .push(FormResponse {
                id: id.clone(),
                form_id: form_id.to_string(),
                submitted_at: Utc::now(),
                answers,
            });
        Ok(id)
    }

    async fn delete_response(&self, form_id: &str, response_id: &str) -> Result<(), FormError> {
        let mut responses = self.responses();
        let not_found = || FormError::ResponseNotFound {
            form_id: form_id.to_string(),
            response_id: response_id.to_string(),
        };
        let list = responses.get_mut(form_id).ok_or_else(not_found)?;
        let index = list
            .iter()
            .position(|r| r.id == response_id)
            .ok_or_else(not_found)?;
        list.remove(index);
        Ok(())
    }

    async fn latest_response(&self, form_id: &str) -> Result<Option<String>, FormError> {
        Ok(self
            .responses()
            .get(form_id)
            .and_then(|list| list.last())
            .map(|r| r.id.clone()))
    }
}
