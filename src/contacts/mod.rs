//! Contacts collaborator: people, contact groups and group membership.

pub mod json;

pub use json::JsonContacts;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::ContactsError;

/// Upper bound for a single `batch_get` call.
pub const MAX_BATCH_GET: usize = 50;

/// A contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    /// Stable id, e.g. `people/c123`.
    pub resource_name: String,
    /// Display names, preferred first.
    #[serde(default)]
    pub names: Vec<String>,
    /// Addresses, primary first.
    #[serde(default)]
    pub email_addresses: Vec<String>,
}

impl Person {
    pub fn display_name(&self) -> Option<&str> {
        self.names.first().map(String::as_str).filter(|n| !n.trim().is_empty())
    }

    pub fn primary_email(&self) -> Option<&str> {
        self.email_addresses.first().map(String::as_str)
    }

    /// Whether any address equals `address` (trimmed, case-insensitive).
    pub fn has_address(&self, address: &str) -> bool {
        let needle = address.trim().to_lowercase();
        self.email_addresses
            .iter()
            .any(|a| a.trim().to_lowercase() == needle)
    }
}

/// A named contact group ("label").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactGroup {
    pub resource_name: String,
    pub name: String,
    pub member_count: usize,
}

/// Directory of people and groups.
#[async_trait]
pub trait ContactsDirectory: Send + Sync {
    async fn list_groups(&self) -> Result<Vec<ContactGroup>, ContactsError>;

    /// Member resource names of a group, at most `max`.
    async fn group_members(&self, group: &str, max: usize) -> Result<Vec<String>, ContactsError>;

    /// Fetch people by resource name. At most [`MAX_BATCH_GET`] per call;
    /// unknown names are omitted.
    async fn batch_get(&self, resource_names: &[String]) -> Result<Vec<Person>, ContactsError>;

    /// Every contact of the account.
    async fn connections(&self) -> Result<Vec<Person>, ContactsError>;

    async fn delete_contact(&self, resource_name: &str) -> Result<(), ContactsError>;

    async fn remove_group_members(
        &self,
        group: &str,
        resource_names: &[String],
    ) -> Result<(), ContactsError>;
}

/// A group with its members resolved to people.
#[derive(Debug, Clone)]
pub struct LoadedGroup {
    pub group: ContactGroup,
    pub members: Vec<Person>,
}

/// Find the group named `name` and resolve up to `max_members` members in
/// batches of `batch_size`. `None` when no such group exists. Failed
/// batches are logged and skipped.
pub async fn load_group(
    directory: &dyn ContactsDirectory,
    name: &str,
    max_members: usize,
    batch_size: usize,
) -> Result<Option<LoadedGroup>, ContactsError> {
    let groups = directory.list_groups().await?;
    let Some(group) = groups.into_iter().find(|g| g.name == name) else {
        warn!(group = %name, "Contact group not found");
        return Ok(None);
    };

    let member_names = directory.group_members(&group.resource_name, max_members).await?;
    debug!(group = %name, members = member_names.len(), "Loading group members");

    let batch_size = batch_size.clamp(1, MAX_BATCH_GET);
    let mut members = Vec::with_capacity(member_names.len());
    for (index, batch) in member_names.chunks(batch_size).enumerate() {
        match directory.batch_get(batch).await {
            Ok(people) => members.extend(people),
            Err(e) => warn!(batch = index, error = %e, "Failed to load contact batch, skipping"),
        }
    }

    info!(group = %name, loaded = members.len(), "Contact group loaded");
    Ok(Some(LoadedGroup { group, members }))
}
