//! Contact book kept in memory and optionally persisted as a JSON file.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::contacts::{ContactGroup, ContactsDirectory, MAX_BATCH_GET, Person};
use crate::error::ContactsError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoredGroup {
    resource_name: String,
    name: String,
    #[serde(default)]
    members: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ContactBook {
    #[serde(default)]
    people: Vec<Person>,
    #[serde(default)]
    groups: Vec<StoredGroup>,
}

/// `ContactsDirectory` over a JSON contact book.
pub struct JsonContacts {
    path: Option<PathBuf>,
    book: RwLock<ContactBook>,
}

impl JsonContacts {
    /// An empty, unpersisted book.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            book: RwLock::new(ContactBook::default()),
        }
    }

    /// Load `path` (missing file = empty book); every mutation is written back.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, ContactsError> {
        let path = path.as_ref().to_path_buf();
        let book = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => ContactBook::default(),
            Err(e) => return Err(e.into()),
        };
        debug!(path = %path.display(), people = book.people.len(), "Contact book loaded");
        Ok(Self {
            path: Some(path),
            book: RwLock::new(book),
        })
    }

    async fn persist(&self, book: &ContactBook) -> Result<(), ContactsError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(book)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }

    /// Create a contact; returns its resource name.
    pub async fn add_person(&self, name: &str, emails: &[&str]) -> Result<String, ContactsError> {
        let resource_name = format!("people/{}", Uuid::new_v4().simple());
        let mut book = self.book.write().await;
        book.people.push(Person {
            resource_name: resource_name.clone(),
            names: if name.is_empty() {
                Vec::new()
            } else {
                vec![name.to_string()]
            },
            email_addresses: emails.iter().map(|e| e.to_string()).collect(),
        });
        self.persist(&book).await?;
        Ok(resource_name)
    }

    /// Create a group; returns its resource name.
    pub async fn add_group(&self, name: &str) -> Result<String, ContactsError> {
        let resource_name = format!("contactGroups/{}", Uuid::new_v4().simple());
        let mut book = self.book.write().await;
        book.groups.push(StoredGroup {
            resource_name: resource_name.clone(),
            name: name.to_string(),
            members: Vec::new(),
        });
        self.persist(&book).await?;
        Ok(resource_name)
    }

    pub async fn add_member(&self, group: &str, person: &str) -> Result<(), ContactsError> {
        let mut book = self.book.write().await;
        if !book.people.iter().any(|p| p.resource_name == person) {
            return Err(ContactsError::ContactNotFound(person.to_string()));
        }
        let stored = book
            .groups
            .iter_mut()
            .find(|g| g.resource_name == group)
            .ok_or_else(|| ContactsError::GroupNotFound(group.to_string()))?;
        if !stored.members.iter().any(|m| m == person) {
            stored.members.push(person.to_string());
        }
        self.persist(&book).await
    }
}

#[async_trait]
impl ContactsDirectory for JsonContacts {
    async fn list_groups(&self) -> Result<Vec<ContactGroup>, ContactsError> {
        Ok(self
            .book
            .read()
            .await
            .groups
            .iter()
            .map(|g| ContactGroup {
                resource_name: g.resource_name.clone(),
                name: g.name.clone(),
                member_count: g.members.len(),
            })
            .collect())
    }

    async fn group_members(&self, group: &str, max: usize) -> Result<Vec<String>, ContactsError> {
        let book = self.book.read().await;
        let stored = book
            .groups
            .iter()
            .find(|g| g.resource_name == group)
            .ok_or_else(|| ContactsError::GroupNotFound(group.to_string()))?;
        Ok(stored.members.iter().take(max).cloned().collect())
    }

    async fn batch_get(&self, resource_names: &[String]) -> Result<Vec<Person>, ContactsError> {
        if resource_names.len() > MAX_BATCH_GET {
            return Err(ContactsError::BatchTooLarge {
                requested: resource_names.len(),
                max: MAX_BATCH_GET,
            });
        }
        let book = self.book.read().await;
        Ok(resource_names
            .iter()
            .filter_map(|name| book.people.iter().find(|p| &p.resource_name == name))
            .cloned()
            .collect())
    }

    async fn connections(&self) -> Result<Vec<Person>, ContactsError> {
        Ok(self.book.read().await.people.clone())
    }

    async fn delete_contact(&self, resource_name: &str) -> Result<(), ContactsError> {
        let mut book = self.book.write().await;
        let before = book.people.len();
        book.people.retain(|p| p.resource_name != resource_name);
        if book.people.len() == before {
            return Err(ContactsError::ContactNotFound(resource_name.to_string()));
        }
        for group in &mut book.groups {
            group.members.retain(|m| m != resource_name);
        }
        self.persist(&book).await
    }

    async fn remove_group_members(
        &self,
        group: &str,
        resource_names: &[String],
    ) -> Result<(), ContactsError> {
        let mut book = self.book.write().await;
        let stored = book
            .groups
            .iter_mut()
            .find(|g| g.resource_name == group)
            .ok_or_else(|| ContactsError::GroupNotFound(group.to_string()))?;
        stored.members.retain(|m| !resource_names.contains(m));
        self.persist(&book).await
    }
}
