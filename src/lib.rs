//! Inbox automations for a single mailbox account: auto-responder, data
//! erasure, newsletter and unsubscribe.

pub mod app;
pub mod automations;
pub mod channels;
pub mod config;
pub mod contacts;
pub mod error;
pub mod forms;
pub mod pipeline;
pub mod privacy;
pub mod scheduler;
pub mod server;
pub mod templates;
