//! Inbound mail pipeline.
//!
//! 1. `MailService::unread_without_label()`: fetch unanswered conversations
//! 2. `classifier::classify()`: pure decision per conversation
//! 3. `AutoResponder`: send the template and apply the idempotency label

pub mod classifier;
pub mod responder;
pub mod types;

pub use classifier::classify;
pub use responder::{AutoResponder, ResponderSummary};
