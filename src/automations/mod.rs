//! Manually or trigger-driven mailbox automations.

pub mod erasure;
pub mod newsletter;
pub mod unsubscribe;

pub use erasure::{DataEraser, ErasureReport};
pub use newsletter::{Newsletter, SendOrigin, SendReport};
pub use unsubscribe::{UnsubscribeOutcome, Unsubscriber};
