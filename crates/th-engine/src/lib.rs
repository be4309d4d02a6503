//! The quest progression engine.
//!
//! An inbound issue comment flows through
//! [`engine::ProgressionEngine::handle_comment`]: the user's progress
//! record is loaded under a per-user lock, the comment is dispatched to
//! the [`validators::TaskValidator`] registered for the user's current
//! task, and a successful verdict advances the forward-only state
//! machine over the configured quest tree. Admin commands
//! ([`admin::AdminCommand`]) drive user lifecycle and repository
//! management.

pub mod admin;
pub mod engine;
pub mod event;
pub mod quiz;
pub mod responses;
pub mod validators;

pub use admin::AdminCommand;
pub use engine::ProgressionEngine;
pub use event::InboundEvent;
pub use responses::ResponseTemplates;
pub use validators::{ValidationOutcome, ValidatorRegistry};
