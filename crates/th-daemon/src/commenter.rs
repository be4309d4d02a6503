//! Outbound response delivery.
//!
//! The engine produces response text; a [`Commenter`] decides where it
//! goes. The default [`LogCommenter`] writes responses to the log,
//! which is also what local development runs use.

use async_trait::async_trait;
use th_signals::Result;
use tracing::info;

#[async_trait]
pub trait Commenter: Send + Sync {
    /// Deliver `body` as a reply on the given issue.
    async fn post(&self, issue: u64, body: &str) -> Result<()>;
}

/// Writes every response to the structured log instead of posting it.
pub struct LogCommenter;

#[async_trait]
impl Commenter for LogCommenter {
    async fn post(&self, issue: u64, body: &str) -> Result<()> {
        info!(issue, body, "response");
        Ok(())
    }
}
