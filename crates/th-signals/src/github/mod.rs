//! Octocrab-backed implementations of [`crate::RepoSignals`] and
//! [`crate::RepoAdmin`].

mod admin;
mod client;
mod signals;

pub use client::{GitHubClient, GitHubConfig};

use crate::SignalError;

/// Map an octocrab failure onto the signal taxonomy: a GitHub 404 is
/// `NotFound`, everything else is retryable by the caller.
pub(crate) fn to_signal_error(err: octocrab::Error) -> SignalError {
    if let octocrab::Error::GitHub { ref source, .. } = err {
        if source.status_code.as_u16() == 404 {
            return SignalError::NotFound;
        }
    }
    SignalError::Transient(err.to_string())
}
