use octocrab::Octocrab;

use crate::{Result, SignalError};

/// Connection settings for the tracked repository.
#[derive(Debug, Clone)]
pub struct GitHubConfig {
    pub token: Option<String>,
    /// Owner (user or organization) of the tracked repository.
    pub owner: String,
    /// Name of the tracked repository.
    pub repo: String,
}

/// Shared octocrab client bound to the tracked `owner/repo`.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    pub(crate) octocrab: Octocrab,
    pub(crate) owner: String,
    pub(crate) repo: String,
}

impl GitHubClient {
    /// Create a client from an explicit [`GitHubConfig`].
    pub fn new(config: GitHubConfig) -> Result<Self> {
        let token = config.token.ok_or_else(|| {
            SignalError::Transient("missing GitHub token, set GITHUB_TOKEN".to_string())
        })?;

        let octocrab = Octocrab::builder()
            .personal_token(token)
            .build()
            .map_err(super::to_signal_error)?;

        Ok(Self {
            octocrab,
            owner: config.owner,
            repo: config.repo,
        })
    }

    /// Create a client for `owner/repo`, reading `GITHUB_TOKEN` from the
    /// environment.
    pub fn from_env(owner: impl Into<String>, repo: impl Into<String>) -> Result<Self> {
        let token = std::env::var("GITHUB_TOKEN")
            .map_err(|e| SignalError::Transient(format!("GITHUB_TOKEN: {e}")))?;
        Self::new(GitHubConfig {
            token: Some(token),
            owner: owner.into(),
            repo: repo.into(),
        })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    /// `owner/repo` slug of the tracked repository.
    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}
