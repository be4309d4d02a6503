use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(String),
    #[error("config parse error: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ---------------------------------------------------------------------------
// TrailheadConfig
// ---------------------------------------------------------------------------

/// Daemon configuration loaded from `trailhead.toml`.
///
/// Credentials are never stored here: the GitHub token is read from the
/// `GITHUB_TOKEN` environment variable at runtime.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TrailheadConfig {
    #[serde(default)]
    pub repo: RepoConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub grading: GradingConfig,
    #[serde(default)]
    pub quests: QuestsConfig,
}

/// The tracked open-source repository participants explore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoConfig {
    /// `owner/name` slug of the tracked OSS repository.
    pub slug: String,
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self { slug: String::new() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the webhook endpoint.
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the SQLite progress database.
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("trailhead.db"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradingConfig {
    /// Root directory searched for `<quest><task>-*.py` grading scripts.
    pub root: PathBuf,
    /// Interpreter used to run grading scripts.
    pub interpreter: String,
    /// Hard cap on grading-script wall time, in seconds.
    pub timeout_secs: u64,
}

impl Default for GradingConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("grading"),
            interpreter: "python3".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestsConfig {
    /// Path to the quest tree definition.
    pub definition: PathBuf,
    /// Path to the response templates file.
    pub responses: PathBuf,
}

impl Default for QuestsConfig {
    fn default() -> Self {
        Self {
            definition: PathBuf::from("config/quest_config.json"),
            responses: PathBuf::from("config/responses.json"),
        }
    }
}

impl TrailheadConfig {
    /// Load from `trailhead.toml` in the working directory.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("trailhead.toml")
    }

    /// Load from a specific path.
    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let cfg: TrailheadConfig =
            toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Semantic validation beyond what the type system enforces.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let slug = self.repo.slug.trim();
        if slug.is_empty() {
            return Err(ConfigError::Invalid(
                "repo.slug must be set to the tracked `owner/name` repository".into(),
            ));
        }
        let mut parts = slug.splitn(2, '/');
        let owner = parts.next().unwrap_or_default();
        let name = parts.next().unwrap_or_default();
        if owner.is_empty() || name.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "repo.slug `{slug}` is not of the form owner/name"
            )));
        }
        if self.grading.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "grading.timeout_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Owner half of the tracked repo slug.
    pub fn repo_owner(&self) -> &str {
        self.repo.slug.split('/').next().unwrap_or_default()
    }

    /// Name half of the tracked repo slug.
    pub fn repo_name(&self) -> &str {
        self.repo.slug.split('/').nth(1).unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
