use std::path::Path;

use serde::Deserialize;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("failed to read response templates: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse response templates: {0}")]
    Parse(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// ResponseTemplates
// ---------------------------------------------------------------------------

/// Named response texts loaded once at startup from
/// `config/responses.json`. Every field is required: a missing key is a
/// parse error and the process does not start.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseTemplates {
    /// Generic task-completed celebration.
    pub success: String,
    /// Generic try-again response for failed validations.
    pub error: String,
    /// Unrecognised `/` command.
    pub invalid_command: String,
    /// Posted after `/new_user` succeeds.
    pub new_user: String,
    /// A comment arrived from a user with no progress record.
    /// Supports a `{user}` placeholder.
    pub unknown_user: String,
    /// Greeting for freshly opened issues.
    pub new_issue: String,
    /// The user has completed the entire quest tree.
    pub already_finished: String,
    /// `help` was requested but no hint is recorded for the task.
    pub no_hint: String,
}

#[derive(Debug, Deserialize)]
struct TemplateFile {
    responses: ResponseTemplates,
}

impl ResponseTemplates {
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, TemplateError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, TemplateError> {
        let file: TemplateFile = serde_json::from_str(text)?;
        Ok(file.responses)
    }

    /// The deep link appended to every failure response, pointing the
    /// user back at the tracked repository.
    pub fn start_link(repo_slug: &str) -> String {
        format!("\n\n[Click here to start](https://github.com/{repo_slug})")
    }

    /// `unknown_user` with the `{user}` placeholder filled in.
    pub fn unknown_user_for(&self, user: &str) -> String {
        self.unknown_user.replace("{user}", user)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
