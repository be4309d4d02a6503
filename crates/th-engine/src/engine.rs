//! The progression engine: routes inbound comments, runs validators,
//! and persists progress under per-user serialization.

use std::sync::Arc;

use dashmap::DashMap;
use regex::Regex;
use th_core::progress_store::{ProgressStore, ProgressStoreError};
use th_core::quest_config::QuestConfig;
use th_core::types::{Position, TaskKey, UserProgress};
use th_grader::{report, Grader, GraderError};
use th_signals::{RepoAdmin, RepoSignals};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::admin::AdminCommand;
use crate::event::InboundEvent;
use crate::responses::ResponseTemplates;
use crate::validators::{ValidationContext, ValidationOutcome, ValidatorRegistry};

// ---------------------------------------------------------------------------
// ProgressionEngine
// ---------------------------------------------------------------------------

/// Everything between a parsed webhook event and the response comment.
///
/// Events for the same user are serialized through a per-user async
/// mutex, and saves use the store's version compare-and-swap, so two
/// near-simultaneous comments can never both credit the same task.
pub struct ProgressionEngine {
    quests: Arc<QuestConfig>,
    registry: ValidatorRegistry,
    store: Arc<ProgressStore>,
    signals: Arc<dyn RepoSignals>,
    repo_admin: Arc<dyn RepoAdmin>,
    grader: Arc<Grader>,
    templates: Arc<ResponseTemplates>,
    repo_slug: String,
    /// One lock per known user, created on first contact and dropped
    /// again when `/del_user` wipes the record.
    user_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ProgressionEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        quests: Arc<QuestConfig>,
        store: Arc<ProgressStore>,
        signals: Arc<dyn RepoSignals>,
        repo_admin: Arc<dyn RepoAdmin>,
        grader: Arc<Grader>,
        templates: Arc<ResponseTemplates>,
        repo_slug: impl Into<String>,
    ) -> Self {
        let registry = ValidatorRegistry::from_config(&quests);
        Self {
            quests,
            registry,
            store,
            signals,
            repo_admin,
            grader,
            templates,
            repo_slug: repo_slug.into(),
            user_locks: DashMap::new(),
        }
    }

    fn user_lock(&self, user: &str) -> Arc<Mutex<()>> {
        self.user_locks
            .entry(user.to_string())
            .or_default()
            .clone()
    }

    /// Greeting posted when a fresh issue is opened on the tracked repo.
    pub fn greet_new_issue(&self) -> String {
        self.templates.new_issue.clone()
    }

    // -----------------------------------------------------------------------
    // Comment handling
    // -----------------------------------------------------------------------

    /// Handle a non-admin issue comment and produce the response text.
    ///
    /// `help` asks for a hint, `test` re-runs the issue's grading
    /// script, and everything else is treated as a completion attempt
    /// for the user's current task.
    pub async fn handle_comment(&self, event: &InboundEvent) -> String {
        let trimmed = event.comment.trim();
        if trimmed.to_lowercase().starts_with("help") {
            return self.give_hint(&event.user).await;
        }
        if trimmed.eq_ignore_ascii_case("test") {
            return self.run_issue_test(event).await;
        }
        self.validate(event).await
    }

    async fn validate(&self, event: &InboundEvent) -> String {
        let lock = self.user_lock(&event.user);
        let _guard = lock.lock().await;

        let mut progress = match self.store.get(&event.user).await {
            Ok(progress) => progress,
            Err(ProgressStoreError::NotFound(_)) => {
                return self.templates.unknown_user_for(&event.user);
            }
            Err(e) => {
                error!(user = %event.user, error = %e, "failed to load progress");
                return self.templates.error.clone();
            }
        };

        let key = match progress.position.clone() {
            Position::At(key) => key,
            Position::Finished => return self.templates.already_finished.clone(),
        };

        let Some(validator) = self.registry.get(&key) else {
            // A stored cursor can go stale if the quest tree shrinks
            // between deployments.
            error!(user = %event.user, task = %key, "no validator for stored position");
            return self.templates.error.clone();
        };

        let outcome = {
            let mut ctx = ValidationContext {
                progress: &mut progress,
                user: &event.user,
                comment: &event.comment,
                signals: self.signals.as_ref(),
                grader: &self.grader,
                templates: &self.templates,
                repo_slug: &self.repo_slug,
            };
            validator.validate(&mut ctx).await
        };

        match outcome {
            ValidationOutcome::Failure { response } => {
                debug!(user = %event.user, task = %key, "validation failed");
                response
            }
            ValidationOutcome::Success { points, response } => {
                self.apply_completion(&mut progress, &key, points);
                info!(
                    user = %event.user,
                    task = %key,
                    points = progress.points,
                    "task completed"
                );
                self.save_with_retry(progress, &key, points).await;
                response
            }
        }
    }

    /// Credit a completion and advance the cursor past every already
    /// completed task. Crediting is idempotent: a task appears in
    /// `completed` at most once, so replays never double-count.
    fn apply_completion(&self, progress: &mut UserProgress, key: &TaskKey, points: u64) {
        if progress.completed.insert(key.clone()) {
            progress.points += points;
            progress.streak_count += 1;
        }

        let mut cursor = self.quests.advance(key);
        while let Some(ref next) = cursor {
            if !progress.completed.contains(next) {
                break;
            }
            cursor = self.quests.advance(next);
        }
        progress.position = match cursor {
            Some(next) => Position::At(next),
            None => Position::Finished,
        };
    }

    /// Save under compare-and-swap, retrying once against a fresh read
    /// if a concurrent writer got there first.
    async fn save_with_retry(&self, mut progress: UserProgress, key: &TaskKey, points: u64) {
        let user = progress.user_id.clone();
        match self.store.save(&mut progress).await {
            Ok(()) => return,
            Err(ProgressStoreError::Conflict(_)) => {
                warn!(user = %user, task = %key, "conflicting save, retrying against fresh record");
            }
            Err(e) => {
                error!(user = %user, task = %key, error = %e, "failed to save progress");
                return;
            }
        }

        let mut fresh = match self.store.get(&user).await {
            Ok(fresh) => fresh,
            Err(e) => {
                error!(user = %user, task = %key, error = %e, "failed to reload progress after conflict");
                return;
            }
        };
        fresh
            .display_preferences
            .extend(progress.display_preferences.iter().copied());
        if progress.selected_issue.is_some() {
            fresh.selected_issue = progress.selected_issue;
        }
        self.apply_completion(&mut fresh, key, points);

        if let Err(e) = self.store.save(&mut fresh).await {
            error!(user = %user, task = %key, error = %e, "failed to save progress after retry");
        }
    }

    // -----------------------------------------------------------------------
    // Hints
    // -----------------------------------------------------------------------

    /// `help`: hand out the next hint for the user's current task,
    /// cycling through the recorded hints in insertion order.
    async fn give_hint(&self, user: &str) -> String {
        let lock = self.user_lock(user);
        let _guard = lock.lock().await;

        let mut progress = match self.store.get(user).await {
            Ok(progress) => progress,
            Err(ProgressStoreError::NotFound(_)) => return self.templates.unknown_user_for(user),
            Err(e) => {
                error!(user = %user, error = %e, "failed to load progress for hint");
                return self.templates.error.clone();
            }
        };

        let key = match progress.position.clone() {
            Position::At(key) => key,
            Position::Finished => return self.templates.already_finished.clone(),
        };

        let hints = match self.store.hints_for(&key).await {
            Ok(hints) => hints,
            Err(e) => {
                error!(user = %user, task = %key, error = %e, "failed to load hints");
                return self.templates.error.clone();
            }
        };
        if hints.is_empty() {
            return self.templates.no_hint.clone();
        }

        let hint = hints[progress.hints_used as usize % hints.len()].clone();
        progress.hints_used += 1;
        if let Err(e) = self.store.save(&mut progress).await {
            // The hint still goes out; only the rotation counter is lost.
            warn!(user = %user, task = %key, error = %e, "failed to record hint usage");
        }
        format!("💡 {hint}")
    }

    // -----------------------------------------------------------------------
    // On-demand test runs
    // -----------------------------------------------------------------------

    /// `test`: run the grading script for the task named in the issue
    /// title and report the result, without touching progress.
    async fn run_issue_test(&self, event: &InboundEvent) -> String {
        let key = event
            .issue_title
            .as_deref()
            .and_then(parse_task_from_title);
        let Some(key) = key else {
            return "❌ I couldn't tell which task this issue belongs to. The issue title should name it, e.g. `Q3T1`.".to_string();
        };

        match self.grader.run(&key).await {
            Ok(report) => report::format_report(&key, &report),
            Err(GraderError::ScriptNotFound(_)) => {
                warn!(task = %key, "test requested but no grading script exists");
                format!("❌ Test file not found for {key}. Please contact an administrator.")
            }
            Err(GraderError::Ambiguous { prefix, matches }) => {
                error!(task = %key, prefix = %prefix, ?matches, "ambiguous grading scripts");
                format!("❌ Grading is misconfigured for {key}. Please contact an administrator.")
            }
            Err(GraderError::Io(e)) => {
                warn!(task = %key, error = %e, "grading discovery failed");
                self.templates.error.clone()
            }
        }
    }

    // -----------------------------------------------------------------------
    // Admin commands
    // -----------------------------------------------------------------------

    /// Parse and run a `/`-prefixed comment from an organization owner.
    /// The caller is responsible for the permission check.
    pub async fn handle_command(&self, raw: &str) -> String {
        match AdminCommand::parse(raw) {
            Some(cmd) => self.handle_admin(cmd).await,
            None => self.templates.invalid_command.clone(),
        }
    }

    pub async fn handle_admin(&self, cmd: AdminCommand) -> String {
        match cmd {
            AdminCommand::NewUser { user } => {
                match self.store.create(&user, self.quests.first_task()).await {
                    Ok(_) => {
                        info!(user = %user, "created new user");
                        self.templates.new_user.clone()
                    }
                    Err(ProgressStoreError::AlreadyExists(_)) => {
                        format!("Failed to create new user, `{user}` already exists.")
                    }
                    Err(e) => {
                        error!(user = %user, error = %e, "failed to create user");
                        format!("Failed to create new user `{user}`.")
                    }
                }
            }
            AdminCommand::DelUser { user } => match self.store.delete(&user).await {
                Ok(()) => {
                    self.user_locks.remove(&user);
                    info!(user = %user, "deleted user");
                    format!("User `{user}` wipe complete.")
                }
                Err(ProgressStoreError::NotFound(_)) => {
                    format!("No record found for `{user}`.")
                }
                Err(e) => {
                    error!(user = %user, error = %e, "failed to delete user");
                    format!("Failed to delete `{user}`.")
                }
            },
            AdminCommand::NewHint { key, text } => {
                if self.quests.lookup(&key).is_none() {
                    return format!("Unknown task {key}.");
                }
                match self.store.add_hint(&key, &text).await {
                    Ok(()) => format!("Hint added for {key}."),
                    Err(e) => {
                        error!(task = %key, error = %e, "failed to add hint");
                        format!("Failed to add hint for {key}.")
                    }
                }
            }
            AdminCommand::CreateRepos { users } => {
                let mut lines = Vec::with_capacity(users.len());
                for user in users {
                    match self.repo_admin.create_user_repo(&user).await {
                        Ok(name) => lines.push(format!("✅ created `{name}` for `{user}`")),
                        Err(e) => {
                            warn!(user = %user, error = %e, "failed to create repo");
                            lines.push(format!("❌ failed to create a repo for `{user}`"));
                        }
                    }
                }
                lines.join("\n")
            }
            AdminCommand::DelRepo { name } => match self.repo_admin.delete_repo(&name).await {
                Ok(()) => format!("Repo `{name}` deleted."),
                Err(e) => {
                    warn!(repo = %name, error = %e, "failed to delete repo");
                    format!("Failed to delete repo `{name}`.")
                }
            },
            AdminCommand::ResetRepo { name } => {
                match self.repo_admin.close_open_issues(&name).await {
                    Ok(()) => format!("Repo `{name}` reset successful."),
                    Err(e) => {
                        warn!(repo = %name, error = %e, "failed to reset repo");
                        format!("Repo `{name}` reset failed.")
                    }
                }
            }
        }
    }
}

/// Pull a task key like `Q3T1` (any spacing/case) out of an issue title.
fn parse_task_from_title(title: &str) -> Option<TaskKey> {
    let re = Regex::new(r"[Qq](\d+)\s*[Tt](\d+)").ok()?;
    let caps = re.captures(title)?;
    Some(TaskKey::new(
        format!("Q{}", &caps[1]),
        format!("T{}", &caps[2]),
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
