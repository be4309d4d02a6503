//! Task validators.
//!
//! Each validator family judges one kind of task completion evidence:
//! a literal answer, a live repository signal, a graded script run.
//! Validators are pure judges over a [`ValidationContext`]; they mutate
//! the in-flight progress record (display preferences, selected issue)
//! but never persist it. The engine owns persistence and point
//! crediting.

use std::collections::HashMap;

use async_trait::async_trait;
use th_core::quest_config::{QuestConfig, ValidatorSpec};
use th_core::types::{DisplayPreference, TaskKey, UserProgress};
use th_grader::{Grader, GraderError};
use th_signals::{RepoSignals, SignalError};
use tracing::{error, warn};

use crate::quiz;
use crate::responses::ResponseTemplates;

/// Base reward for completing a task. Streak-sensitive tasks add a
/// bonus on top.
pub const TASK_POINTS: u64 = 50;

// ---------------------------------------------------------------------------
// Outcome and context
// ---------------------------------------------------------------------------

/// Verdict of one validation attempt. The response text is posted back
/// to the user verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Success { points: u64, response: String },
    Failure { response: String },
}

/// Everything a validator may consult or touch while judging a comment.
pub struct ValidationContext<'a> {
    pub progress: &'a mut UserProgress,
    pub user: &'a str,
    pub comment: &'a str,
    pub signals: &'a dyn RepoSignals,
    pub grader: &'a Grader,
    pub templates: &'a ResponseTemplates,
    pub repo_slug: &'a str,
}

impl ValidationContext<'_> {
    fn success(&self) -> ValidationOutcome {
        ValidationOutcome::Success {
            points: TASK_POINTS,
            response: self.templates.success.clone(),
        }
    }

    fn failure(&self) -> ValidationOutcome {
        ValidationOutcome::Failure {
            response: format!(
                "{}{}",
                self.templates.error,
                ResponseTemplates::start_link(self.repo_slug)
            ),
        }
    }

    fn failure_with(&self, note: &str) -> ValidationOutcome {
        ValidationOutcome::Failure {
            response: format!(
                "{}\n\n{}{}",
                self.templates.error,
                note,
                ResponseTemplates::start_link(self.repo_slug)
            ),
        }
    }

    /// A live signal query failed. The user sees the ordinary retry
    /// prompt; re-commenting retries the whole validation.
    fn signal_failure(&self, err: SignalError) -> ValidationOutcome {
        warn!(user = self.user, error = %err, "signal query failed during validation");
        self.failure()
    }

    fn is_done_trigger(&self) -> bool {
        self.comment.trim().eq_ignore_ascii_case("done")
    }
}

/// One task validator. Implementations are stateless apart from their
/// configuration and safe to share across concurrent validations.
#[async_trait]
pub trait TaskValidator: Send + Sync {
    async fn validate(&self, ctx: &mut ValidationContext<'_>) -> ValidationOutcome;
}

// ---------------------------------------------------------------------------
// Answer-driven validators
// ---------------------------------------------------------------------------

/// Onboarding a/b/c/d choice that records which progress widgets the
/// user wants. Any recognised letter completes the task.
struct DisplayChoiceValidator;

#[async_trait]
impl TaskValidator for DisplayChoiceValidator {
    async fn validate(&self, ctx: &mut ValidationContext<'_>) -> ValidationOutcome {
        // The prompt advertises (a) score, (b) map, (c) both, (d) neither.
        let text = ctx.comment.to_lowercase();
        let prefs: &[DisplayPreference] = if text.contains('a') {
            &[DisplayPreference::Score]
        } else if text.contains('b') {
            &[DisplayPreference::Map]
        } else if text.contains('c') {
            &[DisplayPreference::Score, DisplayPreference::Map]
        } else if text.contains('d') {
            &[]
        } else {
            return ctx.failure();
        };

        ctx.progress.display_preferences = prefs.iter().copied().collect();
        ctx.success()
    }
}

/// Case-insensitive comparison against a fixed answer string.
struct ExactAnswerValidator {
    answer: String,
}

#[async_trait]
impl TaskValidator for ExactAnswerValidator {
    async fn validate(&self, ctx: &mut ValidationContext<'_>) -> ValidationOutcome {
        if ctx.comment.trim().eq_ignore_ascii_case(&self.answer) {
            ctx.success()
        } else {
            ctx.failure()
        }
    }
}

/// Positionally graded multiple-choice quiz. Any submission with the
/// right number of answers completes the task; the response reports the
/// score with per-question feedback.
struct QuizValidator {
    answers: Vec<String>,
}

#[async_trait]
impl TaskValidator for QuizValidator {
    async fn validate(&self, ctx: &mut ValidationContext<'_>) -> ValidationOutcome {
        let result = match quiz::grade(ctx.comment, &self.answers) {
            Ok(result) => result,
            Err(quiz::QuizError::WrongCount { expected, got }) => {
                return ctx.failure_with(&format!(
                    "I expected {expected} answers but found {got}. Please answer every question, e.g. `a, b, c`."
                ));
            }
            Err(quiz::QuizError::Empty) => {
                return ctx.failure_with("I couldn't find any answers in your comment. Please answer every question, e.g. `a, b, c`.");
            }
        };

        ValidationOutcome::Success {
            points: TASK_POINTS,
            response: format!(
                "{}\n ## You correctly answered {} questions!\n\n ### Feedback:\n{}",
                ctx.templates.success,
                result.correct,
                result.feedback.concat()
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Signal-driven validators
// ---------------------------------------------------------------------------

/// The answer must equal the repository's live open-issue count.
struct IssueCountValidator;

#[async_trait]
impl TaskValidator for IssueCountValidator {
    async fn validate(&self, ctx: &mut ValidationContext<'_>) -> ValidationOutcome {
        let Ok(guess) = ctx.comment.trim().parse::<u64>() else {
            return ctx.failure();
        };
        match ctx.signals.issue_count().await {
            Ok(live) if guess == live => ctx.success(),
            Ok(_) => ctx.failure(),
            Err(e) => ctx.signal_failure(e),
        }
    }
}

/// The answer must equal the repository's live open-PR count.
struct PullRequestCountValidator;

#[async_trait]
impl TaskValidator for PullRequestCountValidator {
    async fn validate(&self, ctx: &mut ValidationContext<'_>) -> ValidationOutcome {
        let Ok(guess) = ctx.comment.trim().parse::<u64>() else {
            return ctx.failure();
        };
        match ctx.signals.pull_request_count().await {
            Ok(live) if guess == live => ctx.success(),
            Ok(_) => ctx.failure(),
            Err(e) => ctx.signal_failure(e),
        }
    }
}

/// Pick an open, correctly labelled, unclaimed issue to work on. The
/// accepted issue number is remembered on the progress record for the
/// follow-up tasks.
struct SelectIssueValidator {
    label: String,
}

#[async_trait]
impl TaskValidator for SelectIssueValidator {
    async fn validate(&self, ctx: &mut ValidationContext<'_>) -> ValidationOutcome {
        let Ok(issue) = ctx.comment.trim().trim_start_matches('#').parse::<u64>() else {
            return ctx.failure_with("Please reply with the number of the issue you picked, e.g. `#42`.");
        };

        let (open, first, labelled) = tokio::join!(
            ctx.signals.open_issue_numbers(),
            ctx.signals.is_first_assignee(ctx.user, issue),
            ctx.signals.has_label(issue, &self.label),
        );

        let open = match open {
            Ok(open) => open,
            Err(e) => return ctx.signal_failure(e),
        };
        if !open.contains(&issue) {
            return ctx.failure_with("That issue is not open. Pick one of the currently open issues.");
        }
        match first {
            Ok(true) => {}
            Ok(false) => {
                return ctx.failure_with("Someone else is already working on that issue. Pick an unclaimed one.");
            }
            Err(e) => return ctx.signal_failure(e),
        }
        match labelled {
            Ok(true) => {}
            Ok(false) => {
                return ctx.failure_with(&format!(
                    "That issue is not labelled `{}`. Pick one that is.",
                    self.label
                ));
            }
            Err(e) => return ctx.signal_failure(e),
        }

        ctx.progress.selected_issue = Some(issue);
        ctx.success()
    }
}

/// `done` trigger: the user must have commented on their selected
/// issue, after which they are assigned to it.
struct CommentThenAssignValidator;

#[async_trait]
impl TaskValidator for CommentThenAssignValidator {
    async fn validate(&self, ctx: &mut ValidationContext<'_>) -> ValidationOutcome {
        if !ctx.is_done_trigger() {
            return ctx.failure_with("Comment `done` here once you have introduced yourself on your selected issue.");
        }
        let Some(issue) = ctx.progress.selected_issue else {
            return ctx.failure_with("You have not selected an issue yet.");
        };

        match ctx.signals.user_commented_on_issue(issue, ctx.user).await {
            Ok(true) => {}
            Ok(false) => {
                return ctx.failure_with(&format!(
                    "I couldn't find a comment from you on issue #{issue} yet."
                ));
            }
            Err(e) => return ctx.signal_failure(e),
        }

        if let Err(e) = ctx.signals.assign_user(issue, ctx.user).await {
            warn!(user = ctx.user, issue, error = %e, "failed to assign user to issue");
            return ctx.failure_with(&format!(
                "I saw your comment but couldn't assign you to issue #{issue}. Please try again."
            ));
        }
        ctx.success()
    }
}

/// Live check that the user has an open pull request they also
/// commented on. Best-effort re-assignment to their selected issue so
/// the board stays accurate.
struct PullRequestWithCommentValidator;

#[async_trait]
impl TaskValidator for PullRequestWithCommentValidator {
    async fn validate(&self, ctx: &mut ValidationContext<'_>) -> ValidationOutcome {
        match ctx.signals.user_opened_pr_with_comment(ctx.user).await {
            Ok(true) => {}
            Ok(false) => {
                return ctx.failure_with("I couldn't find an open pull request from you with a comment on it yet.");
            }
            Err(e) => return ctx.signal_failure(e),
        }

        if let Some(issue) = ctx.progress.selected_issue {
            if let Err(e) = ctx.signals.assign_user(issue, ctx.user).await {
                warn!(user = ctx.user, issue, error = %e, "assignment after PR check failed");
            }
        }
        ctx.success()
    }
}

/// The user's selected issue has been closed. Pays the base reward plus
/// a streak bonus computed from the streak as it stood before this
/// completion.
struct IssueClosedValidator {
    bonus_per_streak: u64,
}

#[async_trait]
impl TaskValidator for IssueClosedValidator {
    async fn validate(&self, ctx: &mut ValidationContext<'_>) -> ValidationOutcome {
        let Some(issue) = ctx.progress.selected_issue else {
            return ctx.failure_with("You have not selected an issue yet.");
        };
        match ctx.signals.issue_is_closed(issue).await {
            Ok(true) => {
                let bonus = u64::from(ctx.progress.streak_count) * self.bonus_per_streak;
                ValidationOutcome::Success {
                    points: TASK_POINTS + bonus,
                    response: format!(
                        "{}\n\nStreak bonus: +{bonus} points!",
                        ctx.templates.success
                    ),
                }
            }
            Ok(false) => ctx.failure_with(&format!("Issue #{issue} is still open.")),
            Err(e) => ctx.signal_failure(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Script-driven validator
// ---------------------------------------------------------------------------

/// `done` trigger: re-runs the task's grading script and completes on a
/// passing exit status.
struct GradedScriptValidator {
    key: TaskKey,
}

#[async_trait]
impl TaskValidator for GradedScriptValidator {
    async fn validate(&self, ctx: &mut ValidationContext<'_>) -> ValidationOutcome {
        if !ctx.is_done_trigger() {
            return ctx.failure_with("Comment `done` here once your code is ready and I will run the tests.");
        }

        let report = match ctx.grader.run(&self.key).await {
            Ok(report) => report,
            Err(GraderError::ScriptNotFound(prefix)) => {
                error!(task = %self.key, prefix = %prefix, "grading script missing");
                return ValidationOutcome::Failure {
                    response: "Test file not found. Please contact an administrator.".to_string(),
                };
            }
            Err(GraderError::Ambiguous { prefix, matches }) => {
                error!(task = %self.key, prefix = %prefix, ?matches, "ambiguous grading scripts");
                return ValidationOutcome::Failure {
                    response: "Grading is misconfigured for this task. Please contact an administrator.".to_string(),
                };
            }
            Err(GraderError::Io(e)) => {
                warn!(task = %self.key, error = %e, "grading script discovery failed");
                return ctx.failure();
            }
        };

        if report.passed {
            ctx.success()
        } else {
            ctx.failure_with(&th_grader::report::format_report(&self.key, &report))
        }
    }
}

/// Slot for content that has not been written yet.
struct PlaceholderValidator;

#[async_trait]
impl TaskValidator for PlaceholderValidator {
    async fn validate(&self, ctx: &mut ValidationContext<'_>) -> ValidationOutcome {
        ctx.failure()
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Maps every task in the quest tree to its validator. Construction
/// from a parsed [`QuestConfig`] is total: the config cannot name a
/// validator kind that has no implementation here.
pub struct ValidatorRegistry {
    validators: HashMap<TaskKey, Box<dyn TaskValidator>>,
}

impl ValidatorRegistry {
    pub fn from_config(config: &QuestConfig) -> Self {
        let mut validators: HashMap<TaskKey, Box<dyn TaskValidator>> = HashMap::new();
        for key in config.task_keys() {
            let Some(def) = config.lookup(&key) else { continue };
            let validator: Box<dyn TaskValidator> = match &def.validator {
                ValidatorSpec::DisplayChoice => Box::new(DisplayChoiceValidator),
                ValidatorSpec::IssueCount => Box::new(IssueCountValidator),
                ValidatorSpec::PullRequestCount => Box::new(PullRequestCountValidator),
                ValidatorSpec::ExactAnswer { answer } => Box::new(ExactAnswerValidator {
                    answer: answer.clone(),
                }),
                ValidatorSpec::Quiz { answers } => Box::new(QuizValidator {
                    answers: answers.clone(),
                }),
                ValidatorSpec::SelectIssue { label } => Box::new(SelectIssueValidator {
                    label: label.clone(),
                }),
                ValidatorSpec::CommentThenAssign => Box::new(CommentThenAssignValidator),
                ValidatorSpec::GradedScript => Box::new(GradedScriptValidator { key: key.clone() }),
                ValidatorSpec::PullRequestWithComment => Box::new(PullRequestWithCommentValidator),
                ValidatorSpec::IssueClosed { bonus_per_streak } => Box::new(IssueClosedValidator {
                    bonus_per_streak: *bonus_per_streak,
                }),
                ValidatorSpec::Placeholder => Box::new(PlaceholderValidator),
            };
            validators.insert(key, validator);
        }
        Self { validators }
    }

    pub fn get(&self, key: &TaskKey) -> Option<&dyn TaskValidator> {
        self.validators.get(key).map(|v| v.as_ref())
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
