use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::TaskKey;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum QuestConfigError {
    #[error("failed to read quest config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse quest config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("quest config has no quests")]
    Empty,
    #[error("duplicate quest id `{0}`")]
    DuplicateQuest(String),
    #[error("quest `{0}` has no tasks")]
    EmptyQuest(String),
    #[error("duplicate task id `{task}` in quest `{quest}`")]
    DuplicateTask { quest: String, task: String },
    #[error("quest `{quest}` requires unknown or later quest `{prerequisite}`")]
    BadPrerequisite { quest: String, prerequisite: String },
    #[error("quiz for task {0} has an empty answer key")]
    EmptyAnswerKey(TaskKey),
}

// ---------------------------------------------------------------------------
// Validator specification
// ---------------------------------------------------------------------------

/// Declares which validator gates a task, together with any parameters
/// the validator family needs. The `kind` tag is closed: an unknown
/// validator key fails deserialization, which makes the registry total
/// over the quest/task space by construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidatorSpec {
    /// a/b/c/d onboarding choice that records display preferences.
    DisplayChoice,
    /// Exact match against the live open-issue count.
    IssueCount,
    /// Exact match against the live open-PR count.
    PullRequestCount,
    /// Case-insensitive fixed answer.
    ExactAnswer { answer: String },
    /// Positionally graded multiple-choice quiz.
    Quiz { answers: Vec<String> },
    /// Pick an open, labelled, unclaimed issue to work on.
    SelectIssue { label: String },
    /// `done` trigger: user must have commented on their selected
    /// issue; assigns them on success.
    CommentThenAssign,
    /// `done` trigger: re-runs the task's grading script.
    GradedScript,
    /// Live check that the user opened a PR and commented on it.
    PullRequestWithComment,
    /// Selected issue is closed; pays a streak-multiplied bonus.
    IssueClosed { bonus_per_streak: u64 },
    /// Unimplemented slot: always fails with the generic prompt.
    Placeholder,
}

// ---------------------------------------------------------------------------
// Definitions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub id: String,
    pub prompt: String,
    pub validator: ValidatorSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestDefinition {
    pub id: String,
    #[serde(default)]
    pub prerequisite: Option<String>,
    pub tasks: Vec<TaskDefinition>,
}

#[derive(Debug, Deserialize)]
struct QuestFile {
    quests: Vec<QuestDefinition>,
}

// ---------------------------------------------------------------------------
// QuestConfig
// ---------------------------------------------------------------------------

/// The quest tree, loaded once at process start and immutable after.
/// Concurrent readers share it behind an `Arc` without locking.
#[derive(Debug)]
pub struct QuestConfig {
    quests: Vec<QuestDefinition>,
    // (quest index, task index) per key, built once for O(1) lookup.
    index: HashMap<TaskKey, (usize, usize)>,
}

impl QuestConfig {
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, QuestConfigError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_json(&text)?;
        info!(
            quests = config.quests.len(),
            tasks = config.index.len(),
            "quest config loaded"
        );
        Ok(config)
    }

    pub fn from_json(text: &str) -> Result<Self, QuestConfigError> {
        let file: QuestFile = serde_json::from_str(text)?;
        Self::from_quests(file.quests)
    }

    pub fn from_quests(quests: Vec<QuestDefinition>) -> Result<Self, QuestConfigError> {
        if quests.is_empty() {
            return Err(QuestConfigError::Empty);
        }

        let mut seen_quests = HashSet::new();
        let mut index = HashMap::new();

        for (qi, quest) in quests.iter().enumerate() {
            if !seen_quests.insert(quest.id.clone()) {
                return Err(QuestConfigError::DuplicateQuest(quest.id.clone()));
            }
            if quest.tasks.is_empty() {
                return Err(QuestConfigError::EmptyQuest(quest.id.clone()));
            }
            if let Some(ref pre) = quest.prerequisite {
                // A prerequisite must be an earlier quest in the ordering.
                let ok = quests[..qi].iter().any(|q| &q.id == pre);
                if !ok {
                    return Err(QuestConfigError::BadPrerequisite {
                        quest: quest.id.clone(),
                        prerequisite: pre.clone(),
                    });
                }
            }

            let mut seen_tasks = HashSet::new();
            for (ti, task) in quest.tasks.iter().enumerate() {
                if !seen_tasks.insert(task.id.clone()) {
                    return Err(QuestConfigError::DuplicateTask {
                        quest: quest.id.clone(),
                        task: task.id.clone(),
                    });
                }
                let key = TaskKey::new(&quest.id, &task.id);
                if let ValidatorSpec::Quiz { ref answers } = task.validator {
                    if answers.is_empty() {
                        return Err(QuestConfigError::EmptyAnswerKey(key));
                    }
                }
                index.insert(key, (qi, ti));
            }
        }

        Ok(Self { quests, index })
    }

    /// The quest tree's entry point (first task of the first quest).
    pub fn first_task(&self) -> TaskKey {
        let quest = &self.quests[0];
        TaskKey::new(&quest.id, &quest.tasks[0].id)
    }

    pub fn lookup(&self, key: &TaskKey) -> Option<&TaskDefinition> {
        let &(qi, ti) = self.index.get(key)?;
        Some(&self.quests[qi].tasks[ti])
    }

    /// The task after `key`: next task in the same quest, else the first
    /// task of the following quest, else `None` (terminal).
    pub fn advance(&self, key: &TaskKey) -> Option<TaskKey> {
        let &(qi, ti) = self.index.get(key)?;
        let quest = &self.quests[qi];
        if let Some(next) = quest.tasks.get(ti + 1) {
            return Some(TaskKey::new(&quest.id, &next.id));
        }
        let next_quest = self.quests.get(qi + 1)?;
        Some(TaskKey::new(&next_quest.id, &next_quest.tasks[0].id))
    }

    pub fn quests(&self) -> &[QuestDefinition] {
        &self.quests
    }

    /// Every (quest, task) key in tree order.
    pub fn task_keys(&self) -> Vec<TaskKey> {
        self.quests
            .iter()
            .flat_map(|q| q.tasks.iter().map(|t| TaskKey::new(&q.id, &t.id)))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
