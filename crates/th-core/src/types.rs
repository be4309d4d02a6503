use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// TaskKey
// ---------------------------------------------------------------------------

/// Identifies a single task inside the quest tree, e.g. `Q1/T2`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskKey {
    pub quest: String,
    pub task: String,
}

impl TaskKey {
    pub fn new(quest: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            quest: quest.into(),
            task: task.into(),
        }
    }

    /// Filename prefix for grading scripts, e.g. `Q3T1`.
    pub fn script_prefix(&self) -> String {
        format!("{}{}", self.quest, self.task)
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.quest, self.task)
    }
}

// ---------------------------------------------------------------------------
// Position
// ---------------------------------------------------------------------------

/// Where a user currently sits in the quest tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "task")]
pub enum Position {
    /// Working on a specific task.
    At(TaskKey),
    /// Every quest has been completed.
    Finished,
}

impl Position {
    pub fn current_task(&self) -> Option<&TaskKey> {
        match self {
            Position::At(key) => Some(key),
            Position::Finished => None,
        }
    }
}

// ---------------------------------------------------------------------------
// DisplayPreference
// ---------------------------------------------------------------------------

/// Which progress widgets the user opted into during onboarding.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum DisplayPreference {
    Score,
    Map,
}

// ---------------------------------------------------------------------------
// UserProgress
// ---------------------------------------------------------------------------

/// One participant's progress record.
///
/// Owned exclusively by the progress store; mutated only inside a single
/// validation transaction per inbound event. `completed` never shrinks
/// and `points` never decrease. `version` backs the store's
/// compare-and-swap save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProgress {
    pub user_id: String,
    pub position: Position,
    pub completed: BTreeSet<TaskKey>,
    pub points: u64,
    pub streak_count: u32,
    pub display_preferences: BTreeSet<DisplayPreference>,
    pub selected_issue: Option<u64>,
    pub hints_used: u32,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserProgress {
    /// Fresh record positioned at the quest tree's entry task.
    pub fn new(user_id: impl Into<String>, start: TaskKey) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.into(),
            position: Position::At(start),
            completed: BTreeSet::new(),
            points: 0,
            streak_count: 0,
            display_preferences: BTreeSet::new(),
            selected_issue: None,
            hints_used: 0,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_completed(&self, key: &TaskKey) -> bool {
        self.completed.contains(key)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_key_display_and_prefix() {
        let key = TaskKey::new("Q3", "T1");
        assert_eq!(key.to_string(), "Q3/T1");
        assert_eq!(key.script_prefix(), "Q3T1");
    }

    #[test]
    fn new_progress_starts_clean() {
        let p = UserProgress::new("alice", TaskKey::new("Q0", "T1"));
        assert_eq!(p.points, 0);
        assert_eq!(p.streak_count, 0);
        assert!(p.completed.is_empty());
        assert_eq!(
            p.position.current_task(),
            Some(&TaskKey::new("Q0", "T1"))
        );
    }

    #[test]
    fn position_serde_roundtrip() {
        let pos = Position::At(TaskKey::new("Q1", "T2"));
        let json = serde_json::to_string(&pos).unwrap();
        assert_eq!(serde_json::from_str::<Position>(&json).unwrap(), pos);

        let done = serde_json::to_string(&Position::Finished).unwrap();
        assert_eq!(
            serde_json::from_str::<Position>(&done).unwrap(),
            Position::Finished
        );
    }
}
