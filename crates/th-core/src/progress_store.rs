use std::collections::BTreeSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::OptionalExtension;
use tokio_rusqlite::Connection;
use tracing::debug;

use crate::types::{DisplayPreference, Position, TaskKey, UserProgress};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ProgressStoreError {
    #[error("user `{0}` not found")]
    NotFound(String),
    #[error("user `{0}` already exists")]
    AlreadyExists(String),
    #[error("conflicting concurrent update for `{0}`")]
    Conflict(String),
    #[error("database error: {0}")]
    Db(#[from] tokio_rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, ProgressStoreError>;

// ---------------------------------------------------------------------------
// ProgressStore
// ---------------------------------------------------------------------------

/// Async SQLite-backed store for per-user quest progress and task hints.
///
/// Saves use optimistic compare-and-swap on the record's `version`
/// column, so a stale read-modify-write surfaces as
/// [`ProgressStoreError::Conflict`] instead of silently losing an
/// update.
pub struct ProgressStore {
    conn: Connection,
}

impl ProgressStore {
    /// Open (or create) a database at the given file path.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).await.map_err(ProgressStoreError::Db)?;
        let store = Self { conn };
        store.init_schema().await?;
        Ok(store)
    }

    /// Purely in-memory database (used by tests).
    pub async fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().await.map_err(ProgressStoreError::Db)?;
        let store = Self { conn };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        self.conn
            .call(|conn| {
                conn.execute_batch(
                    "
                    PRAGMA journal_mode=WAL;
                    PRAGMA synchronous=NORMAL;
                    PRAGMA busy_timeout=5000;

                    CREATE TABLE IF NOT EXISTS user_progress (
                        user_id        TEXT PRIMARY KEY,
                        current_quest  TEXT,
                        current_task   TEXT,
                        completed      TEXT NOT NULL,
                        points         INTEGER NOT NULL DEFAULT 0,
                        streak         INTEGER NOT NULL DEFAULT 0,
                        display_prefs  TEXT NOT NULL,
                        selected_issue INTEGER,
                        hints_used     INTEGER NOT NULL DEFAULT 0,
                        version        INTEGER NOT NULL DEFAULT 0,
                        created_at     TEXT NOT NULL,
                        updated_at     TEXT NOT NULL
                    );

                    CREATE TABLE IF NOT EXISTS hints (
                        id    INTEGER PRIMARY KEY AUTOINCREMENT,
                        quest TEXT NOT NULL,
                        task  TEXT NOT NULL,
                        hint  TEXT NOT NULL
                    );

                    CREATE INDEX IF NOT EXISTS idx_hints_task ON hints(quest, task);
                    ",
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // UserProgress CRUD
    // -----------------------------------------------------------------------

    /// Create a fresh progress record positioned at `start`.
    pub async fn create(&self, user_id: &str, start: TaskKey) -> Result<UserProgress> {
        let progress = UserProgress::new(user_id, start);
        let row = ProgressRow::from_progress(&progress);

        let inserted = self
            .conn
            .call(move |conn| {
                let rows = conn.execute(
                    "INSERT INTO user_progress (user_id, current_quest, current_task,
                        completed, points, streak, display_prefs, selected_issue,
                        hints_used, version, created_at, updated_at)
                     VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12)
                     ON CONFLICT(user_id) DO NOTHING",
                    rusqlite::params![
                        row.user_id,
                        row.current_quest,
                        row.current_task,
                        row.completed,
                        row.points,
                        row.streak,
                        row.display_prefs,
                        row.selected_issue,
                        row.hints_used,
                        row.version,
                        row.created_at,
                        row.updated_at,
                    ],
                )?;
                Ok(rows)
            })
            .await?;

        if inserted == 0 {
            return Err(ProgressStoreError::AlreadyExists(user_id.to_string()));
        }
        debug!(user = %user_id, "created progress record");
        Ok(progress)
    }

    /// Fetch a user's progress record.
    pub async fn get(&self, user_id: &str) -> Result<UserProgress> {
        let id = user_id.to_string();
        let found = self
            .conn
            .call(move |conn| {
                let progress = conn
                    .query_row(
                        "SELECT user_id, current_quest, current_task, completed, points,
                                streak, display_prefs, selected_issue, hints_used,
                                version, created_at, updated_at
                         FROM user_progress WHERE user_id = ?1",
                        [id],
                        row_to_progress,
                    )
                    .optional()?;
                Ok(progress)
            })
            .await?;

        found.ok_or_else(|| ProgressStoreError::NotFound(user_id.to_string()))
    }

    /// Persist a mutated record. Compare-and-swap on `version`: a stale
    /// version yields `Conflict` and leaves the stored row untouched. On
    /// success the in-memory version is bumped.
    pub async fn save(&self, progress: &mut UserProgress) -> Result<()> {
        progress.updated_at = Utc::now();
        let row = ProgressRow::from_progress(progress);
        let expected_version = progress.version;

        let (updated, exists) = self
            .conn
            .call(move |conn| {
                let updated = conn.execute(
                    "UPDATE user_progress SET
                        current_quest = ?2, current_task = ?3, completed = ?4,
                        points = ?5, streak = ?6, display_prefs = ?7,
                        selected_issue = ?8, hints_used = ?9,
                        version = version + 1, updated_at = ?10
                     WHERE user_id = ?1 AND version = ?11",
                    rusqlite::params![
                        row.user_id,
                        row.current_quest,
                        row.current_task,
                        row.completed,
                        row.points,
                        row.streak,
                        row.display_prefs,
                        row.selected_issue,
                        row.hints_used,
                        row.updated_at,
                        expected_version,
                    ],
                )?;
                let exists = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM user_progress WHERE user_id = ?1)",
                    [row.user_id],
                    |r| r.get::<_, bool>(0),
                )?;
                Ok((updated, exists))
            })
            .await?;

        if updated == 0 {
            return if exists {
                Err(ProgressStoreError::Conflict(progress.user_id.clone()))
            } else {
                Err(ProgressStoreError::NotFound(progress.user_id.clone()))
            };
        }
        progress.version += 1;
        Ok(())
    }

    /// Remove a user entirely.
    pub async fn delete(&self, user_id: &str) -> Result<()> {
        let id = user_id.to_string();
        let rows = self
            .conn
            .call(move |conn| {
                let rows = conn.execute("DELETE FROM user_progress WHERE user_id = ?1", [id])?;
                Ok(rows)
            })
            .await?;
        if rows == 0 {
            return Err(ProgressStoreError::NotFound(user_id.to_string()));
        }
        debug!(user = %user_id, "deleted progress record");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Hints
    // -----------------------------------------------------------------------

    /// Record a hint for a task. Multiple hints per task are kept in
    /// insertion order.
    pub async fn add_hint(&self, key: &TaskKey, text: &str) -> Result<()> {
        let (quest, task, hint) = (key.quest.clone(), key.task.clone(), text.to_string());
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO hints (quest, task, hint) VALUES (?1, ?2, ?3)",
                    rusqlite::params![quest, task, hint],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// All hints recorded for a task, oldest first.
    pub async fn hints_for(&self, key: &TaskKey) -> Result<Vec<String>> {
        let (quest, task) = (key.quest.clone(), key.task.clone());
        let hints = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT hint FROM hints WHERE quest = ?1 AND task = ?2 ORDER BY id",
                )?;
                let rows = stmt.query_map([quest, task], |r| r.get::<_, String>(0))?;
                let mut hints = Vec::new();
                for row in rows {
                    hints.push(row?);
                }
                Ok(hints)
            })
            .await?;
        Ok(hints)
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

/// Owned column values, ready to move into a `Connection::call` closure.
struct ProgressRow {
    user_id: String,
    current_quest: Option<String>,
    current_task: Option<String>,
    completed: String,
    points: i64,
    streak: i64,
    display_prefs: String,
    selected_issue: Option<i64>,
    hints_used: i64,
    version: i64,
    created_at: String,
    updated_at: String,
}

impl ProgressRow {
    fn from_progress(p: &UserProgress) -> Self {
        let (current_quest, current_task) = match &p.position {
            Position::At(key) => (Some(key.quest.clone()), Some(key.task.clone())),
            Position::Finished => (None, None),
        };
        Self {
            user_id: p.user_id.clone(),
            current_quest,
            current_task,
            completed: serde_json::to_string(&p.completed).unwrap_or_else(|_| "[]".into()),
            points: p.points as i64,
            streak: p.streak_count as i64,
            display_prefs: serde_json::to_string(&p.display_preferences)
                .unwrap_or_else(|_| "[]".into()),
            selected_issue: p.selected_issue.map(|n| n as i64),
            hints_used: p.hints_used as i64,
            version: p.version as i64,
            created_at: p.created_at.to_rfc3339(),
            updated_at: p.updated_at.to_rfc3339(),
        }
    }
}

fn json_column<T: serde::de::DeserializeOwned>(
    idx: usize,
    raw: String,
) -> rusqlite::Result<T> {
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn datetime_column(idx: usize, raw: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_progress(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserProgress> {
    let current_quest: Option<String> = row.get(1)?;
    let current_task: Option<String> = row.get(2)?;
    let position = match (current_quest, current_task) {
        (Some(quest), Some(task)) => Position::At(TaskKey { quest, task }),
        _ => Position::Finished,
    };

    let completed: BTreeSet<TaskKey> = json_column(3, row.get(3)?)?;
    let display_preferences: BTreeSet<DisplayPreference> = json_column(6, row.get(6)?)?;

    Ok(UserProgress {
        user_id: row.get(0)?,
        position,
        completed,
        points: row.get::<_, i64>(4)? as u64,
        streak_count: row.get::<_, i64>(5)? as u32,
        display_preferences,
        selected_issue: row.get::<_, Option<i64>>(7)?.map(|n| n as u64),
        hints_used: row.get::<_, i64>(8)? as u32,
        version: row.get::<_, i64>(9)? as u64,
        created_at: datetime_column(10, row.get(10)?)?,
        updated_at: datetime_column(11, row.get(11)?)?,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
