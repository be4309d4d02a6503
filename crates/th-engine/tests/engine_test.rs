//! End-to-end engine tests over the shipped quest tree, an in-memory
//! store, and canned repository signals.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use th_core::progress_store::ProgressStore;
use th_core::quest_config::QuestConfig;
use th_core::types::{Position, TaskKey};
use th_engine::{InboundEvent, ProgressionEngine, ResponseTemplates};
use th_grader::Grader;
use th_signals::{RepoAdmin, RepoSignals, Result as SignalResult, SignalError};

// ---------------------------------------------------------------------------
// Mocks
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MockSignals {
    issues: u64,
    prs: u64,
    open_issues: Vec<u64>,
    first_assignee: bool,
    labelled: bool,
    commented: bool,
    pr_with_comment: bool,
    closed: bool,
    fail_transient: bool,
    assigned: Mutex<Vec<(u64, String)>>,
}

impl MockSignals {
    fn check(&self) -> SignalResult<()> {
        if self.fail_transient {
            Err(SignalError::Transient("api unavailable".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RepoSignals for MockSignals {
    async fn issue_count(&self) -> SignalResult<u64> {
        self.check()?;
        Ok(self.issues)
    }
    async fn pull_request_count(&self) -> SignalResult<u64> {
        self.check()?;
        Ok(self.prs)
    }
    async fn open_issue_numbers(&self) -> SignalResult<Vec<u64>> {
        self.check()?;
        Ok(self.open_issues.clone())
    }
    async fn is_first_assignee(&self, _user: &str, _issue: u64) -> SignalResult<bool> {
        self.check()?;
        Ok(self.first_assignee)
    }
    async fn has_label(&self, _issue: u64, _label: &str) -> SignalResult<bool> {
        self.check()?;
        Ok(self.labelled)
    }
    async fn issue_assignee_login(&self, _issue: u64) -> SignalResult<Option<String>> {
        Ok(None)
    }
    async fn user_commented_on_issue(&self, _issue: u64, _user: &str) -> SignalResult<bool> {
        self.check()?;
        Ok(self.commented)
    }
    async fn user_opened_pr_with_comment(&self, _user: &str) -> SignalResult<bool> {
        self.check()?;
        Ok(self.pr_with_comment)
    }
    async fn issue_is_closed(&self, _issue: u64) -> SignalResult<bool> {
        self.check()?;
        Ok(self.closed)
    }
    async fn assign_user(&self, issue: u64, user: &str) -> SignalResult<()> {
        self.check()?;
        self.assigned.lock().unwrap().push((issue, user.to_string()));
        Ok(())
    }
}

#[derive(Default)]
struct MockAdmin {
    created: Mutex<Vec<String>>,
    fail: bool,
}

#[async_trait]
impl RepoAdmin for MockAdmin {
    async fn is_org_owner(&self, user: &str) -> SignalResult<bool> {
        Ok(user == "owner")
    }
    async fn create_user_repo(&self, user: &str) -> SignalResult<String> {
        if self.fail {
            return Err(SignalError::Transient("api unavailable".into()));
        }
        let name = format!("quest-{user}");
        self.created.lock().unwrap().push(name.clone());
        Ok(name)
    }
    async fn delete_repo(&self, _name: &str) -> SignalResult<()> {
        if self.fail {
            return Err(SignalError::NotFound);
        }
        Ok(())
    }
    async fn close_open_issues(&self, _name: &str) -> SignalResult<()> {
        if self.fail {
            return Err(SignalError::Transient("api unavailable".into()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct Harness {
    engine: ProgressionEngine,
    store: Arc<ProgressStore>,
    quests: Arc<QuestConfig>,
}

async fn harness_with(signals: MockSignals, admin: MockAdmin, grading_root: &Path) -> Harness {
    let quests = Arc::new(
        QuestConfig::from_json(include_str!("../../../config/quest_config.json")).unwrap(),
    );
    let store = Arc::new(ProgressStore::open_in_memory().await.unwrap());
    let templates = Arc::new(
        ResponseTemplates::from_json(include_str!("../../../config/responses.json")).unwrap(),
    );
    // Grading scripts keep their `.py` names but run under `sh` so the
    // tests have no Python dependency.
    let grader = Arc::new(Grader::new(grading_root, "sh", Duration::from_secs(5)));
    let engine = ProgressionEngine::new(
        Arc::clone(&quests),
        Arc::clone(&store),
        Arc::new(signals),
        Arc::new(admin),
        grader,
        templates,
        "org/playground",
    );
    Harness {
        engine,
        store,
        quests,
    }
}

async fn harness(signals: MockSignals) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    harness_with(signals, MockAdmin::default(), dir.path()).await
}

/// Create `user` and move their cursor to `key`.
async fn place(h: &Harness, user: &str, key: TaskKey) {
    h.store.create(user, h.quests.first_task()).await.unwrap();
    let mut p = h.store.get(user).await.unwrap();
    p.position = Position::At(key);
    h.store.save(&mut p).await.unwrap();
}

fn comment(user: &str, body: &str) -> InboundEvent {
    InboundEvent::new(user, body)
}

// ---------------------------------------------------------------------------
// Progression
// ---------------------------------------------------------------------------

#[tokio::test]
async fn correct_issue_count_advances_to_next_task() {
    let h = harness(MockSignals {
        issues: 12,
        ..Default::default()
    })
    .await;
    place(&h, "alice", TaskKey::new("Q1", "T1")).await;

    let reply = h.engine.handle_comment(&comment("alice", "12")).await;
    assert!(reply.contains("Great work"));

    let p = h.store.get("alice").await.unwrap();
    assert_eq!(p.position, Position::At(TaskKey::new("Q1", "T2")));
    assert_eq!(p.points, 50);
    assert_eq!(p.streak_count, 1);
    assert!(p.completed.contains(&TaskKey::new("Q1", "T1")));
}

#[tokio::test]
async fn display_choice_a_records_score_only() {
    use th_core::types::DisplayPreference;

    let h = harness(MockSignals::default()).await;
    // A fresh user starts on the onboarding display-choice task.
    h.store.create("alice", h.quests.first_task()).await.unwrap();

    let reply = h.engine.handle_comment(&comment("alice", "a")).await;
    assert!(reply.contains("Great work"));

    let p = h.store.get("alice").await.unwrap();
    assert!(p.display_preferences.contains(&DisplayPreference::Score));
    assert!(!p.display_preferences.contains(&DisplayPreference::Map));
}

#[tokio::test]
async fn wrong_answer_leaves_progress_untouched() {
    let h = harness(MockSignals {
        issues: 12,
        ..Default::default()
    })
    .await;
    place(&h, "alice", TaskKey::new("Q1", "T1")).await;

    let reply = h.engine.handle_comment(&comment("alice", "99")).await;
    assert!(reply.contains("not quite right"));
    assert!(reply.contains("Click here to start"));

    let p = h.store.get("alice").await.unwrap();
    assert_eq!(p.position, Position::At(TaskKey::new("Q1", "T1")));
    assert_eq!(p.points, 0);
    assert!(p.completed.is_empty());
}

#[tokio::test]
async fn transient_signal_failure_reads_as_ordinary_retry() {
    let h = harness(MockSignals {
        issues: 12,
        fail_transient: true,
        ..Default::default()
    })
    .await;
    place(&h, "alice", TaskKey::new("Q1", "T1")).await;

    let reply = h.engine.handle_comment(&comment("alice", "12")).await;
    assert!(reply.contains("not quite right"));

    let p = h.store.get("alice").await.unwrap();
    assert_eq!(p.points, 0);
}

#[tokio::test]
async fn unknown_user_gets_onboarding_prompt() {
    let h = harness(MockSignals::default()).await;
    let reply = h.engine.handle_comment(&comment("stranger", "hello")).await;
    assert!(reply.contains("stranger"));
    assert!(reply.contains("/new_user"));
}

#[tokio::test]
async fn finished_user_is_congratulated() {
    let h = harness(MockSignals::default()).await;
    h.store.create("alice", h.quests.first_task()).await.unwrap();
    let mut p = h.store.get("alice").await.unwrap();
    p.position = Position::Finished;
    h.store.save(&mut p).await.unwrap();

    let reply = h.engine.handle_comment(&comment("alice", "anything")).await;
    assert!(reply.contains("already completed every quest"));
}

#[tokio::test]
async fn quiz_completes_with_score_and_feedback() {
    let h = harness(MockSignals::default()).await;
    // Q1/T4 answer key is b, a, c, b, d.
    place(&h, "alice", TaskKey::new("Q1", "T4")).await;

    let reply = h.engine.handle_comment(&comment("alice", "b, a, a, b, a")).await;
    assert!(reply.contains("You correctly answered 3 questions!"));
    assert_eq!(reply.matches('✅').count(), 3);
    assert_eq!(reply.matches('❌').count(), 2);

    // Any gradeable submission completes the task.
    let p = h.store.get("alice").await.unwrap();
    assert_eq!(p.position, Position::At(TaskKey::new("Q2", "T1")));
    assert_eq!(p.points, 50);
}

#[tokio::test]
async fn select_issue_remembers_choice_for_later_tasks() {
    let h = harness(MockSignals {
        open_issues: vec![7, 8],
        first_assignee: true,
        labelled: true,
        commented: true,
        ..Default::default()
    })
    .await;
    place(&h, "alice", TaskKey::new("Q2", "T2")).await;

    h.engine.handle_comment(&comment("alice", "#7")).await;
    let p = h.store.get("alice").await.unwrap();
    assert_eq!(p.selected_issue, Some(7));
    assert_eq!(p.position, Position::At(TaskKey::new("Q2", "T3")));

    // The follow-up task assigns the user to that same issue.
    let reply = h.engine.handle_comment(&comment("alice", "done")).await;
    assert!(reply.contains("Great work"));
    let p = h.store.get("alice").await.unwrap();
    assert_eq!(p.position, Position::At(TaskKey::new("Q2", "T4")));
}

#[tokio::test]
async fn streak_bonus_uses_streak_before_the_completion() {
    let h = harness(MockSignals {
        closed: true,
        ..Default::default()
    })
    .await;
    place(&h, "alice", TaskKey::new("Q3", "T3")).await;
    let mut p = h.store.get("alice").await.unwrap();
    p.streak_count = 2;
    p.selected_issue = Some(7);
    h.store.save(&mut p).await.unwrap();

    let reply = h.engine.handle_comment(&comment("alice", "done")).await;
    assert!(reply.contains("+200 points"));

    let p = h.store.get("alice").await.unwrap();
    // 50 base + 2 * 100 streak bonus.
    assert_eq!(p.points, 250);
    assert_eq!(p.streak_count, 3);
}

// ---------------------------------------------------------------------------
// Idempotence and concurrency
// ---------------------------------------------------------------------------

#[tokio::test]
async fn completing_twice_never_double_credits() {
    let h = harness(MockSignals {
        issues: 12,
        ..Default::default()
    })
    .await;
    place(&h, "alice", TaskKey::new("Q1", "T1")).await;

    h.engine.handle_comment(&comment("alice", "12")).await;
    // Force the cursor back as if a stale replay re-ran the same task.
    let mut p = h.store.get("alice").await.unwrap();
    p.position = Position::At(TaskKey::new("Q1", "T1"));
    h.store.save(&mut p).await.unwrap();

    h.engine.handle_comment(&comment("alice", "12")).await;
    let p = h.store.get("alice").await.unwrap();
    assert_eq!(p.points, 50);
    assert_eq!(p.streak_count, 1);
    assert_eq!(p.completed.len(), 1);
    // The cursor skips the already completed task.
    assert_eq!(p.position, Position::At(TaskKey::new("Q1", "T2")));
}

#[tokio::test]
async fn simultaneous_comments_credit_the_task_once() {
    let h = harness(MockSignals {
        issues: 12,
        ..Default::default()
    })
    .await;
    place(&h, "alice", TaskKey::new("Q1", "T1")).await;

    let ev1 = comment("alice", "12");
    let ev2 = comment("alice", "12");
    let first = h.engine.handle_comment(&ev1);
    let second = h.engine.handle_comment(&ev2);
    tokio::join!(first, second);

    let p = h.store.get("alice").await.unwrap();
    assert_eq!(p.points, 50);
    assert_eq!(p.completed.len(), 1);
}

// ---------------------------------------------------------------------------
// Grading
// ---------------------------------------------------------------------------

#[tokio::test]
async fn passing_script_advances_the_coding_task() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("Q3T1-fix_bot.py"), "echo all green\nexit 0\n").unwrap();
    let h = harness_with(MockSignals::default(), MockAdmin::default(), dir.path()).await;
    place(&h, "alice", TaskKey::new("Q3", "T1")).await;

    let reply = h.engine.handle_comment(&comment("alice", "done")).await;
    assert!(reply.contains("Great work"));
    let p = h.store.get("alice").await.unwrap();
    assert_eq!(p.position, Position::At(TaskKey::new("Q3", "T2")));
}

#[tokio::test]
async fn failing_script_embeds_the_test_report() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("Q3T1-fix_bot.py"),
        "echo 1 of 3 passed\necho AssertionError >&2\nexit 1\n",
    )
    .unwrap();
    let h = harness_with(MockSignals::default(), MockAdmin::default(), dir.path()).await;
    place(&h, "alice", TaskKey::new("Q3", "T1")).await;

    let reply = h.engine.handle_comment(&comment("alice", "done")).await;
    assert!(reply.contains("❌ **Test Failed**"));
    assert!(reply.contains("1 of 3 passed"));
    assert!(reply.contains("AssertionError"));

    let p = h.store.get("alice").await.unwrap();
    assert_eq!(p.position, Position::At(TaskKey::new("Q3", "T1")));
    assert_eq!(p.points, 0);
}

#[tokio::test]
async fn missing_script_points_at_an_administrator() {
    let h = harness(MockSignals::default()).await;
    place(&h, "alice", TaskKey::new("Q3", "T1")).await;

    let reply = h.engine.handle_comment(&comment("alice", "done")).await;
    assert!(reply.contains("Test file not found"));
    assert!(reply.contains("administrator"));
}

#[tokio::test]
async fn test_command_reruns_script_named_in_issue_title() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("Q3T1-fix_bot.py"), "echo ok\nexit 0\n").unwrap();
    let h = harness_with(MockSignals::default(), MockAdmin::default(), dir.path()).await;
    place(&h, "alice", TaskKey::new("Q3", "T1")).await;

    let event = InboundEvent::new("alice", "test").with_issue(5, "Q3T1 - Fix the bot");
    let reply = h.engine.handle_comment(&event).await;
    assert!(reply.contains("Test Results for Q3 T1"));
    assert!(reply.contains("✅ **Test Passed**"));

    // On-demand test runs never advance progress.
    let p = h.store.get("alice").await.unwrap();
    assert_eq!(p.points, 0);
}

#[tokio::test]
async fn test_command_on_unparseable_title_explains_the_convention() {
    let h = harness(MockSignals::default()).await;
    place(&h, "alice", TaskKey::new("Q3", "T1")).await;

    let event = InboundEvent::new("alice", "test").with_issue(5, "general chatter");
    let reply = h.engine.handle_comment(&event).await;
    assert!(reply.contains("couldn't tell which task"));
}

// ---------------------------------------------------------------------------
// Hints
// ---------------------------------------------------------------------------

#[tokio::test]
async fn help_cycles_through_recorded_hints() {
    let h = harness(MockSignals::default()).await;
    place(&h, "alice", TaskKey::new("Q1", "T1")).await;
    let key = TaskKey::new("Q1", "T1");
    h.store.add_hint(&key, "first hint").await.unwrap();
    h.store.add_hint(&key, "second hint").await.unwrap();

    let a = h.engine.handle_comment(&comment("alice", "help")).await;
    let b = h.engine.handle_comment(&comment("alice", "help me please")).await;
    let c = h.engine.handle_comment(&comment("alice", "HELP")).await;
    assert!(a.contains("first hint"));
    assert!(b.contains("second hint"));
    assert!(c.contains("first hint"));
}

#[tokio::test]
async fn help_without_hints_says_so() {
    let h = harness(MockSignals::default()).await;
    place(&h, "alice", TaskKey::new("Q1", "T1")).await;

    let reply = h.engine.handle_comment(&comment("alice", "help")).await;
    assert!(reply.contains("No hint is available"));
}

// ---------------------------------------------------------------------------
// Admin commands
// ---------------------------------------------------------------------------

#[tokio::test]
async fn new_user_creates_record_at_first_task() {
    let h = harness(MockSignals::default()).await;

    let reply = h.engine.handle_command("/new_user alice").await;
    assert!(reply.contains("Welcome aboard"));
    let p = h.store.get("alice").await.unwrap();
    assert_eq!(p.position, Position::At(h.quests.first_task()));

    let again = h.engine.handle_command("/new_user alice").await;
    assert!(again.contains("already exists"));
}

#[tokio::test]
async fn del_user_wipes_the_record() {
    let h = harness(MockSignals::default()).await;
    h.store.create("alice", h.quests.first_task()).await.unwrap();

    let reply = h.engine.handle_command("/del_user alice").await;
    assert!(reply.contains("wipe complete"));
    assert!(h.store.get("alice").await.is_err());

    let missing = h.engine.handle_command("/del_user ghost").await;
    assert!(missing.contains("No record found"));

    // The wipe drops the per-user lock; a later comment from the same
    // login recreates it on demand.
    let reply = h.engine.handle_comment(&comment("alice", "hello")).await;
    assert!(reply.contains("/new_user"));
}

#[tokio::test]
async fn new_hint_validates_the_task_key() {
    let h = harness(MockSignals::default()).await;

    let ok = h
        .engine
        .handle_command("/new_hint Q1 T1 Count the open issues")
        .await;
    assert!(ok.contains("Hint added for Q1/T1"));

    let bad = h.engine.handle_command("/new_hint Q9 T9 nope").await;
    assert!(bad.contains("Unknown task Q9/T9"));
}

#[tokio::test]
async fn reset_repo_is_never_treated_as_a_hint() {
    let h = harness(MockSignals::default()).await;

    let reply = h.engine.handle_command("/reset_repo quest-alice").await;
    assert!(reply.contains("reset successful"));
    // No hint row may appear as a side effect of the reset.
    for key in h.quests.task_keys() {
        assert!(h.store.hints_for(&key).await.unwrap().is_empty());
    }
}

#[tokio::test]
async fn create_repos_reports_per_user_results() {
    let h = harness(MockSignals::default()).await;

    let reply = h.engine.handle_command("/create_repos alice, bob").await;
    assert!(reply.contains("quest-alice"));
    assert!(reply.contains("quest-bob"));
}

#[tokio::test]
async fn garbage_command_gets_the_usage_message() {
    let h = harness(MockSignals::default()).await;
    let reply = h.engine.handle_command("/frobnicate everything").await;
    assert!(reply.contains("Unknown command"));
}
