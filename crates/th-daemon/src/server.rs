//! Webhook endpoint.
//!
//! GitHub delivers `issue_comment` and `issues` events here. The event
//! name rides in the `X-GitHub-Event` header; the JSON body is parsed
//! into the few fields the engine cares about. Deliveries are always
//! acknowledged with 2xx so GitHub never retries: failures are a
//! logging concern, not the sender's.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use th_engine::{InboundEvent, ProgressionEngine};
use th_signals::RepoAdmin;
use tracing::{debug, info, warn};

use crate::commenter::Commenter;

// ---------------------------------------------------------------------------
// State and routing
// ---------------------------------------------------------------------------

pub struct AppState {
    pub engine: Arc<ProgressionEngine>,
    pub admin_gate: Arc<dyn RepoAdmin>,
    pub commenter: Arc<dyn Commenter>,
    /// `owner/name` of the tracked OSS repository. Activity there is
    /// raw signal material, never a quest answer.
    pub tracked_slug: String,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/webhook", post(webhook))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub comment: Option<CommentPayload>,
    #[serde(default)]
    pub issue: Option<IssuePayload>,
    #[serde(default)]
    pub repository: Option<RepositoryPayload>,
}

#[derive(Debug, Deserialize)]
pub struct RepositoryPayload {
    pub full_name: String,
}

#[derive(Debug, Deserialize)]
pub struct CommentPayload {
    pub body: String,
    pub user: ActorPayload,
}

#[derive(Debug, Deserialize)]
pub struct IssuePayload {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub user: Option<ActorPayload>,
}

#[derive(Debug, Deserialize)]
pub struct ActorPayload {
    pub login: String,
}

/// GitHub App and bot accounts carry a `[bot]` suffix. Their comments
/// (including our own responses) must never re-enter the engine.
fn is_bot(login: &str) -> bool {
    login.ends_with("[bot]")
}

const NON_OWNER_COMMAND_REPLY: &str =
    "You need to be a repo or org owner to run / commands.";

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

async fn webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<WebhookPayload>,
) -> StatusCode {
    let event = headers
        .get("x-github-event")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let action = payload.action.as_deref().unwrap_or_default();

    match (event, action) {
        ("issue_comment", "created") => handle_issue_comment(&state, payload).await,
        ("issues", "opened") => handle_issue_opened(&state, payload).await,
        _ => {
            debug!(event, action, "ignoring webhook delivery");
            StatusCode::NO_CONTENT
        }
    }
}

async fn handle_issue_comment(state: &AppState, payload: WebhookPayload) -> StatusCode {
    if let Some(ref repo) = payload.repository {
        if repo.full_name == state.tracked_slug {
            debug!(repo = %repo.full_name, "ignoring comment on the tracked repository");
            return StatusCode::NO_CONTENT;
        }
    }
    let (Some(comment), Some(issue)) = (payload.comment, payload.issue) else {
        warn!("issue_comment delivery missing comment or issue");
        return StatusCode::NO_CONTENT;
    };
    if is_bot(&comment.user.login) {
        return StatusCode::NO_CONTENT;
    }

    let user = comment.user.login;
    info!(user = %user, issue = issue.number, "comment received");

    let reply = if comment.body.trim().starts_with('/') {
        // Admin commands are honoured for organization owners only;
        // anyone else is told to ask an owner.
        match state.admin_gate.is_org_owner(&user).await {
            Ok(true) => state.engine.handle_command(&comment.body).await,
            Ok(false) => {
                debug!(user = %user, "rejecting admin command from non-owner");
                NON_OWNER_COMMAND_REPLY.to_string()
            }
            Err(e) => {
                warn!(user = %user, error = %e, "owner check failed, dropping command");
                return StatusCode::NO_CONTENT;
            }
        }
    } else {
        let event =
            InboundEvent::new(user, comment.body).with_issue(issue.number, issue.title);
        state.engine.handle_comment(&event).await
    };

    if let Err(e) = state.commenter.post(issue.number, &reply).await {
        warn!(issue = issue.number, error = %e, "failed to deliver response");
    }
    StatusCode::OK
}

async fn handle_issue_opened(state: &AppState, payload: WebhookPayload) -> StatusCode {
    if let Some(ref repo) = payload.repository {
        if repo.full_name == state.tracked_slug {
            debug!(repo = %repo.full_name, "ignoring issue opened on the tracked repository");
            return StatusCode::NO_CONTENT;
        }
    }
    let Some(issue) = payload.issue else {
        warn!("issues delivery missing issue");
        return StatusCode::NO_CONTENT;
    };
    if issue.user.as_ref().is_some_and(|u| is_bot(&u.login)) {
        return StatusCode::NO_CONTENT;
    }

    let greeting = state.engine.greet_new_issue();
    if let Err(e) = state.commenter.post(issue.number, &greeting).await {
        warn!(issue = issue.number, error = %e, "failed to deliver greeting");
    }
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
