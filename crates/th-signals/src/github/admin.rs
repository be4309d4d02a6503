use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use super::client::GitHubClient;
use super::to_signal_error;
use crate::{RepoAdmin, Result};

#[derive(Debug, Deserialize)]
struct Member {
    login: String,
}

#[derive(Debug, Deserialize)]
struct CreatedRepo {
    name: String,
}

#[async_trait]
impl RepoAdmin for GitHubClient {
    async fn is_org_owner(&self, user: &str) -> Result<bool> {
        let members: Vec<Member> = self
            .octocrab
            .get(
                format!("/orgs/{}/members?role=admin", self.owner),
                None::<&()>,
            )
            .await
            .map_err(to_signal_error)?;
        Ok(members.iter().any(|m| m.login == user))
    }

    async fn create_user_repo(&self, user: &str) -> Result<String> {
        let name = format!("quest-{user}");
        let body = serde_json::json!({
            "name": name,
            "description": format!("Trailhead working repository for {user}"),
            "private": false,
            "auto_init": true,
            "has_issues": true,
        });
        let created: CreatedRepo = self
            .octocrab
            .post(format!("/orgs/{}/repos", self.owner), Some(&body))
            .await
            .map_err(to_signal_error)?;
        info!(repo = %created.name, user = %user, "created participant repository");
        Ok(created.name)
    }

    async fn delete_repo(&self, name: &str) -> Result<()> {
        self.octocrab
            .repos(&self.owner, name)
            .delete()
            .await
            .map_err(to_signal_error)?;
        info!(repo = %name, "deleted participant repository");
        Ok(())
    }

    async fn close_open_issues(&self, name: &str) -> Result<()> {
        let issues = self.octocrab.issues(&self.owner, name);
        let open = issues
            .list()
            .state(octocrab::params::State::Open)
            .per_page(100)
            .send()
            .await
            .map_err(to_signal_error)?;

        for issue in open.items {
            issues
                .update(issue.number)
                .state(octocrab::models::IssueState::Closed)
                .send()
                .await
                .map_err(to_signal_error)?;
        }
        info!(repo = %name, "closed open issues");
        Ok(())
    }
}
