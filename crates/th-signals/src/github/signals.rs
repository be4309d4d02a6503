use async_trait::async_trait;
use tracing::debug;

use super::client::GitHubClient;
use super::to_signal_error;
use crate::{RepoSignals, Result};

impl GitHubClient {
    async fn search_count(&self, filter: &str) -> Result<u64> {
        let query = format!("repo:{}/{} {} is:open", self.owner, self.repo, filter);
        let page = self
            .octocrab
            .search()
            .issues_and_pull_requests(&query)
            .send()
            .await
            .map_err(to_signal_error)?;
        Ok(page.total_count.unwrap_or(0))
    }

    async fn get_issue(&self, number: u64) -> Result<octocrab::models::issues::Issue> {
        self.octocrab
            .issues(&self.owner, &self.repo)
            .get(number)
            .await
            .map_err(to_signal_error)
    }
}

#[async_trait]
impl RepoSignals for GitHubClient {
    async fn issue_count(&self) -> Result<u64> {
        self.search_count("is:issue").await
    }

    async fn pull_request_count(&self) -> Result<u64> {
        self.search_count("is:pr").await
    }

    async fn open_issue_numbers(&self) -> Result<Vec<u64>> {
        let page = self
            .octocrab
            .issues(&self.owner, &self.repo)
            .list()
            .state(octocrab::params::State::Open)
            .per_page(100)
            .send()
            .await
            .map_err(to_signal_error)?;

        // The issues endpoint also returns pull requests; filter them out.
        Ok(page
            .items
            .into_iter()
            .filter(|issue| issue.pull_request.is_none())
            .map(|issue| issue.number)
            .collect())
    }

    async fn is_first_assignee(&self, user: &str, issue: u64) -> Result<bool> {
        let issue = self.get_issue(issue).await?;
        Ok(match issue.assignees.first() {
            Some(first) => first.login == user,
            None => true,
        })
    }

    async fn has_label(&self, issue: u64, label: &str) -> Result<bool> {
        let issue = self.get_issue(issue).await?;
        Ok(issue
            .labels
            .iter()
            .any(|l| l.name.eq_ignore_ascii_case(label)))
    }

    async fn issue_assignee_login(&self, issue: u64) -> Result<Option<String>> {
        let issue = self.get_issue(issue).await?;
        Ok(issue.assignee.map(|a| a.login))
    }

    async fn user_commented_on_issue(&self, issue: u64, user: &str) -> Result<bool> {
        let comments = self
            .octocrab
            .issues(&self.owner, &self.repo)
            .list_comments(issue)
            .per_page(100)
            .send()
            .await
            .map_err(to_signal_error)?;
        Ok(comments.items.iter().any(|c| c.user.login == user))
    }

    async fn user_opened_pr_with_comment(&self, user: &str) -> Result<bool> {
        let prs = self
            .octocrab
            .pulls(&self.owner, &self.repo)
            .list()
            .state(octocrab::params::State::Open)
            .per_page(100)
            .send()
            .await
            .map_err(to_signal_error)?;

        for pr in prs.items {
            let opened_by_user = pr
                .user
                .as_ref()
                .map(|u| u.login == user)
                .unwrap_or(false);
            if !opened_by_user {
                continue;
            }
            // PR conversation comments live on the issues endpoint.
            if self.user_commented_on_issue(pr.number, user).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn issue_is_closed(&self, issue: u64) -> Result<bool> {
        let issue = self.get_issue(issue).await?;
        Ok(issue.state == octocrab::models::IssueState::Closed)
    }

    async fn assign_user(&self, issue: u64, user: &str) -> Result<()> {
        debug!(issue, user = %user, "assigning user to tracked issue");
        self.octocrab
            .issues(&self.owner, &self.repo)
            .add_assignees(issue, &[user])
            .await
            .map_err(to_signal_error)?;
        Ok(())
    }
}
