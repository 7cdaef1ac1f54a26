//! In-process stand-in for the GitHub gateway.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use crate::domain::pr::{CheckRun, PrIdentity, PullRequestDetails, RepoName, ReviewEvent};
use crate::repo::{GatewayError, RemoteGateway};

/// Canned responses keyed by PR or repo. Anything not configured answers with
/// an empty list or default details. Posted comments are recorded.
#[derive(Default)]
pub struct FakeGateway {
    pub notifications: Vec<PrIdentity>,
    pub open_prs: HashMap<RepoName, Vec<u64>>,
    pub details: HashMap<PrIdentity, PullRequestDetails>,
    /// Keyed by head sha.
    pub checks: HashMap<String, Vec<CheckRun>>,
    pub reviews: HashMap<PrIdentity, Vec<ReviewEvent>>,
    pub current_user: Option<String>,

    pub fail_notifications: bool,
    pub failing_repos: HashSet<RepoName>,
    pub failing_details: HashSet<PrIdentity>,
    pub fail_checks: bool,
    pub fail_reviews: bool,
    pub fail_posts: bool,

    pub posted: RefCell<Vec<(PrIdentity, String)>>,
}

impl FakeGateway {
    pub fn posted_to(&self, pr: &PrIdentity) -> Vec<String> {
        self.posted
            .borrow()
            .iter()
            .filter(|(p, _)| p == pr)
            .map(|(_, body)| body.clone())
            .collect()
    }

    pub fn post_count(&self) -> usize {
        self.posted.borrow().len()
    }
}

fn injected(context: &str) -> GatewayError {
    GatewayError::remote(context, "injected failure")
}

impl RemoteGateway for FakeGateway {
    fn list_open_pull_requests(&self, repo: &RepoName) -> Result<Vec<u64>, GatewayError> {
        if self.failing_repos.contains(repo) {
            return Err(injected("list open PRs"));
        }
        Ok(self.open_prs.get(repo).cloned().unwrap_or_default())
    }

    fn list_notification_prs(
        &self,
        _participating_only: bool,
        _include_all: bool,
    ) -> Result<Vec<PrIdentity>, GatewayError> {
        if self.fail_notifications {
            return Err(injected("list notifications"));
        }
        Ok(self.notifications.clone())
    }

    fn pull_request_details(&self, pr: &PrIdentity) -> Result<PullRequestDetails, GatewayError> {
        if self.failing_details.contains(pr) {
            return Err(injected("fetch details"));
        }
        Ok(self.details.get(pr).cloned().unwrap_or_default())
    }

    fn list_check_runs(
        &self,
        _repo: &RepoName,
        head_sha: &str,
    ) -> Result<Vec<CheckRun>, GatewayError> {
        if self.fail_checks {
            return Err(injected("list check runs"));
        }
        Ok(self.checks.get(head_sha).cloned().unwrap_or_default())
    }

    fn list_review_events(
        &self,
        pr: &PrIdentity,
        _include_comments: bool,
    ) -> Result<Vec<ReviewEvent>, GatewayError> {
        if self.fail_reviews {
            return Err(injected("list reviews"));
        }
        Ok(self.reviews.get(pr).cloned().unwrap_or_default())
    }

    fn post_comment(&self, pr: &PrIdentity, body: &str) -> Result<(), GatewayError> {
        if self.fail_posts {
            return Err(injected("post comment"));
        }
        self.posted.borrow_mut().push((pr.clone(), body.to_string()));
        Ok(())
    }

    fn current_user_login(&self) -> Result<String, GatewayError> {
        self.current_user
            .clone()
            .ok_or_else(|| injected("fetch current user"))
    }
}
