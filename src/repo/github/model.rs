//! Wire shapes of the GitHub responses this crate consumes, and their
//! validation into domain types. Nothing outside this module sees raw JSON.

use tracing::debug;

use super::timeutil::parse_github_datetime;
use crate::domain::pr::{
    CheckRun, EventSource, PrIdentity, PullRequestDetails, RepoName, ReviewEvent,
};

#[derive(Debug, serde::Deserialize)]
pub struct PullSummary {
    pub number: u64,
}

#[derive(Debug, serde::Deserialize)]
pub struct NotificationThread {
    pub subject: NotificationSubject,
}

#[derive(Debug, serde::Deserialize)]
pub struct NotificationSubject {
    #[serde(rename = "type")]
    pub kind: String,
    pub url: Option<String>,
}

impl NotificationThread {
    pub fn into_pr(self) -> Option<PrIdentity> {
        if self.subject.kind != "PullRequest" {
            return None;
        }
        parse_pr_api_url(self.subject.url.as_deref()?)
    }
}

/// `https://api.github.com/repos/{owner}/{name}/pulls/{n}` → PR identity.
/// Works for enterprise hosts too, since only the path after `/repos/` matters.
pub fn parse_pr_api_url(url: &str) -> Option<PrIdentity> {
    let (_, path) = url.trim().split_once("/repos/")?;
    let mut parts = path.split('/');
    let owner = parts.next()?;
    let name = parts.next()?;
    if parts.next()? != "pulls" {
        return None;
    }
    let number: u64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || number == 0 {
        return None;
    }
    let repo: RepoName = format!("{owner}/{name}").parse().ok()?;
    Some(PrIdentity::new(repo, number))
}

#[derive(Debug, serde::Deserialize)]
pub struct CheckRunsPage {
    pub check_runs: Vec<CheckRunNode>,
}

#[derive(Debug, serde::Deserialize)]
pub struct CheckRunNode {
    pub name: String,
    pub status: String,
    pub conclusion: Option<String>,
}

impl From<CheckRunNode> for CheckRun {
    fn from(node: CheckRunNode) -> Self {
        CheckRun {
            name: node.name,
            status: node.status,
            conclusion: node.conclusion,
        }
    }
}

#[derive(Debug, serde::Deserialize)]
pub struct UserNode {
    pub login: String,
}

#[derive(Debug, serde::Deserialize)]
pub struct ReviewNode {
    pub id: u64,
    pub state: String,
    /// Null for pending reviews.
    pub submitted_at: Option<String>,
    /// Null for deleted ("ghost") accounts.
    pub user: Option<UserNode>,
    pub body: Option<String>,
}

impl ReviewNode {
    pub fn into_event(self) -> Option<ReviewEvent> {
        let state = self.state.trim().to_ascii_uppercase();
        let Some(submitted_at) = self.submitted_at.as_deref().and_then(parse_github_datetime)
        else {
            debug!(review_id = self.id, %state, "dropping review without submission time");
            return None;
        };
        let author = self.user.map(|u| u.login.trim().to_string())?;
        if state.is_empty() || author.is_empty() {
            return None;
        }
        Some(ReviewEvent {
            id: self.id,
            submitted_at,
            state,
            author,
            body: self.body.unwrap_or_default(),
            source: EventSource::Review,
        })
    }
}

#[derive(Debug, serde::Deserialize)]
pub struct IssueCommentNode {
    pub id: u64,
    pub created_at: String,
    pub user: Option<UserNode>,
    pub body: Option<String>,
}

impl IssueCommentNode {
    pub fn into_event(self) -> Option<ReviewEvent> {
        let submitted_at = parse_github_datetime(&self.created_at)?;
        let author = self.user.map(|u| u.login.trim().to_string())?;
        if author.is_empty() {
            return None;
        }
        Some(ReviewEvent {
            id: self.id,
            submitted_at,
            state: "COMMENTED".to_string(),
            author,
            body: self.body.unwrap_or_default(),
            source: EventSource::Comment,
        })
    }
}

#[derive(Debug, serde::Deserialize)]
pub struct DetailsData {
    pub repository: Option<DetailsRepository>,
}

#[derive(Debug, serde::Deserialize)]
pub struct DetailsRepository {
    #[serde(rename = "pullRequest")]
    pub pull_request: Option<DetailsPullRequest>,
}

#[derive(Debug, serde::Deserialize)]
pub struct DetailsPullRequest {
    /// `MERGEABLE` | `CONFLICTING` | `UNKNOWN`
    pub mergeable: Option<String>,
    /// e.g. `CLEAN` | `DIRTY` | `BLOCKED` | `BEHIND` | `UNKNOWN`
    #[serde(rename = "mergeStateStatus")]
    pub merge_state_status: Option<String>,
    #[serde(rename = "reviewDecision")]
    pub review_decision: Option<String>,
    #[serde(rename = "headRefOid")]
    pub head_ref_oid: String,
}

impl From<DetailsPullRequest> for PullRequestDetails {
    fn from(node: DetailsPullRequest) -> Self {
        let mergeable = match node.mergeable.as_deref() {
            Some(s) if s.eq_ignore_ascii_case("MERGEABLE") => Some(true),
            Some(s) if s.eq_ignore_ascii_case("CONFLICTING") => Some(false),
            _ => None,
        };
        PullRequestDetails {
            mergeable,
            mergeable_state: node
                .merge_state_status
                .unwrap_or_default()
                .to_ascii_lowercase(),
            review_decision: node.review_decision.unwrap_or_default(),
            head_sha: node.head_ref_oid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pull_request_api_urls() {
        let pr = parse_pr_api_url("https://api.github.com/repos/org/repo/pulls/5").unwrap();
        assert_eq!(pr.to_string(), "org/repo#5");

        let ghe = parse_pr_api_url("https://ghe.example.com/api/v3/repos/org/repo/pulls/12");
        assert_eq!(ghe.unwrap().to_string(), "org/repo#12");

        assert!(parse_pr_api_url("https://api.github.com/repos/org/repo/issues/5").is_none());
        assert!(parse_pr_api_url("https://api.github.com/repos/org/repo/pulls/5/files").is_none());
        assert!(parse_pr_api_url("https://api.github.com/repos/org/repo/pulls/abc").is_none());
    }

    #[test]
    fn non_pr_notifications_are_dropped() {
        let threads: Vec<NotificationThread> = serde_json::from_str(
            r#"[
              {"subject": {"type": "Issue", "url": "https://api.github.com/repos/org/repo/issues/1"}},
              {"subject": {"type": "PullRequest", "url": "https://api.github.com/repos/org/repo/pulls/2"}},
              {"subject": {"type": "PullRequest", "url": null}}
            ]"#,
        )
        .unwrap();
        let prs: Vec<String> = threads
            .into_iter()
            .filter_map(NotificationThread::into_pr)
            .map(|p| p.to_string())
            .collect();
        assert_eq!(prs, ["org/repo#2"]);
    }

    #[test]
    fn pending_and_ghost_reviews_are_dropped() {
        let nodes: Vec<ReviewNode> = serde_json::from_str(
            r#"[
              {"id": 1, "state": "pending", "submitted_at": null, "user": {"login": "a"}, "body": ""},
              {"id": 2, "state": "APPROVED", "submitted_at": "2026-01-05T12:00:00Z", "user": null, "body": ""},
              {"id": 3, "state": "changes_requested", "submitted_at": "2026-01-05T12:00:00Z", "user": {"login": "bob"}, "body": null}
            ]"#,
        )
        .unwrap();
        let events: Vec<ReviewEvent> = nodes.into_iter().filter_map(ReviewNode::into_event).collect();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, 3);
        assert_eq!(events[0].state, "CHANGES_REQUESTED");
        assert_eq!(events[0].author, "bob");
        assert_eq!(events[0].source, EventSource::Review);
    }

    #[test]
    fn details_map_mergeability_tristate() {
        let decode = |mergeable: &str| -> PullRequestDetails {
            let json = format!(
                r#"{{"mergeable": {mergeable}, "mergeStateStatus": "DIRTY", "reviewDecision": null, "headRefOid": "abc"}}"#
            );
            serde_json::from_str::<DetailsPullRequest>(&json).unwrap().into()
        };
        assert_eq!(decode(r#""CONFLICTING""#).mergeable, Some(false));
        assert_eq!(decode(r#""MERGEABLE""#).mergeable, Some(true));
        assert_eq!(decode(r#""UNKNOWN""#).mergeable, None);
        let d = decode("null");
        assert_eq!(d.mergeable, None);
        assert_eq!(d.mergeable_state, "dirty");
        assert_eq!(d.review_decision, "");
        assert_eq!(d.head_sha, "abc");
    }
}
