use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("repository `{0}` is not of the form owner/name")]
    BadRepo(String),
    #[error("pull request `{0}` is not of the form owner/name#number")]
    BadPr(String),
}

/// Repository slug, always `owner/name`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepoName(String);

impl RepoName {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn owner(&self) -> &str {
        self.0.split_once('/').map(|(o, _)| o).unwrap_or_default()
    }

    pub fn name(&self) -> &str {
        self.0.split_once('/').map(|(_, n)| n).unwrap_or_default()
    }
}

impl FromStr for RepoName {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let bad = || IdentityError::BadRepo(s.to_string());
        let (owner, name) = trimmed.split_once('/').ok_or_else(bad)?;
        if owner.is_empty()
            || name.is_empty()
            || name.contains('/')
            || trimmed.chars().any(char::is_whitespace)
        {
            return Err(bad());
        }
        Ok(Self(trimmed.to_string()))
    }
}

impl TryFrom<String> for RepoName {
    type Error = IdentityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RepoName> for String {
    fn from(value: RepoName) -> Self {
        value.0
    }
}

impl fmt::Display for RepoName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of one pull request. Ordering is `(repository, number)`, which is
/// the iteration order of a cycle.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PrIdentity {
    pub repo: RepoName,
    pub number: u64,
}

impl PrIdentity {
    pub fn new(repo: RepoName, number: u64) -> Self {
        Self { repo, number }
    }
}

impl fmt::Display for PrIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.repo, self.number)
    }
}

impl FromStr for PrIdentity {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || IdentityError::BadPr(s.to_string());
        let (repo, number) = s.trim().rsplit_once('#').ok_or_else(bad)?;
        let repo: RepoName = repo.parse().map_err(|_| bad())?;
        let number: u64 = number.parse().map_err(|_| bad())?;
        if number == 0 {
            return Err(bad());
        }
        Ok(Self { repo, number })
    }
}

/// Mergeability and review decision for one PR, as reported by the platform.
#[derive(Debug, Clone, Default)]
pub struct PullRequestDetails {
    /// `None` while the platform is still computing it.
    pub mergeable: Option<bool>,
    pub mergeable_state: String,
    pub review_decision: String,
    pub head_sha: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckRun {
    pub name: String,
    pub status: String,
    pub conclusion: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSource {
    /// A structured pull request review.
    Review,
    /// A free-text issue comment that may or may not be a review.
    Comment,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewEvent {
    pub id: u64,
    pub submitted_at: OffsetDateTime,
    /// Upper-cased review state; comments carry `COMMENTED`.
    pub state: String,
    pub author: String,
    pub body: String,
    pub source: EventSource,
}

impl ReviewEvent {
    /// Total order used to pick the latest review: timestamp, then id.
    pub fn order_key(&self) -> (OffsetDateTime, u64) {
        (self.submitted_at, self.id)
    }
}

/// A condition on a PR the engine can react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    FailedChecks { names: Vec<String> },
    MergeConflict,
    ChangesRequested,
    ReviewPosted {
        review_id: u64,
        submitted_at: OffsetDateTime,
        author: String,
        state: String,
    },
}

impl From<&ReviewEvent> for Signal {
    fn from(review: &ReviewEvent) -> Self {
        Signal::ReviewPosted {
            review_id: review.id,
            submitted_at: review.submitted_at,
            author: review.author.clone(),
            state: review.state.clone(),
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::FailedChecks { names } => write!(f, "failed checks ({})", names.join(", ")),
            Signal::MergeConflict => f.write_str("merge conflict"),
            Signal::ChangesRequested => f.write_str("changes requested"),
            Signal::ReviewPosted {
                review_id,
                submitted_at,
                author,
                state,
            } => write!(f, "review {review_id} by {author} ({state}) at {submitted_at}"),
        }
    }
}
