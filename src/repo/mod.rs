use thiserror::Error;
use time::OffsetDateTime;

use crate::domain::pr::{CheckRun, PrIdentity, PullRequestDetails, RepoName, ReviewEvent};
use crate::domain::state::{IssueKind, PrState};

pub mod github;
pub mod memory;
pub mod sqlite;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state store {operation} failed: {source}")]
    Sqlite {
        operation: &'static str,
        #[source]
        source: rusqlite::Error,
    },
    #[error("failed to prepare state directory {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    pub(crate) fn sqlite(operation: &'static str) -> impl FnOnce(rusqlite::Error) -> Self {
        move |source| StoreError::Sqlite { operation, source }
    }
}

/// Durable per-PR state. Every write touches exactly one row and is atomic.
pub trait StateStore {
    fn get(&self, pr: &PrIdentity) -> Result<Option<PrState>, StoreError>;

    /// Advance the last observed review without nudging.
    fn upsert_seen_review(
        &mut self,
        pr: &PrIdentity,
        review_id: u64,
        submitted_at: OffsetDateTime,
    ) -> Result<(), StoreError>;

    /// Record a posted review nudge: advances the seen review, stamps the
    /// nudge time and increments the counter in one write.
    fn record_nudge(
        &mut self,
        pr: &PrIdentity,
        review_id: u64,
        submitted_at: OffsetDateTime,
        at: OffsetDateTime,
    ) -> Result<(), StoreError>;

    fn upsert_issue_marker(
        &mut self,
        pr: &PrIdentity,
        kind: IssueKind,
        present: bool,
        at: OffsetDateTime,
    ) -> Result<(), StoreError>;

    /// All rows, ordered by `(repository, number)`.
    fn list(&self) -> Result<Vec<PrState>, StoreError>;

    /// Operator reset of the review counter. Returns false when no row exists.
    fn reset_review_counter(&mut self, pr: &PrIdentity) -> Result<bool, StoreError>;
}

impl<S: StateStore + ?Sized> StateStore for Box<S> {
    fn get(&self, pr: &PrIdentity) -> Result<Option<PrState>, StoreError> {
        (**self).get(pr)
    }

    fn upsert_seen_review(
        &mut self,
        pr: &PrIdentity,
        review_id: u64,
        submitted_at: OffsetDateTime,
    ) -> Result<(), StoreError> {
        (**self).upsert_seen_review(pr, review_id, submitted_at)
    }

    fn record_nudge(
        &mut self,
        pr: &PrIdentity,
        review_id: u64,
        submitted_at: OffsetDateTime,
        at: OffsetDateTime,
    ) -> Result<(), StoreError> {
        (**self).record_nudge(pr, review_id, submitted_at, at)
    }

    fn upsert_issue_marker(
        &mut self,
        pr: &PrIdentity,
        kind: IssueKind,
        present: bool,
        at: OffsetDateTime,
    ) -> Result<(), StoreError> {
        (**self).upsert_issue_marker(pr, kind, present, at)
    }

    fn list(&self) -> Result<Vec<PrState>, StoreError> {
        (**self).list()
    }

    fn reset_review_counter(&mut self, pr: &PrIdentity) -> Result<bool, StoreError> {
        (**self).reset_review_counter(pr)
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Network or API failure; may succeed on the next cycle.
    #[error("{context}: {message}")]
    Remote { context: String, message: String },
    /// The response did not have the expected shape.
    #[error("{context}: unexpected response shape: {message}")]
    DataShape { context: String, message: String },
}

impl GatewayError {
    pub fn remote(context: impl Into<String>, message: impl ToString) -> Self {
        GatewayError::Remote {
            context: context.into(),
            message: message.to_string(),
        }
    }

    pub fn data_shape(context: impl Into<String>, message: impl ToString) -> Self {
        GatewayError::DataShape {
            context: context.into(),
            message: message.to_string(),
        }
    }
}

/// Everything the engine needs from the code-hosting platform.
pub trait RemoteGateway {
    fn list_open_pull_requests(&self, repo: &RepoName) -> Result<Vec<u64>, GatewayError>;

    fn list_notification_prs(
        &self,
        participating_only: bool,
        include_all: bool,
    ) -> Result<Vec<PrIdentity>, GatewayError>;

    fn pull_request_details(&self, pr: &PrIdentity) -> Result<PullRequestDetails, GatewayError>;

    fn list_check_runs(
        &self,
        repo: &RepoName,
        head_sha: &str,
    ) -> Result<Vec<CheckRun>, GatewayError>;

    fn list_review_events(
        &self,
        pr: &PrIdentity,
        include_comments: bool,
    ) -> Result<Vec<ReviewEvent>, GatewayError>;

    fn post_comment(&self, pr: &PrIdentity, body: &str) -> Result<(), GatewayError>;

    fn current_user_login(&self) -> Result<String, GatewayError>;
}
