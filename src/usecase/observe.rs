use std::cmp::Ordering;

use tracing::{debug, warn};

use super::classify::ReviewClassifier;
use crate::config::Config;
use crate::domain::pr::{CheckRun, PrIdentity, PullRequestDetails, ReviewEvent, Signal};
use crate::repo::{GatewayError, RemoteGateway};

const FAILED_CONCLUSIONS: [&str; 4] = ["failure", "cancelled", "timed_out", "action_required"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mergeability {
    Conflict,
    Clean,
    /// Not computed yet by the platform; never treated as a conflict.
    Unknown,
}

/// Current signals of one PR.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Names of failed checks; `None` when check runs could not be read.
    pub failed_checks: Option<Vec<String>>,
    pub mergeability: Mergeability,
    pub changes_requested: bool,
    /// Latest qualifying review, if any could be read.
    pub latest_review: Option<ReviewEvent>,
}

impl Snapshot {
    pub fn empty() -> Self {
        Self {
            failed_checks: Some(Vec::new()),
            mergeability: Mergeability::Unknown,
            changes_requested: false,
            latest_review: None,
        }
    }

    /// Active signals, for logging.
    pub fn signals(&self) -> Vec<Signal> {
        let mut out = Vec::new();
        if let Some(names) = self.failed_checks.as_ref().filter(|n| !n.is_empty()) {
            out.push(Signal::FailedChecks {
                names: names.clone(),
            });
        }
        if self.mergeability == Mergeability::Conflict {
            out.push(Signal::MergeConflict);
        }
        if self.changes_requested {
            out.push(Signal::ChangesRequested);
        }
        if let Some(review) = &self.latest_review {
            out.push(Signal::from(review));
        }
        out
    }
}

/// Names of completed checks with an unsuccessful conclusion, first occurrence wins.
pub fn failed_check_names(checks: &[CheckRun]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for check in checks {
        let completed = check.status.eq_ignore_ascii_case("completed");
        let failed = check.conclusion.as_deref().is_some_and(|c| {
            FAILED_CONCLUSIONS
                .iter()
                .any(|f| c.trim().eq_ignore_ascii_case(f))
        });
        if completed && failed && !names.contains(&check.name) {
            names.push(check.name.clone());
        }
    }
    names
}

pub fn mergeability(details: &PullRequestDetails) -> Mergeability {
    let dirty = details.mergeable_state.eq_ignore_ascii_case("dirty");
    match details.mergeable {
        Some(false) => Mergeability::Conflict,
        _ if dirty => Mergeability::Conflict,
        Some(true) => Mergeability::Clean,
        None => Mergeability::Unknown,
    }
}

pub fn is_changes_requested(details: &PullRequestDetails) -> bool {
    details
        .review_decision
        .trim()
        .eq_ignore_ascii_case("CHANGES_REQUESTED")
}

/// Latest review by `(submitted_at, id)` among events that survive the ignored
/// states and the classifier.
pub fn select_latest_review(
    events: Vec<ReviewEvent>,
    config: &Config,
    classifier: &dyn ReviewClassifier,
    current_user: Option<&str>,
) -> Option<ReviewEvent> {
    let mut latest: Option<ReviewEvent> = None;
    for event in events {
        if config.is_ignored_state(&event.state) {
            continue;
        }
        let class = classifier.classify(&event, current_user);
        if class.is_self_excluded || !class.is_qualifying_review {
            continue;
        }
        let ordering = latest
            .as_ref()
            .map(|cur| event.order_key().cmp(&cur.order_key()));
        match ordering {
            None | Some(Ordering::Greater) => latest = Some(event),
            Some(Ordering::Equal) => {
                warn!(
                    review_id = event.id,
                    submitted_at = %event.submitted_at,
                    "two reviews share the same timestamp and id; keeping the first"
                );
            }
            Some(Ordering::Less) => {}
        }
    }
    latest
}

/// Read the current signals of `pr`. Fails only when the PR itself cannot be read;
/// check-run and review failures degrade to "no information" for that signal.
pub fn observe(
    gateway: &dyn RemoteGateway,
    pr: &PrIdentity,
    config: &Config,
    classifier: &dyn ReviewClassifier,
    current_user: Option<&str>,
) -> Result<Snapshot, GatewayError> {
    let mut snapshot = Snapshot::empty();

    if config.general.issue_nudges {
        let details = gateway.pull_request_details(pr)?;
        snapshot.mergeability = mergeability(&details);
        snapshot.changes_requested = is_changes_requested(&details);
        snapshot.failed_checks = if details.head_sha.is_empty() {
            Some(Vec::new())
        } else {
            match gateway.list_check_runs(&pr.repo, &details.head_sha) {
                Ok(checks) => Some(failed_check_names(&checks)),
                Err(e) => {
                    warn!(%pr, error = %e, "unable to read check runs; leaving failed-checks state as is");
                    None
                }
            }
        };
    }

    match gateway.list_review_events(pr, config.general.include_comment_reviews) {
        Ok(events) => {
            snapshot.latest_review =
                select_latest_review(events, config, classifier, current_user);
        }
        Err(e) => warn!(%pr, error = %e, "unable to read reviews; skipping review feedback"),
    }

    let signals: Vec<String> = snapshot.signals().iter().map(ToString::to_string).collect();
    debug!(%pr, ?signals, mergeability = ?snapshot.mergeability, "observed");
    Ok(snapshot)
}
