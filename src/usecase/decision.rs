//! Pure decision step: given what a PR looks like now and what we remember
//! about it, say which comments to post and which state to write.

use time::{Duration, OffsetDateTime};

use super::observe::{Mergeability, Snapshot};
use crate::config::{Config, MessagesConfig};
use crate::domain::pr::PrIdentity;
use crate::domain::state::{IssueKind, PrState};

/// Nudge limits and message templates, borrowed from the loaded config.
#[derive(Debug, Clone, Copy)]
pub struct Policy<'a> {
    pub max_review_nudges: u32,
    pub cooldown: Duration,
    pub issue_nudges: bool,
    pub review_template: &'a str,
    pub messages: &'a MessagesConfig,
}

impl<'a> Policy<'a> {
    pub fn from_config(config: &'a Config) -> Self {
        let cooldown_secs = i64::try_from(config.general.review_nudge_cooldown_seconds)
            .unwrap_or(i64::MAX);
        Self {
            max_review_nudges: config.general.max_review_nudges_per_pr,
            cooldown: Duration::seconds(cooldown_secs),
            issue_nudges: config.general.issue_nudges,
            review_template: &config.general.review_nudge_message,
            messages: &config.messages,
        }
    }

    fn sign(&self, body: String) -> String {
        let signature = self.messages.signature.trim();
        if signature.is_empty() {
            body
        } else {
            format!("{body}\n\n---\n{signature}")
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueDecision {
    /// Condition newly detected: post, then set the marker.
    Nudge { kind: IssueKind, message: String },
    /// Condition went away: clear the marker without commenting.
    Clear { kind: IssueKind },
    AlreadyNotified { kind: IssueKind },
}

impl IssueDecision {
    pub fn kind(&self) -> IssueKind {
        match self {
            IssueDecision::Nudge { kind, .. }
            | IssueDecision::Clear { kind }
            | IssueDecision::AlreadyNotified { kind } => *kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewDecision {
    /// No qualifying review, or the latest one was already seen.
    Unchanged,
    SkipMax {
        review_id: u64,
        submitted_at: OffsetDateTime,
    },
    /// Seen state is left alone so the review is reconsidered after the cooldown.
    SkipCooldown { review_id: u64, remaining: Duration },
    AlreadyNudged {
        review_id: u64,
        submitted_at: OffsetDateTime,
    },
    Nudge {
        review_id: u64,
        submitted_at: OffsetDateTime,
        reviewer: String,
        message: String,
    },
}

impl ReviewDecision {
    /// Whether this decision was made about a review not seen before.
    pub fn is_new_review(&self) -> bool {
        !matches!(self, ReviewDecision::Unchanged)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrPlan {
    pub issues: Vec<IssueDecision>,
    pub review: ReviewDecision,
}

impl PrPlan {
    pub fn is_noop(&self) -> bool {
        self.review == ReviewDecision::Unchanged
            && self
                .issues
                .iter()
                .all(|d| matches!(d, IssueDecision::AlreadyNotified { .. }))
    }
}

/// Substitute `{key}` placeholders. Unknown placeholders are left verbatim.
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter().fold(template.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{key}}}"), value)
    })
}

/// `Some(present)` when the condition is known, `None` when it is not.
fn condition(snapshot: &Snapshot, kind: IssueKind) -> Option<bool> {
    match kind {
        IssueKind::FailedChecks => snapshot.failed_checks.as_ref().map(|n| !n.is_empty()),
        IssueKind::MergeConflict => match snapshot.mergeability {
            Mergeability::Conflict => Some(true),
            Mergeability::Clean => Some(false),
            Mergeability::Unknown => None,
        },
        IssueKind::ChangesRequested => Some(snapshot.changes_requested),
    }
}

fn issue_message(
    policy: &Policy<'_>,
    pr: &PrIdentity,
    kind: IssueKind,
    snapshot: &Snapshot,
) -> String {
    let pr = pr.to_string();
    let body = match kind {
        IssueKind::FailedChecks => {
            let checks = snapshot
                .failed_checks
                .as_deref()
                .unwrap_or_default()
                .join(", ");
            render_template(
                &policy.messages.failed_checks,
                &[("checks", checks.as_str()), ("pr", pr.as_str())],
            )
        }
        IssueKind::MergeConflict => {
            render_template(&policy.messages.merge_conflict, &[("pr", pr.as_str())])
        }
        IssueKind::ChangesRequested => {
            render_template(&policy.messages.changes_requested, &[("pr", pr.as_str())])
        }
    };
    policy.sign(body)
}

fn decide_issues(
    pr: &PrIdentity,
    snapshot: &Snapshot,
    state: Option<&PrState>,
    policy: &Policy<'_>,
) -> Vec<IssueDecision> {
    if !policy.issue_nudges {
        return Vec::new();
    }
    IssueKind::ALL
        .into_iter()
        .filter_map(|kind| {
            let marked = state.is_some_and(|s| s.markers.is_set(kind));
            match (condition(snapshot, kind)?, marked) {
                (true, false) => Some(IssueDecision::Nudge {
                    kind,
                    message: issue_message(policy, pr, kind, snapshot),
                }),
                (true, true) => Some(IssueDecision::AlreadyNotified { kind }),
                (false, true) => Some(IssueDecision::Clear { kind }),
                (false, false) => None,
            }
        })
        .collect()
}

/// Seen state only moves forward: a review at or before the last seen key is
/// never new, even when a later one has since dropped out of the filtered set.
fn is_newer_than_seen(key: (OffsetDateTime, u64), state: Option<&PrState>) -> bool {
    let Some(state) = state else {
        return true;
    };
    match (state.last_seen_review_submitted_at, state.last_seen_review_id) {
        (Some(seen_at), Some(seen_id)) => key > (seen_at, seen_id),
        (None, Some(seen_id)) => key.1 != seen_id,
        _ => true,
    }
}

fn decide_review(
    pr: &PrIdentity,
    snapshot: &Snapshot,
    state: Option<&PrState>,
    policy: &Policy<'_>,
    now: OffsetDateTime,
) -> ReviewDecision {
    let Some(latest) = &snapshot.latest_review else {
        return ReviewDecision::Unchanged;
    };
    if !is_newer_than_seen(latest.order_key(), state) {
        return ReviewDecision::Unchanged;
    }

    let count = state.map_or(0, |s| s.review_nudge_count);
    if count >= policy.max_review_nudges {
        return ReviewDecision::SkipMax {
            review_id: latest.id,
            submitted_at: latest.submitted_at,
        };
    }

    if policy.cooldown > Duration::ZERO {
        if let Some(last) = state.and_then(|s| s.last_nudge_at) {
            let elapsed = now - last;
            if elapsed < policy.cooldown {
                return ReviewDecision::SkipCooldown {
                    review_id: latest.id,
                    remaining: policy.cooldown - elapsed,
                };
            }
        }
    }

    if state.and_then(|s| s.last_nudged_review_id) == Some(latest.id) {
        return ReviewDecision::AlreadyNudged {
            review_id: latest.id,
            submitted_at: latest.submitted_at,
        };
    }

    let pr = pr.to_string();
    let body = render_template(
        policy.review_template,
        &[
            ("reviewer", latest.author.as_str()),
            ("state", latest.state.as_str()),
            ("pr", pr.as_str()),
        ],
    );
    ReviewDecision::Nudge {
        review_id: latest.id,
        submitted_at: latest.submitted_at,
        reviewer: latest.author.clone(),
        message: policy.sign(body),
    }
}

/// Decide what to do about one PR. `state` is `None` for a PR never seen before.
pub fn decide(
    pr: &PrIdentity,
    snapshot: &Snapshot,
    state: Option<&PrState>,
    policy: &Policy<'_>,
    now: OffsetDateTime,
) -> PrPlan {
    PrPlan {
        issues: decide_issues(pr, snapshot, state, policy),
        review: decide_review(pr, snapshot, state, policy, now),
    }
}
