use std::fmt;

use time::OffsetDateTime;

use super::pr::PrIdentity;

/// Signal kinds that nudge once per occurrence and re-arm when the condition clears.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IssueKind {
    FailedChecks,
    MergeConflict,
    ChangesRequested,
}

impl IssueKind {
    pub const ALL: [IssueKind; 3] = [
        IssueKind::FailedChecks,
        IssueKind::MergeConflict,
        IssueKind::ChangesRequested,
    ];

    /// Stable key, also the prefix of the storage column.
    pub fn as_key(self) -> &'static str {
        match self {
            IssueKind::FailedChecks => "failed_checks",
            IssueKind::MergeConflict => "merge_conflict",
            IssueKind::ChangesRequested => "changes_requested",
        }
    }
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_key())
    }
}

/// When each marker kind was last notified; `None` means clear.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IssueMarkers {
    pub failed_checks: Option<OffsetDateTime>,
    pub merge_conflict: Option<OffsetDateTime>,
    pub changes_requested: Option<OffsetDateTime>,
}

impl IssueMarkers {
    pub fn get(&self, kind: IssueKind) -> Option<OffsetDateTime> {
        match kind {
            IssueKind::FailedChecks => self.failed_checks,
            IssueKind::MergeConflict => self.merge_conflict,
            IssueKind::ChangesRequested => self.changes_requested,
        }
    }

    pub fn set(&mut self, kind: IssueKind, value: Option<OffsetDateTime>) {
        let slot = match kind {
            IssueKind::FailedChecks => &mut self.failed_checks,
            IssueKind::MergeConflict => &mut self.merge_conflict,
            IssueKind::ChangesRequested => &mut self.changes_requested,
        };
        *slot = value;
    }

    pub fn is_set(&self, kind: IssueKind) -> bool {
        self.get(kind).is_some()
    }
}

/// Durable per-PR record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrState {
    pub pr: PrIdentity,
    pub last_seen_review_id: Option<u64>,
    pub last_seen_review_submitted_at: Option<OffsetDateTime>,
    pub last_nudged_review_id: Option<u64>,
    pub last_nudge_at: Option<OffsetDateTime>,
    pub review_nudge_count: u32,
    pub markers: IssueMarkers,
    pub updated_at: OffsetDateTime,
}

impl PrState {
    pub fn new(pr: PrIdentity, now: OffsetDateTime) -> Self {
        Self {
            pr,
            last_seen_review_id: None,
            last_seen_review_submitted_at: None,
            last_nudged_review_id: None,
            last_nudge_at: None,
            review_nudge_count: 0,
            markers: IssueMarkers::default(),
            updated_at: now,
        }
    }
}
