use std::collections::BTreeMap;

use time::OffsetDateTime;

use super::{StateStore, StoreError};
use crate::domain::pr::PrIdentity;
use crate::domain::state::{IssueKind, PrState};

/// Process-lifetime store. State is lost on exit.
#[derive(Default)]
pub struct InMemoryStateStore {
    rows: BTreeMap<PrIdentity, PrState>,
}

impl InMemoryStateStore {
    fn row(&mut self, pr: &PrIdentity, now: OffsetDateTime) -> &mut PrState {
        let row = self
            .rows
            .entry(pr.clone())
            .or_insert_with(|| PrState::new(pr.clone(), now));
        row.updated_at = now;
        row
    }
}

impl StateStore for InMemoryStateStore {
    fn get(&self, pr: &PrIdentity) -> Result<Option<PrState>, StoreError> {
        Ok(self.rows.get(pr).cloned())
    }

    fn upsert_seen_review(
        &mut self,
        pr: &PrIdentity,
        review_id: u64,
        submitted_at: OffsetDateTime,
    ) -> Result<(), StoreError> {
        let row = self.row(pr, OffsetDateTime::now_utc());
        row.last_seen_review_id = Some(review_id);
        row.last_seen_review_submitted_at = Some(submitted_at);
        Ok(())
    }

    fn record_nudge(
        &mut self,
        pr: &PrIdentity,
        review_id: u64,
        submitted_at: OffsetDateTime,
        at: OffsetDateTime,
    ) -> Result<(), StoreError> {
        let row = self.row(pr, at);
        row.last_seen_review_id = Some(review_id);
        row.last_seen_review_submitted_at = Some(submitted_at);
        row.last_nudged_review_id = Some(review_id);
        row.last_nudge_at = Some(at);
        row.review_nudge_count = row.review_nudge_count.saturating_add(1);
        Ok(())
    }

    fn upsert_issue_marker(
        &mut self,
        pr: &PrIdentity,
        kind: IssueKind,
        present: bool,
        at: OffsetDateTime,
    ) -> Result<(), StoreError> {
        let row = self.row(pr, at);
        row.markers.set(kind, present.then_some(at));
        Ok(())
    }

    fn list(&self) -> Result<Vec<PrState>, StoreError> {
        Ok(self.rows.values().cloned().collect())
    }

    fn reset_review_counter(&mut self, pr: &PrIdentity) -> Result<bool, StoreError> {
        match self.rows.get_mut(pr) {
            Some(row) => {
                row.review_nudge_count = 0;
                row.updated_at = OffsetDateTime::now_utc();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
