use std::fmt;

/// Counters for one orchestration pass. Reported, never persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleResult {
    pub considered_prs: u32,
    pub new_reviews_observed: u32,
    /// Every nudge posted this cycle, review and issue kinds alike.
    pub nudges_sent: u32,
    /// Subset of `nudges_sent` caused by failed checks, conflicts or requested changes.
    pub issue_nudges_sent: u32,
    pub nudges_skipped_due_to_max: u32,
    pub nudges_skipped_due_to_cooldown: u32,
    pub prs_failed: u32,
}

impl fmt::Display for CycleResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "considered_prs={} new_reviews={} nudges_sent={} issue_nudges_sent={} skipped_max={} skipped_cooldown={} prs_failed={}",
            self.considered_prs,
            self.new_reviews_observed,
            self.nudges_sent,
            self.issue_nudges_sent,
            self.nudges_skipped_due_to_max,
            self.nudges_skipped_due_to_cooldown,
            self.prs_failed,
        )
    }
}
