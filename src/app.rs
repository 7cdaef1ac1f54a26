use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use time::OffsetDateTime;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::domain::cycle::CycleResult;
use crate::domain::pr::PrIdentity;
use crate::repo::{GatewayError, RemoteGateway, StateStore, StoreError};
use crate::usecase::classify::{HeuristicClassifier, ReviewClassifier};
use crate::usecase::decision::{IssueDecision, Policy, ReviewDecision, decide};
use crate::usecase::discovery::discover;
use crate::usecase::observe::observe;

#[derive(Debug, Error)]
enum PrError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Latched stop request. Set from the signal task, read between cycles.
#[derive(Debug, Default)]
pub struct Shutdown {
    requested: AtomicBool,
    notify: Notify,
}

impl Shutdown {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn trigger(&self) {
        self.requested.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    pub fn is_triggered(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

pub struct App<'a, S: StateStore, G: RemoteGateway> {
    store: S,
    gateway: G,
    config: &'a Config,
    classifier: Box<dyn ReviewClassifier>,
    current_user: Option<String>,
    dry_run: bool,
}

impl<'a, S: StateStore, G: RemoteGateway> App<'a, S, G> {
    pub fn new(store: S, gateway: G, config: &'a Config, dry_run: bool) -> Self {
        let current_user = if config.general.ignore_self_reviews {
            match gateway.current_user_login() {
                Ok(login) => {
                    debug!(%login, "resolved current user");
                    Some(login)
                }
                Err(e) => {
                    warn!(error = %e, "unable to resolve current user; self reviews will not be filtered");
                    None
                }
            }
        } else {
            None
        };
        Self {
            store,
            gateway,
            config,
            classifier: Box::new(HeuristicClassifier::from_config(config)),
            current_user,
            dry_run,
        }
    }

    /// One pass over every candidate PR. Failures are contained per PR.
    pub fn run_cycle(&mut self, now: OffsetDateTime) -> CycleResult {
        let mut result = CycleResult::default();
        for pr in discover(&self.gateway, self.config) {
            result.considered_prs += 1;
            match self.process(&pr, now, &mut result) {
                Ok(()) => {}
                Err(PrError::Gateway(e)) => {
                    warn!(%pr, error = %e, "skipping pull request this cycle");
                    result.prs_failed += 1;
                }
                Err(PrError::Store(e)) => {
                    error!(%pr, error = %e, "state write failed");
                    result.prs_failed += 1;
                }
            }
        }
        info!(dry_run = self.dry_run, "cycle finished: {result}");
        result
    }

    /// Run cycles until `shutdown` fires. A running cycle always completes.
    /// Returns the number of cycles run.
    pub fn run_daemon(
        &mut self,
        rt: &Handle,
        interval: std::time::Duration,
        shutdown: &Shutdown,
    ) -> u64 {
        let mut cycles = 0;
        loop {
            self.run_cycle(OffsetDateTime::now_utc());
            cycles += 1;
            if shutdown.is_triggered() {
                break;
            }
            debug!(seconds = interval.as_secs(), "sleeping until next cycle");
            rt.block_on(async {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = shutdown.notify.notified() => {}
                }
            });
            if shutdown.is_triggered() {
                break;
            }
        }
        info!(cycles, "shutting down");
        cycles
    }

    fn process(
        &mut self,
        pr: &PrIdentity,
        now: OffsetDateTime,
        result: &mut CycleResult,
    ) -> Result<(), PrError> {
        let snapshot = observe(
            &self.gateway,
            pr,
            self.config,
            self.classifier.as_ref(),
            self.current_user.as_deref(),
        )?;
        let state = self.store.get(pr)?;
        let plan = decide(
            pr,
            &snapshot,
            state.as_ref(),
            &Policy::from_config(self.config),
            now,
        );
        if plan.is_noop() {
            debug!(%pr, "nothing to do");
        }

        for issue in &plan.issues {
            self.apply_issue(pr, issue, now, result)?;
        }
        self.apply_review(pr, &plan.review, now, result)
    }

    fn apply_issue(
        &mut self,
        pr: &PrIdentity,
        issue: &IssueDecision,
        now: OffsetDateTime,
        result: &mut CycleResult,
    ) -> Result<(), PrError> {
        let kind = issue.kind();
        match issue {
            IssueDecision::Nudge { message, .. } => {
                info!(%pr, %kind, dry_run = self.dry_run, "nudging");
                if !self.dry_run {
                    self.gateway.post_comment(pr, message)?;
                }
                result.nudges_sent += 1;
                result.issue_nudges_sent += 1;
                if !self.dry_run {
                    self.store.upsert_issue_marker(pr, kind, true, now)?;
                }
            }
            IssueDecision::Clear { .. } => {
                info!(%pr, %kind, "condition cleared");
                if !self.dry_run {
                    self.store.upsert_issue_marker(pr, kind, false, now)?;
                }
            }
            IssueDecision::AlreadyNotified { .. } => {
                debug!(%pr, %kind, "already notified");
            }
        }
        Ok(())
    }

    fn apply_review(
        &mut self,
        pr: &PrIdentity,
        review: &ReviewDecision,
        now: OffsetDateTime,
        result: &mut CycleResult,
    ) -> Result<(), PrError> {
        if review.is_new_review() {
            result.new_reviews_observed += 1;
        }
        match review {
            ReviewDecision::Unchanged => {}
            ReviewDecision::SkipMax {
                review_id,
                submitted_at,
            } => {
                info!(%pr, review_id, max = self.config.general.max_review_nudges_per_pr, "review nudge limit reached");
                result.nudges_skipped_due_to_max += 1;
                if !self.dry_run {
                    self.store.upsert_seen_review(pr, *review_id, *submitted_at)?;
                }
            }
            ReviewDecision::SkipCooldown {
                review_id,
                remaining,
            } => {
                info!(%pr, review_id, remaining_seconds = remaining.whole_seconds(), "review nudge in cooldown");
                result.nudges_skipped_due_to_cooldown += 1;
            }
            ReviewDecision::AlreadyNudged {
                review_id,
                submitted_at,
            } => {
                info!(%pr, review_id, "review already nudged");
                if !self.dry_run {
                    self.store.upsert_seen_review(pr, *review_id, *submitted_at)?;
                }
            }
            ReviewDecision::Nudge {
                review_id,
                submitted_at,
                reviewer,
                message,
            } => {
                info!(%pr, review_id, %reviewer, dry_run = self.dry_run, "nudging for review");
                if !self.dry_run {
                    self.gateway.post_comment(pr, message)?;
                }
                result.nudges_sent += 1;
                if !self.dry_run {
                    self.store
                        .record_nudge(pr, *review_id, *submitted_at, now)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::pr::{CheckRun, EventSource, PullRequestDetails, ReviewEvent};
    use crate::repo::memory::InMemoryStateStore;
    use crate::test_utils::FakeGateway;
    use time::Duration;
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2026-01-05 12:00 UTC);

    fn pr(s: &str) -> PrIdentity {
        s.parse().unwrap()
    }

    fn config_for(repo: &str) -> Config {
        let mut config = Config::default();
        config.general.use_notifications = false;
        config.general.repos = vec![repo.parse().unwrap()];
        config
    }

    fn gateway_with(prs: &[&str]) -> FakeGateway {
        let mut gateway = FakeGateway::default();
        gateway.current_user = Some("alice".to_string());
        for p in prs {
            let p = pr(p);
            gateway
                .open_prs
                .entry(p.repo.clone())
                .or_default()
                .push(p.number);
        }
        gateway
    }

    fn review(id: u64, author: &str) -> ReviewEvent {
        ReviewEvent {
            id,
            submitted_at: NOW - Duration::hours(1) + Duration::seconds(id as i64),
            state: "COMMENTED".to_string(),
            author: author.to_string(),
            body: String::new(),
            source: EventSource::Review,
        }
    }

    fn details(mergeable: Option<bool>, head_sha: &str) -> PullRequestDetails {
        PullRequestDetails {
            mergeable,
            head_sha: head_sha.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn failed_check_is_reported_once() {
        let config = config_for("org/app");
        let target = pr("org/app#1");
        let mut gateway = gateway_with(&["org/app#1"]);
        gateway.details.insert(target.clone(), details(Some(true), "abc"));
        gateway.checks.insert(
            "abc".to_string(),
            vec![CheckRun {
                name: "ci".to_string(),
                status: "completed".to_string(),
                conclusion: Some("failure".to_string()),
            }],
        );
        let mut app = App::new(InMemoryStateStore::default(), gateway, &config, false);

        let first = app.run_cycle(NOW);
        assert_eq!(first.nudges_sent, 1);
        assert_eq!(first.issue_nudges_sent, 1);
        let posted = app.gateway.posted_to(&target);
        assert_eq!(posted.len(), 1);
        assert!(posted[0].contains("Failed checks: ci"));

        let second = app.run_cycle(NOW + Duration::minutes(5));
        assert_eq!(second.nudges_sent, 0);
        assert_eq!(app.gateway.post_count(), 1);
    }

    #[test]
    fn merge_conflict_renudges_after_resolution() {
        let config = config_for("org/app");
        let target = pr("org/app#2");
        let mut gateway = gateway_with(&["org/app#2"]);
        gateway.details.insert(target.clone(), details(Some(false), ""));
        let mut app = App::new(InMemoryStateStore::default(), gateway, &config, false);

        app.run_cycle(NOW);
        assert_eq!(app.gateway.post_count(), 1);

        app.gateway.details.insert(target.clone(), details(Some(true), ""));
        app.run_cycle(NOW);
        assert_eq!(app.gateway.post_count(), 1);
        let state = app.store.get(&target).unwrap().unwrap();
        assert!(state.markers.merge_conflict.is_none());

        app.gateway.details.insert(target.clone(), details(Some(false), ""));
        app.run_cycle(NOW);
        assert_eq!(app.gateway.post_count(), 2);
    }

    #[test]
    fn self_review_is_ignored() {
        let config = config_for("org/app");
        let target = pr("org/app#3");
        let mut gateway = gateway_with(&["org/app#3"]);
        gateway.reviews.insert(target.clone(), vec![review(10, "alice")]);
        let mut app = App::new(InMemoryStateStore::default(), gateway, &config, false);

        let result = app.run_cycle(NOW);
        assert_eq!(result.new_reviews_observed, 0);
        assert_eq!(app.gateway.post_count(), 0);
    }

    #[test]
    fn same_review_nudges_once_across_cycles() {
        let mut config = config_for("org/app");
        config.general.review_nudge_message = "review from {reviewer}".to_string();
        let target = pr("org/app#4");
        let mut gateway = gateway_with(&["org/app#4"]);
        gateway.reviews.insert(target.clone(), vec![review(10, "bob")]);
        let mut app = App::new(InMemoryStateStore::default(), gateway, &config, false);

        let first = app.run_cycle(NOW);
        assert_eq!(first.new_reviews_observed, 1);
        assert_eq!(first.nudges_sent, 1);
        assert_eq!(app.gateway.posted_to(&target), ["review from bob"]);

        let second = app.run_cycle(NOW + Duration::minutes(5));
        assert_eq!(second.new_reviews_observed, 0);
        assert_eq!(second.nudges_sent, 0);

        let state = app.store.get(&target).unwrap().unwrap();
        assert_eq!(state.review_nudge_count, 1);
        assert_eq!(state.last_seen_review_id, Some(10));
        assert_eq!(state.last_nudge_at, Some(NOW));
    }

    #[test]
    fn dismissed_latest_review_does_not_renudge_older_one() {
        let config = config_for("org/app");
        let target = pr("org/app#10");
        let mut gateway = gateway_with(&["org/app#10"]);
        let older = ReviewEvent {
            submitted_at: NOW - Duration::minutes(30),
            ..review(10, "bob")
        };
        let newer = ReviewEvent {
            submitted_at: NOW - Duration::minutes(10),
            ..review(11, "carol")
        };
        gateway
            .reviews
            .insert(target.clone(), vec![older.clone(), newer.clone()]);
        let mut app = App::new(InMemoryStateStore::default(), gateway, &config, false);

        assert_eq!(app.run_cycle(NOW).nudges_sent, 1);

        let dismissed = ReviewEvent {
            state: "DISMISSED".to_string(),
            ..newer
        };
        app.gateway.reviews.insert(target.clone(), vec![older, dismissed]);
        let second = app.run_cycle(NOW + Duration::minutes(5));
        assert_eq!(second.new_reviews_observed, 0);
        assert_eq!(second.nudges_sent, 0);
        assert_eq!(app.gateway.post_count(), 1);

        let state = app.store.get(&target).unwrap().unwrap();
        assert_eq!(state.last_seen_review_id, Some(11));
        assert_eq!(state.review_nudge_count, 1);
    }

    #[test]
    fn unreadable_checks_keep_failed_checks_marker() {
        let config = config_for("org/app");
        let target = pr("org/app#11");
        let mut gateway = gateway_with(&["org/app#11"]);
        gateway.details.insert(target.clone(), details(Some(true), "abc"));
        gateway.checks.insert(
            "abc".to_string(),
            vec![CheckRun {
                name: "ci".to_string(),
                status: "completed".to_string(),
                conclusion: Some("failure".to_string()),
            }],
        );
        let mut app = App::new(InMemoryStateStore::default(), gateway, &config, false);
        app.run_cycle(NOW);
        assert_eq!(app.gateway.post_count(), 1);

        app.gateway.fail_checks = true;
        let result = app.run_cycle(NOW + Duration::minutes(5));
        assert_eq!(result.prs_failed, 0);
        assert_eq!(result.nudges_sent, 0);
        assert_eq!(app.gateway.post_count(), 1);
        let state = app.store.get(&target).unwrap().unwrap();
        assert!(state.markers.failed_checks.is_some());
    }

    #[test]
    fn unreadable_reviews_still_send_issue_nudges() {
        let config = config_for("org/app");
        let target = pr("org/app#12");
        let mut gateway = gateway_with(&["org/app#12"]);
        gateway.reviews.insert(target.clone(), vec![review(10, "bob")]);
        gateway.details.insert(target.clone(), details(Some(false), ""));
        gateway.fail_reviews = true;
        let mut app = App::new(InMemoryStateStore::default(), gateway, &config, false);

        let result = app.run_cycle(NOW);
        assert_eq!(result.prs_failed, 0);
        assert_eq!(result.new_reviews_observed, 0);
        assert_eq!(result.issue_nudges_sent, 1);
        assert_eq!(app.gateway.post_count(), 1);

        let state = app.store.get(&target).unwrap().unwrap();
        assert!(state.markers.merge_conflict.is_some());
        assert_eq!(state.last_seen_review_id, None);
        assert_eq!(state.review_nudge_count, 0);
    }

    #[test]
    fn dry_run_counts_without_side_effects() {
        let config = config_for("org/app");
        let target = pr("org/app#5");
        let mut gateway = gateway_with(&["org/app#5"]);
        gateway.reviews.insert(target.clone(), vec![review(10, "bob")]);
        gateway.details.insert(target.clone(), details(Some(false), ""));
        let mut app = App::new(InMemoryStateStore::default(), gateway, &config, true);

        let result = app.run_cycle(NOW);
        assert_eq!(result.nudges_sent, 2);
        assert_eq!(result.issue_nudges_sent, 1);
        assert_eq!(app.gateway.post_count(), 0);
        assert!(app.store.list().unwrap().is_empty());
    }

    #[test]
    fn failed_post_is_retried_next_cycle() {
        let config = config_for("org/app");
        let target = pr("org/app#6");
        let mut gateway = gateway_with(&["org/app#6"]);
        gateway.reviews.insert(target.clone(), vec![review(10, "bob")]);
        gateway.fail_posts = true;
        let mut app = App::new(InMemoryStateStore::default(), gateway, &config, false);

        let failed = app.run_cycle(NOW);
        assert_eq!(failed.prs_failed, 1);
        assert_eq!(failed.nudges_sent, 0);
        assert!(app.store.get(&target).unwrap().is_none());

        app.gateway.fail_posts = false;
        let retried = app.run_cycle(NOW);
        assert_eq!(retried.nudges_sent, 1);
        assert_eq!(app.gateway.post_count(), 1);
    }

    #[test]
    fn unreadable_pr_does_not_stop_the_cycle() {
        let config = config_for("org/app");
        let broken = pr("org/app#7");
        let healthy = pr("org/app#8");
        let mut gateway = gateway_with(&["org/app#7", "org/app#8"]);
        gateway.failing_details.insert(broken);
        gateway.details.insert(healthy.clone(), details(Some(false), ""));
        let mut app = App::new(InMemoryStateStore::default(), gateway, &config, false);

        let result = app.run_cycle(NOW);
        assert_eq!(result.considered_prs, 2);
        assert_eq!(result.prs_failed, 1);
        assert_eq!(app.gateway.posted_to(&healthy).len(), 1);
    }

    #[test]
    fn unknown_current_user_disables_self_filter() {
        let config = config_for("org/app");
        let target = pr("org/app#9");
        let mut gateway = gateway_with(&["org/app#9"]);
        gateway.current_user = None;
        gateway.reviews.insert(target.clone(), vec![review(10, "alice")]);
        let mut app = App::new(InMemoryStateStore::default(), gateway, &config, false);

        assert_eq!(app.run_cycle(NOW).nudges_sent, 1);
    }

    #[test]
    fn daemon_stops_after_current_cycle() {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_time()
            .build()
            .unwrap();
        let config = config_for("org/app");
        let mut app = App::new(
            InMemoryStateStore::default(),
            gateway_with(&[]),
            &config,
            false,
        );

        let shutdown = Shutdown::new();
        shutdown.trigger();
        let cycles = app.run_daemon(rt.handle(), std::time::Duration::from_secs(3600), &shutdown);
        assert_eq!(cycles, 1);
    }

    #[test]
    fn daemon_wakes_from_sleep_on_shutdown() {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_time()
            .build()
            .unwrap();
        let config = config_for("org/app");
        let mut app = App::new(
            InMemoryStateStore::default(),
            gateway_with(&[]),
            &config,
            false,
        );

        let shutdown = Shutdown::new();
        let trigger = Arc::clone(&shutdown);
        rt.spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            trigger.trigger();
        });
        let cycles = app.run_daemon(rt.handle(), std::time::Duration::from_secs(3600), &shutdown);
        assert_eq!(cycles, 1);
    }
}
