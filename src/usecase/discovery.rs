use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::config::Config;
use crate::domain::pr::PrIdentity;
use crate::repo::RemoteGateway;

/// Candidate PRs for this cycle: notification PRs plus every open PR of the
/// configured repos, deduplicated and sorted by `(repository, number)`.
pub fn discover(gateway: &dyn RemoteGateway, config: &Config) -> Vec<PrIdentity> {
    let general = &config.general;
    let mut found = BTreeSet::new();

    if general.use_notifications {
        match gateway.list_notification_prs(
            general.participating_only,
            general.include_all_notifications,
        ) {
            Ok(prs) => {
                debug!(count = prs.len(), "pull requests from notifications");
                found.extend(prs);
            }
            Err(e) => {
                warn!(error = %e, "notification discovery failed; continuing with configured repos")
            }
        }
    }

    for repo in &general.repos {
        match gateway.list_open_pull_requests(repo) {
            Ok(numbers) => {
                debug!(%repo, count = numbers.len(), "open pull requests");
                found.extend(numbers.into_iter().map(|n| PrIdentity::new(repo.clone(), n)));
            }
            Err(e) => warn!(%repo, error = %e, "unable to list open pull requests; skipping repo"),
        }
    }

    found.into_iter().collect()
}
