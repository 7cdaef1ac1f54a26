pub mod auth;
pub mod model;
pub mod timeutil;

use anyhow::{Result, anyhow};
use octocrab::Octocrab;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::runtime::Handle;
use tracing::debug;

use super::{GatewayError, RemoteGateway};
use crate::domain::pr::{CheckRun, PrIdentity, PullRequestDetails, RepoName, ReviewEvent};
use model::{
    CheckRunsPage, DetailsData, IssueCommentNode, NotificationThread, PullSummary, ReviewNode,
    UserNode,
};

const PAGE_SIZE: usize = 100;
/// Upper bound on pages fetched per listing.
const MAX_PAGES: u32 = 50;

#[derive(Debug, Serialize)]
struct GraphQlPayload<V> {
    query: &'static str,
    variables: V,
}

#[derive(Debug, Serialize)]
struct DetailsVars<'a> {
    owner: &'a str,
    name: &'a str,
    number: i64,
}

#[derive(Debug, serde::Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, serde::Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Serialize)]
struct CommentBody<'a> {
    body: &'a str,
}

const DETAILS_QUERY: &str = r#"
query ($owner: String!, $name: String!, $number: Int!) {
  repository(owner: $owner, name: $name) {
    pullRequest(number: $number) {
      mergeable
      mergeStateStatus
      reviewDecision
      headRefOid
    }
  }
}
"#;

/// Blocking facade over octocrab. Every call runs on the shared runtime handle,
/// so the cycle stays sequential.
pub struct GithubGateway {
    octo: Octocrab,
    rt: Handle,
}

impl GithubGateway {
    pub fn connect(rt: Handle, token: String, api_base: Option<String>) -> Result<Self> {
        // octocrab builds its HTTP stack inside the runtime context.
        let _guard = rt.enter();
        let mut builder = Octocrab::builder().personal_token(token);
        if let Some(api) = api_base {
            builder = builder
                .base_uri(api)
                .map_err(|e| anyhow!("invalid GITHUB_API_URL: {e}"))?;
        }
        let octo = builder
            .build()
            .map_err(|e| anyhow!("failed to init GitHub client: {e}"))?;
        Ok(Self { octo, rt })
    }

    fn get_json<T, P>(&self, context: &str, route: &str, params: &P) -> Result<T, GatewayError>
    where
        T: DeserializeOwned,
        P: Serialize + ?Sized,
    {
        let raw: serde_json::Value = self
            .rt
            .block_on(self.octo.get(route, Some(params)))
            .map_err(|e| GatewayError::remote(context, e))?;
        serde_json::from_value(raw).map_err(|e| GatewayError::data_shape(context, e))
    }

    /// Fetch `page=1..` until a short page. `extract` pulls the items out of one page body.
    fn get_paged<Page, Item>(
        &self,
        context: &str,
        route: &str,
        params: &[(&str, String)],
        extract: impl Fn(Page) -> Vec<Item>,
    ) -> Result<Vec<Item>, GatewayError>
    where
        Page: DeserializeOwned,
    {
        let mut out = Vec::new();
        for page in 1..=MAX_PAGES {
            let mut query: Vec<(&str, String)> = params.to_vec();
            query.push(("per_page", PAGE_SIZE.to_string()));
            query.push(("page", page.to_string()));

            let items = extract(self.get_json(context, route, &query)?);
            let short = items.len() < PAGE_SIZE;
            out.extend(items);
            if short {
                return Ok(out);
            }
        }
        debug!(context, pages = MAX_PAGES, "stopped paginating at page limit");
        Ok(out)
    }
}

impl RemoteGateway for GithubGateway {
    fn list_open_pull_requests(&self, repo: &RepoName) -> Result<Vec<u64>, GatewayError> {
        let pulls = self.get_paged(
            &format!("list open PRs for {repo}"),
            &format!("/repos/{repo}/pulls"),
            &[("state", "open".to_string())],
            |page: Vec<PullSummary>| page,
        )?;
        Ok(pulls.into_iter().map(|p| p.number).collect())
    }

    fn list_notification_prs(
        &self,
        participating_only: bool,
        include_all: bool,
    ) -> Result<Vec<PrIdentity>, GatewayError> {
        let mut params = Vec::new();
        if participating_only {
            params.push(("participating", "true".to_string()));
        }
        if include_all {
            params.push(("all", "true".to_string()));
        }
        let threads = self.get_paged(
            "list notifications",
            "/notifications",
            &params,
            |page: Vec<NotificationThread>| page,
        )?;
        Ok(threads
            .into_iter()
            .filter_map(NotificationThread::into_pr)
            .collect())
    }

    fn pull_request_details(&self, pr: &PrIdentity) -> Result<PullRequestDetails, GatewayError> {
        let context = format!("fetch details for {pr}");
        let payload = GraphQlPayload {
            query: DETAILS_QUERY,
            variables: DetailsVars {
                owner: pr.repo.owner(),
                name: pr.repo.name(),
                number: pr.number as i64,
            },
        };
        let raw: serde_json::Value = self
            .rt
            .block_on(self.octo.graphql(&payload))
            .map_err(|e| GatewayError::remote(&context, e))?;
        let resp: GraphQlResponse<DetailsData> =
            serde_json::from_value(raw).map_err(|e| GatewayError::data_shape(&context, e))?;

        if let Some(errors) = resp.errors.filter(|e| !e.is_empty()) {
            let joined: Vec<&str> = errors.iter().map(|e| e.message.as_str()).collect();
            return Err(GatewayError::remote(&context, joined.join("; ")));
        }
        resp.data
            .and_then(|d| d.repository)
            .and_then(|r| r.pull_request)
            .map(PullRequestDetails::from)
            .ok_or_else(|| GatewayError::data_shape(&context, "pull request missing from response"))
    }

    fn list_check_runs(
        &self,
        repo: &RepoName,
        head_sha: &str,
    ) -> Result<Vec<CheckRun>, GatewayError> {
        let runs = self.get_paged(
            &format!("list check runs for {repo}@{head_sha}"),
            &format!("/repos/{repo}/commits/{head_sha}/check-runs"),
            &[],
            |page: CheckRunsPage| page.check_runs,
        )?;
        Ok(runs.into_iter().map(CheckRun::from).collect())
    }

    fn list_review_events(
        &self,
        pr: &PrIdentity,
        include_comments: bool,
    ) -> Result<Vec<ReviewEvent>, GatewayError> {
        let reviews = self.get_paged(
            &format!("list reviews for {pr}"),
            &format!("/repos/{}/pulls/{}/reviews", pr.repo, pr.number),
            &[],
            |page: Vec<ReviewNode>| page,
        )?;
        let mut events: Vec<ReviewEvent> =
            reviews.into_iter().filter_map(ReviewNode::into_event).collect();

        if include_comments {
            let comments = self.get_paged(
                &format!("list comments for {pr}"),
                &format!("/repos/{}/issues/{}/comments", pr.repo, pr.number),
                &[],
                |page: Vec<IssueCommentNode>| page,
            )?;
            events.extend(comments.into_iter().filter_map(IssueCommentNode::into_event));
        }
        Ok(events)
    }

    fn post_comment(&self, pr: &PrIdentity, body: &str) -> Result<(), GatewayError> {
        // Pull requests are issues for comment purposes.
        let route = format!("/repos/{}/issues/{}/comments", pr.repo, pr.number);
        let _: serde_json::Value = self
            .rt
            .block_on(self.octo.post(route, Some(&CommentBody { body })))
            .map_err(|e| GatewayError::remote(format!("post comment on {pr}"), e))?;
        Ok(())
    }

    fn current_user_login(&self) -> Result<String, GatewayError> {
        let no_params: [(&str, &str); 0] = [];
        let user: UserNode = self.get_json("fetch current user", "/user", &no_params)?;
        let login = user.login.trim();
        if login.is_empty() {
            return Err(GatewayError::data_shape("fetch current user", "empty login"));
        }
        Ok(login.to_string())
    }
}
