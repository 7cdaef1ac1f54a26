//! Where the gateway gets its credentials and API base from.

use std::process::Command;

use anyhow::{Context, Result, anyhow, bail};
use tracing::debug;

/// Checked in order; the `gh` CLI is the last resort.
const TOKEN_ENV_VARS: [&str; 2] = ["GITHUB_TOKEN", "GH_TOKEN"];

pub fn resolve_token() -> Result<String> {
    for var in TOKEN_ENV_VARS {
        if let Some(token) = token_from_env(var)? {
            debug!(source = var, "using token from environment");
            return Ok(token);
        }
    }
    let token = token_from_gh()?;
    debug!(source = "gh auth token", "using token from gh CLI");
    Ok(token)
}

/// `GITHUB_API_URL`, for GitHub Enterprise hosts.
pub fn api_base_from_env() -> Option<String> {
    non_empty_env("GITHUB_API_URL")
}

/// `None` when unset; a set-but-blank variable is a configuration mistake.
fn token_from_env(var: &str) -> Result<Option<String>> {
    let Some(raw) = std::env::var_os(var) else {
        return Ok(None);
    };
    let raw = raw
        .into_string()
        .map_err(|_| anyhow!("{var} is not valid UTF-8"))?;
    let token = raw.trim();
    if token.is_empty() {
        bail!("{var} is set but blank; unset it or export a token");
    }
    Ok(Some(token.to_string()))
}

fn token_from_gh() -> Result<String> {
    let mut cmd = Command::new("gh");
    cmd.args(["auth", "token"]);
    if let Some(host) = non_empty_env("GH_HOST") {
        cmd.args(["--hostname", &host]);
    }

    let output = cmd
        .output()
        .context("no GITHUB_TOKEN or GH_TOKEN set, and the gh CLI could not be started")?;
    if !output.status.success() {
        bail!(
            "gh auth token exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if token.is_empty() {
        bail!("gh auth token printed no token; run `gh auth login`");
    }
    Ok(token)
}

fn non_empty_env(var: &str) -> Option<String> {
    std::env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_variables_are_absent() {
        let var = "GH_NUDGER_AUTH_TEST_NEVER_SET";
        assert!(token_from_env(var).unwrap().is_none());
        assert!(non_empty_env(var).is_none());
    }
}
