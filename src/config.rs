//! TOML configuration, loaded once at startup and passed by reference.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::pr::RepoName;

pub const DEFAULT_REVIEW_NUDGE_MESSAGE: &str = "@cursor there has been a code review from {reviewer}. address the feedback and commit changes if warranted";
pub const DEFAULT_FAILED_CHECKS_MESSAGE: &str =
    "@cursor there are test/linting/other issues - fix these.\n\nFailed checks: {checks}";
pub const DEFAULT_MERGE_CONFLICT_MESSAGE: &str =
    "@cursor there are merge conflicts that need to be resolved.";
pub const DEFAULT_CHANGES_REQUESTED_MESSAGE: &str =
    "@cursor review and fix the issues the reviewer brought up";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid config: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub general: GeneralConfig,
    pub messages: MessagesConfig,
    pub classifier: ClassifierConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeneralConfig {
    /// Optional allowlist. Empty means discovery relies on notifications alone.
    pub repos: Vec<RepoName>,
    pub use_notifications: bool,
    pub participating_only: bool,
    pub include_all_notifications: bool,
    pub max_review_nudges_per_pr: u32,
    /// 0 disables the cooldown.
    pub review_nudge_cooldown_seconds: u64,
    /// Supports `{reviewer}`, `{state}` and `{pr}`.
    pub review_nudge_message: String,
    pub ignore_self_reviews: bool,
    pub ignore_review_states: Vec<String>,
    pub interval_seconds: u64,
    /// Also treat review-shaped issue comments as reviews.
    pub include_comment_reviews: bool,
    /// Nudge on failed checks, merge conflicts and requested changes.
    pub issue_nudges: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            repos: Vec::new(),
            use_notifications: true,
            participating_only: true,
            include_all_notifications: true,
            max_review_nudges_per_pr: 4,
            review_nudge_cooldown_seconds: 0,
            review_nudge_message: DEFAULT_REVIEW_NUDGE_MESSAGE.to_string(),
            ignore_self_reviews: true,
            ignore_review_states: vec!["DISMISSED".to_string(), "PENDING".to_string()],
            interval_seconds: 300,
            include_comment_reviews: true,
            issue_nudges: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MessagesConfig {
    /// Supports `{checks}` and `{pr}`.
    pub failed_checks: String,
    pub merge_conflict: String,
    pub changes_requested: String,
    /// Appended to every posted comment after a `---` rule when non-empty.
    pub signature: String,
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            failed_checks: DEFAULT_FAILED_CHECKS_MESSAGE.to_string(),
            merge_conflict: DEFAULT_MERGE_CONFLICT_MESSAGE.to_string(),
            changes_requested: DEFAULT_CHANGES_REQUESTED_MESSAGE.to_string(),
            signature: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClassifierConfig {
    /// Author substrings that mark a commenter as a reviewer.
    pub reviewer_patterns: Vec<String>,
    /// Author substrings that are never reviews, even if they match a reviewer pattern.
    pub excluded_authors: Vec<String>,
    /// Body markers of a review-shaped comment.
    pub section_headers: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            reviewer_patterns: vec!["claude".into(), "review".into(), "bot".into()],
            excluded_authors: vec!["bugbot".into(), "bug-bot".into()],
            section_headers: vec!["## code review".into(), "## pull request review".into()],
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let mut config: Config = toml::from_str(content)?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn is_ignored_state(&self, state: &str) -> bool {
        self.general
            .ignore_review_states
            .iter()
            .any(|s| s.eq_ignore_ascii_case(state.trim()))
    }

    fn normalize(&mut self) {
        let g = &mut self.general;
        g.ignore_review_states = g
            .ignore_review_states
            .iter()
            .map(|s| s.trim().to_ascii_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
        g.repos.sort();
        g.repos.dedup();

        let c = &mut self.classifier;
        for list in [
            &mut c.reviewer_patterns,
            &mut c.excluded_authors,
            &mut c.section_headers,
        ] {
            *list = list
                .iter()
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect();
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.general.interval_seconds == 0 {
            return Err(ConfigError::Validation(
                "[general].interval_seconds must be at least 1".to_string(),
            ));
        }
        let messages = [
            ("[general].review_nudge_message", &self.general.review_nudge_message),
            ("[messages].failed_checks", &self.messages.failed_checks),
            ("[messages].merge_conflict", &self.messages.merge_conflict),
            ("[messages].changes_requested", &self.messages.changes_requested),
        ];
        for (key, value) in messages {
            if value.trim().is_empty() {
                return Err(ConfigError::Validation(format!("{key} must not be empty")));
            }
        }
        Ok(())
    }
}

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("gh-nudger")
        .join("config.toml")
}

/// Writes the commented default config unless the file already exists.
/// Returns whether a file was written.
pub fn write_default_config(path: &Path) -> Result<bool, ConfigError> {
    if path.exists() {
        return Ok(false);
    }
    let io_err = |source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    std::fs::write(path, default_config_text()).map_err(io_err)?;
    Ok(true)
}

pub fn default_config_text() -> String {
    format!(
        r###"[general]
use_notifications = true
participating_only = true
include_all_notifications = true

# Optional allowlist. If empty, discovery comes solely from notifications.
repos = []

# Stop nudging about reviews after this many nudges per PR.
max_review_nudges_per_pr = 4

# Optional per-PR cooldown for review nudges (0 disables it).
review_nudge_cooldown_seconds = 0

# Placeholders: {{reviewer}}, {{state}}, {{pr}}
review_nudge_message = {review}

# Ignore reviews submitted by your own GitHub user.
ignore_self_reviews = true

# Ignore review states that are usually noise.
ignore_review_states = ["DISMISSED", "PENDING"]

# Seconds between cycles in daemon mode.
interval_seconds = 300

# Treat review-shaped issue comments (e.g. bot reviews) as reviews.
include_comment_reviews = true

# Nudge once per occurrence of failed checks, merge conflicts and requested changes.
issue_nudges = true

[messages]
# Placeholders: {{checks}}, {{pr}}
failed_checks = {failed}
merge_conflict = {conflict}
changes_requested = {changes}
# Appended under a `---` rule to every comment when set.
signature = ""

[classifier]
reviewer_patterns = ["claude", "review", "bot"]
excluded_authors = ["bugbot", "bug-bot"]
section_headers = ["## code review", "## pull request review"]
"###,
        review = toml_string(DEFAULT_REVIEW_NUDGE_MESSAGE),
        failed = toml_string(DEFAULT_FAILED_CHECKS_MESSAGE),
        conflict = toml_string(DEFAULT_MERGE_CONFLICT_MESSAGE),
        changes = toml_string(DEFAULT_CHANGES_REQUESTED_MESSAGE),
    )
}

fn toml_string(s: &str) -> String {
    toml::Value::String(s.to_string()).to_string()
}
