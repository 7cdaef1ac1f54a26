use crate::config::Config;
use crate::domain::pr::{EventSource, ReviewEvent};

/// How far into a comment body a "code review" phrase still counts as a header.
const HEADER_WINDOW_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Classification {
    pub is_qualifying_review: bool,
    pub is_self_excluded: bool,
}

/// Decides whether a review event should count as review feedback.
pub trait ReviewClassifier {
    fn classify(&self, event: &ReviewEvent, current_user: Option<&str>) -> Classification;
}

/// Textual heuristics: reviewer-looking authors, review section headers, and
/// an exclusion list. Tuned to miss reviews rather than nudge spuriously.
#[derive(Debug, Clone, Default)]
pub struct HeuristicClassifier {
    reviewer_patterns: Vec<String>,
    excluded_authors: Vec<String>,
    section_headers: Vec<String>,
    signature: Option<String>,
    /// Literal openings of our own message templates.
    own_prefixes: Vec<String>,
    ignore_self: bool,
}

impl HeuristicClassifier {
    pub fn from_config(config: &Config) -> Self {
        let signature = config.messages.signature.trim().to_lowercase();
        let templates = [
            &config.general.review_nudge_message,
            &config.messages.failed_checks,
            &config.messages.merge_conflict,
            &config.messages.changes_requested,
        ];
        let own_prefixes = templates
            .into_iter()
            .filter_map(|t| template_prefix(t))
            .collect();
        Self {
            reviewer_patterns: config.classifier.reviewer_patterns.clone(),
            excluded_authors: config.classifier.excluded_authors.clone(),
            section_headers: config.classifier.section_headers.clone(),
            signature: (!signature.is_empty()).then_some(signature),
            own_prefixes,
            ignore_self: config.general.ignore_self_reviews,
        }
    }

    fn is_excluded_author(&self, author: &str) -> bool {
        self.excluded_authors.iter().any(|p| author.contains(p.as_str()))
    }

    fn has_section_header(&self, body: &str) -> bool {
        self.section_headers.iter().any(|h| body.contains(h.as_str()))
    }

    fn is_review_shaped_comment(&self, author: &str, body: &str) -> bool {
        let has_header = self.has_section_header(body);
        let looks_like_reviewer =
            has_header || self.reviewer_patterns.iter().any(|p| author.contains(p.as_str()));
        if !looks_like_reviewer {
            return false;
        }
        let head: String = body.chars().take(HEADER_WINDOW_CHARS).collect();
        has_header || head.contains("code review")
    }
}

/// Lower-cased text before the first placeholder, if any is left.
fn template_prefix(template: &str) -> Option<String> {
    let head = template.split('{').next().unwrap_or_default();
    let head = head.trim().to_lowercase();
    (!head.is_empty()).then_some(head)
}

impl ReviewClassifier for HeuristicClassifier {
    fn classify(&self, event: &ReviewEvent, current_user: Option<&str>) -> Classification {
        let is_self_excluded = self.ignore_self
            && current_user.is_some_and(|me| me.eq_ignore_ascii_case(&event.author));

        let author = event.author.to_lowercase();
        let body = event.body.to_lowercase();

        let is_ours = self
            .signature
            .as_deref()
            .is_some_and(|sig| body.contains(sig))
            || self
                .own_prefixes
                .iter()
                .any(|p| body.trim_start().starts_with(p.as_str()));

        let is_qualifying_review = !is_ours
            && !self.is_excluded_author(&author)
            && match event.source {
                EventSource::Review => true,
                EventSource::Comment => self.is_review_shaped_comment(&author, &body),
            };

        Classification {
            is_qualifying_review,
            is_self_excluded,
        }
    }
}
