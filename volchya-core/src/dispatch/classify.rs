//! Failure classification.
//!
//! Endpoints report errors as a status code plus free text, and the exact
//! wording drifts between API versions. The default classifier matches on
//! configurable status codes and substrings; hosts with a different
//! endpoint can swap in their own [`FailureClassifier`].

use super::backend::CompletionError;
use super::FailureKind;

/// Maps a completion error to a failure kind.
pub trait FailureClassifier: Send + Sync {
    fn classify(&self, error: &CompletionError) -> FailureKind;
}

/// Status- and substring-based classifier.
#[derive(Debug, Clone)]
pub struct DefaultClassifier {
    unavailable_statuses: Vec<u16>,
    unavailable_markers: Vec<String>,
    transient_statuses: Vec<u16>,
    transient_markers: Vec<String>,
}

impl Default for DefaultClassifier {
    fn default() -> Self {
        Self {
            unavailable_statuses: vec![403, 404],
            unavailable_markers: ["not found", "not_found", "permission", "403"]
                .iter()
                .map(|m| m.to_string())
                .collect(),
            transient_statuses: vec![408, 429, 500, 502, 503, 504],
            transient_markers: ["timed out", "timeout", "connection reset", "temporarily"]
                .iter()
                .map(|m| m.to_string())
                .collect(),
        }
    }
}

impl DefaultClassifier {
    /// A classifier that matches nothing; every error is `Unknown`.
    pub fn empty() -> Self {
        Self {
            unavailable_statuses: Vec::new(),
            unavailable_markers: Vec::new(),
            transient_statuses: Vec::new(),
            transient_markers: Vec::new(),
        }
    }

    pub fn with_unavailable_status(mut self, status: u16) -> Self {
        self.unavailable_statuses.push(status);
        self
    }

    /// Treat messages containing `marker` (case-insensitive) as model-unavailable.
    pub fn with_unavailable_marker(mut self, marker: impl Into<String>) -> Self {
        self.unavailable_markers.push(marker.into().to_lowercase());
        self
    }

    pub fn with_transient_status(mut self, status: u16) -> Self {
        self.transient_statuses.push(status);
        self
    }

    pub fn with_transient_marker(mut self, marker: impl Into<String>) -> Self {
        self.transient_markers.push(marker.into().to_lowercase());
        self
    }

    /// Whole-word, case-insensitive marker match. With `skip_codes`,
    /// all-digit markers are ignored.
    fn matches(markers: &[String], message: &str, skip_codes: bool) -> bool {
        let message = message.to_lowercase();
        markers
            .iter()
            .filter(|marker| !(skip_codes && marker.chars().all(|c| c.is_ascii_digit())))
            .any(|marker| contains_word(&message, marker))
    }
}

fn contains_word(haystack: &str, word: &str) -> bool {
    if word.is_empty() {
        return false;
    }
    haystack.match_indices(word).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + word.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

impl FailureClassifier for DefaultClassifier {
    fn classify(&self, error: &CompletionError) -> FailureKind {
        match error {
            CompletionError::Unauthenticated => FailureKind::CredentialMissing,
            CompletionError::Timeout(_) | CompletionError::Network(_) => FailureKind::Transient,
            CompletionError::Endpoint { status, message } => {
                // The status is known, so numeric markers would only
                // match incidental digits in the body.
                if self.unavailable_statuses.contains(status)
                    || Self::matches(&self.unavailable_markers, message, true)
                {
                    FailureKind::PermissionOrModelUnavailable
                } else if self.transient_statuses.contains(status) {
                    FailureKind::Transient
                } else {
                    FailureKind::Unknown
                }
            }
            CompletionError::Other(message) => {
                if Self::matches(&self.unavailable_markers, message, false) {
                    FailureKind::PermissionOrModelUnavailable
                } else if Self::matches(&self.transient_markers, message, false) {
                    FailureKind::Transient
                } else {
                    FailureKind::Unknown
                }
            }
        }
    }
}
