//! API credential sources.
//!
//! Providers are queried on every dispatch, never cached, so a key the
//! host swaps mid-session is used on the very next call.

use std::sync::{Arc, PoisonError, RwLock};

/// Environment variables checked by [`EnvCredential::default`], in order.
pub const DEFAULT_CREDENTIAL_VARS: &[&str] = &["GEMINI_API_KEY", "API_KEY"];

const PLACEHOLDERS: &[&str] = &[
    "placeholder",
    "your_api_key",
    "your-api-key",
    "your_key_here",
    "your_api_key_here",
    "changeme",
    "undefined",
    "null",
    "none",
];

/// Something that can hand out the current API credential.
pub trait CredentialProvider: Send + Sync {
    /// The usable credential right now, or `None` when absent or a placeholder.
    fn credential(&self) -> Option<String>;
}

/// Whether a configured value is a stand-in rather than a real key.
pub fn is_placeholder(value: &str) -> bool {
    let value = value.trim();
    if value.is_empty() {
        return true;
    }
    if (value.starts_with('<') && value.ends_with('>')) || value.starts_with("${") {
        return true;
    }
    let lower = value.to_lowercase();
    PLACEHOLDERS.contains(&lower.as_str()) || lower.chars().all(|c| c == 'x' || c == '*')
}

fn usable(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !is_placeholder(v))
}

/// Reads the credential from environment variables on every call.
#[derive(Debug, Clone)]
pub struct EnvCredential {
    vars: Vec<String>,
}

impl EnvCredential {
    /// Read from a single variable.
    pub fn new(var: impl Into<String>) -> Self {
        Self {
            vars: vec![var.into()],
        }
    }

    /// Also try `var` when the earlier ones are unset or placeholders.
    pub fn with_fallback(mut self, var: impl Into<String>) -> Self {
        self.vars.push(var.into());
        self
    }

    pub fn vars(&self) -> &[String] {
        &self.vars
    }
}

impl Default for EnvCredential {
    fn default() -> Self {
        Self {
            vars: DEFAULT_CREDENTIAL_VARS.iter().map(|v| v.to_string()).collect(),
        }
    }
}

impl CredentialProvider for EnvCredential {
    fn credential(&self) -> Option<String> {
        self.vars
            .iter()
            .find_map(|var| usable(std::env::var(var).ok()))
    }
}

/// A fixed credential.
#[derive(Debug, Clone, Default)]
pub struct StaticCredential(Option<String>);

impl StaticCredential {
    pub fn new(value: impl Into<String>) -> Self {
        Self(Some(value.into()))
    }

    /// A provider that never has a credential.
    pub fn missing() -> Self {
        Self(None)
    }
}

impl CredentialProvider for StaticCredential {
    fn credential(&self) -> Option<String> {
        usable(self.0.clone())
    }
}

/// A credential slot the host can update while a session runs.
///
/// Clones share the same slot.
#[derive(Debug, Clone, Default)]
pub struct SharedCredential {
    slot: Arc<RwLock<Option<String>>>,
}

impl SharedCredential {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, value: impl Into<String>) {
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = Some(value.into());
    }

    pub fn clear(&self) {
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl CredentialProvider for SharedCredential {
    fn credential(&self) -> Option<String> {
        usable(
            self.slot
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders() {
        assert!(is_placeholder(""));
        assert!(is_placeholder("   "));
        assert!(is_placeholder("PLACEHOLDER"));
        assert!(is_placeholder("your_key_here"));
        assert!(is_placeholder("<GEMINI_API_KEY>"));
        assert!(is_placeholder("${API_KEY}"));
        assert!(is_placeholder("xxxxxxxx"));
        assert!(!is_placeholder("AIzaSyD-real-looking-key"));
    }

    #[test]
    fn test_static_credential() {
        assert_eq!(
            StaticCredential::new(" key-1 ").credential(),
            Some("key-1".to_string())
        );
        assert_eq!(StaticCredential::new("undefined").credential(), None);
        assert_eq!(StaticCredential::missing().credential(), None);
    }

    #[test]
    fn test_shared_credential_updates_are_seen_immediately() {
        let shared = SharedCredential::new();
        let provider: Box<dyn CredentialProvider> = Box::new(shared.clone());
        assert_eq!(provider.credential(), None);

        shared.set("key-1");
        assert_eq!(provider.credential(), Some("key-1".to_string()));

        shared.set("key-2");
        assert_eq!(provider.credential(), Some("key-2".to_string()));

        shared.clear();
        assert_eq!(provider.credential(), None);
    }

    #[test]
    fn test_env_credential_reads_fresh_and_falls_back() {
        let primary = "VOLCHYA_TEST_CREDENTIAL_PRIMARY";
        let fallback = "VOLCHYA_TEST_CREDENTIAL_FALLBACK";
        let provider = EnvCredential::new(primary).with_fallback(fallback);

        std::env::remove_var(primary);
        std::env::remove_var(fallback);
        assert_eq!(provider.credential(), None);

        std::env::set_var(primary, "your_api_key");
        std::env::set_var(fallback, "fallback-key");
        assert_eq!(provider.credential(), Some("fallback-key".to_string()));

        std::env::set_var(primary, "primary-key");
        assert_eq!(provider.credential(), Some("primary-key".to_string()));

        std::env::remove_var(primary);
        std::env::remove_var(fallback);
    }
}
