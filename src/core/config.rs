//! Engine Configuration
//!
//! Feature switches and host lists that shape permission computation for a
//! profile. Use the builder pattern:
//!
//! ```ignore
//! let config = EngineConfig::new()
//!     .with_permitted_sites(true)
//!     .with_menu_access_control(true)
//!     .with_webstore_host("chromewebstore.google.com");
//! ```

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::error::{PermissionError, PermissionResult};
use super::ids::ExtensionId;
use crate::patterns::{SchemeMask, UrlPattern, UrlPatternSet};

/// Default always-reachable host
pub const FAVICON_PATTERN: &str = "chrome://favicon/*";

/// Configuration for a permission engine instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Whether the user permitted-sites list exists at all
    pub permitted_sites_enabled: bool,

    /// Whether user-permitted sites flow into grants and revoke keep-sets
    pub menu_access_control_enabled: bool,

    /// Patterns every extension keeps when it asked for them
    pub always_allowed_hosts: Vec<String>,

    /// Extensions allowed to keep chrome-internal schemes on `<all_urls>`
    pub all_urls_includes_chrome_urls: Vec<ExtensionId>,

    /// Hosts no extension may script
    pub webstore_hosts: Vec<String>,

    /// URL schemes no extension may touch
    pub restricted_schemes: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            permitted_sites_enabled: true,
            menu_access_control_enabled: true,
            always_allowed_hosts: vec![FAVICON_PATTERN.to_string()],
            all_urls_includes_chrome_urls: Vec::new(),
            webstore_hosts: vec!["chromewebstore.google.com".to_string()],
            restricted_schemes: vec![
                "chrome".to_string(),
                "chrome-untrusted".to_string(),
                "devtools".to_string(),
                "about".to_string(),
            ],
        }
    }
}

impl EngineConfig {
    /// Create a configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> PermissionResult<Self> {
        let file = File::open(path.as_ref())?;
        let config: EngineConfig = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| PermissionError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every configured pattern parses
    pub fn validate(&self) -> PermissionResult<()> {
        for host in &self.always_allowed_hosts {
            UrlPattern::parse(SchemeMask::HOST_PERMISSION, host)
                .map_err(|e| PermissionError::InvalidConfig(e.to_string()))?;
        }
        if self.menu_access_control_enabled && !self.permitted_sites_enabled {
            return Err(PermissionError::InvalidConfig(
                "menu access control requires permitted sites".to_string(),
            ));
        }
        Ok(())
    }

    /// Enable or disable the permitted-sites list
    pub fn with_permitted_sites(mut self, enabled: bool) -> Self {
        self.permitted_sites_enabled = enabled;
        self
    }

    /// Enable or disable user-permitted sites flowing into grants
    pub fn with_menu_access_control(mut self, enabled: bool) -> Self {
        self.menu_access_control_enabled = enabled;
        self
    }

    /// Add an always-allowed host pattern
    pub fn with_always_allowed_host(mut self, pattern: impl Into<String>) -> Self {
        self.always_allowed_hosts.push(pattern.into());
        self
    }

    /// Allow an extension to keep chrome-internal schemes on `<all_urls>`
    pub fn with_chrome_urls_allowed(mut self, id: impl Into<ExtensionId>) -> Self {
        self.all_urls_includes_chrome_urls.push(id.into());
        self
    }

    /// Add a host restricted for every extension
    pub fn with_webstore_host(mut self, host: impl Into<String>) -> Self {
        self.webstore_hosts.push(host.into());
        self
    }

    /// Replace the restricted scheme list
    pub fn with_restricted_schemes(mut self, schemes: Vec<String>) -> Self {
        self.restricted_schemes = schemes;
        self
    }

    /// Whether user-permitted sites participate in grant computation
    pub fn user_permitted_sites_affect_grants(&self) -> bool {
        self.permitted_sites_enabled && self.menu_access_control_enabled
    }

    /// Whether `id` may keep chrome-internal schemes on `<all_urls>`
    pub fn can_access_chrome_urls(&self, id: &ExtensionId) -> bool {
        self.all_urls_includes_chrome_urls.contains(id)
    }

    /// Parsed always-allowed host patterns; unparsable entries are skipped
    pub fn always_allowed_pattern_set(&self) -> UrlPatternSet {
        let mut set = UrlPatternSet::new();
        for host in &self.always_allowed_hosts {
            match UrlPattern::parse(SchemeMask::HOST_PERMISSION, host) {
                Ok(pattern) => {
                    set.add_pattern(pattern);
                }
                Err(e) => tracing::warn!("[EngineConfig] Skipping always-allowed host: {}", e),
            }
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert!(config.permitted_sites_enabled);
        assert!(config.user_permitted_sites_affect_grants());
        assert_eq!(config.always_allowed_hosts, vec![FAVICON_PATTERN.to_string()]);
        assert!(config.restricted_schemes.contains(&"chrome".to_string()));
        assert_eq!(config.always_allowed_pattern_set().len(), 1);
    }

    #[test]
    fn test_builder() {
        let config = EngineConfig::new()
            .with_menu_access_control(false)
            .with_chrome_urls_allowed("allowlisted")
            .with_webstore_host("store.example");

        assert!(!config.user_permitted_sites_affect_grants());
        assert!(config.can_access_chrome_urls(&ExtensionId::new("allowlisted")));
        assert!(!config.can_access_chrome_urls(&ExtensionId::new("other")));
        assert!(config.webstore_hosts.contains(&"store.example".to_string()));
    }

    #[test]
    fn test_from_json_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"menu_access_control_enabled": false, "always_allowed_hosts": ["https://status.example/*"]}}"#
        )
        .unwrap();

        let config = EngineConfig::from_json_file(file.path()).unwrap();
        assert!(!config.menu_access_control_enabled);
        assert!(config.permitted_sites_enabled);
        assert_eq!(config.always_allowed_hosts.len(), 1);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"always_allowed_hosts": ["not a pattern"]}}"#).unwrap();
        let err = EngineConfig::from_json_file(file.path()).unwrap_err();
        assert!(matches!(err, PermissionError::InvalidConfig(_)));

        let config = EngineConfig::new()
            .with_permitted_sites(false)
            .with_menu_access_control(true);
        assert!(config.validate().is_err());
    }
}
