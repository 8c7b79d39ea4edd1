//! Extension records
//!
//! An `Extension` carries the immutable install data (id, location,
//! required and optional permissions) and owns its live `PermissionsData`.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::{EngineConfig, ExtensionId, PermissionResult};
use crate::patterns::scheme::CHROME_UI_SCHEME;
use crate::patterns::{SchemeMask, UrlPattern, UrlPatternSet, ALL_URLS_PATTERN};
use crate::permissions::{ApiPermission, ManifestPermission, PermissionSet, PermissionsData};

/// Where an extension was installed from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ManifestLocation {
    #[default]
    Internal,
    Unpacked,
    ExternalPref,
    /// Force-installed by an administrator
    ExternalPolicy,
    /// Built into the browser
    Component,
}

impl ManifestLocation {
    pub fn is_policy(&self) -> bool {
        matches!(self, ManifestLocation::ExternalPolicy)
    }

    pub fn is_component(&self) -> bool {
        matches!(self, ManifestLocation::Component)
    }
}

/// Install-time flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CreationFlags(u32);

impl CreationFlags {
    pub const NONE: CreationFlags = CreationFlags(0);
    /// Withhold host permissions from the first initialization on
    pub const WITHHOLD_PERMISSIONS: CreationFlags = CreationFlags(1 << 0);

    pub fn contains(&self, other: CreationFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn union(self, other: CreationFlags) -> CreationFlags {
        CreationFlags(self.0 | other.0)
    }
}

/// An installed extension
#[derive(Debug)]
pub struct Extension {
    id: ExtensionId,
    name: String,
    location: ManifestLocation,
    creation_flags: CreationFlags,
    required: PermissionSet,
    optional: PermissionSet,
    permissions_data: PermissionsData,
}

impl Extension {
    pub fn id(&self) -> &ExtensionId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn location(&self) -> ManifestLocation {
        self.location
    }

    pub fn creation_flags(&self) -> CreationFlags {
        self.creation_flags
    }

    pub fn required_permissions(&self) -> &PermissionSet {
        &self.required
    }

    pub fn optional_permissions(&self) -> &PermissionSet {
        &self.optional
    }

    /// Required and optional permissions together
    pub fn requested_permissions(&self) -> PermissionSet {
        self.required.union(&self.optional)
    }

    pub fn permissions_data(&self) -> &PermissionsData {
        &self.permissions_data
    }

    /// Policy-installed and component extensions always keep their hosts
    pub fn can_withhold_permissions(&self) -> bool {
        !self.location.is_policy() && !self.location.is_component()
    }

    /// Replace the live sets, checking that only required permissions are withheld
    pub(crate) fn set_permissions(&self, active: PermissionSet, withheld: PermissionSet) {
        assert!(
            self.required.contains(&withheld),
            "extension {} would withhold permissions it never required: {:?}",
            self.id,
            withheld.difference(&self.required)
        );
        self.permissions_data.set_permissions(active, withheld);
    }
}

/// Builder for `Extension`
///
/// Permission strings that look like host patterns become explicit hosts,
/// everything else is an API permission.
///
/// ```ignore
/// let extension = ExtensionBuilder::new("abcdefghijklmnop")
///     .add_permission("storage")
///     .add_permission("https://*.example.com/*")
///     .add_content_script_match("https://*.example.com/*")
///     .build(&EngineConfig::default())?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct ExtensionBuilder {
    id: String,
    name: String,
    location: ManifestLocation,
    creation_flags: CreationFlags,
    permissions: Vec<String>,
    optional_permissions: Vec<String>,
    manifest_permissions: Vec<String>,
    content_script_matches: Vec<String>,
}

impl ExtensionBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_location(mut self, location: ManifestLocation) -> Self {
        self.location = location;
        self
    }

    pub fn with_creation_flags(mut self, flags: CreationFlags) -> Self {
        self.creation_flags = self.creation_flags.union(flags);
        self
    }

    /// Add a required API permission or host pattern
    pub fn add_permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.push(permission.into());
        self
    }

    pub fn add_permissions<I, S>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.permissions.extend(permissions.into_iter().map(Into::into));
        self
    }

    /// Add an optional API permission or host pattern
    pub fn add_optional_permission(mut self, permission: impl Into<String>) -> Self {
        self.optional_permissions.push(permission.into());
        self
    }

    /// Add a required manifest permission
    pub fn add_manifest_permission(mut self, permission: impl Into<String>) -> Self {
        self.manifest_permissions.push(permission.into());
        self
    }

    /// Add a content script match pattern
    pub fn add_content_script_match(mut self, pattern: impl Into<String>) -> Self {
        self.content_script_matches.push(pattern.into());
        self
    }

    pub fn build(self, config: &EngineConfig) -> PermissionResult<Arc<Extension>> {
        let id = ExtensionId::new(self.id);
        let chrome_urls = config.can_access_chrome_urls(&id);

        let mut required = parse_permissions(&self.permissions, chrome_urls)?;
        if !self.manifest_permissions.is_empty() {
            let manifest: BTreeSet<ManifestPermission> =
                self.manifest_permissions.into_iter().map(ManifestPermission::new).collect();
            required = required.union(&PermissionSet::new(
                BTreeSet::new(),
                manifest,
                UrlPatternSet::new(),
                UrlPatternSet::new(),
            ));
        }
        let scriptable = UrlPatternSet::parse_all(SchemeMask::USER_SCRIPT, &self.content_script_matches)?;
        required = required.union(&PermissionSet::from_hosts(UrlPatternSet::new(), scriptable));

        let optional = parse_permissions(&self.optional_permissions, chrome_urls)?;
        let executes_everywhere = self.location.is_component();

        tracing::debug!(
            "[Extension] Built {} with {} required hosts, {} optional hosts",
            id,
            required.effective_hosts().len(),
            optional.effective_hosts().len()
        );

        Ok(Arc::new(Extension {
            permissions_data: PermissionsData::new(id.clone(), executes_everywhere, PermissionSet::empty()),
            id,
            name: self.name,
            location: self.location,
            creation_flags: self.creation_flags,
            required,
            optional,
        }))
    }
}

fn looks_like_host_pattern(permission: &str) -> bool {
    permission == ALL_URLS_PATTERN || permission.contains("://") || permission.contains(":/")
}

/// Split permission strings into API permissions and explicit hosts
///
/// Non-chrome patterns lose the chrome scheme unless the extension may
/// access chrome URLs, so `<all_urls>` never silently covers internal pages.
fn parse_permissions(permissions: &[String], chrome_urls: bool) -> PermissionResult<PermissionSet> {
    let mut apis = BTreeSet::new();
    let mut hosts = UrlPatternSet::new();

    for permission in permissions {
        if !looks_like_host_pattern(permission) {
            apis.insert(ApiPermission::new(permission.as_str()));
            continue;
        }
        let pattern = UrlPattern::parse(SchemeMask::HOST_PERMISSION, permission)?;
        let pattern = if !chrome_urls && pattern.scheme() != CHROME_UI_SCHEME {
            pattern.with_valid_schemes(pattern.valid_schemes().without(SchemeMask::CHROME_UI))
        } else {
            Some(pattern)
        };
        if let Some(pattern) = pattern {
            hosts.add_pattern(pattern);
        }
    }

    Ok(PermissionSet::new(apis, BTreeSet::new(), hosts, UrlPatternSet::new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn url(spec: &str) -> Url {
        Url::parse(spec).unwrap()
    }

    #[test]
    fn test_builder_splits_permissions() {
        let extension = ExtensionBuilder::new("ext")
            .add_permission("storage")
            .add_permission("https://example.com/*")
            .add_optional_permission("tabs")
            .add_optional_permission("https://*.org/*")
            .add_content_script_match("https://scripted.com/*")
            .build(&EngineConfig::default())
            .unwrap();

        let required = extension.required_permissions();
        assert!(required.has_api_permission("storage"));
        assert_eq!(required.explicit_hosts().to_strings(), vec!["https://example.com/*"]);
        assert_eq!(required.scriptable_hosts().to_strings(), vec!["https://scripted.com/*"]);
        assert!(extension.optional_permissions().has_api_permission("tabs"));
        assert!(extension.requested_permissions().matches_url(&url("https://a.org/")));
        assert!(extension.permissions_data().active_permissions().is_empty());
    }

    #[test]
    fn test_all_urls_drops_chrome_scheme() {
        let config = EngineConfig::default().with_chrome_urls_allowed("allowlisted");
        let plain = ExtensionBuilder::new("plain")
            .add_permission("<all_urls>")
            .build(&config)
            .unwrap();
        let allowlisted = ExtensionBuilder::new("allowlisted")
            .add_permission("<all_urls>")
            .build(&config)
            .unwrap();

        let favicon = url("chrome://favicon/x");
        assert!(!plain.required_permissions().matches_url(&favicon));
        assert!(plain.required_permissions().matches_url(&url("https://a.com/")));
        assert!(allowlisted.required_permissions().matches_url(&favicon));
    }

    #[test]
    fn test_explicit_chrome_pattern_kept() {
        let extension = ExtensionBuilder::new("ext")
            .add_permission("chrome://favicon/*")
            .build(&EngineConfig::default())
            .unwrap();
        assert!(extension.required_permissions().matches_url(&url("chrome://favicon/x")));
    }

    #[test]
    fn test_can_withhold() {
        let config = EngineConfig::default();
        let internal = ExtensionBuilder::new("a").build(&config).unwrap();
        let policy = ExtensionBuilder::new("b")
            .with_location(ManifestLocation::ExternalPolicy)
            .build(&config)
            .unwrap();
        let component = ExtensionBuilder::new("c")
            .with_location(ManifestLocation::Component)
            .build(&config)
            .unwrap();

        assert!(internal.can_withhold_permissions());
        assert!(!policy.can_withhold_permissions());
        assert!(!component.can_withhold_permissions());
    }

    #[test]
    fn test_creation_flags() {
        let flags = CreationFlags::NONE.union(CreationFlags::WITHHOLD_PERMISSIONS);
        assert!(flags.contains(CreationFlags::WITHHOLD_PERMISSIONS));
        assert!(!CreationFlags::NONE.contains(CreationFlags::WITHHOLD_PERMISSIONS));
    }

    #[test]
    fn test_invalid_host_pattern() {
        let result = ExtensionBuilder::new("ext")
            .add_permission("https://*foo.com/*")
            .build(&EngineConfig::default());
        assert!(result.is_err());
    }

    #[test]
    #[should_panic(expected = "never required")]
    fn test_withholding_unrequired_panics() {
        let extension = ExtensionBuilder::new("ext")
            .add_permission("https://a.com/*")
            .build(&EngineConfig::default())
            .unwrap();
        let other = UrlPatternSet::parse_all(SchemeMask::HOST_PERMISSION, ["https://b.com/*"]).unwrap();
        extension.set_permissions(PermissionSet::empty(), PermissionSet::from_hosts(other, UrlPatternSet::new()));
    }
}
