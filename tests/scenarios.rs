//! End-to-end permission flows on a recording profile

use std::sync::Arc;

use extension_permissions::core::EngineConfig;
use extension_permissions::extension::{CreationFlags, Extension, ExtensionBuilder};
use extension_permissions::hooks::HookRegistry;
use extension_permissions::patterns::{SchemeMask, SiteOrigin, UrlPatternSet};
use extension_permissions::permissions::{PageAccess, PermissionSet};
use extension_permissions::prefs::{JsonPreferenceStore, PreferenceStore};
use extension_permissions::propagation::{PropagationOutcome, RendererMessage, ON_ADDED_EVENT};
use extension_permissions::testing::{RecordingRenderer, TestProfile};
use tempfile::TempDir;
use url::Url;

fn url(spec: &str) -> Url {
    Url::parse(spec).unwrap()
}

fn origin(spec: &str) -> SiteOrigin {
    SiteOrigin::parse(spec).unwrap()
}

fn explicit(patterns: &[&str]) -> PermissionSet {
    PermissionSet::from_hosts(
        UrlPatternSet::parse_all(SchemeMask::HOST_PERMISSION, patterns).unwrap(),
        UrlPatternSet::new(),
    )
}

fn assert_invariants(extension: &Extension) {
    let data = extension.permissions_data();
    let active = data.active_permissions();
    let requested = extension.requested_permissions();
    assert!(
        requested.effective_hosts().contains(active.effective_hosts()),
        "active hosts {:?} exceed requested {:?}",
        active.effective_hosts(),
        requested.effective_hosts()
    );
    assert!(extension.required_permissions().contains(&data.withheld_permissions()));
}

#[tokio::test]
async fn scenario_a_grant_one_site_of_withheld_pattern() {
    let profile = TestProfile::new();
    let extension = profile
        .install(
            ExtensionBuilder::new("scenario_a")
                .add_permission("https://*.com/*")
                .with_creation_flags(CreationFlags::WITHHOLD_PERMISSIONS),
        )
        .unwrap();
    let example = url("https://example.com");
    let other = url("https://other.com");

    let access = profile.authority.get_site_access(&extension, &example);
    assert!(!access.has_site_access);
    assert!(access.withheld_site_access);

    profile
        .modifier(&extension)
        .grant_host_permission(&example)
        .unwrap()
        .wait()
        .await;

    let access = profile.authority.get_site_access(&extension, &example);
    assert!(access.has_site_access);
    assert!(!access.withheld_site_access);
    let access = profile.authority.get_site_access(&extension, &other);
    assert!(!access.has_site_access);
    assert!(access.withheld_site_access);
    assert_invariants(&extension);
}

#[tokio::test]
async fn scenario_b_restricted_site_beats_matching_pattern() {
    let config = EngineConfig::default()
        .with_restricted_schemes(Vec::new())
        .with_chrome_urls_allowed("scenario_b");
    let profile = TestProfile::with_config(config);
    let extension = profile
        .install(ExtensionBuilder::new("scenario_b").add_permission("<all_urls>"))
        .unwrap();
    let settings = url("chrome://settings/");
    let bank = url("https://bank.example/");
    assert!(profile.authority.get_site_access(&extension, &settings).has_site_access);
    assert!(profile.authority.get_site_access(&extension, &bank).has_site_access);

    for site in ["chrome://settings", "https://bank.example"] {
        profile
            .authority
            .add_restricted_site(&origin(site))
            .unwrap()
            .unwrap()
            .wait()
            .await;
    }

    for target in [&settings, &bank] {
        let access = profile.authority.get_site_access(&extension, target);
        assert!(!access.has_site_access, "{}", target);
        assert!(!access.withheld_site_access, "{}", target);
    }
    let host_restrictions = profile.context.host_restrictions();
    let data = extension.permissions_data();
    assert_eq!(data.get_page_access(&bank, &host_restrictions, profile.config()), PageAccess::Denied);
    assert_eq!(
        data.get_page_access(&url("https://fine.example/"), &host_restrictions, profile.config()),
        PageAccess::Allowed
    );
}

#[tokio::test]
async fn scenario_c_revoking_broad_pattern_removes_covered_site() {
    let profile = TestProfile::new();
    let extension = profile
        .install(ExtensionBuilder::new("scenario_c").add_permission("https://*.com/*"))
        .unwrap();
    let sub = url("https://sub.com/");
    assert!(profile.authority.get_site_access(&extension, &sub).has_site_access);

    profile
        .updater()
        .revoke_runtime_permissions(&extension, &explicit(&["https://*.com/*"]))
        .unwrap()
        .wait()
        .await;

    let data = extension.permissions_data();
    assert!(!data.active_permissions().matches_url(&sub));
    assert_eq!(
        data.get_page_access(&sub, &profile.context.host_restrictions(), profile.config()),
        PageAccess::Withheld
    );
    assert_invariants(&extension);
}

#[tokio::test]
async fn scenario_c_permitted_site_survives_broad_revoke() {
    let profile = TestProfile::new();
    profile
        .authority
        .add_permitted_site(&origin("https://sub.com"))
        .unwrap()
        .unwrap()
        .wait()
        .await;
    let extension = profile
        .install(ExtensionBuilder::new("scenario_c").add_permission("https://*.com/*"))
        .unwrap();
    let sub = url("https://sub.com/");
    let other = url("https://other.com/");

    profile
        .modifier(&extension)
        .set_withhold_host_permissions(true)
        .unwrap()
        .unwrap()
        .wait()
        .await;

    let data = extension.permissions_data();
    let restrictions = profile.context.host_restrictions();
    assert_eq!(data.get_page_access(&sub, &restrictions, profile.config()), PageAccess::Allowed);
    assert_eq!(data.get_page_access(&other, &restrictions, profile.config()), PageAccess::Withheld);
    assert_invariants(&extension);
}

#[tokio::test]
async fn withholding_twice_propagates_once() {
    let profile = TestProfile::new();
    let extension = profile
        .install(ExtensionBuilder::new("idempotent").add_permissions(["storage", "<all_urls>"]))
        .unwrap();
    let modifier = profile.modifier(&extension);

    modifier.set_withhold_host_permissions(true).unwrap().unwrap().wait().await;
    let active = extension.permissions_data().active_permissions();
    let withheld = extension.permissions_data().withheld_permissions();
    assert!(modifier.set_withhold_host_permissions(true).unwrap().is_none());

    assert_eq!(extension.permissions_data().active_permissions(), active);
    assert_eq!(extension.permissions_data().withheld_permissions(), withheld);
    assert_eq!(profile.network.calls().len(), 1);
    assert_eq!(profile.observer.updates().len(), 1);
}

#[tokio::test]
async fn runtime_grant_then_revoke_restores_state() {
    let profile = TestProfile::new();
    let extension = profile
        .install(
            ExtensionBuilder::new("round_trip")
                .add_permissions(["https://*.example.com/*", "https://other.org/*"])
                .with_creation_flags(CreationFlags::WITHHOLD_PERMISSIONS),
        )
        .unwrap();
    let modifier = profile.modifier(&extension);
    let target = url("https://www.example.com/index.html");
    let active_before = extension.permissions_data().active_permissions();
    let runtime_before = profile
        .prefs
        .get_runtime_granted_permissions(extension.id())
        .unwrap_or_default();

    modifier.grant_host_permission(&target).unwrap().wait().await;
    assert!(modifier.has_granted_host_permission(&target));
    modifier.remove_granted_host_permission(&target).unwrap().wait().await;

    assert_eq!(extension.permissions_data().active_permissions(), active_before);
    assert_eq!(
        profile
            .prefs
            .get_runtime_granted_permissions(extension.id())
            .unwrap_or_default(),
        runtime_before
    );
    assert!(!modifier.has_granted_host_permission(&target));
}

#[tokio::test]
async fn invariants_hold_across_mixed_operations() {
    let profile = TestProfile::new();
    let extension = profile
        .install(
            ExtensionBuilder::new("mixed")
                .add_permissions(["tabs", "https://*.example.com/*", "https://fixed.org/*"])
                .add_optional_permission("https://optional.net/*")
                .add_content_script_match("https://*.example.com/*"),
        )
        .unwrap();
    let updater = profile.updater();
    let modifier = profile.modifier(&extension);
    assert_invariants(&extension);

    updater
        .grant_optional_permissions(&extension, &explicit(&["https://optional.net/*"]))
        .unwrap()
        .wait()
        .await;
    assert_invariants(&extension);

    modifier.set_withhold_host_permissions(true).unwrap().unwrap().wait().await;
    assert_invariants(&extension);

    // A grant broader than anything requested is narrowed to what was asked for
    updater
        .grant_runtime_permissions(&extension, &explicit(&["<all_urls>"]))
        .unwrap()
        .wait()
        .await;
    assert_invariants(&extension);
    assert!(!extension
        .permissions_data()
        .active_permissions()
        .matches_url(&url("https://unrequested.io/")));

    profile
        .authority
        .add_permitted_site(&origin("https://elsewhere.io"))
        .unwrap()
        .unwrap()
        .wait()
        .await;
    assert_invariants(&extension);

    modifier.remove_all_granted_host_permissions().unwrap().wait().await;
    assert_invariants(&extension);

    modifier.set_withhold_host_permissions(false).unwrap().unwrap().wait().await;
    assert_invariants(&extension);
    assert!(extension.permissions_data().withheld_permissions().is_empty());
}

#[tokio::test]
async fn shutdown_mid_propagation_skips_dispatch() {
    let profile = TestProfile::new();
    let extension = profile
        .install(ExtensionBuilder::new("shutdown").add_optional_permission("https://a.com/*"))
        .unwrap();

    profile.network.hold();
    let handle = profile
        .updater()
        .grant_optional_permissions(&extension, &explicit(&["https://a.com/*"]))
        .unwrap();
    let authority = profile.registry.shutdown(&profile.context);
    assert!(authority.is_some());

    assert_eq!(handle.wait().await, PropagationOutcome::Aborted);
    assert!(profile.observer.updates().is_empty());
    assert!(profile.events.is_empty());
    assert_eq!(profile.renderer.permission_updates(extension.id()), 0);
    assert!(extension
        .permissions_data()
        .active_permissions()
        .matches_url(&url("https://a.com/")));
}

#[tokio::test]
async fn renderers_of_incognito_contexts_receive_updates() {
    let profile = TestProfile::new();
    let incognito = Arc::new(RecordingRenderer::new(profile.context.add_incognito_context()));
    let dead = Arc::new(RecordingRenderer::new(profile.context.id()));
    profile.context.renderers().add(incognito.clone());
    profile.context.renderers().add(dead.clone());
    dead.kill();

    let extension = profile
        .install(ExtensionBuilder::new("fanout").add_optional_permission("https://a.com/*"))
        .unwrap();
    profile
        .updater()
        .grant_optional_permissions(&extension, &explicit(&["https://a.com/*"]))
        .unwrap()
        .wait()
        .await;

    assert_eq!(profile.renderer.permission_updates(extension.id()), 1);
    assert_eq!(incognito.permission_updates(extension.id()), 1);
    assert!(dead.messages().is_empty());
    let call = &profile.network.calls()[0];
    assert_eq!(call.contexts.len(), 2);

    let events = profile.events.drain();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].1.name, ON_ADDED_EVENT);
    match &incognito.messages()[0] {
        RendererMessage::UpdatePermissions { permissions, .. } => {
            assert!(permissions.active.matches_url(&url("https://a.com/")));
        }
        other => panic!("unexpected message {:?}", other),
    }
}

#[tokio::test]
async fn runtime_grants_survive_restart() {
    let dir = TempDir::new().unwrap();
    let manifest = || {
        ExtensionBuilder::new("persistent")
            .add_permission("https://*.example.com/*")
            .with_creation_flags(CreationFlags::WITHHOLD_PERMISSIONS)
    };
    let target = url("https://docs.example.com/");

    {
        let prefs = Arc::new(JsonPreferenceStore::open_in_dir(dir.path()).unwrap());
        let profile = TestProfile::build(EngineConfig::default(), prefs, HookRegistry::new());
        let extension = profile.install(manifest()).unwrap();
        profile
            .modifier(&extension)
            .grant_host_permission(&target)
            .unwrap()
            .wait()
            .await;
        profile
            .authority
            .add_restricted_site(&origin("https://blocked.example.com"))
            .unwrap()
            .unwrap()
            .wait()
            .await;
    }

    let prefs = Arc::new(JsonPreferenceStore::open_in_dir(dir.path()).unwrap());
    let profile = TestProfile::build(EngineConfig::default(), prefs, HookRegistry::new());
    let extension = profile.install(manifest()).unwrap();

    let data = extension.permissions_data();
    assert!(data.active_permissions().matches_url(&target));
    assert!(!data.active_permissions().matches_url(&url("https://www.example.com/")));
    assert!(profile.authority.has_withheld_host_permissions(&extension));
    assert!(!profile
        .authority
        .get_site_access(&extension, &url("https://blocked.example.com/"))
        .withheld_site_access);
}

#[tokio::test]
async fn withheld_stays_within_required_as_site_lists_change() {
    let profile = TestProfile::new();
    let narrow = profile
        .install(
            ExtensionBuilder::new("narrow")
                .add_permissions(["https://*.example.com/*", "tabs"])
                .add_optional_permission("https://optional.org/*")
                .with_creation_flags(CreationFlags::WITHHOLD_PERMISSIONS),
        )
        .unwrap();
    let broad = profile
        .install(
            ExtensionBuilder::new("broad")
                .add_permission("<all_urls>")
                .add_content_script_match("https://*.example.com/*")
                .with_creation_flags(CreationFlags::WITHHOLD_PERMISSIONS),
        )
        .unwrap();
    let disabled = profile
        .install(
            ExtensionBuilder::new("disabled")
                .add_permission("https://www.example.com/*")
                .with_creation_flags(CreationFlags::WITHHOLD_PERMISSIONS),
        )
        .unwrap();
    profile.context.extensions().disable(disabled.id()).unwrap();
    let all = [&narrow, &broad, &disabled];

    for site in ["https://www.example.com", "https://optional.org", "https://unrelated.net"] {
        profile
            .authority
            .add_permitted_site(&origin(site))
            .unwrap()
            .unwrap()
            .wait()
            .await;
        for extension in all {
            assert_invariants(extension);
        }
    }
    assert!(disabled
        .permissions_data()
        .active_permissions()
        .matches_url(&url("https://www.example.com/")));

    // A broad permitted list still only yields what each extension requested
    let everything = UrlPatternSet::parse_all(SchemeMask::HOST_PERMISSION, ["<all_urls>"]).unwrap();
    for extension in all {
        profile.authority.update_permissions_with_user_settings(extension, &everything);
        assert_invariants(extension);
    }
    assert!(!narrow
        .permissions_data()
        .active_permissions()
        .matches_url(&url("https://optional.org/")));

    profile
        .authority
        .add_restricted_site(&origin("https://www.example.com"))
        .unwrap()
        .unwrap()
        .wait()
        .await;
    profile
        .authority
        .remove_permitted_site(&origin("https://optional.org"))
        .unwrap()
        .unwrap()
        .wait()
        .await;
    for extension in all {
        assert_invariants(extension);
        assert!(!extension
            .permissions_data()
            .active_permissions()
            .matches_url(&url("https://www.example.com/")));
    }
}
