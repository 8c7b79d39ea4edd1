use std::env;
use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;
use url::Url;

use extension_permissions::authority::{PermissionAuthority, UserSiteAccess, UserSiteSetting};
use extension_permissions::core::EngineConfig;
use extension_permissions::extension::{Extension, ExtensionManifest};
use extension_permissions::logging;
use extension_permissions::patterns::SiteOrigin;
use extension_permissions::prefs::JsonPreferenceStore;
use extension_permissions::profile::{AuthorityRegistry, BrowserContext};
use extension_permissions::updater::PermissionsUpdater;

const USAGE: &str = "usage: extperm <prefs-dir> <manifests.json> <url> [config.json]";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _guard = logging::init_logging()?;

    let args: Vec<String> = env::args().collect();
    if args.len() < 4 {
        eprintln!("{}", USAGE);
        std::process::exit(2);
    }
    let url = Url::parse(&args[3]).with_context(|| format!("invalid url {}", args[3]))?;
    let config = match args.get(4) {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };

    let prefs = JsonPreferenceStore::open_in_dir(&args[1])?;
    let context = BrowserContext::builder()
        .with_config(config)
        .with_prefs(Arc::new(prefs))
        .build();
    let registry = AuthorityRegistry::new();
    let authority = registry.get_or_create(&context);
    let updater = PermissionsUpdater::new(authority.clone());

    let manifests = ExtensionManifest::load_all(&args[2])?;
    tracing::info!("[extperm] Loaded {} manifests", manifests.len());
    for manifest in &manifests {
        let extension = manifest.build(context.config())?;
        context.extensions().add_enabled(extension.clone());
        updater.initialize_permissions(&extension)?;
    }

    print_site_setting(&authority, &url);
    for extension in context.extensions().enabled_extensions() {
        print_extension(&authority, &extension, &url);
    }

    registry.shutdown(&context);
    Ok(())
}

fn print_site_setting(authority: &PermissionAuthority, url: &Url) {
    let Ok(origin) = SiteOrigin::from_url(url) else {
        println!("{} {}", "Site:".bold(), url.as_str().dimmed());
        return;
    };
    let setting = match authority.get_user_site_setting(&origin) {
        UserSiteSetting::GrantAllExtensions => "all extensions allowed".green(),
        UserSiteSetting::BlockAllExtensions => "all extensions blocked".red(),
        UserSiteSetting::CustomizeByExtension => "customized per extension".normal(),
    };
    println!("{} {} ({})", "Site:".bold(), origin, setting);
}

fn print_extension(authority: &PermissionAuthority, extension: &Extension, url: &Url) {
    let access = authority.get_site_access(extension, url);
    let site = if access.has_site_access {
        "granted".green()
    } else if access.withheld_site_access {
        "withheld".yellow()
    } else {
        "none".dimmed()
    };
    let all_sites = if access.has_all_sites_access {
        "granted".green()
    } else if access.withheld_all_sites_access {
        "withheld".yellow()
    } else {
        "none".dimmed()
    };
    let user_access = match authority.get_user_site_access(extension, url) {
        UserSiteAccess::OnClick => "on click",
        UserSiteAccess::OnSite => "on this site",
        UserSiteAccess::OnAllSites => "on all sites",
    };

    println!("{} {}", extension.name().cyan().bold(), format!("({})", extension.id()).dimmed());
    println!("  site access:      {}", site);
    println!("  all-sites access: {}", all_sites);
    println!("  runs:             {}", user_access);
    if authority.has_withheld_host_permissions(extension) {
        println!("  {}", "host permissions withheld".yellow());
    }
}
