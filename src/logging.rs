//! Logging setup
//!
//! Filter comes from `RUST_LOG`, defaulting to `extension_permissions=info`.
//! When `EXTPERM_LOG_DIR` is set, JSON logs also go to a daily rolling file
//! in that directory; keep the returned guard alive to flush it.

use std::env;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable naming the log directory
pub const LOG_DIR_ENV: &str = "EXTPERM_LOG_DIR";

const DEFAULT_FILTER: &str = "extension_permissions=info";
const LOG_FILE_PREFIX: &str = "extperm.log";

/// Install the global subscriber
pub fn init_logging() -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let console = fmt::layer().with_target(false).with_writer(std::io::stderr);

    match env::var_os(LOG_DIR_ENV) {
        Some(dir) => {
            std::fs::create_dir_all(&dir)?;
            let appender = tracing_appender::rolling::daily(&dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .with(fmt::layer().json().with_writer(writer))
                .try_init()?;
            tracing::debug!("[Logging] Writing logs to {:?}", dir);
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry().with(filter).with(console).try_init()?;
            Ok(None)
        }
    }
}
