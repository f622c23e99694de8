use crate::config_manager::LoggingConfig;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

/// Output layout for log lines, from `logging.format`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Compact,
    Json,
}

impl LogFormat {
    /// Unknown names fall back to `Pretty`; validation rejects them earlier.
    pub fn parse(name: &str) -> Self {
        match name {
            "json" => LogFormat::Json,
            "compact" => LogFormat::Compact,
            _ => LogFormat::Pretty,
        }
    }
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins when it parses as a filter; otherwise the configured level
/// applies to our crates and `tower_http`. Calling this twice is harmless, the
/// second install is ignored.
pub fn init_tracing(config: &LoggingConfig) {
    let fallback = format!(
        "aidev_core={lvl},aidev_cache={lvl},aidev_ai={lvl},aidev_api={lvl},aidev={lvl},tower_http={lvl}",
        lvl = config.level
    );
    let env_filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&fallback));

    let installed = match LogFormat::parse(&config.format) {
        LogFormat::Json => tracing::subscriber::set_global_default(
            Registry::default()
                .with(env_filter())
                .with(fmt::layer().json()),
        ),
        LogFormat::Compact => tracing::subscriber::set_global_default(
            Registry::default()
                .with(env_filter())
                .with(fmt::layer().compact()),
        ),
        LogFormat::Pretty => tracing::subscriber::set_global_default(
            Registry::default()
                .with(env_filter())
                .with(fmt::layer().pretty()),
        ),
    };

    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
