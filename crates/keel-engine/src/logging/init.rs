use std::sync::Once;

/// Logger configuration.
///
/// `env_filter` follows the `env_logger` filter syntax (e.g. "info", "warn",
/// "keel_engine=debug,wgpu=warn").
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub env_filter: Option<String>,

    /// ANSI coloring on desktop.
    pub write_style: env_logger::WriteStyle,

    /// Logcat tag on Android.
    pub tag: String,

    /// Maximum level on Android, where there is no environment to read a
    /// filter from.
    pub android_level: log::LevelFilter,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            env_filter: None,
            write_style: env_logger::WriteStyle::Auto,
            tag: "keel".to_string(),
            android_level: log::LevelFilter::Debug,
        }
    }
}

static INIT: Once = Once::new();

/// Initializes the global logger once.
///
/// Later calls are ignored. Call early in `main` (or the activity entry point).
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        install(config);
        log::debug!("logging initialized");
    });
}

#[cfg(target_os = "android")]
fn install(config: LoggingConfig) {
    let mut android = android_logger::Config::default()
        .with_max_level(config.android_level)
        .with_tag(config.tag);

    if let Some(filter) = config.env_filter {
        android = android.with_filter(
            android_logger::FilterBuilder::new()
                .parse(&filter)
                .build(),
        );
    }

    android_logger::init_once(android);
}

#[cfg(not(target_os = "android"))]
fn install(config: LoggingConfig) {
    let mut builder = env_logger::Builder::new();

    if let Some(filter) = config.env_filter {
        builder.parse_filters(&filter);
    } else if let Ok(filter) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filter);
    } else {
        builder.filter_level(log::LevelFilter::Info);
    }

    builder.write_style(config.write_style);

    // Another logger may already be installed (e.g. by a test harness).
    if builder.try_init().is_err() {
        log::debug!("a global logger was already installed");
    }
}
