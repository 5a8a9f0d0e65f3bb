//! Tracing subscriber initialization.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize structured logging.
///
/// `RUST_LOG` wins when set; otherwise the configured level applies to the
/// workspace crates and `info` to everything else.
pub fn init(log_level: &str) {
    let default_filter = format!(
        "info,jamboree={log_level},setlist={log_level},bounce={log_level},\
         stash={log_level},music_plan={log_level}"
    );
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
