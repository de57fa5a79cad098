use std::sync::OnceLock;

use tracing_subscriber::{fmt, EnvFilter};

static LOGGER_INIT: OnceLock<()> = OnceLock::new();

/// Install the global tracing subscriber once. `RUST_LOG` wins over `verbose`.
pub fn init_logging(verbose: bool) {
    LOGGER_INIT.get_or_init(|| {
        let default_level = if verbose { "debug" } else { "info" };
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_level));

        // try_init so tests and embedders that already installed one don't panic
        let _ = fmt()
            .with_env_filter(filter)
            .with_target(verbose)
            .with_line_number(verbose)
            .try_init();

        tracing::debug!("logger initialized");
    });
}
