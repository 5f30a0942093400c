//! Utilities for logging.

use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::SubscriberBuilder;
use tracing_subscriber::fmt::format::{DefaultFields, Format};

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    HumanReadable,
    Json,
}

/// `RUST_LOG` directives take precedence over `default_level`.
fn builder(default_level: Level) -> SubscriberBuilder<DefaultFields, Format, EnvFilter> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    tracing_subscriber::fmt().with_env_filter(env_filter)
}

/// Configure the global logger.
///
/// Returns false if a global logger was already set, in which case this is
/// a no-op.
pub fn configure_global_logger(default_level: Level, format: LogFormat) -> bool {
    let builder = builder(default_level)
        .with_file(true)
        .with_line_number(true);

    let result = match format {
        LogFormat::HumanReadable => tracing::subscriber::set_global_default(builder.finish()),
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish()),
    };
    result.is_ok()
}

/// Initialize logging for tests. Output goes through the test writer so it's
/// only shown for failing tests.
pub fn init_test() {
    let subscriber = builder(Level::DEBUG).with_test_writer().finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}
