use clap::ValueEnum;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

use crate::error::{Error, ErrorKind, ListFailure};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Default filter directive for a `-v` count; `RUST_LOG` wins when set.
pub fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}

/// Installs the global subscriber, writing to stderr. Calling it twice is
/// harmless; the second call is ignored.
pub fn init(format: LogFormat, verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    let _ = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}

/// Diagnostic line for a failed lookup, split by cause.
pub fn report_failure(location: &str, err: &Error) {
    match err.kind() {
        ErrorKind::Listing(ListFailure::NoSuchBucket) => {
            warn!(location, error = %err, "s3 no such bucket");
        }
        ErrorKind::Listing(ListFailure::Request) => {
            warn!(location, error = %err, "s3 list-objects-v2 request failed");
        }
        ErrorKind::Config => {
            error!(location, error = %err, "unable to load object store config");
        }
        _ => {}
    }
}
