//! Log output for the binaries.
//!
//! Events go to stderr as one JSON object per line, leaving stdout to the CLI's own output.
//! `SEEKABLE_LOG` takes `EnvFilter` directives (e.g. `SEEKABLE_LOG=seekable=debug,reqwest=warn`)
//! and replaces the caller's default level when set.

use std::io;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const FILTER_VAR: &str = "SEEKABLE_LOG";

/// Install the process-wide subscriber. Only the first call has any effect.
pub fn init(default_level: LevelFilter) {
    let directives = std::env::var(FILTER_VAR).unwrap_or_default();

    let _ = tracing_subscriber::registry()
        .with(filter(&directives, default_level))
        .with(
            fmt::layer()
                .json()
                .flatten_event(true)
                .with_target(true)
                .with_writer(io::stderr),
        )
        .try_init();
}

/// Map `-v` repetitions onto a level.
pub fn level_for_verbosity(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::ERROR,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

// Unparseable directives are dropped rather than failing startup.
fn filter(directives: &str, default_level: LevelFilter) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(default_level.into())
        .parse_lossy(directives)
}
