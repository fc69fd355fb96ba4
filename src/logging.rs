//! Logging setup for the `zipbrowse` binary.
//!
//! Everything is logged through `tracing` and written to stderr so that
//! stdout stays clean for listings and entry bytes.
//!
//! `RUST_LOG` overrides the level chosen on the command line:
//! ```bash
//! RUST_LOG=zipbrowse=trace zipbrowse ls photos.zip
//! RUST_LOG=zipbrowse::io=debug zipbrowse cat https://host/a.zip readme.txt
//! ```

use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Map `-q`/`-v` counts to a level. The default shows warnings only.
pub fn level_for(quiet: u8, verbose: u8) -> Level {
    match (quiet, verbose) {
        (q, _) if q > 0 => Level::ERROR,
        (_, 0) => Level::WARN,
        (_, 1) => Level::INFO,
        (_, 2) => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Install the global subscriber. Calling it twice is harmless.
pub fn init(level: Level) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("zipbrowse={}", level.as_str().to_lowercase())));

    let subscriber = tracing_subscriber::registry().with(filter).with(
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(level >= Level::DEBUG)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .compact(),
    );

    let _ = tracing::subscriber::set_global_default(subscriber);
}
