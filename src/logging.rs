//! Tracing subscriber setup for the CLI.
//!
//! # Priority (highest to lowest)
//!
//! 1. `ROLODEX_LOG` env var (per-target directives, e.g. `rolodex=debug`)
//! 2. `RUST_LOG` env var
//! 3. `--verbose` flag: `debug` for this crate, `warn` elsewhere
//! 4. Default level: `warn`
//!
//! Logs go to stderr so that `--json` output on stdout stays parseable.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

/// Environment variable with log directives for this crate.
pub const LOG_ENV: &str = "ROLODEX_LOG";

/// Installs the global subscriber. Later calls are ignored.
pub fn init_subscriber(verbose: bool) {
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(std::io::IsTerminal::is_terminal(&std::io::stderr()))
        .with_target(verbose)
        .without_time()
        .compact();

    let _ = tracing_subscriber::registry()
        .with(build_env_filter(verbose))
        .with(fmt_layer)
        .try_init();
}

fn build_env_filter(verbose: bool) -> EnvFilter {
    // Unparseable directives fall through to the next source.
    if let Ok(directives) = std::env::var(LOG_ENV)
        && let Ok(filter) = EnvFilter::try_new(&directives)
    {
        return filter;
    }

    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    EnvFilter::new(default_directives(verbose))
}

fn default_directives(verbose: bool) -> &'static str {
    if verbose { "warn,rolodex=debug" } else { "warn" }
}
