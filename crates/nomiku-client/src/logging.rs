//! Optional `tracing` subscriber setup for applications embedding the client.
//!
//! The library itself only emits `tracing` events; session diagnostics use
//! the `nomiku` target at `info` level and are only produced while the
//! session's debug flag is on.

use tracing_subscriber::EnvFilter;

use crate::config::{env_parse, env_vars};

/// Filter directives used when `RUST_LOG` is unset.
pub const DEFAULT_DIRECTIVES: &str = "nomiku=info";

/// The filter applied when `RUST_LOG` is unset: `nomiku=info`, `warn` elsewhere.
pub fn default_filter() -> EnvFilter {
    EnvFilter::new(DEFAULT_DIRECTIVES).add_directive(tracing::Level::WARN.into())
}

/// Install a global fmt subscriber.
///
/// Honors `RUST_LOG` (see [`default_filter`] otherwise) and switches to JSON
/// lines when `NOMIKU_LOG_JSON=true`. Returns `false` if a subscriber was
/// already set.
pub fn init_tracing() -> bool {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter());

    let json_logging = env_parse::<bool>(env_vars::LOG_JSON).unwrap_or(false);

    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .try_init()
            .is_ok()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .compact()
            .try_init()
            .is_ok()
    }
}
