//! Tracing initialisation for hosts embedding the pipeline.
//!
//! Without `RUST_LOG`, the forgegate crates log at the requested level and
//! everything else (tokio, hosts' own dependencies) at `warn`.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Crates whose events follow the configured level.
pub const LOG_TARGETS: [&str; 2] = ["forgegate_core", "forgegate_pipeline"];

/// Filter directives used when `RUST_LOG` is unset, e.g.
/// `warn,forgegate_core=debug,forgegate_pipeline=debug`.
pub fn default_directives(level: Level) -> String {
    let level = level.as_str().to_ascii_lowercase();
    let mut directives = String::from("warn");
    for target in LOG_TARGETS {
        directives.push_str(&format!(",{target}={level}"));
    }
    directives
}

/// Initialise the global tracing subscriber. Only the first call in a
/// process takes effect.
///
/// JSON output keeps event targets so aggregators can split the review and
/// correction streams; the text format drops them.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(fmt::layer().with_target(true).json())
            .try_init()
            .ok();
    } else {
        registry.with(fmt::layer().with_target(false)).try_init().ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives_scope_level_to_forgegate() {
        assert_eq!(
            default_directives(Level::DEBUG),
            "warn,forgegate_core=debug,forgegate_pipeline=debug"
        );
        assert!(default_directives(Level::TRACE).ends_with("forgegate_pipeline=trace"));
        assert!(EnvFilter::try_new(default_directives(Level::INFO)).is_ok());
    }

    #[test]
    fn test_init_tracing_is_idempotent() {
        init_tracing(false, Level::DEBUG);
        init_tracing(true, Level::INFO);
        tracing::info!("still logging after repeated init");
    }
}
