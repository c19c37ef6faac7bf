//! Tracing initialisation for svcaudit binaries.
//!
//! Library code never installs a subscriber; it logs through `tracing` under
//! the span handed to each [`Auditor`](crate::auditor::Auditor).

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Default verbosity for a CLI `--verbose` flag.
pub fn level_for(verbose: bool) -> Level {
    if verbose {
        Level::DEBUG
    } else {
        Level::INFO
    }
}

/// Install the global subscriber, writing to stderr so stdout stays free for
/// reports.
///
/// `RUST_LOG` overrides `level` when set. With `json`, each event is one JSON
/// line. Later calls are no-ops.
pub fn init_tracing(json: bool, level: Level) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let layer = fmt::layer().with_target(false).with_writer(std::io::stderr);
    let registry = tracing_subscriber::registry().with(filter);

    let installed = if json {
        registry.with(layer.json()).try_init()
    } else {
        registry.with(layer).try_init()
    };
    // A subscriber set by an embedding program or an earlier call wins.
    installed.ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_for_verbose_flag() {
        assert_eq!(level_for(true), Level::DEBUG);
        assert_eq!(level_for(false), Level::INFO);
    }

    #[test]
    fn test_repeated_init_is_harmless() {
        init_tracing(false, Level::WARN);
        init_tracing(true, Level::DEBUG);
        tracing::info!("still logging");
    }
}
