//! Logging setup. A trimmed-down descendant of the reference runner's
//! telemetry module: it keeps the `tracing` + `EnvFilter` console layer and
//! drops the OpenTelemetry/OTLP exporter wiring entirely — a headless
//! authoring tool has no collector to export spans to.

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Initializes a console `tracing` subscriber. `level` is used only when
/// `RUST_LOG` is unset; once set, `RUST_LOG` always wins.
pub fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

pub fn level_from_flags(silent: bool, verbose: bool) -> Level {
    if silent {
        Level::ERROR
    } else if verbose {
        Level::DEBUG
    } else {
        Level::INFO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_from_flags_prioritizes_silent_over_verbose() {
        assert_eq!(level_from_flags(true, true), Level::ERROR);
        assert_eq!(level_from_flags(false, true), Level::DEBUG);
        assert_eq!(level_from_flags(false, false), Level::INFO);
    }
}
