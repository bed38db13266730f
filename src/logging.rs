// Logging setup. Diagnostics go through `tracing` to stderr; user-facing
// results are printed directly by the front ends.

use tracing_subscriber::{fmt, EnvFilter};

/// How chatty the run should be. Built once from `--debug` and passed down
/// to whatever needs to decide about optional warnings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Verbosity {
    #[default]
    Normal,
    Debug,
}

impl Verbosity {
    pub fn from_debug_flag(debug: bool) -> Self {
        if debug {
            Verbosity::Debug
        } else {
            Verbosity::Normal
        }
    }

    pub fn is_debug(self) -> bool {
        self == Verbosity::Debug
    }

    fn default_filter(self) -> &'static str {
        match self {
            Verbosity::Normal => "warn",
            Verbosity::Debug => "scratch_cli=debug,warn",
        }
    }
}

/// Install the global subscriber. `RUST_LOG` wins over `verbosity`.
pub fn init(verbosity: Verbosity) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.default_filter()));
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbosity.is_debug())
        .try_init();
}
