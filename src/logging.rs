//! Tracing subscriber setup for the `tut` binary.
//!
//! Log lines go to stderr so stdout stays free for command output. The
//! filter comes from `RUST_LOG` when set, otherwise from `--verbose`.

use std::io::IsTerminal;

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Filter used when `RUST_LOG` is not set.
pub fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "tutorial_harness=debug,info"
    } else {
        "tutorial_harness=info,warn"
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_tracing(verbose: bool) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter(verbose)))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let ansi = std::io::stderr().is_terminal() && std::env::var_os("NO_COLOR").is_none();
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(ansi)
        .with_target(verbose)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false);

    let layer = if verbose {
        layer.with_span_events(FmtSpan::CLOSE)
    } else {
        layer.with_span_events(FmtSpan::NONE)
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layer.compact())
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filters_parse() {
        for verbose in [false, true] {
            assert!(EnvFilter::try_new(default_filter(verbose)).is_ok());
        }
    }
}
