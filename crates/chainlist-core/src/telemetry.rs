use std::io::IsTerminal;

use anyhow::anyhow;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Default directives for the embedding process: this crate at the level picked by the
/// verbosity counters, the HTTP stack and everything else only when it warns.
/// `RUST_LOG` replaces these entirely when set.
pub fn default_filter(verbose: u8, quiet: u8) -> String {
    let crate_level = match (verbose, quiet) {
        (_, q) if q >= 2 => "error",
        (_, 1) => "warn",
        (0, _) => "info",
        (1, _) => "debug",
        _ => "trace",
    };
    let others = if quiet >= 2 { "error" } else { "warn" };
    format!("{others},chainlist_core={crate_level}")
}

/// Installs a compact stderr subscriber. The client runs on one cooperative task, so
/// span context is more useful than thread ids; targets show from `-vv` on.
pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_filter(verbose, quiet))
            .map_err(|e| anyhow!("invalid chainlist log filter: {e}"))?,
    };

    let installed = tracing_subscriber::fmt()
        .compact()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(verbose >= 2)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = installed {
        debug!(error = %err, "subscriber already installed by the host; keeping it");
    }
    Ok(())
}
