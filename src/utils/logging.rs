use tracing_subscriber::EnvFilter;

/// Environment variable holding a `tracing` filter directive.
pub const LOG_ENV: &str = "FLEXGPT_LOG";

pub fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "flexgpt=debug"
    } else {
        "flexgpt=warn"
    }
}

/// Install the stderr subscriber. Stdout is reserved for chat output.
///
/// Calling this twice is harmless; the second install is ignored.
pub fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
