//! Process entry point: embeds CPython and runs the prediction workflow.

use std::io;
use std::process::ExitCode;

use anyhow::{Context, Error};
use dotenv::dotenv;
use modelo_host::{BootstrapConfig, DEFAULT_LOG_LEVEL, Invocation, PythonRuntime, bootstrap};
use tracing::debug;

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr; stdout belongs to the embedded workflow.
fn init_logging(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn fatal(err: Error) -> ExitCode {
    eprintln!("Fatal error: {err:#}");
    ExitCode::FAILURE
}

fn main() -> ExitCode {
    // Load environment variables from .env file
    dotenv().ok();

    let config = match BootstrapConfig::from_env().context("invalid host configuration") {
        Ok(config) => config,
        Err(err) => {
            init_logging(DEFAULT_LOG_LEVEL);
            return fatal(err);
        }
    };
    init_logging(&config.log_level);
    debug!(?config, "configuration loaded");

    let mut runtime = match PythonRuntime::new(&config).context("cannot prepare the interpreter") {
        Ok(runtime) => runtime,
        Err(err) => return fatal(err),
    };

    let invocation = Invocation::from_env();
    bootstrap::run(&mut runtime, &invocation, &config, &mut io::stderr()).into()
}
