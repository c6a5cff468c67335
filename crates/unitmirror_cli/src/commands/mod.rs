//! CLI command implementations.

pub mod inspect;
pub mod publish;
pub mod reconcile;
pub mod sync;
pub mod verify;

use serde::Serialize;
use std::time::Duration;
use unitmirror_engine::EngineConfig;

/// Boxed error returned by every command.
pub type CommandResult = Result<(), Box<dyn std::error::Error>>;

/// Prints `value` as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> CommandResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Builds an engine configuration from command-line overrides.
pub fn engine_config(
    workers: Option<usize>,
    fetch_concurrency: Option<usize>,
    timeout_secs: Option<u64>,
) -> EngineConfig {
    let mut config = EngineConfig::new();
    if let Some(workers) = workers {
        config = config.with_workers(workers);
    }
    if let Some(concurrency) = fetch_concurrency {
        config = config.with_fetch_concurrency(concurrency);
    }
    if let Some(secs) = timeout_secs {
        config = config.with_timeout(Duration::from_secs(secs));
    }
    config
}
