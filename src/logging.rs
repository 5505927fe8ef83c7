//! Logger setup for the command line entry point.

use std::io::Write;

use chrono::Local;
use log::LevelFilter;

use crate::auth::{ACCESS_KEY_ID_VARS, ACCESS_KEY_SECRET_VARS, SECURITY_TOKEN_VAR};

pub const REDACTED: &str = "***REDACTED***";

/// Level requested on the command line; `RUST_LOG` still wins per module.
pub fn level_for(verbose: bool, quiet: bool) -> LevelFilter {
    if verbose {
        LevelFilter::Debug
    } else if quiet {
        LevelFilter::Warn
    } else {
        LevelFilter::Info
    }
}

/// Credential values present in the environment, longest first so a value
/// that contains another is replaced whole.
pub fn secret_values(lookup: &dyn Fn(&str) -> Option<String>) -> Vec<String> {
    let mut values: Vec<String> = ACCESS_KEY_ID_VARS
        .iter()
        .chain(ACCESS_KEY_SECRET_VARS.iter())
        .chain(std::iter::once(&SECURITY_TOKEN_VAR))
        .filter_map(|name| lookup(name))
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .collect();
    values.sort_unstable_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    values.dedup();
    values
}

pub fn redact(message: &str, secrets: &[String]) -> String {
    secrets
        .iter()
        .fold(message.to_string(), |line, secret| line.replace(secret.as_str(), REDACTED))
}

/// Installs the global logger. Safe to call more than once; later calls
/// leave the first logger in place.
pub fn init(verbose: bool, quiet: bool) {
    let secrets = secret_values(&|name: &str| std::env::var(name).ok());
    let mut builder = env_logger::Builder::new();
    builder
        .filter_level(level_for(verbose, quiet))
        .parse_default_env()
        .format(move |buf, record| {
            let message = redact(&record.args().to_string(), &secrets);
            writeln!(
                buf,
                "{} - {} - {} - {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.target(),
                record.level(),
                message
            )
        });
    if builder.try_init().is_err() {
        log::debug!("[logging] logger already initialized");
    }
}
