//! Tracing setup: human-readable stderr logs, or JSON lines to a file.

use crate::error::Result;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::{Mutex, OnceLock};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::UtcTime;

/// Environment variable holding an `EnvFilter` directive, e.g. `parley=debug`.
pub const LOG_ENV: &str = "PARLEY_LOG";

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Filter used when `PARLEY_LOG` is unset.
pub fn default_directive(verbosity: u8, quiet: bool) -> &'static str {
    if quiet {
        return "error";
    }
    match verbosity {
        0 => "warn",
        1 => "parley=info,warn",
        2 => "parley=debug,info",
        _ => "parley=trace,debug",
    }
}

fn env_filter(verbosity: u8, quiet: bool) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity, quiet)))
}

fn init_tracing_once(
    verbosity: u8,
    quiet: bool,
    log_file: Option<&Path>,
    once: &OnceLock<()>,
) -> Result<()> {
    if once.get().is_some() {
        return Ok(());
    }
    let filter = env_filter(verbosity, quiet);

    let installed = match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            let subscriber = tracing_subscriber::fmt()
                .json()
                .with_timer(UtcTime::rfc_3339())
                .with_env_filter(filter)
                .with_writer(Mutex::new(file))
                .with_current_span(false)
                .with_span_list(false)
                .finish();
            tracing::subscriber::set_global_default(subscriber)
        }
        None => {
            let subscriber = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .finish();
            tracing::subscriber::set_global_default(subscriber)
        }
    };
    // Another subscriber (e.g. a test harness) may already be installed.
    if installed.is_err() {
        tracing::debug!("global tracing subscriber already set");
    }
    once.get_or_init(|| ());
    Ok(())
}

/// Install the global subscriber. Later calls are no-ops.
///
/// # Errors
/// Returns an I/O error if `log_file` cannot be opened for appending
pub fn init_tracing(verbosity: u8, quiet: bool, log_file: Option<&Path>) -> Result<()> {
    init_tracing_once(verbosity, quiet, log_file, &TRACING_INIT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive_follows_verbosity() {
        assert_eq!(default_directive(0, false), "warn");
        assert_eq!(default_directive(1, false), "parley=info,warn");
        assert_eq!(default_directive(2, false), "parley=debug,info");
        assert_eq!(default_directive(9, false), "parley=trace,debug");
        assert_eq!(default_directive(3, true), "error");
    }

    #[test]
    fn test_log_file_is_created_and_second_init_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parley.jsonl");
        let once = OnceLock::new();

        init_tracing_once(1, false, Some(&path), &once).unwrap();
        assert!(path.exists());

        let other = dir.path().join("unused.jsonl");
        init_tracing_once(1, false, Some(&other), &once).unwrap();
        assert!(!other.exists());
    }

    #[test]
    fn test_unwritable_log_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("parley.jsonl");
        let once = OnceLock::new();
        assert!(init_tracing_once(0, false, Some(&path), &once).is_err());
        assert!(once.get().is_none());
    }
}
