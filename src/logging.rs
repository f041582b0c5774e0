use once_cell::sync::OnceCell;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

// Keeps the non-blocking writer flushing for the lifetime of the process.
static LOG_GUARD: OnceCell<WorkerGuard> = OnceCell::new();

/// Initialise logging. The default level is `info`; enabling `debug` in the
/// settings file switches to `debug` level. The level can be overridden via
/// the `RUST_LOG` environment variable only when debug logging is enabled.
pub fn init(debug: bool, log_file: Option<PathBuf>) {
    // When debug logging is disabled we force `info` level regardless of the
    // `RUST_LOG` environment variable. This prevents accidental verbose output
    // if the variable happens to be set in the user's environment.
    let level = if debug { "debug" } else { "info" };

    let filter = if debug {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    } else {
        EnvFilter::new(level)
    };

    if let Some(path) = log_file {
        match std::fs::File::create(&path) {
            Ok(file) => {
                let (writer, guard) = tracing_appender::non_blocking(file);
                let _ = LOG_GUARD.set(guard);
                let _ = tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .with_writer(writer)
                    .with_ansi(false)
                    .try_init();
                return;
            }
            Err(err) => eprintln!("failed to create log file {}: {err}", path.display()),
        }
    }

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init();
}
