use std::env;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "REPLYVIEW_LOG";
pub const LOG_FILE_ENV: &str = "REPLYVIEW_LOG_FILE";

static LOGGING_INIT: OnceCell<()> = OnceCell::new();

/// Installs the global subscriber once. Logging stays off unless `REPLYVIEW_LOG` is set.
pub fn init() {
    let Some(filter) = env::var(LOG_ENV).ok().and_then(|value| filter_directives(&value)) else {
        return;
    };

    LOGGING_INIT.get_or_init(|| {
        let filter = EnvFilter::try_new(&filter).unwrap_or_else(|_| EnvFilter::new("replyview=debug"));
        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true);

        match log_file_path() {
            Some(path) => {
                let file = match OpenOptions::new().create(true).append(true).open(&path) {
                    Ok(file) => file,
                    Err(err) => {
                        eprintln!("replyview: cannot open log file {}: {err}", path.display());
                        return;
                    }
                };
                let _ = builder
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .try_init();
            }
            None => {
                let _ = builder.with_writer(std::io::stderr).try_init();
            }
        }
    });
}

fn log_file_path() -> Option<PathBuf> {
    env::var(LOG_FILE_ENV)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

/// Maps the `REPLYVIEW_LOG` value to filter directives. `None` means logging is off.
fn filter_directives(value: &str) -> Option<String> {
    let value = value.trim();
    match value.to_ascii_lowercase().as_str() {
        "" | "0" | "false" | "no" | "off" => None,
        "1" | "true" | "yes" | "on" => Some("replyview=debug".to_string()),
        _ => Some(value.to_string()),
    }
}
