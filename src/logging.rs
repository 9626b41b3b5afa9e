use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Chatty dependencies capped below the requested level.
const QUIET_TARGETS: &[&str] = &["hyper=warn", "reqwest=warn", "hf_hub=warn", "tokenizers=warn"];

/// Keeps the non-blocking file writer alive; drop it only at process exit.
pub struct FileLogGuard {
    _guard: WorkerGuard,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub filter: String,
    /// Set when `ENABLE_FILE_LOGS` is on; runs are long, so a daily file
    /// survives a detached terminal.
    pub file_dir: Option<PathBuf>,
    pub file_name: String,
}

impl LogSettings {
    pub fn from_env(log_level: &str, binary: &str) -> Self {
        let file_dir = file_logging_enabled().then(|| {
            std::env::var("LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./logs"))
        });
        Self {
            filter: filter_directives(log_level),
            file_dir,
            file_name: format!("{binary}.log"),
        }
    }
}

pub fn file_logging_enabled() -> bool {
    std::env::var("ENABLE_FILE_LOGS")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false)
}

/// Appends the dependency caps unless the caller already names a target.
pub fn filter_directives(log_level: &str) -> String {
    let level = log_level.trim();
    if level.is_empty() {
        return "info".to_string();
    }
    if level.contains('=') {
        return level.to_string();
    }
    std::iter::once(level)
        .chain(QUIET_TARGETS.iter().copied())
        .collect::<Vec<_>>()
        .join(",")
}

/// Installs the global subscriber for `binary` (`lexprobe` or `yesno-qa`).
pub fn init_tracing(log_level: &str, binary: &str) -> Option<FileLogGuard> {
    let settings = LogSettings::from_env(log_level, binary);
    let env_filter = EnvFilter::try_new(&settings.filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = fmt::layer().with_target(true);

    let Some(log_dir) = settings.file_dir else {
        tracing_subscriber::registry().with(env_filter).with(stdout_layer).init();
        return None;
    };

    match std::fs::create_dir_all(&log_dir) {
        Ok(()) => {
            let appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, &settings.file_name);
            let (file_writer, guard) = tracing_appender::non_blocking(appender);
            let file_layer = fmt::layer().with_writer(file_writer).with_ansi(false).with_target(true);
            tracing_subscriber::registry()
                .with(env_filter)
                .with(stdout_layer)
                .with(file_layer)
                .init();
            Some(FileLogGuard { _guard: guard })
        }
        Err(err) => {
            tracing_subscriber::registry().with(env_filter).with(stdout_layer).init();
            tracing::warn!(dir = %log_dir.display(), error = %err, "file logging disabled");
            None
        }
    }
}
