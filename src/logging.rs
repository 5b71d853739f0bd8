use crate::error::AppError;
use crate::feed::types::{RenderMode, ViewerConfig};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

pub const DEFAULT_LOG_FILTER: &str = "prosumer_view_lib=info";

/// Where log records go. stdout is never a target: it belongs to the
/// renderer, and the terminal backend owns the tty too.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    Stderr,
    File(PathBuf),
}

impl LogTarget {
    pub fn for_config(config: &ViewerConfig) -> Self {
        match config.render_mode {
            RenderMode::Terminal => Self::File(config.log_file.clone()),
            RenderMode::Events | RenderMode::Headless => Self::Stderr,
        }
    }

    pub fn make_writer(&self) -> Result<BoxMakeWriter, AppError> {
        match self {
            Self::Stderr => Ok(BoxMakeWriter::new(std::io::stderr)),
            Self::File(path) => {
                let file = OpenOptions::new().create(true).append(true).open(path)?;
                Ok(BoxMakeWriter::new(Mutex::new(file)))
            }
        }
    }
}

pub fn init_tracing(target: &LogTarget) -> Result<(), AppError> {
    let writer = target.make_writer()?;
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    // A subscriber may already be installed (tests, embedding); keep it.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(matches!(target, LogTarget::Stderr))
        .with_target(false)
        .try_init();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::types::ViewerArgs;
    use std::io::Write;
    use tracing_subscriber::fmt::MakeWriter;

    fn config_for(render_mode: &str, log_file: &str) -> ViewerConfig {
        ViewerArgs {
            endpoint: None,
            render_mode: Some(render_mode.to_string()),
            mock_mode: None,
            log_file: Some(log_file.to_string()),
        }
        .normalize()
        .expect("args should be valid")
    }

    #[test]
    fn terminal_mode_logs_to_file() {
        let config = config_for("terminal", "/var/tmp/viewer.log");
        assert_eq!(
            LogTarget::for_config(&config),
            LogTarget::File(PathBuf::from("/var/tmp/viewer.log"))
        );
    }

    #[test]
    fn stream_modes_log_to_stderr() {
        for mode in ["events", "headless"] {
            let config = config_for(mode, "/var/tmp/viewer.log");
            assert_eq!(LogTarget::for_config(&config), LogTarget::Stderr);
        }
    }

    #[test]
    fn file_target_appends_records() {
        let path = std::env::temp_dir().join(format!(
            "prosumer-view-log-{}.log",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);

        let target = LogTarget::File(path.clone());
        for line in ["first\n", "second\n"] {
            let make_writer = target.make_writer().expect("log file should open");
            make_writer
                .make_writer()
                .write_all(line.as_bytes())
                .expect("log line should be written");
        }

        let contents = std::fs::read_to_string(&path).expect("log file should exist");
        let _ = std::fs::remove_file(&path);
        assert_eq!(contents, "first\nsecond\n");
    }

    #[test]
    fn unopenable_log_file_is_an_error() {
        let missing_dir =
            std::env::temp_dir().join(format!("prosumer-view-missing-{}", std::process::id()));
        let target = LogTarget::File(missing_dir.join("viewer.log"));
        assert!(matches!(target.make_writer(), Err(AppError::Io(_))));
    }
}
