use std::thread::JoinHandle;

use crossbeam::channel::unbounded;

use super::{
    initialize_log, take_log, JsonLinesLogger, LogError, LogInterface, LogProcessor, NullLogger,
};
use crate::config::LogInfo;

/// Owns the processor thread for one suite run.
/// The thread-local logger is installed on [LogSession::start] and removed when the session finishes or is dropped.
pub struct LogSession {
    handle: Option<JoinHandle<()>>,
}

impl LogSession {
    pub fn start(suite: &str, info: &LogInfo) -> Result<Self, LogError> {
        let filter = info.filter();
        filter.check()?;

        let (sender, receiver) = unbounded();
        let mut processor: Box<dyn LogProcessor> = match &info.path {
            Some(path) => Box::new(JsonLinesLogger::create(
                path.join(format!("{suite}.jsonl")),
                info.eager_flush,
                receiver,
            )?),
            None => Box::new(NullLogger::new(receiver)),
        };

        let handle = std::thread::Builder::new()
            .name(format!("log-processor({suite})"))
            .spawn(move || processor.spawn())
            .map_err(|source| LogError::Io {
                path: info.path.clone().unwrap_or_default(),
                source,
            })?;

        initialize_log(LogInterface::new(
            suite.to_string(),
            sender,
            std::time::Instant::now(),
            filter,
        ));

        Ok(Self {
            handle: Some(handle),
        })
    }

    /// Closes the channel and waits for the processor to drain it.
    pub fn finish(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        drop(take_log());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                eprintln!("Log processor thread panicked");
            }
        }
    }
}

impl Drop for LogSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(all(test, feature = "logging"))]
mod tests {
    use super::LogSession;
    use crate::{
        config::LogInfo,
        logging::{
            events::{ToolInvocation, VerdictEvent},
            record, LogError,
        },
    };

    #[test]
    fn filtered_events_land_in_the_suite_file() {
        let dir = tempfile::tempdir().unwrap();
        let info = LogInfo {
            path: Some(dir.path().to_path_buf()),
            include: Some(["verdict".to_string()].into_iter().collect()),
            eager_flush: true,
        };

        let session = LogSession::start("CodeGenerationX8664", &info).unwrap();
        record(&VerdictEvent {
            test_id: 4,
            percent_failed: 0.0,
            threshold: 0.1,
            passed: true,
        });
        record(&ToolInvocation {
            argv: vec!["make".into()],
            working_dir: "/tmp".into(),
            exit_code: Some(0),
            passed: true,
        });
        session.finish();

        let contents =
            std::fs::read_to_string(dir.path().join("CodeGenerationX8664.jsonl")).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 1);
        let entry: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(entry["event_type"], "verdict");
        assert_eq!(entry["suite"], "CodeGenerationX8664");
    }

    #[test]
    fn unknown_filter_names_refuse_to_start() {
        let info = LogInfo {
            include: Some(["nope".to_string()].into_iter().collect()),
            ..Default::default()
        };
        assert!(matches!(
            LogSession::start("s", &info),
            Err(LogError::InvalidFilter(_))
        ));
    }
}
