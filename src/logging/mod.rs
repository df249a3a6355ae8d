//! Structured event logging for harness runs.
//! Every tool invocation, build stage and verdict can be recorded as an event, serialized to BSON and
//! handed to a [LogProcessor] running on its own thread.
//! Runs over a full architecture matrix produce a few hundred events, so processors write eagerly rather than batching.

use bson::Bson;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::num::TryFromIntError;
use thiserror::Error;

// Adds a logger that does nothing.
mod null_logger;
pub use null_logger::*;

mod json_logger;
pub use json_logger::*;

mod log_interface;
pub use log_interface::LogInterface;

mod log_functions;
pub use log_functions::*;

mod session;
pub use session::LogSession;

pub mod events;

use self::registry::{get_metrics_vec, METRICS};

/// Handles the registering/checking of LogEntry names
pub mod registry;

/// Errors which may occur when attempting to log.
#[derive(Error, Debug)]
pub enum LogError {
    /// Attempted to convert the elapsed time (in us) to i64. This is unlikely to ever happen.
    #[error("Error converting time into i64. Did we run out of time?")]
    TimeConversionError(TryFromIntError),

    /// The processor side of the channel is gone, so the event will never be seen.
    #[error("Could not send event! Were LogProcessors registered?")]
    SendError,

    /// The filter that was registered wasn't valid -- some of the filter types weren't registered.
    #[error(
        "Invalid Log Filter Defined: {0:?} were not registered filters! Options: {:?}",
        get_metrics_vec()
    )]
    InvalidFilter(Vec<String>),

    /// Failed to convert the message into bson.
    #[error("Serialization Error")]
    SerializationError(bson::ser::Error),

    /// The log file could not be created or written.
    #[error("Could not write log to {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
}

/// A real log entry, which is eventually serialized to some actual log.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LogEntry {
    /// Time in microseconds since the logging session started
    pub(crate) timestamp: i64,

    /// Name of the suite that produced the event
    pub(crate) suite: String,

    /// String name of the logging event type
    pub(crate) event_type: String,

    /// The actual data of the event
    pub(crate) event_data: Bson,
}

impl LogEntry {
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn suite(&self) -> &str {
        &self.suite
    }

    pub fn event_data(&self) -> &Bson {
        &self.event_data
    }
}

/// All logs types must expose a name, which is used by filters.
pub trait LogEvent: Serialize {
    /// The declared name of the logging type. This is used to report the event type in the [LogEntry], as well as check filters in [LogFilter]
    const NAME: &'static str;
}

/// Log Processors are responsible for processing logs (i.e. writing them to a file).
pub trait LogProcessor: Send {
    /// Starts the logging job, invoked within a dedicated thread.
    fn spawn(&mut self);
}

/// Log filtering policies
#[derive(Debug, Default, Clone)]
pub enum LogFilter {
    /// Enables ALL logging
    #[default]
    AllowAll,

    /// Only enable a subset of logs, based on their registered LogEvent::NAME
    Some(FxHashSet<String>),
}

impl LogFilter {
    /// Checks to see if all elements of the LogFilter are actually registered metrics.
    pub fn check(&self) -> Result<(), LogError> {
        match self {
            LogFilter::AllowAll => Ok(()),
            LogFilter::Some(set) => {
                let mut invalids: Vec<_> = set
                    .iter()
                    .filter(|key| !METRICS.contains(&key.as_str()))
                    .cloned()
                    .collect();
                if invalids.is_empty() {
                    Ok(())
                } else {
                    invalids.sort();
                    Err(LogError::InvalidFilter(invalids))
                }
            }
        }
    }

    /// Checks to see if a log type T is enabled, without actually requiring an instance of T.
    /// This allows checking even when the event is a callback.
    pub fn enabled<T: LogEvent>(&self) -> bool {
        match self {
            LogFilter::AllowAll => true,
            LogFilter::Some(filter) if filter.contains(T::NAME) => true,
            LogFilter::Some(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use rustc_hash::FxHashSet;

    use super::{events::VerdictEvent, LogError, LogEvent, LogFilter};

    #[test]
    fn filter_rejects_unregistered_names() {
        let filter = LogFilter::Some(FxHashSet::from_iter([
            "verdict".to_string(),
            "not-a-metric".to_string(),
        ]));
        match filter.check() {
            Err(LogError::InvalidFilter(names)) => assert_eq!(names, vec!["not-a-metric"]),
            other => panic!("Expected an invalid filter, got {other:?}"),
        }
    }

    #[test]
    fn filter_gates_by_name() {
        let filter = LogFilter::Some(FxHashSet::from_iter([VerdictEvent::NAME.to_string()]));
        assert!(filter.check().is_ok());
        assert!(filter.enabled::<VerdictEvent>());
        assert!(!filter.enabled::<super::events::ToolInvocation>());
        assert!(LogFilter::AllowAll.enabled::<super::events::ToolInvocation>());
    }
}
