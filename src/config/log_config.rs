use std::{collections::HashSet, path::PathBuf};

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use toml::{Table, Value};

use crate::logging::{registry::METRICS, LogFilter};

#[derive(Clone, Debug, Default)]
pub struct LogInfo {
    pub path: Option<PathBuf>,
    /// None enables every event.
    pub include: Option<HashSet<String>>,
    pub eager_flush: bool,
}

impl LogInfo {
    pub fn filter(&self) -> LogFilter {
        match &self.include {
            None => LogFilter::AllowAll,
            Some(include) => LogFilter::Some(FxHashSet::from_iter(include.iter().cloned())),
        }
    }
}

// Keys of log_options are event names; a value of true enables that event.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct LogConfig {
    path: Option<String>,
    log_options: Option<Table>,
    eager_flush: Option<bool>,
}

impl LogConfig {
    pub fn validate(&self) -> bool {
        if let Some(options) = &self.log_options {
            let all_bools = options.iter().all(|(_k, v)| matches!(v, Value::Boolean(_)));
            if !all_bools {
                return false;
            }

            // Check if all of the keys are in METRICS
            return options.iter().all(|(k, _)| METRICS.contains(&k.as_str()));
        }
        true
    }

    pub fn update(&mut self, other: LogConfig) {
        // Relative paths nest inside the path we already have.
        let new_path = match (&self.path, &other.path) {
            (None, None) => None,
            (None, Some(path)) => Some(path.clone()),
            (Some(path), None) => Some(path.clone()),
            (Some(a), Some(b)) => {
                let mut pb = PathBuf::new();
                pb.push(a);
                pb.push(b);
                pb.to_str().map(|x| x.to_string())
            }
        };
        self.path = new_path;
        match (&mut self.log_options, &other.log_options) {
            (None, None) => {}
            (None, Some(options)) => self.log_options = Some(options.clone()),
            (Some(_), None) => {}
            (Some(base), Some(new)) => base.extend(new.clone()),
        }
        if other.eager_flush.is_some() {
            self.eager_flush = other.eager_flush;
        }
    }
}

impl From<LogConfig> for LogInfo {
    fn from(value: LogConfig) -> Self {
        let include = value.log_options.map(|options| {
            options
                .into_iter()
                .filter(|(_, v)| matches!(v, Value::Boolean(true)))
                .map(|(k, _)| k)
                .collect()
        });

        Self {
            path: value.path.map(PathBuf::from),
            include,
            eager_flush: value.eager_flush.unwrap_or(false),
        }
    }
}
