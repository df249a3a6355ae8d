//! Writes [LogEntry] values as JSON lines.
//!
//! The JsonLinesLogger takes in a [crossbeam::channel::Receiver] containing [LogEntry] and appends one line per entry.

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use crossbeam::channel::Receiver;

use super::{LogEntry, LogError, LogProcessor};

/// A logger writing newline-delimited JSON into a single file.
pub struct JsonLinesLogger {
    path: PathBuf,
    writer: BufWriter<File>,
    eager_flush: bool,
    queue: Receiver<LogEntry>,
}

impl JsonLinesLogger {
    pub fn create(
        path: impl AsRef<Path>,
        eager_flush: bool,
        queue: Receiver<LogEntry>,
    ) -> Result<Self, LogError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| LogError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let file = File::create(&path).map_err(|source| LogError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
            eager_flush,
            queue,
        })
    }

    fn write_entry(&mut self, entry: &LogEntry) -> std::io::Result<()> {
        serde_json::to_writer(&mut self.writer, entry)?;
        self.writer.write_all(b"\n")?;
        if self.eager_flush {
            self.writer.flush()?;
        }
        Ok(())
    }
}

impl LogProcessor for JsonLinesLogger {
    fn spawn(&mut self) {
        while let Ok(entry) = self.queue.recv() {
            if let Err(err) = self.write_entry(&entry) {
                eprintln!("Dropping log entry for {:?}: {err}", self.path);
            }
        }
        if let Err(err) = self.writer.flush() {
            eprintln!("Failed to flush log {:?}: {err}", self.path);
        }
    }
}
