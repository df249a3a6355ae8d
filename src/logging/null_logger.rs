use super::{LogEntry, LogProcessor};
use crossbeam::channel::Receiver;

/// Drains the queue and drops every entry.
pub struct NullLogger {
    queue: Receiver<LogEntry>,
}

impl NullLogger {
    pub fn new(queue: Receiver<LogEntry>) -> Self {
        Self { queue }
    }
}

impl LogProcessor for NullLogger {
    fn spawn(&mut self) {
        // Keep receiving until every sender is gone so senders never observe a closed channel.
        while self.queue.recv().is_ok() {}
    }
}
