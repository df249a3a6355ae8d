use cfg_if::cfg_if;

use super::{LogError, LogEvent};
use crate::logging::LogInterface;

// The harness runs every case on the calling thread, so the logger lives in a thread-local.
cfg_if! {
    if #[cfg(feature = "logging")] {
        use parking_lot::Mutex;

        thread_local! {
            static LOGGER: Mutex<Option<LogInterface>> = Default::default();
        }
    }
}

cfg_if! {
    if #[cfg(feature = "logging")] {

        /// Logs with a callback. This should be used when constructing the event is expensive.
        /// The callback is only invoked if the logger is set AND the filter permits the event.
        #[inline]
        pub fn log_event_cb<T: LogEvent, F>(callback: F) -> Result<(), LogError>
        where
            F: FnOnce() -> T,
        {
            LOGGER.with(|logger| match logger.lock().as_ref() {
                Some(interface) if interface.log_filter.enabled::<T>() => interface.log(&callback()),
                Some(_) => Ok(()),
                None => Ok(()),
            })
        }

        /// Standard logging method, which logs to the underlying logger.
        #[inline]
        pub fn log_event<T: LogEvent>(event: &T) -> Result<(), LogError> {
            LOGGER.with(|logger| match logger.lock().as_ref() {
                Some(interface) if interface.log_filter.enabled::<T>() => interface.log(event),
                Some(_) => Ok(()),
                None => Ok(()),
            })
        }

        /// Initializes the thread-local log with a specific logger.
        pub fn initialize_log(logger: LogInterface) {
            LOGGER.with(|lg| { *lg.lock() = Some(logger); })
        }

        /// Removes the thread-local logger, closing this thread's side of the channel.
        pub fn take_log() -> Option<LogInterface> {
            LOGGER.with(|cur_logger| cur_logger.lock().take())
        }

    } else {
        // Marked as allow(unused) so that we can keep the same signature and names.

        /// No-op without logging enabled
        #[allow(unused)]
        #[inline]
        pub fn log_event_cb<T: LogEvent, F>(callback: F) -> Result<(), LogError>
        where
            F: FnOnce() -> T,
        { Ok(()) }

        /// No-op without logging enabled
        #[allow(unused)]
        #[inline]
        pub fn log_event<T: LogEvent>(event: &T) -> Result<(), LogError> { Ok(()) }

        /// No-op without logging enabled
        #[allow(unused)]
        #[inline]
        pub fn initialize_log(logger: LogInterface) {}

        /// No-op without logging enabled
        #[allow(unused)]
        #[inline]
        pub fn take_log() -> Option<LogInterface> { None }
    }
}

/// Records an event. Logging failures go to stderr and are not propagated.
pub fn record<T: LogEvent>(event: &T) {
    if let Err(err) = log_event(event) {
        eprintln!("Could not log {} event: {err}", T::NAME);
    }
}

/// Like [record], but only builds the event when it will actually be logged.
pub fn record_with<T: LogEvent, F: FnOnce() -> T>(callback: F) {
    if let Err(err) = log_event_cb(callback) {
        eprintln!("Could not log {} event: {err}", T::NAME);
    }
}
