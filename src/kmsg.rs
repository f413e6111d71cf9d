// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Diagnostic sinks feeding the kernel log during early boot.
// Author: Lukas Bower

//! Diagnostic sinks.
//!
//! Nothing else is attached to the console while `/init` runs, so every
//! decision the boot flow makes is written to `/dev/kmsg`. The kernel drops
//! records when they arrive faster than the console drains them; [`KmsgSink`]
//! therefore pauses after each line.

use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

pub use log::Level;

/// Default pause after each kernel log write.
pub const DEFAULT_KMSG_DELAY: Duration = Duration::from_millis(50);

/// Receiver for formatted diagnostic lines.
pub trait Sink {
    /// Record one line at `level`.
    fn emit(&self, level: Level, args: fmt::Arguments<'_>);
}

/// Format a line and hand it to a [`Sink`] at the given level.
///
/// ```
/// use earlyinit::{kmsg::RecordingSink, printk};
///
/// let sink = RecordingSink::new();
/// printk!(sink, Info, "mounted {}", "/proc");
/// assert_eq!(sink.lines(), vec!["mounted /proc".to_string()]);
/// ```
#[macro_export]
macro_rules! printk {
    ($sink:expr, $level:ident, $($arg:tt)*) => {
        $crate::kmsg::Sink::emit(&$sink, $crate::kmsg::Level::$level, format_args!($($arg)*))
    };
}

/// syslog priority understood by `/dev/kmsg` as a `<N>` prefix.
pub fn priority(level: Level) -> u8 {
    match level {
        Level::Error => 3,
        Level::Warn => 4,
        Level::Info => 6,
        Level::Debug | Level::Trace => 7,
    }
}

/// Writes each line to the kernel log device, then sleeps.
#[derive(Debug, Clone)]
pub struct KmsgSink {
    path: PathBuf,
    delay: Duration,
}

impl KmsgSink {
    /// Sink writing to `path`, pausing `delay` after each line.
    pub fn new(path: impl Into<PathBuf>, delay: Duration) -> Self {
        Self {
            path: path.into(),
            delay,
        }
    }

    fn write_line(&self, level: Level, args: fmt::Arguments<'_>) -> std::io::Result<()> {
        // One open per record: /dev may be moved underneath us mid-boot.
        let mut dev = OpenOptions::new().append(true).open(&self.path)?;
        let line = format!("<{}>init: {}\n", priority(level), args);
        dev.write_all(line.as_bytes())?;
        dev.flush()
    }
}

impl Default for KmsgSink {
    fn default() -> Self {
        Self::new("/dev/kmsg", DEFAULT_KMSG_DELAY)
    }
}

impl Sink for KmsgSink {
    fn emit(&self, level: Level, args: fmt::Arguments<'_>) {
        // There is nowhere left to report a failing kernel log.
        let _ = self.write_line(level, args);
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
    }
}

/// Forwards lines to the `log` facade; used by host-side runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl Sink for LogSink {
    fn emit(&self, level: Level, args: fmt::Arguments<'_>) {
        log::log!(target: "earlyinit", level, "{}", args);
    }
}

/// Keeps every line in memory for later inspection.
#[derive(Debug, Default)]
pub struct RecordingSink {
    records: Mutex<Vec<(Level, String)>>,
}

impl RecordingSink {
    /// Empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages in the order they were emitted.
    pub fn lines(&self) -> Vec<String> {
        self.records().into_iter().map(|(_, line)| line).collect()
    }

    /// Messages with their levels.
    pub fn records(&self) -> Vec<(Level, String)> {
        match self.records.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// True if any line contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|line| line.contains(needle))
    }

    /// Index of the first line containing `needle`.
    pub fn position(&self, needle: &str) -> Option<usize> {
        self.lines().iter().position(|line| line.contains(needle))
    }
}

impl Sink for RecordingSink {
    fn emit(&self, level: Level, args: fmt::Arguments<'_>) {
        let mut guard = match self.records.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.push((level, args.to_string()));
    }
}

impl<S: Sink + ?Sized> Sink for &S {
    fn emit(&self, level: Level, args: fmt::Arguments<'_>) {
        (**self).emit(level, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn kmsg_lines_carry_priority_prefix() {
        let file = NamedTempFile::new().unwrap();
        let sink = KmsgSink::new(file.path(), Duration::ZERO);
        printk!(sink, Error, "time to panic: {}", "mount");
        printk!(sink, Info, "Mount proc successful.");
        let text = std::fs::read_to_string(file.path()).unwrap();
        assert_eq!(
            text,
            "<3>init: time to panic: mount\n<6>init: Mount proc successful.\n"
        );
    }

    #[test]
    fn missing_device_is_ignored() {
        let sink = KmsgSink::new("/nonexistent/kmsg", Duration::ZERO);
        printk!(sink, Warn, "dropped");
    }

    #[test]
    fn recording_keeps_order_and_level() {
        let sink = RecordingSink::new();
        printk!(sink, Info, "first");
        printk!(sink, Warn, "second {}", 2);
        assert_eq!(
            sink.records(),
            vec![
                (Level::Info, "first".to_string()),
                (Level::Warn, "second 2".to_string())
            ]
        );
        assert_eq!(sink.position("second"), Some(1));
    }
}
