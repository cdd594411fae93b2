// Copyright 2024 FastLabs Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Bridge the [`log`] crate to a [`RotateLogs`] sink.

use std::fmt::Write;
use std::sync::Arc;

use jiff::Zoned;
use jiff::tz::TimeZone;
use log::LevelFilter;
use log::Metadata;
use log::Record;

use crate::Error;
use crate::ErrorKind;
use crate::RotateLogs;
use crate::trap::DefaultTrap;
use crate::trap::Trap;

/// A [`log::Log`] implementation that writes one text line per record to a [`RotateLogs`].
///
/// Output format:
///
/// ```text
/// 2024-08-11T22:44:57.172105+08:00 ERROR rolling_file: Hello error!
/// 2024-08-11T22:44:57.172219+08:00  WARN rolling_file: Hello warn!
/// 2024-08-11T22:44:57.172276+08:00  INFO rolling_file: Hello info!
/// ```
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use rotatelogs::RotateLogs;
/// use rotatelogs::bridge::LogBridge;
///
/// let dir = tempfile::tempdir().unwrap();
/// let sink = RotateLogs::builder(format!("{}/app.%Y%m%d", dir.path().display()))
///     .build()
///     .unwrap();
/// let sink = Arc::new(sink);
///
/// LogBridge::new(sink.clone()).apply().unwrap();
/// log::info!("This log will be written to a rotating file.");
/// ```
#[derive(Debug)]
pub struct LogBridge {
    sink: Arc<RotateLogs>,
    max_level: LevelFilter,
    timezone: Option<TimeZone>,
    trap: Box<dyn Trap>,
}

impl LogBridge {
    /// Create a new [`LogBridge`] writing into `sink`.
    #[must_use = "call `apply` to set the global logger"]
    pub fn new(sink: Arc<RotateLogs>) -> Self {
        Self {
            sink,
            max_level: LevelFilter::Trace,
            timezone: None,
            trap: Box::new(DefaultTrap::default()),
        }
    }

    /// Set the maximum log level.
    ///
    /// This will be passed to [`log::set_max_level`] on [`LogBridge::apply`].
    #[must_use = "call `apply` to set the global logger"]
    pub fn max_level(mut self, max_level: LevelFilter) -> Self {
        self.max_level = max_level;
        self
    }

    /// Set the time zone of the timestamps.
    ///
    /// Default to the system time zone.
    #[must_use = "call `apply` to set the global logger"]
    pub fn timezone(mut self, tz: TimeZone) -> Self {
        self.timezone = Some(tz);
        self
    }

    /// Set the trap for records that could not be written.
    ///
    /// Default to [`DefaultTrap`].
    #[must_use = "call `apply` to set the global logger"]
    pub fn trap(mut self, trap: impl Into<Box<dyn Trap>>) -> Self {
        self.trap = trap.into();
        self
    }

    /// Set up the global logger with the [`LogBridge`] instance.
    ///
    /// # Errors
    ///
    /// An error is returned if the global logger has already been set.
    pub fn apply(self) -> Result<(), log::SetLoggerError> {
        let max_level = self.max_level;
        log::set_boxed_logger(Box::new(self))?;
        log::set_max_level(max_level);
        Ok(())
    }

    fn format(&self, record: &Record) -> Vec<u8> {
        let time = match self.timezone.as_ref() {
            Some(tz) => Zoned::now().with_time_zone(tz.clone()),
            None => Zoned::now(),
        }
        .strftime("%Y-%m-%dT%H:%M:%S.%6f%:z");

        let mut text = String::new();
        // SAFETY: write to a string always succeeds
        writeln!(
            &mut text,
            "{time} {:>5} {}: {}",
            record.level(),
            record.target(),
            record.args()
        )
        .unwrap();
        text.into_bytes()
    }
}

impl log::Log for LogBridge {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let bytes = self.format(record);
        if let Err(err) = self.sink.write(&bytes) {
            let err = Error::new(ErrorKind::Access, "failed to write log record").with_source(err);
            self.trap.trap(&err);
        }
    }

    fn flush(&self) {
        if let Err(err) = self.sink.flush() {
            self.trap.trap(&err);
        }
    }
}
