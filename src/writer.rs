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

use std::io;
use std::io::Write;
use std::num::NonZeroUsize;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;

use jiff::Timestamp;
use jiff::tz::TimeZone;

use crate::Error;
use crate::ErrorKind;
use crate::alias;
use crate::clock::Clock;
use crate::clock::SystemClock;
use crate::event::RotationEvent;
use crate::event::RotationHandler;
use crate::pattern::PathPattern;
use crate::policy::RotationPolicy;
use crate::policy::Trigger;
use crate::retention::History;
use crate::retention::HistoryEntry;
use crate::retention::Retention;
use crate::session::Session;
use crate::trap::DefaultTrap;
use crate::trap::Trap;

/// A builder to configure and create a [`RotateLogs`] sink.
#[derive(Debug)]
pub struct RotateLogsBuilder {
    // required
    template: String,

    // has default
    alias: Option<PathBuf>,
    max_size: Option<NonZeroUsize>,
    max_files: Option<NonZeroUsize>,
    max_age: Option<Duration>,
    force_new_file: bool,
    reconstruct_history: bool,
    timezone: TimeZone,
    clock: Box<dyn Clock>,
    trap: Box<dyn Trap>,
    handler: Option<Box<dyn RotationHandler>>,
}

impl RotateLogsBuilder {
    /// Create a new builder for the given path template.
    ///
    /// The template may contain `strftime`-style directives such as `%Y%m%d%H`; a relative
    /// template is resolved against the current directory when the sink is built.
    #[must_use]
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            alias: None,
            max_size: None,
            max_files: None,
            max_age: None,
            force_new_file: false,
            reconstruct_history: true,
            timezone: TimeZone::system(),
            clock: Box::new(SystemClock::default()),
            trap: Box::new(DefaultTrap::default()),
            handler: None,
        }
    }

    /// Keep a symbolic link at `path` pointing at the active file.
    #[must_use]
    pub fn alias(mut self, path: impl Into<PathBuf>) -> Self {
        self.alias = Some(path.into());
        self
    }

    /// Rotate before a write would push the active file past `bytes`.
    ///
    /// Zero disables size-based rotation.
    #[must_use]
    pub fn rotation_size(mut self, bytes: u64) -> Self {
        self.max_size = NonZeroUsize::new(usize::try_from(bytes).unwrap_or(usize::MAX));
        self
    }

    /// Set the maximum number of rotated files to keep, not counting the active one.
    ///
    /// Zero keeps every file.
    #[must_use]
    pub fn max_files(mut self, n: usize) -> Self {
        self.max_files = NonZeroUsize::new(n);
        self
    }

    /// Delete rotated files created longer than `age` ago.
    ///
    /// Zero keeps every file.
    #[must_use]
    pub fn max_age(mut self, age: Duration) -> Self {
        self.max_age = Some(age).filter(|age| !age.is_zero());
        self
    }

    /// Never append to a file that already exists when opening the first file of a time window;
    /// pick the next free `.N` suffix instead.
    #[must_use]
    pub fn force_new_file(mut self, yes: bool) -> Self {
        self.force_new_file = yes;
        self
    }

    /// Whether to rebuild the list of rotated files from disk when the sink is built.
    ///
    /// Default to `true`. Only done when `max_files` or `max_age` is set and the directory part
    /// of the template has no time directives.
    #[must_use]
    pub fn reconstruct_history(mut self, yes: bool) -> Self {
        self.reconstruct_history = yes;
        self
    }

    /// Set the time zone used to fill in the template's directives.
    ///
    /// Default to the system time zone.
    #[must_use]
    pub fn timezone(mut self, timezone: TimeZone) -> Self {
        self.timezone = timezone;
        self
    }

    /// Set the clock.
    ///
    /// Default to [`SystemClock`].
    #[must_use]
    pub fn clock(mut self, clock: impl Into<Box<dyn Clock>>) -> Self {
        self.clock = clock.into();
        self
    }

    /// Set the trap for errors that do not fail the triggering call.
    ///
    /// Default to [`DefaultTrap`].
    #[must_use]
    pub fn trap(mut self, trap: impl Into<Box<dyn Trap>>) -> Self {
        self.trap = trap.into();
        self
    }

    /// Set a handler to be notified after every rotation.
    #[must_use]
    pub fn handler(mut self, handler: impl Into<Box<dyn RotationHandler>>) -> Self {
        self.handler = Some(handler.into());
        self
    }

    /// Build the [`RotateLogs`] sink. No file is opened until the first write or
    /// [`RotateLogs::open`].
    ///
    /// # Errors
    ///
    /// Return an error if either:
    ///
    /// * The template is empty or has an invalid directive.
    /// * The alias is empty or is a name the template can resolve to.
    /// * The directory of existing rotated files cannot be read.
    pub fn build(self) -> Result<RotateLogs, Error> {
        let Self {
            template,
            alias,
            max_size,
            max_files,
            max_age,
            force_new_file,
            reconstruct_history,
            timezone,
            clock,
            trap,
            handler,
        } = self;

        let pattern = PathPattern::new(&template, timezone)?;

        let alias = match alias {
            None => None,
            Some(alias) if alias.as_os_str().is_empty() => {
                return Err(Error::new(
                    ErrorKind::ConfigInvalid,
                    "alias path must not be empty",
                ));
            }
            Some(alias) => {
                let alias = std::path::absolute(&alias).map_err(|err| {
                    Error::new(ErrorKind::ConfigInvalid, "failed to resolve alias path")
                        .with_context("alias", alias.display())
                        .with_source(err)
                })?;
                // renaming the link over a matching name would unlink a log file
                if pattern.matches(&alias) {
                    return Err(Error::new(
                        ErrorKind::ConfigInvalid,
                        "alias path must not be a name the template resolves to",
                    )
                    .with_context("alias", alias.display()));
                }
                Some(alias)
            }
        };

        let retention = Retention { max_files, max_age };
        let history = if reconstruct_history && retention.is_enabled() {
            History::reconstruct(&pattern, alias.as_deref())?
        } else {
            History::default()
        };

        let state = State {
            pattern,
            policy: RotationPolicy::new(max_size),
            retention,
            alias,
            alias_target: None,
            force_new_file,
            clock,
            trap,
            handler,
            session: None,
            history,
            closed: false,
        };

        Ok(RotateLogs {
            state: Mutex::new(state),
        })
    }
}

/// A single logical write destination that splits its output across files by time window
/// and size, and deletes stale rotated files.
///
/// All operations are serialized: a write, together with any rotation, alias update, and
/// pruning it triggers, completes before the next operation starts.
///
/// # Examples
///
/// ```
/// use std::io::Write;
///
/// use rotatelogs::RotateLogs;
///
/// let dir = tempfile::tempdir().unwrap();
/// let template = format!("{}/access_log.%Y%m%d%H%M", dir.path().display());
///
/// let mut sink = RotateLogs::builder(template)
///     .alias(dir.path().join("access_log"))
///     .rotation_size(64 * 1024 * 1024)
///     .max_files(7)
///     .build()
///     .unwrap();
///
/// writeln!(sink, "GET /index.html 200").unwrap();
/// sink.close().unwrap();
/// ```
#[derive(Debug)]
pub struct RotateLogs {
    state: Mutex<State>,
}

impl RotateLogs {
    /// Create a new [`RotateLogsBuilder`].
    #[must_use]
    pub fn builder(template: impl Into<String>) -> RotateLogsBuilder {
        RotateLogsBuilder::new(template)
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Write the whole buffer to the active file, rotating first if needed.
    ///
    /// Returns the number of bytes written, which is always `buf.len()` on success.
    ///
    /// # Errors
    ///
    /// Return an error if the sink is closed, if a new file cannot be opened (the previous file
    /// stays active), or if the write itself fails.
    pub fn write(&self, buf: &[u8]) -> Result<usize, Error> {
        self.state().write(buf)
    }

    /// Open the file for the current time window without writing to it.
    ///
    /// Also reopens a closed sink. Returns the path of the active file.
    pub fn open(&self) -> Result<PathBuf, Error> {
        self.state().open()
    }

    /// Rotate now.
    ///
    /// Within the same time window, the next file takes the next free `.N` suffix. Returns the
    /// path of the new active file.
    pub fn rotate(&self) -> Result<PathBuf, Error> {
        self.state().rotate()
    }

    /// Flush the active file.
    pub fn flush(&self) -> Result<(), Error> {
        self.state().flush()
    }

    /// Close the active file. Writes fail afterwards until [`RotateLogs::open`] is called.
    ///
    /// Closing a closed sink is a no-op.
    pub fn close(&self) -> Result<(), Error> {
        self.state().close()
    }

    /// Whether [`RotateLogs::close`] has been called since the sink was last opened.
    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    /// The path of the active file, if any.
    pub fn current_path(&self) -> Option<PathBuf> {
        self.state().session.as_ref().map(|s| s.path().to_path_buf())
    }

    /// The files tracked for retention, oldest first, including the active one.
    ///
    /// Without `max_files` or `max_age` only the active file is tracked.
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.state().history.entries().to_vec()
    }
}

impl Write for &RotateLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        RotateLogs::write(self, buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        RotateLogs::flush(self).map_err(io::Error::from)
    }
}

impl Write for RotateLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        RotateLogs::write(self, buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        RotateLogs::flush(self).map_err(io::Error::from)
    }
}

impl Drop for RotateLogs {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(|e| e.into_inner());
        if let Err(err) = state.flush() {
            let err = Error::new(ErrorKind::Access, "failed to flush log file on dropped")
                .with_source(err);
            state.trap.trap(&err);
        }
    }
}

#[derive(Debug)]
struct State {
    pattern: PathPattern,
    policy: RotationPolicy,
    retention: Retention,
    alias: Option<PathBuf>,
    alias_target: Option<PathBuf>,
    force_new_file: bool,
    clock: Box<dyn Clock>,
    trap: Box<dyn Trap>,
    handler: Option<Box<dyn RotationHandler>>,
    session: Option<Session>,
    history: History,
    closed: bool,
}

impl State {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Error> {
        self.check_closed()?;

        let now = self.clock.now();
        let resolved = self.pattern.resolve(now)?;
        // terminates: after any rotation the base path matches and a size rotation leaves an
        // empty file behind
        while let Some(trigger) = self.policy.check(self.session.as_ref(), buf.len(), &resolved) {
            self.rotate_to(&resolved, trigger, now)?;
        }

        match self.session.as_mut() {
            Some(session) => session.append(buf),
            None => Err(Error::new(ErrorKind::Unexpected, "no active log file")),
        }
    }

    fn open(&mut self) -> Result<PathBuf, Error> {
        self.closed = false;
        if let Some(session) = &self.session {
            return Ok(session.path().to_path_buf());
        }

        let now = self.clock.now();
        let resolved = self.pattern.resolve(now)?;
        self.rotate_to(&resolved, Trigger::Initial, now)
    }

    fn rotate(&mut self) -> Result<PathBuf, Error> {
        self.check_closed()?;

        let now = self.clock.now();
        let resolved = self.pattern.resolve(now)?;
        let trigger = match self.policy.check(self.session.as_ref(), 0, &resolved) {
            Some(trigger @ (Trigger::Initial | Trigger::Window)) => trigger,
            _ => Trigger::Explicit,
        };
        self.rotate_to(&resolved, trigger, now)
    }

    fn flush(&mut self) -> Result<(), Error> {
        match self.session.as_mut() {
            Some(session) => session.flush(),
            None => Ok(()),
        }
    }

    fn close(&mut self) -> Result<(), Error> {
        self.closed = true;
        match self.session.take() {
            Some(mut session) => session.close(),
            None => Ok(()),
        }
    }

    fn check_closed(&self) -> Result<(), Error> {
        if self.closed {
            return Err(Error::new(ErrorKind::Closed, "sink closed")
                .with_context("template", self.pattern.template()));
        }
        Ok(())
    }

    /// Replace the active session with a new one for `resolved`.
    ///
    /// If the new file cannot be opened, the active session is left untouched.
    fn rotate_to(
        &mut self,
        resolved: &Path,
        trigger: Trigger,
        now: Timestamp,
    ) -> Result<PathBuf, Error> {
        let (generation, force_new) = match &self.session {
            Some(session)
                if session.base() == resolved
                    && matches!(trigger, Trigger::Size | Trigger::Explicit) =>
            {
                (session.generation() + 1, true)
            }
            _ => (0, self.force_new_file),
        };

        let next = Session::open(resolved.to_path_buf(), generation, force_new, now)?;
        let current = next.path().to_path_buf();
        let created = next.opened_at();

        let previous = match self.session.replace(next) {
            Some(mut previous) => {
                if let Err(err) = previous.close() {
                    self.trap.trap(&err);
                }
                Some(previous.path().to_path_buf())
            }
            None => None,
        };

        if let Some(link) = &self.alias {
            match alias::rebind(link, &current) {
                Ok(()) => self.alias_target = Some(current.clone()),
                Err(err) => self.trap.trap(&err),
            }
        }

        // after a failed rebind the alias still points at an older file
        let mut keep = vec![current.as_path()];
        keep.extend(self.alias_target.as_deref());

        if self.retention.is_enabled() {
            self.history.record(&current, created);
            if let Err(err) = self.retention.apply(&mut self.history, &keep, now) {
                self.trap.trap(&err);
            }
        } else {
            // nothing is ever pruned
            self.history.track_only(&current, created);
        }

        if let Some(handler) = &self.handler {
            let event = RotationEvent::new(previous, current.clone(), trigger);
            handler.on_rotate(&event);
        }

        Ok(current)
    }
}
