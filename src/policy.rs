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

use std::fmt;
use std::num::NonZeroUsize;
use std::path::Path;

use crate::session::Session;

/// Why a rotation happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Trigger {
    /// No file was open yet.
    Initial,
    /// The path template resolved to a different path than the open file's.
    Window,
    /// The pending write would push the open file past the size limit.
    Size,
    /// Requested through [`RotateLogs::rotate`](crate::RotateLogs::rotate).
    Explicit,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Trigger::Initial => "initial",
            Trigger::Window => "window",
            Trigger::Size => "size",
            Trigger::Explicit => "explicit",
        };
        f.write_str(name)
    }
}

/// Decides whether the open file must be replaced before a write.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct RotationPolicy {
    max_size: Option<NonZeroUsize>,
}

impl RotationPolicy {
    pub(crate) fn new(max_size: Option<NonZeroUsize>) -> Self {
        Self { max_size }
    }

    /// Return the reason to rotate before writing `write_size` bytes, if any.
    ///
    /// Either the time window or the size limit alone forces a rotation. A session that has not
    /// been written to is never rotated for size: an oversized write lands whole in it.
    pub(crate) fn check(
        &self,
        session: Option<&Session>,
        write_size: usize,
        resolved: &Path,
    ) -> Option<Trigger> {
        let Some(session) = session else {
            return Some(Trigger::Initial);
        };

        if session.base() != resolved {
            return Some(Trigger::Window);
        }

        let written = session.written();
        let exceeds = self
            .max_size
            .is_some_and(|max| written > 0 && written.saturating_add(write_size) > max.get());
        exceeds.then_some(Trigger::Size)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use jiff::Timestamp;
    use tempfile::TempDir;

    use super::*;

    fn session(dir: &TempDir, name: &str) -> Session {
        Session::open(dir.path().join(name), 0, false, Timestamp::UNIX_EPOCH).unwrap()
    }

    #[test]
    fn test_rotate_when_no_session() {
        let policy = RotationPolicy::default();
        assert_eq!(
            policy.check(None, 1, Path::new("/logs/app.log")),
            Some(Trigger::Initial)
        );
    }

    #[test]
    fn test_rotate_on_window_change() {
        let temp_dir = TempDir::new().unwrap();
        let session = session(&temp_dir, "app.2024081017");
        let policy = RotationPolicy::default();

        let same = temp_dir.path().join("app.2024081017");
        let next: PathBuf = temp_dir.path().join("app.2024081018");
        assert_eq!(policy.check(Some(&session), 1 << 20, &same), None);
        assert_eq!(policy.check(Some(&session), 0, &next), Some(Trigger::Window));
    }

    #[test]
    fn test_rotate_on_size() {
        let temp_dir = TempDir::new().unwrap();
        let mut session = session(&temp_dir, "app.log");
        let path = session.base().to_path_buf();
        let policy = RotationPolicy::new(NonZeroUsize::new(12));

        // an empty file takes anything
        assert_eq!(policy.check(Some(&session), 100, &path), None);

        session.append(b"12345678").unwrap();
        assert_eq!(policy.check(Some(&session), 4, &path), None);
        assert_eq!(policy.check(Some(&session), 5, &path), Some(Trigger::Size));

        session.append(b"1234").unwrap();
        assert_eq!(policy.check(Some(&session), 1, &path), Some(Trigger::Size));
    }

    #[test]
    fn test_window_is_checked_before_size() {
        let temp_dir = TempDir::new().unwrap();
        let mut session = session(&temp_dir, "app.1");
        session.append(b"0123456789").unwrap();
        let policy = RotationPolicy::new(NonZeroUsize::new(4));

        let next = temp_dir.path().join("app.2");
        assert_eq!(policy.check(Some(&session), 8, &next), Some(Trigger::Window));
    }
}
