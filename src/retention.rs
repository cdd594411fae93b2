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

use std::fs;
use std::io;
use std::num::NonZeroUsize;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use jiff::Timestamp;

use crate::Error;
use crate::ErrorKind;
use crate::pattern::PathPattern;

/// A file this sink created, or found on disk matching its path template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    path: PathBuf,
    created: Timestamp,
}

impl HistoryEntry {
    /// The path of the file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// When the file was created.
    pub fn created(&self) -> Timestamp {
        self.created
    }
}

/// Known files, oldest first.
#[derive(Debug, Default)]
pub(crate) struct History {
    entries: Vec<HistoryEntry>,
}

impl History {
    /// Rebuild the history from the files on disk that match `pattern`.
    ///
    /// Returns an empty history if the directory part of the pattern depends on time, or if the
    /// directory does not exist yet.
    pub(crate) fn reconstruct(pattern: &PathPattern, alias: Option<&Path>) -> Result<History, Error> {
        let Some(dir) = pattern.search_dir() else {
            return Ok(History::default());
        };

        let read_dir = match fs::read_dir(&dir) {
            Ok(read_dir) => read_dir,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(History::default()),
            Err(err) => {
                return Err(Error::new(ErrorKind::Access, "failed to read log dir")
                    .with_context("path", dir.display())
                    .with_source(err));
            }
        };

        let mut entries = read_dir
            .filter_map(|entry| {
                let entry = entry.ok()?;
                let path = entry.path();
                if alias.is_some_and(|alias| alias == path) {
                    return None;
                }

                // the sink only creates files, never directories or symlinks
                let metadata = entry.metadata().ok()?;
                if !metadata.is_file() || !pattern.matches(&path) {
                    return None;
                }

                let created = metadata.created().or_else(|_| metadata.modified()).ok()?;
                let created = Timestamp::try_from(created).ok()?;
                Some(HistoryEntry { path, created })
            })
            .collect::<Vec<_>>();

        entries.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.path.cmp(&b.path)));
        Ok(History { entries })
    }

    /// Forget everything but `path`.
    pub(crate) fn track_only(&mut self, path: &Path, created: Timestamp) {
        self.entries.retain(|e| e.path == path);
        self.record(path, created);
    }

    /// Remember a newly opened file. A path already known keeps its original creation time.
    pub(crate) fn record(&mut self, path: &Path, created: Timestamp) {
        if self.entries.iter().any(|e| e.path == path) {
            return;
        }
        self.entries.push(HistoryEntry {
            path: path.to_path_buf(),
            created,
        });
    }

    pub(crate) fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    fn sort(&mut self) {
        self.entries.sort_by_key(|e| e.created);
    }
}

/// How many and how old rotated files may be kept.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Retention {
    pub(crate) max_files: Option<NonZeroUsize>,
    pub(crate) max_age: Option<Duration>,
}

impl Retention {
    pub(crate) fn is_enabled(&self) -> bool {
        self.max_files.is_some() || self.max_age.is_some()
    }

    /// Delete rotated files beyond the configured limits, never touching any path in `keep`.
    ///
    /// Kept paths do not count against `max_files`.
    pub(crate) fn apply(
        &self,
        history: &mut History,
        keep: &[&Path],
        now: Timestamp,
    ) -> Result<Vec<PathBuf>, Error> {
        let mut failures = Failures::default();
        let mut removed = vec![];

        if let Some(max_age) = self.max_age {
            removed.extend(prune_expired(history, max_age, keep, now, &mut failures));
        }
        if let Some(max_files) = self.max_files {
            removed.extend(prune_excess(history, max_files.get(), keep, &mut failures));
        }

        failures.into_result(removed)
    }
}

/// Delete the oldest files until at most `max_count` files other than `exclude` remain.
///
/// Deletion is best effort: a file that cannot be removed stays in the history, and pruning
/// moves on to the next oldest one. A file that is already gone counts as removed.
pub(crate) fn prune(
    history: &mut History,
    max_count: usize,
    exclude: &Path,
) -> Result<Vec<PathBuf>, Error> {
    let mut failures = Failures::default();
    let removed = prune_excess(history, max_count, &[exclude], &mut failures);
    failures.into_result(removed)
}

fn prune_excess(
    history: &mut History,
    max_count: usize,
    keep: &[&Path],
    failures: &mut Failures,
) -> Vec<PathBuf> {
    history.sort();

    let candidates = history
        .entries
        .iter()
        .filter(|e| !keep.contains(&e.path.as_path()))
        .count();
    let mut excess = candidates.saturating_sub(max_count);
    let mut removed = vec![];

    let mut i = 0;
    while excess > 0 && i < history.entries.len() {
        let path = &history.entries[i].path;
        if keep.contains(&path.as_path()) {
            i += 1;
            continue;
        }

        match remove_file(path) {
            Ok(()) => {
                removed.push(history.entries.remove(i).path);
                excess -= 1;
            }
            Err(err) => {
                failures.push(path, err);
                i += 1;
            }
        }
    }

    removed
}

fn prune_expired(
    history: &mut History,
    max_age: Duration,
    keep: &[&Path],
    now: Timestamp,
    failures: &mut Failures,
) -> Vec<PathBuf> {
    let max_age = i64::try_from(max_age.as_millis()).unwrap_or(i64::MAX);
    let now = now.as_millisecond();
    let mut removed = vec![];

    history.entries.retain(|entry| {
        let age = now.saturating_sub(entry.created.as_millisecond());
        if keep.contains(&entry.path.as_path()) || age <= max_age {
            return true;
        }

        match remove_file(&entry.path) {
            Ok(()) => {
                removed.push(entry.path.clone());
                false
            }
            Err(err) => {
                failures.push(&entry.path, err);
                true
            }
        }
    });

    removed
}

fn remove_file(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        result => result,
    }
}

#[derive(Debug, Default)]
struct Failures(Option<Error>);

impl Failures {
    fn push(&mut self, path: &Path, err: io::Error) {
        let failure = self
            .0
            .take()
            .unwrap_or_else(|| Error::new(ErrorKind::Prune, "failed to remove old logs"));
        self.0 = Some(failure.with_context("path", path.display()).with_source(err));
    }

    fn into_result(self, removed: Vec<PathBuf>) -> Result<Vec<PathBuf>, Error> {
        match self.0 {
            Some(err) => Err(err),
            None => Ok(removed),
        }
    }
}

#[cfg(test)]
mod tests {
    use jiff::SignedDuration;
    use jiff::tz::TimeZone;
    use tempfile::TempDir;

    use super::*;

    fn at(secs: i64) -> Timestamp {
        Timestamp::from_second(secs).unwrap()
    }

    fn history_with_files(dir: &TempDir, names: &[&str]) -> History {
        let mut history = History::default();
        for (i, name) in names.iter().enumerate() {
            let path = dir.path().join(name);
            fs::write(&path, name.as_bytes()).unwrap();
            history.record(&path, at(i as i64));
        }
        history
    }

    fn remaining(dir: &TempDir) -> Vec<String> {
        let mut names = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect::<Vec<_>>();
        names.sort();
        names
    }

    #[test]
    fn test_prune_removes_oldest_first() {
        let temp_dir = TempDir::new().unwrap();
        let mut history = history_with_files(&temp_dir, &["a", "b", "c", "d", "e"]);
        let active = temp_dir.path().join("e");

        let removed = prune(&mut history, 2, &active).unwrap();
        assert_eq!(
            removed,
            vec![temp_dir.path().join("a"), temp_dir.path().join("b")]
        );
        assert_eq!(remaining(&temp_dir), vec!["c", "d", "e"]);
        assert_eq!(history.entries().len(), 3);
    }

    #[test]
    fn test_prune_never_removes_active_file() {
        let temp_dir = TempDir::new().unwrap();
        let mut history = history_with_files(&temp_dir, &["a", "b", "c"]);
        // the active file is the oldest entry
        let active = temp_dir.path().join("a");

        prune(&mut history, 1, &active).unwrap();
        assert_eq!(remaining(&temp_dir), vec!["a", "c"]);
    }

    #[test]
    fn test_prune_tolerates_missing_and_failing_files() {
        let temp_dir = TempDir::new().unwrap();
        let mut history = history_with_files(&temp_dir, &["a", "b", "c", "d"]);
        let active = temp_dir.path().join("d");

        // already gone
        fs::remove_file(temp_dir.path().join("a")).unwrap();
        // cannot be removed as a file
        fs::remove_file(temp_dir.path().join("b")).unwrap();
        fs::create_dir(temp_dir.path().join("b")).unwrap();

        let err = prune(&mut history, 1, &active).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Prune);
        assert_eq!(err.sources().len(), 1);

        // "b" stays known so it is retried later, "c" was reclaimed in its place
        let known = history
            .entries()
            .iter()
            .map(|e| e.path().to_path_buf())
            .collect::<Vec<_>>();
        assert_eq!(
            known,
            vec![temp_dir.path().join("b"), temp_dir.path().join("d")]
        );
        assert!(!temp_dir.path().join("c").exists());
    }

    #[test]
    fn test_retention_by_age() {
        let temp_dir = TempDir::new().unwrap();
        let mut history = history_with_files(&temp_dir, &["a", "b", "c", "d"]);
        let active = temp_dir.path().join("d");
        let retention = Retention {
            max_files: None,
            max_age: Some(Duration::from_secs(1)),
        };

        let now = at(3);
        let removed = retention.apply(&mut history, &[active.as_path()], now).unwrap();
        assert_eq!(
            removed,
            vec![temp_dir.path().join("a"), temp_dir.path().join("b")]
        );
        assert_eq!(remaining(&temp_dir), vec!["c", "d"]);

        let later = now.checked_add(SignedDuration::from_secs(60)).unwrap();
        retention.apply(&mut history, &[active.as_path()], later).unwrap();
        assert_eq!(remaining(&temp_dir), vec!["d"]);
    }

    #[test]
    fn test_retention_skips_every_kept_path() {
        let temp_dir = TempDir::new().unwrap();
        let mut history = history_with_files(&temp_dir, &["a", "b", "c", "d"]);
        let previous = temp_dir.path().join("a");
        let active = temp_dir.path().join("d");
        let retention = Retention {
            max_files: NonZeroUsize::new(1),
            max_age: None,
        };

        let removed = retention
            .apply(&mut history, &[active.as_path(), previous.as_path()], at(10))
            .unwrap();
        assert_eq!(removed, vec![temp_dir.path().join("b")]);
        assert_eq!(remaining(&temp_dir), vec!["a", "c", "d"]);
    }

    #[test]
    fn test_track_only_drops_other_entries() {
        let mut history = History::default();
        history.record(Path::new("/logs/a"), at(1));
        history.record(Path::new("/logs/b"), at(2));
        history.track_only(Path::new("/logs/c"), at(3));
        assert_eq!(history.entries().len(), 1);
        assert_eq!(history.entries()[0].path(), Path::new("/logs/c"));
    }

    #[test]
    fn test_record_keeps_first_creation_time() {
        let mut history = History::default();
        history.record(Path::new("/logs/a"), at(1));
        history.record(Path::new("/logs/a"), at(5));
        assert_eq!(history.entries().len(), 1);
        assert_eq!(history.entries()[0].created(), at(1));
    }

    #[test]
    fn test_reconstruct_from_directory() {
        let temp_dir = TempDir::new().unwrap();
        for name in ["app.20240810", "app.20240811", "app.20240811.1", "other.log"] {
            fs::write(temp_dir.path().join(name), b"x").unwrap();
        }
        fs::create_dir(temp_dir.path().join("app.dir")).unwrap();

        let template = format!("{}/app.%Y%m%d", temp_dir.path().display());
        let pattern = PathPattern::new(&template, TimeZone::UTC).unwrap();
        let history = History::reconstruct(&pattern, None).unwrap();

        let mut names = history
            .entries()
            .iter()
            .map(|e| e.path().file_name().unwrap().to_str().unwrap().to_string())
            .collect::<Vec<_>>();
        names.sort();
        assert_eq!(names, vec!["app.20240810", "app.20240811", "app.20240811.1"]);

        let missing = format!("{}/missing/app.%Y", temp_dir.path().display());
        let pattern = PathPattern::new(&missing, TimeZone::UTC).unwrap();
        assert!(History::reconstruct(&pattern, None).unwrap().entries().is_empty());
    }
}
