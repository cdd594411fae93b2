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

use std::ffi::OsString;
use std::fs;
use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use jiff::Timestamp;

use crate::Error;
use crate::ErrorKind;

/// One open output file.
#[derive(Debug)]
pub(crate) struct Session {
    // the resolved path before any `.N` suffix
    base: PathBuf,
    path: PathBuf,
    generation: usize,
    file: Option<File>,
    written: usize,
    opened_at: Timestamp,
}

impl Session {
    /// Open the file for `base` at `generation` for appending.
    ///
    /// With `force_new`, existing files are never appended to: the generation is bumped until an
    /// unused `base.N` name is found.
    pub(crate) fn open(
        base: PathBuf,
        generation: usize,
        force_new: bool,
        opened_at: Timestamp,
    ) -> Result<Session, Error> {
        if let Some(parent) = base.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                Error::new(ErrorKind::Access, "failed to create log directory")
                    .with_context("path", parent.display())
                    .with_source(err)
            })?;
        }

        let mut generation = generation;
        loop {
            let path = generational_path(&base, generation);
            let mut opts = OpenOptions::new();
            if force_new {
                opts.write(true).create_new(true);
            } else {
                opts.append(true).create(true);
            }

            match opts.open(&path) {
                Ok(file) => {
                    let written = if force_new {
                        0
                    } else {
                        file.metadata().map_or(0, |m| m.len() as usize)
                    };

                    return Ok(Session {
                        base,
                        path,
                        generation,
                        file: Some(file),
                        written,
                        opened_at,
                    });
                }
                Err(err) if force_new && err.kind() == io::ErrorKind::AlreadyExists => {
                    generation += 1;
                }
                Err(err) => {
                    return Err(Error::new(ErrorKind::Access, "failed to open log file")
                        .with_context("path", path.display())
                        .with_source(err));
                }
            }
        }
    }

    pub(crate) fn base(&self) -> &Path {
        &self.base
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn generation(&self) -> usize {
        self.generation
    }

    pub(crate) fn written(&self) -> usize {
        self.written
    }

    pub(crate) fn opened_at(&self) -> Timestamp {
        self.opened_at
    }

    /// Append the whole buffer.
    ///
    /// The byte counter only ever reflects bytes the file accepted, including on a failed or
    /// short write.
    pub(crate) fn append(&mut self, buf: &[u8]) -> Result<usize, Error> {
        let Some(file) = self.file.as_mut() else {
            return Err(Error::new(ErrorKind::Closed, "log file is closed")
                .with_context("path", self.path.display()));
        };

        let mut n = 0;
        while n < buf.len() {
            match file.write(&buf[n..]) {
                Ok(0) => {
                    self.written += n;
                    return Err(Error::new(ErrorKind::Access, "failed to write whole buffer")
                        .with_context("path", self.path.display())
                        .with_context("written", n)
                        .with_source(io::Error::from(io::ErrorKind::WriteZero)));
                }
                Ok(len) => n += len,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => {
                    self.written += n;
                    return Err(Error::new(ErrorKind::Access, "failed to write log file")
                        .with_context("path", self.path.display())
                        .with_context("written", n)
                        .with_source(err));
                }
            }
        }

        self.written += n;
        Ok(n)
    }

    pub(crate) fn flush(&mut self) -> Result<(), Error> {
        match self.file.as_mut() {
            Some(file) => file.flush().map_err(|err| {
                Error::new(ErrorKind::Access, "failed to flush log file")
                    .with_context("path", self.path.display())
                    .with_source(err)
            }),
            None => Ok(()),
        }
    }

    /// Flush and release the handle. Closing twice is a no-op.
    pub(crate) fn close(&mut self) -> Result<(), Error> {
        let Some(mut file) = self.file.take() else {
            return Ok(());
        };

        file.flush()
            .and_then(|()| file.sync_data())
            .map_err(|err| {
                Error::new(ErrorKind::Access, "failed to close log file")
                    .with_context("path", self.path.display())
                    .with_source(err)
            })
    }
}

/// `base` for generation 0, `base.N` otherwise.
pub(crate) fn generational_path(base: &Path, generation: usize) -> PathBuf {
    if generation == 0 {
        return base.to_path_buf();
    }

    let mut path = OsString::from(base.as_os_str());
    path.push(format!(".{generation}"));
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_open_creates_parent_dirs_and_appends() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path().join("a/b/app.log");
        fs::create_dir_all(base.parent().unwrap()).unwrap();
        fs::write(&base, b"old").unwrap();

        let mut session = Session::open(base.clone(), 0, false, Timestamp::UNIX_EPOCH).unwrap();
        assert_eq!(session.path(), base.as_path());
        assert_eq!(session.written(), 3);

        assert_eq!(session.append(b"new").unwrap(), 3);
        assert_eq!(session.written(), 6);
        session.close().unwrap();
        assert_eq!(fs::read(&base).unwrap(), b"oldnew");

        let fresh = temp_dir.path().join("c/d/app.log");
        let session = Session::open(fresh.clone(), 0, false, Timestamp::UNIX_EPOCH).unwrap();
        assert_eq!(session.written(), 0);
        assert!(fresh.exists());
    }

    #[test]
    fn test_force_new_skips_existing_names() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path().join("test.log");
        fs::write(&base, b"0").unwrap();
        fs::write(generational_path(&base, 1), b"1").unwrap();

        let mut session = Session::open(base.clone(), 0, true, Timestamp::UNIX_EPOCH).unwrap();
        assert_eq!(session.generation(), 2);
        assert_eq!(session.path(), temp_dir.path().join("test.log.2"));
        assert_eq!(session.written(), 0);
        session.append(b"2").unwrap();
        session.close().unwrap();

        assert_eq!(fs::read(&base).unwrap(), b"0");
        assert_eq!(fs::read(temp_dir.path().join("test.log.2")).unwrap(), b"2");
    }

    #[test]
    fn test_close_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path().join("app.log");

        let mut session = Session::open(base, 0, false, Timestamp::UNIX_EPOCH).unwrap();
        session.close().unwrap();
        session.close().unwrap();
        session.flush().unwrap();

        let err = session.append(b"late").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Closed);
        assert_eq!(session.written(), 0);
    }

    #[test]
    fn test_generational_path() {
        let base = Path::new("/var/log/app.log");
        assert_eq!(generational_path(base, 0), PathBuf::from("/var/log/app.log"));
        assert_eq!(generational_path(base, 7), PathBuf::from("/var/log/app.log.7"));
    }
}
