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
use std::io;
use std::path::Path;
use std::path::PathBuf;

use crate::Error;
use crate::ErrorKind;

/// Point the symbolic link at `alias` to `target`.
///
/// A fresh link is created beside the alias and renamed over it, so readers of the alias see
/// either the old target or the new one, never a missing link.
pub(crate) fn rebind(alias: &Path, target: &Path) -> Result<(), Error> {
    if let Some(parent) = alias.parent() {
        fs::create_dir_all(parent).map_err(|err| {
            Error::new(ErrorKind::Access, "failed to create alias directory")
                .with_context("path", parent.display())
                .with_source(err)
        })?;
    }

    // a link next to its target survives moving the whole directory
    let link_target = match (alias.parent(), target.parent(), target.file_name()) {
        (Some(a), Some(t), Some(name)) if a == t => Path::new(name),
        _ => target,
    };

    let staging = staging_path(alias);
    match fs::remove_file(&staging) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => {
            return Err(Error::new(ErrorKind::Access, "failed to remove stale alias")
                .with_context("path", staging.display())
                .with_source(err));
        }
    }

    symlink(link_target, &staging).map_err(|err| {
        Error::new(ErrorKind::Access, "failed to create alias")
            .with_context("alias", staging.display())
            .with_context("target", link_target.display())
            .with_source(err)
    })?;

    fs::rename(&staging, alias).map_err(|err| {
        let _ = fs::remove_file(&staging);
        Error::new(ErrorKind::Access, "failed to move alias into place")
            .with_context("alias", alias.display())
            .with_context("target", target.display())
            .with_source(err)
    })
}

fn staging_path(alias: &Path) -> PathBuf {
    let mut path = OsString::from(alias.as_os_str());
    path.push("_symlink");
    PathBuf::from(path)
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}

#[cfg(not(any(unix, windows)))]
fn symlink(_: &Path, _: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "symbolic links are not supported on this platform",
    ))
}

#[cfg(all(test, unix))]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_rebind_follows_active_file() {
        let temp_dir = TempDir::new().unwrap();
        let alias = temp_dir.path().join("current");
        let first = temp_dir.path().join("app.1");
        let second = temp_dir.path().join("app.2");
        fs::write(&first, b"first").unwrap();
        fs::write(&second, b"second").unwrap();

        rebind(&alias, &first).unwrap();
        assert_eq!(fs::read(&alias).unwrap(), b"first");
        assert_eq!(fs::read_link(&alias).unwrap(), PathBuf::from("app.1"));

        rebind(&alias, &second).unwrap();
        assert_eq!(fs::read(&alias).unwrap(), b"second");
        assert!(!staging_path(&alias).exists());
    }

    #[test]
    fn test_rebind_across_directories() {
        let temp_dir = TempDir::new().unwrap();
        let alias = temp_dir.path().join("links/current");
        let target = temp_dir.path().join("app.log");
        fs::write(&target, b"data").unwrap();

        rebind(&alias, &target).unwrap();
        assert_eq!(fs::read_link(&alias).unwrap(), target);
        assert_eq!(fs::read(&alias).unwrap(), b"data");
    }

    #[test]
    fn test_rebind_onto_directory_fails() {
        let temp_dir = TempDir::new().unwrap();
        let alias = temp_dir.path().join("current");
        fs::create_dir(&alias).unwrap();
        fs::create_dir(alias.join("keep")).unwrap();
        let target = temp_dir.path().join("app.log");
        fs::write(&target, b"data").unwrap();

        let err = rebind(&alias, &target).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Access);
        assert!(!staging_path(&alias).exists());
    }
}
