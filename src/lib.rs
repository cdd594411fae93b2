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

//! A rotating output sink for append-only log streams.
//!
//! [`RotateLogs`] presents a single write destination while splitting the physical output across
//! files. The file name comes from a path template with `strftime`-style directives, so a new
//! file starts whenever the template resolves to a new path; an optional size limit starts a new
//! file (with a `.N` suffix) within the same time window. Old files beyond a retention count or
//! age are deleted, and an optional alias always links to the active file.
//!
//! # Examples
//!
//! ```
//! use std::io::Write;
//!
//! use rotatelogs::RotateLogs;
//!
//! let dir = tempfile::tempdir().unwrap();
//! let mut sink = RotateLogs::builder(format!("{}/app.%Y%m%d%H", dir.path().display()))
//!     .alias(dir.path().join("current.log"))
//!     .rotation_size(1024 * 1024)
//!     .max_files(24)
//!     .build()
//!     .unwrap();
//!
//! writeln!(sink, "Hello rotating file!").unwrap();
//! ```

#![cfg_attr(docsrs, feature(doc_auto_cfg))]

#[cfg(feature = "bridge-log")]
pub mod bridge;
pub mod trap;

mod alias;
mod clock;
mod error;
mod event;
mod pattern;
mod policy;
mod retention;
mod session;
mod writer;

pub use self::clock::Clock;
pub use self::clock::ManualClock;
pub use self::clock::SystemClock;
pub use self::error::Error;
pub use self::error::ErrorKind;
pub use self::event::RotationEvent;
pub use self::event::RotationHandler;
pub use self::pattern::resolve;
pub use self::policy::Trigger;
pub use self::retention::HistoryEntry;
pub use self::trap::Trap;
pub use self::writer::RotateLogs;
pub use self::writer::RotateLogsBuilder;
