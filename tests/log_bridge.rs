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

#![cfg(feature = "bridge-log")]

use std::fs;
use std::sync::Arc;

use jiff::tz::TimeZone;
use log::LevelFilter;
use rotatelogs::RotateLogs;
use rotatelogs::bridge::LogBridge;
use tempfile::TempDir;

#[test]
fn test_log_records_rotate_by_size() {
    let temp_dir = TempDir::new().unwrap();
    let sink = RotateLogs::builder(format!("{}/app.log", temp_dir.path().display()))
        .alias(temp_dir.path().join("current"))
        .rotation_size(256)
        .max_files(2)
        .build()
        .unwrap();
    let sink = Arc::new(sink);

    LogBridge::new(sink.clone())
        .max_level(LevelFilter::Info)
        .timezone(TimeZone::UTC)
        .apply()
        .unwrap();

    for i in 0..40 {
        log::info!("Test content {i}");
        log::debug!("never written {i}");
    }
    sink.flush().unwrap();

    let mut lines = 0;
    let mut files = 0;
    for entry in fs::read_dir(temp_dir.path()).unwrap() {
        let entry = entry.unwrap();
        if !entry.file_type().unwrap().is_file() {
            continue;
        }
        files += 1;
        let content = fs::read_to_string(entry.path()).unwrap();
        assert!(content.len() <= 256, "{content}");
        assert!(!content.contains("never written"));
        lines += content.lines().count();
    }
    assert_eq!(files, 3);
    assert!(lines < 40);

    // the newest record is in the active file
    let active = fs::read_to_string(sink.current_path().unwrap()).unwrap();
    assert!(active.trim_end().ends_with("INFO log_bridge: Test content 39"), "{active}");
}
