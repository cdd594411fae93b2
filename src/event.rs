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
use std::path::Path;
use std::path::PathBuf;

use crate::policy::Trigger;

/// Describes a completed rotation.
#[derive(Debug, Clone)]
pub struct RotationEvent {
    previous: Option<PathBuf>,
    current: PathBuf,
    trigger: Trigger,
}

impl RotationEvent {
    pub(crate) fn new(previous: Option<PathBuf>, current: PathBuf, trigger: Trigger) -> Self {
        Self {
            previous,
            current,
            trigger,
        }
    }

    /// The file that was active before the rotation, if any.
    pub fn previous(&self) -> Option<&Path> {
        self.previous.as_deref()
    }

    /// The file that is active now.
    pub fn current(&self) -> &Path {
        &self.current
    }

    /// Why the rotation happened.
    pub fn trigger(&self) -> Trigger {
        self.trigger
    }
}

/// Notified after every rotation, while the sink is still locked.
///
/// Handlers must not write to the sink that notifies them.
pub trait RotationHandler: fmt::Debug + Send + Sync + 'static {
    /// Handle a completed rotation.
    fn on_rotate(&self, event: &RotationEvent);
}

impl<T: RotationHandler> From<T> for Box<dyn RotationHandler> {
    fn from(value: T) -> Self {
        Box::new(value)
    }
}
