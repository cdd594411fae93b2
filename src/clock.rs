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
use std::sync::Arc;
use std::sync::Mutex;

use jiff::SignedDuration;
use jiff::Timestamp;

/// A source of the current instant.
pub trait Clock: fmt::Debug + Send + Sync + 'static {
    /// Return the current instant.
    fn now(&self) -> Timestamp;
}

impl<T: Clock> From<T> for Box<dyn Clock> {
    fn from(value: T) -> Self {
        Box::new(value)
    }
}

/// The wall clock.
#[derive(Debug, Default, Clone, Copy)]
#[non_exhaustive]
pub struct SystemClock {}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// The time could be reset.
///
/// Clones share the same instant, so a test can keep one handle and hand another to the sink.
///
/// # Examples
///
/// ```
/// use jiff::SignedDuration;
/// use jiff::Timestamp;
/// use rotatelogs::ManualClock;
///
/// let clock = ManualClock::new(Timestamp::UNIX_EPOCH);
/// let handle = clock.clone();
/// handle.advance(SignedDuration::from_secs(1));
/// assert_eq!(clock.now().as_second(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Timestamp>>,
}

impl ManualClock {
    /// Create a manual clock that starts at `now`.
    pub fn new(now: Timestamp) -> ManualClock {
        ManualClock {
            now: Arc::new(Mutex::new(now)),
        }
    }

    /// Return the current instant of this clock.
    pub fn now(&self) -> Timestamp {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Reset the current instant.
    pub fn set_now(&self, now: Timestamp) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    /// Move the current instant forward, or backward for a negative duration.
    ///
    /// The instant is left unchanged if the result would overflow.
    pub fn advance(&self, duration: SignedDuration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        if let Ok(next) = now.checked_add(duration) {
            *now = next;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        ManualClock::now(self)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn test_manual_clock_adjusting() {
        let now = Timestamp::from_str("2023-01-01T12:00:00Z").unwrap();
        let clock = ManualClock::new(now);
        assert_eq!(clock.now(), now);

        let now = Timestamp::from_str("2024-01-01T12:00:00Z").unwrap();
        clock.set_now(now);
        assert_eq!(clock.now(), now);
    }

    #[test]
    fn test_manual_clock_clones_share_time() {
        let start = Timestamp::from_str("2024-08-10T00:00:00Z").unwrap();
        let clock = ManualClock::new(start);
        let boxed: Box<dyn Clock> = clock.clone().into();

        clock.advance(SignedDuration::from_millis(1500));
        assert_eq!(
            boxed.now(),
            start.checked_add(SignedDuration::from_millis(1500)).unwrap()
        );
    }
}
