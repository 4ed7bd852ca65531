// Copyright 2024, The Android Open Source Project
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

use std::{
    sync::{Condvar, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

/// A mutex with an associated condition variable.
///
/// Lock poisoning is ignored. No critical section leaves the guarded state half-updated.
#[derive(Debug, Default)]
pub struct Monitor<T> {
    state: Mutex<T>,
    cv: Condvar,
}

impl<T> Monitor<T> {
    /// Creates a new mutex wrapping the given value, and a new condition variable to go with it.
    pub fn new(state: T) -> Self {
        Self { state: Mutex::new(state), cv: Condvar::default() }
    }

    /// Locks the mutex.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wakes up every thread blocked in one of the `wait_*` methods so that it re-checks its
    /// condition.
    pub fn notify_all(&self) {
        self.cv.notify_all()
    }

    /// Waits on the condition variable while the given condition holds true on the contents of the
    /// mutex.
    ///
    /// Blocks until the condition variable is notified and the function returns false.
    pub fn wait_while(&self, condition: impl FnMut(&mut T) -> bool) -> MutexGuard<'_, T> {
        self.cv.wait_while(self.lock(), condition).unwrap_or_else(PoisonError::into_inner)
    }

    /// Waits on the condition variable while the given condition holds true on the contents of the
    /// mutex, with a timeout.
    ///
    /// Returns the guard and whether the timeout elapsed with the condition still holding.
    pub fn wait_timeout_while(
        &self,
        timeout: Duration,
        condition: impl FnMut(&mut T) -> bool,
    ) -> (MutexGuard<'_, T>, bool) {
        let (guard, result) = self
            .cv
            .wait_timeout_while(self.lock(), timeout, condition)
            .unwrap_or_else(PoisonError::into_inner);
        (guard, result.timed_out())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn wait_timeout_while_times_out_if_condition_holds() {
        let monitor = Monitor::new(false);
        let (guard, timed_out) = monitor.wait_timeout_while(Duration::from_millis(10), |v| !*v);
        assert!(timed_out);
        assert!(!*guard);
    }

    #[test]
    fn wait_while_returns_once_notified() {
        let monitor = Arc::new(Monitor::new(false));
        let setter = {
            let monitor = monitor.clone();
            thread::spawn(move || {
                *monitor.lock() = true;
                monitor.notify_all();
            })
        };
        let guard = monitor.wait_while(|v| !*v);
        assert!(*guard);
        drop(guard);
        setter.join().unwrap();
    }
}
