//! Process-wide boot session flag.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Idle,
    InProgress { started: Instant },
}

/// The `Idle | InProgress` flag.
///
/// Only [`SessionFlag::try_begin`] leaves `Idle`, and only dropping the
/// returned guard goes back, so every exit path (errors and panics
/// included) resets it.
#[derive(Debug)]
pub(super) struct SessionFlag {
    state: Mutex<SessionState>,
}

impl Default for SessionFlag {
    fn default() -> Self {
        Self {
            state: Mutex::new(SessionState::Idle),
        }
    }
}

impl SessionFlag {
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enter `InProgress`, or `None` if a session is already running.
    pub(super) fn try_begin(&self) -> Option<SessionGuard<'_>> {
        let mut state = self.lock();
        match *state {
            SessionState::InProgress { started } => {
                debug!(
                    running_ms = started.elapsed().as_millis(),
                    "Boot session already in progress"
                );
                None
            }
            SessionState::Idle => {
                *state = SessionState::InProgress {
                    started: Instant::now(),
                };
                Some(SessionGuard { flag: self })
            }
        }
    }

    pub(super) fn is_in_progress(&self) -> bool {
        matches!(*self.lock(), SessionState::InProgress { .. })
    }
}

/// Holds the session in `InProgress` until dropped.
#[derive(Debug)]
pub(super) struct SessionGuard<'a> {
    flag: &'a SessionFlag,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        *self.flag.lock() = SessionState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_session() {
        let flag = SessionFlag::default();
        let guard = flag.try_begin().unwrap();
        assert!(flag.is_in_progress());
        assert!(flag.try_begin().is_none());
        drop(guard);
        assert!(!flag.is_in_progress());
        assert!(flag.try_begin().is_some());
    }

    #[test]
    fn test_reset_on_panic() {
        let flag = SessionFlag::default();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = flag.try_begin().unwrap();
            panic!("pipeline exploded");
        }));
        assert!(result.is_err());
        assert!(!flag.is_in_progress());
    }
}
