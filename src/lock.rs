use std::sync::Mutex;

use crate::error::{Error, Result};

/// What a filesystem handle is currently doing.
///
/// At most one non-`Idle` state is active per handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GfsState {
    Idle,
    Committing,
    CreatingStash,
    Merging,
    Resetting,
    CheckingOut,
}

impl std::fmt::Display for GfsState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Committing => "committing",
            Self::CreatingStash => "creating stash",
            Self::Merging => "merging",
            Self::Resetting => "resetting",
            Self::CheckingOut => "checking out",
        })
    }
}

/// Exclusive busy flag for one filesystem handle.
///
/// This is a flag, not a queue: acquiring while busy fails immediately.
#[derive(Debug)]
pub(crate) struct StateLock {
    state: Mutex<GfsState>,
}

impl Default for StateLock {
    fn default() -> Self {
        Self {
            state: Mutex::new(GfsState::Idle),
        }
    }
}

impl StateLock {
    pub(crate) fn current(&self) -> GfsState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Move from `Idle` to `busy`, or fail with [`Error::Busy`] carrying the
    /// state that is already active.
    pub(crate) fn acquire(&self, busy: GfsState) -> Result<StateGuard<'_>> {
        debug_assert!(busy != GfsState::Idle, "cannot acquire the idle state");
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if *state != GfsState::Idle {
            return Err(Error::Busy(*state));
        }
        *state = busy;
        log::trace!("state: idle -> {}", busy);
        Ok(StateGuard { lock: self, busy })
    }
}

/// Holds a busy state; dropping it returns the handle to `Idle`.
#[derive(Debug)]
pub(crate) struct StateGuard<'a> {
    lock: &'a StateLock,
    busy: GfsState,
}

impl Drop for StateGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.lock.state.lock().unwrap_or_else(|e| e.into_inner());
        *state = GfsState::Idle;
        log::trace!("state: {} -> idle", self.busy);
    }
}

/// Run `f` while holding `busy`, releasing on every exit path.
pub(crate) fn with_state<F, T>(lock: &StateLock, busy: GfsState, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    let _guard = lock.acquire(busy)?;
    f()
    // _guard drops here, returning to Idle
}
