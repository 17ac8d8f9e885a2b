use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct ReloadState {
    last_reload_at: Option<Instant>,
    in_progress: bool,
}

/// Shared between the source watcher and the engine: reloads are debounced
/// and never overlap.
#[derive(Debug)]
pub struct ReloadCoordinator {
    state: Mutex<ReloadState>,
    debounce: Duration,
}

impl ReloadCoordinator {
    pub fn new(debounce: Duration) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ReloadState::default()),
            debounce,
        })
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    /// Start a reload now, unless one is running or the last one started
    /// within the debounce window.
    pub fn try_begin(self: &Arc<Self>) -> Option<ReloadGuard> {
        self.try_begin_at(Instant::now())
    }

    pub fn try_begin_at(self: &Arc<Self>, now: Instant) -> Option<ReloadGuard> {
        let mut state = self.state.lock().expect("reload state poisoned");
        if state.in_progress {
            return None;
        }
        if let Some(last) = state.last_reload_at {
            if now.saturating_duration_since(last) < self.debounce {
                return None;
            }
        }
        state.in_progress = true;
        state.last_reload_at = Some(now);
        Some(ReloadGuard {
            coordinator: Arc::clone(self),
        })
    }

    pub fn in_progress(&self) -> bool {
        self.state.lock().expect("reload state poisoned").in_progress
    }

    pub fn last_reload_at(&self) -> Option<Instant> {
        self.state.lock().expect("reload state poisoned").last_reload_at
    }
}

/// Marks a reload as running until dropped.
#[derive(Debug)]
pub struct ReloadGuard {
    coordinator: Arc<ReloadCoordinator>,
}

impl Drop for ReloadGuard {
    fn drop(&mut self) {
        // Recover from poison so a panicking reload cannot wedge the watcher.
        let mut state = match self.coordinator.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.in_progress = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reloads_never_overlap() {
        let coordinator = ReloadCoordinator::new(Duration::ZERO);
        let guard = coordinator.try_begin().unwrap();
        assert!(coordinator.in_progress());
        assert!(coordinator.try_begin().is_none());

        drop(guard);
        assert!(!coordinator.in_progress());
        assert!(coordinator.try_begin().is_some());
    }

    #[test]
    fn reloads_are_debounced() {
        let coordinator = ReloadCoordinator::new(Duration::from_millis(500));
        let start = Instant::now();

        drop(coordinator.try_begin_at(start).unwrap());
        assert!(coordinator
            .try_begin_at(start + Duration::from_millis(499))
            .is_none());
        assert!(coordinator
            .try_begin_at(start + Duration::from_millis(500))
            .is_some());
        assert_eq!(coordinator.last_reload_at(), Some(start + Duration::from_millis(500)));
    }
}
