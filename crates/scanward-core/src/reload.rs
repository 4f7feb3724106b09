//! Counter of in-flight global reloads.

use tracing::warn;

use crate::engine::is_global;

/// Tracks global reloads reported by the engine so that redundant
/// `reload` commands can be dropped while one is outstanding.
#[derive(Debug, Default)]
pub struct ReloadGuard {
    in_flight: u32,
}

impl ReloadGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> u32 {
        self.in_flight
    }

    /// Whether a global reload is outstanding
    pub fn is_reloading(&self) -> bool {
        self.in_flight > 0
    }

    /// Returns `true` when the event was counted.
    pub fn on_started(&mut self, entry_point: Option<&str>) -> bool {
        if !is_global(entry_point) {
            return false;
        }
        self.in_flight += 1;
        true
    }

    /// Returns `true` when the event was a global completion.
    pub fn on_completed(&mut self, entry_point: Option<&str>) -> bool {
        if !is_global(entry_point) {
            return false;
        }
        match self.in_flight.checked_sub(1) {
            Some(n) => self.in_flight = n,
            None => warn!("Global reload completed without a matching start"),
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_reload_counted() {
        let mut guard = ReloadGuard::new();
        assert!(guard.on_started(None));
        assert!(guard.on_started(Some("")));
        assert_eq!(guard.count(), 2);

        assert!(guard.on_completed(None));
        assert!(guard.is_reloading());
        assert!(guard.on_completed(Some("")));
        assert!(!guard.is_reloading());
    }

    #[test]
    fn test_scoped_reload_ignored() {
        let mut guard = ReloadGuard::new();
        assert!(!guard.on_started(Some("/x")));
        assert_eq!(guard.count(), 0);
        assert!(!guard.on_completed(Some("/x")));
        assert_eq!(guard.count(), 0);
    }

    #[test]
    fn test_never_negative() {
        let mut guard = ReloadGuard::new();
        assert!(guard.on_completed(None));
        assert_eq!(guard.count(), 0);

        guard.on_started(None);
        assert_eq!(guard.count(), 1);
    }
}
