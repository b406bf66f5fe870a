//! Nested transaction depth.

/// Tracks how many transaction levels are open.
///
/// Commit and rollback at depth zero are no-ops. A deadlock collapses every
/// open level at once through [`reset`](Self::reset).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionTracker {
    level: usize,
}

impl TransactionTracker {
    /// Creates a tracker with no open transaction.
    #[must_use]
    pub const fn new() -> Self {
        Self { level: 0 }
    }

    /// Opens a level and returns the new depth.
    pub fn start(&mut self) -> usize {
        self.level += 1;
        self.level
    }

    /// Closes the innermost level by committing it.
    ///
    /// Returns false if no level was open.
    pub fn commit(&mut self) -> bool {
        self.close()
    }

    /// Closes the innermost level by rolling it back.
    ///
    /// Returns false if no level was open.
    pub fn rollback(&mut self) -> bool {
        self.close()
    }

    /// Current depth.
    #[must_use]
    pub const fn level(&self) -> usize {
        self.level
    }

    /// Returns true if at least one level is open.
    #[must_use]
    pub const fn in_transaction(&self) -> bool {
        self.level > 0
    }

    /// Drops every open level.
    pub fn reset(&mut self) {
        self.level = 0;
    }

    /// Forces the depth, used to mirror a remote peer.
    pub fn set_level(&mut self, level: usize) {
        self.level = level;
    }

    fn close(&mut self) -> bool {
        if self.level == 0 {
            return false;
        }
        self.level -= 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_levels() {
        let mut tracker = TransactionTracker::new();
        assert_eq!(tracker.level(), 0);
        assert_eq!(tracker.start(), 1);
        assert_eq!(tracker.start(), 2);
        assert!(tracker.commit());
        assert_eq!(tracker.level(), 1);
        assert!(tracker.rollback());
        assert_eq!(tracker.level(), 0);
        assert!(!tracker.in_transaction());
    }

    #[test]
    fn close_at_zero_is_noop() {
        let mut tracker = TransactionTracker::new();
        assert!(!tracker.commit());
        assert!(!tracker.rollback());
        assert_eq!(tracker.level(), 0);
    }

    #[test]
    fn reset_collapses_all_levels() {
        let mut tracker = TransactionTracker::new();
        tracker.start();
        tracker.start();
        tracker.start();
        tracker.reset();
        assert_eq!(tracker.level(), 0);
    }
}
