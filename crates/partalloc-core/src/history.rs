//! LIFO allocation history.
//!
//! One entry is pushed per successful allocation. Argument-less
//! deallocation pops the most recent entry. Entries are plain handles, so a
//! region that was allocated twice appears twice and only order tells the
//! entries apart.

use crate::region::RegionHandle;

#[derive(Debug, Default, Clone)]
pub struct AllocationHistory {
    stack: Vec<RegionHandle>,
}

impl AllocationHistory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, handle: RegionHandle) {
        self.stack.push(handle);
    }

    /// Most recent allocation, removed from the history.
    pub fn pop(&mut self) -> Option<RegionHandle> {
        self.stack.pop()
    }

    #[must_use]
    pub fn peek(&self) -> Option<RegionHandle> {
        self.stack.last().copied()
    }

    /// Drops every entry for `handle`. Returns how many were removed.
    pub fn purge(&mut self, handle: RegionHandle) -> usize {
        let before = self.stack.len();
        self.stack.retain(|&entry| entry != handle);
        before - self.stack.len()
    }

    #[must_use]
    pub fn contains(&self, handle: RegionHandle) -> bool {
        self.stack.contains(&handle)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.stack.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Entries oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &RegionHandle> {
        self.stack.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pops_in_reverse_push_order() {
        let mut history = AllocationHistory::new();
        for i in 1..=3 {
            history.push(RegionHandle::from_raw(i));
        }
        assert_eq!(history.peek(), Some(RegionHandle::from_raw(3)));
        assert_eq!(history.pop(), Some(RegionHandle::from_raw(3)));
        assert_eq!(history.pop(), Some(RegionHandle::from_raw(2)));
        assert_eq!(history.pop(), Some(RegionHandle::from_raw(1)));
        assert_eq!(history.pop(), None);
        assert!(history.is_empty());
    }

    #[test]
    fn purge_removes_every_occurrence() {
        let mut history = AllocationHistory::new();
        let a = RegionHandle::from_raw(1);
        let b = RegionHandle::from_raw(2);
        history.push(a);
        history.push(b);
        history.push(a);
        assert_eq!(history.purge(a), 2);
        assert!(!history.contains(a));
        assert_eq!(history.iter().copied().collect::<Vec<_>>(), vec![b]);
        assert_eq!(history.purge(a), 0);
    }
}
