//! The `SyncGlue` consumed interface (spec.md §4.8 / §6, C9).
//!
//! A real lock/semaphore module is out of scope as a library surface (spec.md
//! §1) — higher layers are expected to bring their own. This crate still needs
//! one concrete conformance type to exercise the donation machinery end to
//! end, so `Lock` implements exactly the contract spec.md §4.8 describes: an
//! interrupt-disable-guarded holder + FIFO-by-priority waiters queue with a
//! cached `max_waiter_priority`, nothing else. Mutual exclusion itself is
//! provided by the kernel's interrupt-disable discipline, the same way the
//! teacher's own `spin`-backed fields are guarded (spec.md §5).

use alloc::collections::VecDeque;

use crate::thread::ThreadId;

struct LockState {
    holder: Option<ThreadId>,
    waiters: VecDeque<(u8, ThreadId)>,
    max_waiter_priority: u8,
}

/// A held/contended lock for the donation machinery (spec.md §3's `Lock`
/// consumed interface). Expected to be embedded in a `static` the way a
/// bare-metal kernel ordinarily owns its synchronization primitives.
pub struct Lock {
    id: u32,
    state: spin::Mutex<LockState>,
}

impl Lock {
    pub const fn new(id: u32) -> Self {
        Lock {
            id,
            state: spin::Mutex::new(LockState {
                holder: None,
                waiters: VecDeque::new(),
                max_waiter_priority: 0,
            }),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn holder(&self) -> Option<ThreadId> {
        self.state.lock().holder
    }

    /// Cached highest priority among current waiters, 0 if none are waiting
    /// (spec.md §3's `Lock.max_waiter_priority`).
    pub fn max_waiter_priority(&self) -> u8 {
        self.state.lock().max_waiter_priority
    }

    pub(crate) fn set_holder(&self, holder: Option<ThreadId>) {
        self.state.lock().holder = holder;
    }

    /// Queue `waiter` at `priority`, ordered descending with FIFO among
    /// equals (spec.md §4.8), and refresh the cached max.
    pub(crate) fn add_waiter(&self, waiter: ThreadId, priority: u8) {
        let mut state = self.state.lock();
        let pos = state
            .waiters
            .iter()
            .position(|&(p, _)| p < priority)
            .unwrap_or(state.waiters.len());
        state.waiters.insert(pos, (priority, waiter));
        state.max_waiter_priority = state.waiters.front().map(|&(p, _)| p).unwrap_or(0);
    }

    /// Remove `waiter` from the queue without waking it (used when a waiter
    /// is torn down while still contending for the lock). Refreshes the
    /// cached max.
    pub(crate) fn remove_waiter(&self, waiter: ThreadId) {
        let mut state = self.state.lock();
        if let Some(pos) = state.waiters.iter().position(|&(_, id)| id == waiter) {
            state.waiters.remove(pos);
        }
        state.max_waiter_priority = state.waiters.front().map(|&(p, _)| p).unwrap_or(0);
    }

    /// Pop the highest-priority waiter (earliest among equals), refreshing
    /// the cached max from whoever is left (spec.md §4.6 "on lock release").
    pub(crate) fn pop_highest_waiter(&self) -> Option<ThreadId> {
        let mut state = self.state.lock();
        let popped = state.waiters.pop_front().map(|(_, id)| id);
        state.max_waiter_priority = state.waiters.front().map(|&(p, _)| p).unwrap_or(0);
        popped
    }

    pub fn has_waiters(&self) -> bool {
        !self.state.lock().waiters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tid(n: u64) -> ThreadId {
        ThreadId::for_test(n)
    }

    #[test]
    fn waiters_ordered_by_priority_fifo_within_band() {
        let lock = Lock::new(1);
        lock.add_waiter(tid(1), 20);
        lock.add_waiter(tid(2), 30);
        lock.add_waiter(tid(3), 20);
        assert_eq!(lock.max_waiter_priority(), 30);
        assert_eq!(lock.pop_highest_waiter(), Some(tid(2)));
        assert_eq!(lock.max_waiter_priority(), 20);
        assert_eq!(lock.pop_highest_waiter(), Some(tid(1)));
        assert_eq!(lock.pop_highest_waiter(), Some(tid(3)));
        assert_eq!(lock.max_waiter_priority(), 0);
    }

    #[test]
    fn remove_waiter_refreshes_cached_max() {
        let lock = Lock::new(2);
        lock.add_waiter(tid(1), 10);
        lock.add_waiter(tid(2), 40);
        lock.remove_waiter(tid(2));
        assert_eq!(lock.max_waiter_priority(), 10);
    }

    #[test]
    fn holder_starts_unheld() {
        let lock = Lock::new(3);
        assert_eq!(lock.holder(), None);
        lock.set_holder(Some(tid(5)));
        assert_eq!(lock.holder(), Some(tid(5)));
    }
}
