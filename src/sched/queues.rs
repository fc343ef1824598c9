//! Ready list, sleeping list, and all-threads list (spec.md §3, §4.2).
//!
//! Replaces the teacher's per-CPU, 4-priority-bucket `CpuRunQueue` /
//! lock-free `LockFreeQueue` (SMP work-stealing infrastructure, a
//! Non-goal here) with a single ordered container per list, addressed by
//! `ThreadId`. Ordering is an insertion invariant, not a thing re-sorted
//! after the fact — except the MLFQS periodic recompute, which by its
//! own definition needs a full re-sort.

use alloc::collections::VecDeque;

use crate::thread::ThreadId;

/// Ready list: strict priority order (0..=63), FIFO among threads that
/// share a priority (spec.md §3 invariant 4).
pub struct ReadyList {
    queue: VecDeque<(u8, ThreadId)>,
}

impl ReadyList {
    pub const fn new() -> Self {
        ReadyList {
            queue: VecDeque::new(),
        }
    }

    /// Insert after the last entry with a priority `>=` this one, so
    /// threads sharing a priority stay FIFO-ordered.
    pub fn insert(&mut self, id: ThreadId, priority: u8) {
        let pos = self
            .queue
            .iter()
            .position(|&(p, _)| p < priority)
            .unwrap_or(self.queue.len());
        self.queue.insert(pos, (priority, id));
    }

    pub fn pop_highest(&mut self) -> Option<ThreadId> {
        self.queue.pop_front().map(|(_, id)| id)
    }

    /// Priority of the thread at the front, without removing it (used to
    /// decide whether a priority change should trigger a yield, spec.md
    /// §4.6/§4.7).
    pub fn peek_highest_priority(&self) -> Option<u8> {
        self.queue.front().map(|&(p, _)| p)
    }

    pub fn remove(&mut self, id: ThreadId) -> bool {
        match self.queue.iter().position(|&(_, tid)| tid == id) {
            Some(pos) => {
                self.queue.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: ThreadId) -> bool {
        self.queue.iter().any(|&(_, tid)| tid == id)
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = ThreadId> + '_ {
        self.queue.iter().map(|&(_, id)| id)
    }

    /// Re-sort in place after priorities change out from under the list
    /// (the MLFQS periodic recompute, spec.md §4.7).
    pub fn resort(&mut self, priority_of: impl Fn(ThreadId) -> u8) {
        let mut entries: alloc::vec::Vec<(u8, ThreadId)> = self
            .queue
            .drain(..)
            .map(|(_, id)| (priority_of(id), id))
            .collect();
        entries.sort_by(|a, b| b.0.cmp(&a.0));
        self.queue.extend(entries);
    }
}

impl Default for ReadyList {
    fn default() -> Self {
        Self::new()
    }
}

/// Sleeping list: ascending wake-tick order (spec.md §3 invariant 5), so
/// the timer tick handler can pop every due thread with a prefix scan.
pub struct SleepingList {
    queue: VecDeque<(u64, ThreadId)>,
}

impl SleepingList {
    pub const fn new() -> Self {
        SleepingList {
            queue: VecDeque::new(),
        }
    }

    pub fn insert(&mut self, id: ThreadId, wake_tick: u64) {
        let pos = self
            .queue
            .iter()
            .position(|&(t, _)| t > wake_tick)
            .unwrap_or(self.queue.len());
        self.queue.insert(pos, (wake_tick, id));
    }

    pub fn remove(&mut self, id: ThreadId) -> bool {
        match self.queue.iter().position(|&(_, tid)| tid == id) {
            Some(pos) => {
                self.queue.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Pop every thread whose wake tick has arrived (`<= now`), in
    /// wake-tick order.
    pub fn pop_due(&mut self, now: u64) -> alloc::vec::Vec<ThreadId> {
        let mut due = alloc::vec::Vec::new();
        while matches!(self.queue.front(), Some(&(t, _)) if t <= now) {
            if let Some((_, id)) = self.queue.pop_front() {
                due.push(id);
            }
        }
        due
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }
}

impl Default for SleepingList {
    fn default() -> Self {
        Self::new()
    }
}

/// Every live thread, in creation order (spec.md §4.7's MLFQS recompute
/// walks this once per second to touch every thread's `recent_cpu`).
pub struct AllThreadsList {
    ids: VecDeque<ThreadId>,
}

impl AllThreadsList {
    pub const fn new() -> Self {
        AllThreadsList {
            ids: VecDeque::new(),
        }
    }

    pub fn push(&mut self, id: ThreadId) {
        self.ids.push_back(id);
    }

    pub fn remove(&mut self, id: ThreadId) {
        if let Some(pos) = self.ids.iter().position(|&t| t == id) {
            self.ids.remove(pos);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = ThreadId> + '_ {
        self.ids.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }
}

impl Default for AllThreadsList {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
pub struct RunQueues {
    pub ready: ReadyList,
    pub sleeping: SleepingList,
    pub all: AllThreadsList,
}

impl RunQueues {
    pub const fn new() -> Self {
        RunQueues {
            ready: ReadyList::new(),
            sleeping: SleepingList::new(),
            all: AllThreadsList::new(),
        }
    }
}
