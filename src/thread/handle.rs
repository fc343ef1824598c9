//! `JoinHandle`/`join()` (SPEC_FULL.md "Supplemented features") — a thin
//! layer over `ThreadState::Dying` plus a completion flag, kept from the
//! teacher because it is harmless, in-scope-adjacent functionality that
//! spec.md's Non-goals do not name.

use alloc::sync::Arc;
use portable_atomic::{AtomicBool, Ordering};

use super::ThreadId;

/// Shared between a `ThreadBlock` and its `JoinHandle`; outlives the
/// arena slot if the slot is recycled before the handle is dropped.
pub(crate) struct JoinSignal {
    finished: AtomicBool,
}

impl JoinSignal {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(JoinSignal {
            finished: AtomicBool::new(false),
        })
    }

    pub(crate) fn mark_finished(&self) {
        self.finished.store(true, Ordering::Release);
    }
}

pub struct JoinHandle {
    id: ThreadId,
    signal: Arc<JoinSignal>,
}

impl JoinHandle {
    pub(crate) fn new(id: ThreadId, signal: Arc<JoinSignal>) -> Self {
        JoinHandle { id, signal }
    }

    pub fn thread_id(&self) -> ThreadId {
        self.id
    }

    pub fn is_finished(&self) -> bool {
        self.signal.finished.load(Ordering::Acquire)
    }

    /// Block the calling thread (cooperatively, via repeated yields) until
    /// the joined thread reaches `ThreadState::Dying`.
    pub fn join(self) {
        while !self.is_finished() {
            crate::yield_now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_reports_finished_once_signal_is_set() {
        let signal = JoinSignal::new();
        let handle = JoinHandle::new(ThreadId::from_index(1), signal.clone());
        assert!(!handle.is_finished());
        signal.mark_finished();
        assert!(handle.is_finished());
    }
}
