//! Priority donation through held locks (spec.md §4.6, C7).
//!
//! Free functions rather than methods on `Kernel` because they only need a
//! thread arena and the ready list — `Kernel::lock_acquire`/`lock_release`
//! (in `crate::kernel`) hold the interrupt-disable discipline and call
//! straight into these.

use alloc::vec::Vec;

use crate::sync::Lock;
use crate::thread::{Arena, ThreadId, ThreadState};

use super::RunQueues;

/// Bound on the donation chain walk (spec.md §4.6: "8 is traditional").
/// Exceeding it is a silent no-op, not an error (spec.md §7).
pub const DONATION_DEPTH: u32 = 8;

/// Recompute `t.effective_priority = max(base, max(owned lock's cached
/// max_waiter_priority))` (spec.md §3 invariant 6) and, if `t` is on the
/// ready list, re-insert it to preserve invariant 4.
pub fn refresh_effective<C>(arena: &mut Arena<C>, queues: &mut RunQueues, id: ThreadId) {
    let (base, donated, was_ready) = {
        let block = arena.get(id).expect("refresh_effective: unknown thread");
        let donated = block
            .owned_locks()
            .iter()
            .map(|lock| lock.max_waiter_priority())
            .max()
            .unwrap_or(0);
        (
            block.base_priority(),
            donated,
            block.state() == ThreadState::Ready,
        )
    };

    let new_priority = base.max(donated);
    let block = arena
        .get_mut(id)
        .expect("refresh_effective: unknown thread");
    let changed = block.effective_priority() != new_priority;
    block.set_effective_priority(new_priority);

    if changed && was_ready {
        queues.ready.remove(id);
        queues.ready.insert(id, new_priority);
    }
}

/// `waiter` has just joined `lock`'s wait queue at its current effective
/// priority; walk the donation chain through whoever holds `lock`, and
/// transitively through whoever *they're* waiting on (spec.md §4.6).
///
/// Bounded at [`DONATION_DEPTH`]; in debug builds also asserts the walk
/// never revisits a thread id (spec.md §9's cycle-freedom assumption).
pub fn donate_chain<C>(arena: &mut Arena<C>, queues: &mut RunQueues, lock: &'static Lock) {
    let mut current_lock = Some(lock);
    let mut depth = 0u32;
    #[cfg(debug_assertions)]
    let mut seen: Vec<ThreadId> = Vec::new();

    while let Some(l) = current_lock {
        if depth >= DONATION_DEPTH {
            break;
        }
        depth += 1;

        let Some(holder) = l.holder() else {
            break;
        };

        #[cfg(debug_assertions)]
        {
            debug_assert!(!seen.contains(&holder), "donation chain revisited a thread");
            seen.push(holder);
        }

        refresh_effective(arena, queues, holder);

        current_lock = arena.get(holder).and_then(|b| b.waiting_on());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::{PageAllocator, SystemPageAllocator};
    use crate::thread::{ThreadSpec, ThreadState};
    use alloc::string::String;

    fn spawn<C: Default>(arena: &mut Arena<C>, queues: &mut RunQueues, name: &str, priority: u8) -> ThreadId {
        let spec = ThreadSpec {
            name: String::from(name),
            priority,
            nice: 0,
            page: SystemPageAllocator.allocate().expect("page"),
        };
        let (id, _) = arena.insert(spec, |_| C::default());
        queues.ready.insert(id, priority);
        queues.all.push(id);
        id
    }

    #[test]
    fn refresh_effective_raises_priority_from_owned_lock() {
        let mut arena: Arena<()> = Arena::new();
        let mut queues = RunQueues::new();
        let low = spawn(&mut arena, &mut queues, "low", 10);

        let lock = alloc::boxed::Box::leak(alloc::boxed::Box::new(Lock::new(1)));
        lock.set_holder(Some(low));
        lock.add_waiter(ThreadId::for_test(99), 30);
        arena.get_mut(low).unwrap().owned_locks_mut().push(lock);

        refresh_effective(&mut arena, &mut queues, low);
        assert_eq!(arena.get(low).unwrap().effective_priority(), 30);
    }

    #[test]
    fn refresh_effective_reorders_ready_list() {
        let mut arena: Arena<()> = Arena::new();
        let mut queues = RunQueues::new();
        let low = spawn(&mut arena, &mut queues, "low", 10);
        let _mid = spawn(&mut arena, &mut queues, "mid", 20);

        let lock = alloc::boxed::Box::leak(alloc::boxed::Box::new(Lock::new(2)));
        lock.set_holder(Some(low));
        lock.add_waiter(ThreadId::for_test(100), 40);
        arena.get_mut(low).unwrap().owned_locks_mut().push(lock);
        arena
            .get_mut(low)
            .unwrap()
            .set_state(ThreadState::Ready);

        refresh_effective(&mut arena, &mut queues, low);
        assert_eq!(queues.ready.pop_highest(), Some(low));
    }

    #[test]
    fn donation_chain_raises_every_link_to_the_highest_waiter() {
        let mut arena: Arena<()> = Arena::new();
        let mut queues = RunQueues::new();
        let l = spawn(&mut arena, &mut queues, "L", 10);
        let m = spawn(&mut arena, &mut queues, "M", 20);
        let h = spawn(&mut arena, &mut queues, "H", 30);

        let lock_lm = alloc::boxed::Box::leak(alloc::boxed::Box::new(Lock::new(10)));
        let lock_mh = alloc::boxed::Box::leak(alloc::boxed::Box::new(Lock::new(11)));

        // L holds lock_lm, M holds lock_mh and waits on lock_lm.
        lock_lm.set_holder(Some(l));
        lock_mh.set_holder(Some(m));
        arena.get_mut(l).unwrap().owned_locks_mut().push(lock_lm);
        arena.get_mut(m).unwrap().owned_locks_mut().push(lock_mh);

        // M joins lock_lm's wait queue at its own priority (20), donating.
        lock_lm.add_waiter(m, 20);
        arena.get_mut(m).unwrap().set_waiting_on(Some(lock_lm));
        donate_chain(&mut arena, &mut queues, lock_lm);
        assert_eq!(arena.get(l).unwrap().effective_priority(), 20);

        // H joins lock_mh's wait queue at 30, donating through M to L.
        lock_mh.add_waiter(h, 30);
        arena.get_mut(h).unwrap().set_waiting_on(Some(lock_mh));
        donate_chain(&mut arena, &mut queues, lock_mh);

        assert_eq!(arena.get(m).unwrap().effective_priority(), 30);
        assert_eq!(arena.get(l).unwrap().effective_priority(), 30);
    }

    #[test]
    fn donation_chain_stops_at_depth_bound_without_erroring() {
        let mut arena: Arena<()> = Arena::new();
        let mut queues = RunQueues::new();
        let mut ids = Vec::new();
        for i in 0..(DONATION_DEPTH + 4) {
            ids.push(spawn(&mut arena, &mut queues, "t", 10 + i as u8));
        }
        let mut locks = Vec::new();
        for i in 0..ids.len() - 1 {
            let lock = alloc::boxed::Box::leak(alloc::boxed::Box::new(Lock::new(100 + i as u32)));
            lock.set_holder(Some(ids[i]));
            arena.get_mut(ids[i]).unwrap().owned_locks_mut().push(lock);
            locks.push(lock);
        }
        for i in 0..locks.len() {
            let waiter = ids[i + 1];
            let priority = arena.get(waiter).unwrap().effective_priority();
            locks[i].add_waiter(waiter, priority);
            arena.get_mut(waiter).unwrap().set_waiting_on(Some(locks[i]));
        }

        // Donating from the far end must not panic even though the chain
        // exceeds DONATION_DEPTH.
        donate_chain(&mut arena, &mut queues, locks[locks.len() - 1]);
    }
}
