//! Scheduling policy: run queues, priority donation, and MLFQS
//! (spec.md §4.2-§4.7, components C3-C4, C7-C8).
//!
//! The actual `schedule()`/`schedule_tail()`/`next_to_run()` state machine
//! lives on `Kernel` in `crate::kernel` (it needs the thread arena, the
//! architecture's context type, and the page allocator all at once); this
//! module holds the policy pieces that operate purely on `RunQueues` and a
//! thread arena: ordering, donation, and the 4.4BSD recompute loop.

pub mod donation;
pub mod mlfqs;
pub mod queues;
pub mod timer;

pub use queues::RunQueues;

/// Priority constants (spec.md §6).
pub mod priority {
    pub const MIN: u8 = 0;
    pub const DEFAULT: u8 = 31;
    pub const MAX: u8 = 63;

    pub fn in_range(p: u8) -> bool {
        (MIN..=MAX).contains(&p)
    }
}

/// `nice` range MLFQS threads may set (spec.md §3).
pub const NICE_MIN: i8 = -20;
pub const NICE_MAX: i8 = 20;

pub fn nice_in_range(n: i8) -> bool {
    (NICE_MIN..=NICE_MAX).contains(&n)
}

/// Ticks a thread may run before preemption is requested (spec.md §6).
pub const TIME_SLICE: u32 = 4;

/// Timer ticks per second; the MLFQS `load_avg`/`recent_cpu` recompute
/// cadence (spec.md glossary).
pub const TIMER_FREQ: u64 = 100;

/// Stack-overflow canary (spec.md §6).
pub const MAGIC: u32 = 0xcd6a_bf4b;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_bounds_match_spec_constants() {
        assert_eq!(priority::MIN, 0);
        assert_eq!(priority::MAX, 63);
        assert_eq!(priority::DEFAULT, 31);
        assert!(priority::in_range(31));
        assert!(!priority::in_range(64));
    }

    #[test]
    fn nice_bounds_match_spec_constants() {
        assert!(nice_in_range(-20));
        assert!(nice_in_range(20));
        assert!(!nice_in_range(-21));
        assert!(!nice_in_range(21));
    }
}
