//! Timer tick bookkeeping (spec.md §4.5).
//!
//! `Kernel::on_timer_tick` (in `crate::kernel`) owns the actual state
//! machine — waking sleepers, charging the running thread, deciding
//! whether to request a reschedule — because all of those need the
//! arena, the run queues, and the scheduler mode together. This module
//! just names the recurring cadences so the kernel doesn't spell out
//! "tick % 4 == 0" inline.

use super::{TIMER_FREQ, TIME_SLICE};

/// What a given tick count requires the kernel to do, in addition to the
/// ordinary "wake due sleepers and charge the running thread" work that
/// happens on every tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickWork {
    /// The running thread has used its whole slice; the caller should
    /// request a reschedule at interrupt return (spec.md §4.5 step 3).
    pub slice_expired: bool,
    /// MLFQS priority recompute is due this tick (spec.md §4.5 step 4).
    pub recompute_priorities: bool,
    /// MLFQS `load_avg`/`recent_cpu` recompute is due this tick (spec.md
    /// §4.7). Per spec.md's literal ordering this is evaluated *after*
    /// `recompute_priorities` when both land on the same tick.
    pub recompute_load_avg: bool,
}

/// Classify `ticks_in_slice` (post-increment) and the global `tick`
/// counter into the work due this timer interrupt.
pub fn classify(ticks_in_slice: u32, tick: u64) -> TickWork {
    TickWork {
        slice_expired: ticks_in_slice >= TIME_SLICE,
        recompute_priorities: tick % 4 == 0,
        recompute_load_avg: tick % TIMER_FREQ == 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_expires_at_time_slice_boundary() {
        assert!(!classify(1, 1).slice_expired);
        assert!(!classify(3, 3).slice_expired);
        assert!(classify(4, 4).slice_expired);
    }

    #[test]
    fn priority_recompute_is_every_fourth_tick() {
        assert!(classify(1, 4).recompute_priorities);
        assert!(!classify(1, 5).recompute_priorities);
        assert!(classify(1, 8).recompute_priorities);
    }

    #[test]
    fn load_avg_recompute_is_every_timer_freq_ticks() {
        assert!(classify(1, 100).recompute_load_avg);
        assert!(!classify(1, 99).recompute_load_avg);
    }

    #[test]
    fn tick_100_triggers_both_recomputes() {
        let work = classify(1, 100);
        assert!(work.recompute_priorities);
        assert!(work.recompute_load_avg);
    }
}
