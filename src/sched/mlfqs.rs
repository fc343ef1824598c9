//! 4.4BSD-style multi-level feedback queue scheduling (spec.md §4.7, C8).
//!
//! All arithmetic goes through [`crate::fixedpoint::Fixed`] (17.14
//! fixed-point); nothing here uses floats, matching the "no softfloat
//! dependency" constraint spec.md §1 carries forward from the original
//! kernel this policy is modeled on.

use alloc::vec::Vec;

use crate::fixedpoint::Fixed;
use crate::thread::{Arena, ThreadId};

use super::{priority, RunQueues};

/// `priority = PRI_MAX − round(recent_cpu / 4) − 2·nice`, clamped to
/// `[PRI_MIN, PRI_MAX]` (spec.md §4.7).
pub fn compute_priority(recent_cpu: Fixed, nice: i8) -> u8 {
    let cpu_term = recent_cpu.div_int(4).round();
    let raw = priority::MAX as i32 - cpu_term - 2 * (nice as i32);
    raw.clamp(priority::MIN as i32, priority::MAX as i32) as u8
}

/// Every 4 ticks: recompute every thread's priority from its current
/// `recent_cpu`/`nice`, then re-sort the ready list (spec.md §4.5 step 4).
/// Under MLFQS, `base_priority` tracks `effective_priority` too since
/// explicit `set_priority` is a no-op (spec.md §4.6's last line) and
/// donation is irrelevant once MLFQS drives the number directly.
pub fn recompute_priorities<C>(arena: &mut Arena<C>, queues: &mut RunQueues) {
    let ids: Vec<ThreadId> = queues.all.iter().collect();
    for id in ids {
        let block = match arena.get_mut(id) {
            Some(b) => b,
            None => continue,
        };
        let p = compute_priority(block.recent_cpu(), block.nice());
        block.set_base_priority(p);
        block.set_effective_priority(p);
    }
    queues
        .ready
        .resort(|id| arena.get(id).map(|b| b.effective_priority()).unwrap_or(0));
}

/// Every `TIMER_FREQ` ticks (1 second): recompute `load_avg` from the
/// current ready-thread count, then every thread's `recent_cpu` from the
/// new `load_avg` (spec.md §4.7).
///
/// `ready_threads = |ready list| + 1` if the current thread is non-idle,
/// matching spec.md's exact formula.
pub fn recompute_load_avg_and_recent_cpu<C>(
    arena: &mut Arena<C>,
    queues: &RunQueues,
    current_is_non_idle: bool,
    load_avg: &mut Fixed,
) {
    let ready_threads = queues.ready.len() as i32 + if current_is_non_idle { 1 } else { 0 };

    let coeff_59_60 = Fixed::from_int(59).div_int(60);
    let coeff_1_60 = Fixed::from_int(1).div_int(60);
    *load_avg = coeff_59_60.mul(*load_avg).add(coeff_1_60.mul_int(ready_threads));

    let two_load = load_avg.mul_int(2);
    let coeff = two_load.div(two_load.add_int(1));

    for id in queues.all.iter() {
        if let Some(block) = arena.get_mut(id) {
            let updated = coeff.mul(block.recent_cpu()).add_int(block.nice() as i32);
            block.set_recent_cpu(updated);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::{PageAllocator, SystemPageAllocator};
    use crate::thread::ThreadSpec;
    use alloc::string::String;

    fn spawn(arena: &mut Arena<()>, queues: &mut RunQueues, nice: i8) -> ThreadId {
        let spec = ThreadSpec {
            name: String::from("t"),
            priority: priority::DEFAULT,
            nice,
            page: SystemPageAllocator.allocate().expect("page"),
        };
        let (id, _) = arena.insert(spec, |_| ());
        queues.ready.insert(id, priority::DEFAULT);
        queues.all.push(id);
        id
    }

    #[test]
    fn compute_priority_matches_spec_formula() {
        // nice=0, recent_cpu=0 -> PRI_MAX
        assert_eq!(compute_priority(Fixed::ZERO, 0), priority::MAX);
        // recent_cpu = 80 (20 ticks *4) -> round(80/4)=20
        assert_eq!(
            compute_priority(Fixed::from_int(80), 0),
            priority::MAX - 20
        );
        // nice raises the subtrahend by 2*nice
        assert_eq!(
            compute_priority(Fixed::ZERO, 10),
            priority::MAX - 20
        );
    }

    #[test]
    fn compute_priority_clamps_to_valid_range() {
        assert_eq!(compute_priority(Fixed::from_int(1000), 20), priority::MIN);
        assert_eq!(compute_priority(Fixed::ZERO, -20), priority::MAX);
    }

    #[test]
    fn recompute_priorities_resorts_ready_list() {
        let mut arena: Arena<()> = Arena::new();
        let mut queues = RunQueues::new();
        let low_nice = spawn(&mut arena, &mut queues, 10); // lower priority after recompute
        let high_nice = spawn(&mut arena, &mut queues, -10); // higher priority after recompute

        recompute_priorities(&mut arena, &mut queues);

        let top = queues.ready.pop_highest().unwrap();
        assert_eq!(top, high_nice);
        assert_eq!(queues.ready.pop_highest(), Some(low_nice));
    }

    #[test]
    fn one_second_idle_recompute_yields_load_avg_one_sixtieth() {
        let mut arena: Arena<()> = Arena::new();
        let mut queues = RunQueues::new();
        let _t = spawn(&mut arena, &mut queues, 0);
        queues.ready.pop_highest(); // thread is "current", not ready

        let mut load_avg = Fixed::ZERO;
        recompute_load_avg_and_recent_cpu(&mut arena, &queues, true, &mut load_avg);

        assert_eq!(load_avg.scaled_round(100), 2); // ~1/60 * 100 rounds to 2
    }

    #[test]
    fn recent_cpu_decays_with_nice_offset() {
        let mut arena: Arena<()> = Arena::new();
        let mut queues = RunQueues::new();
        let t = spawn(&mut arena, &mut queues, 5);
        arena.get_mut(t).unwrap().set_recent_cpu(Fixed::from_int(100));
        queues.ready.pop_highest();

        let mut load_avg = Fixed::from_int(1);
        recompute_load_avg_and_recent_cpu(&mut arena, &queues, true, &mut load_avg);

        let recent = arena.get(t).unwrap().recent_cpu();
        // coeff = 2/3 for load_avg=1 -> 100*2/3 + 5 ~= 71
        assert!(recent.round() >= 70 && recent.round() <= 72);
    }
}
