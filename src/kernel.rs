//! Thread lifecycle (spec.md §4.4, C5) and the scheduler's own
//! `schedule`/`schedule_tail`/`next_to_run`/`on_timer_tick` state machine
//! (spec.md §4.3, §4.5, C4, C6), plus the lock-acquire/lock-release
//! donation hooks (spec.md §4.6, C7).
//!
//! `Kernel<A>` owns the one piece of mutable state every other module in
//! this crate was written to stay ignorant of: which thread is actually
//! running right now. Everything else (`sched::donation`, `sched::mlfqs`,
//! `sched::queues`, `thread::Arena`) is pure policy over an arena and a
//! set of queues; this module is where policy meets the CPU.

use alloc::string::String;
use core::marker::PhantomData;

use portable_atomic::{AtomicBool, AtomicPtr, AtomicU64, Ordering};

use crate::arch::Arch;
use crate::config::{KernelConfig, SchedulerMode};
use crate::errors::{kernel_panic, SpawnError, SpawnResult};
use crate::fixedpoint::Fixed;
use crate::mem::{PageAllocator, SystemPageAllocator};
use crate::sched::{donation, mlfqs, nice_in_range, priority, timer, RunQueues};
use crate::sync::Lock;
use crate::thread::{Arena, JoinHandle, ThreadBlock, ThreadId, ThreadSpec, ThreadState};

/// Everything guarded together so `schedule()` only ever takes one lock
/// per scheduling decision.
struct Inner<C> {
    arena: Arena<C>,
    queues: RunQueues,
    current: Option<ThreadId>,
    idle: Option<ThreadId>,
    tick: u64,
    load_avg: Fixed,
}

/// The scheduler (spec.md §4.1-§4.7) plus the lifecycle operations
/// (spec.md §4.4) that mutate it. One `Kernel` per CPU this crate is
/// built for — spec.md §5 scopes concurrency to a single hart.
pub struct Kernel<A: Arch> {
    config: KernelConfig,
    inner: spin::Mutex<Inner<A::SavedContext>>,
    page_allocator: SystemPageAllocator,
    preempt_pending: AtomicBool,
    _arch: PhantomData<A>,
}

/// The single instance of `Kernel` a bare-metal image registers with
/// [`Kernel::init`], recovered by architecture glue that can't thread a
/// `&Kernel<A>` through an interrupt handler's signature (spec.md §5's
/// "IRQ context" boundary).
static GLOBAL_KERNEL: AtomicPtr<()> = AtomicPtr::new(core::ptr::null_mut());

/// Set by the thread initiating a context switch right before it hands
/// control to `Arch::context_switch`, and read by whichever thread next
/// resumes in that same call, replacing the register-return trick a raw
/// `switch_threads` assembly routine would otherwise need to smuggle the
/// previously-running thread's id back to the resumer (spec.md §4.3's
/// "low-level context switch primitive ... returns the previously-running
/// thread"). Safe under spec.md §5's single-hart, interrupts-disabled
/// discipline: nothing else can observe or mutate it between the store
/// and the matching load.
static RESUMING_FROM: AtomicU64 = AtomicU64::new(0);

impl<A: Arch> Kernel<A> {
    pub fn new(config: KernelConfig) -> Self {
        Kernel {
            config,
            inner: spin::Mutex::new(Inner {
                arena: Arena::new(),
                queues: RunQueues::new(),
                current: None,
                idle: None,
                tick: 0,
                load_avg: Fixed::ZERO,
            }),
            page_allocator: SystemPageAllocator,
            preempt_pending: AtomicBool::new(false),
            _arch: PhantomData,
        }
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// Register this kernel as the global instance architecture glue
    /// recovers via [`get_global_kernel`], and create the idle thread
    /// (spec.md §4.4 "the idle thread"). Must run before any interrupt
    /// that could call [`Kernel::on_timer_tick`] is unmasked.
    pub fn init(&'static self) -> SpawnResult<()> {
        GLOBAL_KERNEL.store(self as *const Self as *mut (), Ordering::Release);

        let idle_name = self.config.idle_thread_name.clone();
        let handle = self.create(&idle_name, priority::MIN, 0, idle_trampoline::<A>)?;
        let idle_id = handle.thread_id();

        let mut inner = self.inner.lock();
        inner.queues.ready.remove(idle_id);
        inner.idle = Some(idle_id);
        Ok(())
    }

    // ---------------------------------------------------------------
    // Lifecycle (spec.md §4.4)
    // ---------------------------------------------------------------

    /// Create a new thread, ready to run (spec.md §4.4 `create`).
    ///
    /// Under [`SchedulerMode::Mlfqs`] the requested `priority` is ignored
    /// in favor of the MLFQS formula seeded from the creator's `nice` and
    /// `recent_cpu` (spec.md §4.7); `nice` is still taken from the
    /// caller, matching a freshly-created thread inheriting its parent's
    /// load history but choosing its own niceness.
    pub fn create(
        &self,
        name: &str,
        priority_value: u8,
        nice: i8,
        entry: fn(),
    ) -> SpawnResult<JoinHandle> {
        if !priority::in_range(priority_value) {
            return Err(SpawnError::InvalidPriority);
        }
        if !nice_in_range(nice) {
            return Err(SpawnError::InvalidNice);
        }

        let page = self
            .page_allocator
            .allocate()
            .ok_or(SpawnError::OutOfMemory)?;

        A::disable_interrupts();
        let (id, signal, new_priority, creator) = {
            let mut inner = self.inner.lock();

            let creator = inner.current.map(|cid| {
                let block = inner.arena.get(cid).expect("current thread vanished");
                (block.nice(), block.recent_cpu(), block.effective_priority())
            });

            let mlfqs_mode = self.config.mode == SchedulerMode::Mlfqs;
            let spec = ThreadSpec {
                name: String::from(name),
                priority: if mlfqs_mode { priority::DEFAULT } else { priority_value },
                nice: if mlfqs_mode {
                    creator.map(|(n, _, _)| n).unwrap_or(nice)
                } else {
                    nice
                },
                page,
            };

            let (id, signal) = inner.arena.insert(spec, |p| {
                A::init_context(thread_entry_trampoline::<A> as usize, entry as usize, p.stack_top())
            });

            if mlfqs_mode {
                let recent_cpu = creator.map(|(_, cpu, _)| cpu).unwrap_or(Fixed::ZERO);
                let block = inner.arena.get_mut(id).expect("just inserted");
                block.set_recent_cpu(recent_cpu);
                let p = mlfqs::compute_priority(recent_cpu, block.nice());
                block.set_base_priority(p);
                block.set_effective_priority(p);
            }

            let new_priority = inner.arena.get(id).expect("just inserted").effective_priority();
            inner.queues.ready.insert(id, new_priority);
            inner.queues.all.push(id);

            (id, signal, new_priority, creator)
        };
        A::enable_interrupts();

        if let Some((_, _, creator_effective)) = creator {
            if new_priority > creator_effective {
                self.yield_now();
            }
        }

        Ok(JoinHandle::new(id, signal))
    }

    /// Block the current thread (spec.md §4.4 `block`). Forbidden from
    /// interrupt context (spec.md §5).
    pub fn block(&self) {
        if A::in_interrupt_context() {
            kernel_panic(None, "block() called from interrupt context");
        }
        A::disable_interrupts();
        {
            let mut inner = self.inner.lock();
            let id = inner.current.expect("block() with no current thread");
            inner
                .arena
                .get_mut(id)
                .expect("current thread missing from arena")
                .set_state(ThreadState::Blocked);
        }
        self.schedule();
        A::enable_interrupts();
    }

    /// Move a blocked thread back to the ready list (spec.md §4.4
    /// `unblock`). Callable from interrupt context (waking a sleeper is
    /// the one scheduling action spec.md §5 allows there); does not
    /// itself preempt.
    pub fn unblock(&self, id: ThreadId) {
        A::disable_interrupts();
        {
            let mut inner = self.inner.lock();
            let block = match inner.arena.get_mut(id) {
                Some(b) => b,
                None => {
                    A::enable_interrupts();
                    kernel_panic(Some(id.as_u64()), "unblock(): unknown thread");
                }
            };
            if block.state() != ThreadState::Blocked {
                A::enable_interrupts();
                kernel_panic(Some(id.as_u64()), "unblock(): thread was not BLOCKED");
            }
            block.set_state(ThreadState::Ready);
            let p = block.effective_priority();
            inner.queues.ready.insert(id, p);
        }
        A::enable_interrupts();
    }

    /// Give up the CPU voluntarily; the current thread stays ready
    /// (spec.md §4.4 `yield`). Forbidden from interrupt context.
    pub fn yield_now(&self) {
        if A::in_interrupt_context() {
            kernel_panic(None, "yield_now() called from interrupt context");
        }
        A::disable_interrupts();
        {
            let mut inner = self.inner.lock();
            let id = inner.current.expect("yield_now() with no current thread");
            if inner.idle != Some(id) {
                let block = inner.arena.get_mut(id).expect("current thread missing");
                block.set_state(ThreadState::Ready);
                let p = block.effective_priority();
                inner.queues.ready.insert(id, p);
            }
        }
        self.schedule();
        A::enable_interrupts();
    }

    /// Put the current thread to sleep until at least `ticks` timer
    /// interrupts have fired (spec.md §4.4 `sleep`, §4.5). A no-op for
    /// `ticks == 0`.
    pub fn sleep(&self, ticks: u64) {
        if ticks == 0 {
            return;
        }
        if A::in_interrupt_context() {
            kernel_panic(None, "sleep() called from interrupt context");
        }
        A::disable_interrupts();
        {
            let mut inner = self.inner.lock();
            let id = inner.current.expect("sleep() with no current thread");
            let wake_at = inner.tick + ticks;
            let block = inner.arena.get_mut(id).expect("current thread missing");
            block.set_wake_tick(wake_at);
            block.set_state(ThreadState::Blocked);
            inner.queues.sleeping.insert(id, wake_at);
        }
        self.schedule();
        A::enable_interrupts();
    }

    /// Terminate the current thread (spec.md §4.4 `exit`). Never
    /// returns; the thread's page is freed by whichever thread's
    /// `schedule_tail` runs next.
    pub fn exit(&self) -> ! {
        if A::in_interrupt_context() {
            kernel_panic(None, "exit() called from interrupt context");
        }
        A::on_thread_exit();
        A::disable_interrupts();
        {
            let mut inner = self.inner.lock();
            let id = inner.current.expect("exit() with no current thread");
            inner.queues.all.remove(id);
            let block = inner.arena.get_mut(id).expect("current thread missing");
            block.set_state(ThreadState::Dying);
            block.join_signal().mark_finished();
        }
        self.schedule();
        unreachable!("exit(): a DYING thread must never be scheduled again");
    }

    /// Walk every live thread with interrupts disabled (spec.md §4.4
    /// `foreach`). Used for diagnostics, not scheduling decisions.
    pub fn foreach(&self, mut f: impl FnMut(&ThreadBlock<A::SavedContext>)) {
        A::disable_interrupts();
        {
            let inner = self.inner.lock();
            for id in inner.queues.all.iter() {
                if let Some(block) = inner.arena.get(id) {
                    f(block);
                }
            }
        }
        A::enable_interrupts();
    }

    pub fn current(&self) -> ThreadId {
        self.inner.lock().current.expect("current(): no running thread")
    }

    pub fn tid(&self) -> u64 {
        self.current().as_u64()
    }

    pub fn name(&self) -> String {
        let inner = self.inner.lock();
        let id = inner.current.expect("name(): no current thread");
        String::from(inner.arena.get(id).expect("current thread missing").name())
    }

    /// Explicit `set_priority` (spec.md §4.4). A no-op under MLFQS, where
    /// `recent_cpu`/`nice` alone drive `base_priority` (spec.md §4.6's
    /// last line).
    pub fn set_priority(&self, new_priority: u8) {
        if !priority::in_range(new_priority) {
            kernel_panic(None, "set_priority(): priority out of range");
        }
        if self.config.mode == SchedulerMode::Mlfqs {
            return;
        }
        A::disable_interrupts();
        let should_yield = {
            let mut inner = self.inner.lock();
            let id = inner.current.expect("set_priority() with no current thread");
            inner
                .arena
                .get_mut(id)
                .expect("current thread missing")
                .set_base_priority(new_priority);
            donation::refresh_effective(&mut inner.arena, &mut inner.queues, id);
            let effective = inner.arena.get(id).expect("current thread missing").effective_priority();
            inner
                .queues
                .ready
                .peek_highest_priority()
                .map(|p| p > effective)
                .unwrap_or(false)
        };
        A::enable_interrupts();
        if should_yield {
            self.yield_now();
        }
    }

    pub fn get_priority(&self) -> u8 {
        let inner = self.inner.lock();
        let id = inner.current.expect("get_priority() with no current thread");
        inner.arena.get(id).expect("current thread missing").effective_priority()
    }

    /// `set_nice` (spec.md §4.7): immediately recomputes the caller's own
    /// priority and yields if it's no longer the highest ready.
    pub fn set_nice(&self, nice: i8) {
        if !nice_in_range(nice) {
            kernel_panic(None, "set_nice(): value out of range");
        }
        A::disable_interrupts();
        let should_yield = {
            let mut inner = self.inner.lock();
            let id = inner.current.expect("set_nice() with no current thread");
            let block = inner.arena.get_mut(id).expect("current thread missing");
            block.set_nice(nice);
            let p = mlfqs::compute_priority(block.recent_cpu(), nice);
            block.set_base_priority(p);
            block.set_effective_priority(p);
            inner.queues.ready.peek_highest_priority().map(|rp| rp > p).unwrap_or(false)
        };
        A::enable_interrupts();
        if should_yield {
            self.yield_now();
        }
    }

    pub fn get_nice(&self) -> i8 {
        let inner = self.inner.lock();
        let id = inner.current.expect("get_nice() with no current thread");
        inner.arena.get(id).expect("current thread missing").nice()
    }

    /// `100 * load_avg`, rounded to the nearest integer (spec.md §4.7
    /// `get_load_avg`).
    pub fn get_load_avg(&self) -> i32 {
        self.inner.lock().load_avg.scaled_round(100)
    }

    /// `100 * recent_cpu` of the current thread, rounded (spec.md §4.7
    /// `get_recent_cpu`).
    pub fn get_recent_cpu(&self) -> i32 {
        let inner = self.inner.lock();
        let id = inner.current.expect("get_recent_cpu() with no current thread");
        inner.arena.get(id).expect("current thread missing").recent_cpu().scaled_round(100)
    }

    // ---------------------------------------------------------------
    // Priority donation (spec.md §4.6)
    // ---------------------------------------------------------------

    /// Acquire `lock`, donating the caller's effective priority through
    /// the chain of holders if it's contended (spec.md §4.6). Loops
    /// through [`Kernel::block`] until the lock is free.
    pub fn lock_acquire(&self, lock: &'static Lock) {
        loop {
            A::disable_interrupts();
            let acquired = {
                let mut inner = self.inner.lock();
                let id = inner.current.expect("lock_acquire() with no current thread");
                if lock.holder() == Some(id) {
                    // `lock_release` already handed the lock to us directly
                    // (owned_locks/waiting_on updated there) before waking
                    // us up; nothing left to do but stop retrying.
                    true
                } else if lock.holder().is_none() {
                    lock.set_holder(Some(id));
                    let block = inner.arena.get_mut(id).expect("current thread missing");
                    block.owned_locks_mut().push(lock);
                    block.set_waiting_on(None);
                    true
                } else {
                    let my_priority = inner.arena.get(id).expect("current thread missing").effective_priority();
                    inner.arena.get_mut(id).expect("current thread missing").set_waiting_on(Some(lock));
                    lock.add_waiter(id, my_priority);
                    donation::donate_chain(&mut inner.arena, &mut inner.queues, lock);
                    false
                }
            };
            A::enable_interrupts();
            if acquired {
                break;
            }
            self.block();
        }
    }

    /// Release `lock`: hand it to the highest-priority waiter (if any),
    /// refresh the releaser's own effective priority now that it no
    /// longer benefits from the donation, and yield if the releaser is
    /// no longer the highest-priority thread (spec.md §4.6).
    pub fn lock_release(&self, lock: &'static Lock) {
        A::disable_interrupts();
        let (waiter, should_yield) = {
            let mut inner = self.inner.lock();
            let holder = inner.current.expect("lock_release() with no current thread");
            inner
                .arena
                .get_mut(holder)
                .expect("current thread missing")
                .owned_locks_mut()
                .retain(|l| !core::ptr::eq(*l, lock));
            lock.set_holder(None);

            let waiter = lock.pop_highest_waiter();
            if let Some(w) = waiter {
                lock.set_holder(Some(w));
                let block = inner.arena.get_mut(w).expect("waiter missing from arena");
                block.owned_locks_mut().push(lock);
                block.set_waiting_on(None);
            }

            donation::refresh_effective(&mut inner.arena, &mut inner.queues, holder);

            let holder_priority = inner.arena.get(holder).expect("current thread missing").effective_priority();
            let should_yield = waiter
                .map(|w| inner.arena.get(w).expect("waiter missing from arena").effective_priority() > holder_priority)
                .unwrap_or(false);
            (waiter, should_yield)
        };
        A::enable_interrupts();

        if let Some(w) = waiter {
            self.unblock(w);
        }
        if should_yield {
            self.yield_now();
        }
    }

    // ---------------------------------------------------------------
    // Scheduler core (spec.md §4.1-§4.3)
    // ---------------------------------------------------------------

    fn next_to_run(inner: &mut Inner<A::SavedContext>) -> ThreadId {
        inner
            .queues
            .ready
            .pop_highest()
            .unwrap_or_else(|| inner.idle.expect("next_to_run(): idle thread not initialized"))
    }

    /// Pick the next thread to run and switch to it, or re-mark the
    /// current thread Running if it's the only thread left to run
    /// (spec.md §4.3 `schedule`). Called with interrupts disabled.
    fn schedule(&self) {
        let (prev, next, prev_ctx, next_ctx) = {
            let mut inner = self.inner.lock();
            let prev = inner.current;
            let next = Self::next_to_run(&mut inner);
            inner.current = Some(next);

            let prev_ctx: Option<*mut A::SavedContext> = prev.map(|id| {
                inner
                    .arena
                    .get_mut(id)
                    .expect("previously-running thread missing from arena")
                    .context_mut() as *mut A::SavedContext
            });
            let next_ctx = inner
                .arena
                .get(next)
                .expect("next_to_run() returned an unknown thread")
                .context() as *const A::SavedContext;

            (prev, next, prev_ctx, next_ctx)
        };

        if prev == Some(next) {
            self.schedule_tail(prev);
            return;
        }

        RESUMING_FROM.store(prev.map(ThreadId::as_u64).unwrap_or(0), Ordering::Release);

        match prev_ctx {
            Some(prev_ptr) => unsafe { A::context_switch(prev_ptr, next_ctx) },
            None => {
                let mut discarded = A::SavedContext::default();
                unsafe { A::context_switch(&mut discarded, next_ctx) };
            }
        }

        // Execution resumes here once some other thread switches back
        // into whichever call made it this far; `RESUMING_FROM` names
        // whoever that was, not `prev` above (spec.md §4.3 — see the
        // doc comment on `RESUMING_FROM`).
        let raw = RESUMING_FROM.load(Ordering::Acquire);
        let resumed_from = if raw == 0 { None } else { Some(ThreadId::from_raw(raw)) };
        self.schedule_tail(resumed_from);
    }

    /// Mark the now-current thread Running, reset its slice, run the
    /// architecture's address-space hook, and free `prev`'s page if it
    /// was Dying (spec.md §4.3 `schedule_tail`).
    fn schedule_tail(&self, prev: Option<ThreadId>) {
        let (freed_page, context_ptr) = {
            let mut inner = self.inner.lock();
            let current = inner.current.expect("schedule_tail(): no current thread");
            if let Some(block) = inner.arena.get_mut(current) {
                block.set_state(ThreadState::Running);
                block.reset_slice();
            }
            let context_ptr = inner.arena.get(current).map(|b| b.context() as *const A::SavedContext);

            let freed_page = match prev {
                Some(prev_id) if inner.idle != Some(prev_id) => {
                    let dying = inner
                        .arena
                        .get(prev_id)
                        .map(|b| b.state() == ThreadState::Dying)
                        .unwrap_or(false);
                    if dying {
                        inner.arena.remove(prev_id).map(|b| b.into_page())
                    } else {
                        None
                    }
                }
                _ => None,
            };
            (freed_page, context_ptr)
        };

        if let Some(ctx_ptr) = context_ptr {
            A::activate_address_space(unsafe { &*ctx_ptr });
        }
        if let Some(page) = freed_page {
            self.page_allocator.deallocate(page);
        }
    }

    /// Timer tick bookkeeping (spec.md §4.5): wake due sleepers, charge
    /// the running thread, and, under MLFQS, recompute priorities and
    /// `load_avg`/`recent_cpu` on their respective cadences. Interrupt
    /// context only — does not itself reschedule; sets the pending-
    /// preemption flag for [`Kernel::poll_preemption`] to act on once the
    /// caller has left interrupt context (spec.md §5).
    pub fn on_timer_tick(&self) {
        let mut inner = self.inner.lock();
        inner.tick += 1;
        let tick = inner.tick;

        let due = inner.queues.sleeping.pop_due(tick);
        for id in due {
            if let Some(block) = inner.arena.get_mut(id) {
                block.set_state(ThreadState::Ready);
                let p = block.effective_priority();
                inner.queues.ready.insert(id, p);
            }
        }

        let current_is_idle = inner.current.is_some() && inner.current == inner.idle;
        let ticks_in_slice = match inner.current {
            Some(id) if !current_is_idle => {
                if let Some(block) = inner.arena.get_mut(id) {
                    if self.config.mode == SchedulerMode::Mlfqs {
                        let updated = block.recent_cpu().add_int(1);
                        block.set_recent_cpu(updated);
                    }
                    block.tick_in_slice()
                } else {
                    0
                }
            }
            _ => 0,
        };

        let work = timer::classify(ticks_in_slice, tick);

        if self.config.mode == SchedulerMode::Mlfqs {
            if work.recompute_priorities {
                mlfqs::recompute_priorities(&mut inner.arena, &mut inner.queues);
            }
            if work.recompute_load_avg {
                let mut load_avg = inner.load_avg;
                mlfqs::recompute_load_avg_and_recent_cpu(&mut inner.arena, &inner.queues, !current_is_idle, &mut load_avg);
                inner.load_avg = load_avg;
            }
        }

        if work.slice_expired {
            self.preempt_pending.store(true, Ordering::Release);
        }
    }

    /// Act on a pending preemption request recorded by
    /// [`Kernel::on_timer_tick`], once the caller is no longer in
    /// interrupt context (spec.md §5's "the only scheduling action
    /// interrupt context may take is setting the preempt-on-return
    /// flag"). A no-op if nothing is pending.
    pub fn poll_preemption(&self) {
        if self.preempt_pending.swap(false, Ordering::AcqRel) {
            self.yield_now();
        }
    }

    /// Diagnostic thread counts: `(ready, all, sleeping)`.
    pub fn thread_stats(&self) -> (usize, usize, usize) {
        let inner = self.inner.lock();
        (inner.queues.ready.len(), inner.queues.all.len(), inner.queues.sleeping.len())
    }

    /// Hand control to the scheduler for the first time. Never returns.
    pub fn start_first_thread(&'static self) -> ! {
        A::disable_interrupts();
        self.schedule();
        unreachable!("start_first_thread(): control returned to the boot stack");
    }
}

/// Recover the registered global [`Kernel`] (spec.md §5's interrupt-
/// handler boundary — architecture glue can't thread a `&Kernel<A>`
/// through a hardware exception vector's fixed signature).
pub fn get_global_kernel<A: Arch>() -> Option<&'static Kernel<A>> {
    let ptr = GLOBAL_KERNEL.load(Ordering::Acquire);
    if ptr.is_null() {
        None
    } else {
        Some(unsafe { &*(ptr as *const Kernel<A>) })
    }
}

/// `yield_now()`'s free-function form (`crate::yield_now`), used by code
/// (like [`crate::thread::JoinHandle::join`]) that doesn't hold a
/// `&Kernel<A>` directly.
pub fn yield_current<A: Arch>() {
    if let Some(kernel) = get_global_kernel::<A>() {
        kernel.yield_now();
    }
}

/// Every thread starts here, not at the caller's `entry` directly: this
/// is what `Arch::init_context`'s `entry`/`arg` pair actually points at
/// (spec.md §4.4 `create`'s "push a kernel-thread trampoline frame").
/// `arg` carries the real entry point, cast back from the `usize`
/// `Kernel::create` stashed it as.
extern "C" fn thread_entry_trampoline<A: Arch>(arg: usize) -> ! {
    A::enable_interrupts();
    let entry: fn() = unsafe { core::mem::transmute::<usize, fn()>(arg) };
    entry();
    if let Some(kernel) = get_global_kernel::<A>() {
        kernel.exit();
    }
    loop {
        A::halt();
    }
}

/// The idle thread's body (spec.md §4.4): loop forever blocking and
/// halting, never placed on the ready list, and only ever chosen by
/// `next_to_run` when no other thread is ready.
fn idle_trampoline<A: Arch>() {
    loop {
        if let Some(kernel) = get_global_kernel::<A>() {
            kernel.block();
        }
        A::halt();
    }
}

#[cfg(test)]
impl<A: Arch> Kernel<A> {
    fn schedule_tail_for_test(&self, prev: ThreadId) {
        self.schedule_tail(Some(prev));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::NoOpArch;

    fn fresh_kernel() -> Kernel<NoOpArch> {
        Kernel::new(KernelConfig::new())
    }

    fn noop_entry() {}

    /// Test-only seam: force `current` without a real context switch, so
    /// lifecycle/scheduler bookkeeping can be exercised without
    /// `NoOpArch` actually transferring control anywhere.
    fn force_current(kernel: &Kernel<NoOpArch>, id: ThreadId) {
        let mut inner = kernel.inner.lock();
        inner.queues.ready.remove(id);
        if let Some(block) = inner.arena.get_mut(id) {
            block.set_state(ThreadState::Running);
        }
        inner.current = Some(id);
    }

    fn thread_state(kernel: &Kernel<NoOpArch>, id: ThreadId) -> Option<ThreadState> {
        kernel.inner.lock().arena.get(id).map(|b| b.state())
    }

    #[test]
    fn create_rejects_out_of_range_priority_and_nice() {
        let kernel = fresh_kernel();
        assert_eq!(
            kernel.create("t", 200, 0, noop_entry).unwrap_err(),
            SpawnError::InvalidPriority
        );
        assert_eq!(
            kernel.create("t", priority::DEFAULT, 30, noop_entry).unwrap_err(),
            SpawnError::InvalidNice
        );
    }

    #[test]
    fn create_before_boot_does_not_yield() {
        let kernel = fresh_kernel();
        let handle = kernel.create("first", priority::DEFAULT, 0, noop_entry).unwrap();
        assert_eq!(thread_state(&kernel, handle.thread_id()), Some(ThreadState::Ready));
    }

    #[test]
    fn higher_priority_create_preempts_the_creator() {
        let kernel = fresh_kernel();
        let low = kernel.create("low", 20, 0, noop_entry).unwrap().thread_id();
        force_current(&kernel, low);

        let handle = kernel.create("high", 40, 0, noop_entry).unwrap();
        let high = handle.thread_id();

        assert_eq!(kernel.current(), high);
        assert_eq!(thread_state(&kernel, low), Some(ThreadState::Ready));
        assert_eq!(thread_state(&kernel, high), Some(ThreadState::Running));
    }

    #[test]
    fn lower_priority_create_does_not_preempt() {
        let kernel = fresh_kernel();
        let high = kernel.create("high", 40, 0, noop_entry).unwrap().thread_id();
        force_current(&kernel, high);

        kernel.create("low", 10, 0, noop_entry).unwrap();
        assert_eq!(kernel.current(), high);
    }

    #[test]
    fn block_then_unblock_round_trips_through_ready() {
        let kernel = fresh_kernel();
        let a = kernel.create("a", priority::DEFAULT, 0, noop_entry).unwrap().thread_id();
        let idle = kernel
            .create("idle", priority::MIN, 0, idle_trampoline::<NoOpArch>)
            .unwrap()
            .thread_id();
        force_current(&kernel, a);

        kernel.block();
        assert_eq!(thread_state(&kernel, a), Some(ThreadState::Blocked));
        // `a` just blocked itself, leaving idle as the only ready thread.
        assert_eq!(kernel.current(), idle);

        kernel.unblock(a);
        assert_eq!(thread_state(&kernel, a), Some(ThreadState::Ready));
    }

    #[test]
    fn sleep_then_tick_advance_wakes_the_sleeper() {
        let kernel = fresh_kernel();
        let idle = kernel
            .create("idle", priority::MIN, 0, idle_trampoline::<NoOpArch>)
            .unwrap()
            .thread_id();
        let sleeper = kernel.create("sleeper", priority::DEFAULT, 0, noop_entry).unwrap().thread_id();
        force_current(&kernel, sleeper);

        kernel.sleep(5);
        assert_eq!(thread_state(&kernel, sleeper), Some(ThreadState::Blocked));
        assert_eq!(kernel.current(), idle);

        for _ in 0..4 {
            kernel.on_timer_tick();
        }
        assert_eq!(thread_state(&kernel, sleeper), Some(ThreadState::Blocked));

        kernel.on_timer_tick();
        assert_eq!(thread_state(&kernel, sleeper), Some(ThreadState::Ready));
    }

    #[test]
    fn time_slice_expiry_round_robins_to_the_next_peer() {
        let kernel = fresh_kernel();
        let b = kernel.create("b", priority::DEFAULT, 0, noop_entry).unwrap().thread_id();
        let a = kernel.create("a", priority::DEFAULT, 0, noop_entry).unwrap().thread_id();
        force_current(&kernel, a);

        for _ in 0..4 {
            kernel.on_timer_tick();
        }
        kernel.poll_preemption();

        assert_eq!(kernel.current(), b);
        assert_eq!(thread_state(&kernel, a), Some(ThreadState::Ready));
    }

    #[test]
    fn set_nice_recomputes_priority_under_any_mode() {
        let kernel = fresh_kernel();
        let a = kernel.create("a", priority::DEFAULT, 0, noop_entry).unwrap().thread_id();
        force_current(&kernel, a);

        kernel.set_nice(10);
        assert_eq!(kernel.get_nice(), 10);
        assert!(kernel.get_priority() < priority::DEFAULT);
    }

    #[test]
    fn set_priority_is_a_no_op_under_mlfqs() {
        let kernel = Kernel::<NoOpArch>::new(KernelConfig::new().with_mode(SchedulerMode::Mlfqs));
        let a = kernel.create("a", priority::DEFAULT, 0, noop_entry).unwrap().thread_id();
        force_current(&kernel, a);

        let before = kernel.get_priority();
        kernel.set_priority(priority::MIN);
        assert_eq!(kernel.get_priority(), before);
    }

    #[test]
    fn uncontended_lock_acquire_and_release_round_trip() {
        static LOCK: Lock = Lock::new(1);
        let kernel = fresh_kernel();
        let a = kernel.create("a", priority::DEFAULT, 0, noop_entry).unwrap().thread_id();
        force_current(&kernel, a);

        kernel.lock_acquire(&LOCK);
        assert_eq!(LOCK.holder(), Some(a));
        kernel.lock_release(&LOCK);
        assert_eq!(LOCK.holder(), None);
    }

    /// Drives a contended `lock_acquire`/`lock_release` round trip
    /// end to end (spec.md §8 scenario 3's hand-off, not just the
    /// donation bookkeeping `sched::donation`'s own tests exercise
    /// directly against a hand-built arena). Regression test for a
    /// hand-off bug where `lock_release` pre-assigned the lock to the
    /// woken waiter but `lock_acquire`'s retry loop had no way to tell
    /// "I already hold this" from "still contended", so the waiter
    /// re-queued itself behind a lock it already owned and donated to
    /// itself in an infinite chain.
    #[test]
    fn contended_lock_hands_off_to_waiter_without_deadlock() {
        static LOCK: Lock = Lock::new(5);
        let kernel = fresh_kernel();
        let idle = kernel
            .create("idle", priority::MIN, 0, idle_trampoline::<NoOpArch>)
            .unwrap()
            .thread_id();
        let holder = kernel.create("holder", priority::DEFAULT, 0, noop_entry).unwrap().thread_id();
        let waiter = kernel.create("waiter", priority::DEFAULT, 0, noop_entry).unwrap().thread_id();

        // holder acquires the lock uncontended.
        force_current(&kernel, holder);
        kernel.lock_acquire(&LOCK);
        assert_eq!(LOCK.holder(), Some(holder));

        // waiter contends for the same lock: join its wait queue, donate,
        // and block — the exact state `lock_acquire`'s contended branch
        // leaves behind right before calling `block()`.
        force_current(&kernel, waiter);
        {
            let mut inner = kernel.inner.lock();
            let waiter_priority = inner.arena.get(waiter).unwrap().effective_priority();
            inner.arena.get_mut(waiter).unwrap().set_waiting_on(Some(&LOCK));
            LOCK.add_waiter(waiter, waiter_priority);
            donation::donate_chain(&mut inner.arena, &mut inner.queues, &LOCK);
        }
        kernel.block();
        assert_eq!(thread_state(&kernel, waiter), Some(ThreadState::Blocked));
        assert_eq!(kernel.current(), idle);

        // holder releases: the lock must be handed directly to waiter,
        // who is unblocked and NOT left as its own waiter.
        force_current(&kernel, holder);
        kernel.lock_release(&LOCK);
        assert_eq!(LOCK.holder(), Some(waiter));
        assert_eq!(thread_state(&kernel, waiter), Some(ThreadState::Ready));
        assert!(!LOCK.has_waiters());

        // waiter resumes inside `lock_acquire`'s retry loop and must
        // recognize the hand-off immediately rather than taking the
        // contended branch against a lock it already holds.
        force_current(&kernel, waiter);
        kernel.lock_acquire(&LOCK);
        assert_eq!(LOCK.holder(), Some(waiter));
        assert_eq!(thread_state(&kernel, waiter), Some(ThreadState::Running));
        assert!(!LOCK.has_waiters());

        kernel.lock_release(&LOCK);
        assert_eq!(LOCK.holder(), None);
    }

    #[test]
    fn exit_frees_the_previous_threads_page_on_next_schedule() {
        let kernel = fresh_kernel();
        let idle = kernel
            .create("idle", priority::MIN, 0, idle_trampoline::<NoOpArch>)
            .unwrap()
            .thread_id();
        let a = kernel.create("a", priority::DEFAULT, 0, noop_entry).unwrap().thread_id();
        force_current(&kernel, a);

        // `exit()` itself diverges (`unreachable!()` after `schedule()`),
        // so drive its body manually up to the point `schedule_tail` runs.
        {
            let mut inner = kernel.inner.lock();
            inner.queues.all.remove(a);
            inner.arena.get_mut(a).unwrap().set_state(ThreadState::Dying);
        }
        kernel.schedule_tail_for_test(a);

        assert_eq!(kernel.current(), idle);
        assert!(kernel.inner.lock().arena.get(a).is_none());
    }

    #[test]
    fn load_avg_and_recent_cpu_advance_under_mlfqs() {
        let kernel = Kernel::<NoOpArch>::new(KernelConfig::new().with_mode(SchedulerMode::Mlfqs));
        let a = kernel.create("a", priority::DEFAULT, 0, noop_entry).unwrap().thread_id();
        force_current(&kernel, a);

        for _ in 0..100 {
            kernel.on_timer_tick();
        }

        assert!(kernel.get_load_avg() > 0);
    }
}
