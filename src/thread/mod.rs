//! Thread identity, state, and the arena that owns every `ThreadBlock`
//! (spec.md §3, §9).
//!
//! ThreadBlocks live in a growable slab addressed by `ThreadId`, not as a
//! raw intrusive list embedded in the thread's own stack page (spec.md
//! §9's redesign note, adopted here rather than just noted). The page
//! still logically owns the stack; the arena slot is a separate, small,
//! non-paged record.

pub mod builder;
pub mod handle;

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::num::NonZeroU64;

use crate::fixedpoint::Fixed;
use crate::mem::Page;
use crate::sync::Lock;

pub use builder::ThreadBuilder;
pub use handle::JoinHandle;
pub(crate) use handle::JoinSignal;

/// Longest name a thread can be given; longer names are truncated, the
/// same policy the teacher's `ThreadInner::set_name` documents.
pub const THREAD_NAME_MAX: usize = 32;

/// Stack-overflow canary written at the base of every thread's page.
pub const STACK_MAGIC: u32 = 0xcd6a_bf4b;

/// Identifies a thread for its entire lifetime. Never reused while any
/// `ThreadId` value referring to it could still be observed (the arena
/// only recycles a slot after both the page and the arena record have
/// been torn down).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(NonZeroU64);

impl ThreadId {
    fn from_index(index: u64) -> Self {
        ThreadId(NonZeroU64::new(index).expect("thread id index must be nonzero"))
    }

    pub fn as_u64(self) -> u64 {
        self.0.get()
    }

    /// Reconstruct a `ThreadId` from a raw value previously obtained from
    /// [`ThreadId::as_u64`] (used to carry an id across the context-switch
    /// handoff in `sched`, spec.md §4.3).
    pub(crate) fn from_raw(raw: u64) -> Self {
        Self::from_index(raw)
    }

    /// Fabricate an id for structural tests elsewhere in the crate that
    /// need a `ThreadId` without going through a full `Arena::insert`.
    #[cfg(test)]
    pub(crate) fn for_test(index: u64) -> Self {
        Self::from_index(index)
    }
}

/// Thread state machine (spec.md §3): exactly one of these at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Running,
    Ready,
    Blocked,
    Dying,
}

/// The per-thread control record (spec.md §3's ThreadBlock attributes).
///
/// Generic over the architecture's saved-context type so this module has
/// no dependency on `arch` beyond what `Arena::insert` needs to build one.
pub struct ThreadBlock<C> {
    id: ThreadId,
    name: String,
    status: ThreadState,
    page: Page,
    base_priority: u8,
    effective_priority: u8,
    owned_locks: Vec<&'static Lock>,
    waiting_on: Option<&'static Lock>,
    wake_tick: u64,
    nice: i8,
    recent_cpu: Fixed,
    ticks_in_slice: u32,
    context: C,
    join_signal: Arc<JoinSignal>,
}

impl<C> ThreadBlock<C> {
    pub fn id(&self) -> ThreadId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ThreadState {
        self.status
    }

    pub fn set_state(&mut self, state: ThreadState) {
        self.status = state;
    }

    pub fn base_priority(&self) -> u8 {
        self.base_priority
    }

    pub fn effective_priority(&self) -> u8 {
        self.effective_priority
    }

    pub(crate) fn set_effective_priority(&mut self, priority: u8) {
        self.effective_priority = priority;
    }

    pub(crate) fn set_base_priority(&mut self, priority: u8) {
        self.base_priority = priority;
    }

    pub fn owned_locks(&self) -> &[&'static Lock] {
        &self.owned_locks
    }

    pub(crate) fn owned_locks_mut(&mut self) -> &mut Vec<&'static Lock> {
        &mut self.owned_locks
    }

    pub fn waiting_on(&self) -> Option<&'static Lock> {
        self.waiting_on
    }

    pub(crate) fn set_waiting_on(&mut self, lock: Option<&'static Lock>) {
        self.waiting_on = lock;
    }

    pub fn wake_tick(&self) -> u64 {
        self.wake_tick
    }

    pub fn set_wake_tick(&mut self, tick: u64) {
        self.wake_tick = tick;
    }

    pub fn nice(&self) -> i8 {
        self.nice
    }

    pub fn set_nice(&mut self, nice: i8) {
        self.nice = nice;
    }

    pub fn recent_cpu(&self) -> Fixed {
        self.recent_cpu
    }

    pub fn set_recent_cpu(&mut self, recent_cpu: Fixed) {
        self.recent_cpu = recent_cpu;
    }

    pub fn ticks_in_slice(&self) -> u32 {
        self.ticks_in_slice
    }

    pub fn reset_slice(&mut self) {
        self.ticks_in_slice = 0;
    }

    pub fn tick_in_slice(&mut self) -> u32 {
        self.ticks_in_slice += 1;
        self.ticks_in_slice
    }

    pub fn stack_top(&self) -> *mut u8 {
        self.page.stack_top()
    }

    pub fn check_stack_integrity(&self) -> bool {
        self.page.check_canary(STACK_MAGIC)
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut C {
        &mut self.context
    }

    pub fn into_page(self) -> Page {
        self.page
    }

    pub(crate) fn join_signal(&self) -> &Arc<JoinSignal> {
        &self.join_signal
    }
}

/// Construction parameters for a new `ThreadBlock`, built by
/// `ThreadBuilder` or the kernel's raw `create()` path.
pub struct ThreadSpec {
    pub name: String,
    pub priority: u8,
    pub nice: i8,
    pub page: Page,
}

/// A growable slab of `ThreadBlock`s addressed by `ThreadId` (spec.md §9).
///
/// Slots are boxed so a `ThreadBlock`'s address (and thus any raw pointer
/// into its `context` field taken across a context switch, spec.md §4.3)
/// stays valid even when the arena grows and the outer `Vec` reallocates.
pub struct Arena<C> {
    slots: Vec<Option<alloc::boxed::Box<ThreadBlock<C>>>>,
    next_index: u64,
}

impl<C> Arena<C> {
    pub const fn new() -> Self {
        Arena {
            slots: Vec::new(),
            next_index: 1,
        }
    }

    /// Allocate the next `ThreadId` and insert a block built from `spec`
    /// with an initial context produced by `init_context`. Returns the
    /// new id and the `JoinSignal` a `JoinHandle` can be built from.
    pub fn insert(
        &mut self,
        spec: ThreadSpec,
        init_context: impl FnOnce(&Page) -> C,
    ) -> (ThreadId, Arc<JoinSignal>) {
        let id = ThreadId::from_index(self.next_index);
        self.next_index += 1;

        let mut name = spec.name;
        name.truncate(THREAD_NAME_MAX);

        let mut page = spec.page;
        page.install_canary(STACK_MAGIC);
        let context = init_context(&page);
        let join_signal = JoinSignal::new();

        let block = ThreadBlock {
            id,
            name,
            status: ThreadState::Ready,
            page,
            base_priority: spec.priority,
            effective_priority: spec.priority,
            owned_locks: Vec::new(),
            waiting_on: None,
            wake_tick: 0,
            nice: spec.nice,
            recent_cpu: Fixed::ZERO,
            ticks_in_slice: 0,
            context,
            join_signal: join_signal.clone(),
        };

        let index = (id.as_u64() - 1) as usize;
        let boxed = alloc::boxed::Box::new(block);
        if index == self.slots.len() {
            self.slots.push(Some(boxed));
        } else {
            self.slots[index] = Some(boxed);
        }
        (id, join_signal)
    }

    pub fn get(&self, id: ThreadId) -> Option<&ThreadBlock<C>> {
        self.slots.get((id.as_u64() - 1) as usize)?.as_deref()
    }

    pub fn get_mut(&mut self, id: ThreadId) -> Option<&mut ThreadBlock<C>> {
        self.slots.get_mut((id.as_u64() - 1) as usize)?.as_deref_mut()
    }

    pub fn remove(&mut self, id: ThreadId) -> Option<ThreadBlock<C>> {
        Some(*self.slots.get_mut((id.as_u64() - 1) as usize)?.take()?)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ThreadBlock<C>> {
        self.slots.iter().filter_map(|slot| slot.as_ref())
    }
}

impl<C> Default for Arena<C> {
    fn default() -> Self {
        Self::new()
    }
}
