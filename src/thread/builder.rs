//! Ergonomic thread creation (SPEC_FULL.md "Supplemented features"),
//! generalized from the teacher's `ThreadBuilder` to go through the same
//! `Kernel::create` path as the raw API instead of allocating a stack
//! and context directly.

use alloc::string::String;

use super::{JoinHandle, THREAD_NAME_MAX};
use crate::arch::Arch;
use crate::errors::SpawnError;
use crate::kernel::Kernel;
use crate::sched::priority;

pub struct ThreadBuilder {
    priority: u8,
    nice: i8,
    name: Option<String>,
}

impl ThreadBuilder {
    pub fn new() -> Self {
        Self {
            priority: priority::DEFAULT,
            nice: 0,
            name: None,
        }
    }

    pub fn priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn nice(mut self, nice: i8) -> Self {
        self.nice = nice;
        self
    }

    pub fn name<T: Into<String>>(mut self, name: T) -> Self {
        let mut name = name.into();
        name.truncate(THREAD_NAME_MAX);
        self.name = Some(name);
        self
    }

    pub fn spawn<A: Arch>(
        self,
        kernel: &Kernel<A>,
        entry: fn(),
    ) -> Result<JoinHandle, SpawnError> {
        kernel.create(
            self.name.as_deref().unwrap_or("thread"),
            self.priority,
            self.nice,
            entry,
        )
    }
}

impl Default for ThreadBuilder {
    fn default() -> Self {
        Self::new()
    }
}
