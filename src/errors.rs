//! Error handling (spec.md §7): `create()` is the only fallible
//! operation in this crate; every other contract violation is a fatal
//! assertion. Plain enums implementing `core::fmt::Display`, in the
//! style the teacher's own `errors.rs` already established — no
//! `anyhow`/`thiserror` (neither is reached for anywhere in this
//! lineage, and both pull in more than a no_std bare-metal crate needs).

use core::fmt;

/// Why `Kernel::create` (or `ThreadBuilder::spawn`) failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnError {
    /// The page allocator returned nothing.
    OutOfMemory,
    /// `priority` was outside `PRI_MIN..=PRI_MAX`.
    InvalidPriority,
    /// `nice` was outside `NICE_MIN..=NICE_MAX`.
    InvalidNice,
}

impl fmt::Display for SpawnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpawnError::OutOfMemory => write!(f, "out of memory: page allocator returned none"),
            SpawnError::InvalidPriority => write!(f, "priority out of range"),
            SpawnError::InvalidNice => write!(f, "nice value out of range"),
        }
    }
}

#[cfg(test)]
impl std::error::Error for SpawnError {}

pub type SpawnResult<T> = Result<T, SpawnError>;

/// Format and report a fatal, unrecoverable invariant violation
/// (spec.md §7): the contract for the operation that detected it says
/// to panic, not to return an error. Centralized here so every
/// fatal-assertion site produces a consistently shaped diagnostic
/// (thread id, what invariant failed) through `kprintln!` before
/// unwinding into the panic handler.
pub fn kernel_panic(thread: Option<u64>, what: &str) -> ! {
    match thread {
        Some(id) => crate::kprintln!("[PANIC] thread {}: {}", id, what),
        None => crate::kprintln!("[PANIC] {}", what),
    }
    panic!("kernel invariant violated: {}", what);
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn display_messages_are_non_empty() {
        assert!(!SpawnError::OutOfMemory.to_string().is_empty());
        assert!(!SpawnError::InvalidPriority.to_string().is_empty());
        assert!(!SpawnError::InvalidNice.to_string().is_empty());
    }
}
