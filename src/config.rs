//! Kernel configuration (SPEC_FULL.md §6 ambient addition).
//!
//! A `KernelConfig` value is threaded into `Kernel::new` instead of
//! scattering global `static mut` configuration the way ad hoc kernel
//! command-line handling tends to. The `-o mlfqs` flag this crate cares
//! about is parsed the same way a kernel command line ordinarily is:
//! whitespace-separated flag/value pairs.

use alloc::string::String;

use crate::sched::{priority, TIMER_FREQ};

/// Which priority policy drives `effective_priority`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerMode {
    /// Priority round-robin with donation through held locks.
    PriorityDonation,
    /// 4.4BSD-style multi-level feedback queue scheduling.
    Mlfqs,
}

#[derive(Debug, Clone)]
pub struct KernelConfig {
    pub mode: SchedulerMode,
    pub timer_freq: u64,
    pub idle_thread_name: String,
}

impl KernelConfig {
    pub fn new() -> Self {
        KernelConfig {
            mode: SchedulerMode::PriorityDonation,
            timer_freq: TIMER_FREQ,
            idle_thread_name: String::from("idle"),
        }
    }

    /// Parse a kernel command line for the flags this crate recognizes.
    /// Unrecognized tokens are ignored — this crate is not the owner of
    /// the full command line, only of the scheduling-relevant slice.
    ///
    /// Recognizes `-o mlfqs` (selects [`SchedulerMode::Mlfqs`]).
    pub fn from_cmdline(cmdline: &str) -> Self {
        let mut config = Self::new();
        let mut tokens = cmdline.split_whitespace();
        while let Some(token) = tokens.next() {
            if token == "-o" {
                if let Some(value) = tokens.next() {
                    if value == "mlfqs" {
                        config.mode = SchedulerMode::Mlfqs;
                    }
                }
            }
        }
        config
    }

    pub fn with_mode(mut self, mode: SchedulerMode) -> Self {
        self.mode = mode;
        self
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Default priority new threads are created with when the caller doesn't
/// pick one explicitly.
pub const DEFAULT_PRIORITY: u8 = priority::DEFAULT;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_mode_is_priority_donation() {
        assert_eq!(KernelConfig::new().mode, SchedulerMode::PriorityDonation);
    }

    #[test]
    fn dash_o_mlfqs_selects_mlfqs_mode() {
        let config = KernelConfig::from_cmdline("root=/dev/sda -o mlfqs -q");
        assert_eq!(config.mode, SchedulerMode::Mlfqs);
    }

    #[test]
    fn unrelated_flags_leave_default_mode() {
        let config = KernelConfig::from_cmdline("root=/dev/sda -q");
        assert_eq!(config.mode, SchedulerMode::PriorityDonation);
    }
}
