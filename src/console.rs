//! Scheduler tracing and fatal-assertion diagnostics
//! (SPEC_FULL.md "AMBIENT STACK / Logging").
//!
//! The teacher writes straight to a PL011/Mini UART through a
//! `pl011_println!`-style macro (`arch::uart_pl011::UartWriter`). This
//! module keeps that approach but puts a `Console` trait behind it so
//! `std-shim` host tests can run against a `Vec<u8>`-backed console
//! instead of real MMIO. No `log`/`defmt` dependency is introduced —
//! nothing in the teacher's lineage ever reached for one.

use core::fmt::Write;

/// Anything `kprintln!` can be routed to.
pub trait Console: Write + Send {}

impl<T: Write + Send> Console for T {}

#[cfg(all(target_arch = "aarch64", not(feature = "std-shim")))]
pub use crate::arch::uart_pl011::UartWriter as DefaultConsole;

/// Host-test console: appends to an in-memory buffer instead of MMIO, so
/// assertions can inspect exactly what the kernel would have printed.
#[cfg(any(not(target_arch = "aarch64"), feature = "std-shim"))]
pub struct BufferConsole {
    pub buffer: alloc::string::String,
}

#[cfg(any(not(target_arch = "aarch64"), feature = "std-shim"))]
impl BufferConsole {
    pub const fn new() -> Self {
        BufferConsole {
            buffer: alloc::string::String::new(),
        }
    }
}

#[cfg(any(not(target_arch = "aarch64"), feature = "std-shim"))]
impl Write for BufferConsole {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        self.buffer.push_str(s);
        Ok(())
    }
}

#[cfg(any(not(target_arch = "aarch64"), feature = "std-shim"))]
pub type DefaultConsole = BufferConsole;

#[cfg(any(not(target_arch = "aarch64"), feature = "std-shim"))]
pub static CONSOLE: spin::Mutex<BufferConsole> = spin::Mutex::new(BufferConsole::new());

/// Print a formatted, `\n`-terminated line to the kernel console.
#[macro_export]
macro_rules! kprintln {
    ($($arg:tt)*) => {{
        #[cfg(any(not(target_arch = "aarch64"), feature = "std-shim"))]
        {
            use core::fmt::Write;
            let mut console = $crate::console::CONSOLE.lock();
            let _ = writeln!(console, $($arg)*);
        }
        #[cfg(all(target_arch = "aarch64", not(feature = "std-shim")))]
        {
            $crate::pl011_println!($($arg)*);
        }
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kprintln_appends_a_newline_terminated_line() {
        CONSOLE.lock().buffer.clear();
        kprintln!("[SCHED] switched to {}", 7);
        assert!(CONSOLE.lock().buffer.ends_with("switched to 7\n"));
    }
}
