//! Page-granular stack storage for kernel threads.
//!
//! The physical/virtual page allocator itself is out of scope per
//! spec.md §1 (a consumed interface); this module narrows the teacher's
//! four pooled stack-size classes (`StackSizeClass`/`StackPool`) down to
//! the spec's single-page-per-thread model and provides the one concrete
//! allocator every build of this crate needs to actually run.

use alloc::alloc::{alloc_zeroed, dealloc};
use core::alloc::Layout;
use core::ptr::NonNull;

/// Page size backing every thread stack.
pub const PAGE_SIZE: usize = 4096;

/// A page-aligned, zeroed block of memory backing one thread's stack.
/// The stack grows down from the top; the base word is reserved for the
/// overflow canary (spec.md §3, `magic`).
pub struct Page {
    memory: NonNull<u8>,
    size: usize,
}

unsafe impl Send for Page {}

impl Page {
    /// Top of the stack (one past the last usable byte), where the
    /// initial context's stack pointer is seeded.
    pub fn stack_top(&self) -> *mut u8 {
        unsafe { self.memory.as_ptr().add(self.size) }
    }

    pub fn base(&self) -> *mut u8 {
        self.memory.as_ptr()
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn install_canary(&mut self, magic: u32) {
        unsafe { (self.memory.as_ptr() as *mut u32).write(magic) };
    }

    pub fn check_canary(&self, magic: u32) -> bool {
        unsafe { (self.memory.as_ptr() as *const u32).read() == magic }
    }
}

/// Out-of-scope consumed interface: hand out and take back page-sized,
/// page-aligned memory. A real kernel wires this to its physical/virtual
/// memory manager; this crate only needs *an* implementation to be a
/// complete, buildable repo.
pub trait PageAllocator {
    fn allocate(&self) -> Option<Page>;
    fn deallocate(&self, page: Page);
}

/// The allocator used by both bare-metal builds (against whatever global
/// allocator the embedding firmware installs) and `std-shim` host tests
/// (against the system allocator) — the teacher's `StackPool` draws the
/// same distinction but only at the `alloc`/`std` call-site, not as a
/// separate type, since both paths already go through `alloc::alloc`.
pub struct SystemPageAllocator;

impl PageAllocator for SystemPageAllocator {
    fn allocate(&self) -> Option<Page> {
        let layout = Layout::from_size_align(PAGE_SIZE, PAGE_SIZE).ok()?;
        let ptr = unsafe { alloc_zeroed(layout) };
        let memory = NonNull::new(ptr)?;
        Some(Page {
            memory,
            size: PAGE_SIZE,
        })
    }

    fn deallocate(&self, page: Page) {
        let layout = Layout::from_size_align(page.size, PAGE_SIZE).expect("page layout");
        unsafe { dealloc(page.memory.as_ptr(), layout) };
        core::mem::forget(page);
    }
}
