//! Memory management subsystem
//!
//! - `address`: type-safe physical/virtual address newtypes (C0 support)
//! - `frame_allocator`: physical frame allocator, refcounted (C1)
//! - `paging`: SV39 page-table engine (C3)
//! - `heap`: kernel heap allocator (C2)

pub mod address;
pub mod frame_allocator;
pub mod heap;
pub mod paging;
pub mod user;

pub use address::{KERNEL_BASE, USER_MAX};
pub use address::{LARGE_PAGE_SIZE, PAGE_SIZE};
pub use address::{PhysAddr, VirtAddr};
pub use frame_allocator::FrameError;
pub use paging::{phys_to_safe, MappingError, PageMapper};

use frame_allocator::FrameAllocator;

/// Global frame allocator. A bare `spin::Mutex` rather than a
/// `spin::Once` wrapper: the allocator's own state is "uninitialized"
/// (zero frames) until `init`/`init_for_test` runs, so there is nothing
/// extra to guard against a too-early call.
static FRAME_ALLOCATOR: spin::Mutex<FrameAllocator> = spin::Mutex::new(FrameAllocator::new());

/// Bring up the frame allocator over boot-detected RAM, reserving the
/// kernel image itself so it is never handed out.
///
/// # Safety
/// Must be called exactly once during boot, before any other memory
/// subsystem call.
pub unsafe fn init(kernel_start: PhysAddr, kernel_end: PhysAddr, ram_start: PhysAddr, ram_size: usize) {
    let mut allocator = FRAME_ALLOCATOR.lock();
    allocator.init(ram_start, ram_size);
    let reserved = kernel_end.as_usize().saturating_sub(kernel_start.as_usize())
        + (kernel_start.as_usize() - ram_start.as_usize());
    allocator.reserve(ram_start, reserved);
}

#[cfg(test)]
pub fn init_for_test(ram_size: usize) {
    paging::test_identity_map();
    let mut allocator = FRAME_ALLOCATOR.lock();
    if allocator.total_frames() == 0 {
        allocator.init(PhysAddr::new(0), ram_size);
    }
}

/// # Safety
/// See [`FrameAllocator::alloc_frames`].
pub unsafe fn alloc_frames(n: usize) -> Result<PhysAddr, FrameError> {
    FRAME_ALLOCATOR.lock().alloc_frames(n)
}

pub fn incr_frames(base: PhysAddr, n: usize) {
    FRAME_ALLOCATOR.lock().incr(base, n)
}

pub fn decr_frames(base: PhysAddr, n: usize) {
    FRAME_ALLOCATOR.lock().decr(base, n)
}

pub fn refcount(base: PhysAddr) -> u16 {
    FRAME_ALLOCATOR.lock().refcount(base)
}

/// `(free_frames, total_frames)`.
pub fn memory_stats() -> (usize, usize) {
    let lock = FRAME_ALLOCATOR.lock();
    (lock.free_frames(), lock.total_frames())
}
