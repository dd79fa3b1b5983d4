//! Kernel heap allocator (C2)
//!
//! A size-class bucket allocator: each bucket holds fixed-size free
//! blocks carved out of pages pulled from the frame allocator (C1) on
//! demand. Requests larger than the biggest bucket go straight to C1 as
//! a dedicated multi-frame allocation. No coalescing between buckets —
//! grounded on the teacher's `LinkedListAllocator`'s free-list shape,
//! generalized to several fixed sizes instead of one arbitrary-size
//! list so carving and reclaiming stay O(1).

use super::address::{PhysAddr, VirtAddr, PAGE_SIZE};
use super::paging::{phys_to_safe, safe_to_phys};
#[cfg(not(test))]
use core::alloc::GlobalAlloc;
use core::alloc::Layout;
use core::ptr::null_mut;
use spin::Mutex;

const BUCKET_SIZES: [usize; 7] = [16, 64, 256, 1024, 4096, 16384, 65536];

struct FreeNode {
    next: Option<&'static mut FreeNode>,
}

struct Bucket {
    size: usize,
    free: Option<&'static mut FreeNode>,
    /// Live allocation count, for leak diagnostics.
    allocated: usize,
}

impl Bucket {
    const fn new(size: usize) -> Self {
        Self {
            size,
            free: None,
            allocated: 0,
        }
    }

    unsafe fn refill(&mut self) -> Result<(), ()> {
        let frames_needed = self.size.div_ceil(PAGE_SIZE);
        let phys = super::alloc_frames(frames_needed).map_err(|_| ())?;
        let base = phys_to_safe(phys).as_usize();
        let slab_len = frames_needed * PAGE_SIZE;

        let mut offset = 0;
        while offset + self.size <= slab_len {
            let node = (base + offset) as *mut FreeNode;
            (*node).next = self.free.take();
            self.free = Some(&mut *node);
            offset += self.size;
        }
        Ok(())
    }

    unsafe fn alloc(&mut self) -> *mut u8 {
        if self.free.is_none() && self.refill().is_err() {
            return null_mut();
        }
        match self.free.take() {
            Some(node) => {
                self.free = node.next.take();
                self.allocated += 1;
                node as *mut FreeNode as *mut u8
            }
            None => null_mut(),
        }
    }

    unsafe fn dealloc(&mut self, ptr: *mut u8) {
        let node = ptr as *mut FreeNode;
        (*node).next = self.free.take();
        self.free = Some(&mut *node);
        self.allocated = self.allocated.saturating_sub(1);
    }
}

pub struct HeapAllocator {
    buckets: [Bucket; BUCKET_SIZES.len()],
    large_allocations: usize,
}

impl HeapAllocator {
    pub const fn new() -> Self {
        Self {
            buckets: [
                Bucket::new(16),
                Bucket::new(64),
                Bucket::new(256),
                Bucket::new(1024),
                Bucket::new(4096),
                Bucket::new(16384),
                Bucket::new(65536),
            ],
            large_allocations: 0,
        }
    }

    fn bucket_for(needed: usize) -> Option<usize> {
        BUCKET_SIZES.iter().position(|&s| s >= needed)
    }

    unsafe fn do_alloc(&mut self, layout: Layout) -> *mut u8 {
        let needed = layout.size().max(layout.align());
        match Self::bucket_for(needed) {
            Some(idx) => self.buckets[idx].alloc(),
            None => {
                let frames = needed.div_ceil(PAGE_SIZE);
                match super::alloc_frames(frames) {
                    Ok(phys) => {
                        self.large_allocations += 1;
                        phys_to_safe(phys).as_mut_ptr()
                    }
                    Err(_) => null_mut(),
                }
            }
        }
    }

    unsafe fn do_dealloc(&mut self, ptr: *mut u8, layout: Layout) {
        let needed = layout.size().max(layout.align());
        match Self::bucket_for(needed) {
            Some(idx) => self.buckets[idx].dealloc(ptr),
            None => {
                let frames = needed.div_ceil(PAGE_SIZE);
                let phys: PhysAddr = safe_to_phys(VirtAddr::new(ptr as usize));
                super::decr_frames(phys, frames);
                self.large_allocations = self.large_allocations.saturating_sub(1);
            }
        }
    }

    /// `(bucket_size, live_count)` pairs plus the count of standalone
    /// large allocations, for leak diagnostics.
    pub fn stats(&self) -> ([usize; BUCKET_SIZES.len()], usize) {
        let mut counts = [0usize; BUCKET_SIZES.len()];
        for (i, b) in self.buckets.iter().enumerate() {
            counts[i] = b.allocated;
        }
        (counts, self.large_allocations)
    }
}

static ALLOCATOR: Mutex<HeapAllocator> = Mutex::new(HeapAllocator::new());

#[cfg(not(test))]
struct KernelAllocator;

#[cfg(not(test))]
unsafe impl GlobalAlloc for KernelAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        ALLOCATOR.lock().do_alloc(layout)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        ALLOCATOR.lock().do_dealloc(ptr, layout)
    }
}

#[cfg(not(test))]
#[global_allocator]
static GLOBAL_ALLOCATOR: KernelAllocator = KernelAllocator;

pub fn stats() -> ([usize; BUCKET_SIZES.len()], usize) {
    ALLOCATOR.lock().stats()
}
