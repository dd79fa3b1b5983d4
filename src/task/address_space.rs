//! Per-task address space (C4)
//!
//! Wraps a root SV39 table plus a bump cursor for the next free user
//! virtual page. The kernel half is never built from scratch: every
//! new address space clones it from whichever root is already mapped
//! in, so kernel code and the kernel heap stay reachable on every trap
//! regardless of which task was running.

use crate::memory::address::{PAGE_SIZE, USER_MAX};
use crate::memory::paging::{phys_to_safe, MappingError, PageMapper};
use crate::memory::{PhysAddr, VirtAddr};
use crate::arch::riscv64::PteFlags;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressSpaceError {
    OutOfMemory,
    Mapping(MappingError),
    SegmentTooLarge,
}

impl From<MappingError> for AddressSpaceError {
    fn from(e: MappingError) -> Self {
        Self::Mapping(e)
    }
}

/// One loadable ELF segment, already sliced out of the image by the
/// caller (the executable-image collaborator, see `hal`).
pub struct Segment<'a> {
    pub virt_start: VirtAddr,
    pub data: &'a [u8],
    pub mem_size: usize,
    pub flags: PteFlags,
}

pub struct AddressSpace {
    root: PhysAddr,
    next_virt: VirtAddr,
}

impl AddressSpace {
    /// Allocate a fresh root table and clone `kernel_root`'s upper half
    /// into it so the kernel stays mapped after a context switch.
    pub fn new(kernel_root: PhysAddr) -> Result<Self, AddressSpaceError> {
        let root = unsafe { super::super::memory::alloc_frames(1) }
            .map_err(|_| AddressSpaceError::OutOfMemory)?;
        unsafe {
            (*phys_to_safe(root).as_mut_ptr::<crate::arch::riscv64::PageTable>()).zero();
        }
        let mut mapper = PageMapper::new(root);
        mapper.clone_kernel_half(kernel_root);
        Ok(Self {
            root,
            next_virt: VirtAddr::new(PAGE_SIZE),
        })
    }

    pub fn root(&self) -> PhysAddr {
        self.root
    }

    /// Wrap an already-built root table without allocating a new one or
    /// cloning the kernel half again, so an existing address space can
    /// be handed to [`AddressSpace::destroy`].
    pub fn adopt(root: PhysAddr) -> Self {
        Self {
            root,
            next_virt: VirtAddr::new(PAGE_SIZE),
        }
    }

    pub fn mapper(&mut self) -> PageMapper {
        PageMapper::new(self.root)
    }

    pub fn cursor(&self) -> VirtAddr {
        self.next_virt
    }

    /// Bump-allocate `n_pages` contiguous, still-unmapped user pages
    /// and return the base. Used by IPC's page-share path to pick a
    /// destination address in the receiving task.
    pub fn reserve_virt(&mut self, n_pages: usize) -> Result<VirtAddr, AddressSpaceError> {
        let base = self.next_virt;
        let end = base.as_usize() + n_pages * PAGE_SIZE;
        if end > USER_MAX {
            return Err(AddressSpaceError::SegmentTooLarge);
        }
        self.next_virt = VirtAddr::new(end);
        Ok(base)
    }

    /// Map and copy each segment, zero-filling the BSS tail up to
    /// `mem_size`. Returns nothing — the entry point is whatever the
    /// image loader already determined from the ELF header.
    pub fn load_image(&mut self, segments: &[Segment]) -> Result<(), AddressSpaceError> {
        for seg in segments {
            let pages = seg.mem_size.div_ceil(PAGE_SIZE);
            let base = seg.virt_start.align_down(PAGE_SIZE);
            let mut mapper = self.mapper();
            for i in 0..pages.max(1) {
                let virt = VirtAddr::new(base.as_usize() + i * PAGE_SIZE);
                let phys = mapper.alloc_and_map(virt, seg.flags | PteFlags::USER)?;
                let dst = phys_to_safe(phys).as_mut_ptr::<u8>();
                unsafe { core::ptr::write_bytes(dst, 0, PAGE_SIZE) };

                let page_start = i * PAGE_SIZE;
                let page_end = page_start + PAGE_SIZE;
                let copy_start = page_start.min(seg.data.len());
                let copy_end = page_end.min(seg.data.len());
                if copy_end > copy_start {
                    let src = &seg.data[copy_start..copy_end];
                    unsafe {
                        core::ptr::copy_nonoverlapping(src.as_ptr(), dst, src.len());
                    }
                }
            }
            if base.as_usize() + pages.max(1) * PAGE_SIZE > self.next_virt.as_usize() {
                self.next_virt = VirtAddr::new(base.as_usize() + pages.max(1) * PAGE_SIZE);
            }
        }
        Ok(())
    }

    /// Tear the whole address space down: every user-half leaf frame is
    /// `decr`'d and every table frame walked is freed, including the
    /// root itself.
    pub fn destroy(self) {
        PageMapper::destroy(self.root);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::init_for_test;

    fn kernel_root() -> PhysAddr {
        let root = unsafe { crate::memory::alloc_frames(1).unwrap() };
        unsafe {
            (*phys_to_safe(root).as_mut_ptr::<crate::arch::riscv64::PageTable>()).zero();
        }
        root
    }

    #[test]
    fn new_address_space_clones_kernel_half() {
        init_for_test(16 * 1024 * 1024);
        let kroot = kernel_root();
        let mut kmapper = PageMapper::new(kroot);
        kmapper
            .map(VirtAddr::new(crate::memory::KERNEL_BASE), PhysAddr::new(0x9000), PteFlags::READ)
            .unwrap();

        let space = AddressSpace::new(kroot).unwrap();
        let mapper = PageMapper::new(space.root());
        assert_eq!(
            mapper.translate(VirtAddr::new(crate::memory::KERNEL_BASE)),
            Some(PhysAddr::new(0x9000))
        );
    }

    #[test]
    fn load_image_copies_segment_bytes() {
        init_for_test(16 * 1024 * 1024);
        let kroot = kernel_root();
        let mut space = AddressSpace::new(kroot).unwrap();
        let data = [0xAAu8; 16];
        let seg = Segment {
            virt_start: VirtAddr::new(0x1000),
            data: &data,
            mem_size: PAGE_SIZE,
            flags: PteFlags::READ | PteFlags::WRITE,
        };
        space.load_image(&[seg]).unwrap();
        let mapper = PageMapper::new(space.root());
        let phys = mapper.translate(VirtAddr::new(0x1000)).unwrap();
        let ptr = phys_to_safe(phys).as_ptr::<u8>();
        assert_eq!(unsafe { *ptr }, 0xAA);
    }

    #[test]
    fn reserve_virt_rejects_overflow_past_user_max() {
        init_for_test(16 * 1024 * 1024);
        let kroot = kernel_root();
        let mut space = AddressSpace::new(kroot).unwrap();
        let huge_pages = (USER_MAX - PAGE_SIZE) / PAGE_SIZE + 10;
        assert_eq!(
            space.reserve_virt(huge_pages),
            Err(AddressSpaceError::SegmentTooLarge)
        );
    }
}
