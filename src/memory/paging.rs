//! Page-table engine (C3)
//!
//! Builds, walks, and tears down SV39 three-level page tables. Works
//! both with the MMU off (boot: roots are bare physical addresses) and
//! with the MMU on (roots reached through the kernel-half identity
//! window) via [`phys_to_safe`].

use super::address::{PhysAddr, VirtAddr, PAGE_SIZE};
use crate::arch::riscv64::pagetable::{PageTable, PageTableEntry, PteFlags};
use core::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingError {
    FrameAllocFailed,
    AddressMisaligned,
    AlreadyMapped,
    InvalidLevel,
}

static MMU_ENABLED: AtomicBool = AtomicBool::new(false);

/// Flip on once the root table is loaded into `satp` and paging takes
/// effect. Before this, physical addresses are directly dereferenceable.
///
/// # Safety
/// Must only be called immediately after the `satp` write that actually
/// enables paging.
pub unsafe fn mark_mmu_enabled() {
    MMU_ENABLED.store(true, Ordering::SeqCst);
}

#[cfg(test)]
mod test_ram {
    pub const SIZE: usize = 64 * 1024 * 1024;
    #[repr(align(4096))]
    pub struct Aligned(pub [u8; SIZE]);
    pub static mut RAM: Aligned = Aligned([0; SIZE]);
}

#[cfg(test)]
static TEST_OFFSET: spin::Once<usize> = spin::Once::new();

/// Host test harness: back all physical addresses used in tests with a
/// real, writable array so frame zeroing and page-table walks can
/// actually dereference memory without a real MMU.
#[cfg(test)]
pub fn test_identity_map() {
    TEST_OFFSET.call_once(|| unsafe { core::ptr::addr_of_mut!(test_ram::RAM.0).cast::<u8>() as usize });
}

/// Translate a physical address into one the kernel can safely
/// dereference right now, in whichever regime (MMU-off/on) it is in.
pub fn phys_to_safe(p: PhysAddr) -> VirtAddr {
    #[cfg(test)]
    {
        let off = *TEST_OFFSET
            .get()
            .expect("paging::test_identity_map() must run before any physical access in tests");
        VirtAddr::new(off + p.as_usize())
    }
    #[cfg(not(test))]
    {
        if MMU_ENABLED.load(Ordering::SeqCst) {
            VirtAddr::new(p.as_usize() + super::address::KERNEL_BASE)
        } else {
            VirtAddr::new(p.as_usize())
        }
    }
}

/// Inverse of [`phys_to_safe`]: recover the physical address backing a
/// pointer previously produced by it. Used by the heap's large-object
/// path, which hands raw pointers straight to callers and must later
/// find their frames again to `decr` them.
pub fn safe_to_phys(v: VirtAddr) -> PhysAddr {
    #[cfg(test)]
    {
        let off = *TEST_OFFSET
            .get()
            .expect("paging::test_identity_map() must run before any physical access in tests");
        PhysAddr::new(v.as_usize() - off)
    }
    #[cfg(not(test))]
    {
        if MMU_ENABLED.load(Ordering::SeqCst) {
            PhysAddr::new(v.as_usize() - super::address::KERNEL_BASE)
        } else {
            PhysAddr::new(v.as_usize())
        }
    }
}

fn table_ptr(phys: PhysAddr) -> *mut PageTable {
    phys_to_safe(phys).as_mut_ptr()
}

/// A page-table walker rooted at a particular frame. One `PageMapper`
/// per address space.
pub struct PageMapper {
    root: PhysAddr,
}

impl PageMapper {
    pub fn new(root: PhysAddr) -> Self {
        Self { root }
    }

    pub fn root(&self) -> PhysAddr {
        self.root
    }

    /// Walk to the level-0 (leaf) entry for `virt`, allocating
    /// intermediate tables on demand when `allocate` is set.
    pub fn walk_to_entry(
        &mut self,
        virt: VirtAddr,
        allocate: bool,
    ) -> Result<*mut PageTableEntry, MappingError> {
        let mut table = table_ptr(self.root);

        for level in (1..=2).rev() {
            let idx = virt.vpn(level);
            let entry = unsafe { &mut (*table).entries[idx] };

            if !entry.is_valid() {
                if !allocate {
                    return Err(MappingError::InvalidLevel);
                }
                let frame = unsafe { super::alloc_frames(1) }
                    .map_err(|_| MappingError::FrameAllocFailed)?;
                unsafe { (*table_ptr(frame)).zero() };
                entry.set(frame, PteFlags::VALID);
            } else if entry.is_leaf() {
                // A superpage already occupies this range.
                return Err(MappingError::InvalidLevel);
            }

            table = table_ptr(entry.phys_addr());
        }

        let idx = virt.vpn(0);
        Ok(unsafe { &mut (*table).entries[idx] as *mut _ })
    }

    fn translate_inner(&self, virt: VirtAddr, require_user: bool) -> Option<PhysAddr> {
        let mut table = table_ptr(self.root);

        for level in (0..=2).rev() {
            let idx = virt.vpn(level);
            let entry = unsafe { (*table).entries[idx] };

            if !entry.is_valid() {
                return None;
            }
            if entry.is_leaf() {
                if require_user && !entry.flags().contains(PteFlags::USER) {
                    return None;
                }
                return Some(entry.phys_addr() + virt.offset_in_page());
            }
            table = table_ptr(entry.phys_addr());
        }

        None
    }

    /// Read-only walk; never allocates.
    pub fn translate(&self, virt: VirtAddr) -> Option<PhysAddr> {
        self.translate_inner(virt, false)
    }

    /// Like `translate`, but also requires the leaf be `U=1`. The kernel
    /// half is always present in every task's root table (see
    /// `clone_kernel_half`), so a plain `translate` would happily resolve
    /// a user-supplied pointer into kernel-only memory; anything reading
    /// or writing through a syscall argument must walk with this instead.
    pub fn translate_user(&self, virt: VirtAddr) -> Option<PhysAddr> {
        self.translate_inner(virt, true)
    }

    pub fn map(&mut self, virt: VirtAddr, phys: PhysAddr, flags: PteFlags) -> Result<(), MappingError> {
        if !virt.is_aligned(PAGE_SIZE) || !phys.is_aligned(PAGE_SIZE) {
            return Err(MappingError::AddressMisaligned);
        }

        let entry_ptr = self.walk_to_entry(virt, true)?;
        let entry = unsafe { &mut *entry_ptr };
        if entry.is_valid() {
            return Err(MappingError::AlreadyMapped);
        }
        entry.set(phys, flags | PteFlags::VALID);
        Ok(())
    }

    /// Combines frame allocation with `map`. Idempotent: a pre-existing
    /// mapping with identical flags returns its frame instead of
    /// erroring.
    pub fn alloc_and_map(&mut self, virt: VirtAddr, flags: PteFlags) -> Result<PhysAddr, MappingError> {
        if !virt.is_aligned(PAGE_SIZE) {
            return Err(MappingError::AddressMisaligned);
        }

        let entry_ptr = self.walk_to_entry(virt, true)?;
        let entry = unsafe { &mut *entry_ptr };

        if entry.is_valid() {
            return if entry.flags() == (flags | PteFlags::VALID) {
                Ok(entry.phys_addr())
            } else {
                Err(MappingError::AlreadyMapped)
            };
        }

        let frame = unsafe { super::alloc_frames(1) }.map_err(|_| MappingError::FrameAllocFailed)?;
        entry.set(frame, flags | PteFlags::VALID);
        Ok(frame)
    }

    /// No-op if the leaf is absent.
    pub fn change_flags(&mut self, virt: VirtAddr, flags: PteFlags) {
        if let Ok(entry_ptr) = self.walk_to_entry(virt, false) {
            let entry = unsafe { &mut *entry_ptr };
            if entry.is_valid() {
                let phys = entry.phys_addr();
                entry.set(phys, flags | PteFlags::VALID);
            }
        }
    }

    /// Returns the freed leaf's frame so the caller can `decr` it.
    pub fn unmap(&mut self, virt: VirtAddr) -> Option<PhysAddr> {
        let entry_ptr = self.walk_to_entry(virt, false).ok()?;
        let entry = unsafe { &mut *entry_ptr };
        if !entry.is_valid() {
            return None;
        }
        let phys = entry.phys_addr();
        entry.clear();
        Some(phys)
    }

    /// Identity-map `[start, end)` for the kernel half. Tolerates
    /// already-mapped pages so callers can call it incrementally.
    pub fn map_range_identity(
        &mut self,
        start: PhysAddr,
        end: PhysAddr,
        flags: PteFlags,
    ) -> Result<(), MappingError> {
        let mut addr = start.align_down(PAGE_SIZE);
        while addr.as_usize() < end.as_usize() {
            let virt = VirtAddr::new(addr.as_usize());
            match self.map(virt, addr, flags) {
                Ok(()) | Err(MappingError::AlreadyMapped) => {}
                Err(e) => return Err(e),
            }
            addr = addr + PAGE_SIZE;
        }
        Ok(())
    }

    /// Copy the upper half of the root table (VPN2 indices 256..512,
    /// the kernel region) from `src` into `self`'s root.
    pub fn clone_kernel_half(&mut self, src: PhysAddr) {
        let src_table = unsafe { &*table_ptr(src) };
        let dst_table = unsafe { &mut *table_ptr(self.root) };
        for i in 256..512 {
            dst_table.entries[i] = src_table.entries[i];
        }
    }

    /// Walk every user-half leaf (`G=0`), `decr` its frame, and free
    /// every table frame visited, including the root itself.
    pub fn destroy(root: PhysAddr) {
        let top = unsafe { &*table_ptr(root) };
        for i in 0..256 {
            let e = top.entries[i];
            if !e.is_valid() {
                continue;
            }
            if e.is_leaf() {
                if !e.flags().contains(PteFlags::GLOBAL) {
                    super::decr_frames(e.phys_addr(), 1);
                }
            } else {
                Self::destroy_level(e.phys_addr(), 1);
            }
        }
        super::decr_frames(root, 1);
    }

    fn destroy_level(table_phys: PhysAddr, level: usize) {
        let table = unsafe { &*table_ptr(table_phys) };
        for i in 0..512 {
            let e = table.entries[i];
            if !e.is_valid() {
                continue;
            }
            if e.is_leaf() {
                if !e.flags().contains(PteFlags::GLOBAL) {
                    super::decr_frames(e.phys_addr(), 1);
                }
            } else if level > 0 {
                Self::destroy_level(e.phys_addr(), level - 1);
            }
        }
        super::decr_frames(table_phys, 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{init_for_test, PAGE_SIZE};

    fn new_root() -> PhysAddr {
        let frame = unsafe { super::super::alloc_frames(1).unwrap() };
        unsafe { (*table_ptr(frame)).zero() };
        frame
    }

    #[test]
    fn map_then_translate_roundtrips() {
        init_for_test(16 * 1024 * 1024);
        let root = new_root();
        let mut mapper = PageMapper::new(root);
        let phys = unsafe { super::super::alloc_frames(1).unwrap() };
        let virt = VirtAddr::new(0x1000);
        mapper.map(virt, phys, PteFlags::READ | PteFlags::WRITE).unwrap();
        assert_eq!(mapper.translate(virt), Some(phys));
    }

    #[test]
    fn map_twice_is_already_mapped() {
        init_for_test(16 * 1024 * 1024);
        let root = new_root();
        let mut mapper = PageMapper::new(root);
        let phys = unsafe { super::super::alloc_frames(1).unwrap() };
        let virt = VirtAddr::new(0x2000);
        mapper.map(virt, phys, PteFlags::READ).unwrap();
        assert_eq!(
            mapper.map(virt, phys, PteFlags::READ),
            Err(MappingError::AlreadyMapped)
        );
    }

    #[test]
    fn unmap_returns_frame_and_clears_entry() {
        init_for_test(16 * 1024 * 1024);
        let root = new_root();
        let mut mapper = PageMapper::new(root);
        let phys = unsafe { super::super::alloc_frames(1).unwrap() };
        let virt = VirtAddr::new(0x3000);
        mapper.map(virt, phys, PteFlags::READ).unwrap();
        assert_eq!(mapper.unmap(virt), Some(phys));
        assert_eq!(mapper.translate(virt), None);
    }

    #[test]
    fn change_flags_is_noop_when_unmapped() {
        init_for_test(16 * 1024 * 1024);
        let root = new_root();
        let mut mapper = PageMapper::new(root);
        mapper.change_flags(VirtAddr::new(0x4000), PteFlags::READ);
        assert_eq!(mapper.translate(VirtAddr::new(0x4000)), None);
    }

    #[test]
    fn alloc_and_map_is_idempotent() {
        init_for_test(16 * 1024 * 1024);
        let root = new_root();
        let mut mapper = PageMapper::new(root);
        let virt = VirtAddr::new(0x5000);
        let flags = PteFlags::READ | PteFlags::WRITE;
        let a = mapper.alloc_and_map(virt, flags).unwrap();
        let b = mapper.alloc_and_map(virt, flags).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn translate_user_rejects_a_non_user_leaf() {
        init_for_test(16 * 1024 * 1024);
        let root = new_root();
        let mut mapper = PageMapper::new(root);
        let phys = unsafe { super::super::alloc_frames(1).unwrap() };
        let virt = VirtAddr::new(0x6000);
        mapper.map(virt, phys, PteFlags::READ | PteFlags::WRITE).unwrap();
        assert_eq!(mapper.translate(virt), Some(phys));
        assert_eq!(mapper.translate_user(virt), None);
    }

    #[test]
    fn translate_user_accepts_a_user_leaf() {
        init_for_test(16 * 1024 * 1024);
        let root = new_root();
        let mut mapper = PageMapper::new(root);
        let phys = unsafe { super::super::alloc_frames(1).unwrap() };
        let virt = VirtAddr::new(0x7000);
        mapper
            .map(virt, phys, PteFlags::READ | PteFlags::WRITE | PteFlags::USER)
            .unwrap();
        assert_eq!(mapper.translate_user(virt), Some(phys));
    }

    #[test]
    fn map_range_identity_covers_whole_range() {
        init_for_test(16 * 1024 * 1024);
        let root = new_root();
        let mut mapper = PageMapper::new(root);
        let start = PhysAddr::new(0x10000);
        let end = start + 4 * PAGE_SIZE;
        mapper
            .map_range_identity(start, end, PteFlags::READ | PteFlags::WRITE)
            .unwrap();
        let mut addr = start;
        while addr.as_usize() < end.as_usize() {
            assert_eq!(mapper.translate(VirtAddr::new(addr.as_usize())), Some(addr));
            addr = addr + PAGE_SIZE;
        }
    }
}
