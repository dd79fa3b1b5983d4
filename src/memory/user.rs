//! Copying bytes across the trap boundary (C9 support)
//!
//! Syscall arguments that are pointers into user space must be
//! resolved against the calling task's own page table before the
//! kernel can touch them — there is no identity mapping to lean on,
//! and a page spanning a syscall's byte range may not even be
//! contiguous in physical memory.

use super::paging::{phys_to_safe, PageMapper};
use super::{PhysAddr, VirtAddr, PAGE_SIZE};
use alloc::vec::Vec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserMemError {
    NotMapped,
}

/// Read `len` bytes starting at `ptr` in the address space rooted at
/// `root`, walking as many pages as the range spans.
pub fn read_bytes(root: PhysAddr, ptr: u64, len: u64) -> Result<Vec<u8>, UserMemError> {
    let mapper = PageMapper::new(root);
    let mut out = Vec::with_capacity(len as usize);
    let mut addr = ptr as usize;
    let end = addr + len as usize;
    while addr < end {
        let page = VirtAddr::new(addr).align_down(PAGE_SIZE);
        let phys = mapper.translate_user(page).ok_or(UserMemError::NotMapped)?;
        let offset = addr - page.as_usize();
        let take = (PAGE_SIZE - offset).min(end - addr);
        let src = phys_to_safe(phys + offset).as_ptr::<u8>();
        out.extend_from_slice(unsafe { core::slice::from_raw_parts(src, take) });
        addr += take;
    }
    Ok(out)
}

/// Write `data` starting at `ptr` in `root`'s address space.
pub fn write_bytes(root: PhysAddr, ptr: u64, data: &[u8]) -> Result<(), UserMemError> {
    let mapper = PageMapper::new(root);
    let mut addr = ptr as usize;
    let end = addr + data.len();
    let mut copied = 0;
    while addr < end {
        let page = VirtAddr::new(addr).align_down(PAGE_SIZE);
        let phys = mapper.translate_user(page).ok_or(UserMemError::NotMapped)?;
        let offset = addr - page.as_usize();
        let take = (PAGE_SIZE - offset).min(end - addr);
        let dst = phys_to_safe(phys + offset).as_mut_ptr::<u8>();
        unsafe { core::ptr::copy_nonoverlapping(data[copied..].as_ptr(), dst, take) };
        addr += take;
        copied += take;
    }
    Ok(())
}

/// Write a single `u64` to `ptr`. A null `ptr` is treated as "caller
/// doesn't want this output" and silently skipped, matching the
/// optional out-parameters several syscalls take.
pub fn write_u64(root: PhysAddr, ptr: u64, value: u64) -> Result<(), UserMemError> {
    if ptr == 0 {
        return Ok(());
    }
    write_bytes(root, ptr, &value.to_ne_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::riscv64::PteFlags;
    use crate::memory::{init_for_test, VirtAddr as VA};

    fn new_root() -> PhysAddr {
        let frame = unsafe { crate::memory::alloc_frames(1).unwrap() };
        unsafe {
            (*phys_to_safe(frame).as_mut_ptr::<crate::arch::riscv64::PageTable>()).zero();
        }
        frame
    }

    #[test]
    fn write_then_read_bytes_roundtrips_across_a_page() {
        init_for_test(16 * 1024 * 1024);
        let root = new_root();
        let mut mapper = PageMapper::new(root);
        let virt = VA::new(0x5000);
        mapper
            .alloc_and_map(virt, PteFlags::READ | PteFlags::WRITE | PteFlags::USER)
            .unwrap();

        let data = [1u8, 2, 3, 4, 5];
        write_bytes(root, virt.as_u64(), &data).unwrap();
        assert_eq!(read_bytes(root, virt.as_u64(), data.len() as u64).unwrap(), data);
    }

    #[test]
    fn write_u64_skips_null_pointer() {
        init_for_test(16 * 1024 * 1024);
        let root = new_root();
        assert_eq!(write_u64(root, 0, 42), Ok(()));
    }

    #[test]
    fn read_unmapped_pointer_is_not_mapped() {
        init_for_test(16 * 1024 * 1024);
        let root = new_root();
        assert_eq!(read_bytes(root, 0x9000, 8), Err(UserMemError::NotMapped));
    }

    #[test]
    fn read_bytes_rejects_a_mapping_without_the_user_bit() {
        init_for_test(16 * 1024 * 1024);
        let root = new_root();
        let mut mapper = PageMapper::new(root);
        let virt = VA::new(0x6000);
        mapper.alloc_and_map(virt, PteFlags::READ | PteFlags::WRITE).unwrap();
        assert_eq!(read_bytes(root, virt.as_u64(), 8), Err(UserMemError::NotMapped));
    }

    #[test]
    fn write_bytes_rejects_a_mapping_without_the_user_bit() {
        init_for_test(16 * 1024 * 1024);
        let root = new_root();
        let mut mapper = PageMapper::new(root);
        let virt = VA::new(0x7000);
        mapper.alloc_and_map(virt, PteFlags::READ | PteFlags::WRITE).unwrap();
        assert_eq!(write_bytes(root, virt.as_u64(), &[1, 2, 3]), Err(UserMemError::NotMapped));
    }
}
