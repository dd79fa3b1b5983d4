//! SV39 page table entry format
//!
//! Three levels, 512 entries each, 4 KiB leaves at level 0. Grounded on
//! the teacher's `PageTableFlags`/`PageTable` split (flags as bitflags,
//! table as a fixed 512-entry array occupying exactly one frame) but
//! with the RISC-V SV39 bit layout instead of AArch64's.

use crate::memory::address::PhysAddr;
use bitflags::bitflags;

bitflags! {
    /// The eight SV39 PTE flag bits, matching the hardware layout
    /// exactly (bits 0..7 of the 64-bit entry).
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct PteFlags: u64 {
        const VALID    = 1 << 0;
        const READ     = 1 << 1;
        const WRITE    = 1 << 2;
        const EXECUTE  = 1 << 3;
        const USER     = 1 << 4;
        const GLOBAL   = 1 << 5;
        const ACCESSED = 1 << 6;
        const DIRTY    = 1 << 7;
    }
}

impl PteFlags {
    /// A leaf has at least one of R/W/X set; a pure table pointer has
    /// none of them.
    pub const RWX: Self = Self::READ.union(Self::WRITE).union(Self::EXECUTE);

    #[inline]
    pub const fn is_leaf(self) -> bool {
        self.intersects(Self::RWX)
    }
}

const PPN_SHIFT: u32 = 10;
const PPN_MASK: u64 = 0x3FF_FFFF_FFFF; // 44 bits of PPN

#[derive(Clone, Copy)]
#[repr(transparent)]
pub struct PageTableEntry(u64);

impl PageTableEntry {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn new(phys: PhysAddr, flags: PteFlags) -> Self {
        let ppn = (phys.as_usize() as u64 >> 12) & PPN_MASK;
        Self((ppn << PPN_SHIFT) | flags.bits())
    }

    #[inline]
    pub fn flags(self) -> PteFlags {
        PteFlags::from_bits_truncate(self.0 & 0xFF)
    }

    #[inline]
    pub fn is_valid(self) -> bool {
        self.flags().contains(PteFlags::VALID)
    }

    #[inline]
    pub fn is_leaf(self) -> bool {
        self.is_valid() && self.flags().is_leaf()
    }

    #[inline]
    pub fn phys_addr(self) -> PhysAddr {
        PhysAddr::new((((self.0 >> PPN_SHIFT) & PPN_MASK) << 12) as usize)
    }

    pub fn set(&mut self, phys: PhysAddr, flags: PteFlags) {
        *self = Self::new(phys, flags);
    }

    pub fn clear(&mut self) {
        self.0 = 0;
    }
}

/// One level of an SV39 page table: 512 eight-byte entries, exactly one
/// 4 KiB frame.
#[repr(C, align(4096))]
pub struct PageTable {
    pub entries: [PageTableEntry; 512],
}

impl PageTable {
    pub fn zero(&mut self) {
        for e in self.entries.iter_mut() {
            e.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pte_roundtrips_phys_addr_and_flags() {
        let phys = PhysAddr::new(0x8020_0000);
        let pte = PageTableEntry::new(phys, PteFlags::VALID | PteFlags::READ | PteFlags::WRITE);
        assert_eq!(pte.phys_addr(), phys);
        assert!(pte.is_leaf());
        assert!(pte.flags().contains(PteFlags::WRITE));
    }

    #[test]
    fn table_pointer_entry_is_not_a_leaf() {
        let pte = PageTableEntry::new(PhysAddr::new(0x1000), PteFlags::VALID);
        assert!(pte.is_valid());
        assert!(!pte.is_leaf());
    }
}
