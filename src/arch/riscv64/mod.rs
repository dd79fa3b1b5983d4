//! RISC-V 64-bit (SV39) architecture support
//!
//! Everything that is specific to the RV64 ISA and its supervisor-mode
//! trap/paging model lives here: the trap frame layout, the SV39
//! three-level page table format, and the trap vector entry point.

pub mod context;
pub mod pagetable;
pub mod trap;

pub use context::TrapFrame;
pub use pagetable::{PageTable, PageTableEntry, PteFlags};
