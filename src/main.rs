#![no_std]
#![no_main]

/// RISC-V entry point. OpenSBI (or any SBI-compliant firmware) jumps
/// here in S-mode with `a0` = hartid and `a1` = a pointer to the
/// flattened device tree it loaded.
#[cfg(target_arch = "riscv64")]
core::arch::global_asm!(
    ".section .text._start",
    ".global _start",
    ".type _start, @function",
    "_start:",
    "    la sp, __stack_top",
    "    j {kernel_entry}",
    kernel_entry = sym kernel_entry,
);

/// Fixed QEMU `virt` memory layout, used until a real device-tree
/// walker lands — `hal::DeviceTree` parsing is an external
/// collaborator this kernel only consumes, not one it implements.
#[cfg(target_arch = "riscv64")]
struct FixedDeviceTree {
    regions: [kernel::hal::MemoryRegion; 1],
}

#[cfg(target_arch = "riscv64")]
impl kernel::hal::DeviceTree for FixedDeviceTree {
    fn memory_regions(&self) -> &[kernel::hal::MemoryRegion] {
        &self.regions
    }

    fn ramdisk_region(&self) -> Option<kernel::hal::MemoryRegion> {
        None
    }
}

/// No ramdisk loader is wired up yet — `initd` has nowhere to come
/// from on real hardware until one is. Boot fails loudly rather than
/// pretending to find an image.
#[cfg(target_arch = "riscv64")]
struct NoRamdisk;

#[cfg(target_arch = "riscv64")]
impl kernel::boot::InitialProgramSource for NoRamdisk {
    fn lookup(&self, _name: &str) -> Option<&[u8]> {
        None
    }
}

#[cfg(target_arch = "riscv64")]
extern "C" fn kernel_entry(_hartid: usize, _dtb: usize) -> ! {
    let device_tree = FixedDeviceTree {
        regions: [kernel::hal::MemoryRegion {
            base: kernel::memory::PhysAddr::new(0x8000_0000),
            size: 128 * 1024 * 1024,
        }],
    };
    kernel::boot::kernel_main(&device_tree, &NoRamdisk)
}

#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    loop {
        core::hint::spin_loop();
    }
}
