//! Kernel configuration and compile-time backend composition
//!
//! Mirrors the teacher's compile-time console selection, but selects a
//! firmware backend (C10/external interface) rather than a console
//! driver: `firmware-sbi-qemu` talks to OpenSBI over `ecall`, while
//! `firmware-mock` (and any host/test build, which can't target real
//! hardware) uses an in-memory stand-in.

use crate::hal::{Firmware, MockFirmware};

#[cfg(all(target_arch = "riscv64", feature = "firmware-sbi-qemu"))]
use crate::hal::SbiFirmware;

#[cfg(all(target_arch = "riscv64", feature = "firmware-sbi-qemu"))]
static SBI_FIRMWARE: SbiFirmware = SbiFirmware;

static MOCK_FIRMWARE: MockFirmware = MockFirmware::new();

/// The firmware backend this build talks to.
#[cfg(all(target_arch = "riscv64", feature = "firmware-sbi-qemu"))]
pub fn firmware() -> &'static dyn Firmware {
    &SBI_FIRMWARE
}

#[cfg(not(all(target_arch = "riscv64", feature = "firmware-sbi-qemu")))]
pub fn firmware() -> &'static dyn Firmware {
    &MOCK_FIRMWARE
}
