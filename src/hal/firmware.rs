//! Firmware collaborator (spec's external interface to SBI-like
//! firmware): console I/O, timer programming, and hart control.
//!
//! The kernel only ever talks to firmware through this trait — tests
//! and host builds get [`MockFirmware`], real hardware gets
//! [`SbiFirmware`] (RISC-V target + `firmware-sbi-qemu` feature only).

use alloc::collections::VecDeque;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};

pub trait Firmware: Send + Sync {
    fn putchar(&self, c: u8);
    fn getchar(&self) -> Option<u8>;
    /// Program the next timer interrupt for absolute time `deadline_ticks`.
    fn set_timer(&self, deadline_ticks: u64);
    fn hart_start(&self, hart_id: usize, start_addr: usize, opaque: usize) -> Result<(), &'static str>;
    fn hart_stop(&self) -> !;
    /// Send a supervisor software interrupt to every hart in `hart_mask`.
    fn send_ipi(&self, hart_mask: usize);
    fn timebase_frequency(&self) -> u64;
    /// Free-running cycle counter, same units `set_timer` takes.
    fn now_ticks(&self) -> u64;
}

/// In-memory firmware stand-in: captures console output, replays queued
/// input, and lets tests drive the clock by hand instead of waiting on
/// real timer interrupts.
pub struct MockFirmware {
    output: spin::Mutex<Vec<u8>>,
    input: spin::Mutex<VecDeque<u8>>,
    ticks: AtomicU64,
    next_deadline: AtomicU64,
}

impl MockFirmware {
    pub const fn new() -> Self {
        Self {
            output: spin::Mutex::new(Vec::new()),
            input: spin::Mutex::new(VecDeque::new()),
            ticks: AtomicU64::new(0),
            next_deadline: AtomicU64::new(u64::MAX),
        }
    }

    pub fn push_input(&self, c: u8) {
        self.input.lock().push_back(c);
    }

    pub fn advance_ticks(&self, n: u64) {
        self.ticks.fetch_add(n, Ordering::Relaxed);
    }

    pub fn output_snapshot(&self) -> Vec<u8> {
        self.output.lock().clone()
    }

    pub fn pending_deadline(&self) -> u64 {
        self.next_deadline.load(Ordering::Relaxed)
    }
}

impl Default for MockFirmware {
    fn default() -> Self {
        Self::new()
    }
}

impl Firmware for MockFirmware {
    fn putchar(&self, c: u8) {
        self.output.lock().push(c);
    }

    fn getchar(&self) -> Option<u8> {
        self.input.lock().pop_front()
    }

    fn set_timer(&self, deadline_ticks: u64) {
        self.next_deadline.store(deadline_ticks, Ordering::Relaxed);
    }

    fn hart_start(&self, _hart_id: usize, _start_addr: usize, _opaque: usize) -> Result<(), &'static str> {
        Ok(())
    }

    fn hart_stop(&self) -> ! {
        loop {
            core::hint::spin_loop();
        }
    }

    fn send_ipi(&self, _hart_mask: usize) {}

    fn timebase_frequency(&self) -> u64 {
        10_000_000
    }

    fn now_ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }
}

/// Real firmware backend, talking to OpenSBI (or any SBI implementation)
/// through `ecall`s.
#[cfg(all(target_arch = "riscv64", feature = "firmware-sbi-qemu"))]
pub struct SbiFirmware;

#[cfg(all(target_arch = "riscv64", feature = "firmware-sbi-qemu"))]
impl Firmware for SbiFirmware {
    fn putchar(&self, c: u8) {
        #[allow(deprecated)]
        sbi_rt::legacy::console_putchar(c as usize);
    }

    fn getchar(&self) -> Option<u8> {
        #[allow(deprecated)]
        let c = sbi_rt::legacy::console_getchar();
        if c == usize::MAX {
            None
        } else {
            Some(c as u8)
        }
    }

    fn set_timer(&self, deadline_ticks: u64) {
        sbi_rt::set_timer(deadline_ticks);
    }

    fn hart_start(&self, hart_id: usize, start_addr: usize, opaque: usize) -> Result<(), &'static str> {
        let ret = sbi_rt::hart_start(hart_id, start_addr, opaque);
        if ret.is_ok() {
            Ok(())
        } else {
            Err("SBI hart_start failed")
        }
    }

    fn hart_stop(&self) -> ! {
        let _ = sbi_rt::hart_stop();
        loop {
            core::hint::spin_loop();
        }
    }

    fn send_ipi(&self, hart_mask: usize) {
        let _ = sbi_rt::send_ipi(sbi_rt::HartMask::from_mask_base(hart_mask, 0));
    }

    fn timebase_frequency(&self) -> u64 {
        // QEMU `virt` fixes this at 10 MHz; a real board would read it
        // out of the device tree `timebase-frequency` property.
        10_000_000
    }

    fn now_ticks(&self) -> u64 {
        riscv::register::time::read64()
    }
}
