//! A preemptive, capability-based microkernel for 64-bit RISC-V (SV39).
//!
//! # Architecture
//!
//! - `boot`: firmware/DTB-provided memory map through to the first
//!   scheduled task
//! - `arch`: RISC-V SV39 trap frame, page table format, trap vector
//! - `memory`: frame allocator, page-table engine, kernel heap, the
//!   trap-boundary user-memory helpers syscalls use
//! - `task`: per-task address spaces and the process/thread table
//! - `scheduler`: single-hart round-robin ready queue and wake scan
//! - `ipc`: capability tokens, message queues, the send/recv engine
//! - `syscall`: the `ecall` dispatcher built on all of the above
//! - `hal`/`config`: firmware and device-tree/ramdisk collaborator
//!   boundary, and the compile-time backend selection over it
//! - `debug`: levelled kernel logging

#![no_std]

extern crate alloc;

pub mod arch;
pub mod boot;
pub mod config;
pub mod debug;
pub mod hal;
pub mod ipc;
pub mod memory;
pub mod scheduler;
pub mod syscall;
pub mod task;
