//! Send/receive engine (C8)
//!
//! `send` resolves a capability to a target task's queue and either
//! delivers immediately or, for a blocking caller, parks the sender in
//! `BlockedSend` with the message already built. `recv` pops the
//! caller's own queue and, having freed a slot, opportunistically
//! delivers one parked sender if the caller's queue was their target.
//!
//! `Pointer` and `Data` messages resolve their payload before the
//! message is queued: `Pointer` shares the sender's page (refcount
//! bump, map into the receiver) so both sides see the same frame;
//! `Data` copies it into a fresh frame in the receiver, so the sender
//! can reuse or unmap its own copy afterwards without racing the
//! receiver.

use crate::arch::riscv64::PteFlags;
use crate::memory::address::PAGE_SIZE;
use crate::memory::paging::phys_to_safe;
use crate::memory::user::write_u64;
use crate::memory::{self, PageMapper, VirtAddr};
use crate::scheduler::with_scheduler;
use crate::task::table::{Pid, Task, TaskError, TaskState, TaskTable};
use alloc::vec::Vec;

use super::capability::{self, Capability};
use super::message::{Message, MessageType};
use super::queue::QueueError;

fn message_type_tag(kind: MessageType) -> u64 {
    match kind {
        MessageType::Signal => 0,
        MessageType::Int => 1,
        MessageType::Pointer => 2,
        MessageType::Data => 3,
        MessageType::Interrupt => 4,
    }
}

/// Write a received message's fields into the receiver's own address
/// space at the four out-pointers `recv` was called with. A null
/// pointer means the caller doesn't want that field and is skipped.
pub fn write_message(
    table: &TaskTable,
    pid: Pid,
    msg: Message,
    out_pid: VirtAddr,
    out_type: VirtAddr,
    out_payload: VirtAddr,
    out_meta: VirtAddr,
) -> Result<(), IpcError> {
    let root = task_root(table, pid)?;
    write_u64(root, out_pid.as_u64(), msg.source_pid as u64).map_err(|_| IpcError::InvalidArgument)?;
    write_u64(root, out_type.as_u64(), message_type_tag(msg.kind)).map_err(|_| IpcError::InvalidArgument)?;
    write_u64(root, out_payload.as_u64(), msg.payload).map_err(|_| IpcError::InvalidArgument)?;
    write_u64(root, out_meta.as_u64(), msg.metadata).map_err(|_| IpcError::InvalidArgument)?;
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpcError {
    PermissionDenied,
    NoSuchTarget,
    InvalidArgument,
    OutOfMemory,
    Full,
    Empty,
}

impl From<TaskError> for IpcError {
    fn from(e: TaskError) -> Self {
        match e {
            TaskError::NoSuchTarget => Self::NoSuchTarget,
            TaskError::OutOfMemory => Self::OutOfMemory,
            _ => Self::InvalidArgument,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Delivered,
    Blocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvOutcome {
    Received(Message),
    Blocked,
}

fn task_root(table: &TaskTable, pid: Pid) -> Result<crate::memory::PhysAddr, IpcError> {
    Ok(table
        .get(pid)
        .ok_or(IpcError::NoSuchTarget)?
        .owning_address_space)
}

/// Share every page backing `[payload, payload + metadata)` (a range in
/// `source`'s space) into `target`, bumping each frame's refcount, and
/// return the receiver-side address (same offset into the first page).
/// Every source page in the range must already be mapped; on any
/// failure, partway through, every page already shared is unwound.
fn share_page(table: &mut TaskTable, source: Pid, target: Pid, payload: u64, metadata: u64) -> Result<u64, IpcError> {
    let source_root = task_root(table, source)?;
    let vaddr = VirtAddr::new(payload as usize);
    let base_page = vaddr.align_down(PAGE_SIZE);
    let page_count = (metadata as usize).div_ceil(PAGE_SIZE);

    let source_mapper = PageMapper::new(source_root);
    let mut phys_pages = Vec::with_capacity(page_count);
    for i in 0..page_count {
        let page_vaddr = VirtAddr::new(base_page.as_usize() + i * PAGE_SIZE);
        let phys = source_mapper
            .translate(page_vaddr)
            .ok_or(IpcError::InvalidArgument)?;
        phys_pages.push(phys);
    }

    let dest_base = table.reserve_virt(target, page_count)?;
    let target_root = task_root(table, target)?;
    let mut target_mapper = PageMapper::new(target_root);
    for (i, phys) in phys_pages.iter().enumerate() {
        memory::incr_frames(*phys, 1);
        let dest_virt = VirtAddr::new(dest_base.as_usize() + i * PAGE_SIZE);
        if target_mapper
            .map(dest_virt, *phys, PteFlags::READ | PteFlags::WRITE | PteFlags::USER)
            .is_err()
        {
            memory::decr_frames(*phys, 1);
            for (j, prior_phys) in phys_pages[..i].iter().enumerate() {
                let v = VirtAddr::new(dest_base.as_usize() + j * PAGE_SIZE);
                if target_mapper.unmap(v).is_some() {
                    memory::decr_frames(*prior_phys, 1);
                }
            }
            return Err(IpcError::InvalidArgument);
        }
    }

    Ok(dest_base.as_usize() as u64 + vaddr.offset_in_page() as u64)
}

/// Copy every page backing `[payload, payload + metadata)` into fresh
/// frames in `target` and return the receiver-side address. `Data`
/// sends are bounded to a single page by `send`'s validation, but this
/// walks the same way `share_page` does so both resolve a range rather
/// than hard-coding one page.
fn copy_page(table: &mut TaskTable, source: Pid, target: Pid, payload: u64, metadata: u64) -> Result<u64, IpcError> {
    let source_root = task_root(table, source)?;
    let vaddr = VirtAddr::new(payload as usize);
    let base_page = vaddr.align_down(PAGE_SIZE);
    let page_count = (metadata as usize).div_ceil(PAGE_SIZE);

    let source_mapper = PageMapper::new(source_root);
    let mut src_phys_pages = Vec::with_capacity(page_count);
    for i in 0..page_count {
        let page_vaddr = VirtAddr::new(base_page.as_usize() + i * PAGE_SIZE);
        let phys = source_mapper
            .translate(page_vaddr)
            .ok_or(IpcError::InvalidArgument)?;
        src_phys_pages.push(phys);
    }

    let dest_base = table.reserve_virt(target, page_count)?;
    let target_root = task_root(table, target)?;
    let mut target_mapper = PageMapper::new(target_root);
    for (i, src_phys) in src_phys_pages.iter().enumerate() {
        let dest_virt = VirtAddr::new(dest_base.as_usize() + i * PAGE_SIZE);
        let dest_phys = match target_mapper.alloc_and_map(dest_virt, PteFlags::READ | PteFlags::WRITE | PteFlags::USER) {
            Ok(p) => p,
            Err(_) => {
                for j in 0..i {
                    let v = VirtAddr::new(dest_base.as_usize() + j * PAGE_SIZE);
                    if let Some(p) = target_mapper.unmap(v) {
                        memory::decr_frames(p, 1);
                    }
                }
                return Err(IpcError::OutOfMemory);
            }
        };

        unsafe {
            let src = phys_to_safe(*src_phys).as_ptr::<u8>();
            let dst = phys_to_safe(dest_phys).as_mut_ptr::<u8>();
            core::ptr::copy_nonoverlapping(src, dst, PAGE_SIZE);
        }
    }

    Ok(dest_base.as_usize() as u64 + vaddr.offset_in_page() as u64)
}

/// If `pid` is parked in `recv`, complete it right here: pop the
/// message that was just queued, write it into the out-pointers the
/// blocked call was given, and set its trapframe up to resume past the
/// `ecall` with that result already in place. There is no second pass
/// through `recv` once the task is rescheduled.
fn wake_if_blocked_recv(table: &mut TaskTable, pid: Pid) {
    let out = match table.get(pid).map(|t| t.state) {
        Some(TaskState::BlockedRecv { out_pid, out_type, out_payload, out_meta, .. }) => {
            Some((out_pid, out_type, out_payload, out_meta))
        }
        _ => None,
    };
    let Some((out_pid, out_type, out_payload, out_meta)) = out else { return };

    let popped = table.get_mut(pid).unwrap().message_queue.pop();
    let Ok(msg) = popped else { return };

    let _ = write_message(table, pid, msg, out_pid, out_type, out_payload, out_meta);
    let task = table.get_mut(pid).unwrap();
    task.saved_registers.set_return_value(0);
    task.saved_registers.advance_pc();
    task.state = TaskState::Ready;
    with_scheduler(|s| s.enqueue_ready(pid));
    deliver_pending_send(table, pid);
}

/// Resolve `channel` and deliver a message from `source` to its bound
/// task. A full queue either fails fast (non-blocking) or parks the
/// sender (`blocking`) for the IPC engine to redeliver from `recv`.
pub fn send(
    table: &mut TaskTable,
    source: Pid,
    channel: Capability,
    kind: MessageType,
    payload: u64,
    metadata: u64,
    blocking: bool,
) -> Result<SendOutcome, IpcError> {
    let binding = capability::resolve(channel).ok_or(IpcError::PermissionDenied)?;
    let target = binding.queue_id;
    if table.get(target).is_none() {
        return Err(IpcError::NoSuchTarget);
    }

    match kind {
        MessageType::Pointer if metadata == 0 => return Err(IpcError::InvalidArgument),
        MessageType::Data if metadata == 0 || metadata > PAGE_SIZE as u64 => {
            return Err(IpcError::InvalidArgument);
        }
        _ => {}
    }

    let resolved_payload = match kind {
        MessageType::Pointer => share_page(table, source, target, payload, metadata)?,
        MessageType::Data => copy_page(table, source, target, payload, metadata)?,
        _ => payload,
    };
    let message = Message::new(source, kind, resolved_payload, metadata);

    let target_task: &mut Task = table.get_mut(target).ok_or(IpcError::NoSuchTarget)?;
    match target_task.message_queue.push(message) {
        Ok(()) => {
            wake_if_blocked_recv(table, target);
            Ok(SendOutcome::Delivered)
        }
        Err(QueueError::Full) => {
            if blocking {
                let sender = table.get_mut(source).ok_or(IpcError::NoSuchTarget)?;
                sender.state = TaskState::BlockedSend {
                    target_queue: target,
                    pending_message: message,
                };
                Ok(SendOutcome::Blocked)
            } else {
                Err(IpcError::Full)
            }
        }
        Err(QueueError::Empty) => unreachable!("push never returns Empty"),
    }
}

/// Any task whose `BlockedSend` targets `target_pid` is retried once a
/// slot frees up; at most one is woken per `recv`, matching queue FIFO
/// order on a first-parked basis (table order is PID order).
fn deliver_pending_send(table: &mut TaskTable, target_pid: Pid) {
    let sender_pid = table.iter().find_map(|t| match t.state {
        TaskState::BlockedSend { target_queue, .. } if target_queue == target_pid => Some(t.pid),
        _ => None,
    });
    let Some(sender_pid) = sender_pid else { return };
    let pending = match table.get(sender_pid).unwrap().state {
        TaskState::BlockedSend { pending_message, .. } => pending_message,
        _ => unreachable!(),
    };
    let delivered = table
        .get_mut(target_pid)
        .unwrap()
        .message_queue
        .push(pending)
        .is_ok();
    if delivered {
        let sender = table.get_mut(sender_pid).unwrap();
        sender.saved_registers.set_return_value(0);
        sender.saved_registers.advance_pc();
        sender.state = TaskState::Ready;
        with_scheduler(|s| s.enqueue_ready(sender_pid));
    }
}

/// Pop one message from the queue named by `channel`, which must be a
/// capability bound to `pid`'s own queue (the self-receive capability
/// every task is minted at spawn). `out_*` are the caller's out-pointers;
/// on an immediate `Received` the caller still has to write them itself
/// (it already has the `Message` in hand) — they are only used here to
/// remember where to write once a parked `BlockedRecv` is completed by
/// a later `send`.
pub fn recv(
    table: &mut TaskTable,
    pid: Pid,
    channel: Capability,
    blocking: bool,
    out_pid: VirtAddr,
    out_type: VirtAddr,
    out_payload: VirtAddr,
    out_meta: VirtAddr,
) -> Result<RecvOutcome, IpcError> {
    let binding = capability::resolve(channel).ok_or(IpcError::PermissionDenied)?;
    if binding.queue_id != pid {
        return Err(IpcError::PermissionDenied);
    }
    let popped = table
        .get_mut(pid)
        .ok_or(IpcError::NoSuchTarget)?
        .message_queue
        .pop();
    match popped {
        Ok(msg) => {
            deliver_pending_send(table, pid);
            Ok(RecvOutcome::Received(msg))
        }
        Err(QueueError::Empty) => {
            if blocking {
                table.get_mut(pid).unwrap().state = TaskState::BlockedRecv {
                    queue: pid,
                    out_pid,
                    out_type,
                    out_payload,
                    out_meta,
                };
                Ok(RecvOutcome::Blocked)
            } else {
                Err(IpcError::Empty)
            }
        }
        Err(QueueError::Full) => unreachable!("pop never returns Full"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::table::{init_for_test, with_table};

    fn minimal_elf() -> alloc::vec::Vec<u8> {
        crate::task::test_support::build_minimal_elf(0x2000, &[0x13, 0x00, 0x00, 0x00])
    }

    #[test]
    fn send_then_recv_signal_roundtrips() {
        init_for_test();
        with_table(|table| {
            let a = table.spawn_from_image(&minimal_elf(), 0, 0, "a").unwrap();
            let b = table.spawn_from_image(&minimal_elf(), 0, 0, "b").unwrap();
            let cap = capability::mint(a, b).unwrap();

            let outcome = send(table, a, cap, MessageType::Signal, 42, 0, false).unwrap();
            assert_eq!(outcome, SendOutcome::Delivered);

            let b_self = table.get(b).unwrap().capability_list[0];
            match recv(table, b, b_self, false, VirtAddr::new(0), VirtAddr::new(0), VirtAddr::new(0), VirtAddr::new(0)).unwrap() {
                RecvOutcome::Received(msg) => {
                    assert_eq!(msg.source_pid, a);
                    assert_eq!(msg.payload, 42);
                }
                RecvOutcome::Blocked => panic!("expected a message"),
            }
        });
    }

    #[test]
    fn send_to_unknown_capability_is_denied() {
        init_for_test();
        with_table(|table| {
            let bogus = Capability { high: 1, low: 1 };
            let a = table.spawn_from_image(&minimal_elf(), 0, 0, "a").unwrap();
            assert_eq!(
                send(table, a, bogus, MessageType::Signal, 0, 0, false),
                Err(IpcError::PermissionDenied)
            );
        });
    }

    #[test]
    fn non_blocking_recv_on_empty_queue_is_empty_error() {
        init_for_test();
        with_table(|table| {
            let a = table.spawn_from_image(&minimal_elf(), 0, 0, "a").unwrap();
            let a_self = table.get(a).unwrap().capability_list[0];
            assert_eq!(
                recv(table, a, a_self, false, VirtAddr::new(0), VirtAddr::new(0), VirtAddr::new(0), VirtAddr::new(0)),
                Err(IpcError::Empty)
            );
        });
    }

    #[test]
    fn blocking_recv_on_empty_queue_parks_receiver() {
        init_for_test();
        with_table(|table| {
            let a = table.spawn_from_image(&minimal_elf(), 0, 0, "a").unwrap();
            let a_self = table.get(a).unwrap().capability_list[0];
            assert_eq!(
                recv(table, a, a_self, true, VirtAddr::new(0), VirtAddr::new(0), VirtAddr::new(0), VirtAddr::new(0)),
                Ok(RecvOutcome::Blocked)
            );
            assert_eq!(
                table.get(a).unwrap().state,
                TaskState::BlockedRecv {
                    queue: a,
                    out_pid: VirtAddr::new(0),
                    out_type: VirtAddr::new(0),
                    out_payload: VirtAddr::new(0),
                    out_meta: VirtAddr::new(0),
                }
            );
        });
    }

    #[test]
    fn blocked_sender_is_redelivered_once_queue_drains() {
        init_for_test();
        with_table(|table| {
            let a = table.spawn_from_image(&minimal_elf(), 0, 0, "a").unwrap();
            let b = table.spawn_from_image(&minimal_elf(), 0, 0, "b").unwrap();
            let cap = capability::mint(a, b).unwrap();

            for i in 0..crate::ipc::queue::QUEUE_CAPACITY {
                let outcome = send(table, a, cap, MessageType::Int, i as u64, 0, true).unwrap();
                assert_eq!(outcome, SendOutcome::Delivered);
            }
            let outcome = send(table, a, cap, MessageType::Int, 999, 0, true).unwrap();
            assert_eq!(outcome, SendOutcome::Blocked);
            assert!(matches!(table.get(a).unwrap().state, TaskState::BlockedSend { .. }));

            let b_self = table.get(b).unwrap().capability_list[0];
            recv(table, b, b_self, false, VirtAddr::new(0), VirtAddr::new(0), VirtAddr::new(0), VirtAddr::new(0)).unwrap();

            assert_eq!(table.get(a).unwrap().state, TaskState::Ready);
            assert_eq!(table.get(b).unwrap().message_queue.len(), crate::ipc::queue::QUEUE_CAPACITY);
        });
    }

    #[test]
    fn pointer_send_shares_backing_frame() {
        init_for_test();
        with_table(|table| {
            let a = table.spawn_from_image(&minimal_elf(), 0, 0, "a").unwrap();
            let b = table.spawn_from_image(&minimal_elf(), 0, 0, "b").unwrap();
            let cap = capability::mint(a, b).unwrap();

            let a_root = table.get(a).unwrap().owning_address_space;
            let phys = PageMapper::new(a_root).translate(VirtAddr::new(0x2000)).unwrap();
            let before = memory::refcount(phys);

            let outcome = send(table, a, cap, MessageType::Pointer, 0x2000, PAGE_SIZE as u64, false).unwrap();
            assert_eq!(outcome, SendOutcome::Delivered);
            assert_eq!(memory::refcount(phys), before + 1);

            let b_self = table.get(b).unwrap().capability_list[0];
            match recv(table, b, b_self, false, VirtAddr::new(0), VirtAddr::new(0), VirtAddr::new(0), VirtAddr::new(0)).unwrap() {
                RecvOutcome::Received(msg) => {
                    let b_root = table.get(b).unwrap().owning_address_space;
                    let dest = VirtAddr::new(msg.payload as usize).align_down(PAGE_SIZE);
                    assert_eq!(PageMapper::new(b_root).translate(dest), Some(phys));
                }
                RecvOutcome::Blocked => panic!("expected a message"),
            }
        });
    }

    #[test]
    fn data_send_copies_into_a_fresh_frame() {
        init_for_test();
        with_table(|table| {
            let a = table.spawn_from_image(&minimal_elf(), 0, 0, "a").unwrap();
            let b = table.spawn_from_image(&minimal_elf(), 0, 0, "b").unwrap();
            let cap = capability::mint(a, b).unwrap();

            let a_root = table.get(a).unwrap().owning_address_space;
            let src_phys = PageMapper::new(a_root).translate(VirtAddr::new(0x2000)).unwrap();

            send(table, a, cap, MessageType::Data, 0x2000, 64, false).unwrap();
            let b_self = table.get(b).unwrap().capability_list[0];
            match recv(table, b, b_self, false, VirtAddr::new(0), VirtAddr::new(0), VirtAddr::new(0), VirtAddr::new(0)).unwrap() {
                RecvOutcome::Received(msg) => {
                    let b_root = table.get(b).unwrap().owning_address_space;
                    let dest = VirtAddr::new(msg.payload as usize).align_down(PAGE_SIZE);
                    let dest_phys = PageMapper::new(b_root).translate(dest).unwrap();
                    assert_ne!(dest_phys, src_phys);

                    let src_byte = unsafe { *phys_to_safe(src_phys).as_ptr::<u8>() };
                    let dst_byte = unsafe { *phys_to_safe(dest_phys).as_ptr::<u8>() };
                    assert_eq!(src_byte, dst_byte);
                }
                RecvOutcome::Blocked => panic!("expected a message"),
            }
        });
    }

    #[test]
    fn pointer_send_rejects_zero_metadata() {
        init_for_test();
        with_table(|table| {
            let a = table.spawn_from_image(&minimal_elf(), 0, 0, "a").unwrap();
            let b = table.spawn_from_image(&minimal_elf(), 0, 0, "b").unwrap();
            let cap = capability::mint(a, b).unwrap();
            assert_eq!(
                send(table, a, cap, MessageType::Pointer, 0x2000, 0, false),
                Err(IpcError::InvalidArgument)
            );
        });
    }

    #[test]
    fn data_send_rejects_metadata_over_a_page() {
        init_for_test();
        with_table(|table| {
            let a = table.spawn_from_image(&minimal_elf(), 0, 0, "a").unwrap();
            let b = table.spawn_from_image(&minimal_elf(), 0, 0, "b").unwrap();
            let cap = capability::mint(a, b).unwrap();
            assert_eq!(
                send(table, a, cap, MessageType::Data, 0x2000, PAGE_SIZE as u64 + 1, false),
                Err(IpcError::InvalidArgument)
            );
        });
    }

    #[test]
    fn data_send_rejects_zero_metadata() {
        init_for_test();
        with_table(|table| {
            let a = table.spawn_from_image(&minimal_elf(), 0, 0, "a").unwrap();
            let b = table.spawn_from_image(&minimal_elf(), 0, 0, "b").unwrap();
            let cap = capability::mint(a, b).unwrap();
            assert_eq!(
                send(table, a, cap, MessageType::Data, 0x2000, 0, false),
                Err(IpcError::InvalidArgument)
            );
        });
    }

    #[test]
    fn pointer_send_with_multi_page_metadata_shares_every_page() {
        init_for_test();
        with_table(|table| {
            let a = table.spawn_from_image(&minimal_elf(), 0, 0, "a").unwrap();
            let b = table.spawn_from_image(&minimal_elf(), 0, 0, "b").unwrap();
            let cap = capability::mint(a, b).unwrap();

            let a_root = table.get(a).unwrap().owning_address_space;
            let first_page = VirtAddr::new(0x90000);
            let second_page = VirtAddr::new(0x91000);
            let mut a_mapper = PageMapper::new(a_root);
            a_mapper
                .alloc_and_map(first_page, PteFlags::READ | PteFlags::WRITE | PteFlags::USER)
                .unwrap();
            a_mapper
                .alloc_and_map(second_page, PteFlags::READ | PteFlags::WRITE | PteFlags::USER)
                .unwrap();
            let phys0 = a_mapper.translate(first_page).unwrap();
            let phys1 = a_mapper.translate(second_page).unwrap();

            let outcome = send(
                table,
                a,
                cap,
                MessageType::Pointer,
                first_page.as_u64(),
                (2 * PAGE_SIZE) as u64,
                false,
            )
            .unwrap();
            assert_eq!(outcome, SendOutcome::Delivered);

            let b_self = table.get(b).unwrap().capability_list[0];
            match recv(table, b, b_self, false, VirtAddr::new(0), VirtAddr::new(0), VirtAddr::new(0), VirtAddr::new(0)).unwrap() {
                RecvOutcome::Received(msg) => {
                    let b_root = table.get(b).unwrap().owning_address_space;
                    let dest0 = VirtAddr::new(msg.payload as usize).align_down(PAGE_SIZE);
                    let dest1 = VirtAddr::new(dest0.as_usize() + PAGE_SIZE);
                    assert_eq!(PageMapper::new(b_root).translate(dest0), Some(phys0));
                    assert_eq!(PageMapper::new(b_root).translate(dest1), Some(phys1));
                }
                RecvOutcome::Blocked => panic!("expected a message"),
            }
        });
    }

    #[test]
    fn pointer_send_with_unmapped_second_page_is_invalid_argument() {
        init_for_test();
        with_table(|table| {
            let a = table.spawn_from_image(&minimal_elf(), 0, 0, "a").unwrap();
            let b = table.spawn_from_image(&minimal_elf(), 0, 0, "b").unwrap();
            let cap = capability::mint(a, b).unwrap();

            let a_root = table.get(a).unwrap().owning_address_space;
            let isolated_page = VirtAddr::new(0x80000);
            PageMapper::new(a_root)
                .alloc_and_map(isolated_page, PteFlags::READ | PteFlags::WRITE | PteFlags::USER)
                .unwrap();

            assert_eq!(
                send(
                    table,
                    a,
                    cap,
                    MessageType::Pointer,
                    isolated_page.as_u64(),
                    (2 * PAGE_SIZE) as u64,
                    false
                ),
                Err(IpcError::InvalidArgument)
            );
        });
    }
}
