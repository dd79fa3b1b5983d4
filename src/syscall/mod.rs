//! System call interface (C9)
//!
//! A trap vector lands here with nothing but a pid: `handle_trap` reads
//! the syscall number and `a1..a6` out of that task's own `TrapFrame`,
//! dispatches, and either writes a return value back immediately or
//! leaves the frame untouched because the call parked the task (`send`
//! blocked on a full queue, `recv` blocked on an empty one) — completion
//! for those happens later, inside the IPC engine, at the moment the
//! message actually moves.
//!
//! Capabilities are exposed to userspace as small integer handles
//! (indices into the calling task's own capability list) rather than
//! the raw 128-bit token `ipc::capability` mints internally, so a
//! `channel` argument fits in one syscall register.

pub mod numbers;

use crate::arch::riscv64::context::{REGISTER_A1, REGISTER_A2};
use crate::arch::riscv64::PteFlags;
use crate::ipc::capability;
use crate::ipc::engine::{self, IpcError, RecvOutcome, SendOutcome};
use crate::ipc::message::MessageType;
use crate::memory::address::PAGE_SIZE;
use crate::memory::user::{read_bytes, write_bytes, write_u64};
use crate::memory::{self, PageMapper, PhysAddr, VirtAddr};
use crate::scheduler::with_scheduler;
use crate::task::table::{Pid, TaskState, TaskTable, USER_STACK_PAGES};

/// Decode the trapped task's syscall number and arguments, dispatch,
/// and write the result back — unless the call parked the task, in
/// which case the frame is left exactly where the `ecall` trapped so
/// the IPC engine can finish it later.
pub fn handle_trap(pid: Pid) {
    crate::task::table::with_table(|table| {
        let (num, args) = {
            let task = table.get(pid).expect("trap from unknown task");
            (task.saved_registers.syscall_number(), task.saved_registers.syscall_args())
        };
        if let Some(result) = dispatch(table, pid, num, args) {
            if let Some(task) = table.get_mut(pid) {
                task.saved_registers.set_return_value(result);
                task.saved_registers.advance_pc();
            }
        }
    });
}

/// `None` means the call parked the caller; its trapframe will be
/// completed later by `ipc::engine`, not here.
fn dispatch(table: &mut TaskTable, pid: Pid, num: u64, args: [u64; 6]) -> Option<u64> {
    use numbers::*;
    Some(match num {
        SYS_UART_WRITE => sys_uart_write(table, pid, args[0], args[1]),
        SYS_ALLOC_PAGE => sys_alloc_page(table, pid, args[0], args[1], args[2]),
        SYS_PAGE_PERMS => sys_page_perms(table, pid, args[0], args[1], args[2]),
        SYS_DEALLOC_PAGE => sys_dealloc_page(table, pid, args[0], args[1]),
        SYS_GETPID => pid as u64,
        SYS_GETUID => sys_getuid(table, args[0]),
        SYS_SETUID => sys_setuid(table, pid, args[0], args[1]),
        SYS_SLEEP => sys_sleep(table, pid, args[0], args[1]),
        SYS_SPAWN => sys_spawn(table, pid, args[0], args[1], args[2], args[3], args[4]),
        SYS_KILL => sys_kill(table, pid, args[0]),
        SYS_SEND => return sys_send(table, pid, args),
        SYS_RECV => return sys_recv(table, pid, args),
        SYS_LOCK => sys_lock(table, pid, args[0], args[1], args[2]),
        SYS_SPAWN_THREAD => sys_spawn_thread(table, pid, args[0], args[1], args[2], args[3]),
        SYS_SUBSCRIBE_INTERRUPT => sys_subscribe_interrupt(table, pid, args[0], args[1]),
        SYS_ALLOC_PAGES_PHYSICAL => sys_alloc_pages_physical(table, pid, args[0], args[1], args[2]),
        _ => u64::MAX,
    })
}

/// bit 0 = execute, bit 1 = write, bit 2 = read; `write && execute` is
/// never a valid combination.
fn perm_flags(perms: u64) -> Result<PteFlags, ()> {
    let mut flags = PteFlags::empty();
    if perms & numbers::PERM_READ != 0 {
        flags |= PteFlags::READ;
    }
    if perms & numbers::PERM_WRITE != 0 {
        flags |= PteFlags::WRITE;
    }
    if perms & numbers::PERM_EXECUTE != 0 {
        flags |= PteFlags::EXECUTE;
    }
    if flags.contains(PteFlags::WRITE) && flags.contains(PteFlags::EXECUTE) {
        return Err(());
    }
    Ok(flags)
}

fn caller_root(table: &TaskTable, pid: Pid) -> Option<PhysAddr> {
    table.get(pid).map(|t| t.owning_address_space)
}

fn resolve_channel(table: &TaskTable, pid: Pid, channel: u64) -> Option<capability::Capability> {
    table.get(pid)?.capability_list.get(channel as usize).copied()
}

/// Mint a capability bound to `(owner, target)`, push it onto `owner`'s
/// own capability list, and write its index out at `cap_out` — the
/// handle userspace will later pass back in as a `channel` argument.
fn grant_capability(table: &mut TaskTable, owner: Pid, target: Pid, cap_out: u64) {
    let Some(cap) = capability::mint(owner, target) else { return };
    let Some(root) = caller_root(table, owner) else { return };
    if let Some(task) = table.get_mut(owner) {
        task.capability_list.push(cap);
        let idx = (task.capability_list.len() - 1) as u64;
        let _ = write_u64(root, cap_out, idx);
    }
}

fn message_kind(tag: u64) -> Option<MessageType> {
    Some(match tag {
        0 => MessageType::Signal,
        1 => MessageType::Int,
        2 => MessageType::Pointer,
        3 => MessageType::Data,
        4 => MessageType::Interrupt,
        _ => return None,
    })
}

// --- C9.0 uart_write ---------------------------------------------------

fn sys_uart_write(table: &TaskTable, pid: Pid, ptr: u64, len: u64) -> u64 {
    let Some(root) = caller_root(table, pid) else { return 0 };
    if let Ok(bytes) = read_bytes(root, ptr, len) {
        let fw = crate::config::firmware();
        for b in bytes {
            fw.putchar(b);
        }
    }
    0
}

// --- C9.1-3 page mapping -------------------------------------------------

fn sys_alloc_page(table: &mut TaskTable, pid: Pid, virt_hint: u64, count: u64, perms: u64) -> u64 {
    if count == 0 {
        return 0;
    }
    let Ok(flags) = perm_flags(perms) else { return 0 };
    let n = count as usize;

    let base = if virt_hint != 0 {
        let v = VirtAddr::new(virt_hint as usize);
        if !v.is_aligned(PAGE_SIZE) {
            return 0;
        }
        v
    } else {
        match table.reserve_virt(pid, n) {
            Ok(v) => v,
            Err(_) => return 0,
        }
    };
    let Some(root) = caller_root(table, pid) else { return 0 };
    let mut mapper = PageMapper::new(root);

    for i in 0..n {
        let virt = VirtAddr::new(base.as_usize() + i * PAGE_SIZE);
        if mapper.alloc_and_map(virt, flags | PteFlags::USER).is_err() {
            for j in 0..i {
                let v = VirtAddr::new(base.as_usize() + j * PAGE_SIZE);
                if let Some(phys) = mapper.unmap(v) {
                    memory::decr_frames(phys, 1);
                }
            }
            return 0;
        }
    }
    base.as_u64()
}

fn sys_page_perms(table: &mut TaskTable, pid: Pid, virt: u64, count: u64, perms: u64) -> u64 {
    if count == 0 {
        return 2;
    }
    let Ok(flags) = perm_flags(perms) else { return 2 };
    let Some(root) = caller_root(table, pid) else { return 1 };
    let mut mapper = PageMapper::new(root);

    for i in 0..count {
        let v = VirtAddr::new(virt as usize + i as usize * PAGE_SIZE);
        if mapper.translate(v).is_none() {
            return 1;
        }
    }
    for i in 0..count {
        let v = VirtAddr::new(virt as usize + i as usize * PAGE_SIZE);
        mapper.change_flags(v, flags | PteFlags::USER);
    }
    0
}

fn sys_dealloc_page(table: &mut TaskTable, pid: Pid, virt: u64, count: u64) -> u64 {
    if count == 0 {
        return 1;
    }
    let Some(root) = caller_root(table, pid) else { return 1 };
    let mut mapper = PageMapper::new(root);

    for i in 0..count {
        let v = VirtAddr::new(virt as usize + i as usize * PAGE_SIZE);
        if mapper.translate(v).is_none() {
            return 1;
        }
    }
    for i in 0..count {
        let v = VirtAddr::new(virt as usize + i as usize * PAGE_SIZE);
        if let Some(phys) = mapper.unmap(v) {
            memory::decr_frames(phys, 1);
        }
    }
    0
}

// --- C9.4-6 identity ------------------------------------------------------

fn sys_getuid(table: &TaskTable, target: u64) -> u64 {
    match table.get(target as Pid) {
        Some(t) => t.user_id as u64,
        None => u64::MAX,
    }
}

fn sys_setuid(table: &mut TaskTable, caller: Pid, target: u64, uid: u64) -> u64 {
    let caller_uid = match table.get(caller) {
        Some(t) => t.user_id,
        None => return 1,
    };
    let target_pid = target as Pid;
    if caller_uid != 0 && target_pid != caller {
        return 2;
    }
    match table.get_mut(target_pid) {
        Some(t) => {
            t.user_id = uid as u32;
            0
        }
        None => 1,
    }
}

// --- C9.7 sleep ------------------------------------------------------------

fn sys_sleep(table: &mut TaskTable, _pid: Pid, secs: u64, micros: u64) -> u64 {
    let now = crate::scheduler::timer::now_micros();
    let deadline = crate::scheduler::timer::deadline_after(secs, micros);
    with_scheduler(|s| s.block_current(table, TaskState::BlockedSleep { deadline_micros: deadline }));
    now
}

// --- C9.8, C9.13 spawn -------------------------------------------------------

/// Copy `data` into a freshly reserved range of `pid`'s address space
/// and return where it landed, for passing `argv`-style blobs to a
/// newly spawned task or thread.
fn copy_bytes_into(table: &mut TaskTable, pid: Pid, data: &[u8]) -> Result<VirtAddr, ()> {
    if data.is_empty() {
        return Err(());
    }
    let pages = data.len().div_ceil(PAGE_SIZE);
    let base = table.reserve_virt(pid, pages).map_err(|_| ())?;
    let root = caller_root(table, pid).ok_or(())?;
    let mut mapper = PageMapper::new(root);
    for i in 0..pages {
        let v = VirtAddr::new(base.as_usize() + i * PAGE_SIZE);
        mapper
            .alloc_and_map(v, PteFlags::READ | PteFlags::WRITE | PteFlags::USER)
            .map_err(|_| ())?;
    }
    write_bytes(root, base.as_u64(), data).map_err(|_| ())?;
    Ok(base)
}

/// Copy `args` into `target`'s space (if any) and point its initial
/// `a1`/`a2` registers at it, mimicking a tiny `(argv, argc)` calling
/// convention for the entry point.
fn hand_off_args(table: &mut TaskTable, target: Pid, args: &[u8]) {
    if args.is_empty() {
        return;
    }
    if let Ok(dest) = copy_bytes_into(table, target, args) {
        if let Some(task) = table.get_mut(target) {
            task.saved_registers.xs[REGISTER_A1] = dest.as_u64();
            task.saved_registers.xs[REGISTER_A2] = args.len() as u64;
        }
    }
}

fn sys_spawn(
    table: &mut TaskTable,
    pid: Pid,
    exe_ptr: u64,
    exe_len: u64,
    args_ptr: u64,
    args_len: u64,
    cap_out: u64,
) -> u64 {
    let Some(root) = caller_root(table, pid) else { return u64::MAX };
    let Ok(image) = read_bytes(root, exe_ptr, exe_len) else { return u64::MAX };
    let args = read_bytes(root, args_ptr, args_len).unwrap_or_default();

    let uid = table.get(pid).map(|t| t.user_id).unwrap_or(0);
    let new_pid = match table.spawn_from_image(&image, pid, uid, "user") {
        Ok(p) => p,
        Err(_) => return u64::MAX,
    };

    hand_off_args(table, new_pid, &args);
    grant_capability(table, pid, new_pid, cap_out);
    with_scheduler(|s| s.enqueue_ready(new_pid));
    new_pid as u64
}

fn sys_spawn_thread(table: &mut TaskTable, pid: Pid, entry: u64, args_ptr: u64, args_len: u64, cap_out: u64) -> u64 {
    let Some(root) = caller_root(table, pid) else { return u64::MAX };
    let args = read_bytes(root, args_ptr, args_len).unwrap_or_default();

    let Ok(stack_base) = table.reserve_virt(pid, USER_STACK_PAGES) else { return u64::MAX };
    let mut mapper = PageMapper::new(root);
    for i in 0..USER_STACK_PAGES {
        let v = VirtAddr::new(stack_base.as_usize() + i * PAGE_SIZE);
        if mapper.alloc_and_map(v, PteFlags::READ | PteFlags::WRITE | PteFlags::USER).is_err() {
            return u64::MAX;
        }
    }
    let new_pid = match table.spawn_thread(pid, VirtAddr::new(entry as usize), stack_base, USER_STACK_PAGES) {
        Ok(p) => p,
        Err(_) => return u64::MAX,
    };

    hand_off_args(table, new_pid, &args);
    grant_capability(table, pid, new_pid, cap_out);
    with_scheduler(|s| s.enqueue_ready(new_pid));
    new_pid as u64
}

// --- C9.9 kill ---------------------------------------------------------------

fn sys_kill(table: &mut TaskTable, caller: Pid, target: u64) -> u64 {
    let target_pid = target as Pid;
    let (caller_uid, target_uid) = match (table.get(caller), table.get(target_pid)) {
        (Some(c), Some(t)) => (c.user_id, t.user_id),
        _ => return 1,
    };
    if caller_uid != 0 && caller_uid != target_uid {
        return 2;
    }
    match table.kill(target_pid) {
        Ok(()) => {
            with_scheduler(|s| s.remove(target_pid));
            0
        }
        Err(_) => 1,
    }
}

// --- C9.10-11 send/recv --------------------------------------------------------

fn sys_send(table: &mut TaskTable, pid: Pid, args: [u64; 6]) -> Option<u64> {
    let blocking = args[0] != 0;
    let channel = args[1];
    let Some(kind) = message_kind(args[2]) else { return Some(3) };
    let payload = args[3];
    let metadata = args[4];

    let Some(cap) = resolve_channel(table, pid, channel) else { return Some(1) };
    match engine::send(table, pid, cap, kind, payload, metadata, blocking) {
        Ok(SendOutcome::Delivered) => Some(0),
        Ok(SendOutcome::Blocked) => None,
        Err(IpcError::Full) => Some(2),
        Err(IpcError::PermissionDenied) => Some(1),
        Err(_) => Some(3),
    }
}

fn sys_recv(table: &mut TaskTable, pid: Pid, args: [u64; 6]) -> Option<u64> {
    let blocking = args[0] != 0;
    let channel = args[1];
    let out_pid = VirtAddr::new(args[2] as usize);
    let out_type = VirtAddr::new(args[3] as usize);
    let out_payload = VirtAddr::new(args[4] as usize);
    let out_meta = VirtAddr::new(args[5] as usize);

    let Some(cap) = resolve_channel(table, pid, channel) else { return Some(1) };
    match engine::recv(table, pid, cap, blocking, out_pid, out_type, out_payload, out_meta) {
        Ok(RecvOutcome::Received(msg)) => {
            let _ = engine::write_message(table, pid, msg, out_pid, out_type, out_payload, out_meta);
            Some(0)
        }
        Ok(RecvOutcome::Blocked) => None,
        Err(_) => Some(1),
    }
}

// --- C9.12 lock --------------------------------------------------------------

fn decode_lock_word_size(ty: u64) -> u8 {
    match ty & 0x7 {
        0 => 1,
        1 => 2,
        2 => 4,
        _ => 8,
    }
}

fn sys_lock(table: &mut TaskTable, pid: Pid, ptr: u64, ty: u64, value: u64) -> u64 {
    let word_size = decode_lock_word_size(ty);
    let wake_if_equal = ty & 0x8 != 0;
    let vaddr = VirtAddr::new(ptr as usize);

    let Some(root) = caller_root(table, pid) else { return 0 };
    let satisfied = crate::scheduler::read_lock_word(root, vaddr, word_size)
        .map(|word| (word == value) == wake_if_equal)
        .unwrap_or(false);

    if !satisfied {
        let state = TaskState::BlockedLock {
            ptr: vaddr,
            word_size,
            expected_value: value,
            wake_if_equal,
        };
        with_scheduler(|s| s.block_current(table, state));
    }
    0
}

// --- C9.14 subscribe_interrupt -----------------------------------------------

/// No interrupt controller backend exists in this kernel yet; a
/// subscription is a capability bound to the task's own queue, exactly
/// like its self-receive capability, so `recv` is already the right
/// way to wait on it once one does.
fn sys_subscribe_interrupt(table: &mut TaskTable, pid: Pid, _irq_id: u64, cap_out: u64) -> u64 {
    grant_capability(table, pid, pid, cap_out);
    0
}

// --- C9.15 alloc_pages_physical ------------------------------------------------

fn sys_alloc_pages_physical(table: &mut TaskTable, pid: Pid, count: u64, perms: u64, out_phys: u64) -> u64 {
    if count == 0 {
        return 0;
    }
    let Ok(flags) = perm_flags(perms) else { return 0 };
    let n = count as usize;

    let Ok(base) = table.reserve_virt(pid, n) else { return 0 };
    let Some(root) = caller_root(table, pid) else { return 0 };
    let phys_base = match unsafe { memory::alloc_frames(n) } {
        Ok(p) => p,
        Err(_) => return 0,
    };

    let mut mapper = PageMapper::new(root);
    for i in 0..n {
        let v = VirtAddr::new(base.as_usize() + i * PAGE_SIZE);
        let p = phys_base + i * PAGE_SIZE;
        if mapper.map(v, p, flags | PteFlags::USER).is_err() {
            for j in 0..i {
                mapper.unmap(VirtAddr::new(base.as_usize() + j * PAGE_SIZE));
            }
            memory::decr_frames(phys_base, n);
            return 0;
        }
    }
    let _ = write_u64(root, out_phys, phys_base.as_u64());
    base.as_u64()
}
