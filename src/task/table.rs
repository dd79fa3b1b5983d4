//! Process/thread table (C5)
//!
//! An array indexed directly by pid, mirroring the teacher's TCB
//! lifecycle (`activate`/`block_on_*`/`unblock`) but replacing its
//! seL4-flavoured `ThreadState` with the state set the scheduler (C6)
//! and IPC engine (C8) actually drive a task through.

use crate::arch::riscv64::{PteFlags, TrapFrame};
use crate::ipc::capability::{self, Capability};
use crate::ipc::message::Message;
use crate::ipc::queue::MessageQueue;
use crate::memory::address::PAGE_SIZE;
use crate::memory::{PhysAddr, VirtAddr};
use alloc::boxed::Box;
use alloc::vec::Vec;

use super::address_space::{AddressSpace, Segment};

pub type Pid = u32;
pub type QueueId = u32;

pub const MAX_TASKS: usize = 256;
pub const TASK_NAME_LEN: usize = 16;
pub const USER_STACK_PAGES: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Ready,
    Running,
    BlockedSleep { deadline_micros: u64 },
    BlockedLock {
        ptr: VirtAddr,
        word_size: u8,
        expected_value: u64,
        wake_if_equal: bool,
    },
    BlockedSend {
        target_queue: QueueId,
        pending_message: Message,
    },
    BlockedRecv {
        queue: QueueId,
        out_pid: VirtAddr,
        out_type: VirtAddr,
        out_payload: VirtAddr,
        out_meta: VirtAddr,
    },
    Dead,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskError {
    OutOfMemory,
    NoSuchTarget,
    InvalidArgument,
    Fatal,
}

pub struct Task {
    pub pid: Pid,
    pub owning_address_space: PhysAddr,
    pub state: TaskState,
    pub saved_registers: TrapFrame,
    pub interrupt_stack: VirtAddr,
    pub user_id: u32,
    pub parent_pid: Pid,
    pub message_queue: MessageQueue,
    pub capability_list: Vec<Capability>,
    pub name: [u8; TASK_NAME_LEN],
    /// Next free user virtual page in this task's address space, for
    /// IPC's page-share/page-copy destination placement. Threads that
    /// share an address space each keep their own cursor, which is a
    /// deliberate simplification: concurrent sharing into one process
    /// from two of its own threads is not a case the message model
    /// needs to support.
    pub next_virt: VirtAddr,
    /// `Some(parent)` if this task was created by `spawn_thread` and so
    /// shares `parent`'s address space rather than owning a fresh one.
    pub thread_source: Option<Pid>,
    /// Base and page count of this task's own stack, so `kill` can free
    /// just the stack when the address space is still owned by a
    /// sibling thread or the parent process.
    pub stack_base: VirtAddr,
    pub stack_pages: usize,
}

impl Task {
    pub fn name_str(&self) -> &str {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(TASK_NAME_LEN);
        core::str::from_utf8(&self.name[..len]).unwrap_or("<invalid>")
    }
}

fn copy_name(src: &str) -> [u8; TASK_NAME_LEN] {
    let mut name = [0u8; TASK_NAME_LEN];
    let bytes = src.as_bytes();
    let len = bytes.len().min(TASK_NAME_LEN);
    name[..len].copy_from_slice(&bytes[..len]);
    name
}

pub struct TaskTable {
    // Boxed rather than inline: MAX_TASKS * size_of::<Task>() is too
    // large to build up as a single stack value during construction.
    tasks: Box<[Option<Task>; MAX_TASKS]>,
    kernel_root: PhysAddr,
}

impl TaskTable {
    pub fn new(kernel_root: PhysAddr) -> Self {
        let mut slots = Vec::with_capacity(MAX_TASKS);
        for _ in 0..MAX_TASKS {
            slots.push(None);
        }
        let tasks: Box<[Option<Task>; MAX_TASKS]> = slots
            .into_boxed_slice()
            .try_into()
            .unwrap_or_else(|_| unreachable!("exactly MAX_TASKS slots were pushed"));
        Self { tasks, kernel_root }
    }

    fn free_pid(&self) -> Option<Pid> {
        (0..MAX_TASKS as Pid).find(|&pid| self.tasks[pid as usize].is_none())
    }

    pub fn get(&self, pid: Pid) -> Option<&Task> {
        self.tasks.get(pid as usize)?.as_ref()
    }

    pub fn get_mut(&mut self, pid: Pid) -> Option<&mut Task> {
        self.tasks.get_mut(pid as usize)?.as_mut()
    }

    /// Load an ELF image into a brand new address space and create its
    /// first (and, at spawn time, only) thread.
    pub fn spawn_from_image(
        &mut self,
        image: &[u8],
        parent_pid: Pid,
        user_id: u32,
        name: &str,
    ) -> Result<Pid, TaskError> {
        let pid = self.free_pid().ok_or(TaskError::OutOfMemory)?;

        let elf = xmas_elf::ElfFile::new(image).map_err(|_| TaskError::InvalidArgument)?;
        let entry_point = elf.header.pt2.entry_point();

        let mut space = AddressSpace::new(self.kernel_root).map_err(|_| TaskError::OutOfMemory)?;

        for ph in elf.program_iter() {
            if ph.get_type() != Ok(xmas_elf::program::Type::Load) {
                continue;
            }
            let data = match ph.get_data(&elf) {
                Ok(xmas_elf::program::SegmentData::Undefined(bytes)) => bytes,
                _ => &[],
            };
            let mut flags = PteFlags::empty();
            if ph.flags().is_read() {
                flags |= PteFlags::READ;
            }
            if ph.flags().is_write() {
                flags |= PteFlags::WRITE;
            }
            if ph.flags().is_execute() {
                flags |= PteFlags::EXECUTE;
            }
            let seg = Segment {
                virt_start: VirtAddr::new(ph.virtual_addr() as usize),
                data,
                mem_size: ph.mem_size() as usize,
                flags,
            };
            space
                .load_image(core::slice::from_ref(&seg))
                .map_err(|_| TaskError::OutOfMemory)?;
        }

        let stack_base = space
            .reserve_virt(USER_STACK_PAGES)
            .map_err(|_| TaskError::OutOfMemory)?;
        {
            let mut mapper = space.mapper();
            for i in 0..USER_STACK_PAGES {
                let virt = VirtAddr::new(stack_base.as_usize() + i * PAGE_SIZE);
                mapper
                    .alloc_and_map(virt, PteFlags::READ | PteFlags::WRITE | PteFlags::USER)
                    .map_err(|_| TaskError::OutOfMemory)?;
            }
        }
        let stack_top = stack_base.as_usize() + USER_STACK_PAGES * PAGE_SIZE;

        let task = Task {
            pid,
            owning_address_space: space.root(),
            state: TaskState::Ready,
            saved_registers: TrapFrame::entry(entry_point, stack_top as u64),
            interrupt_stack: VirtAddr::new(0),
            user_id,
            parent_pid,
            message_queue: MessageQueue::new(),
            capability_list: Vec::new(),
            name: copy_name(name),
            next_virt: space.cursor(),
            thread_source: None,
            stack_base,
            stack_pages: USER_STACK_PAGES,
        };
        self.tasks[pid as usize] = Some(task);
        if let Some(self_cap) = capability::mint(pid, pid) {
            self.tasks[pid as usize].as_mut().unwrap().capability_list.push(self_cap);
        }
        Ok(pid)
    }

    /// Spawn a new thread inside `parent`'s address space, sharing its
    /// page tables but getting its own register set and stack. The
    /// caller has already mapped `[stack_base, stack_base + stack_pages
    /// * PAGE_SIZE)` into that shared address space.
    pub fn spawn_thread(
        &mut self,
        parent: Pid,
        entry: VirtAddr,
        stack_base: VirtAddr,
        stack_pages: usize,
    ) -> Result<Pid, TaskError> {
        let (owning_address_space, user_id, parent_pid, next_virt) = {
            let p = self.get(parent).ok_or(TaskError::NoSuchTarget)?;
            (p.owning_address_space, p.user_id, p.pid, p.next_virt)
        };
        let pid = self.free_pid().ok_or(TaskError::OutOfMemory)?;
        let user_stack_top = VirtAddr::new(stack_base.as_usize() + stack_pages * PAGE_SIZE);
        let task = Task {
            pid,
            owning_address_space,
            state: TaskState::Ready,
            saved_registers: TrapFrame::entry(entry.as_u64(), user_stack_top.as_u64()),
            interrupt_stack: VirtAddr::new(0),
            user_id,
            parent_pid,
            message_queue: MessageQueue::new(),
            capability_list: Vec::new(),
            name: copy_name("thread"),
            next_virt,
            thread_source: Some(parent),
            stack_base,
            stack_pages,
        };
        self.tasks[pid as usize] = Some(task);
        if let Some(self_cap) = capability::mint(pid, pid) {
            self.tasks[pid as usize].as_mut().unwrap().capability_list.push(self_cap);
        }
        Ok(pid)
    }

    /// Tear a task down: revoke its capabilities, and either free just
    /// its own stack (a sibling thread or the parent is still alive and
    /// sharing the address space) or the whole address space, page
    /// tables included, if this was the last one using it.
    pub fn kill(&mut self, pid: Pid) -> Result<(), TaskError> {
        let (owning_address_space, stack_base, stack_pages) = {
            let task = self.get(pid).ok_or(TaskError::NoSuchTarget)?;
            (task.owning_address_space, task.stack_base, task.stack_pages)
        };
        self.tasks[pid as usize] = None;
        capability::revoke_owner(pid);

        let still_shared = self
            .tasks
            .iter()
            .flatten()
            .any(|t| t.owning_address_space == owning_address_space);
        if still_shared {
            let mut mapper = crate::memory::PageMapper::new(owning_address_space);
            for i in 0..stack_pages {
                let v = VirtAddr::new(stack_base.as_usize() + i * PAGE_SIZE);
                if let Some(phys) = mapper.unmap(v) {
                    crate::memory::decr_frames(phys, 1);
                }
            }
        } else {
            crate::task::address_space::AddressSpace::adopt(owning_address_space).destroy();
        }
        Ok(())
    }

    /// Bump-allocate `n_pages` unmapped user pages in `pid`'s address
    /// space, for the IPC engine to land a shared or copied page at.
    pub fn reserve_virt(&mut self, pid: Pid, n_pages: usize) -> Result<VirtAddr, TaskError> {
        let task = self.get_mut(pid).ok_or(TaskError::NoSuchTarget)?;
        let base = task.next_virt;
        let end = base.as_usize() + n_pages * PAGE_SIZE;
        if end > crate::memory::USER_MAX {
            return Err(TaskError::OutOfMemory);
        }
        task.next_virt = VirtAddr::new(end);
        Ok(base)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter().flatten()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Task> {
        self.tasks.iter_mut().flatten()
    }
}

static TASK_TABLE: spin::Once<spin::Mutex<TaskTable>> = spin::Once::new();

pub fn init(kernel_root: PhysAddr) {
    TASK_TABLE.call_once(|| spin::Mutex::new(TaskTable::new(kernel_root)));
}

pub fn with_table<R>(f: impl FnOnce(&mut TaskTable) -> R) -> R {
    let mutex = TASK_TABLE.get().expect("task table not initialized");
    f(&mut mutex.lock())
}

#[cfg(test)]
pub fn init_for_test() {
    crate::memory::init_for_test(16 * 1024 * 1024);
    let kroot = unsafe { crate::memory::alloc_frames(1).unwrap() };
    unsafe {
        (*crate::memory::paging::phys_to_safe(kroot)
            .as_mut_ptr::<crate::arch::riscv64::PageTable>())
        .zero();
    }
    init(kroot);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_elf() -> Vec<u8> {
        // A single PT_LOAD segment covering one page, entry at its base.
        crate::task::test_support::build_minimal_elf(0x2000, &[0x13, 0x00, 0x00, 0x00])
    }

    #[test]
    fn spawn_from_image_creates_ready_task() {
        init_for_test();
        with_table(|table| {
            let pid = table
                .spawn_from_image(&minimal_elf(), 0, 0, "init")
                .unwrap();
            let task = table.get(pid).unwrap();
            assert_eq!(task.state, TaskState::Ready);
            assert_eq!(task.name_str(), "init");
        });
    }

    #[test]
    fn spawn_thread_shares_address_space() {
        init_for_test();
        with_table(|table| {
            let parent = table
                .spawn_from_image(&minimal_elf(), 0, 0, "parent")
                .unwrap();
            let parent_space = table.get(parent).unwrap().owning_address_space;
            let tid = table
                .spawn_thread(parent, VirtAddr::new(0x2000), VirtAddr::new(0x3000), 1)
                .unwrap();
            assert_eq!(table.get(tid).unwrap().owning_address_space, parent_space);
        });
    }

    #[test]
    fn kill_removes_task_and_revokes_capabilities() {
        init_for_test();
        with_table(|table| {
            let pid = table.spawn_from_image(&minimal_elf(), 0, 0, "a").unwrap();
            let cap = capability::mint(pid, 1).unwrap();
            table.kill(pid).unwrap();
            assert!(table.get(pid).is_none());
            assert_eq!(capability::resolve(cap), None);
        });
    }

    #[test]
    fn kill_of_a_thread_frees_only_its_own_stack() {
        init_for_test();
        with_table(|table| {
            let parent = table.spawn_from_image(&minimal_elf(), 0, 0, "parent").unwrap();
            let parent_space = table.get(parent).unwrap().owning_address_space;

            let stack_base = VirtAddr::new(0x10000);
            crate::memory::PageMapper::new(parent_space)
                .alloc_and_map(stack_base, PteFlags::READ | PteFlags::WRITE | PteFlags::USER)
                .unwrap();
            let tid = table.spawn_thread(parent, VirtAddr::new(0x2000), stack_base, 1).unwrap();

            table.kill(tid).unwrap();

            assert!(table.get(tid).is_none());
            assert!(table.get(parent).is_some());
            assert_eq!(
                crate::memory::PageMapper::new(parent_space).translate(stack_base),
                None
            );
        });
    }

    #[test]
    fn kill_unknown_pid_is_no_such_target() {
        init_for_test();
        with_table(|table| {
            assert_eq!(table.kill(250), Err(TaskError::NoSuchTarget));
        });
    }
}
