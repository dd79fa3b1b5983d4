//! Scheduler (C6): single ready queue, round-robin, lazy wake-up scan
//!
//! One hart, one ready queue, no priorities. A timer tick (or a
//! voluntary yield) moves the current task to the back of the queue
//! and pops the next one. Before picking, every blocked task is
//! rescanned in PID order so sleeps and lock waits resolve themselves
//! without the blocking syscall having to be revisited.
//!
//! Concurrency note: this kernel runs cooperatively within a trap and
//! preemptively across traps (spec's concurrency model) — there is
//! exactly one hart live in kernel mode at a time, so `Scheduler`'s own
//! state needs no locking beyond the `spin::Mutex` guarding the single
//! global instance. An SMP extension would need per-hart run queues
//! here (`/* requires spinlock */` at the ready-queue join points).

pub mod timer;

use crate::memory::paging::phys_to_safe;
use crate::memory::{PageMapper, VirtAddr};
use crate::task::{Pid, TaskState, TaskTable};
use alloc::collections::VecDeque;

pub struct Scheduler {
    ready: VecDeque<Pid>,
    current: Option<Pid>,
}

impl Scheduler {
    pub const fn new() -> Self {
        Self {
            ready: VecDeque::new(),
            current: None,
        }
    }

    pub fn current(&self) -> Option<Pid> {
        self.current
    }

    pub fn enqueue_ready(&mut self, pid: Pid) {
        if !self.ready.contains(&pid) {
            self.ready.push_back(pid);
        }
    }

    /// Transition the running task into `state` and drop it from
    /// `current`; the next `schedule` call picks a replacement.
    pub fn block_current(&mut self, table: &mut TaskTable, state: TaskState) -> Option<Pid> {
        let pid = self.current.take()?;
        if let Some(task) = table.get_mut(pid) {
            task.state = state;
        }
        Some(pid)
    }

    /// Re-check every blocked task; any whose wait condition now holds
    /// moves to `Ready` and onto the queue.
    pub fn wake_scan(&mut self, table: &mut TaskTable, now_micros: u64) {
        let mut to_wake = alloc::vec::Vec::new();
        for task in table.iter() {
            let wake = match task.state {
                TaskState::BlockedSleep { deadline_micros } => now_micros >= deadline_micros,
                TaskState::BlockedLock {
                    ptr,
                    word_size,
                    expected_value,
                    wake_if_equal,
                } => read_lock_word(task.owning_address_space, ptr, word_size)
                    .map(|word| (word == expected_value) == wake_if_equal)
                    .unwrap_or(false),
                _ => false,
            };
            if wake {
                to_wake.push(task.pid);
            }
        }
        for pid in to_wake {
            if let Some(task) = table.get_mut(pid) {
                task.state = TaskState::Ready;
            }
            self.enqueue_ready(pid);
        }
    }

    /// Round-robin pick: requeue the current task if it is still
    /// runnable, then pop the next ready task in FIFO order.
    pub fn schedule(&mut self, table: &mut TaskTable) -> Option<Pid> {
        self.wake_scan(table, timer::now_micros());

        if let Some(cur) = self.current.take() {
            if let Some(task) = table.get_mut(cur) {
                if task.state == TaskState::Running {
                    task.state = TaskState::Ready;
                    self.ready.push_back(cur);
                }
            }
        }

        while let Some(pid) = self.ready.pop_front() {
            if let Some(task) = table.get_mut(pid) {
                if task.state == TaskState::Ready {
                    task.state = TaskState::Running;
                    self.current = Some(pid);
                    return self.current;
                }
            }
        }
        None
    }

    /// Drop `pid` from the ready queue, e.g. on kill.
    pub fn remove(&mut self, pid: Pid) {
        self.ready.retain(|&p| p != pid);
        if self.current == Some(pid) {
            self.current = None;
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn read_lock_word(owning_address_space: crate::memory::PhysAddr, ptr: VirtAddr, word_size: u8) -> Option<u64> {
    let mapper = PageMapper::new(owning_address_space);
    let phys = mapper.translate(ptr)?;
    let safe = phys_to_safe(phys);
    unsafe {
        Some(match word_size {
            1 => *safe.as_ptr::<u8>() as u64,
            2 => *safe.as_ptr::<u16>() as u64,
            4 => *safe.as_ptr::<u32>() as u64,
            _ => *safe.as_ptr::<u64>(),
        })
    }
}

static SCHEDULER: spin::Mutex<Scheduler> = spin::Mutex::new(Scheduler::new());

pub fn with_scheduler<R>(f: impl FnOnce(&mut Scheduler) -> R) -> R {
    f(&mut SCHEDULER.lock())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::table::with_table;

    fn minimal_elf() -> alloc::vec::Vec<u8> {
        crate::task::test_support::build_minimal_elf(0x2000, &[0x13, 0x00, 0x00, 0x00])
    }

    #[test]
    fn round_robin_cycles_two_ready_tasks() {
        crate::task::table::init_for_test();
        let mut sched = Scheduler::new();
        with_table(|table| {
            let a = table.spawn_from_image(&minimal_elf(), 0, 0, "a").unwrap();
            let b = table.spawn_from_image(&minimal_elf(), 0, 0, "b").unwrap();
            sched.enqueue_ready(a);
            sched.enqueue_ready(b);

            assert_eq!(sched.schedule(table), Some(a));
            assert_eq!(sched.schedule(table), Some(b));
            assert_eq!(sched.schedule(table), Some(a));
        });
    }

    #[test]
    fn sleep_wakes_once_deadline_passes() {
        crate::task::table::init_for_test();
        let mut sched = Scheduler::new();
        with_table(|table| {
            let a = table.spawn_from_image(&minimal_elf(), 0, 0, "a").unwrap();
            sched.block_current(table, TaskState::Ready); // no-op, nothing current yet
            table.get_mut(a).unwrap().state = TaskState::BlockedSleep { deadline_micros: 10 };
            sched.wake_scan(table, 5);
            assert_eq!(table.get(a).unwrap().state, TaskState::BlockedSleep { deadline_micros: 10 });
            sched.wake_scan(table, 10);
            assert_eq!(table.get(a).unwrap().state, TaskState::Ready);
        });
    }

    #[test]
    fn remove_drops_task_from_ready_queue_and_current() {
        crate::task::table::init_for_test();
        let mut sched = Scheduler::new();
        with_table(|table| {
            let a = table.spawn_from_image(&minimal_elf(), 0, 0, "a").unwrap();
            sched.enqueue_ready(a);
            sched.schedule(table);
            assert_eq!(sched.current(), Some(a));
            sched.remove(a);
            assert_eq!(sched.current(), None);
        });
    }
}
