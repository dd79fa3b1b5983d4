//! Task/process model: address spaces (C4) and the task table (C5).

pub mod address_space;
pub mod table;

#[cfg(test)]
pub mod test_support;

pub use address_space::{AddressSpace, AddressSpaceError, Segment};
pub use table::{Pid, QueueId, Task, TaskError, TaskState, TaskTable};
