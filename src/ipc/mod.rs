//! Inter-Process Communication
//!
//! Every task owns one bounded message queue (C7, `queue`) and a set
//! of capabilities (C11, `capability`) naming other tasks' queues.
//! `engine` (C8) is the only thing that pushes and pops those queues:
//! it resolves a capability to a target, resolves a `Pointer`/`Data`
//! payload against the sender's and receiver's page tables, and parks
//! a blocking caller in the task table's `BlockedSend`/`BlockedRecv`
//! states rather than spinning.

pub mod capability;
pub mod engine;
pub mod message;
pub mod queue;

pub use capability::Capability;
pub use engine::{recv, send, IpcError, RecvOutcome, SendOutcome};
pub use message::{Message, MessageType};
pub use queue::{MessageQueue, QueueError};
