//! Capability / channel tokens (C11)
//!
//! A capability is a 128-bit unforgeable token. It grants no rights by
//! itself beyond "this token was minted for this queue" — the kernel
//! looks it up in [`CAPABILITY_TABLE`] on every `send`/`recv` and
//! refuses anything that doesn't match the `{owning_pid, queue_id}`
//! pair recorded at mint time. There is no derivation, badging, or
//! rights-narrowing machinery: spec's channel model needs none of the
//! CNode/CDT apparatus the teacher's seL4-style `Capability` carried.

use core::sync::atomic::{AtomicU64, Ordering};

pub type Pid = u32;
pub type QueueId = u32;

/// An unforgeable 128-bit token: a random-looking high word plus a
/// monotonic low word, so two tokens minted back to back never compare
/// equal even if the "random" half collides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(C)]
pub struct Capability {
    pub high: u64,
    pub low: u64,
}

static NEXT_LOW: AtomicU64 = AtomicU64::new(1);

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    pub owning_pid: Pid,
    pub queue_id: QueueId,
}

const MAX_CAPABILITIES: usize = 4096;

pub struct CapabilityTable {
    tokens: [Option<Capability>; MAX_CAPABILITIES],
    bindings: [Option<Binding>; MAX_CAPABILITIES],
}

impl CapabilityTable {
    pub const fn new() -> Self {
        Self {
            tokens: [None; MAX_CAPABILITIES],
            bindings: [None; MAX_CAPABILITIES],
        }
    }

    /// Mint a fresh token bound to `(owning_pid, queue_id)`.
    pub fn mint(&mut self, owning_pid: Pid, queue_id: QueueId) -> Option<Capability> {
        let slot = self.tokens.iter().position(Option::is_none)?;
        let low = NEXT_LOW.fetch_add(1, Ordering::Relaxed);
        let high = splitmix64(low ^ ((owning_pid as u64) << 32) ^ queue_id as u64);
        let cap = Capability { high, low };
        self.tokens[slot] = Some(cap);
        self.bindings[slot] = Some(Binding { owning_pid, queue_id });
        Some(cap)
    }

    pub fn resolve(&self, cap: Capability) -> Option<Binding> {
        self.tokens
            .iter()
            .position(|t| *t == Some(cap))
            .and_then(|i| self.bindings[i])
    }

    /// Revoke every capability bound to `owning_pid`, e.g. on task kill.
    pub fn revoke_owner(&mut self, owning_pid: Pid) {
        for i in 0..MAX_CAPABILITIES {
            if let Some(b) = self.bindings[i] {
                if b.owning_pid == owning_pid {
                    self.tokens[i] = None;
                    self.bindings[i] = None;
                }
            }
        }
    }
}

static CAPABILITY_TABLE: spin::Mutex<CapabilityTable> = spin::Mutex::new(CapabilityTable::new());

pub fn mint(owning_pid: Pid, queue_id: QueueId) -> Option<Capability> {
    CAPABILITY_TABLE.lock().mint(owning_pid, queue_id)
}

pub fn resolve(cap: Capability) -> Option<Binding> {
    CAPABILITY_TABLE.lock().resolve(cap)
}

pub fn revoke_owner(owning_pid: Pid) {
    CAPABILITY_TABLE.lock().revoke_owner(owning_pid)
}
