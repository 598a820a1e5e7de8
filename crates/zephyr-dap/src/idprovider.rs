//! Node id allocation
//!
//! DAP handles (`frameId`, `variablesReference`) are opaque integers. Ids
//! are allocated from a single monotonic counter and never reused within a
//! session; zero is reserved for "no children".

use std::sync::atomic::{AtomicU32, Ordering};

/// Lock-free monotonic id source shared by all node trees of a session.
#[derive(Debug)]
pub struct IdProvider {
    next: AtomicU32,
}

impl IdProvider {
    pub fn new() -> Self {
        Self {
            next: AtomicU32::new(1),
        }
    }

    pub fn next(&self) -> u32 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for IdProvider {
    fn default() -> Self {
        Self::new()
    }
}
