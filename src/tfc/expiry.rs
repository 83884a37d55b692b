//! The TFC expiry queue (component design §3, "expiryQueue").
//!
//! An ordered multiset keyed by absolute virtual time, plus a reverse index
//! so a waiter that wakes via signal/post instead of timeout can cancel its
//! own entry in O(log n) instead of a linear scan.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::core::ThreadId;
use super::signal::UnmanagedSignal;

#[derive(Clone)]
pub struct ExpiryEntry {
    pub id: ThreadId,
    pub signal: Arc<UnmanagedSignal>,
}

#[derive(Default)]
pub struct ExpiryQueue {
    by_deadline: BTreeMap<u64, Vec<ExpiryEntry>>,
    deadline_of: std::collections::HashMap<ThreadId, u64>,
}

impl ExpiryQueue {
    pub fn is_empty(&self) -> bool {
        self.by_deadline.is_empty()
    }

    pub fn earliest_deadline(&self) -> Option<u64> {
        self.by_deadline.keys().next().copied()
    }

    /// True if some other waiter already has exactly this deadline
    /// registered (used for the `PotentialUnreproducibleBehaviour` trap).
    pub fn has_deadline(&self, deadline_ns: u64) -> bool {
        self.by_deadline.get(&deadline_ns).map(|v| !v.is_empty()).unwrap_or(false)
    }

    pub fn insert(&mut self, deadline_ns: u64, id: ThreadId, signal: Arc<UnmanagedSignal>) {
        self.by_deadline.entry(deadline_ns).or_default().push(ExpiryEntry { id, signal });
        self.deadline_of.insert(id, deadline_ns);
    }

    /// Removes `id`'s entry regardless of its deadline. No-op if absent
    /// (idempotent: a TFC-driven wake may have already popped it).
    pub fn remove(&mut self, id: ThreadId) {
        if let Some(deadline) = self.deadline_of.remove(&id) {
            if let Some(bucket) = self.by_deadline.get_mut(&deadline) {
                bucket.retain(|e| e.id != id);
                if bucket.is_empty() {
                    self.by_deadline.remove(&deadline);
                }
            }
        }
    }

    /// Pops every entry whose deadline equals the earliest deadline in the
    /// queue. Returns `None` if the queue is empty.
    pub fn pop_earliest_bucket(&mut self) -> Option<(u64, Vec<ExpiryEntry>)> {
        let deadline = self.earliest_deadline()?;
        let bucket = self.by_deadline.remove(&deadline).unwrap_or_default();
        for entry in &bucket {
            self.deadline_of.remove(&entry.id);
        }
        Some((deadline, bucket))
    }
}
