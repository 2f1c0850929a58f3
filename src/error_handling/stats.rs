//! Lookup failure statistics.
//!
//! Thread-safe per-kind failure counters, shared across concurrent lookups
//! via `Arc` and printed at the end of a run.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use strum::IntoEnumIterator;

use super::types::ErrorKind;

/// Thread-safe failure counters, one per `ErrorKind`.
///
/// All kinds are initialized to zero on creation, so incrementing never
/// allocates and `get_count` never misses.
pub struct LookupStats {
    counts: HashMap<ErrorKind, AtomicUsize>,
}

impl LookupStats {
    pub fn new() -> Self {
        let mut counts = HashMap::new();
        for kind in ErrorKind::iter() {
            counts.insert(kind, AtomicUsize::new(0));
        }
        LookupStats { counts }
    }

    pub fn increment(&self, kind: ErrorKind) {
        if let Some(counter) = self.counts.get(&kind) {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn get_count(&self, kind: ErrorKind) -> usize {
        self.counts
            .get(&kind)
            .map(|c| c.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        ErrorKind::iter().map(|k| self.get_count(k)).sum()
    }
}

impl Default for LookupStats {
    fn default() -> Self {
        Self::new()
    }
}
