use std::collections::HashSet;
use std::sync::Mutex;

use feedscout_common::types::Fingerprint;

/// Per-run duplicate suppression by content fingerprint.
///
/// Shared across all workers of one run. The check-then-record pair is
/// atomic per fingerprint: two workers racing on the same fingerprint
/// cannot both see it as new.
#[derive(Debug, Default)]
pub struct Deduplicator {
    seen: Mutex<HashSet<Fingerprint>>,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seen(&self, fingerprint: &Fingerprint) -> bool {
        self.lock().contains(fingerprint)
    }

    pub fn record(&self, fingerprint: Fingerprint) {
        self.lock().insert(fingerprint);
    }

    /// Atomic check-and-record. Returns true if the fingerprint was new.
    pub fn insert_if_new(&self, fingerprint: Fingerprint) -> bool {
        self.lock().insert(fingerprint)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<Fingerprint>> {
        self.seen.lock().unwrap_or_else(|e| e.into_inner())
    }
}
