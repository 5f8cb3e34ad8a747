use blocketch_types::Fingerprint;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Per-fingerprint single flight.
///
/// Submissions with identical content serialize on one async lock, so
/// within a process only the first of them requests a proof; the rest find
/// the stored record once the lock is released. Entries are dropped as soon
/// as no task holds or waits for them.
#[derive(Default)]
pub struct FingerprintLocks {
    locks: Mutex<HashMap<Fingerprint, Weak<AsyncMutex<()>>>>,
}

impl FingerprintLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, fingerprint: Fingerprint) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.retain(|_, weak| weak.strong_count() > 0);

            match locks.get(&fingerprint).and_then(Weak::upgrade) {
                Some(existing) => existing,
                None => {
                    let created = Arc::new(AsyncMutex::new(()));
                    locks.insert(fingerprint, Arc::downgrade(&created));
                    created
                }
            }
        };
        lock.lock_owned().await
    }

    /// Fingerprints currently locked or awaited
    pub fn active(&self) -> usize {
        let locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.values().filter(|weak| weak.strong_count() > 0).count()
    }
}
