use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// String-keyed mutex map with lazily created entries.
///
/// Entries are removed opportunistically once no holder remains; the map
/// itself is only touched inside short critical sections.
#[derive(Default)]
pub struct KeyedMutex {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl KeyedMutex {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: &str) -> KeyedMutexGuard<'_> {
        let mutex = self
            .locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = mutex.lock_owned().await;
        KeyedMutexGuard {
            owner: self,
            key: key.to_string(),
            _guard: guard,
        }
    }

    fn release(&self, key: &str) {
        // Drop the entry when nobody else holds or awaits it. The map entry
        // plus our local reference account for exactly two strong counts.
        self.locks
            .remove_if(key, |_, mutex| Arc::strong_count(mutex) <= 2);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.len()
    }
}

pub struct KeyedMutexGuard<'a> {
    owner: &'a KeyedMutex,
    key: String,
    _guard: OwnedMutexGuard<()>,
}

impl Drop for KeyedMutexGuard<'_> {
    fn drop(&mut self) {
        self.owner.release(&self.key);
    }
}
