use slackrelay_core::types::DeliveryKey;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Set of deliveries currently being processed.
///
/// A key is present exactly while a [`DeliveryGuard`] for it is alive, so the
/// entry goes away on every exit path of its owner: return, panic or task
/// abort.
#[derive(Debug, Clone, Default)]
pub struct DeliveryDeduplicator {
    in_flight: Arc<Mutex<HashSet<DeliveryKey>>>,
}

impl DeliveryDeduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check-and-insert under one lock. `None` means the delivery is already
    /// in flight.
    pub fn try_acquire(&self, key: DeliveryKey) -> Option<DeliveryGuard> {
        if !self.lock().insert(key.clone()) {
            debug!(key = %key, "Delivery already in flight");
            return None;
        }
        Some(DeliveryGuard {
            owner: self.clone(),
            key,
        })
    }

    /// Returns whether the key was present. Normally called by
    /// [`DeliveryGuard`]'s drop.
    pub fn release(&self, key: &DeliveryKey) -> bool {
        self.lock().remove(key)
    }

    pub fn contains(&self, key: &DeliveryKey) -> bool {
        self.lock().contains(key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    // A panic while holding the lock cannot leave the set half-updated.
    fn lock(&self) -> MutexGuard<'_, HashSet<DeliveryKey>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Scoped ownership of one in-flight delivery.
#[derive(Debug)]
pub struct DeliveryGuard {
    owner: DeliveryDeduplicator,
    key: DeliveryKey,
}

impl DeliveryGuard {
    pub fn key(&self) -> &DeliveryKey {
        &self.key
    }
}

impl Drop for DeliveryGuard {
    fn drop(&mut self) {
        self.owner.release(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(ts: &str) -> DeliveryKey {
        DeliveryKey::new("C1", ts)
    }

    #[test]
    fn second_acquire_of_same_key_fails_while_held() {
        let dedup = DeliveryDeduplicator::new();
        let first = dedup.try_acquire(key("1.0"));
        assert!(first.is_some());
        assert!(dedup.try_acquire(key("1.0")).is_none());
        assert!(dedup.try_acquire(key("2.0")).is_some());
    }

    #[test]
    fn dropping_guard_releases_key() {
        let dedup = DeliveryDeduplicator::new();
        {
            let guard = dedup.try_acquire(key("1.0")).unwrap();
            assert!(dedup.contains(guard.key()));
        }
        assert!(dedup.is_empty());
        assert!(dedup.try_acquire(key("1.0")).is_some());
    }

    #[test]
    fn key_is_released_when_owner_panics() {
        let dedup = DeliveryDeduplicator::new();
        let cloned = dedup.clone();
        let result = std::thread::spawn(move || {
            let _guard = cloned.try_acquire(key("1.0")).unwrap();
            panic!("processing blew up");
        })
        .join();
        assert!(result.is_err());
        assert!(!dedup.contains(&key("1.0")));
    }

    #[test]
    fn concurrent_acquires_admit_exactly_one() {
        let dedup = DeliveryDeduplicator::new();
        let barrier = Arc::new(std::sync::Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let dedup = dedup.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    // Hold the guard until every thread has tried.
                    let guard = dedup.try_acquire(key("1.0"));
                    let won = guard.is_some();
                    std::mem::forget(guard);
                    won
                })
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
        assert_eq!(dedup.len(), 1);
    }
}
