//! Duplicate-suppression for concurrent refreshes.
//!
//! Two refreshes of the same dataset cannot overlap: the second caller gets
//! turned away instead of re-fetching data the first one is already writing.

use std::collections::HashSet;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

pub struct SingleFlight<K: Eq + Hash + Clone> {
    in_flight: Arc<Mutex<HashSet<K>>>,
}

impl<K: Eq + Hash + Clone> SingleFlight<K> {
    pub fn new() -> Self {
        Self {
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Claim the key, or None when another flight holds it. The claim is
    /// released when the returned guard drops.
    pub fn try_acquire(&self, key: K) -> Option<FlightGuard<K>> {
        let mut in_flight = self.in_flight.lock().unwrap();
        if !in_flight.insert(key.clone()) {
            return None;
        }
        Some(FlightGuard {
            key,
            in_flight: self.in_flight.clone(),
        })
    }
}

impl<K: Eq + Hash + Clone> Default for SingleFlight<K> {
    fn default() -> Self {
        Self::new()
    }
}

pub struct FlightGuard<K: Eq + Hash + Clone> {
    key: K,
    in_flight: Arc<Mutex<HashSet<K>>>,
}

impl<K: Eq + Hash + Clone> Drop for FlightGuard<K> {
    fn drop(&mut self) {
        self.in_flight.lock().unwrap().remove(&self.key);
    }
}
