//! Registry of entities already handed out during a test run.
//!
//! A random fetch must not return a row that an earlier test already took,
//! otherwise two tests can mutate the same fixture. The registry is owned by
//! the run (one per [`crate::Fixtures`]) and shared by `Arc` between chains
//! and threads.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::value::SqlValue;

/// Ids consumed so far, per table, in the order they were taken.
#[derive(Debug, Default)]
pub struct UsedIds {
    inner: Mutex<HashMap<String, Vec<SqlValue>>>,
}

impl UsedIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the registry for a read-fetch-record sequence.
    ///
    /// Holding the guard across the database round trip is what keeps two
    /// concurrent chains from picking the same "unused" row.
    pub fn lock(&self) -> UsedIdsGuard<'_> {
        // A panic while holding the lock leaves the map consistent: every
        // write is a single push.
        let guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        UsedIdsGuard { guard }
    }

    /// Record `id` as used for `table`.
    pub fn record(&self, table: &str, id: SqlValue) {
        self.lock().record(table, id);
    }

    /// Ids already used for `table`.
    pub fn ids(&self, table: &str) -> Vec<SqlValue> {
        self.lock().ids(table).to_vec()
    }

    pub fn contains(&self, table: &str, id: &SqlValue) -> bool {
        self.lock().ids(table).contains(id)
    }

    /// Number of ids recorded across all tables.
    pub fn len(&self) -> usize {
        self.lock().guard.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exclusive access to a [`UsedIds`] registry.
pub struct UsedIdsGuard<'a> {
    guard: MutexGuard<'a, HashMap<String, Vec<SqlValue>>>,
}

impl UsedIdsGuard<'_> {
    pub fn ids(&self, table: &str) -> &[SqlValue] {
        self.guard.get(table).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn record(&mut self, table: &str, id: SqlValue) {
        let ids = self.guard.entry(table.to_string()).or_default();
        if !ids.contains(&id) {
            tracing::debug!("Marked {}.id = {} as used", table, id);
            ids.push(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_record_and_read() {
        let used = UsedIds::new();
        assert!(used.is_empty());
        assert!(used.ids("reviews").is_empty());

        used.record("reviews", SqlValue::Int(3));
        used.record("reviews", SqlValue::Int(1));
        used.record("photos", SqlValue::Int(3));

        assert_eq!(used.ids("reviews"), vec![SqlValue::Int(3), SqlValue::Int(1)]);
        assert!(used.contains("photos", &SqlValue::Int(3)));
        assert!(!used.contains("photos", &SqlValue::Int(1)));
        assert_eq!(used.len(), 3);
    }

    #[test]
    fn test_duplicates_are_ignored() {
        let used = UsedIds::new();
        used.record("reviews", SqlValue::Int(3));
        used.record("reviews", SqlValue::Int(3));
        assert_eq!(used.len(), 1);
    }

    #[test]
    fn test_concurrent_recording() {
        let used = Arc::new(UsedIds::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let used = Arc::clone(&used);
                thread::spawn(move || {
                    for i in 0..50 {
                        used.record("rows", SqlValue::Int(t * 1000 + i));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(used.len(), 400);
    }
}
