//! In-memory storage area with a change feed.
//!
//! Used by the CLI (loaded from and saved to a JSON export of the extension's
//! storage) and by tests, which can also inject read/write failures.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

use serde_json::{Map, Value};

use super::{StorageArea, StorageChange};
use crate::error::StoreError;

#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RefCell<BTreeMap<String, Value>>,
    changes: RefCell<Vec<StorageChange>>,
    fail_reads: Cell<bool>,
    fail_writes: Cell<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a JSON object of `key → value`. Non-objects load as empty.
    pub fn from_snapshot(snapshot: Value) -> Self {
        let store = Self::new();
        if let Value::Object(map) = snapshot {
            store.values.borrow_mut().extend(map);
        }
        store
    }

    /// All keys as one JSON object.
    pub fn snapshot(&self) -> Value {
        let map: Map<String, Value> = self
            .values
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Value::Object(map)
    }

    pub fn get_value(&self, key: &str) -> Option<Value> {
        self.values.borrow().get(key).cloned()
    }

    /// Write directly, recording a change like an async `set` would.
    pub fn put_value(&self, key: &str, value: Value) {
        let old = self.values.borrow_mut().insert(key.to_string(), value.clone());
        if old.as_ref() != Some(&value) {
            self.changes.borrow_mut().push(StorageChange {
                key: key.to_string(),
                old_value: old,
                new_value: Some(value),
            });
        }
    }

    /// Drain changes recorded since the last call.
    pub fn take_changes(&self) -> Vec<StorageChange> {
        std::mem::take(&mut *self.changes.borrow_mut())
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.set(fail);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.set(fail);
    }
}

impl StorageArea for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        if self.fail_reads.get() {
            return Err(StoreError::Read {
                key: key.to_string(),
                reason: "injected read failure".to_string(),
            });
        }
        Ok(self.get_value(key))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        if self.fail_writes.get() {
            return Err(StoreError::Write {
                key: key.to_string(),
                reason: "injected write failure".to_string(),
            });
        }
        self.put_value(key, value);
        Ok(())
    }
}
