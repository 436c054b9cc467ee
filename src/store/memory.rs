use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use super::{KeyValueStore, StoreError, DEFAULT_QUOTA_BYTES};

#[derive(Debug, Default)]
struct MemoryInner {
    entries: BTreeMap<String, String>,
    written_keys: Vec<String>,
    fail_writes: bool,
    fail_prefix: Option<String>,
}

/// In-memory store whose clones share state, so a test can keep a handle after
/// moving the store into a repository.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Rc<RefCell<MemoryInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `set` calls so far.
    pub fn write_count(&self) -> usize {
        self.inner.borrow().written_keys.len()
    }

    /// Number of successful `set` calls on keys starting with `prefix`.
    pub fn write_count_with_prefix(&self, prefix: &str) -> usize {
        self.inner
            .borrow()
            .written_keys
            .iter()
            .filter(|key| key.starts_with(prefix))
            .count()
    }

    pub fn raw(&self, key: &str) -> Option<String> {
        self.inner.borrow().entries.get(key).cloned()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.inner.borrow_mut().fail_writes = fail;
    }

    /// Rejects writes to keys starting with `prefix` until reset with `None`.
    pub fn fail_writes_with_prefix(&self, prefix: Option<&str>) {
        self.inner.borrow_mut().fail_prefix = prefix.map(str::to_string);
    }

    /// Writes bypassing failure injection and the write counter.
    pub fn insert_raw(&self, key: &str, value: &str) {
        self.inner
            .borrow_mut()
            .entries
            .insert(key.to_string(), value.to_string());
    }

    fn check(&self, key: &str) -> Result<(), StoreError> {
        let inner = self.inner.borrow();
        let prefix_hit = inner
            .fail_prefix
            .as_deref()
            .is_some_and(|prefix| key.starts_with(prefix));
        if inner.fail_writes || prefix_hit {
            return Err(StoreError::QuotaExceeded {
                needed: u64::MAX,
                quota: 0,
            });
        }
        Ok(())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.inner.borrow().entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.check(key)?;
        let mut inner = self.inner.borrow_mut();
        inner.entries.insert(key.to_string(), value.to_string());
        inner.written_keys.push(key.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        self.check(key)?;
        self.inner.borrow_mut().entries.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.inner.borrow().entries.keys().cloned().collect())
    }

    fn quota_bytes(&self) -> u64 {
        DEFAULT_QUOTA_BYTES
    }
}
