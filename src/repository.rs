use std::error::Error;
use std::fmt;

use serde::Serialize;

use crate::case_id::generate_case_id;
use crate::clock::{format_rfc3339, Clock};
use crate::domain::case_meta::{
    display_name, CaseMeta, CasesIndex, COPY_SUFFIX, IMPORTED_CASE_NAME, NEW_CASE_NAME,
};
use crate::domain::form_data::FormData;
use crate::keys::{Namespace, StorageKey};
use crate::store::{utf16_bytes, KeyValueStore, StoreError};

/// Sole owner of the durable layout: one index record, one document per case,
/// and the current-case pointer, all under a single namespace.
pub struct CaseRepository<S, C> {
    store: S,
    namespace: Namespace,
    clock: C,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StorageUsage {
    pub used: u64,
    pub percent_used: f64,
    pub quota: u64,
    pub keys: usize,
    pub case_documents: usize,
}

impl<S: KeyValueStore, C: Clock> CaseRepository<S, C> {
    pub fn new(store: S, namespace: Namespace, clock: C) -> Self {
        Self {
            store,
            namespace,
            clock,
        }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn now_rfc3339(&self) -> String {
        format_rfc3339(self.clock.now())
    }

    pub fn get_index(&self) -> CasesIndex {
        let Some(raw) = self.read(&StorageKey::CasesIndex) else {
            return CasesIndex::default();
        };
        match serde_json::from_str::<CasesIndex>(&raw) {
            Ok(index) => index,
            Err(err) => {
                tracing::warn!("cases index is unparsable, treating as empty: {}", err);
                CasesIndex::default()
            }
        }
    }

    pub fn save_index(&mut self, index: &CasesIndex) -> Result<(), RepositoryError> {
        let encoded = serde_json::to_string(index)?;
        self.write(&StorageKey::CasesIndex, &encoded)
    }

    pub fn get_case(&self, id: &str) -> Option<FormData> {
        let raw = self.read(&StorageKey::Case(id.to_string()))?;
        match FormData::parse(&raw) {
            Ok(data) => Some(data),
            Err(err) => {
                tracing::warn!("case {} has an unreadable document: {}", id, err);
                None
            }
        }
    }

    /// Stamps `lastModified`, writes the document, then refreshes the matching
    /// index entry. A missing entry is left missing.
    pub fn save_case(&mut self, id: &str, data: &FormData) -> Result<FormData, RepositoryError> {
        let now = self.now_rfc3339();
        let mut stamped = data.clone();
        stamped.stamp_last_modified(&now);
        self.write_document(id, &stamped)?;

        let mut index = self.get_index();
        let Some(meta) = index.find_mut(id) else {
            tracing::debug!("case {} saved without an index entry", id);
            return Ok(stamped);
        };
        meta.last_modified = now;
        meta.client_initials = stamped.client_initials().to_string();
        meta.name = display_name(stamped.client_initials(), &meta.name);
        if let Err(err) = self.save_index(&index) {
            tracing::warn!(
                "case {} document saved but its index entry is stale: {}",
                id,
                err
            );
            return Err(err);
        }
        Ok(stamped)
    }

    /// The index entry is written first; a failed initial document write takes
    /// it back out again.
    pub fn create_case(&mut self, initial: Option<&FormData>) -> Result<String, RepositoryError> {
        let mut index = self.get_index();
        let id = self.mint_id(&index);
        let now = self.now_rfc3339();
        index.insert_front(CaseMeta::new(id.clone(), NEW_CASE_NAME, &now));
        self.save_index(&index)?;

        if let Some(initial) = initial {
            let mut data = initial.clone();
            data.set_id(&id);
            if let Err(err) = self.save_case(&id, &data) {
                self.discard_index_entry(&id);
                return Err(err);
            }
        }
        tracing::info!("created case {}", id);
        Ok(id)
    }

    /// A failed index write puts the removed document back.
    pub fn delete_case(&mut self, id: &str) -> Result<(), RepositoryError> {
        let key = StorageKey::Case(id.to_string());
        let raw_key = self.namespace.key(&key);
        let previous = self.store.get(&raw_key).ok().flatten();
        self.remove(&key)?;
        let mut index = self.get_index();
        if index.remove(id) {
            if let Err(err) = self.save_index(&index) {
                if let Some(previous) = previous {
                    if let Err(restore) = self.store.set(&raw_key, &previous) {
                        tracing::warn!("could not restore document of case {}: {}", id, restore);
                    }
                }
                return Err(err);
            }
        }
        tracing::info!("deleted case {}", id);
        Ok(())
    }

    pub fn duplicate_case(&mut self, source_id: &str) -> Result<Option<String>, RepositoryError> {
        let Some(source) = self.get_case(source_id) else {
            return Ok(None);
        };
        let mut index = self.get_index();
        let source_name = index
            .find(source_id)
            .map(|meta| meta.name.clone())
            .unwrap_or_else(|| display_name(source.client_initials(), NEW_CASE_NAME));

        let id = self.mint_id(&index);
        let now = self.now_rfc3339();
        let initials = format!("{}{}", source.client_initials(), COPY_SUFFIX)
            .trim()
            .to_string();
        let mut copy = source;
        copy.set_id(&id);
        copy.set_client_initials(&initials);
        copy.stamp_last_modified(&now);

        let mut meta = CaseMeta::new(id.clone(), format!("{source_name}{COPY_SUFFIX}"), &now);
        meta.client_initials = initials;
        index.insert_front(meta);
        self.commit_new_case(&id, &copy, &index)?;
        tracing::info!("duplicated case {} as {}", source_id, id);
        Ok(Some(id))
    }

    pub fn export_case(&self, id: &str) -> Option<String> {
        let data = self.get_case(id)?;
        match data.to_pretty() {
            Ok(text) => Some(text),
            Err(err) => {
                tracing::warn!("case {} could not be exported: {}", id, err);
                None
            }
        }
    }

    /// `Ok(None)` when `text` is not a JSON object; storage failures still propagate.
    pub fn import_case(&mut self, text: &str) -> Result<Option<String>, RepositoryError> {
        let mut data = match FormData::parse(text) {
            Ok(data) => data,
            Err(err) => {
                tracing::warn!("import rejected: {}", err);
                return Ok(None);
            }
        };
        let original_id = data.id().map(str::to_string);
        let mut index = self.get_index();
        let id = self.mint_id(&index);
        let now = self.now_rfc3339();
        data.set_id(&id);
        data.stamp_last_modified(&now);

        let mut meta = CaseMeta::new(
            id.clone(),
            display_name(data.client_initials(), IMPORTED_CASE_NAME),
            &now,
        );
        meta.client_initials = data.client_initials().to_string();
        index.insert_front(meta);
        self.commit_new_case(&id, &data, &index)?;
        tracing::info!(
            "imported case {} (exported as {})",
            id,
            original_id.as_deref().unwrap_or("unknown")
        );
        Ok(Some(id))
    }

    pub fn storage_usage(&self) -> StorageUsage {
        let quota = self.store.quota_bytes();
        let keys = match self.store.keys() {
            Ok(keys) => keys,
            Err(err) => {
                tracing::warn!("could not enumerate storage keys: {}", err);
                Vec::new()
            }
        };

        let mut used = 0u64;
        let mut owned = 0usize;
        let mut case_documents = 0usize;
        for key in keys.iter().filter(|key| self.namespace.owns(key)) {
            owned += 1;
            if matches!(self.namespace.parse(key), Some(StorageKey::Case(_))) {
                case_documents += 1;
            }
            let value = self.store.get(key).ok().flatten().unwrap_or_default();
            used += utf16_bytes(key) + utf16_bytes(&value);
        }

        let percent_used = if quota == 0 {
            100.0
        } else {
            used as f64 / quota as f64 * 100.0
        };
        StorageUsage {
            used,
            percent_used,
            quota,
            keys: owned,
            case_documents,
        }
    }

    /// Removes every key in the namespace, index and current-case pointer included.
    pub fn clear_all_data(&mut self) -> Result<usize, RepositoryError> {
        let keys: Vec<String> = self
            .store
            .keys()?
            .into_iter()
            .filter(|key| self.namespace.owns(key))
            .collect();
        for key in &keys {
            self.store.remove(key)?;
        }
        tracing::info!("cleared {} stored key(s)", keys.len());
        Ok(keys.len())
    }

    pub fn get_current_case_id(&self) -> Option<String> {
        self.read(&StorageKey::CurrentCase)
            .map(|raw| raw.trim().to_string())
            .filter(|id| !id.is_empty())
    }

    pub fn set_current_case_id(&mut self, id: Option<&str>) -> Result<(), RepositoryError> {
        match id {
            Some(id) => self.write(&StorageKey::CurrentCase, id),
            None => self.remove(&StorageKey::CurrentCase),
        }
    }

    fn mint_id(&self, index: &CasesIndex) -> String {
        generate_case_id(|candidate| {
            index.contains(candidate)
                || self
                    .read(&StorageKey::Case(candidate.to_string()))
                    .is_some()
        })
    }

    /// Document first, then index; the document is removed again if the index
    /// write fails so no half-created case is left behind.
    fn commit_new_case(
        &mut self,
        id: &str,
        data: &FormData,
        index: &CasesIndex,
    ) -> Result<(), RepositoryError> {
        self.write_document(id, data)?;
        if let Err(err) = self.save_index(index) {
            if let Err(cleanup) = self.remove(&StorageKey::Case(id.to_string())) {
                tracing::warn!("orphaned case document {} left behind: {}", id, cleanup);
            }
            return Err(err);
        }
        Ok(())
    }

    fn discard_index_entry(&mut self, id: &str) {
        let mut index = self.get_index();
        if index.remove(id) {
            if let Err(err) = self.save_index(&index) {
                tracing::warn!("index still lists unsaved case {}: {}", id, err);
            }
        }
    }

    fn write_document(&mut self, id: &str, data: &FormData) -> Result<(), RepositoryError> {
        let encoded = serde_json::to_string(data)?;
        self.write(&StorageKey::Case(id.to_string()), &encoded)
    }

    fn read(&self, key: &StorageKey) -> Option<String> {
        let raw_key = self.namespace.key(key);
        match self.store.get(&raw_key) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!("read of {} failed: {}", raw_key, err);
                None
            }
        }
    }

    fn write(&mut self, key: &StorageKey, value: &str) -> Result<(), RepositoryError> {
        let raw_key = self.namespace.key(key);
        self.store.set(&raw_key, value).map_err(|err| {
            tracing::warn!("write of {} failed: {}", raw_key, err);
            RepositoryError::StorageWrite(err)
        })
    }

    fn remove(&mut self, key: &StorageKey) -> Result<(), RepositoryError> {
        let raw_key = self.namespace.key(key);
        Ok(self.store.remove(&raw_key)?)
    }
}

#[derive(Debug)]
pub enum RepositoryError {
    StorageWrite(StoreError),
    Encode(serde_json::Error),
}

impl fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepositoryError::StorageWrite(err) => write!(f, "storage write failed: {}", err),
            RepositoryError::Encode(err) => write!(f, "could not encode record: {}", err),
        }
    }
}

impl Error for RepositoryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            RepositoryError::StorageWrite(err) => Some(err),
            RepositoryError::Encode(err) => Some(err),
        }
    }
}

impl From<StoreError> for RepositoryError {
    fn from(value: StoreError) -> Self {
        RepositoryError::StorageWrite(value)
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(value: serde_json::Error) -> Self {
        RepositoryError::Encode(value)
    }
}
