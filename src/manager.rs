use std::error::Error;
use std::fmt;

use crate::clock::Clock;
use crate::domain::case_meta::CaseMeta;
use crate::domain::form_data::FormData;
use crate::repository::{CaseRepository, RepositoryError};
use crate::store::KeyValueStore;

/// Case list and active-case pointer on top of the repository. Every
/// mutation refreshes the in-memory list from storage afterwards.
pub struct CaseManager<S, C> {
    repo: CaseRepository<S, C>,
    cases: Vec<CaseMeta>,
    current: Option<String>,
}

impl<S: KeyValueStore, C: Clock> CaseManager<S, C> {
    /// Restores the previously active case, falling back to the most recently
    /// modified one when the stored pointer is stale.
    pub fn init(repo: CaseRepository<S, C>) -> Self {
        let mut manager = Self {
            repo,
            cases: Vec::new(),
            current: None,
        };
        manager.refresh();

        let stored = manager.repo.get_current_case_id();
        let current = match stored.as_deref() {
            Some(id) if manager.contains(id) => Some(id.to_string()),
            _ => manager.cases.first().map(|meta| meta.id.clone()),
        };
        if current != stored {
            tracing::debug!(
                "current case pointer {:?} replaced by {:?}",
                stored,
                current
            );
            if let Err(err) = manager.repo.set_current_case_id(current.as_deref()) {
                tracing::warn!("could not persist current case pointer: {}", err);
            }
        }
        manager.current = current;
        manager
    }

    pub fn repo(&self) -> &CaseRepository<S, C> {
        &self.repo
    }

    pub fn repo_mut(&mut self) -> &mut CaseRepository<S, C> {
        &mut self.repo
    }

    /// Newest first.
    pub fn cases(&self) -> &[CaseMeta] {
        &self.cases
    }

    pub fn current_case_id(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.cases.iter().any(|meta| meta.id == id)
    }

    pub fn refresh(&mut self) {
        self.cases = self.repo.get_index().by_recency();
    }

    /// Creates a blank case, optionally pre-filled with client initials, and
    /// selects it. The case exists once this returns `Ok`, even if the
    /// selection could not be stored.
    pub fn create_case(&mut self, initials: Option<&str>) -> Result<String, ManagerError> {
        let mut blank = FormData::blank("");
        if let Some(initials) = initials.map(str::trim).filter(|value| !value.is_empty()) {
            blank.set_client_initials(initials);
        }
        let id = self.repo.create_case(Some(&blank))?;
        self.refresh();
        if let Err(err) = self.select_case(&id) {
            tracing::warn!("created case {} but could not select it: {}", id, err);
        }
        Ok(id)
    }

    pub fn select_case(&mut self, id: &str) -> Result<(), ManagerError> {
        if !self.contains(id) {
            return Err(ManagerError::UnknownCase(id.to_string()));
        }
        self.repo.set_current_case_id(Some(id))?;
        self.current = Some(id.to_string());
        Ok(())
    }

    /// Deleting the active case moves the selection to the newest remaining
    /// case, or clears it.
    pub fn delete_case(&mut self, id: &str) -> Result<(), ManagerError> {
        self.repo.delete_case(id)?;
        self.refresh();
        if self.current.as_deref() == Some(id) {
            let next = self.cases.first().map(|meta| meta.id.clone());
            self.repo.set_current_case_id(next.as_deref())?;
            self.current = next;
        }
        Ok(())
    }

    /// Copies a case and selects the copy. `Ok(None)` when the source has no
    /// readable document.
    pub fn duplicate_case(&mut self, id: &str) -> Result<Option<String>, ManagerError> {
        let copy = self.repo.duplicate_case(id)?;
        self.refresh();
        if let Some(copy) = copy.as_deref() {
            self.select_case(copy)?;
        }
        Ok(copy)
    }

    pub fn export_case(&self, id: &str) -> Option<String> {
        self.repo.export_case(id)
    }

    /// Imports and selects a case. `Ok(None)` when `text` is not a case document.
    pub fn import_case(&mut self, text: &str) -> Result<Option<String>, ManagerError> {
        let imported = self.repo.import_case(text)?;
        self.refresh();
        if let Some(id) = imported.as_deref() {
            self.select_case(id)?;
        }
        Ok(imported)
    }

    /// Wipes the namespace and forgets the selection.
    pub fn clear_all_data(&mut self) -> Result<usize, ManagerError> {
        let removed = self.repo.clear_all_data()?;
        self.refresh();
        self.current = None;
        Ok(removed)
    }
}

#[derive(Debug)]
pub enum ManagerError {
    UnknownCase(String),
    Repository(RepositoryError),
}

impl fmt::Display for ManagerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManagerError::UnknownCase(id) => write!(f, "case '{}' not found", id),
            ManagerError::Repository(err) => write!(f, "{}", err),
        }
    }
}

impl Error for ManagerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ManagerError::UnknownCase(_) => None,
            ManagerError::Repository(err) => Some(err),
        }
    }
}

impl From<RepositoryError> for ManagerError {
    fn from(value: RepositoryError) -> Self {
        ManagerError::Repository(value)
    }
}
