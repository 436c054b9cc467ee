use std::error::Error;
use std::fmt;
use std::time::Duration;

use serde_json::Value;
use time::OffsetDateTime;

use crate::autosave::{AutosaveController, AutosaveError, DocumentObserver, SaveOutcome, SaveStatus};
use crate::clock::Clock;
use crate::domain::form_data::{FormData, FormDataError};
use crate::manager::{CaseManager, ManagerError};
use crate::repository::StorageUsage;
use crate::store::KeyValueStore;

/// Editing context for one process: the case list, the document being
/// edited, and the autosave controller watching it.
pub struct Session<S, C> {
    manager: CaseManager<S, C>,
    autosave: AutosaveController,
    document: Option<FormData>,
}

impl<S: KeyValueStore, C: Clock> Session<S, C> {
    /// Loads whichever case the manager restored as current.
    pub fn new(manager: CaseManager<S, C>, debounce: Duration) -> Result<Self, SessionError> {
        let mut session = Self {
            manager,
            autosave: AutosaveController::new(debounce),
            document: None,
        };
        session.sync_active()?;
        Ok(session)
    }

    pub fn manager(&self) -> &CaseManager<S, C> {
        &self.manager
    }

    pub fn current_case_id(&self) -> Option<&str> {
        self.autosave.active_case_id()
    }

    pub fn document(&self) -> Option<&FormData> {
        self.document.as_ref()
    }

    pub fn status(&self) -> SaveStatus {
        self.autosave.status()
    }

    pub fn next_deadline(&self) -> Option<OffsetDateTime> {
        self.autosave.next_deadline()
    }

    pub fn now(&self) -> OffsetDateTime {
        self.manager.repo().clock().now()
    }

    pub fn storage_usage(&self) -> StorageUsage {
        self.manager.repo().storage_usage()
    }

    /// Switches editing to `id`. Pending edits of the previous case are
    /// written first; if that fails the switch does not happen.
    pub fn open(&mut self, id: &str) -> Result<(), SessionError> {
        if !self.manager.contains(id) {
            return Err(ManagerError::UnknownCase(id.to_string()).into());
        }
        self.save_now()?;
        self.manager.select_case(id)?;
        self.sync_active()
    }

    pub fn set_field(&mut self, pointer: &str, value: Value) -> Result<(), SessionError> {
        let doc = self.document.as_mut().ok_or(SessionError::NoActiveCase)?;
        doc.set_field(pointer, value)?;
        self.notify();
        Ok(())
    }

    pub fn append_record(&mut self, pointer: &str) -> Result<String, SessionError> {
        let doc = self.document.as_mut().ok_or(SessionError::NoActiveCase)?;
        let record_id = doc.append_record(pointer)?;
        self.notify();
        Ok(record_id)
    }

    pub fn remove_record(&mut self, pointer: &str, record_id: &str) -> Result<bool, SessionError> {
        let doc = self.document.as_mut().ok_or(SessionError::NoActiveCase)?;
        let removed = doc.remove_record(pointer, record_id)?;
        if removed {
            self.notify();
        }
        Ok(removed)
    }

    /// Timer tick against the session clock.
    pub fn tick(&mut self) -> Result<SaveOutcome, SessionError> {
        let now = self.now();
        let outcome = self.autosave.poll(now, self.manager.repo_mut())?;
        self.after_save(&outcome);
        Ok(outcome)
    }

    /// Forced save of the active document.
    pub fn save_now(&mut self) -> Result<SaveOutcome, SessionError> {
        let outcome = self.autosave.flush(self.manager.repo_mut())?;
        self.after_save(&outcome);
        Ok(outcome)
    }

    /// Trailing write, then stop editing. On failure the case stays open.
    pub fn close(&mut self) -> Result<SaveOutcome, SessionError> {
        let outcome = self.autosave.deactivate(self.manager.repo_mut())?;
        self.after_save(&outcome);
        self.document = None;
        Ok(outcome)
    }

    pub fn create_case(&mut self, initials: Option<&str>) -> Result<String, SessionError> {
        self.save_now()?;
        let id = self.manager.create_case(initials)?;
        self.sync_active()?;
        Ok(id)
    }

    /// Deleting the open case drops its pending edits instead of writing them.
    /// A failed delete keeps the case open with its edits.
    pub fn delete_case(&mut self, id: &str) -> Result<(), SessionError> {
        let open = self.autosave.active_case_id() == Some(id);
        if !open {
            self.save_now()?;
        }
        self.manager.delete_case(id)?;
        if open {
            self.autosave.abandon();
            self.document = None;
        }
        self.sync_active()
    }

    pub fn duplicate_case(&mut self, id: &str) -> Result<Option<String>, SessionError> {
        self.save_now()?;
        let copy = self.manager.duplicate_case(id)?;
        self.sync_active()?;
        Ok(copy)
    }

    /// Exports the stored document after writing pending edits.
    pub fn export_case(&mut self, id: &str) -> Result<Option<String>, SessionError> {
        self.save_now()?;
        Ok(self.manager.export_case(id))
    }

    pub fn import_case(&mut self, text: &str) -> Result<Option<String>, SessionError> {
        self.save_now()?;
        let imported = self.manager.import_case(text)?;
        self.sync_active()?;
        Ok(imported)
    }

    pub fn clear_all_data(&mut self) -> Result<usize, SessionError> {
        self.autosave.abandon();
        self.document = None;
        let removed = self.manager.clear_all_data()?;
        Ok(removed)
    }

    fn notify(&mut self) {
        let now = self.now();
        if let Some(doc) = self.document.as_ref() {
            self.autosave.document_changed(doc, now);
        }
    }

    /// The in-memory document keeps its loaded `lastModified`; only the
    /// stored copy and the index entry carry the new stamp.
    fn after_save(&mut self, outcome: &SaveOutcome) {
        if let SaveOutcome::Written {
            case_id,
            last_modified,
        } = outcome
        {
            tracing::debug!(
                "case {} stored with lastModified {}",
                case_id,
                last_modified.as_deref().unwrap_or("-")
            );
            self.manager.refresh();
        }
    }

    /// Points the autosave controller and the in-memory document at the
    /// manager's current case. A case without a stored document opens blank.
    fn sync_active(&mut self) -> Result<(), SessionError> {
        let target = self.manager.current_case_id().map(str::to_string);
        if target.is_some() && target.as_deref() == self.autosave.active_case_id() {
            return Ok(());
        }
        let Some(id) = target else {
            let outcome = self.autosave.deactivate(self.manager.repo_mut())?;
            self.after_save(&outcome);
            self.document = None;
            return Ok(());
        };

        let doc = self
            .manager
            .repo()
            .get_case(&id)
            .unwrap_or_else(|| FormData::blank(&id));
        let outcome = self
            .autosave
            .activate(self.manager.repo_mut(), &id, &doc)?;
        self.after_save(&outcome);
        self.document = Some(doc);
        tracing::debug!("editing case {}", id);
        Ok(())
    }
}

#[derive(Debug)]
pub enum SessionError {
    NoActiveCase,
    Field(FormDataError),
    Autosave(AutosaveError),
    Manager(ManagerError),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::NoActiveCase => write!(f, "no case is selected"),
            SessionError::Field(err) => write!(f, "{}", err),
            SessionError::Autosave(err) => write!(f, "{}", err),
            SessionError::Manager(err) => write!(f, "{}", err),
        }
    }
}

impl Error for SessionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SessionError::NoActiveCase => None,
            SessionError::Field(err) => Some(err),
            SessionError::Autosave(err) => Some(err),
            SessionError::Manager(err) => Some(err),
        }
    }
}

impl From<FormDataError> for SessionError {
    fn from(value: FormDataError) -> Self {
        SessionError::Field(value)
    }
}

impl From<AutosaveError> for SessionError {
    fn from(value: AutosaveError) -> Self {
        SessionError::Autosave(value)
    }
}

impl From<ManagerError> for SessionError {
    fn from(value: ManagerError) -> Self {
        SessionError::Manager(value)
    }
}
