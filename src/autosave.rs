use std::error::Error;
use std::fmt;
use std::time::Duration;

use time::OffsetDateTime;

use crate::clock::Clock;
use crate::domain::form_data::{FormData, FormDataError};
use crate::repository::{CaseRepository, RepositoryError};
use crate::store::KeyValueStore;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    DirtyPending { deadline: OffsetDateTime },
    Saving,
}

/// What an editing surface shows next to the form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveStatus {
    Saved,
    Unsaved,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Written {
        case_id: String,
        last_modified: Option<String>,
    },
    /// A write was due but the content matched the last save.
    Unchanged,
    NotDue,
}

/// Receives every change to the in-memory document.
pub trait DocumentObserver {
    fn document_changed(&mut self, doc: &FormData, at: OffsetDateTime);
}

#[derive(Debug)]
struct ActiveCase {
    case_id: String,
    baseline: String,
    latest: Option<(FormData, String)>,
    phase: Phase,
    last_error: Option<String>,
}

impl ActiveCase {
    fn has_unsaved_content(&self) -> bool {
        self.latest
            .as_ref()
            .is_some_and(|(_, serialized)| *serialized != self.baseline)
    }
}

/// Debounces writes of one active case document. Deadlines are computed from
/// the instants handed in, so the host decides when time passes.
#[derive(Debug)]
pub struct AutosaveController {
    debounce: Duration,
    active: Option<ActiveCase>,
}

impl AutosaveController {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            active: None,
        }
    }

    pub fn active_case_id(&self) -> Option<&str> {
        self.active.as_ref().map(|active| active.case_id.as_str())
    }

    pub fn phase(&self) -> Phase {
        self.active
            .as_ref()
            .map_or(Phase::Idle, |active| active.phase)
    }

    pub fn next_deadline(&self) -> Option<OffsetDateTime> {
        match self.phase() {
            Phase::DirtyPending { deadline } => Some(deadline),
            Phase::Idle | Phase::Saving => None,
        }
    }

    pub fn status(&self) -> SaveStatus {
        let Some(active) = self.active.as_ref() else {
            return SaveStatus::Saved;
        };
        if let Some(message) = active.last_error.as_ref() {
            return SaveStatus::Failed(message.clone());
        }
        if active.has_unsaved_content() {
            SaveStatus::Unsaved
        } else {
            SaveStatus::Saved
        }
    }

    /// Makes `case_id` the watched case with `doc` as its save baseline. Any
    /// pending change of the previously watched case is written to that case
    /// first; if that write fails the switch does not happen.
    pub fn activate<S: KeyValueStore, C: Clock>(
        &mut self,
        repo: &mut CaseRepository<S, C>,
        case_id: &str,
        doc: &FormData,
    ) -> Result<SaveOutcome, AutosaveError> {
        let outcome = self.deactivate(repo)?;
        self.active = Some(ActiveCase {
            case_id: case_id.to_string(),
            baseline: doc.canonical()?,
            latest: None,
            phase: Phase::Idle,
            last_error: None,
        });
        tracing::debug!("autosave watching case {}", case_id);
        Ok(outcome)
    }

    /// Writes any pending change, then stops watching. On failure the case
    /// stays active so nothing pending is forgotten.
    pub fn deactivate<S: KeyValueStore, C: Clock>(
        &mut self,
        repo: &mut CaseRepository<S, C>,
    ) -> Result<SaveOutcome, AutosaveError> {
        let outcome = self.flush(repo)?;
        self.active = None;
        Ok(outcome)
    }

    /// Stops watching without writing anything; for a case that is being deleted.
    pub fn abandon(&mut self) -> Option<String> {
        let active = self.active.take()?;
        if active.has_unsaved_content() {
            tracing::debug!("discarding pending changes of case {}", active.case_id);
        }
        Some(active.case_id)
    }

    /// Timer tick: writes once the quiescence window has elapsed.
    pub fn poll<S: KeyValueStore, C: Clock>(
        &mut self,
        now: OffsetDateTime,
        repo: &mut CaseRepository<S, C>,
    ) -> Result<SaveOutcome, AutosaveError> {
        match self.next_deadline() {
            Some(deadline) if now >= deadline => self.save_latest(repo),
            _ => Ok(SaveOutcome::NotDue),
        }
    }

    /// Forced save: skips the remaining delay and cancels the pending timer.
    pub fn flush<S: KeyValueStore, C: Clock>(
        &mut self,
        repo: &mut CaseRepository<S, C>,
    ) -> Result<SaveOutcome, AutosaveError> {
        if self.active.is_none() {
            return Ok(SaveOutcome::Unchanged);
        }
        self.save_latest(repo)
    }

    fn save_latest<S: KeyValueStore, C: Clock>(
        &mut self,
        repo: &mut CaseRepository<S, C>,
    ) -> Result<SaveOutcome, AutosaveError> {
        let Some(active) = self.active.as_mut() else {
            return Ok(SaveOutcome::Unchanged);
        };
        active.phase = Phase::Idle;
        if !active.has_unsaved_content() {
            tracing::debug!("autosave for case {} skipped; content unchanged", active.case_id);
            return Ok(SaveOutcome::Unchanged);
        }
        let Some((doc, serialized)) = active.latest.clone() else {
            return Ok(SaveOutcome::Unchanged);
        };

        active.phase = Phase::Saving;
        let result = repo.save_case(&active.case_id, &doc);
        active.phase = Phase::Idle;
        match result {
            Ok(stamped) => {
                active.baseline = serialized;
                active.last_error = None;
                tracing::info!("autosaved case {}", active.case_id);
                Ok(SaveOutcome::Written {
                    case_id: active.case_id.clone(),
                    last_modified: stamped.last_modified().map(str::to_string),
                })
            }
            Err(err) => {
                tracing::warn!("autosave of case {} failed: {}", active.case_id, err);
                active.last_error = Some(err.to_string());
                Err(AutosaveError::Save {
                    case_id: active.case_id.clone(),
                    source: err,
                })
            }
        }
    }
}

impl DocumentObserver for AutosaveController {
    fn document_changed(&mut self, doc: &FormData, at: OffsetDateTime) {
        let debounce = self.debounce;
        let Some(active) = self.active.as_mut() else {
            return;
        };
        let serialized = match doc.canonical() {
            Ok(serialized) => serialized,
            Err(err) => {
                tracing::warn!("could not serialize case {}: {}", active.case_id, err);
                return;
            }
        };
        let differs = serialized != active.baseline;
        active.latest = Some((doc.clone(), serialized));
        match active.phase {
            Phase::Idle if !differs => {}
            Phase::Idle | Phase::DirtyPending { .. } => {
                active.phase = Phase::DirtyPending {
                    deadline: at + debounce,
                };
            }
            Phase::Saving => {}
        }
    }
}

#[derive(Debug)]
pub enum AutosaveError {
    Save {
        case_id: String,
        source: RepositoryError,
    },
    Encode(FormDataError),
}

impl fmt::Display for AutosaveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AutosaveError::Save { case_id, source } => {
                write!(f, "could not save case '{}': {}", case_id, source)
            }
            AutosaveError::Encode(err) => write!(f, "could not encode case document: {}", err),
        }
    }
}

impl Error for AutosaveError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AutosaveError::Save { source, .. } => Some(source),
            AutosaveError::Encode(err) => Some(err),
        }
    }
}

impl From<FormDataError> for AutosaveError {
    fn from(value: FormDataError) -> Self {
        AutosaveError::Encode(value)
    }
}

#[cfg(test)]
mod tests;
