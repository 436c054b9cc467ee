use std::error::Error;
use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::autosave::SaveOutcome;
use crate::clock::SystemClock;
use crate::config::{Config, ConfigError};
use crate::domain::case_meta::CaseMeta;
use crate::domain::form_data::FormData;
use crate::manager::CaseManager;
use crate::repository::{CaseRepository, StorageUsage};
use crate::session::{Session, SessionError};
use crate::store::{SqliteStore, StoreError};

const CASE_ID_PREFIX: &str = "case-";

pub type AppSession = Session<SqliteStore, SystemClock>;

pub struct App {
    session: AppSession,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CaseListEntry {
    #[serde(flatten)]
    pub meta: CaseMeta,
    pub current: bool,
}

impl App {
    pub fn open(config: &Config) -> Result<Self, AppError> {
        let store = SqliteStore::open(&config.storage.path, config.store_options())?;
        let repo = CaseRepository::new(store, config.namespace(), SystemClock);
        let manager = CaseManager::init(repo);
        let session = Session::new(manager, config.debounce())?;
        Ok(Self { session })
    }

    pub fn session_mut(&mut self) -> &mut AppSession {
        &mut self.session
    }

    /// Accepts a full id or one without the `case-` prefix.
    pub fn resolve_case_id(&self, raw: &str) -> Result<String, AppError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(AppError::InvalidArgument("case id is required".to_string()));
        }
        let manager = self.session.manager();
        if manager.contains(raw) {
            return Ok(raw.to_string());
        }
        let prefixed = format!("{CASE_ID_PREFIX}{raw}");
        if manager.contains(&prefixed) {
            return Ok(prefixed);
        }
        Err(AppError::NotFound(raw.to_string()))
    }

    pub fn current_case_id(&self) -> Option<String> {
        self.session.current_case_id().map(str::to_string)
    }

    fn resolve_or_current(&self, raw: Option<&str>) -> Result<String, AppError> {
        match raw {
            Some(raw) => self.resolve_case_id(raw),
            None => self.current_case_id().ok_or(AppError::NoCurrentCase),
        }
    }

    pub fn list_cases(&self) -> Vec<CaseListEntry> {
        let current = self.session.current_case_id();
        self.session
            .manager()
            .cases()
            .iter()
            .map(|meta| CaseListEntry {
                meta: meta.clone(),
                current: current == Some(meta.id.as_str()),
            })
            .collect()
    }

    /// The stored document, or a blank form for a case that was never saved.
    pub fn show_case(&self, raw: Option<&str>) -> Result<(CaseMeta, FormData), AppError> {
        let id = self.resolve_or_current(raw)?;
        let manager = self.session.manager();
        let meta = manager
            .cases()
            .iter()
            .find(|meta| meta.id == id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(id.clone()))?;
        let doc = manager
            .repo()
            .get_case(&id)
            .unwrap_or_else(|| FormData::blank(&id));
        Ok((meta, doc))
    }

    pub fn create_case(&mut self, initials: Option<&str>) -> Result<String, AppError> {
        Ok(self.session.create_case(initials)?)
    }

    pub fn select_case(&mut self, raw: &str) -> Result<String, AppError> {
        let id = self.resolve_case_id(raw)?;
        self.session.open(&id)?;
        Ok(id)
    }

    /// Writes one field and saves it right away. The current-case pointer is
    /// left where it was, whether or not the edit succeeds.
    pub fn set_field(
        &mut self,
        raw: Option<&str>,
        pointer: &str,
        raw_value: &str,
    ) -> Result<(String, SaveOutcome), AppError> {
        let id = self.resolve_or_current(raw)?;
        let previous = self.current_case_id();
        if previous.as_deref() != Some(id.as_str()) {
            self.session.open(&id)?;
        }
        let edited = self
            .session
            .set_field(pointer, parse_field_value(raw_value))
            .and_then(|()| self.session.save_now());
        if let Some(previous) = previous.filter(|previous| *previous != id) {
            self.session.open(&previous)?;
        }
        Ok((id, edited?))
    }

    pub fn delete_case(&mut self, raw: &str) -> Result<String, AppError> {
        let id = self.resolve_case_id(raw)?;
        self.session.delete_case(&id)?;
        Ok(id)
    }

    pub fn duplicate_case(&mut self, raw: &str) -> Result<String, AppError> {
        let id = self.resolve_case_id(raw)?;
        self.session
            .duplicate_case(&id)?
            .ok_or_else(|| AppError::InvalidArgument(format!("case '{id}' has no saved document")))
    }

    pub fn export_case(&mut self, raw: &str) -> Result<String, AppError> {
        let id = self.resolve_case_id(raw)?;
        self.session
            .export_case(&id)?
            .ok_or_else(|| AppError::InvalidArgument(format!("case '{id}' has no saved document")))
    }

    pub fn import_case(&mut self, text: &str) -> Result<String, AppError> {
        self.session.import_case(text)?.ok_or_else(|| {
            AppError::InvalidArgument("import file is not a case document".to_string())
        })
    }

    pub fn storage_usage(&self) -> StorageUsage {
        self.session.storage_usage()
    }

    pub fn clear_all_data(&mut self) -> Result<usize, AppError> {
        Ok(self.session.clear_all_data()?)
    }

    /// Trailing write for whatever is still pending.
    pub fn close(&mut self) -> Result<SaveOutcome, AppError> {
        Ok(self.session.close()?)
    }
}

/// JSON when it parses, otherwise the raw text as a string.
pub fn parse_field_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

#[derive(Debug)]
pub enum AppError {
    Io(std::io::Error),
    Json(serde_json::Error),
    Config(ConfigError),
    Store(StoreError),
    Session(SessionError),
    InvalidArgument(String),
    NotFound(String),
    NoCurrentCase,
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Io(err) => write!(f, "I/O error: {}", err),
            AppError::Json(err) => write!(f, "JSON error: {}", err),
            AppError::Config(err) => write!(f, "{}", err),
            AppError::Store(err) => write!(f, "storage error: {}", err),
            AppError::Session(err) => write!(f, "{}", err),
            AppError::InvalidArgument(message) => write!(f, "{}", message),
            AppError::NotFound(id) => write!(f, "case '{}' not found", id),
            AppError::NoCurrentCase => {
                write!(f, "no current case; pass a case id or run `casekeep new`")
            }
        }
    }
}

impl Error for AppError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AppError::Io(err) => Some(err),
            AppError::Json(err) => Some(err),
            AppError::Config(err) => Some(err),
            AppError::Store(err) => Some(err),
            AppError::Session(err) => Some(err),
            AppError::InvalidArgument(_) => None,
            AppError::NotFound(_) => None,
            AppError::NoCurrentCase => None,
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        AppError::Io(value)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        AppError::Json(value)
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        AppError::Config(value)
    }
}

impl From<StoreError> for AppError {
    fn from(value: StoreError) -> Self {
        AppError::Store(value)
    }
}

impl From<SessionError> for AppError {
    fn from(value: SessionError) -> Self {
        AppError::Session(value)
    }
}
