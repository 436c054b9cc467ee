use serde::{Deserialize, Serialize};

use crate::clock::parse_rfc3339;

pub const NEW_CASE_NAME: &str = "New Case";
pub const IMPORTED_CASE_NAME: &str = "Imported Case";
pub const COPY_SUFFIX: &str = " (Copy)";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CaseMeta {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub client_initials: String,
    pub created: String,
    pub last_modified: String,
}

impl CaseMeta {
    pub fn new(id: impl Into<String>, name: impl Into<String>, at: &str) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            client_initials: String::new(),
            created: at.to_string(),
            last_modified: at.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CasesIndex {
    #[serde(default)]
    pub cases: Vec<CaseMeta>,
}

impl CasesIndex {
    pub fn find(&self, id: &str) -> Option<&CaseMeta> {
        self.cases.iter().find(|meta| meta.id == id)
    }

    pub fn find_mut(&mut self, id: &str) -> Option<&mut CaseMeta> {
        self.cases.iter_mut().find(|meta| meta.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.find(id).is_some()
    }

    /// Puts `meta` at the front, replacing any entry that shares its id.
    pub fn insert_front(&mut self, meta: CaseMeta) {
        self.cases.retain(|existing| existing.id != meta.id);
        self.cases.insert(0, meta);
    }

    /// Returns whether an entry was removed.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.cases.len();
        self.cases.retain(|meta| meta.id != id);
        self.cases.len() != before
    }

    /// Entries ordered by `lastModified`, newest first. Equal or unparsable
    /// timestamps keep their stored order; unparsable ones sort last.
    pub fn by_recency(&self) -> Vec<CaseMeta> {
        let mut ordered = self.cases.clone();
        ordered.sort_by(|a, b| {
            let a_at = parse_rfc3339(&a.last_modified);
            let b_at = parse_rfc3339(&b.last_modified);
            b_at.cmp(&a_at)
        });
        ordered
    }
}

pub fn display_name(client_initials: &str, fallback: &str) -> String {
    let trimmed = client_initials.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}
