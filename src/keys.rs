pub const DEFAULT_NAMESPACE: &str = "tfcbt_";

const CASES_INDEX: &str = "cases_index";
const CURRENT_CASE: &str = "current_case";
const CASE_PREFIX: &str = "case_";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageKey {
    CasesIndex,
    Case(String),
    CurrentCase,
}

/// Prefix that scopes every key this crate reads or writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    prefix: String,
}

impl Default for Namespace {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

impl Namespace {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn key(&self, key: &StorageKey) -> String {
        match key {
            StorageKey::CasesIndex => format!("{}{CASES_INDEX}", self.prefix),
            StorageKey::Case(id) => format!("{}{CASE_PREFIX}{id}", self.prefix),
            StorageKey::CurrentCase => format!("{}{CURRENT_CASE}", self.prefix),
        }
    }

    pub fn owns(&self, raw: &str) -> bool {
        raw.starts_with(&self.prefix)
    }

    pub fn parse(&self, raw: &str) -> Option<StorageKey> {
        let rest = raw.strip_prefix(&self.prefix)?;
        match rest {
            CASES_INDEX => Some(StorageKey::CasesIndex),
            CURRENT_CASE => Some(StorageKey::CurrentCase),
            _ => rest
                .strip_prefix(CASE_PREFIX)
                .filter(|id| !id.is_empty())
                .map(|id| StorageKey::Case(id.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Namespace, StorageKey};

    #[test]
    fn renders_declared_key_space() {
        let ns = Namespace::default();
        assert_eq!(ns.key(&StorageKey::CasesIndex), "tfcbt_cases_index");
        assert_eq!(ns.key(&StorageKey::CurrentCase), "tfcbt_current_case");
        assert_eq!(
            ns.key(&StorageKey::Case("case-abc".to_string())),
            "tfcbt_case_case-abc"
        );
    }

    #[test]
    fn parse_inverts_key_rendering() {
        let ns = Namespace::new("x_");
        for key in [
            StorageKey::CasesIndex,
            StorageKey::CurrentCase,
            StorageKey::Case("42".to_string()),
        ] {
            assert_eq!(ns.parse(&ns.key(&key)), Some(key));
        }
        assert_eq!(ns.parse("x_case_"), None);
        assert_eq!(ns.parse("x_unrelated"), None);
        assert_eq!(ns.parse("y_cases_index"), None);
    }

    #[test]
    fn owns_checks_prefix_only() {
        let ns = Namespace::default();
        assert!(ns.owns("tfcbt_anything"));
        assert!(!ns.owns("other_cases_index"));
    }
}
