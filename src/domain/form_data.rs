use std::error::Error;
use std::fmt;

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::case_id::generate_record_id;

pub const ID_FIELD: &str = "id";
pub const CLIENT_INITIALS_FIELD: &str = "clientInitials";
pub const LAST_MODIFIED_FIELD: &str = "lastModified";

const RESERVED_FIELDS: [&str; 2] = [ID_FIELD, LAST_MODIFIED_FIELD];

/// One case's full clinical record. Opaque apart from the identity fields
/// the persistence layer reads or stamps.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FormData(Map<String, Value>);

impl FormData {
    pub fn blank(id: &str) -> Self {
        let value = json!({
            "id": id,
            "clientInitials": "",
            "caseInfo": {
                "clinicianName": "",
                "supervisorName": "",
                "agency": "",
                "treatmentStartDate": "",
            },
            "demographics": {
                "age": null,
                "gender": "",
                "race": "",
                "ethnicity": "",
                "primaryLanguage": "",
            },
            "siblings": [],
            "caregivers": [],
            "contactLog": [],
            "traumaHistory": {},
            "assessments": {},
            "fidelityChecklist": {},
            "sessionRatings": {},
        });
        match value {
            Value::Object(map) => Self(map),
            _ => Self(Map::new()),
        }
    }

    pub fn from_value(value: Value) -> Result<Self, FormDataError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(FormDataError::NotAnObject(json_type_name(&other))),
        }
    }

    pub fn parse(text: &str) -> Result<Self, FormDataError> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }

    pub fn id(&self) -> Option<&str> {
        self.0.get(ID_FIELD).and_then(Value::as_str)
    }

    pub fn set_id(&mut self, id: &str) {
        self.0.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
    }

    pub fn client_initials(&self) -> &str {
        self.0
            .get(CLIENT_INITIALS_FIELD)
            .and_then(Value::as_str)
            .unwrap_or("")
    }

    pub fn set_client_initials(&mut self, initials: &str) {
        self.0.insert(
            CLIENT_INITIALS_FIELD.to_string(),
            Value::String(initials.to_string()),
        );
    }

    pub fn last_modified(&self) -> Option<&str> {
        self.0.get(LAST_MODIFIED_FIELD).and_then(Value::as_str)
    }

    pub fn stamp_last_modified(&mut self, at: &str) {
        self.0.insert(
            LAST_MODIFIED_FIELD.to_string(),
            Value::String(at.to_string()),
        );
    }

    /// Compact serialization with sorted keys; equal documents serialize identically.
    pub fn canonical(&self) -> Result<String, FormDataError> {
        Ok(serde_json::to_string(&self.0)?)
    }

    pub fn to_pretty(&self) -> Result<String, FormDataError> {
        Ok(serde_json::to_string_pretty(&self.0)?)
    }

    pub fn get_field(&self, pointer: &str) -> Option<&Value> {
        let tokens = pointer_tokens(pointer)?;
        let (first, rest) = tokens.split_first()?;
        let mut current = self.0.get(first)?;
        for token in rest {
            current = match current {
                Value::Object(map) => map.get(token)?,
                Value::Array(items) => items.get(token.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Writes `value` at a JSON Pointer, creating missing intermediate objects.
    /// Array elements must already exist; a final `-` appends.
    pub fn set_field(&mut self, pointer: &str, value: Value) -> Result<(), FormDataError> {
        let tokens = pointer_tokens(pointer)
            .ok_or_else(|| FormDataError::InvalidPointer(pointer.to_string()))?;
        let (first, rest) = tokens
            .split_first()
            .ok_or_else(|| FormDataError::InvalidPointer(pointer.to_string()))?;
        if rest.is_empty() {
            if RESERVED_FIELDS.contains(&first.as_str()) {
                return Err(FormDataError::ReservedField(first.clone()));
            }
            self.0.insert(first.clone(), value);
            return Ok(());
        }
        let child = self
            .0
            .entry(first.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        set_in(child, rest, value, pointer)
    }

    /// Appends a sub-record with a fresh element id to the array at `pointer`
    /// (created when missing) and returns that id.
    pub fn append_record(&mut self, pointer: &str) -> Result<String, FormDataError> {
        let record_id = generate_record_id();
        if self.get_field(pointer).is_none() {
            self.set_field(pointer, Value::Array(Vec::new()))?;
        }
        match self.get_field_mut(pointer) {
            Some(Value::Array(items)) => {
                items.push(json!({ "id": record_id }));
                Ok(record_id)
            }
            _ => Err(FormDataError::NotAContainer(pointer.to_string())),
        }
    }

    /// Returns whether a sub-record with `record_id` was removed.
    pub fn remove_record(&mut self, pointer: &str, record_id: &str) -> Result<bool, FormDataError> {
        match self.get_field_mut(pointer) {
            Some(Value::Array(items)) => {
                let before = items.len();
                items.retain(|item| item.get(ID_FIELD).and_then(Value::as_str) != Some(record_id));
                Ok(items.len() != before)
            }
            Some(_) => Err(FormDataError::NotAContainer(pointer.to_string())),
            None => Ok(false),
        }
    }

    fn get_field_mut(&mut self, pointer: &str) -> Option<&mut Value> {
        let tokens = pointer_tokens(pointer)?;
        let (first, rest) = tokens.split_first()?;
        let mut current = self.0.get_mut(first)?;
        for token in rest {
            current = match current {
                Value::Object(map) => map.get_mut(token)?,
                Value::Array(items) => items.get_mut(token.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }
}

fn pointer_tokens(pointer: &str) -> Option<Vec<String>> {
    let rest = pointer.strip_prefix('/')?;
    if rest.is_empty() {
        return None;
    }
    Some(rest.split('/').map(unescape).collect())
}

fn set_in(
    target: &mut Value,
    tokens: &[String],
    value: Value,
    pointer: &str,
) -> Result<(), FormDataError> {
    let Some((token, rest)) = tokens.split_first() else {
        *target = value;
        return Ok(());
    };
    match target {
        Value::Object(map) => {
            if rest.is_empty() {
                map.insert(token.clone(), value);
                return Ok(());
            }
            let child = map
                .entry(token.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            set_in(child, rest, value, pointer)
        }
        Value::Array(items) => {
            if token == "-" && rest.is_empty() {
                items.push(value);
                return Ok(());
            }
            let index = array_index(token, items.len(), pointer)?;
            let child = items
                .get_mut(index)
                .ok_or_else(|| FormDataError::InvalidPointer(pointer.to_string()))?;
            set_in(child, rest, value, pointer)
        }
        _ => Err(FormDataError::NotAContainer(pointer.to_string())),
    }
}

fn unescape(token: &str) -> String {
    token.replace("~1", "/").replace("~0", "~")
}

fn array_index(token: &str, len: usize, pointer: &str) -> Result<usize, FormDataError> {
    let index = token
        .parse::<usize>()
        .map_err(|_| FormDataError::InvalidPointer(pointer.to_string()))?;
    if index >= len {
        return Err(FormDataError::InvalidPointer(pointer.to_string()));
    }
    Ok(index)
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Debug)]
pub enum FormDataError {
    Json(serde_json::Error),
    NotAnObject(&'static str),
    InvalidPointer(String),
    NotAContainer(String),
    ReservedField(String),
}

impl fmt::Display for FormDataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormDataError::Json(err) => write!(f, "JSON error: {}", err),
            FormDataError::NotAnObject(kind) => {
                write!(f, "case document must be a JSON object, found {}", kind)
            }
            FormDataError::InvalidPointer(pointer) => {
                write!(f, "invalid field pointer '{}'", pointer)
            }
            FormDataError::NotAContainer(pointer) => {
                write!(f, "field path '{}' runs through a non-container value", pointer)
            }
            FormDataError::ReservedField(field) => {
                write!(f, "field '{}' is managed by case storage", field)
            }
        }
    }
}

impl Error for FormDataError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            FormDataError::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for FormDataError {
    fn from(value: serde_json::Error) -> Self {
        FormDataError::Json(value)
    }
}
