//! Schemaless documents grouped into named databases.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::DomainError;

/// A validated document database name: lowercase ASCII letters and digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DatabaseName(String);

impl DatabaseName {
    pub fn parse(value: &str) -> Result<Self, DomainError> {
        if value.is_empty() || !value.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(DomainError::invalid_database_name(
                value,
                "the name contains invalid characters",
            ));
        }
        if value.to_ascii_lowercase() != value {
            return Err(DomainError::invalid_database_name(
                value,
                "the name must be lowercase",
            ));
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DatabaseName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for DatabaseName {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<DatabaseName> for String {
    fn from(value: DatabaseName) -> Self {
        value.0
    }
}

/// A document stored under `(db, id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<i64>,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db: Option<DatabaseName>,
    #[serde(default)]
    pub data: Map<String, Value>,
}

const DATA_KEYS: [&str; 3] = ["data", "data_protected", "dataProtected"];

impl Document {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            uid: None,
            pid: None,
            id: id.into(),
            db: None,
            data: Map::new(),
        }
    }

    pub fn in_database(mut self, db: DatabaseName) -> Self {
        self.db = Some(db);
        self
    }

    pub fn with_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Composite identifier `{db}-{id}`.
    pub fn guid(&self) -> Option<String> {
        self.db.as_ref().map(|db| format!("{db}-{}", self.id))
    }

    /// A document that was never persisted has no `uid`.
    pub fn is_new(&self) -> bool {
        self.uid.is_none()
    }

    /// Build a document from a loosely shaped JSON object.
    ///
    /// `data_protected`/`dataProtected` are accepted in place of `data`; any
    /// other unknown key lands in `data`. `fallback_id` is used when the
    /// payload has no `id`.
    pub fn from_json(value: Value, fallback_id: Option<&str>) -> Result<Self, DomainError> {
        let Value::Object(mut object) = value else {
            return Err(DomainError::invalid_document("expected a JSON object"));
        };

        let mut data = Map::new();
        for key in DATA_KEYS {
            match object.remove(key) {
                Some(Value::Object(nested)) => data.extend(nested),
                Some(Value::Null) | None => {}
                Some(_) => {
                    return Err(DomainError::invalid_document(format!(
                        "`{key}` must be an object"
                    )));
                }
            }
        }

        let id = match object.remove("id") {
            Some(Value::String(id)) if !id.is_empty() => id,
            Some(Value::Number(id)) => id.to_string(),
            Some(Value::Null) | None => fallback_id
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .ok_or_else(|| DomainError::invalid_document("missing document id"))?,
            Some(_) => return Err(DomainError::invalid_document("`id` must be a string")),
        };

        let db = match object.remove("db") {
            Some(Value::String(db)) => Some(DatabaseName::parse(&db)?),
            Some(Value::Null) | None => None,
            Some(_) => return Err(DomainError::invalid_document("`db` must be a string")),
        };

        let uid = take_integer(&mut object, "uid")?;
        let pid = take_integer(&mut object, "pid")?;

        data.extend(object);

        Ok(Self {
            uid,
            pid,
            id,
            db,
            data,
        })
    }

    /// Copy the populated fields of `newer` onto `self`.
    pub fn merge_from(mut self, newer: Document) -> Self {
        if newer.uid.is_some() {
            self.uid = newer.uid;
        }
        if newer.pid.is_some() {
            self.pid = newer.pid;
        }
        if !newer.id.is_empty() {
            self.id = newer.id;
        }
        if newer.db.is_some() {
            self.db = newer.db;
        }
        if !newer.data.is_empty() {
            self.data = newer.data;
        }
        self
    }
}

fn take_integer(object: &mut Map<String, Value>, key: &str) -> Result<Option<i64>, DomainError> {
    match object.remove(key) {
        Some(Value::Number(number)) => number
            .as_i64()
            .map(Some)
            .ok_or_else(|| DomainError::invalid_document(format!("`{key}` must be an integer"))),
        Some(Value::String(text)) if !text.is_empty() => text
            .parse()
            .map(Some)
            .map_err(|_| DomainError::invalid_document(format!("`{key}` must be an integer"))),
        Some(Value::Null) | Some(Value::String(_)) | None => Ok(None),
        Some(_) => Err(DomainError::invalid_document(format!(
            "`{key}` must be an integer"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn database_names_must_be_lowercase_alphanumeric() {
        assert!(DatabaseName::parse("contacts2").is_ok());
        assert!(matches!(
            DatabaseName::parse("Contacts"),
            Err(DomainError::InvalidDatabaseName { .. })
        ));
        assert!(DatabaseName::parse("my-db").is_err());
        assert!(DatabaseName::parse("my_db").is_err());
        assert!(DatabaseName::parse("").is_err());
    }

    #[test]
    fn guid_joins_database_and_id() {
        let db = DatabaseName::parse("contacts").expect("valid name");
        let document = Document::new("42").in_database(db);
        assert_eq!(document.guid().as_deref(), Some("contacts-42"));
        assert_eq!(Document::new("42").guid(), None);
    }

    #[test]
    fn from_json_collects_unknown_keys_into_data() {
        let document = Document::from_json(
            json!({"id": "7", "db": "contacts", "name": "Ada", "data_protected": {"age": 36}}),
            None,
        )
        .expect("valid document");

        assert_eq!(document.id, "7");
        assert_eq!(document.db.as_ref().map(DatabaseName::as_str), Some("contacts"));
        assert_eq!(document.data.get("name"), Some(&json!("Ada")));
        assert_eq!(document.data.get("age"), Some(&json!(36)));
    }

    #[test]
    fn from_json_uses_fallback_id() {
        let document = Document::from_json(json!({"name": "Ada"}), Some("ada")).expect("valid");
        assert_eq!(document.id, "ada");

        let missing = Document::from_json(json!({"name": "Ada"}), None);
        assert!(matches!(missing, Err(DomainError::InvalidDocument { .. })));
    }

    #[test]
    fn from_json_rejects_invalid_database() {
        let result = Document::from_json(json!({"id": "1", "db": "Bad-Name"}), None);
        assert!(matches!(result, Err(DomainError::InvalidDatabaseName { .. })));
    }

    #[test]
    fn merge_keeps_old_values_for_empty_fields() {
        let old = Document {
            uid: Some(3),
            pid: Some(1),
            id: "a".into(),
            db: DatabaseName::parse("db").ok(),
            data: Map::from_iter([("v".to_string(), json!(1))]),
        };
        let newer = Document::new("a").with_value("v", json!(2));

        let merged = old.merge_from(newer);
        assert_eq!(merged.uid, Some(3));
        assert_eq!(merged.pid, Some(1));
        assert_eq!(merged.data.get("v"), Some(&json!(2)));
        assert!(merged.db.is_some());
    }
}
