//! Resource type identifiers and their vendor/extension/model naming convention.

use std::fmt;

/// Canonical identifier of a document collection, e.g. `MyExt-MyModel` or
/// `my_ext-my_model`. Hyphens and underscores are preserved verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ResourceType(String);

/// The three naming parts a resource type encodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassNameParts {
    pub vendor: String,
    pub extension: String,
    pub model: String,
}

impl ResourceType {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Split into vendor, extension and model.
    ///
    /// `Vendor-Ext-Model` carries all three parts, `Ext-Model` has an empty
    /// vendor and a single word is taken as the extension. Underscored words
    /// become UpperCamelCase so `my_ext-my_model` and `MyExt-MyModel` share
    /// their parts.
    pub fn class_name_parts(&self) -> ClassNameParts {
        let mut parts: Vec<String> = self.0.splitn(3, '-').map(upper_camel_case).collect();
        match parts.len() {
            3 => {}
            2 => parts.insert(0, String::new()),
            _ => {
                parts.insert(0, String::new());
                parts.push(String::new());
            }
        }

        let model = parts.pop().unwrap_or_default();
        let extension = parts.pop().unwrap_or_default();
        let vendor = parts.pop().unwrap_or_default();
        ClassNameParts {
            vendor,
            extension,
            model,
        }
    }

    /// When the type addresses the document store (`Document` or
    /// `Document-{database}`), return the database part.
    pub fn document_database(&self) -> Option<Option<&str>> {
        let (head, tail) = match self.0.split_once('-') {
            Some((head, tail)) => (head, Some(tail)),
            None => (self.0.as_str(), None),
        };
        head.eq_ignore_ascii_case("document")
            .then(|| tail.filter(|db| !db.is_empty()))
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceType {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

fn upper_camel_case(word: &str) -> String {
    let mut out = String::with_capacity(word.len());
    for piece in word.split('_').filter(|piece| !piece.is_empty()) {
        let mut chars = piece.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
        }
    }
    out
}
