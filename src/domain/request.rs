//! Request value types produced by the path resolver.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::resource_type::ResourceType;

/// HTTP verb of an inbound request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
    /// Any verb outside the standard set, kept upper-cased.
    Other(String),
}

impl Method {
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_uppercase().as_str() {
            "GET" => Self::Get,
            "HEAD" => Self::Head,
            "POST" => Self::Post,
            "PUT" => Self::Put,
            "PATCH" => Self::Patch,
            "DELETE" => Self::Delete,
            "OPTIONS" => Self::Options,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Options => "OPTIONS",
            Self::Other(value) => value.as_str(),
        }
    }

    /// `GET` and `HEAD` read; every other verb, custom ones included, writes.
    pub fn access_method(&self) -> AccessMethod {
        match self {
            Self::Get | Self::Head => AccessMethod::Read,
            _ => AccessMethod::Write,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&axum::http::Method> for Method {
    fn from(method: &axum::http::Method) -> Self {
        Self::parse(method.as_str())
    }
}

/// Coarse classification of a verb used by access rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMethod {
    Read,
    Write,
}

impl AccessMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            AccessMethod::Read => "read",
            AccessMethod::Write => "write",
        }
    }
}

impl fmt::Display for AccessMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Response formats recognised as a trailing URI extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Format {
    #[default]
    Json,
    Html,
    Xml,
    Csv,
    Txt,
}

impl Format {
    pub const ALL: [Format; 5] = [
        Format::Json,
        Format::Html,
        Format::Xml,
        Format::Csv,
        Format::Txt,
    ];

    /// Match a known extension keyword. Unknown keywords yield `None`.
    pub fn from_extension(extension: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|format| format.as_str() == extension)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::Html => "html",
            Format::Xml => "xml",
            Format::Csv => "csv",
            Format::Txt => "txt",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Format::Json => "application/json",
            Format::Html => "text/html; charset=utf-8",
            Format::Xml => "application/xml",
            Format::Csv => "text/csv; charset=utf-8",
            Format::Txt => "text/plain; charset=utf-8",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Query parameters in the order the transport delivered them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    pairs: Vec<(String, String)>,
}

impl QueryParams {
    pub fn parse(query: &str) -> Self {
        let pairs = url::form_urlencoded::parse(query.as_bytes())
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        Self { pairs }
    }

    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            pairs: pairs
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Last value wins for repeated keys.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .rev()
            .find(|(candidate, _)| candidate == key)
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Key-sorted view that ignores transport order; later duplicates win.
    pub fn canonical(&self) -> BTreeMap<&str, &str> {
        self.iter().collect()
    }
}

/// One inbound request after URI resolution.
///
/// Built by [`crate::application::resolver::PathResolver`]; every accessor is
/// read-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    method: Method,
    uri: String,
    path: String,
    resource_type: ResourceType,
    original_resource_type: String,
    format: Format,
    identifier: Option<String>,
    query: QueryParams,
}

impl RequestContext {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        method: Method,
        uri: String,
        path: String,
        resource_type: ResourceType,
        original_resource_type: String,
        format: Format,
        identifier: Option<String>,
        query: QueryParams,
    ) -> Self {
        Self {
            method,
            uri,
            path,
            resource_type,
            original_resource_type,
            format,
            identifier,
            query,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Request target without its query string.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Canonical route, e.g. `/MyExt-MyModel/1`. Empty when no resource type
    /// could be resolved.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn resource_type(&self) -> &ResourceType {
        &self.resource_type
    }

    /// First route segment as sent, before alias resolution.
    pub fn original_resource_type(&self) -> &str {
        &self.original_resource_type
    }

    /// Envelope key for collection responses.
    pub fn root_object_key(&self) -> &str {
        self.resource_type.as_str()
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn identifier(&self) -> Option<&str> {
        self.identifier.as_deref()
    }

    pub fn query(&self) -> &QueryParams {
        &self.query
    }

    pub fn access_method(&self) -> AccessMethod {
        self.method.access_method()
    }

    pub fn is_read(&self) -> bool {
        self.access_method() == AccessMethod::Read
    }

    pub fn is_write(&self) -> bool {
        !self.is_read()
    }

    /// Same request with another verb.
    pub fn with_method(&self, method: Method) -> Self {
        Self {
            method,
            ..self.clone()
        }
    }

    /// Same request addressed to another resource type. Route and identifier
    /// are kept.
    pub fn with_resource_type(&self, resource_type: ResourceType) -> Self {
        Self {
            resource_type,
            ..self.clone()
        }
    }
}
