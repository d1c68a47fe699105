//! Maps raw request targets onto resource type, format and identifier.

use std::collections::HashMap;

use tracing::debug;
use url::Url;

use crate::domain::{
    request::{Format, Method, QueryParams, RequestContext},
    resource_type::ResourceType,
};

/// First path segment below the site prefix that routes into the API.
const API_ROOT_SEGMENT: &str = "rest";
const AUTO_PREFIX: &str = "auto";

/// Resolves request targets using the configured aliases and site prefix.
#[derive(Debug, Clone, Default)]
pub struct PathResolver {
    aliases: HashMap<String, String>,
    prefix: String,
}

impl PathResolver {
    /// Build a resolver. Alias entries with an empty name or an unusable
    /// target are dropped so lookups fall back to the literal segment.
    pub fn new<I, K, V>(aliases: I, abs_ref_prefix: Option<&str>) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let aliases = aliases
            .into_iter()
            .map(|(alias, target)| -> (String, String) { (alias.into(), target.into()) })
            .filter(|(alias, target)| {
                let usable = is_usable_segment(alias) && is_usable_segment(target);
                if !usable {
                    debug!(alias = %alias, target = %target, "ignoring malformed alias");
                }
                usable
            })
            .collect();

        Self {
            aliases,
            prefix: normalize_prefix(abs_ref_prefix),
        }
    }

    /// Resolve a request target (`/rest/MyExt-MyModel/1.json?x=y` or the
    /// already relative `MyExt-MyModel/1.json`).
    pub fn resolve(&self, method: Method, raw_uri: &str) -> RequestContext {
        let (target, query) = match raw_uri.split_once('?') {
            Some((target, query)) => (target, QueryParams::parse(query)),
            None => (raw_uri, QueryParams::default()),
        };

        let route = self.route(target);
        let (route, format) = split_format(route);

        let (first_segment, rest) = match route.split_once('/') {
            Some((first, rest)) => (first, Some(rest)),
            None => (route, None),
        };

        let resource_type = match self.aliases.get(first_segment) {
            Some(canonical) => {
                debug!(alias = first_segment, resource_type = %canonical, "resolved alias");
                ResourceType::new(canonical.as_str())
            }
            None => ResourceType::new(first_segment),
        };

        let path = if route.is_empty() {
            String::new()
        } else {
            match rest {
                Some(rest) => format!("/{resource_type}/{rest}"),
                None => format!("/{resource_type}"),
            }
        };

        let identifier = rest
            .map(|rest| rest.trim_end_matches('/'))
            .filter(|rest| !rest.is_empty())
            .map(str::to_string);

        RequestContext::new(
            method,
            target.to_string(),
            path,
            resource_type,
            first_segment.to_string(),
            format,
            identifier,
            query,
        )
    }

    /// Strip the site prefix and the API root from an absolute target.
    fn route<'a>(&self, target: &'a str) -> &'a str {
        if !target.starts_with('/') {
            return target;
        }

        let below_prefix = target
            .strip_prefix(self.prefix.as_str())
            .unwrap_or_else(|| target.trim_start_matches('/'));

        match below_prefix.strip_prefix(API_ROOT_SEGMENT) {
            Some("") => "",
            Some(rest) if rest.starts_with('/') => &rest[1..],
            _ => below_prefix,
        }
    }
}

/// Reduce the configured prefix to a path that starts and ends with `/`.
fn normalize_prefix(abs_ref_prefix: Option<&str>) -> String {
    let raw = match abs_ref_prefix.map(str::trim) {
        None | Some("") | Some(AUTO_PREFIX) => return "/".to_string(),
        Some(raw) => raw,
    };

    let path = match Url::parse(raw) {
        Ok(url) if url.has_host() => url.path().to_string(),
        _ => raw.to_string(),
    };

    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{trimmed}/")
    }
}

/// Remove a trailing known-format extension. A dot that does not introduce a
/// known format (`1.0`, `1.blur`) stays part of the route.
fn split_format(route: &str) -> (&str, Format) {
    route
        .rsplit_once('.')
        .filter(|(_, extension)| !extension.contains('/'))
        .and_then(|(head, extension)| Format::from_extension(extension).map(|f| (head, f)))
        .unwrap_or((route, Format::default()))
}

fn is_usable_segment(value: &str) -> bool {
    !value.trim().is_empty() && !value.contains('/') && !value.contains('?')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> PathResolver {
        PathResolver::new([("myAlias", "MyExt-MyModel")], None)
    }

    #[test]
    fn relative_route_keeps_identifier() {
        let request = resolver().resolve(Method::Get, "MyExt-MyModel/1");
        assert_eq!(request.path(), "/MyExt-MyModel/1");
        assert_eq!(request.resource_type().as_str(), "MyExt-MyModel");
        assert_eq!(request.identifier(), Some("1"));
        assert_eq!(request.format(), Format::Json);
    }

    #[test]
    fn known_format_is_stripped() {
        let request = resolver().resolve(Method::Get, "MyExt-MyModel/2.html");
        assert_eq!(request.path(), "/MyExt-MyModel/2");
        assert_eq!(request.identifier(), Some("2"));
        assert_eq!(request.format(), Format::Html);
    }

    #[test]
    fn decimal_identifier_is_not_a_format() {
        let request = resolver().resolve(Method::Get, "MyExt-MyModel/1.0");
        assert_eq!(request.identifier(), Some("1.0"));
        assert_eq!(request.format(), Format::Json);

        let request = resolver().resolve(Method::Get, "MyExt-MyModel/1.0.json");
        assert_eq!(request.identifier(), Some("1.0"));
        assert_eq!(request.format(), Format::Json);
    }

    #[test]
    fn unknown_extension_falls_back_to_json() {
        let request = resolver().resolve(Method::Get, "MyExt-MyModel/1.blur");
        assert_eq!(request.format(), Format::Json);
        assert_eq!(request.identifier(), Some("1.blur"));
    }

    #[test]
    fn alias_resolves_to_canonical_type() {
        let request = resolver().resolve(Method::Get, "myAlias/2.json");
        assert_eq!(request.path(), "/MyExt-MyModel/2");
        assert_eq!(request.resource_type().as_str(), "MyExt-MyModel");
        assert_eq!(request.original_resource_type(), "myAlias");
        assert_eq!(request.root_object_key(), "MyExt-MyModel");
    }

    #[test]
    fn malformed_aliases_are_ignored() {
        let resolver = PathResolver::new([("", "MyExt-MyModel"), ("broken", "")], None);
        let request = resolver.resolve(Method::Get, "broken/1");
        assert_eq!(request.resource_type().as_str(), "broken");
    }

    #[test]
    fn format_without_resource_type() {
        let request = resolver().resolve(Method::Get, ".json");
        assert_eq!(request.format(), Format::Json);
        assert_eq!(request.path(), "");
        assert!(request.resource_type().is_empty());
    }

    #[test]
    fn query_never_leaks_into_route() {
        let request = resolver().resolve(Method::Get, "/rest/MyExt-MyModel/?query=string");
        assert_eq!(request.resource_type().as_str(), "MyExt-MyModel");
        assert_eq!(request.path(), "/MyExt-MyModel/");
        assert_eq!(request.identifier(), None);
        assert_eq!(request.uri(), "/rest/MyExt-MyModel/");
        assert_eq!(request.query().get("query"), Some("string"));
    }

    #[test]
    fn prefix_normalization() {
        assert_eq!(normalize_prefix(None), "/");
        assert_eq!(normalize_prefix(Some("auto")), "/");
        assert_eq!(normalize_prefix(Some("/subDirectory")), "/subDirectory/");
        assert_eq!(normalize_prefix(Some("/subDirectory/")), "/subDirectory/");
        assert_eq!(normalize_prefix(Some("http://example.com/")), "/");
        assert_eq!(normalize_prefix(Some("https://example.com/site/")), "/site/");
    }
}
