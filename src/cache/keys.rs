//! Cache fingerprints and invalidation tags.

use sha2::{Digest, Sha256};

use crate::domain::request::{Method, RequestContext};

/// Deterministic cache key for a request.
///
/// Derived from `uri_format_method`. Plain `GET` requests with query
/// parameters fold the canonical (key-sorted) query into a second digest so
/// distinct queries never share an entry; every other method ignores the
/// query.
pub fn fingerprint(request: &RequestContext) -> String {
    let base = sha256_hex(
        format!(
            "{}_{}_{}",
            request.uri(),
            request.format(),
            request.method()
        )
        .as_bytes(),
    );

    if *request.method() != Method::Get || request.query().is_empty() {
        return base;
    }

    let canonical = request.query().canonical();
    let serialized =
        serde_json::to_string(&canonical).unwrap_or_else(|_| format!("{canonical:?}"));
    sha256_hex(format!("{base}{serialized}").as_bytes())
}

/// The three invalidation tags of a request, most specific first:
/// `vendor_extension_model`, `extension_model` and the literal path.
pub fn tags(request: &RequestContext) -> [String; 3] {
    let parts = request.resource_type().class_name_parts();
    [
        format!("{}_{}_{}", parts.vendor, parts.extension, parts.model),
        format!("{}_{}", parts.extension, parts.model),
        request.path().to_string(),
    ]
}

fn sha256_hex(input: &[u8]) -> String {
    hex::encode(Sha256::digest(input))
}
