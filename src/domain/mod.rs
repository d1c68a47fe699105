//! Domain layer types and invariants.

pub mod document;
pub mod error;
pub mod request;
pub mod resource_type;
