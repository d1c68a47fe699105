//! REST facade in front of a document store: path resolution, rule-based
//! access control and a tag-invalidated response cache.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
