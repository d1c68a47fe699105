//! Application services: request resolution, access control, the document
//! gateway and the dispatcher tying them together.

pub mod access;
pub mod dispatcher;
pub mod documents;
pub mod error;
pub mod repos;
pub mod resolver;
