//! Core data model types for decoded headers, MIME parts and extracted files.

pub mod header;
pub mod part;
