//! Email parsing: MBOX streaming reader, header decoding, and MIME handling.

pub mod header;
pub mod mbox;
pub mod mime;
