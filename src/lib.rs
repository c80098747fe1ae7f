//! `mailrelay`: relay new mail to a chat channel.
//!
//! This crate provides the library behind the `mailrelay` binary: decoding
//! charset-ambiguous headers, splitting long bodies, walking MIME trees and
//! packing every message into a ZIP archive for delivery.

pub mod archive;
pub mod config;
pub mod error;
pub mod i18n;
pub mod model;
pub mod parser;
pub mod relay;
pub mod sink;
pub mod source;
pub mod split;
pub mod state;
