//! Type definitions shared by every workspace member
//!
//! - `language` - Languages supported for user-facing texts

pub mod language;

pub use language::Language;
