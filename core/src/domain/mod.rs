//! Domain layer containing the workflow entities and value objects.

pub mod entities;

pub use entities::*;
