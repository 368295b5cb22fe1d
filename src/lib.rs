//! Entity Builder: user-defined record types with typed properties
//!
//! Entities and their properties are defined at runtime; rows hold values
//! in an entity-attribute-value layout, are shared per row, move through a
//! per-entity workflow and keep an activity log. A SQLite file under `.eb/`
//! holds a project's data.

pub mod cli;
pub mod core;
pub mod entities;
pub mod schema;
