//! Core module - the entity builder engine
//!
//! All operations act on an in-memory [`Store`] and take the caller's
//! [`TenantContext`]; [`Database`] persists the store to SQLite.

pub mod activity;
pub mod api;
pub mod cache;
pub mod config;
pub mod context;
pub mod definition;
pub mod identity;
pub mod permissions;
pub mod project;
pub mod registry;
pub mod relations;
pub mod rows;
pub mod store;
pub mod workflow;

pub use activity::ActivityError;
pub use api::{ApiError, ApiGateway, ApiRequest, ApiResponse};
pub use cache::{CacheError, Database};
pub use config::{Config, ConfigError};
pub use context::{Actor, TenantContext, UserIdentity};
pub use definition::{Definition, DefinitionError};
pub use identity::IdParseError;
pub use permissions::ShareError;
pub use project::{Project, ProjectError};
pub use registry::RegistryError;
pub use relations::RelationError;
pub use rows::RowError;
pub use store::{CascadeReport, Store};
pub use workflow::{WorkflowEngine, WorkflowError};
