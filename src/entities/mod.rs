//! Data model
//!
//! - [`Entity`] - user-defined record type
//! - [`Property`] - typed field of an entity, with SELECT [`PropertyOption`]s
//! - [`Row`] / [`RowValue`] - record instance and its EAV cells
//! - [`RowPermission`] - sharing grants, resolved into [`RowAccess`]
//! - [`WorkflowState`] / [`WorkflowStep`] - per-entity state machine
//! - [`Log`] - activity history; [`ApiKey`] / [`ApiKeyLog`] - API surface

pub mod entity;
pub mod log;
pub mod property;
pub mod row;
pub mod sharing;
pub mod workflow;

pub use entity::{Entity, EntityFlags, Folio};
pub use log::{
    ApiKey, ApiKeyEntityPermission, ApiKeyLog, ApiMethod, Log, LogAction, Reaction,
};
pub use property::{attr, Property, PropertyAttribute, PropertyOption, PropertyType};
pub use row::{MediaRef, Row, RowValue, StorageSlot, Value};
pub use sharing::{Principal, RowAccess, RowPermission, Visibility};
pub use workflow::{WorkflowState, WorkflowStep};
