//! CLI command implementations

pub mod apikey;
pub mod comment;
pub mod completions;
pub mod entity;
pub mod init;
pub mod log;
pub mod prop;
pub mod public;
pub mod row;
pub mod share;
pub mod workflow;
