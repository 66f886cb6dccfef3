//! CLI command implementations

pub mod backup;
pub mod common;
pub mod maintenance;
pub mod run;
pub mod status;
