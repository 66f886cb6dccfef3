//! Vacuum Testing Infrastructure
//!
//! Deterministic effect handlers, fixtures and proptest strategies shared by
//! the coordinator's unit and integration tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! vacuum-testkit = { path = "../vacuum-testkit" }
//! ```
//!
//! ```rust,no_run
//! use vacuum_testkit::*;
//!
//! let backend = MemoryStorageBackend::new();
//! backend.fail_node("sv-2");
//! let nodes = three_node_scenario();
//! ```

pub mod fixtures;
pub mod mock_effects;
pub mod strategies;

pub use fixtures::*;
pub use mock_effects::*;
