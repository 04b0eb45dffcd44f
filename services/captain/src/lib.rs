//! Captain fleet service library.
//!
//! This crate primarily ships a `captain` binary, but we expose a small
//! library surface to enable integration testing and reuse.

pub mod api;
pub mod config;
pub mod discovery;
pub mod error;
pub mod inventory;
pub mod model;
pub mod orchestrator;
pub mod pool;
pub mod state;
