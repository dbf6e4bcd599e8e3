//! Core domain types and utilities for the nodeflow workflow engine.
//!
//! This crate provides the identifiers and error-handling foundation shared
//! by the graph model, the execution engine and the binaries built on them.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{GraphId, InstanceId, ParseIdError};
