//! Integration test utilities for the messaging engine
//!
//! This crate wires the services to the in-memory store behind a manual
//! clock so scenarios run deterministically without external services.

pub mod fixtures;
pub mod helpers;

pub use fixtures::*;
pub use helpers::*;
