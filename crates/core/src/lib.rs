//! Shared domain types for the meethub coordination layer.
//!
//! This crate has no internal dependencies so it can be used by every other
//! crate in the workspace: the coordination services, the reconciler, and
//! the worker binary.

pub mod config;
pub mod naming;
pub mod recording;
pub mod types;
