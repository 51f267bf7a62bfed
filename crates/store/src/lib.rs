//! Key-value store client for the coordination layer.
//!
//! [`KeyValueStore`] is the narrow atomic-primitive contract everything in
//! the coordination layer builds on. Two implementations are provided:
//!
//! - [`RedisStore`] -- production backend over a Redis connection manager.
//! - [`MemoryStore`] -- in-process backend used as the test double by the
//!   dependent crates.
//!
//! The store is the single source of truth across horizontally-scaled API
//! instances; nothing here is cached locally.

mod kv;
mod memory;
mod redis_store;

pub use kv::{KeyValueStore, StoreError};
pub use memory::MemoryStore;
pub use redis_store::RedisStore;
