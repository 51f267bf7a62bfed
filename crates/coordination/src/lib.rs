//! Distributed coordination services for the meethub control plane.
//!
//! The API may run as multiple horizontally-scaled instances, so nothing in
//! this crate keeps authoritative state in-process. Both services are thin
//! layers over the store's atomic primitives:
//!
//! - [`LockService`] -- named, auto-expiring mutexes with token-based
//!   release.
//! - [`NameAllocator`] -- collision-free, case-insensitive participant
//!   display names per room, with a reusable suffix-number pool.

pub mod lock;
pub mod names;

pub use lock::{LockError, LockService, LockToken};
pub use names::{NameAllocator, NameError};
