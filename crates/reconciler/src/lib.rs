//! Reconciliation sweeps for orphaned locks and stale recordings.
//!
//! Both sweeps are idempotent and safe to run concurrently with live API
//! traffic: they read from the lock service, the store, and the media
//! server's authoritative status API, and heal divergences without any
//! request waiting on the result. A missed cycle is safe by design -- the
//! next one re-evaluates everything from external state.
//!
//! Items are processed in fixed-size batches; within a batch every item is
//! settled independently, so one failure never blocks its siblings.

mod locks;
mod recordings;

pub use locks::{LockSweepReport, OrphanedLockSweep};
pub use recordings::{RecordingSweepReport, StaleRecordingSweep};

/// How many rooms/recordings are inspected concurrently per batch, to bound
/// the number of simultaneous calls against the external services.
pub(crate) const BATCH_SIZE: usize = 10;
