//! Optional observability helpers for pool acquisitions.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to run every acquisition inside an `oauth2_token_pool.acquire` span (fields
//!   `stage` and `fingerprint`) and to emit a `debug` event per [`PoolEvent`].
//! - Enable `metrics` to increment the `oauth2_token_pool_events_total` counter, labeled by
//!   `event`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Notable steps of the refill policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PoolEvent {
	/// Entry to an acquisition.
	Attempt,
	/// Served the oldest survivor because the pool was at target.
	Hit,
	/// Minted a new token and appended it to the pool.
	Mint,
	/// Served a survivor because the issuer failed to mint.
	Fallback,
	/// Dropped a pooled handle that failed re-validation.
	Eviction,
	/// Wrote a changed entry back to storage.
	WriteBack,
	/// Storage failed; the pool degraded to a pass-through for this call.
	StorageError,
	/// Acquisition failed and the error was returned to the caller.
	Failure,
}
impl PoolEvent {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			PoolEvent::Attempt => "attempt",
			PoolEvent::Hit => "hit",
			PoolEvent::Mint => "mint",
			PoolEvent::Fallback => "fallback",
			PoolEvent::Eviction => "eviction",
			PoolEvent::WriteBack => "write_back",
			PoolEvent::StorageError => "storage_error",
			PoolEvent::Failure => "failure",
		}
	}
}
impl Display for PoolEvent {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
