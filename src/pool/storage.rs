//! Storage contract for pool entries plus the built-in in-process backend.

pub mod memory;

pub use memory::MemoryPoolStorage;

// self
use crate::{_prelude::*, auth::TokenHandle, pool::Fingerprint};

/// Boxed future returned by [`PoolStorage`] operations.
pub type PoolFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Backend contract for pool entries keyed by [`Fingerprint`].
///
/// Every operation is atomic on its own; callers that need read-modify-write atomicity
/// serialize through the pool's per-fingerprint guard.
pub trait PoolStorage
where
	Self: Send + Sync,
{
	/// Reads the entry for the fingerprint, oldest handle first. Absent or TTL-expired
	/// entries read as an empty list.
	fn load<'a>(&'a self, fingerprint: &'a Fingerprint) -> PoolFuture<'a, Vec<TokenHandle>>;

	/// Replaces the entry and restarts its TTL. An empty list removes the entry.
	fn store<'a>(
		&'a self,
		fingerprint: &'a Fingerprint,
		handles: Vec<TokenHandle>,
	) -> PoolFuture<'a, ()>;

	/// Drops the entry, if any.
	fn remove<'a>(&'a self, fingerprint: &'a Fingerprint) -> PoolFuture<'a, ()>;

	/// Drops every TTL-expired entry and reports how many were removed.
	fn purge_expired(&self) -> PoolFuture<'_, usize>;

	/// Drops every entry.
	fn clear(&self) -> PoolFuture<'_, ()>;

	/// Number of live (non-expired) entries.
	fn entry_count(&self) -> PoolFuture<'_, usize>;
}

/// Error type produced by [`PoolStorage`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Entry could not be encoded or decoded by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn store_error_messages_are_sentences() {
		let err = StoreError::Serialization { message: "truncated entry".into() };

		assert_eq!(err.to_string(), "Serialization error: truncated entry.");

		let payload = serde_json::to_string(&err).expect("Store error should serialize to JSON.");
		let round_trip: StoreError =
			serde_json::from_str(&payload).expect("Store error should deserialize from JSON.");

		assert_eq!(round_trip, err);
	}
}
