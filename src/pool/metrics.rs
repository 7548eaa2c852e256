// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing how acquisitions were served.
#[derive(Debug, Default)]
pub struct PoolMetrics {
	acquisitions: AtomicU64,
	hits: AtomicU64,
	mints: AtomicU64,
	fallbacks: AtomicU64,
	evictions: AtomicU64,
	write_backs: AtomicU64,
	failures: AtomicU64,
}
impl PoolMetrics {
	/// Total acquisitions attempted.
	pub fn acquisitions(&self) -> u64 {
		self.acquisitions.load(Ordering::Relaxed)
	}

	/// Acquisitions served from the pool because it was at target.
	pub fn hits(&self) -> u64 {
		self.hits.load(Ordering::Relaxed)
	}

	/// Tokens minted through the issuer.
	pub fn mints(&self) -> u64 {
		self.mints.load(Ordering::Relaxed)
	}

	/// Acquisitions served from the pool after the issuer failed to mint.
	pub fn fallbacks(&self) -> u64 {
		self.fallbacks.load(Ordering::Relaxed)
	}

	/// Handles dropped during re-validation.
	pub fn evictions(&self) -> u64 {
		self.evictions.load(Ordering::Relaxed)
	}

	/// Pool entries written back to storage.
	pub fn write_backs(&self) -> u64 {
		self.write_backs.load(Ordering::Relaxed)
	}

	/// Acquisitions that returned an error.
	pub fn failures(&self) -> u64 {
		self.failures.load(Ordering::Relaxed)
	}

	pub(crate) fn record_acquisition(&self) {
		self.acquisitions.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_hit(&self) {
		self.hits.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_mint(&self) {
		self.mints.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_fallback(&self) {
		self.fallbacks.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_eviction(&self) {
		self.evictions.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_write_back(&self) {
		self.write_backs.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_failure(&self) {
		self.failures.fetch_add(1, Ordering::Relaxed);
	}
}
