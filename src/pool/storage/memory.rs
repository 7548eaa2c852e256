//! Thread-safe in-memory [`PoolStorage`] with a coarse per-entry TTL.

// self
use crate::{
	_prelude::*,
	auth::TokenHandle,
	clock::{Clock, SystemClock},
	pool::{
		Fingerprint, PoolConfig,
		storage::{PoolFuture, PoolStorage, StoreError},
	},
};

type SlotMap = Arc<RwLock<HashMap<Fingerprint, Slot>>>;

#[derive(Clone, Debug)]
struct Slot {
	handles: Vec<TokenHandle>,
	expires_at: OffsetDateTime,
}
impl Slot {
	fn is_live_at(&self, now: OffsetDateTime) -> bool {
		now < self.expires_at
	}
}

/// Process-local pool storage.
///
/// Entries expire `ttl` after their last write regardless of the freshness of the
/// handles they hold; expired entries read as absent until a purge removes them.
#[derive(Clone)]
pub struct MemoryPoolStorage {
	slots: SlotMap,
	ttl: Duration,
	clock: Arc<dyn Clock>,
}
impl MemoryPoolStorage {
	/// Creates an empty storage with the given entry TTL and time source.
	pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
		Self { slots: Default::default(), ttl, clock }
	}

	/// Entry TTL applied on every store.
	pub fn ttl(&self) -> Duration {
		self.ttl
	}

	fn load_now(&self, fingerprint: &Fingerprint) -> Vec<TokenHandle> {
		let now = self.clock.now();

		match self.slots.read().get(fingerprint) {
			Some(slot) if slot.is_live_at(now) => slot.handles.clone(),
			_ => Vec::new(),
		}
	}

	fn store_now(&self, fingerprint: &Fingerprint, handles: Vec<TokenHandle>) {
		if handles.is_empty() {
			self.slots.write().remove(fingerprint);

			return;
		}

		let expires_at = self.clock.now().saturating_add(self.ttl);

		self.slots.write().insert(fingerprint.to_owned(), Slot { handles, expires_at });
	}

	fn purge_now(&self) -> usize {
		let now = self.clock.now();
		let mut slots = self.slots.write();
		let before = slots.len();

		slots.retain(|_, slot| slot.is_live_at(now));

		before - slots.len()
	}

	fn count_now(&self) -> usize {
		let now = self.clock.now();

		self.slots.read().values().filter(|slot| slot.is_live_at(now)).count()
	}
}
impl Default for MemoryPoolStorage {
	fn default() -> Self {
		Self::new(PoolConfig::DEFAULT_ENTRY_TTL, Arc::new(SystemClock))
	}
}
impl Debug for MemoryPoolStorage {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.debug_struct("MemoryPoolStorage")
			.field("entries", &self.slots.read().len())
			.field("ttl", &self.ttl)
			.finish()
	}
}
impl PoolStorage for MemoryPoolStorage {
	fn load<'a>(&'a self, fingerprint: &'a Fingerprint) -> PoolFuture<'a, Vec<TokenHandle>> {
		Box::pin(async move { Ok(self.load_now(fingerprint)) })
	}

	fn store<'a>(
		&'a self,
		fingerprint: &'a Fingerprint,
		handles: Vec<TokenHandle>,
	) -> PoolFuture<'a, ()> {
		Box::pin(async move {
			self.store_now(fingerprint, handles);

			Ok::<_, StoreError>(())
		})
	}

	fn remove<'a>(&'a self, fingerprint: &'a Fingerprint) -> PoolFuture<'a, ()> {
		Box::pin(async move {
			self.slots.write().remove(fingerprint);

			Ok(())
		})
	}

	fn purge_expired(&self) -> PoolFuture<'_, usize> {
		Box::pin(async move { Ok(self.purge_now()) })
	}

	fn clear(&self) -> PoolFuture<'_, ()> {
		Box::pin(async move {
			self.slots.write().clear();

			Ok(())
		})
	}

	fn entry_count(&self) -> PoolFuture<'_, usize> {
		Box::pin(async move { Ok(self.count_now()) })
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;
	use crate::clock::ManualClock;

	fn handle(token: &str, issued: OffsetDateTime) -> TokenHandle {
		TokenHandle::builder("svc")
			.access_token(token)
			.issued_at(issued)
			.access_expires_in(Duration::hours(2))
			.build()
			.expect("Handle fixture should build.")
	}

	fn key(client: &str) -> Fingerprint {
		Fingerprint::from_fields([client, "", "", "", "", "", "", "", ""])
	}

	#[tokio::test]
	async fn store_then_load_preserves_order() {
		let start = macros::datetime!(2025-01-01 00:00 UTC);
		let clock = Arc::new(ManualClock::new(start));
		let storage = MemoryPoolStorage::new(Duration::days(7), clock);
		let fingerprint = key("svc");

		storage
			.store(&fingerprint, vec![handle("a", start), handle("b", start)])
			.await
			.expect("Store should succeed.");

		let loaded = storage.load(&fingerprint).await.expect("Load should succeed.");
		let tokens = loaded.iter().map(|h| h.access_token.expose()).collect::<Vec<_>>();

		assert_eq!(tokens, ["a", "b"]);
		assert!(storage.load(&key("other")).await.expect("Load should succeed.").is_empty());
	}

	#[tokio::test]
	async fn empty_store_removes_the_entry() {
		let start = macros::datetime!(2025-01-01 00:00 UTC);
		let storage = MemoryPoolStorage::new(Duration::days(7), Arc::new(ManualClock::new(start)));
		let fingerprint = key("svc");

		storage.store(&fingerprint, vec![handle("a", start)]).await.expect("Store should succeed.");

		assert_eq!(storage.entry_count().await.expect("Count should succeed."), 1);

		storage.store(&fingerprint, Vec::new()).await.expect("Empty store should succeed.");

		assert_eq!(storage.entry_count().await.expect("Count should succeed."), 0);
	}

	#[tokio::test]
	async fn expired_entries_read_as_absent_until_purged() {
		let start = macros::datetime!(2025-01-01 00:00 UTC);
		let clock = Arc::new(ManualClock::new(start));
		let storage = MemoryPoolStorage::new(Duration::minutes(5), clock.clone());

		storage.store(&key("old"), vec![handle("a", start)]).await.expect("Store should succeed.");
		clock.advance(Duration::minutes(4));
		storage
			.store(&key("new"), vec![handle("b", clock.peek())])
			.await
			.expect("Store should succeed.");
		clock.advance(Duration::minutes(1));

		assert!(storage.load(&key("old")).await.expect("Load should succeed.").is_empty());
		assert_eq!(storage.load(&key("new")).await.expect("Load should succeed.").len(), 1);
		assert_eq!(storage.entry_count().await.expect("Count should succeed."), 1);
		assert_eq!(storage.purge_expired().await.expect("Purge should succeed."), 1);
		assert_eq!(storage.purge_expired().await.expect("Purge should succeed."), 0);
	}

	#[tokio::test]
	async fn rewrites_restart_the_ttl() {
		let start = macros::datetime!(2025-01-01 00:00 UTC);
		let clock = Arc::new(ManualClock::new(start));
		let storage = MemoryPoolStorage::new(Duration::minutes(5), clock.clone());
		let fingerprint = key("svc");

		storage.store(&fingerprint, vec![handle("a", start)]).await.expect("Store should succeed.");
		clock.advance(Duration::minutes(4));
		storage.store(&fingerprint, vec![handle("a", start)]).await.expect("Store should succeed.");
		clock.advance(Duration::minutes(4));

		assert_eq!(storage.load(&fingerprint).await.expect("Load should succeed.").len(), 1);

		storage.remove(&fingerprint).await.expect("Remove should succeed.");

		assert!(storage.load(&fingerprint).await.expect("Load should succeed.").is_empty());
	}
}
