// std
use std::sync::atomic::{AtomicBool, Ordering};
// self
use oauth2_token_pool::{
	_preludet::*,
	auth::TokenHandle,
	clock::ManualClock,
	issuer::MemoryIssuerConfig,
	pool::{
		AcquireSource, Fingerprint, MemoryPoolStorage, PoolConfig, PoolFuture, PoolStorage,
		StoreError, TokenPool,
	},
};

fn test_pool() -> TestPool {
	build_test_pool(PoolConfig::default()).expect("Default pool fixture should build.")
}

async fn pooled_len(fixture: &TestPool, scope: &str) -> usize {
	fixture
		.pool
		.pooled(&client_credentials_request(scope))
		.await
		.expect("Pool snapshot should load.")
		.len()
}

#[tokio::test]
async fn scenario_a_sequential_calls_fill_the_pool() {
	let fixture = test_pool();
	let request = client_credentials_request("read");

	for expected_len in 1..=3 {
		let acquisition = fixture.pool.acquire(3, &request).await.expect("Acquire should succeed.");

		assert_eq!(acquisition.source, AcquireSource::Minted);
		assert_eq!(pooled_len(&fixture, "read").await, expected_len);

		fixture.clock.advance(Duration::seconds(1));
	}

	assert_eq!(fixture.issuer.mint_count(), 3);
}

#[tokio::test]
async fn scenario_b_full_pool_serves_the_oldest_entry() {
	let fixture = test_pool();
	let request = client_credentials_request("read");
	let mut minted = Vec::new();

	for _ in 0..3 {
		minted.push(fixture.pool.acquire_token(3, &request).await.expect("Acquire should succeed."));
		fixture.clock.advance(Duration::seconds(1));
	}

	let served = fixture.pool.acquire(3, &request).await.expect("Acquire should succeed.");

	assert_eq!(served.source, AcquireSource::Pooled);
	assert_eq!(served.handle.access_token, minted[0].access_token);
	assert_eq!(served.handle.access_created_at, fixture.clock.peek());
	assert_eq!(served.handle.access_deadline(), minted[0].access_deadline());
	assert_eq!(pooled_len(&fixture, "read").await, 3);
	assert_eq!(fixture.issuer.mint_count(), 3);
}

#[tokio::test]
async fn scenario_c_mint_failure_falls_back_to_a_cached_entry() {
	let fixture = test_pool();
	let request = client_credentials_request("read");
	let mut minted = Vec::new();

	for _ in 0..3 {
		minted.push(fixture.pool.acquire_token(3, &request).await.expect("Acquire should succeed."));
		fixture.clock.advance(Duration::seconds(1));
	}

	fixture.issuer.set_available(false);
	fixture.issuer.revoke_access_token(minted[0].access_token.expose());

	// Ask for a bigger pool so the call has to try minting.
	let served = fixture.pool.acquire(4, &request).await.expect("Fallback should succeed.");

	assert_eq!(served.source, AcquireSource::Fallback);
	assert_eq!(served.handle.access_token, minted[1].access_token);
	assert_eq!(pooled_len(&fixture, "read").await, 2);
	assert_eq!(fixture.pool.metrics().fallbacks(), 1);
}

#[tokio::test]
async fn scenario_d_fully_revoked_pool_rebuilds_from_one() {
	let fixture = test_pool();
	let request = client_credentials_request("read");
	let mut minted = Vec::new();

	for _ in 0..3 {
		minted.push(fixture.pool.acquire_token(3, &request).await.expect("Acquire should succeed."));
		fixture.clock.advance(Duration::seconds(1));
	}

	for handle in &minted {
		assert!(fixture.issuer.revoke_access_token(handle.access_token.expose()));
	}

	let rebuilt = fixture.pool.acquire(3, &request).await.expect("Acquire should succeed.");

	assert_eq!(rebuilt.source, AcquireSource::Minted);
	assert!(minted.iter().all(|handle| handle.access_token != rebuilt.handle.access_token));
	assert_eq!(pooled_len(&fixture, "read").await, 1);
	assert_eq!(fixture.pool.metrics().evictions(), 3);
}

#[tokio::test]
async fn out_of_range_sizes_behave_like_ten() {
	for requested in [-5, 0, 10, 11, i64::MAX] {
		let fixture = test_pool();
		let request = client_credentials_request("read");

		for _ in 0..10 {
			let acquisition =
				fixture.pool.acquire(requested, &request).await.expect("Acquire should succeed.");

			assert_eq!(acquisition.source, AcquireSource::Minted, "requested {requested}");

			fixture.clock.advance(Duration::seconds(1));
		}

		let served =
			fixture.pool.acquire(requested, &request).await.expect("Acquire should succeed.");

		assert_eq!(served.source, AcquireSource::Pooled, "requested {requested}");
		assert_eq!(pooled_len(&fixture, "read").await, 10);
	}
}

#[tokio::test]
async fn deadline_stays_put_while_created_at_advances() {
	let fixture = test_pool();
	let request = client_credentials_request("read");
	let first = fixture.pool.acquire_token(1, &request).await.expect("Acquire should succeed.");
	let deadline = first.access_deadline();
	let mut previous = first.access_created_at;

	for _ in 0..5 {
		fixture.clock.advance(Duration::minutes(7));

		let handle = fixture.pool.acquire_token(1, &request).await.expect("Acquire should succeed.");

		assert_eq!(handle.access_token, first.access_token);
		assert_eq!(handle.access_deadline(), deadline);
		assert!(handle.access_created_at > previous);
		assert!(handle.access_created_at <= fixture.clock.peek());
		assert!(handle.access_expires_in.is_positive());

		previous = handle.access_created_at;
	}
}

#[tokio::test]
async fn handles_inside_the_safety_margin_are_purged() {
	let fixture = test_pool();
	let request = client_credentials_request("read");
	let first = fixture.pool.acquire_token(1, &request).await.expect("Acquire should succeed.");

	// Access lifetime is two hours and the margin ten minutes.
	fixture.clock.advance(Duration::minutes(110) - Duration::seconds(1));

	let still_fresh = fixture.pool.acquire(1, &request).await.expect("Acquire should succeed.");

	assert_eq!(still_fresh.source, AcquireSource::Pooled);
	assert_eq!(still_fresh.handle.access_expires_in, Duration::minutes(10) + Duration::seconds(1));

	fixture.clock.advance(Duration::seconds(1));

	let replaced = fixture.pool.acquire(1, &request).await.expect("Acquire should succeed.");
	let pooled = fixture.pool.pooled(&request).await.expect("Pool snapshot should load.");

	assert_eq!(replaced.source, AcquireSource::Minted);
	assert_ne!(replaced.handle.access_token, first.access_token);
	assert_eq!(pooled.len(), 1);
	assert_eq!(pooled[0].access_token, replaced.handle.access_token);
}

#[tokio::test]
async fn distinct_requests_get_distinct_pools() {
	let fixture = test_pool();
	let read = fixture
		.pool
		.acquire_token(1, &client_credentials_request("read"))
		.await
		.expect("Acquire should succeed.");
	let write = fixture
		.pool
		.acquire_token(1, &client_credentials_request("write"))
		.await
		.expect("Acquire should succeed.");

	assert_ne!(read.access_token, write.access_token);
	assert_ne!(
		Fingerprint::of(&client_credentials_request("read")),
		Fingerprint::of(&client_credentials_request("write"))
	);
	assert_eq!(pooled_len(&fixture, "read").await, 1);
	assert_eq!(pooled_len(&fixture, "write").await, 1);
}

#[tokio::test]
async fn concurrent_lookups_keep_survivor_order() {
	let fixture = build_test_pool(PoolConfig::default().with_lookup_concurrency(4))
		.expect("Pool fixture should build.");
	let request = client_credentials_request("read");
	let mut minted = Vec::new();

	for _ in 0..4 {
		minted.push(fixture.pool.acquire_token(4, &request).await.expect("Acquire should succeed."));
		fixture.clock.advance(Duration::seconds(1));
	}

	fixture.issuer.revoke_access_token(minted[1].access_token.expose());

	let served = fixture.pool.acquire(4, &request).await.expect("Acquire should succeed.");
	let pooled = fixture.pool.pooled(&request).await.expect("Pool snapshot should load.");
	let order = pooled.iter().map(|handle| handle.access_token.clone()).collect::<Vec<_>>();

	assert_eq!(served.handle.access_token, minted[0].access_token);
	assert_eq!(
		order,
		[&minted[0], &minted[2], &minted[3]]
			.iter()
			.map(|handle| handle.access_token.clone())
			.collect::<Vec<_>>()
	);
}

#[tokio::test]
async fn refresh_pairs_are_rebased_against_their_own_deadline() {
	let config = MemoryIssuerConfig::default()
		.with_access_ttl(Duration::hours(1))
		.with_refresh_ttl(Duration::hours(3));
	let fixture =
		build_test_pool_with(PoolConfig::default(), config, ManualClock::new(TEST_EPOCH))
			.expect("Pool fixture should build.");
	let request = client_credentials_request("read");
	let first = fixture.pool.acquire_token(1, &request).await.expect("Acquire should succeed.");

	fixture.clock.advance(Duration::minutes(20));

	let second = fixture.pool.acquire_token(1, &request).await.expect("Acquire should succeed.");

	assert_eq!(second.refresh_created_at, fixture.clock.peek());
	assert_eq!(second.refresh_expires_in, Duration::hours(3) - Duration::minutes(20));
	assert_eq!(second.refresh_deadline(), first.refresh_deadline());
}

#[derive(Debug)]
struct FlakyStorage {
	inner: MemoryPoolStorage,
	fail_loads: AtomicBool,
	fail_stores: AtomicBool,
}
impl FlakyStorage {
	fn new(clock: Arc<ManualClock>) -> Self {
		Self {
			inner: MemoryPoolStorage::new(PoolConfig::DEFAULT_ENTRY_TTL, clock),
			fail_loads: AtomicBool::new(false),
			fail_stores: AtomicBool::new(false),
		}
	}

	fn outage() -> StoreError {
		StoreError::Backend { message: "cache node unreachable".into() }
	}
}
impl PoolStorage for FlakyStorage {
	fn load<'a>(&'a self, fingerprint: &'a Fingerprint) -> PoolFuture<'a, Vec<TokenHandle>> {
		if self.fail_loads.load(Ordering::SeqCst) {
			return Box::pin(async { Err(Self::outage()) });
		}

		self.inner.load(fingerprint)
	}

	fn store<'a>(
		&'a self,
		fingerprint: &'a Fingerprint,
		handles: Vec<TokenHandle>,
	) -> PoolFuture<'a, ()> {
		if self.fail_stores.load(Ordering::SeqCst) {
			return Box::pin(async { Err(Self::outage()) });
		}

		self.inner.store(fingerprint, handles)
	}

	fn remove<'a>(&'a self, fingerprint: &'a Fingerprint) -> PoolFuture<'a, ()> {
		self.inner.remove(fingerprint)
	}

	fn purge_expired(&self) -> PoolFuture<'_, usize> {
		self.inner.purge_expired()
	}

	fn clear(&self) -> PoolFuture<'_, ()> {
		self.inner.clear()
	}

	fn entry_count(&self) -> PoolFuture<'_, usize> {
		self.inner.entry_count()
	}
}

#[tokio::test]
async fn storage_failures_degrade_to_pass_through() {
	let fixture = test_pool();
	let storage = Arc::new(FlakyStorage::new(fixture.clock.clone()));
	let pool = TokenPool::with_parts(
		fixture.issuer.clone(),
		storage.clone(),
		fixture.clock.clone(),
		PoolConfig::default(),
	)
	.expect("Pool should build.");
	let request = client_credentials_request("read");

	storage.fail_stores.store(true, Ordering::SeqCst);

	let first = pool.acquire(1, &request).await.expect("Lost write-backs must not fail acquisitions.");

	fixture.clock.advance(Duration::seconds(1));

	let second = pool.acquire(1, &request).await.expect("Acquire should succeed.");

	assert_eq!(first.source, AcquireSource::Minted);
	assert_eq!(second.source, AcquireSource::Minted);
	assert_ne!(first.handle.access_token, second.handle.access_token);

	storage.fail_stores.store(false, Ordering::SeqCst);
	pool.acquire(1, &request).await.expect("Acquire should succeed.");
	storage.fail_loads.store(true, Ordering::SeqCst);
	fixture.clock.advance(Duration::seconds(1));

	let blind = pool.acquire(1, &request).await.expect("Failed loads must not fail acquisitions.");

	assert_eq!(blind.source, AcquireSource::Minted);
	assert_eq!(fixture.issuer.mint_count(), 4);
	assert!(matches!(pool.pooled(&request).await, Err(Error::Storage(StoreError::Backend { .. }))));
}

/// Storage whose `store` parks until the test releases `hold`.
struct GatedStorage {
	inner: MemoryPoolStorage,
	hold: AsyncMutex<()>,
	entered: AtomicBool,
}
impl PoolStorage for GatedStorage {
	fn load<'a>(&'a self, fingerprint: &'a Fingerprint) -> PoolFuture<'a, Vec<TokenHandle>> {
		self.inner.load(fingerprint)
	}

	fn store<'a>(
		&'a self,
		fingerprint: &'a Fingerprint,
		handles: Vec<TokenHandle>,
	) -> PoolFuture<'a, ()> {
		Box::pin(async move {
			self.entered.store(true, Ordering::SeqCst);

			let _released = self.hold.lock().await;

			self.inner.store(fingerprint, handles).await
		})
	}

	fn remove<'a>(&'a self, fingerprint: &'a Fingerprint) -> PoolFuture<'a, ()> {
		self.inner.remove(fingerprint)
	}

	fn purge_expired(&self) -> PoolFuture<'_, usize> {
		self.inner.purge_expired()
	}

	fn clear(&self) -> PoolFuture<'_, ()> {
		self.inner.clear()
	}

	fn entry_count(&self) -> PoolFuture<'_, usize> {
		self.inner.entry_count()
	}
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_waits_for_in_flight_write_backs() {
	let fixture = test_pool();
	let storage = Arc::new(GatedStorage {
		inner: MemoryPoolStorage::new(PoolConfig::DEFAULT_ENTRY_TTL, fixture.clock.clone()),
		hold: AsyncMutex::new(()),
		entered: AtomicBool::new(false),
	});
	let pool = Arc::new(
		TokenPool::with_parts(
			fixture.issuer.clone(),
			storage.clone(),
			fixture.clock.clone(),
			PoolConfig::default(),
		)
		.expect("Pool should build."),
	);
	let held = storage.hold.lock().await;
	let acquiring = {
		let pool = pool.clone();

		tokio::spawn(async move { pool.acquire(1, &client_credentials_request("read")).await })
	};

	while !storage.entered.load(Ordering::SeqCst) {
		tokio::task::yield_now().await;
	}

	let shutting_down = {
		let pool = pool.clone();

		tokio::spawn(async move { pool.shutdown().await })
	};

	while !pool.is_closed() {
		tokio::task::yield_now().await;
	}

	tokio::time::sleep(std::time::Duration::from_millis(20)).await;

	assert!(!shutting_down.is_finished());

	drop(held);

	let acquisition = acquiring
		.await
		.expect("Acquire task should not panic.")
		.expect("In-flight acquisition should still return its handle.");

	shutting_down.await.expect("Shutdown task should not panic.").expect("Shutdown should succeed.");

	assert_eq!(acquisition.source, AcquireSource::Minted);
	assert_eq!(storage.entry_count().await.expect("Entry count should load."), 0);
	assert!(matches!(
		pool.acquire(1, &client_credentials_request("read")).await,
		Err(Error::Closed)
	));
}
