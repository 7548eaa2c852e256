// crates.io
use tokio::task::JoinSet;
// self
use oauth2_token_pool::{
	_preludet::*,
	auth::TokenHandle,
	clock::ManualClock,
	issuer::MemoryIssuerConfig,
	pool::{Fingerprint, PoolConfig, PoolStorage},
};

const CALLERS: usize = 16;

fn ticking_pool() -> TestPool {
	let clock = ManualClock::new(TEST_EPOCH).with_tick(Duration::milliseconds(1));

	build_test_pool_with(PoolConfig::default(), MemoryIssuerConfig::default(), clock)
		.expect("Ticking pool fixture should build.")
}

async fn join_all(mut set: JoinSet<Result<TokenHandle>>) -> Vec<TokenHandle> {
	let mut handles = Vec::new();

	while let Some(joined) = set.join_next().await {
		handles.push(
			joined.expect("Acquire task should not panic.").expect("Acquire should succeed."),
		);
	}

	handles
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_share_a_single_mint() {
	let fixture = ticking_pool();
	let mut set = JoinSet::new();

	for _ in 0..CALLERS {
		let pool = fixture.pool.clone();

		set.spawn(async move { pool.acquire_token(1, &client_credentials_request("read")).await });
	}

	let handles = join_all(set).await;

	assert_eq!(handles.len(), CALLERS);
	assert_eq!(fixture.issuer.mint_count(), 1);
	assert!(handles.iter().all(|handle| handle.access_token == handles[0].access_token));
	assert!(handles.iter().all(|handle| handle.access_expires_in.is_positive()));

	let pooled = fixture
		.pool
		.pooled(&client_credentials_request("read"))
		.await
		.expect("Pool snapshot should load.");

	assert_eq!(pooled.len(), 1);
	assert_eq!(pooled[0].access_token, handles[0].access_token);
	assert_eq!(fixture.pool.metrics().mints(), 1);
	assert_eq!(fixture.pool.metrics().hits(), (CALLERS - 1) as u64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_fill_a_larger_pool_without_orphans() {
	let fixture = ticking_pool();
	let mut set = JoinSet::new();

	for _ in 0..CALLERS {
		let pool = fixture.pool.clone();

		set.spawn(async move { pool.acquire_token(4, &client_credentials_request("read")).await });
	}

	let handles = join_all(set).await;
	let pooled = fixture
		.pool
		.pooled(&client_credentials_request("read"))
		.await
		.expect("Pool snapshot should load.");

	// Every minted token is reachable from the pool.
	assert_eq!(fixture.issuer.mint_count(), 4);
	assert_eq!(pooled.len(), 4);
	assert!(handles.iter().all(|handle| {
		pooled.iter().any(|pooled| pooled.access_token == handle.access_token)
	}));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn independent_fingerprints_do_not_block_each_other() {
	let fixture = ticking_pool();
	let scopes = ["a", "b", "c", "d"];
	let mut set = JoinSet::new();

	for round in 0..CALLERS {
		let pool = fixture.pool.clone();
		let scope = scopes[round % scopes.len()];

		set.spawn(async move { pool.acquire_token(1, &client_credentials_request(scope)).await });
	}

	join_all(set).await;

	assert_eq!(fixture.issuer.mint_count(), scopes.len() as u64);
	assert_eq!(
		fixture.storage.entry_count().await.expect("Entry count should load."),
		scopes.len()
	);

	for scope in scopes {
		let fingerprint = Fingerprint::of(&client_credentials_request(scope));
		let entry = fixture.storage.load(&fingerprint).await.expect("Entry should load.");

		assert_eq!(entry.len(), 1, "scope {scope}");
	}
}
