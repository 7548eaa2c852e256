//! Bounded OAuth 2.0 token pools - fingerprinted request reuse, freshness re-basing, and
//! singleflight refills in front of any token issuer.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod clock;
pub mod endpoint;
pub mod error;
pub mod issuer;
pub mod obs;
pub mod pool;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and fixtures for integration tests; enabled via `cfg(test)` or
	//! the `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		auth::{GrantType, TokenRequest},
		clock::ManualClock,
		issuer::{MemoryIssuer, MemoryIssuerConfig},
		pool::{MemoryPoolStorage, PoolConfig, TokenPool},
	};

	/// Client registered with every fixture issuer.
	pub const TEST_CLIENT_ID: &str = "svc";
	/// Secret of [`TEST_CLIENT_ID`].
	pub const TEST_CLIENT_SECRET: &str = "s3cret";
	/// Instant every fixture clock starts at.
	pub const TEST_EPOCH: OffsetDateTime = time::macros::datetime!(2025-01-01 00:00 UTC);

	/// Pool wired to a manual clock, an in-memory issuer, and in-memory storage.
	#[derive(Debug)]
	pub struct TestPool {
		/// Clock shared by the pool, its storage, and the issuer.
		pub clock: Arc<ManualClock>,
		/// Issuer behind the pool.
		pub issuer: Arc<MemoryIssuer>,
		/// Storage behind the pool.
		pub storage: Arc<MemoryPoolStorage>,
		/// Pool under test.
		pub pool: Arc<TokenPool>,
	}

	/// Builds a [`TestPool`] whose clock only moves when the test advances it.
	pub fn build_test_pool(config: PoolConfig) -> Result<TestPool> {
		build_test_pool_with(config, MemoryIssuerConfig::default(), ManualClock::new(TEST_EPOCH))
	}

	/// Builds a [`TestPool`] from explicit issuer settings and clock.
	pub fn build_test_pool_with(
		config: PoolConfig,
		issuer_config: MemoryIssuerConfig,
		clock: ManualClock,
	) -> Result<TestPool> {
		let clock = Arc::new(clock);
		let issuer = Arc::new(
			MemoryIssuer::new(issuer_config, clock.clone())
				.with_client(TEST_CLIENT_ID, TEST_CLIENT_SECRET)
				.with_user("alice", "wonderland", "user-1"),
		);
		let storage = Arc::new(MemoryPoolStorage::new(config.entry_ttl, clock.clone()));
		let pool = TokenPool::with_parts(issuer.clone(), storage.clone(), clock.clone(), config)?;

		Ok(TestPool { clock, issuer, storage, pool: Arc::new(pool) })
	}

	/// Client credentials request for the fixture client.
	pub fn client_credentials_request(scope: &str) -> TokenRequest {
		TokenRequest::new(GrantType::ClientCredentials, TEST_CLIENT_ID)
			.with_client_secret(TEST_CLIENT_SECRET)
			.with_scope(scope)
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::{Mutex as AsyncMutex, RwLock as AsyncRwLock};
	pub use parking_lot::{Mutex, RwLock};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use url;
#[cfg(test)] use color_eyre as _;
