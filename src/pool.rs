//! Bounded multi-token pool that sits between repeated identical token requests and the
//! issuer.
//!
//! Each validated [`TokenRequest`] is reduced to a [`Fingerprint`]. The entry stored under
//! that fingerprint holds up to `max_pool_size` handles, oldest first. An acquisition
//! re-validates every pooled handle against the issuer and the [`FreshnessValidator`], then
//! either serves the oldest survivor (pool at target) or mints one more token and serves
//! that. If minting fails, a survivor stands in.
//!
//! Acquisitions for the same fingerprint are serialized by a per-fingerprint async mutex, so
//! at most one mint is in flight per fingerprint and write-backs never overwrite each other.

pub mod config;
pub mod fingerprint;
pub mod freshness;
mod metrics;
pub mod storage;

pub use config::*;
pub use fingerprint::*;
pub use freshness::*;
pub use metrics::*;
pub use storage::*;

// std
use std::sync::atomic::{AtomicBool, Ordering};
// crates.io
use futures::stream::{self, StreamExt};
// self
use crate::{
	_prelude::*,
	auth::{TokenHandle, TokenRequest},
	clock::{Clock, SystemClock},
	issuer::Issuer,
	obs::{self, PoolEvent, PoolSpan},
};

type GuardMap = Arc<Mutex<HashMap<Fingerprint, Arc<AsyncMutex<()>>>>>;

/// Where an acquired handle came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AcquireSource {
	/// Oldest survivor of a pool that was already at target.
	Pooled,
	/// Freshly minted by the issuer and appended to the pool.
	Minted,
	/// Survivor served because the issuer failed to mint.
	Fallback,
}
impl AcquireSource {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			AcquireSource::Pooled => "pooled",
			AcquireSource::Minted => "minted",
			AcquireSource::Fallback => "fallback",
		}
	}
}

/// Result of [`TokenPool::acquire`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Acquisition {
	/// Handle to hand to the client.
	pub handle: TokenHandle,
	/// How the handle was obtained.
	pub source: AcquireSource,
}

/// Token pool cache in front of an [`Issuer`].
pub struct TokenPool {
	issuer: Arc<dyn Issuer>,
	storage: Arc<dyn PoolStorage>,
	clock: Arc<dyn Clock>,
	config: PoolConfig,
	validator: FreshnessValidator,
	metrics: Arc<PoolMetrics>,
	guards: GuardMap,
	closed: AtomicBool,
	write_gate: AsyncRwLock<()>,
	last_sweep: Mutex<OffsetDateTime>,
}
impl TokenPool {
	/// Builds a pool backed by [`MemoryPoolStorage`] and the system clock.
	pub fn new(issuer: Arc<dyn Issuer>, config: PoolConfig) -> Result<Self> {
		let clock: Arc<dyn Clock> = Arc::new(SystemClock);
		let storage = Arc::new(MemoryPoolStorage::new(config.entry_ttl, clock.clone()));

		Self::with_parts(issuer, storage, clock, config)
	}

	/// Builds a pool from explicit collaborators after validating the configuration.
	pub fn with_parts(
		issuer: Arc<dyn Issuer>,
		storage: Arc<dyn PoolStorage>,
		clock: Arc<dyn Clock>,
		config: PoolConfig,
	) -> Result<Self> {
		config.validate()?;

		let last_sweep = Mutex::new(clock.now());

		Ok(Self {
			issuer,
			storage,
			clock,
			validator: FreshnessValidator::new(config.safety_margin),
			config,
			metrics: Default::default(),
			guards: Default::default(),
			closed: AtomicBool::new(false),
			write_gate: AsyncRwLock::new(()),
			last_sweep,
		})
	}

	/// Active configuration.
	pub fn config(&self) -> &PoolConfig {
		&self.config
	}

	/// Counters describing how acquisitions were served.
	pub fn metrics(&self) -> Arc<PoolMetrics> {
		self.metrics.clone()
	}

	/// Returns `true` once [`TokenPool::shutdown`] ran.
	pub fn is_closed(&self) -> bool {
		self.closed.load(Ordering::Acquire)
	}

	/// Returns one usable token for the request, pooling up to `desired_pool_size` of them.
	pub async fn acquire_token(
		&self,
		desired_pool_size: i64,
		request: &TokenRequest,
	) -> Result<TokenHandle> {
		self.acquire(desired_pool_size, request).await.map(|acquisition| acquisition.handle)
	}

	/// Same as [`TokenPool::acquire_token`] but also reports where the handle came from.
	///
	/// Sizes `<= 0` or above `max_pool_size` are treated as `max_pool_size`.
	pub async fn acquire(
		&self,
		desired_pool_size: i64,
		request: &TokenRequest,
	) -> Result<Acquisition> {
		let fingerprint = Fingerprint::of(request);
		let span = PoolSpan::new("acquire", &fingerprint);

		span.instrument(self.acquire_guarded(desired_pool_size, request, &fingerprint)).await
	}

	/// Snapshot of the handles currently pooled for the request, oldest first.
	pub async fn pooled(&self, request: &TokenRequest) -> Result<Vec<TokenHandle>> {
		Ok(self.storage.load(&Fingerprint::of(request)).await?)
	}

	/// Purges expired storage entries and idle guards now; returns the purged entry count.
	pub async fn sweep(&self) -> Result<usize> {
		*self.last_sweep.lock() = self.clock.now();

		let purged = self.storage.purge_expired().await?;

		self.prune_guards();

		Ok(purged)
	}

	/// Stops serving acquisitions and drops every pooled entry.
	///
	/// Acquisitions already holding their fingerprint guard still return their handle, but
	/// nothing they write back survives: the storage is cleared only after every in-flight
	/// write-back finished, and later write-backs are skipped. Later acquisitions return
	/// [`Error::Closed`].
	pub async fn shutdown(&self) -> Result<()> {
		self.closed.store(true, Ordering::Release);

		let _drained = self.write_gate.write().await;

		self.storage.clear().await?;
		self.guards.lock().clear();

		Ok(())
	}

	async fn acquire_guarded(
		&self,
		desired_pool_size: i64,
		request: &TokenRequest,
		fingerprint: &Fingerprint,
	) -> Result<Acquisition> {
		self.observe(PoolEvent::Attempt, request.grant_type.as_str());

		if self.is_closed() {
			return Err(self.fail(Error::Closed));
		}

		self.maybe_sweep().await;

		let target = self.config.normalize_pool_size(desired_pool_size);
		let guard = self.guard_for(fingerprint);
		let _held = guard.lock().await;

		if self.is_closed() {
			return Err(self.fail(Error::Closed));
		}

		let stored = match self.storage.load(fingerprint).await {
			Ok(stored) => stored,
			Err(e) => {
				self.observe(PoolEvent::StorageError, &e.to_string());

				Vec::new()
			},
		};
		let stored_len = stored.len();
		let mut survivors = self.revalidate(stored).await;
		let dirty = survivors.len() != stored_len;

		if !survivors.is_empty() && stored_len >= target {
			if dirty {
				self.write_back(fingerprint, survivors.clone()).await;
			}

			self.observe(PoolEvent::Hit, "pool at target");

			return Ok(Acquisition { handle: survivors.swap_remove(0), source: AcquireSource::Pooled });
		}

		match self.issuer.mint(request.grant_type, request).await {
			Ok(minted) => {
				self.observe(PoolEvent::Mint, request.grant_type.as_str());
				survivors.push(minted.clone());
				self.write_back(fingerprint, survivors).await;

				Ok(Acquisition { handle: minted, source: AcquireSource::Minted })
			},
			Err(e) if !survivors.is_empty() => {
				if dirty {
					self.write_back(fingerprint, survivors.clone()).await;
				}

				self.observe(PoolEvent::Fallback, &e.to_string());

				Ok(Acquisition { handle: survivors.swap_remove(0), source: AcquireSource::Fallback })
			},
			Err(e) => Err(self.fail(e.into())),
		}
	}

	/// Looks every handle up at the issuer and re-bases the issuer's copy; keeps stored order.
	async fn revalidate(&self, stored: Vec<TokenHandle>) -> Vec<TokenHandle> {
		let issuer = &self.issuer;
		let looked_up = stream::iter(stored)
			.map(|handle| async move { issuer.load_access_token(handle.access_token.expose()).await })
			.buffered(self.config.lookup_concurrency)
			.collect::<Vec<_>>()
			.await;
		let now = self.clock.now();
		let mut survivors = Vec::with_capacity(looked_up.len());

		for lookup in looked_up {
			let tracked = match lookup {
				Ok(tracked) => tracked,
				Err(e) => {
					self.observe(PoolEvent::Eviction, &e.to_string());

					continue;
				},
			};

			match self.validator.revalidate(tracked, now) {
				Ok(rebased) => survivors.push(rebased),
				Err(staleness) => self.observe(PoolEvent::Eviction, staleness.as_str()),
			}
		}

		survivors
	}

	async fn write_back(&self, fingerprint: &Fingerprint, mut handles: Vec<TokenHandle>) {
		let _open = self.write_gate.read().await;

		if self.is_closed() {
			return;
		}

		let overflow = handles.len().saturating_sub(self.config.max_pool_size);

		handles.drain(..overflow);

		match self.storage.store(fingerprint, handles).await {
			Ok(()) => self.observe(PoolEvent::WriteBack, ""),
			Err(e) => self.observe(PoolEvent::StorageError, &e.to_string()),
		}
	}

	async fn maybe_sweep(&self) {
		let now = self.clock.now();

		{
			let mut last_sweep = self.last_sweep.lock();

			if now - *last_sweep < self.config.sweep_interval {
				return;
			}

			*last_sweep = now;
		}

		if let Err(e) = self.storage.purge_expired().await {
			self.observe(PoolEvent::StorageError, &e.to_string());
		}

		self.prune_guards();
	}

	fn guard_for(&self, fingerprint: &Fingerprint) -> Arc<AsyncMutex<()>> {
		let mut guards = self.guards.lock();

		guards.entry(fingerprint.to_owned()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
	}

	fn prune_guards(&self) {
		self.guards.lock().retain(|_, guard| Arc::strong_count(guard) > 1);
	}

	fn fail(&self, error: Error) -> Error {
		self.observe(PoolEvent::Failure, &error.to_string());

		error
	}

	fn observe(&self, event: PoolEvent, detail: &str) {
		match event {
			PoolEvent::Attempt => self.metrics.record_acquisition(),
			PoolEvent::Hit => self.metrics.record_hit(),
			PoolEvent::Mint => self.metrics.record_mint(),
			PoolEvent::Fallback => self.metrics.record_fallback(),
			PoolEvent::Eviction => self.metrics.record_eviction(),
			PoolEvent::WriteBack => self.metrics.record_write_back(),
			PoolEvent::Failure => self.metrics.record_failure(),
			PoolEvent::StorageError => {},
		}

		obs::record_pool_event(event);
		obs::trace_pool_event(event, detail);
	}
}
impl Debug for TokenPool {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.debug_struct("TokenPool")
			.field("config", &self.config)
			.field("closed", &self.is_closed())
			.field("guards", &self.guards.lock().len())
			.finish()
	}
}
