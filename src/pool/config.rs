//! Pool tuning knobs with serde support (durations are whole seconds on the wire).

// self
use crate::{_prelude::*, error::ConfigError, pool::freshness::FreshnessValidator};

/// Hard ceiling on the number of handles kept per fingerprint.
pub const POOL_SIZE_CEILING: usize = 10;

/// Configuration for a [`TokenPool`](crate::pool::TokenPool).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolConfig {
	/// Largest pool a request may ask for; also the size used for out-of-range requests.
	pub max_pool_size: usize,
	/// Buffer subtracted from a token's access deadline before it stops being served.
	#[serde(rename = "safety_margin_secs", with = "seconds")]
	pub safety_margin: Duration,
	/// Coarse storage TTL for a whole pool entry, refreshed on every write-back.
	#[serde(rename = "entry_ttl_secs", with = "seconds")]
	pub entry_ttl: Duration,
	/// Minimum spacing between opportunistic sweeps of expired entries.
	#[serde(rename = "sweep_interval_secs", with = "seconds")]
	pub sweep_interval: Duration,
	/// Number of issuer lookups allowed in flight while re-validating one entry.
	pub lookup_concurrency: usize,
}
impl PoolConfig {
	/// Default storage TTL (7 days).
	pub const DEFAULT_ENTRY_TTL: Duration = Duration::days(7);
	/// Default sweep spacing (30 minutes).
	pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::minutes(30);

	/// Parses and validates a JSON configuration document.
	pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
		let de = &mut serde_json::Deserializer::from_str(json);
		let config: Self =
			serde_path_to_error::deserialize(de).map_err(|source| ConfigError::Parse { source })?;

		config.validate()?;

		Ok(config)
	}

	/// Overrides the maximum pool size.
	pub fn with_max_pool_size(mut self, size: usize) -> Self {
		self.max_pool_size = size;

		self
	}

	/// Overrides the freshness safety margin.
	pub fn with_safety_margin(mut self, margin: Duration) -> Self {
		self.safety_margin = margin;

		self
	}

	/// Overrides the storage TTL.
	pub fn with_entry_ttl(mut self, ttl: Duration) -> Self {
		self.entry_ttl = ttl;

		self
	}

	/// Overrides the sweep spacing.
	pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
		self.sweep_interval = interval;

		self
	}

	/// Overrides the issuer lookup concurrency.
	pub fn with_lookup_concurrency(mut self, concurrency: usize) -> Self {
		self.lookup_concurrency = concurrency;

		self
	}

	/// Checks every field against its allowed range.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if !(1..=POOL_SIZE_CEILING).contains(&self.max_pool_size) {
			return Err(ConfigError::InvalidMaxPoolSize {
				value: self.max_pool_size,
				ceiling: POOL_SIZE_CEILING,
			});
		}
		if self.safety_margin.is_negative() {
			return Err(ConfigError::NegativeDuration { field: "safety_margin" });
		}
		if !self.entry_ttl.is_positive() {
			return Err(ConfigError::NonPositiveDuration { field: "entry_ttl" });
		}
		if self.safety_margin >= self.entry_ttl {
			return Err(ConfigError::SafetyMarginTooLarge {
				margin_secs: self.safety_margin.whole_seconds(),
				entry_ttl_secs: self.entry_ttl.whole_seconds(),
			});
		}
		if !self.sweep_interval.is_positive() {
			return Err(ConfigError::NonPositiveDuration { field: "sweep_interval" });
		}
		if self.lookup_concurrency == 0 {
			return Err(ConfigError::ZeroLookupConcurrency);
		}

		Ok(())
	}

	/// Clamps a requested pool size: anything `<= 0` or above `max_pool_size` becomes
	/// `max_pool_size`.
	pub fn normalize_pool_size(&self, requested: i64) -> usize {
		match usize::try_from(requested) {
			Ok(size) if (1..=self.max_pool_size).contains(&size) => size,
			_ => self.max_pool_size,
		}
	}
}
impl Default for PoolConfig {
	fn default() -> Self {
		Self {
			max_pool_size: POOL_SIZE_CEILING,
			safety_margin: FreshnessValidator::DEFAULT_SAFETY_MARGIN,
			entry_ttl: Self::DEFAULT_ENTRY_TTL,
			sweep_interval: Self::DEFAULT_SWEEP_INTERVAL,
			lookup_concurrency: 1,
		}
	}
}

mod seconds {
	// crates.io
	use serde::{Deserializer, Serializer};
	// self
	use crate::_prelude::*;

	pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_i64(value.whole_seconds())
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
	where
		D: Deserializer<'de>,
	{
		i64::deserialize(deserializer).map(Duration::seconds)
	}
}
