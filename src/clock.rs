//! Time sources shared by the pool, pool storage, and the in-memory issuer.

// self
use crate::_prelude::*;

/// Source of "now" for freshness checks and TTL bookkeeping.
pub trait Clock
where
	Self: Send + Sync,
{
	/// Returns the current instant.
	fn now(&self) -> OffsetDateTime;
}

/// Wall clock backed by [`OffsetDateTime::now_utc`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;
impl Clock for SystemClock {
	fn now(&self) -> OffsetDateTime {
		OffsetDateTime::now_utc()
	}
}

/// Hand-driven clock for tests and simulations.
///
/// With a non-zero tick every [`Clock::now`] read returns the current instant and then
/// moves it forward by the tick, so consecutive readers always observe strictly
/// increasing instants.
#[derive(Debug)]
pub struct ManualClock {
	current: Mutex<OffsetDateTime>,
	tick: Duration,
}
impl ManualClock {
	/// Creates a frozen clock starting at `start`.
	pub fn new(start: OffsetDateTime) -> Self {
		Self { current: Mutex::new(start), tick: Duration::ZERO }
	}

	/// Advances the clock by `tick` after every read.
	pub fn with_tick(mut self, tick: Duration) -> Self {
		self.tick = if tick.is_negative() { Duration::ZERO } else { tick };

		self
	}

	/// Moves the clock forward (or backward, for negative durations).
	pub fn advance(&self, by: Duration) {
		*self.current.lock() += by;
	}

	/// Jumps to an absolute instant.
	pub fn set(&self, instant: OffsetDateTime) {
		*self.current.lock() = instant;
	}

	/// Reads the current instant without applying the tick.
	pub fn peek(&self) -> OffsetDateTime {
		*self.current.lock()
	}
}
impl Clock for ManualClock {
	fn now(&self) -> OffsetDateTime {
		let mut current = self.current.lock();
		let now = *current;

		*current = now + self.tick;

		now
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	#[test]
	fn manual_clock_is_frozen_without_tick() {
		let clock = ManualClock::new(macros::datetime!(2025-06-01 08:00 UTC));

		assert_eq!(clock.now(), clock.now());

		clock.advance(Duration::minutes(5));

		assert_eq!(clock.now(), macros::datetime!(2025-06-01 08:05 UTC));
	}

	#[test]
	fn ticking_clock_strictly_advances() {
		let clock = ManualClock::new(macros::datetime!(2025-06-01 08:00 UTC))
			.with_tick(Duration::milliseconds(1));
		let first = clock.now();
		let second = clock.now();

		assert!(second > first);
		assert_eq!(clock.peek(), macros::datetime!(2025-06-01 08:00:00.002 UTC));
	}
}
