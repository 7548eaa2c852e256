//! Freshness checks that decide whether a pooled token may be served again, and the
//! re-basing of its time fields against "now".

// self
use crate::{_prelude::*, auth::TokenHandle};

/// Reason a pooled handle was judged unusable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, ThisError)]
pub enum Staleness {
	/// The evaluation instant is at or before the access created-at instant.
	#[error("Access token is not valid yet at the evaluation instant.")]
	NotYetValid,
	/// The access deadline falls within the safety margin (or has passed).
	#[error("Access token expires within the safety margin.")]
	WithinSafetyMargin,
	/// The refresh token carried by the handle has expired.
	#[error("Refresh token has expired.")]
	RefreshExpired,
	/// A deadline cannot be represented.
	#[error("Token lifetime overflows the calendar.")]
	Overflow,
}
impl Staleness {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Staleness::NotYetValid => "not_yet_valid",
			Staleness::WithinSafetyMargin => "within_safety_margin",
			Staleness::RefreshExpired => "refresh_expired",
			Staleness::Overflow => "overflow",
		}
	}
}

/// Decides whether a handle is still usable and re-bases its time fields.
///
/// A handle is usable at `now` iff `access_created_at < now < deadline - safety_margin`.
/// Re-basing moves `access_created_at` to `now` and shrinks `access_expires_in` by the
/// same amount; the refresh pair is re-based against its own deadline. Neither deadline
/// moves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FreshnessValidator {
	safety_margin: Duration,
}
impl FreshnessValidator {
	/// Default buffer subtracted from the access deadline.
	pub const DEFAULT_SAFETY_MARGIN: Duration = Duration::minutes(10);

	/// Creates a validator; negative margins are treated as zero.
	pub fn new(safety_margin: Duration) -> Self {
		Self {
			safety_margin: if safety_margin.is_negative() { Duration::ZERO } else { safety_margin },
		}
	}

	/// Configured safety margin.
	pub fn safety_margin(&self) -> Duration {
		self.safety_margin
	}

	/// Classifies the handle at `now` without touching it.
	pub fn check(&self, handle: &TokenHandle, now: OffsetDateTime) -> Result<(), Staleness> {
		let deadline = handle.access_deadline().ok_or(Staleness::Overflow)?;
		let safe_expiry = deadline.checked_sub(self.safety_margin).ok_or(Staleness::Overflow)?;

		if now <= handle.access_created_at {
			return Err(Staleness::NotYetValid);
		}
		if now >= safe_expiry {
			return Err(Staleness::WithinSafetyMargin);
		}

		Ok(())
	}

	/// Validates the handle and re-bases both time pairs onto `now`.
	pub fn revalidate(
		&self,
		mut handle: TokenHandle,
		now: OffsetDateTime,
	) -> Result<TokenHandle, Staleness> {
		self.check(&handle, now)?;

		let deadline = handle.access_deadline().ok_or(Staleness::Overflow)?;
		let access_remaining = deadline - now;

		if !access_remaining.is_positive() {
			return Err(Staleness::WithinSafetyMargin);
		}

		if handle.refresh_token.is_some() {
			if handle.refresh_expires_in.is_positive() {
				let refresh_deadline = handle
					.refresh_created_at
					.checked_add(handle.refresh_expires_in)
					.ok_or(Staleness::Overflow)?;
				let refresh_remaining = refresh_deadline - now;

				if !refresh_remaining.is_positive() {
					return Err(Staleness::RefreshExpired);
				}

				handle.refresh_expires_in = refresh_remaining;
			}

			handle.refresh_created_at = now;
		}

		handle.access_created_at = now;
		handle.access_expires_in = access_remaining;

		Ok(handle)
	}
}
impl Default for FreshnessValidator {
	fn default() -> Self {
		Self::new(Self::DEFAULT_SAFETY_MARGIN)
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::{PrimitiveDateTime, macros};
	// self
	use super::*;

	const ISSUED: OffsetDateTime = macros::datetime!(2025-03-01 12:00 UTC);

	fn handle(access: Duration, refresh: Option<Duration>) -> TokenHandle {
		let mut builder = TokenHandle::builder("svc")
			.access_token("access")
			.issued_at(ISSUED)
			.access_expires_in(access);

		if let Some(lifetime) = refresh {
			builder = builder.refresh_token("refresh", lifetime);
		}

		builder.build().expect("Freshness fixture should build.")
	}

	#[test]
	fn rebasing_preserves_both_deadlines() {
		let validator = FreshnessValidator::default();
		let original = handle(Duration::hours(2), Some(Duration::hours(72)));
		let now = ISSUED + Duration::minutes(30);
		let rebased = validator
			.revalidate(original.clone(), now)
			.expect("Handle 30 minutes into a 2 hour lifetime should be fresh.");

		assert_eq!(rebased.access_created_at, now);
		assert_eq!(rebased.access_expires_in, Duration::minutes(90));
		assert_eq!(rebased.access_deadline(), original.access_deadline());
		assert_eq!(rebased.refresh_created_at, now);
		assert_eq!(rebased.refresh_deadline(), original.refresh_deadline());
		assert_eq!(rebased.access_token, original.access_token);
	}

	#[test]
	fn safety_margin_boundary_is_exclusive() {
		let validator = FreshnessValidator::default();
		let token = handle(Duration::hours(1), None);
		let safe_expiry = ISSUED + Duration::minutes(50);

		assert_eq!(validator.check(&token, safe_expiry), Err(Staleness::WithinSafetyMargin));
		assert_eq!(
			validator.check(&token, safe_expiry + Duration::minutes(5)),
			Err(Staleness::WithinSafetyMargin)
		);
		assert!(validator.check(&token, safe_expiry - Duration::nanoseconds(1)).is_ok());
	}

	#[test]
	fn created_at_boundary_is_exclusive() {
		let validator = FreshnessValidator::default();
		let token = handle(Duration::hours(1), None);

		assert_eq!(validator.check(&token, ISSUED), Err(Staleness::NotYetValid));
		assert_eq!(
			validator.check(&token, ISSUED - Duration::seconds(1)),
			Err(Staleness::NotYetValid)
		);
	}

	#[test]
	fn short_lived_tokens_are_never_fresh() {
		let validator = FreshnessValidator::default();
		let token = handle(Duration::minutes(10), None);

		assert_eq!(
			validator.check(&token, ISSUED + Duration::seconds(1)),
			Err(Staleness::WithinSafetyMargin)
		);
	}

	#[test]
	fn expired_refresh_token_invalidates_the_handle() {
		let validator = FreshnessValidator::default();
		let token = handle(Duration::hours(4), Some(Duration::hours(1)));

		assert_eq!(
			validator.revalidate(token, ISSUED + Duration::hours(2)),
			Err(Staleness::RefreshExpired)
		);
	}

	#[test]
	fn non_expiring_refresh_only_moves_created_at() {
		let validator = FreshnessValidator::default();
		let token = handle(Duration::hours(2), Some(Duration::ZERO));
		let now = ISSUED + Duration::minutes(1);
		let rebased =
			validator.revalidate(token, now).expect("Non-expiring refresh should not expire.");

		assert_eq!(rebased.refresh_expires_in, Duration::ZERO);
		assert_eq!(rebased.refresh_created_at, now);
	}

	#[test]
	fn overflowing_deadline_is_invalid_not_a_panic() {
		let validator = FreshnessValidator::default();
		let mut token = handle(Duration::hours(1), None);

		token.access_created_at = PrimitiveDateTime::MAX.assume_utc();

		assert_eq!(validator.check(&token, ISSUED), Err(Staleness::Overflow));
	}

	#[test]
	fn negative_margin_is_clamped() {
		let validator = FreshnessValidator::new(Duration::minutes(-5));

		assert_eq!(validator.safety_margin(), Duration::ZERO);
	}
}
