//! Issued token handles, their lifecycle helpers, and builders.

// self
use crate::{_prelude::*, auth::token::secret::TokenSecret};

/// Lifecycle status of a token handle's access token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenStatus {
	/// The created-at instant is in the future.
	Pending,
	/// The access token is within its lifetime.
	Active,
	/// The access deadline has passed (or cannot be represented).
	Expired,
}

/// Errors produced by [`TokenHandleBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum TokenHandleBuilderError {
	/// No access token value was provided.
	#[error("Access token is required.")]
	MissingAccessToken,
	/// No access lifetime was provided.
	#[error("Access token lifetime is required.")]
	MissingExpiry,
	/// The access lifetime was zero or negative.
	#[error("Access token lifetime must be positive.")]
	NonPositiveExpiry,
}

/// One issued access/refresh token pair with its accounting timestamps.
///
/// `access_created_at + access_expires_in` is the absolute access deadline. The pool only
/// ever re-bases the created-at/expires-in pairs, which leaves both deadlines in place.
/// A refresh lifetime of zero means the refresh token does not expire.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenHandle {
	/// Client the token was issued to.
	pub client_id: String,
	/// Resource owner; empty for app-only tokens.
	pub user_id: String,
	/// Granted scope string.
	pub scope: String,
	/// Access token secret.
	pub access_token: TokenSecret,
	/// Reference instant for `access_expires_in`.
	pub access_created_at: OffsetDateTime,
	/// Remaining access lifetime measured from `access_created_at`.
	pub access_expires_in: Duration,
	/// Refresh token secret, if one was issued.
	pub refresh_token: Option<TokenSecret>,
	/// Reference instant for `refresh_expires_in`.
	pub refresh_created_at: OffsetDateTime,
	/// Remaining refresh lifetime measured from `refresh_created_at`.
	pub refresh_expires_in: Duration,
}
impl TokenHandle {
	/// Returns a builder for a handle issued to `client_id`.
	pub fn builder(client_id: impl Into<String>) -> TokenHandleBuilder {
		TokenHandleBuilder::new(client_id.into())
	}

	/// Absolute access deadline, or `None` when it overflows the calendar.
	pub fn access_deadline(&self) -> Option<OffsetDateTime> {
		self.access_created_at.checked_add(self.access_expires_in)
	}

	/// Absolute refresh deadline when the handle carries an expiring refresh token.
	pub fn refresh_deadline(&self) -> Option<OffsetDateTime> {
		self.refresh_token.as_ref()?;

		if !self.refresh_expires_in.is_positive() {
			return None;
		}

		self.refresh_created_at.checked_add(self.refresh_expires_in)
	}

	/// Computes the access token status at a given instant.
	pub fn status_at(&self, instant: OffsetDateTime) -> TokenStatus {
		if instant < self.access_created_at {
			return TokenStatus::Pending;
		}

		match self.access_deadline() {
			Some(deadline) if instant < deadline => TokenStatus::Active,
			_ => TokenStatus::Expired,
		}
	}

	/// Returns `true` if the access token is active at the provided instant.
	pub fn is_active_at(&self, instant: OffsetDateTime) -> bool {
		matches!(self.status_at(instant), TokenStatus::Active)
	}
}
impl Debug for TokenHandle {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenHandle")
			.field("client_id", &self.client_id)
			.field("user_id", &self.user_id)
			.field("scope", &self.scope)
			.field("access_token", &"<redacted>")
			.field("access_created_at", &self.access_created_at)
			.field("access_expires_in", &self.access_expires_in)
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("refresh_created_at", &self.refresh_created_at)
			.field("refresh_expires_in", &self.refresh_expires_in)
			.finish()
	}
}

/// Builder for [`TokenHandle`].
#[derive(Clone, Debug)]
pub struct TokenHandleBuilder {
	client_id: String,
	user_id: String,
	scope: String,
	access_token: Option<TokenSecret>,
	issued_at: Option<OffsetDateTime>,
	access_expires_in: Option<Duration>,
	refresh_token: Option<TokenSecret>,
	refresh_expires_in: Duration,
}
impl TokenHandleBuilder {
	fn new(client_id: String) -> Self {
		Self {
			client_id,
			user_id: String::new(),
			scope: String::new(),
			access_token: None,
			issued_at: None,
			access_expires_in: None,
			refresh_token: None,
			refresh_expires_in: Duration::ZERO,
		}
	}

	/// Sets the resource owner.
	pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
		self.user_id = user_id.into();

		self
	}

	/// Sets the granted scope string.
	pub fn scope(mut self, scope: impl Into<String>) -> Self {
		self.scope = scope.into();

		self
	}

	/// Provides the access token value.
	pub fn access_token(mut self, token: impl Into<String>) -> Self {
		self.access_token = Some(TokenSecret::new(token));

		self
	}

	/// Sets the issued-at instant used for both the access and refresh pairs.
	pub fn issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = Some(instant);

		self
	}

	/// Sets the access lifetime.
	pub fn access_expires_in(mut self, lifetime: Duration) -> Self {
		self.access_expires_in = Some(lifetime);

		self
	}

	/// Provides the refresh token value and its lifetime (zero for non-expiring).
	pub fn refresh_token(mut self, token: impl Into<String>, lifetime: Duration) -> Self {
		self.refresh_token = Some(TokenSecret::new(token));
		self.refresh_expires_in = lifetime;

		self
	}

	/// Consumes the builder and produces a [`TokenHandle`].
	pub fn build(self) -> Result<TokenHandle, TokenHandleBuilderError> {
		let access_token = self.access_token.ok_or(TokenHandleBuilderError::MissingAccessToken)?;
		let access_expires_in =
			self.access_expires_in.ok_or(TokenHandleBuilderError::MissingExpiry)?;

		if !access_expires_in.is_positive() {
			return Err(TokenHandleBuilderError::NonPositiveExpiry);
		}

		let issued_at = self.issued_at.unwrap_or_else(OffsetDateTime::now_utc);

		Ok(TokenHandle {
			client_id: self.client_id,
			user_id: self.user_id,
			scope: self.scope,
			access_token,
			access_created_at: issued_at,
			access_expires_in,
			refresh_token: self.refresh_token,
			refresh_created_at: issued_at,
			refresh_expires_in: if self.refresh_expires_in.is_negative() {
				Duration::ZERO
			} else {
				self.refresh_expires_in
			},
		})
	}
}
