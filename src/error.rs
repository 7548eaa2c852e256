//! Pool-level error types shared by the issuer contract, pool storage, and the token endpoint.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Pool storage failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::pool::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Token request was malformed or incomplete.
	#[error(transparent)]
	Validation(#[from] ValidationError),
	/// Issuer failed to mint and no pooled token could stand in.
	#[error(transparent)]
	Issuance(#[from] IssuanceError),

	/// The pool was shut down and no longer serves acquisitions.
	#[error("Token pool has been shut down.")]
	Closed,
}
impl Error {
	/// Maps the error onto the standard OAuth 2.0 error code used in token responses.
	pub fn oauth_code(&self) -> OAuthErrorCode {
		match self {
			Self::Validation(e) => e.code,
			Self::Issuance(e) => e.oauth_code(),
			Self::Storage(_) | Self::Config(_) => OAuthErrorCode::ServerError,
			Self::Closed => OAuthErrorCode::TemporarilyUnavailable,
		}
	}
}

/// Standard OAuth 2.0 token endpoint error codes (RFC 6749 section 5.2 plus the
/// authorization endpoint's server-side codes and the bearer `invalid_token` code).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OAuthErrorCode {
	/// Missing or malformed parameter.
	InvalidRequest,
	/// Client authentication failed.
	InvalidClient,
	/// Grant (code, refresh token, credentials) is invalid or expired.
	InvalidGrant,
	/// Client may not use this grant type.
	UnauthorizedClient,
	/// Grant type is not supported by the issuer.
	UnsupportedGrantType,
	/// Requested scope is invalid or exceeds the grant.
	InvalidScope,
	/// Unexpected issuer-side failure.
	ServerError,
	/// Issuer is overloaded or down.
	TemporarilyUnavailable,
	/// Bearer token is missing, malformed, expired, or unknown (RFC 6750 section 3.1).
	InvalidToken,
}
impl OAuthErrorCode {
	/// Returns the wire identifier for the error code.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::InvalidRequest => "invalid_request",
			Self::InvalidClient => "invalid_client",
			Self::InvalidGrant => "invalid_grant",
			Self::UnauthorizedClient => "unauthorized_client",
			Self::UnsupportedGrantType => "unsupported_grant_type",
			Self::InvalidScope => "invalid_scope",
			Self::ServerError => "server_error",
			Self::TemporarilyUnavailable => "temporarily_unavailable",
			Self::InvalidToken => "invalid_token",
		}
	}

	/// HTTP status the token endpoint answers with for this code.
	pub const fn http_status(self) -> u16 {
		match self {
			Self::InvalidClient | Self::InvalidToken => 401,
			Self::ServerError => 500,
			Self::TemporarilyUnavailable => 503,
			_ => 400,
		}
	}
}
impl Display for OAuthErrorCode {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Malformed or incomplete token request. Never touches the pool.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("Token request is invalid ({code}): {description}.")]
pub struct ValidationError {
	/// OAuth error code reported to the client.
	pub code: OAuthErrorCode,
	/// Human-readable reason.
	pub description: String,
}
impl ValidationError {
	/// Creates a validation error with an explicit code.
	pub fn new(code: OAuthErrorCode, description: impl Into<String>) -> Self {
		Self { code, description: description.into() }
	}

	/// Shorthand for [`OAuthErrorCode::InvalidRequest`].
	pub fn invalid_request(description: impl Into<String>) -> Self {
		Self::new(OAuthErrorCode::InvalidRequest, description)
	}
}

/// Failure reported by [`Issuer::mint`](crate::issuer::Issuer::mint).
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum IssuanceError {
	/// The issuer refused the grant (bad client, code, refresh token, scope).
	#[error("Issuer rejected the grant ({code}): {description}.")]
	Rejected {
		/// OAuth error code reported to the client.
		code: OAuthErrorCode,
		/// Human-readable reason.
		description: String,
	},
	/// The backing token store failed.
	#[error("Issuer backend failure: {message}.")]
	Backend {
		/// Backend-supplied message.
		message: String,
	},
	/// The issuer is temporarily unable to mint (outage, quota).
	#[error("Issuer is temporarily unavailable: {message}.")]
	Unavailable {
		/// Backend-supplied message.
		message: String,
	},
}
impl IssuanceError {
	/// Shorthand for [`IssuanceError::Rejected`].
	pub fn rejected(code: OAuthErrorCode, description: impl Into<String>) -> Self {
		Self::Rejected { code, description: description.into() }
	}

	/// Maps the failure onto an OAuth error code.
	pub fn oauth_code(&self) -> OAuthErrorCode {
		match self {
			Self::Rejected { code, .. } => *code,
			Self::Backend { .. } => OAuthErrorCode::ServerError,
			Self::Unavailable { .. } => OAuthErrorCode::TemporarilyUnavailable,
		}
	}
}

/// Failure reported by [`Issuer::load_access_token`](crate::issuer::Issuer::load_access_token).
///
/// The pool never surfaces these; the affected handle is dropped.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum LookupError {
	/// The access token is no longer tracked (expired, revoked, rotated).
	#[error("Access token is not tracked by the issuer.")]
	NotFound,
	/// The lookup itself failed.
	#[error("Issuer lookup failed: {message}.")]
	Backend {
		/// Backend-supplied message.
		message: String,
	},
}

/// Configuration and validation failures raised while building pools and issuers.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// Maximum pool size outside `1..=ceiling`.
	#[error("Maximum pool size must be between 1 and {ceiling}, got {value}.")]
	InvalidMaxPoolSize {
		/// Rejected value.
		value: usize,
		/// Hard upper bound.
		ceiling: usize,
	},
	/// Duration that must not be negative was negative.
	#[error("The {field} duration must not be negative.")]
	NegativeDuration {
		/// Configuration field name.
		field: &'static str,
	},
	/// Duration that must be positive was zero or negative.
	#[error("The {field} duration must be positive.")]
	NonPositiveDuration {
		/// Configuration field name.
		field: &'static str,
	},
	/// Safety margin that would reject every pooled handle.
	#[error(
		"Safety margin ({margin_secs}s) must be shorter than the entry TTL ({entry_ttl_secs}s)."
	)]
	SafetyMarginTooLarge {
		/// Rejected margin in whole seconds.
		margin_secs: i64,
		/// Entry TTL in whole seconds.
		entry_ttl_secs: i64,
	},
	/// Issuer lookups need at least one slot.
	#[error("Lookup concurrency must be at least 1.")]
	ZeroLookupConcurrency,
	/// JSON configuration could not be parsed.
	#[error("Configuration could not be parsed.")]
	Parse {
		/// Structured parsing failure including the offending path.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
}

#[cfg(test)]
mod tests {
	// std
	use std::error::Error as StdError;
	// self
	use super::*;
	use crate::pool::StoreError;

	#[test]
	fn store_error_converts_into_pool_error_with_source() {
		let store_error = StoreError::Backend { message: "cache node unreachable".into() };
		let error: Error = store_error.clone().into();

		assert!(matches!(error, Error::Storage(_)));
		assert!(error.to_string().contains("cache node unreachable"));

		let source = StdError::source(&error)
			.expect("Pool error should expose the original store error as its source.");

		assert_eq!(source.to_string(), store_error.to_string());
		assert_eq!(error.oauth_code(), OAuthErrorCode::ServerError);
	}

	#[test]
	fn issuance_errors_map_to_oauth_codes() {
		let rejected = IssuanceError::rejected(OAuthErrorCode::InvalidClient, "unknown client");
		let outage = IssuanceError::Unavailable { message: "quota exhausted".into() };

		assert_eq!(Error::from(rejected).oauth_code(), OAuthErrorCode::InvalidClient);
		assert_eq!(Error::from(outage).oauth_code(), OAuthErrorCode::TemporarilyUnavailable);
		assert_eq!(Error::Closed.oauth_code(), OAuthErrorCode::TemporarilyUnavailable);
	}

	#[test]
	fn status_codes_follow_rfc_6749() {
		assert_eq!(OAuthErrorCode::InvalidGrant.http_status(), 400);
		assert_eq!(OAuthErrorCode::InvalidClient.http_status(), 401);
		assert_eq!(OAuthErrorCode::ServerError.http_status(), 500);
		assert_eq!(OAuthErrorCode::TemporarilyUnavailable.http_status(), 503);
		assert_eq!(OAuthErrorCode::InvalidToken.http_status(), 401);
		assert_eq!(
			serde_json::to_string(&OAuthErrorCode::UnsupportedGrantType)
				.expect("Error code should serialize to JSON."),
			"\"unsupported_grant_type\""
		);
	}

	#[test]
	fn validation_error_renders_code_and_description() {
		let err = ValidationError::invalid_request("missing client_id");

		assert_eq!(err.to_string(), "Token request is invalid (invalid_request): missing client_id.");
	}
}
