//! Transport-agnostic token endpoint that puts a [`TokenPool`] in front of an [`Issuer`].
//!
//! [`TokenEndpoint::handle`] takes already-decoded request parameters and returns the status,
//! headers, and JSON body an HTTP layer should write back. [`TokenEndpoint::verify`] does the
//! same for a bearer-protected read of the token's own details. Neither touches a socket, so
//! any server framework can mount them.

// self
use crate::{
	_prelude::*,
	auth::{RawTokenRequest, TokenHandle, TokenRequest},
	error::{IssuanceError, LookupError, OAuthErrorCode},
	issuer::Issuer,
	pool::{AcquireSource, TokenPool},
};

/// Callback invoked with every newly minted token response.
pub type MintHook = Arc<dyn Fn(&TokenResponse) + Send + Sync>;
/// Extra members merged into every successful token response body.
pub type ExtensionFields =
	Arc<dyn Fn(&TokenHandle) -> serde_json::Map<String, serde_json::Value> + Send + Sync>;
/// Resolves the `Authorization` value to a handle without asking the issuer; `None` falls
/// through to normal bearer verification.
pub type VerifySkipper = Arc<dyn Fn(&str) -> Option<TokenHandle> + Send + Sync>;
/// Shapes the body [`TokenEndpoint::verify`] returns for a verified handle; `Null` answers
/// `401`.
pub type ReadCallback = Arc<dyn Fn(&TokenHandle) -> serde_json::Value + Send + Sync>;

const DEFAULT_TOKEN_TYPE: &str = "Bearer";

/// Successful token response body (RFC 6749 section 5.1).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
	/// Access token value.
	pub access_token: String,
	/// Token type, `Bearer` unless configured otherwise.
	pub token_type: String,
	/// Remaining access lifetime in whole seconds.
	pub expires_in: i64,
	/// Granted scope, omitted when empty.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub scope: Option<String>,
	/// Refresh token, omitted when none was issued.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub refresh_token: Option<String>,
}
impl TokenResponse {
	/// Renders a handle using the provided token type.
	pub fn from_handle(handle: &TokenHandle, token_type: &str) -> Self {
		Self {
			access_token: handle.access_token.expose().to_owned(),
			token_type: token_type.to_owned(),
			expires_in: handle.access_expires_in.whole_seconds(),
			scope: (!handle.scope.is_empty()).then(|| handle.scope.clone()),
			refresh_token: handle.refresh_token.as_ref().map(|secret| secret.expose().to_owned()),
		}
	}
}
impl Debug for TokenResponse {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.debug_struct("TokenResponse")
			.field("access_token", &"<redacted>")
			.field("token_type", &self.token_type)
			.field("expires_in", &self.expires_in)
			.field("scope", &self.scope)
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.finish()
	}
}

/// Default body of [`TokenEndpoint::verify`]: what the token grants, never its secrets.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
	/// Client the token was issued to.
	pub client_id: String,
	/// Resource owner, omitted for client credentials tokens.
	#[serde(default, skip_serializing_if = "String::is_empty")]
	pub user_id: String,
	/// Granted scope, omitted when empty.
	#[serde(default, skip_serializing_if = "String::is_empty")]
	pub scope: String,
	/// Issue instant as a Unix timestamp.
	pub created_at: i64,
	/// Access lifetime in whole seconds, counted from `created_at`.
	pub expires_in: i64,
}
impl TokenInfo {
	/// Describes a handle.
	pub fn from_handle(handle: &TokenHandle) -> Self {
		Self {
			client_id: handle.client_id.clone(),
			user_id: handle.user_id.clone(),
			scope: handle.scope.clone(),
			created_at: handle.access_created_at.unix_timestamp(),
			expires_in: handle.access_expires_in.whole_seconds(),
		}
	}
}

/// Error response body (RFC 6749 section 5.2).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
	/// OAuth error code.
	pub error: OAuthErrorCode,
	/// Human-readable reason.
	pub error_description: String,
}
impl ErrorResponse {
	/// Builds the body for a crate error.
	pub fn from_error(error: &Error) -> Self {
		let error_description = match error {
			Error::Validation(e) => e.description.clone(),
			Error::Issuance(IssuanceError::Rejected { description, .. }) => description.clone(),
			other => other.to_string(),
		};

		Self { error: error.oauth_code(), error_description }
	}

	fn invalid_token(description: impl Into<String>) -> Self {
		Self { error: OAuthErrorCode::InvalidToken, error_description: description.into() }
	}
}

/// Everything an HTTP layer needs to answer a token request.
#[derive(Clone, Debug, PartialEq)]
pub struct TokenEndpointResponse {
	/// HTTP status code.
	pub status: u16,
	/// Response headers.
	pub headers: BTreeMap<&'static str, &'static str>,
	/// JSON body.
	pub body: serde_json::Value,
}
impl TokenEndpointResponse {
	fn json(status: u16, body: serde_json::Value) -> Self {
		let headers = BTreeMap::from([
			("Cache-Control", "no-store"),
			("Content-Type", "application/json;charset=UTF-8"),
			("Pragma", "no-cache"),
		]);

		Self { status, headers, body }
	}

	fn from_error(error: &Error) -> Self {
		Self::from_body(&ErrorResponse::from_error(error))
	}

	fn from_body(body: &ErrorResponse) -> Self {
		Self::json(body.error.http_status(), render(body))
	}

	/// Returns `true` for 2xx responses.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	/// Decodes the body as a [`TokenResponse`] (only meaningful for successes).
	pub fn token(&self) -> Option<TokenResponse> {
		serde_json::from_value(self.body.clone()).ok()
	}

	/// Decodes the body as an [`ErrorResponse`] (only meaningful for failures).
	pub fn error(&self) -> Option<ErrorResponse> {
		serde_json::from_value(self.body.clone()).ok()
	}
}

/// Token endpoint handler.
///
/// Without a pool (or with a non-positive pool size) every request mints. With a pool the
/// request goes through [`TokenPool::acquire`]. The mint hook only sees tokens that were
/// actually minted for this request.
#[derive(Clone)]
pub struct TokenEndpoint {
	issuer: Arc<dyn Issuer>,
	pool: Option<Arc<TokenPool>>,
	pool_size: i64,
	token_type: String,
	on_mint: Option<MintHook>,
	extension_fields: Option<ExtensionFields>,
	verify_skipper: Option<VerifySkipper>,
	read_callback: Option<ReadCallback>,
}
impl TokenEndpoint {
	/// Creates an endpoint that mints every token directly.
	pub fn new(issuer: Arc<dyn Issuer>) -> Self {
		Self {
			issuer,
			pool: None,
			pool_size: 0,
			token_type: DEFAULT_TOKEN_TYPE.into(),
			on_mint: None,
			extension_fields: None,
			verify_skipper: None,
			read_callback: None,
		}
	}

	/// Routes requests through `pool`, keeping up to `pool_size` tokens per fingerprint.
	pub fn with_pool(mut self, pool: Arc<TokenPool>, pool_size: i64) -> Self {
		self.pool = Some(pool);
		self.pool_size = pool_size;

		self
	}

	/// Overrides the `token_type` reported to clients.
	pub fn with_token_type(mut self, token_type: impl Into<String>) -> Self {
		self.token_type = token_type.into();

		self
	}

	/// Registers a callback for newly minted tokens.
	pub fn with_mint_hook<F>(mut self, hook: F) -> Self
	where
		F: 'static + Fn(&TokenResponse) + Send + Sync,
	{
		self.on_mint = Some(Arc::new(hook));

		self
	}

	/// Adds members to every successful token response; standard members are never replaced.
	pub fn with_extension_fields<F>(mut self, extend: F) -> Self
	where
		F: 'static + Fn(&TokenHandle) -> serde_json::Map<String, serde_json::Value> + Send + Sync,
	{
		self.extension_fields = Some(Arc::new(extend));

		self
	}

	/// Lets [`TokenEndpoint::verify`] accept callers the skipper recognizes.
	pub fn with_verify_skipper<F>(mut self, skipper: F) -> Self
	where
		F: 'static + Fn(&str) -> Option<TokenHandle> + Send + Sync,
	{
		self.verify_skipper = Some(Arc::new(skipper));

		self
	}

	/// Replaces the default [`TokenInfo`] body of [`TokenEndpoint::verify`].
	pub fn with_read_callback<F>(mut self, read: F) -> Self
	where
		F: 'static + Fn(&TokenHandle) -> serde_json::Value + Send + Sync,
	{
		self.read_callback = Some(Arc::new(read));

		self
	}

	/// Handles one token request.
	pub async fn handle(&self, raw: &RawTokenRequest) -> TokenEndpointResponse {
		let request = match self.issuer.validate_request(raw) {
			Ok(request) => request,
			Err(e) => return TokenEndpointResponse::from_error(&Error::from(e)),
		};

		match self.issue(&request).await {
			Ok(body) => TokenEndpointResponse::json(200, body),
			Err(e) => TokenEndpointResponse::from_error(&e),
		}
	}

	/// Resolves an `Authorization` header value (`Bearer <token>`) to the issuer's handle.
	///
	/// The verify skipper, when set, is consulted first.
	pub async fn authenticate(&self, authorization: &str) -> Result<TokenHandle, ErrorResponse> {
		if let Some(handle) = self.verify_skipper.as_ref().and_then(|skip| skip(authorization)) {
			return Ok(handle);
		}

		let token = bearer_token(authorization)
			.ok_or_else(|| ErrorResponse::invalid_token("missing or malformed bearer token"))?;

		match self.issuer.load_access_token(token).await {
			Ok(handle) => Ok(handle),
			Err(LookupError::NotFound) => {
				Err(ErrorResponse::invalid_token("access token is invalid or expired"))
			},
			Err(e) => Err(ErrorResponse {
				error: OAuthErrorCode::ServerError,
				error_description: e.to_string(),
			}),
		}
	}

	/// Answers a bearer-protected read with the token's details.
	pub async fn verify(&self, authorization: &str) -> TokenEndpointResponse {
		let handle = match self.authenticate(authorization).await {
			Ok(handle) => handle,
			Err(body) => return TokenEndpointResponse::from_body(&body),
		};
		let body = match &self.read_callback {
			Some(read) => read(&handle),
			None => render(&TokenInfo::from_handle(&handle)),
		};

		if body.is_null() {
			return TokenEndpointResponse::from_body(&ErrorResponse::invalid_token(
				"token details are not readable",
			));
		}

		TokenEndpointResponse::json(200, body)
	}

	async fn issue(&self, request: &TokenRequest) -> Result<serde_json::Value> {
		let (handle, minted) = match &self.pool {
			Some(pool) if self.pool_size > 0 => {
				let acquisition = pool.acquire(self.pool_size, request).await?;

				(acquisition.handle, acquisition.source == AcquireSource::Minted)
			},
			_ => (self.issuer.mint(request.grant_type, request).await?, true),
		};
		let response = TokenResponse::from_handle(&handle, &self.token_type);

		if let Some(hook) = self.on_mint.as_ref().filter(|_| minted) {
			hook(&response);
		}

		let mut body = render(&response);

		if let (Some(extend), serde_json::Value::Object(members)) =
			(&self.extension_fields, &mut body)
		{
			for (key, value) in extend(&handle) {
				members.entry(key).or_insert(value);
			}
		}

		Ok(body)
	}
}
impl Debug for TokenEndpoint {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.debug_struct("TokenEndpoint")
			.field("pooled", &self.pool.is_some())
			.field("pool_size", &self.pool_size)
			.field("token_type", &self.token_type)
			.field("on_mint", &self.on_mint.is_some())
			.field("extension_fields", &self.extension_fields.is_some())
			.field("verify_skipper", &self.verify_skipper.is_some())
			.field("read_callback", &self.read_callback.is_some())
			.finish()
	}
}

fn bearer_token(authorization: &str) -> Option<&str> {
	let (scheme, token) = authorization.trim().split_once(' ')?;
	let token = token.trim();

	(scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

fn render<T>(body: &T) -> serde_json::Value
where
	T: Serialize,
{
	serde_json::to_value(body).unwrap_or_else(|e| {
		serde_json::json!({
			"error": OAuthErrorCode::ServerError,
			"error_description": e.to_string(),
		})
	})
}
