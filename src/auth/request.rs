//! Inbound token request parameters, raw and structurally validated.

// crates.io
use url::form_urlencoded;
// self
use crate::{
	_prelude::*,
	auth::{CodeChallengeMethod, GrantType},
	error::{OAuthErrorCode, ValidationError},
};

const REDACTED_PARAMS: [&str; 5] = ["client_secret", "code", "code_verifier", "password", "refresh_token"];

/// Raw form or query parameters of a token endpoint call.
///
/// Repeated parameters keep their first value, mirroring how form handlers read
/// single-valued OAuth parameters.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct RawTokenRequest(BTreeMap<String, String>);
impl RawTokenRequest {
	/// Parses an `application/x-www-form-urlencoded` body or URL query string.
	pub fn from_query(query: &str) -> Self {
		Self::from_pairs(form_urlencoded::parse(query.trim_start_matches('?').as_bytes()))
	}

	/// Builds a request from key/value pairs.
	pub fn from_pairs<I, K, V>(pairs: I) -> Self
	where
		I: IntoIterator<Item = (K, V)>,
		K: Into<String>,
		V: Into<String>,
	{
		let mut params = BTreeMap::new();

		for (key, value) in pairs {
			params.entry(key.into()).or_insert_with(|| value.into());
		}

		Self(params)
	}

	/// Sets (or replaces) a parameter.
	pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.0.insert(key.into(), value.into());

		self
	}

	/// Returns the parameter value, treating absent parameters as empty strings.
	pub fn value(&self, key: &str) -> &str {
		self.0.get(key).map(String::as_str).unwrap_or_default()
	}
}
impl Debug for RawTokenRequest {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let mut map = f.debug_map();

		for (key, value) in &self.0 {
			if REDACTED_PARAMS.contains(&key.as_str()) {
				map.entry(key, &"<redacted>");
			} else {
				map.entry(key, value);
			}
		}

		map.finish()
	}
}

/// Structurally validated token request.
///
/// String fields are empty when the parameter was not supplied. `user_id` is filled in by
/// the issuer during validation (e.g. after checking password credentials).
#[derive(Clone, PartialEq, Eq)]
pub struct TokenRequest {
	/// Requested grant.
	pub grant_type: GrantType,
	/// OAuth client identifier.
	pub client_id: String,
	/// Client secret for confidential clients.
	pub client_secret: String,
	/// Resource owner the token is issued for; empty for app-only grants.
	pub user_id: String,
	/// Requested scope string, as sent.
	pub scope: String,
	/// Redirect URI echoed by the authorization code grant.
	pub redirect_uri: String,
	/// Authorization code.
	pub code: String,
	/// PKCE challenge recorded for the code.
	pub code_challenge: String,
	/// PKCE challenge method recorded for the code.
	pub code_challenge_method: String,
	/// Refresh token for the refresh grant.
	pub refresh_token: String,
	/// PKCE verifier for the authorization code grant.
	pub code_verifier: String,
	/// Resource owner username for the password grant.
	pub username: String,
	/// Resource owner password for the password grant.
	pub password: String,
}
impl TokenRequest {
	/// Creates an otherwise empty request for the grant + client pair.
	pub fn new(grant_type: GrantType, client_id: impl Into<String>) -> Self {
		Self {
			grant_type,
			client_id: client_id.into(),
			client_secret: String::new(),
			user_id: String::new(),
			scope: String::new(),
			redirect_uri: String::new(),
			code: String::new(),
			code_challenge: String::new(),
			code_challenge_method: String::new(),
			refresh_token: String::new(),
			code_verifier: String::new(),
			username: String::new(),
			password: String::new(),
		}
	}

	/// Parses and structurally validates raw endpoint parameters.
	pub fn from_raw(raw: &RawTokenRequest) -> Result<Self, ValidationError> {
		let grant_type = match raw.value("grant_type") {
			"" => return Err(ValidationError::invalid_request("missing grant_type")),
			value => GrantType::from_str(value)?,
		};
		let client_id = raw.value("client_id");

		if client_id.is_empty() {
			return Err(ValidationError::new(OAuthErrorCode::InvalidClient, "missing client_id"));
		}

		let redirect_uri = raw.value("redirect_uri");

		if !redirect_uri.is_empty() {
			Url::parse(redirect_uri)
				.map_err(|e| ValidationError::invalid_request(format!("invalid redirect_uri: {e}")))?;
		}

		let code_challenge_method = raw.value("code_challenge_method");

		CodeChallengeMethod::from_str(code_challenge_method)?;

		let request = Self {
			grant_type,
			client_id: client_id.to_owned(),
			client_secret: raw.value("client_secret").to_owned(),
			user_id: String::new(),
			scope: raw.value("scope").to_owned(),
			redirect_uri: redirect_uri.to_owned(),
			code: raw.value("code").to_owned(),
			code_challenge: raw.value("code_challenge").to_owned(),
			code_challenge_method: code_challenge_method.to_owned(),
			refresh_token: raw.value("refresh_token").to_owned(),
			code_verifier: raw.value("code_verifier").to_owned(),
			username: raw.value("username").to_owned(),
			password: raw.value("password").to_owned(),
		};

		request.ensure_grant_parameters()?;

		Ok(request)
	}

	/// Sets the client secret.
	pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
		self.client_secret = secret.into();

		self
	}

	/// Sets the resolved resource owner.
	pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
		self.user_id = user_id.into();

		self
	}

	/// Sets the requested scope string.
	pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
		self.scope = scope.into();

		self
	}

	/// Sets the redirect URI.
	pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
		self.redirect_uri = redirect_uri.into();

		self
	}

	/// Sets the authorization code and its PKCE verifier.
	pub fn with_code(mut self, code: impl Into<String>, verifier: impl Into<String>) -> Self {
		self.code = code.into();
		self.code_verifier = verifier.into();

		self
	}

	/// Sets the PKCE challenge + method pair.
	pub fn with_code_challenge(
		mut self,
		challenge: impl Into<String>,
		method: CodeChallengeMethod,
	) -> Self {
		self.code_challenge = challenge.into();
		self.code_challenge_method = method.as_str().to_owned();

		self
	}

	/// Sets the refresh token.
	pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
		self.refresh_token = refresh_token.into();

		self
	}

	/// Sets resource owner credentials.
	pub fn with_credentials(
		mut self,
		username: impl Into<String>,
		password: impl Into<String>,
	) -> Self {
		self.username = username.into();
		self.password = password.into();

		self
	}

	/// The nine identity-bearing fields, in fingerprint order.
	pub fn identity_fields(&self) -> [&str; 9] {
		[
			&self.client_id,
			&self.client_secret,
			&self.user_id,
			&self.scope,
			&self.code,
			&self.code_challenge,
			&self.code_challenge_method,
			&self.refresh_token,
			&self.code_verifier,
		]
	}

	fn ensure_grant_parameters(&self) -> Result<(), ValidationError> {
		let missing = match self.grant_type {
			GrantType::AuthorizationCode if self.code.is_empty() => Some("code"),
			GrantType::Password if self.username.is_empty() => Some("username"),
			GrantType::Password if self.password.is_empty() => Some("password"),
			GrantType::RefreshToken if self.refresh_token.is_empty() => Some("refresh_token"),
			_ => None,
		};

		match missing {
			Some(param) => Err(ValidationError::invalid_request(format!(
				"missing {param} for the {} grant",
				self.grant_type
			))),
			None => Ok(()),
		}
	}
}
impl Debug for TokenRequest {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenRequest")
			.field("grant_type", &self.grant_type)
			.field("client_id", &self.client_id)
			.field("client_secret_set", &!self.client_secret.is_empty())
			.field("user_id", &self.user_id)
			.field("scope", &self.scope)
			.field("redirect_uri", &self.redirect_uri)
			.field("code_set", &!self.code.is_empty())
			.field("code_challenge", &self.code_challenge)
			.field("code_challenge_method", &self.code_challenge_method)
			.field("refresh_token_set", &!self.refresh_token.is_empty())
			.field("username", &self.username)
			.finish()
	}
}
