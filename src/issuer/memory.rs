//! In-process [`Issuer`] with registered clients and users, single-use authorization codes,
//! PKCE verification, and refresh-token rotation.

// std
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
// crates.io
use rand::{Rng, distr::Alphanumeric};
// self
use crate::{
	_prelude::*,
	auth::{CodeChallengeMethod, GrantType, RawTokenRequest, TokenHandle, TokenRequest},
	clock::Clock,
	error::{IssuanceError, LookupError, OAuthErrorCode, ValidationError},
	issuer::{Issuer, IssuerFuture},
};

const TOKEN_LEN: usize = 32;
const CODE_LEN: usize = 24;

/// Lifetimes applied by [`MemoryIssuer`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemoryIssuerConfig {
	/// Access token lifetime.
	pub access_ttl: Duration,
	/// Refresh token lifetime.
	pub refresh_ttl: Duration,
	/// Upper bound for both lifetimes; zero or larger lifetimes are clamped to it.
	pub max_lifetime: Duration,
	/// Whether client credentials grants also receive a refresh token.
	pub refresh_for_client_credentials: bool,
	/// How long an authorization code stays redeemable.
	pub code_ttl: Duration,
	/// Minimum time between opportunistic purges of expired codes and tokens.
	pub purge_interval: Duration,
}
impl MemoryIssuerConfig {
	/// Default access lifetime (2 hours).
	pub const DEFAULT_ACCESS_TTL: Duration = Duration::hours(2);
	/// Default refresh lifetime (72 hours).
	pub const DEFAULT_REFRESH_TTL: Duration = Duration::hours(72);
	/// Default lifetime ceiling (7 days).
	pub const DEFAULT_MAX_LIFETIME: Duration = Duration::days(7);
	/// Default authorization code lifetime (10 minutes).
	pub const DEFAULT_CODE_TTL: Duration = Duration::minutes(10);
	/// Default purge interval (30 minutes).
	pub const DEFAULT_PURGE_INTERVAL: Duration = Duration::minutes(30);

	/// Overrides the access lifetime.
	pub fn with_access_ttl(mut self, ttl: Duration) -> Self {
		self.access_ttl = ttl;

		self
	}

	/// Overrides the refresh lifetime.
	pub fn with_refresh_ttl(mut self, ttl: Duration) -> Self {
		self.refresh_ttl = ttl;

		self
	}

	/// Overrides the lifetime ceiling.
	pub fn with_max_lifetime(mut self, ceiling: Duration) -> Self {
		self.max_lifetime = ceiling;

		self
	}

	/// Toggles refresh tokens for client credentials grants.
	pub fn with_refresh_for_client_credentials(mut self, enabled: bool) -> Self {
		self.refresh_for_client_credentials = enabled;

		self
	}

	/// Overrides the authorization code lifetime.
	pub fn with_code_ttl(mut self, ttl: Duration) -> Self {
		self.code_ttl = ttl;

		self
	}

	/// Overrides the purge interval.
	pub fn with_purge_interval(mut self, interval: Duration) -> Self {
		self.purge_interval = interval;

		self
	}

	/// Access lifetime after clamping.
	pub fn effective_access_ttl(&self) -> Duration {
		self.clamp(self.access_ttl)
	}

	/// Refresh lifetime after clamping.
	pub fn effective_refresh_ttl(&self) -> Duration {
		self.clamp(self.refresh_ttl)
	}

	fn clamp(&self, lifetime: Duration) -> Duration {
		if !lifetime.is_positive() || lifetime > self.max_lifetime { self.max_lifetime } else { lifetime }
	}
}
impl Default for MemoryIssuerConfig {
	fn default() -> Self {
		Self {
			access_ttl: Self::DEFAULT_ACCESS_TTL,
			refresh_ttl: Self::DEFAULT_REFRESH_TTL,
			max_lifetime: Self::DEFAULT_MAX_LIFETIME,
			refresh_for_client_credentials: true,
			code_ttl: Self::DEFAULT_CODE_TTL,
			purge_interval: Self::DEFAULT_PURGE_INTERVAL,
		}
	}
}

/// Authorization decision recorded when a code is handed out.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthorizationCodeGrant {
	/// Client the code was issued to.
	pub client_id: String,
	/// Resource owner who approved the request.
	pub user_id: String,
	/// Approved scope.
	pub scope: String,
	/// Redirect URI the token request must echo, if any.
	pub redirect_uri: String,
	/// PKCE challenge, empty when PKCE was not used.
	pub code_challenge: String,
	/// PKCE challenge method.
	pub code_challenge_method: CodeChallengeMethod,
}
impl AuthorizationCodeGrant {
	/// Creates a grant without scope, redirect URI, or PKCE.
	pub fn new(client_id: impl Into<String>, user_id: impl Into<String>) -> Self {
		Self {
			client_id: client_id.into(),
			user_id: user_id.into(),
			scope: String::new(),
			redirect_uri: String::new(),
			code_challenge: String::new(),
			code_challenge_method: CodeChallengeMethod::Plain,
		}
	}

	/// Sets the approved scope.
	pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
		self.scope = scope.into();

		self
	}

	/// Sets the redirect URI.
	pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
		self.redirect_uri = redirect_uri.into();

		self
	}

	/// Binds the code to a PKCE challenge.
	pub fn with_challenge(
		mut self,
		challenge: impl Into<String>,
		method: CodeChallengeMethod,
	) -> Self {
		self.code_challenge = challenge.into();
		self.code_challenge_method = method;

		self
	}
}

#[derive(Clone, Debug)]
struct UserRecord {
	password: String,
	user_id: String,
}

#[derive(Clone, Debug)]
struct IssuedCode {
	grant: AuthorizationCodeGrant,
	expires_at: OffsetDateTime,
}

#[derive(Debug, Default)]
struct IssuerState {
	clients: HashMap<String, String>,
	users: HashMap<String, UserRecord>,
	codes: HashMap<String, IssuedCode>,
	access: HashMap<String, TokenHandle>,
	refresh: HashMap<String, String>,
}
impl IssuerState {
	fn forget(&mut self, access_token: &str) -> Option<TokenHandle> {
		let handle = self.access.remove(access_token)?;

		if let Some(refresh) = &handle.refresh_token {
			self.refresh.remove(refresh.expose());
		}

		Some(handle)
	}
}

/// Reference issuer keeping every client, code, and token in memory.
pub struct MemoryIssuer {
	state: RwLock<IssuerState>,
	config: MemoryIssuerConfig,
	clock: Arc<dyn Clock>,
	available: AtomicBool,
	last_purge: Mutex<OffsetDateTime>,
	mints: AtomicU64,
	lookups: AtomicU64,
}
impl MemoryIssuer {
	/// Creates an issuer with no registered clients.
	pub fn new(config: MemoryIssuerConfig, clock: Arc<dyn Clock>) -> Self {
		let last_purge = Mutex::new(clock.now());

		Self {
			state: Default::default(),
			config,
			clock,
			available: AtomicBool::new(true),
			last_purge,
			mints: AtomicU64::new(0),
			lookups: AtomicU64::new(0),
		}
	}

	/// Registers a client; an empty secret marks a public client.
	pub fn with_client(self, client_id: impl Into<String>, secret: impl Into<String>) -> Self {
		self.state.write().clients.insert(client_id.into(), secret.into());

		self
	}

	/// Registers a resource owner for the password grant.
	pub fn with_user(
		self,
		username: impl Into<String>,
		password: impl Into<String>,
		user_id: impl Into<String>,
	) -> Self {
		let record = UserRecord { password: password.into(), user_id: user_id.into() };

		self.state.write().users.insert(username.into(), record);

		self
	}

	/// Active configuration.
	pub fn config(&self) -> &MemoryIssuerConfig {
		&self.config
	}

	/// Hands out a single-use authorization code for the grant, redeemable for `code_ttl`.
	pub fn issue_code(&self, grant: AuthorizationCodeGrant) -> String {
		let code = random_string(CODE_LEN);
		let expires_at = self.clock.now().saturating_add(self.config.code_ttl);

		self.state.write().codes.insert(code.clone(), IssuedCode { grant, expires_at });

		code
	}

	/// Forgets an access token and its refresh token; returns `false` if it was unknown.
	pub fn revoke_access_token(&self, access_token: &str) -> bool {
		self.state.write().forget(access_token).is_some()
	}

	/// Drops expired authorization codes and every token pair whose access and refresh
	/// tokens have both expired; returns how many codes and pairs were removed.
	///
	/// Minting runs this at most once per `purge_interval`.
	pub fn purge_expired(&self) -> usize {
		let now = self.clock.now();
		let mut state = self.state.write();
		let codes = state.codes.len();

		state.codes.retain(|_, code| now < code.expires_at);

		let spent = state
			.access
			.iter()
			.filter(|(_, handle)| is_spent(handle, now))
			.map(|(token, _)| token.clone())
			.collect::<Vec<_>>();

		for token in &spent {
			state.forget(token);
		}

		*self.last_purge.lock() = now;

		codes - state.codes.len() + spent.len()
	}

	/// Toggles whether [`Issuer::mint`] succeeds; lookups keep working.
	pub fn set_available(&self, available: bool) {
		self.available.store(available, Ordering::Release);
	}

	/// Number of tokens minted so far.
	pub fn mint_count(&self) -> u64 {
		self.mints.load(Ordering::Relaxed)
	}

	/// Number of access-token lookups served so far.
	pub fn lookup_count(&self) -> u64 {
		self.lookups.load(Ordering::Relaxed)
	}

	/// Number of access tokens currently tracked.
	///
	/// An expired access token stays tracked while its refresh token is live, and until a
	/// lookup or a purge notices that both have expired.
	pub fn tracked_tokens(&self) -> usize {
		self.state.read().access.len()
	}

	fn authenticate(&self, client_id: &str, secret: &str) -> Result<(), IssuanceError> {
		match self.state.read().clients.get(client_id) {
			Some(expected) if expected == secret => Ok(()),
			_ => Err(IssuanceError::rejected(
				OAuthErrorCode::InvalidClient,
				"client authentication failed",
			)),
		}
	}

	fn resolve_user(&self, username: &str, password: &str) -> Option<String> {
		self.state
			.read()
			.users
			.get(username)
			.filter(|record| record.password == password)
			.map(|record| record.user_id.clone())
	}

	fn mint_now(
		&self,
		grant_type: GrantType,
		request: &TokenRequest,
	) -> Result<TokenHandle, IssuanceError> {
		if !self.available.load(Ordering::Acquire) {
			return Err(IssuanceError::Unavailable { message: "minting is disabled".into() });
		}

		self.authenticate(&request.client_id, &request.client_secret)?;

		let handle = match grant_type {
			GrantType::ClientCredentials => self.issue(
				&request.client_id,
				"",
				&request.scope,
				self.config.refresh_for_client_credentials,
			)?,
			GrantType::Password => {
				let user_id = if request.user_id.is_empty() {
					self.resolve_user(&request.username, &request.password).ok_or_else(|| {
						IssuanceError::rejected(
							OAuthErrorCode::InvalidGrant,
							"resource owner credentials are invalid",
						)
					})?
				} else {
					request.user_id.clone()
				};

				self.issue(&request.client_id, &user_id, &request.scope, true)?
			},
			GrantType::AuthorizationCode => self.exchange_code(request)?,
			GrantType::RefreshToken => self.rotate_refresh(request)?,
		};

		self.mints.fetch_add(1, Ordering::Relaxed);

		Ok(handle)
	}

	fn exchange_code(&self, request: &TokenRequest) -> Result<TokenHandle, IssuanceError> {
		let invalid_grant = |description: &str| {
			IssuanceError::rejected(OAuthErrorCode::InvalidGrant, description)
		};
		let grant = {
			let mut state = self.state.write();
			let issued = state
				.codes
				.get(&request.code)
				.ok_or_else(|| invalid_grant("authorization code is invalid or was already used"))?;

			if self.clock.now() >= issued.expires_at {
				state.codes.remove(&request.code);

				return Err(invalid_grant("authorization code has expired"));
			}

			let grant = &issued.grant;

			if grant.client_id != request.client_id {
				return Err(invalid_grant("authorization code was issued to another client"));
			}
			if !grant.redirect_uri.is_empty() && grant.redirect_uri != request.redirect_uri {
				return Err(invalid_grant("redirect_uri does not match the authorization request"));
			}
			if !grant.code_challenge.is_empty() {
				if request.code_verifier.is_empty() {
					return Err(IssuanceError::rejected(
						OAuthErrorCode::InvalidRequest,
						"missing code_verifier",
					));
				}
				if !grant.code_challenge_method.verify(&request.code_verifier, &grant.code_challenge) {
					return Err(invalid_grant("code_verifier does not match the challenge"));
				}
			}

			state
				.codes
				.remove(&request.code)
				.map(|issued| issued.grant)
				.ok_or_else(|| invalid_grant("authorization code vanished"))?
		};
		let scope = if request.scope.is_empty() { grant.scope.as_str() } else { &request.scope };

		self.issue(&grant.client_id, &grant.user_id, scope, true)
	}

	fn rotate_refresh(&self, request: &TokenRequest) -> Result<TokenHandle, IssuanceError> {
		let now = self.clock.now();
		let previous = {
			let mut state = self.state.write();
			let access_token = state.refresh.get(&request.refresh_token).cloned().ok_or_else(|| {
				IssuanceError::rejected(OAuthErrorCode::InvalidGrant, "refresh token is invalid")
			})?;
			let previous = state.access.get(&access_token).cloned().ok_or_else(|| {
				IssuanceError::rejected(OAuthErrorCode::InvalidGrant, "refresh token is invalid")
			})?;

			if previous.client_id != request.client_id {
				return Err(IssuanceError::rejected(
					OAuthErrorCode::InvalidGrant,
					"refresh token was issued to another client",
				));
			}
			if previous.refresh_expires_in.is_positive()
				&& previous.refresh_deadline().is_none_or(|deadline| now >= deadline)
			{
				return Err(IssuanceError::rejected(
					OAuthErrorCode::InvalidGrant,
					"refresh token has expired",
				));
			}
			if !scope_covers(&previous.scope, &request.scope) {
				return Err(IssuanceError::rejected(
					OAuthErrorCode::InvalidScope,
					"requested scope exceeds the original grant",
				));
			}

			state.forget(&access_token);

			previous
		};
		let scope = if request.scope.is_empty() { previous.scope.as_str() } else { &request.scope };

		self.issue(&previous.client_id, &previous.user_id, scope, true)
	}

	fn issue(
		&self,
		client_id: &str,
		user_id: &str,
		scope: &str,
		with_refresh: bool,
	) -> Result<TokenHandle, IssuanceError> {
		self.maybe_purge();

		let mut builder = TokenHandle::builder(client_id)
			.user_id(user_id)
			.scope(scope)
			.access_token(random_string(TOKEN_LEN))
			.issued_at(self.clock.now())
			.access_expires_in(self.config.effective_access_ttl());

		if with_refresh {
			builder = builder
				.refresh_token(random_string(TOKEN_LEN), self.config.effective_refresh_ttl());
		}

		let handle =
			builder.build().map_err(|e| IssuanceError::Backend { message: e.to_string() })?;
		let mut state = self.state.write();

		if let Some(refresh) = &handle.refresh_token {
			state.refresh.insert(refresh.expose().to_owned(), handle.access_token.expose().to_owned());
		}

		state.access.insert(handle.access_token.expose().to_owned(), handle.clone());

		Ok(handle)
	}

	fn load_now(&self, access_token: &str) -> Result<TokenHandle, LookupError> {
		self.lookups.fetch_add(1, Ordering::Relaxed);

		let now = self.clock.now();
		let mut state = self.state.write();
		let handle = state.access.get(access_token).ok_or(LookupError::NotFound)?;

		if handle.access_deadline().is_some_and(|deadline| now < deadline) {
			return Ok(handle.clone());
		}
		if is_spent(handle, now) {
			state.forget(access_token);
		}

		Err(LookupError::NotFound)
	}

	fn maybe_purge(&self) {
		let due = {
			let last_purge = self.last_purge.lock();

			self.clock.now() - *last_purge >= self.config.purge_interval
		};

		if due {
			self.purge_expired();
		}
	}
}
impl Debug for MemoryIssuer {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		let state = self.state.read();

		f.debug_struct("MemoryIssuer")
			.field("config", &self.config)
			.field("clients", &state.clients.len())
			.field("users", &state.users.len())
			.field("tokens", &state.access.len())
			.field("available", &self.available.load(Ordering::Relaxed))
			.finish()
	}
}
impl Issuer for MemoryIssuer {
	fn validate_request(&self, raw: &RawTokenRequest) -> Result<TokenRequest, ValidationError> {
		let mut request = TokenRequest::from_raw(raw)?;

		self.authenticate(&request.client_id, &request.client_secret).map_err(|_| {
			ValidationError::new(OAuthErrorCode::InvalidClient, "client authentication failed")
		})?;

		if request.grant_type == GrantType::Password {
			request.user_id =
				self.resolve_user(&request.username, &request.password).ok_or_else(|| {
					ValidationError::new(
						OAuthErrorCode::InvalidGrant,
						"resource owner credentials are invalid",
					)
				})?;
		}

		Ok(request)
	}

	fn mint<'a>(
		&'a self,
		grant_type: GrantType,
		request: &'a TokenRequest,
	) -> IssuerFuture<'a, TokenHandle, IssuanceError> {
		Box::pin(async move { self.mint_now(grant_type, request) })
	}

	fn load_access_token<'a>(
		&'a self,
		access_token: &'a str,
	) -> IssuerFuture<'a, TokenHandle, LookupError> {
		Box::pin(async move { self.load_now(access_token) })
	}
}

fn is_spent(handle: &TokenHandle, now: OffsetDateTime) -> bool {
	let access_live = handle.access_deadline().is_some_and(|deadline| now < deadline);
	let refresh_live = handle.refresh_token.is_some()
		&& (!handle.refresh_expires_in.is_positive()
			|| handle.refresh_deadline().is_some_and(|deadline| now < deadline));

	!access_live && !refresh_live
}

fn scope_covers(granted: &str, requested: &str) -> bool {
	requested.split_whitespace().all(|scope| granted.split_whitespace().any(|g| g == scope))
}

fn random_string(len: usize) -> String {
	rand::rng().sample_iter(Alphanumeric).take(len).map(char::from).collect()
}
