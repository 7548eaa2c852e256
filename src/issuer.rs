//! Contract between the pool and the token issuance backend.
//!
//! The pool treats the issuer as the source of truth: it mints through [`Issuer::mint`]
//! and asks [`Issuer::load_access_token`] whether a pooled token is still tracked before
//! serving it again. Request validation lives here too, so endpoint glue can reject
//! malformed requests before the pool is touched.

pub mod memory;

pub use memory::*;

// self
use crate::{
	_prelude::*,
	auth::{GrantType, RawTokenRequest, TokenHandle, TokenRequest},
	error::{IssuanceError, LookupError, ValidationError},
};

/// Boxed future returned by [`Issuer`] operations.
pub type IssuerFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + 'a + Send>>;

/// Token issuance backend consulted by the pool.
///
/// Implementors are required to be `Send + Sync`; only [`Issuer::mint`] and
/// [`Issuer::load_access_token`] are mandatory.
pub trait Issuer
where
	Self: Send + Sync,
{
	/// Turns raw endpoint parameters into a validated request.
	///
	/// The default implementation only performs structural checks. Override it to add
	/// client authentication, scope checks, or to resolve the resource owner.
	fn validate_request(&self, raw: &RawTokenRequest) -> Result<TokenRequest, ValidationError> {
		TokenRequest::from_raw(raw)
	}

	/// Mints a brand-new token for the validated request.
	fn mint<'a>(
		&'a self,
		grant_type: GrantType,
		request: &'a TokenRequest,
	) -> IssuerFuture<'a, TokenHandle, IssuanceError>;

	/// Returns the issuer's current copy of a token, or [`LookupError::NotFound`] once it
	/// expired, was revoked, or was rotated away.
	fn load_access_token<'a>(
		&'a self,
		access_token: &'a str,
	) -> IssuerFuture<'a, TokenHandle, LookupError>;
}
