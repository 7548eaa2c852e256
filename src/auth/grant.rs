//! Grant types and PKCE challenge methods accepted at the token endpoint.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};
// self
use crate::{
	_prelude::*,
	error::{OAuthErrorCode, ValidationError},
};

/// OAuth 2.0 grant types the token endpoint understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
	/// Authorization Code grant (PKCE optional).
	AuthorizationCode,
	/// Resource Owner Password Credentials grant.
	Password,
	/// Client Credentials grant for app-only tokens.
	ClientCredentials,
	/// Refresh Token grant.
	RefreshToken,
}
impl GrantType {
	/// Returns the RFC 6749 identifier for the grant type.
	pub const fn as_str(self) -> &'static str {
		match self {
			GrantType::AuthorizationCode => "authorization_code",
			GrantType::Password => "password",
			GrantType::ClientCredentials => "client_credentials",
			GrantType::RefreshToken => "refresh_token",
		}
	}
}
impl Display for GrantType {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
impl FromStr for GrantType {
	type Err = ValidationError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"authorization_code" => Ok(Self::AuthorizationCode),
			"password" => Ok(Self::Password),
			"client_credentials" => Ok(Self::ClientCredentials),
			"refresh_token" => Ok(Self::RefreshToken),
			other => Err(ValidationError::new(
				OAuthErrorCode::UnsupportedGrantType,
				format!("grant type `{other}` is not supported"),
			)),
		}
	}
}

/// PKCE challenge methods (RFC 7636).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CodeChallengeMethod {
	/// Verifier is sent verbatim as the challenge.
	#[serde(rename = "plain")]
	Plain,
	/// Challenge is the base64url SHA-256 digest of the verifier.
	S256,
}
impl CodeChallengeMethod {
	/// Returns the RFC 7636 identifier for the method.
	pub const fn as_str(self) -> &'static str {
		match self {
			CodeChallengeMethod::Plain => "plain",
			CodeChallengeMethod::S256 => "S256",
		}
	}

	/// Derives the challenge for `verifier` under this method.
	pub fn challenge(self, verifier: &str) -> String {
		match self {
			CodeChallengeMethod::Plain => verifier.to_owned(),
			CodeChallengeMethod::S256 => {
				let mut hasher = Sha256::new();

				hasher.update(verifier.as_bytes());

				URL_SAFE_NO_PAD.encode(hasher.finalize())
			},
		}
	}

	/// Checks a verifier against a previously recorded challenge.
	pub fn verify(self, verifier: &str, challenge: &str) -> bool {
		!verifier.is_empty() && self.challenge(verifier) == challenge
	}
}
impl FromStr for CodeChallengeMethod {
	type Err = ValidationError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			// RFC 7636 defaults to `plain` when the method is omitted.
			"" | "plain" => Ok(Self::Plain),
			"S256" => Ok(Self::S256),
			other => Err(ValidationError::invalid_request(format!(
				"code challenge method `{other}` is not supported"
			))),
		}
	}
}
