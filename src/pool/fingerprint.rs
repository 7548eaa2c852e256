//! Deterministic cache keys derived from a token request's identity fields.

// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD_NO_PAD};
use sha2::{Digest, Sha256};
// self
use crate::{_prelude::*, auth::TokenRequest};

const DOMAIN_TAG: &[u8] = b"oauth2-token-pool/fingerprint/v1";
const SHORT_LEN: usize = 12;

/// Fixed-size digest of the nine identity fields of a token request.
///
/// Fields are hashed in a fixed order (client id, client secret, user id, scope, code,
/// code challenge, code challenge method, refresh token, code verifier), each framed by
/// its byte length, so no field content can spill into a neighbour and two distinct tuples
/// never share an encoding. The value is a base64 (no padding) SHA-256 digest and is only
/// ever used as a cache key.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);
impl Fingerprint {
	/// Fingerprints a validated token request.
	pub fn of(request: &TokenRequest) -> Self {
		Self::from_fields(request.identity_fields())
	}

	/// Fingerprints the identity fields directly.
	pub fn from_fields(fields: [&str; 9]) -> Self {
		let mut hasher = Sha256::new();

		hasher.update(DOMAIN_TAG);

		for field in fields {
			hasher.update((field.len() as u64).to_be_bytes());
			hasher.update(field.as_bytes());
		}

		Self(STANDARD_NO_PAD.encode(hasher.finalize()))
	}

	/// Full digest string.
	pub fn as_str(&self) -> &str {
		&self.0
	}

	/// Leading characters of the digest, for log and span labels.
	pub fn short(&self) -> &str {
		&self.0[..SHORT_LEN.min(self.0.len())]
	}
}
impl Debug for Fingerprint {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("Fingerprint").field(&self.short()).finish()
	}
}
impl Display for Fingerprint {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::auth::GrantType;

	const BASE: [&str; 9] = ["client", "secret", "user", "read write", "code", "ch", "S256", "rt", "cv"];

	#[test]
	fn identical_tuples_share_a_fingerprint() {
		let request = TokenRequest::new(GrantType::ClientCredentials, "svc")
			.with_client_secret("s3cret")
			.with_scope("read");
		let same = request.clone();

		assert_eq!(Fingerprint::of(&request), Fingerprint::of(&same));
		assert_eq!(Fingerprint::of(&request).as_str().len(), 43);
	}

	#[test]
	fn changing_any_field_changes_the_fingerprint() {
		let base = Fingerprint::from_fields(BASE);

		for (idx, field) in BASE.iter().enumerate() {
			let altered = format!("{field}x");
			let mut fields = BASE;

			fields[idx] = &altered;

			assert_ne!(Fingerprint::from_fields(fields), base, "field {idx} must affect the key");
		}
	}

	#[test]
	fn field_order_is_significant() {
		let mut swapped = BASE;

		swapped.swap(0, 2);

		assert_ne!(Fingerprint::from_fields(swapped), Fingerprint::from_fields(BASE));
	}

	#[test]
	fn separator_bearing_fields_do_not_collide() {
		let lhs = Fingerprint::from_fields(["a|b", "c", "", "", "", "", "", "", ""]);
		let rhs = Fingerprint::from_fields(["a", "b|c", "", "", "", "", "", "", ""]);

		assert_ne!(lhs, rhs);
	}

	#[test]
	fn grant_type_is_not_part_of_the_identity() {
		let client = TokenRequest::new(GrantType::ClientCredentials, "svc");
		let password = TokenRequest::new(GrantType::Password, "svc");

		assert_eq!(Fingerprint::of(&client), Fingerprint::of(&password));
		assert_eq!(Fingerprint::of(&client).short().len(), 12);
	}
}
