//! Claim sets and the validated wrapper handed to subject mapping.

// self
use crate::_prelude::*;

/// Raw claim set decoded from a token payload or user API response.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Claims(JsonMap<String, JsonValue>);
impl Claims {
	/// Wraps a JSON object.
	pub fn new(map: JsonMap<String, JsonValue>) -> Self {
		Self(map)
	}

	/// Returns the raw value of a claim.
	pub fn get(&self, name: &str) -> Option<&JsonValue> {
		self.0.get(name)
	}

	/// Returns true when the claim is present and not null.
	pub fn contains(&self, name: &str) -> bool {
		self.get(name).is_some_and(|value| !value.is_null())
	}

	/// Returns a claim rendered as a string; numbers and booleans are stringified.
	pub fn string(&self, name: &str) -> Option<String> {
		match self.get(name)? {
			JsonValue::String(s) => Some(s.clone()),
			JsonValue::Number(n) => Some(n.to_string()),
			JsonValue::Bool(b) => Some(b.to_string()),
			_ => None,
		}
	}

	/// Returns a claim that may be a single string or an array of strings.
	pub fn strings(&self, name: &str) -> Vec<String> {
		match self.get(name) {
			Some(JsonValue::Array(items)) => items
				.iter()
				.filter_map(|item| match item {
					JsonValue::String(s) => Some(s.clone()),
					JsonValue::Number(n) => Some(n.to_string()),
					_ => None,
				})
				.collect(),
			Some(_) => self.string(name).into_iter().collect(),
			None => Vec::new(),
		}
	}

	/// Returns a numeric-date claim (`exp`, `iat`, `nbf`) as an instant.
	pub fn instant(&self, name: &str) -> Option<OffsetDateTime> {
		let seconds = self.get(name)?.as_i64()?;

		OffsetDateTime::from_unix_timestamp(seconds).ok()
	}

	/// `iss` claim.
	pub fn issuer(&self) -> Option<String> {
		self.string("iss")
	}

	/// `sub` claim.
	pub fn subject(&self) -> Option<String> {
		self.string("sub")
	}

	/// `aud` claim, normalized to a list.
	pub fn audiences(&self) -> Vec<String> {
		self.strings("aud")
	}

	/// Inserts or replaces a claim.
	pub fn insert(&mut self, name: impl Into<String>, value: impl Into<JsonValue>) {
		self.0.insert(name.into(), value.into());
	}

	/// Copies every claim from `other` that is not already present.
	pub fn merge_missing(&mut self, other: &Claims) {
		for (name, value) in &other.0 {
			self.0.entry(name.clone()).or_insert_with(|| value.clone());
		}
	}

	/// Borrows the underlying JSON object.
	pub fn as_map(&self) -> &JsonMap<String, JsonValue> {
		&self.0
	}

	/// Consumes the set, returning the underlying JSON object.
	pub fn into_map(self) -> JsonMap<String, JsonValue> {
		self.0
	}
}
impl From<JsonMap<String, JsonValue>> for Claims {
	fn from(map: JsonMap<String, JsonValue>) -> Self {
		Self(map)
	}
}

/// Where a validated claim set came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClaimOrigin {
	/// Signature-verified ID token.
	IdToken,
	/// Response of the configured user API, called with the access token over TLS.
	UserApi,
	/// ID token claims supplemented by user API claims.
	Merged,
}

/// Claims that passed every validation step.
///
/// Only the token validator and the user API resolver can construct this type, so subject
/// mapping never sees claims that skipped signature, decryption, issuer, or audience checks.
#[derive(Clone, Debug, PartialEq)]
pub struct ValidatedClaims {
	claims: Claims,
	origin: ClaimOrigin,
}
impl ValidatedClaims {
	pub(crate) fn new(claims: Claims, origin: ClaimOrigin) -> Self {
		Self { claims, origin }
	}

	/// Borrows the claims.
	pub fn claims(&self) -> &Claims {
		&self.claims
	}

	/// Origin of the claims.
	pub fn origin(&self) -> ClaimOrigin {
		self.origin
	}

	/// Supplements ID token claims with user API claims; ID token values win.
	pub(crate) fn merge(mut self, user_api: ValidatedClaims) -> Self {
		self.claims.merge_missing(&user_api.claims);
		self.origin = ClaimOrigin::Merged;

		self
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn claims(value: JsonValue) -> Claims {
		match value {
			JsonValue::Object(map) => Claims::new(map),
			_ => panic!("Claims fixture must be an object."),
		}
	}

	#[test]
	fn accessors_normalize_shapes() {
		let claims = claims(serde_json::json!({
			"iss": "https://op.example",
			"aud": "client",
			"groups": ["a", "b"],
			"id": 42,
			"exp": 1_700_000_000,
		}));

		assert_eq!(claims.issuer().as_deref(), Some("https://op.example"));
		assert_eq!(claims.audiences(), vec!["client".to_string()]);
		assert_eq!(claims.strings("groups"), vec!["a".to_string(), "b".to_string()]);
		assert_eq!(claims.string("id").as_deref(), Some("42"));
		assert_eq!(
			claims.instant("exp").map(OffsetDateTime::unix_timestamp),
			Some(1_700_000_000)
		);
		assert!(claims.strings("missing").is_empty());
	}

	#[test]
	fn merge_keeps_id_token_values() {
		let id_token = ValidatedClaims::new(
			claims(serde_json::json!({ "sub": "alice", "email": "a@op" })),
			ClaimOrigin::IdToken,
		);
		let user_api = ValidatedClaims::new(
			claims(serde_json::json!({ "sub": "other", "name": "Alice" })),
			ClaimOrigin::UserApi,
		);
		let merged = id_token.merge(user_api);

		assert_eq!(merged.origin(), ClaimOrigin::Merged);
		assert_eq!(merged.claims().subject().as_deref(), Some("alice"));
		assert_eq!(merged.claims().string("name").as_deref(), Some("Alice"));
	}
}
