//! Token sets returned by the token endpoint or an implicit callback.

// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, Secret},
};

/// Tokens received from the provider for one login attempt.
///
/// The set is immutable once received; it is dropped at the end of the flow unless the access
/// token is cached for bearer reuse.
#[derive(Clone)]
pub struct TokenSet {
	/// Access token secret.
	pub access_token: Secret,
	/// Compact ID token (JWS, or JWS nested in JWE), when the provider issued one.
	pub id_token: Option<Secret>,
	/// Token type reported by the provider (normally `Bearer`).
	pub token_type: String,
	/// Lifetime reported via `expires_in`.
	pub expires_in: Option<Duration>,
	/// Scopes granted, when the provider echoes them.
	pub scope: Option<ScopeSet>,
	/// Instant the set was received.
	pub received_at: OffsetDateTime,
}
impl TokenSet {
	/// Creates a bearer token set around an access token.
	pub fn new(access_token: Secret) -> Self {
		Self {
			access_token,
			id_token: None,
			token_type: "Bearer".into(),
			expires_in: None,
			scope: None,
			received_at: OffsetDateTime::now_utc(),
		}
	}

	/// Attaches an ID token.
	pub fn with_id_token(mut self, id_token: Secret) -> Self {
		self.id_token = Some(id_token);

		self
	}

	/// Overrides the token type.
	pub fn with_token_type(mut self, token_type: impl Into<String>) -> Self {
		self.token_type = token_type.into();

		self
	}

	/// Sets the reported lifetime.
	pub fn with_expires_in(mut self, expires_in: Duration) -> Self {
		self.expires_in = Some(expires_in);

		self
	}

	/// Sets the granted scopes.
	pub fn with_scope(mut self, scope: ScopeSet) -> Self {
		self.scope = Some(scope);

		self
	}

	/// Absolute expiry instant, when the provider reported a representable lifetime.
	pub fn expires_at(&self) -> Option<OffsetDateTime> {
		self.expires_in.and_then(|lifetime| self.received_at.checked_add(lifetime))
	}
}
impl Debug for TokenSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenSet")
			.field("access_token", &"<redacted>")
			.field("id_token", &self.id_token.as_ref().map(|_| "<redacted>"))
			.field("token_type", &self.token_type)
			.field("expires_in", &self.expires_in)
			.field("scope", &self.scope)
			.field("received_at", &self.received_at)
			.finish()
	}
}
