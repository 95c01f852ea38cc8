//! Flow state storage: pending authorization requests and the bearer token subject cache.

pub mod memory;

pub use memory::MemoryFlowStore;

// crates.io
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};
// self
use crate::{
	_prelude::*,
	auth::{Authentication, ProviderId, Secret},
	provider::ResponseType,
};

/// Pending authorization requests older than this are rejected on callback.
pub const AUTHORIZATION_TTL: Duration = Duration::minutes(10);

/// Boxed future returned by [`FlowStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Storage contract for state that spans the redirect to the provider and back.
pub trait FlowStore
where
	Self: Send + Sync + Debug,
{
	/// Records an authorization request under its `state`.
	fn put_authorization(&self, request: AuthorizationRequest) -> StoreFuture<'_, ()>;

	/// Removes and returns the request stored under `state`.
	///
	/// Expired requests are removed but not returned, so each state is usable at most once.
	fn take_authorization<'a>(
		&'a self,
		state: &'a str,
		now: OffsetDateTime,
	) -> StoreFuture<'a, Option<AuthorizationRequest>>;

	/// Caches the authentication established for a bearer token until `expires_at`.
	fn cache_bearer(
		&self,
		key: String,
		authentication: Authentication,
		expires_at: OffsetDateTime,
	) -> StoreFuture<'_, ()>;

	/// Returns the cached authentication for a bearer token that has not expired.
	fn cached_bearer<'a>(
		&'a self,
		key: &'a str,
		now: OffsetDateTime,
	) -> StoreFuture<'a, Option<Authentication>>;
}

/// Error type produced by [`FlowStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum StoreError {
	/// Backend-level failure.
	#[error("Flow store failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

/// Authorization request awaiting the provider's callback.
#[derive(Clone)]
pub struct AuthorizationRequest {
	/// Provider the request was sent to; callbacks for other providers are rejected.
	pub provider: ProviderId,
	/// Opaque `state` value.
	pub state: String,
	/// `nonce` sent to OpenID Connect providers.
	pub nonce: Option<String>,
	/// PKCE verifier matching the `code_challenge`.
	pub pkce_verifier: Option<Secret>,
	/// Redirect URI sent on the authorization request.
	pub redirect_uri: Url,
	/// Protected resource the caller originally asked for.
	pub original_url: Url,
	/// Response type requested.
	pub response_type: ResponseType,
	/// Creation instant.
	pub created_at: OffsetDateTime,
}
impl AuthorizationRequest {
	/// Returns true when the request is older than `ttl`.
	pub fn is_expired(&self, now: OffsetDateTime, ttl: Duration) -> bool {
		now - self.created_at > ttl
	}
}
impl Debug for AuthorizationRequest {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthorizationRequest")
			.field("provider", &self.provider)
			.field("state", &"<redacted>")
			.field("redirect_uri", &self.redirect_uri.as_str())
			.field("original_url", &self.original_url.as_str())
			.field("response_type", &self.response_type)
			.field("created_at", &self.created_at)
			.finish_non_exhaustive()
	}
}

/// Cache key of a bearer token: a digest of the provider id and the token, so raw tokens are
/// never kept as map keys.
pub fn bearer_key(provider: &ProviderId, token: &str) -> String {
	let mut hasher = Sha256::new();

	hasher.update(provider.as_bytes());
	hasher.update([0]);
	hasher.update(token.as_bytes());

	URL_SAFE_NO_PAD.encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn bearer_keys_are_scoped_by_provider() {
		let a = ProviderId::new("a").expect("Provider fixture should be valid.");
		let b = ProviderId::new("b").expect("Provider fixture should be valid.");

		assert_eq!(bearer_key(&a, "token"), bearer_key(&a, "token"));
		assert_ne!(bearer_key(&a, "token"), bearer_key(&b, "token"));
		assert!(!bearer_key(&a, "token").contains("token"));
	}

	#[test]
	fn store_error_converts_into_engine_error() {
		let error = Error::from(StoreError::Backend { message: "unreachable".into() });

		assert_eq!(error.status(), 500);
		assert!(error.to_string().contains("unreachable"));
	}
}
