//! Thread-safe in-memory [`FlowStore`] implementation.

// self
use crate::{
	_prelude::*,
	auth::Authentication,
	store::{AUTHORIZATION_TTL, AuthorizationRequest, FlowStore, StoreFuture},
};

#[derive(Debug, Default)]
struct Entries {
	authorizations: HashMap<String, AuthorizationRequest>,
	bearers: HashMap<String, (Authentication, OffsetDateTime)>,
}

/// In-process flow store shared by every flow of an engine.
#[derive(Clone, Debug)]
pub struct MemoryFlowStore {
	entries: Arc<RwLock<Entries>>,
	ttl: Duration,
}
impl MemoryFlowStore {
	/// Creates a store with the default authorization lifetime.
	pub fn new() -> Self {
		Self { entries: Default::default(), ttl: AUTHORIZATION_TTL }
	}

	/// Overrides how long pending authorizations stay valid.
	pub fn with_ttl(mut self, ttl: Duration) -> Self {
		self.ttl = ttl;

		self
	}

	/// Number of pending authorization requests.
	pub fn pending_authorizations(&self) -> usize {
		self.entries.read().authorizations.len()
	}

	/// Number of cached bearer authentications.
	pub fn cached_bearers(&self) -> usize {
		self.entries.read().bearers.len()
	}

	fn put_now(&self, request: AuthorizationRequest) {
		let now = OffsetDateTime::now_utc();
		let mut entries = self.entries.write();

		entries.authorizations.retain(|_, pending| !pending.is_expired(now, self.ttl));
		entries.bearers.retain(|_, (_, expires_at)| *expires_at > now);
		entries.authorizations.insert(request.state.clone(), request);
	}

	fn take_now(&self, state: &str, now: OffsetDateTime) -> Option<AuthorizationRequest> {
		let request = self.entries.write().authorizations.remove(state)?;

		if request.is_expired(now, self.ttl) {
			tracing::debug!(provider = %request.provider, "Pending authorization expired.");

			return None;
		}

		Some(request)
	}

	fn cache_now(&self, key: String, authentication: Authentication, expires_at: OffsetDateTime) {
		let now = OffsetDateTime::now_utc();
		let mut entries = self.entries.write();

		entries.bearers.retain(|_, (_, expires_at)| *expires_at > now);
		entries.bearers.insert(key, (authentication, expires_at));
	}

	fn cached_now(&self, key: &str, now: OffsetDateTime) -> Option<Authentication> {
		let mut entries = self.entries.write();
		let (authentication, expires_at) = entries.bearers.get(key)?;

		if *expires_at > now {
			return Some(authentication.clone());
		}

		entries.bearers.remove(key);

		None
	}
}
impl Default for MemoryFlowStore {
	fn default() -> Self {
		Self::new()
	}
}
impl FlowStore for MemoryFlowStore {
	fn put_authorization(&self, request: AuthorizationRequest) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			self.put_now(request);

			Ok(())
		})
	}

	fn take_authorization<'a>(
		&'a self,
		state: &'a str,
		now: OffsetDateTime,
	) -> StoreFuture<'a, Option<AuthorizationRequest>> {
		Box::pin(async move { Ok(self.take_now(state, now)) })
	}

	fn cache_bearer(
		&self,
		key: String,
		authentication: Authentication,
		expires_at: OffsetDateTime,
	) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			self.cache_now(key, authentication, expires_at);

			Ok(())
		})
	}

	fn cached_bearer<'a>(
		&'a self,
		key: &'a str,
		now: OffsetDateTime,
	) -> StoreFuture<'a, Option<Authentication>> {
		Box::pin(async move { Ok(self.cached_now(key, now)) })
	}
}
