//! Flow orchestration for protected resources and the redirect endpoint.
//!
//! [`SocialLogin`] sequences resolution, the authorization redirect, token exchange, token
//! validation, user info lookup, and subject mapping. Every request reads the active
//! configuration generation once and keeps it for the whole flow.

pub mod authorize;

mod bearer;
mod callback;
mod common;

pub use authorize::*;

// self
use crate::{
	_prelude::*,
	auth::ProviderId,
	config::ConfigRegistry,
	request::InboundRequest,
	store::{FlowStore, MemoryFlowStore},
};

/// States of a login attempt.
///
/// `Authenticated` is terminal; failures are reported through
/// [`FlowFailure`](crate::request::FlowFailure), whose state list ends with the state that failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowState {
	/// Request arrived without an established subject.
	Unauthenticated,
	/// Authorization request built and the browser sent to the provider.
	RedirectedToProvider,
	/// Waiting for the provider to redirect back.
	AwaitingCallback,
	/// Calling the token endpoint.
	ExchangingToken,
	/// Verifying the ID token or JWT access token.
	ValidatingToken,
	/// Calling the user API.
	ResolvingUserInfo,
	/// Mapping claims onto a subject.
	MappingSubject,
	/// Subject established.
	Authenticated,
}
impl FlowState {
	/// Returns a stable label suitable for span or log fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Unauthenticated => "unauthenticated",
			Self::RedirectedToProvider => "redirected_to_provider",
			Self::AwaitingCallback => "awaiting_callback",
			Self::ExchangingToken => "exchanging_token",
			Self::ValidatingToken => "validating_token",
			Self::ResolvingUserInfo => "resolving_user_info",
			Self::MappingSubject => "mapping_subject",
			Self::Authenticated => "authenticated",
		}
	}
}
impl Display for FlowState {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Social login engine shared by every request handler.
///
/// Cloning is cheap; clones share the configuration registry and the flow store.
#[derive(Clone, Debug)]
pub struct SocialLogin {
	registry: Arc<ConfigRegistry>,
	store: Arc<dyn FlowStore>,
}
impl SocialLogin {
	/// Creates an engine backed by an in-memory flow store.
	pub fn new(registry: Arc<ConfigRegistry>) -> Self {
		Self { registry, store: Arc::new(MemoryFlowStore::new()) }
	}

	/// Replaces the flow store.
	pub fn with_store(mut self, store: Arc<dyn FlowStore>) -> Self {
		self.store = store;

		self
	}

	/// Configuration registry the engine reads from.
	pub fn registry(&self) -> &Arc<ConfigRegistry> {
		&self.registry
	}

	/// Enabled providers whose auth filter accepts `request`, in declaration order.
	pub fn matching_providers(&self, request: &InboundRequest) -> Vec<ProviderId> {
		let generation = self.registry.current();

		generation
			.providers()
			.iter()
			.filter(|entry| {
				entry.config.enabled && common::filter_matches(&generation, &entry.config, request)
			})
			.map(|entry| entry.config.id.clone())
			.collect()
	}
}
