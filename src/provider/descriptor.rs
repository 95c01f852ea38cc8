//! Resolved provider descriptor shared by all flows.
//!
//! A descriptor is what remains after static configuration and the discovery document have
//! been reconciled: HTTPS endpoints, grants, client authentication, scope, and the expected
//! signature algorithm.

/// Builder API for assembling provider descriptors.
pub mod builder;
/// Grant, response type, and client authentication enums.
pub mod grant;
/// Provider capability toggles.
pub mod quirks;

pub use builder::*;
pub use grant::*;
pub use quirks::*;

// self
use crate::{
	_prelude::*,
	auth::{ProviderId, ScopeSet},
	jose::SignatureAlgorithm,
};

/// Endpoint set a flow runs against.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderEndpoints {
	/// Authorization endpoint the browser is redirected to.
	pub authorization: Url,
	/// Token endpoint; absent for implicit-only configurations.
	pub token: Option<Url>,
	/// JWK set used to verify signed tokens.
	pub jwks: Option<Url>,
	/// User API queried with the access token.
	pub user_api: Option<Url>,
}

/// Immutable provider descriptor consumed by flows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderDescriptor {
	/// Provider identifier.
	pub id: ProviderId,
	/// Expected `iss` of issued tokens.
	pub issuer: Option<String>,
	/// Endpoint definitions.
	pub endpoints: ProviderEndpoints,
	/// Grants the provider accepts.
	pub supported_grants: SupportedGrants,
	/// Response type requested on the authorization redirect.
	pub response_type: ResponseType,
	/// Client authentication used at the token endpoint.
	pub client_auth_method: TokenEndpointAuthMethod,
	/// Scopes requested on the authorization redirect.
	pub scope: ScopeSet,
	/// Algorithm tokens must be signed with.
	pub signature_algorithm: SignatureAlgorithm,
	/// Provider capabilities.
	pub quirks: ProviderQuirks,
}
impl ProviderDescriptor {
	/// Creates a new builder for the provided identifier.
	pub fn builder(id: ProviderId) -> ProviderDescriptorBuilder {
		ProviderDescriptorBuilder::new(id)
	}

	/// Checks whether the descriptor supports a given grant.
	pub fn supports(&self, grant: GrantType) -> bool {
		self.supported_grants.supports(grant)
	}
}
