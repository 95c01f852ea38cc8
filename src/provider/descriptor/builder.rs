// self
use crate::{
	_prelude::*,
	auth::{ProviderId, ScopeSet},
	error::ConfigError,
	jose::SignatureAlgorithm,
	provider::{
		GrantType, ProviderDescriptor, ProviderEndpoints, ProviderQuirks, ResponseType,
		SupportedGrants, TokenEndpointAuthMethod,
	},
};

/// Builder for [`ProviderDescriptor`] values.
#[derive(Debug)]
pub struct ProviderDescriptorBuilder {
	/// Identifier for the descriptor being constructed.
	pub id: ProviderId,
	/// Expected token issuer.
	pub issuer: Option<String>,
	/// Authorization endpoint (always required).
	pub authorization_endpoint: Option<Url>,
	/// Token endpoint (required for the Authorization Code grant).
	pub token_endpoint: Option<Url>,
	/// JWK set endpoint.
	pub jwks_uri: Option<Url>,
	/// User API endpoint.
	pub user_api: Option<Url>,
	/// Grants enabled for the provider.
	pub supported_grants: SupportedGrants,
	/// Response type requested on the redirect.
	pub response_type: ResponseType,
	/// Client authentication method for the token endpoint.
	pub client_auth_method: TokenEndpointAuthMethod,
	/// Requested scopes.
	pub scope: ScopeSet,
	/// Expected token signature algorithm.
	pub signature_algorithm: SignatureAlgorithm,
	/// Provider capabilities.
	pub quirks: ProviderQuirks,
}
impl ProviderDescriptorBuilder {
	/// Creates a new builder seeded with the provided identifier.
	pub fn new(id: ProviderId) -> Self {
		Self {
			id,
			issuer: None,
			authorization_endpoint: None,
			token_endpoint: None,
			jwks_uri: None,
			user_api: None,
			supported_grants: SupportedGrants::default(),
			response_type: ResponseType::default(),
			client_auth_method: TokenEndpointAuthMethod::default(),
			scope: ScopeSet::default(),
			signature_algorithm: SignatureAlgorithm::default(),
			quirks: ProviderQuirks::default(),
		}
	}

	/// Sets the expected token issuer.
	pub fn issuer(mut self, issuer: Option<String>) -> Self {
		self.issuer = issuer;

		self
	}

	/// Sets the authorization endpoint.
	pub fn authorization_endpoint(mut self, url: Option<Url>) -> Self {
		self.authorization_endpoint = url;

		self
	}

	/// Sets the token endpoint.
	pub fn token_endpoint(mut self, url: Option<Url>) -> Self {
		self.token_endpoint = url;

		self
	}

	/// Sets the JWK set endpoint.
	pub fn jwks_uri(mut self, url: Option<Url>) -> Self {
		self.jwks_uri = url;

		self
	}

	/// Sets the user API endpoint.
	pub fn user_api(mut self, url: Option<Url>) -> Self {
		self.user_api = url;

		self
	}

	/// Marks multiple grants as supported.
	pub fn support_grants<I>(mut self, grants: I) -> Self
	where
		I: IntoIterator<Item = GrantType>,
	{
		for grant in grants {
			self.supported_grants = self.supported_grants.enable(grant);
		}

		self
	}

	/// Sets the response type.
	pub fn response_type(mut self, response_type: ResponseType) -> Self {
		self.response_type = response_type;

		self
	}

	/// Sets the client authentication method.
	pub fn client_auth_method(mut self, method: TokenEndpointAuthMethod) -> Self {
		self.client_auth_method = method;

		self
	}

	/// Sets the requested scopes.
	pub fn scope(mut self, scope: ScopeSet) -> Self {
		self.scope = scope;

		self
	}

	/// Sets the expected signature algorithm.
	pub fn signature_algorithm(mut self, algorithm: SignatureAlgorithm) -> Self {
		self.signature_algorithm = algorithm;

		self
	}

	/// Overrides the provider capabilities.
	pub fn quirks(mut self, quirks: ProviderQuirks) -> Self {
		self.quirks = quirks;

		self
	}

	/// Consumes the builder and validates the resulting descriptor.
	pub fn build(self) -> Result<ProviderDescriptor, ConfigError> {
		let provider = self.id.to_string();
		let authorization = self.authorization_endpoint.ok_or_else(|| {
			ConfigError::MissingEndpoint { provider: provider.clone(), endpoint: "authorization" }
		})?;

		if self.response_type.grant() == GrantType::AuthorizationCode && self.token_endpoint.is_none()
		{
			return Err(ConfigError::MissingEndpoint { provider, endpoint: "token" });
		}

		let descriptor = ProviderDescriptor {
			id: self.id,
			issuer: self.issuer,
			endpoints: ProviderEndpoints {
				authorization,
				token: self.token_endpoint,
				jwks: self.jwks_uri,
				user_api: self.user_api,
			},
			supported_grants: self.supported_grants,
			response_type: self.response_type,
			client_auth_method: self.client_auth_method,
			scope: self.scope,
			signature_algorithm: self.signature_algorithm,
			quirks: self.quirks,
		};

		descriptor.validate()?;

		Ok(descriptor)
	}
}

impl ProviderDescriptor {
	fn validate(&self) -> Result<(), ConfigError> {
		let provider = self.id.as_ref();

		validate_endpoint(provider, "authorization", &self.endpoints.authorization)?;

		for (name, url) in [
			("token", self.endpoints.token.as_ref()),
			("jwks", self.endpoints.jwks.as_ref()),
			("user API", self.endpoints.user_api.as_ref()),
		] {
			if let Some(url) = url {
				validate_endpoint(provider, name, url)?;
			}
		}

		Ok(())
	}
}

fn validate_endpoint(provider: &str, name: &'static str, url: &Url) -> Result<(), ConfigError> {
	if url.scheme() != "https" {
		Err(ConfigError::InsecureEndpoint {
			provider: provider.to_owned(),
			endpoint: name,
			url: url.to_string(),
		})
	} else {
		Ok(())
	}
}
