//! OpenID Connect discovery: lazy retrieval of `.well-known/openid-configuration` and
//! reconciliation with the static provider configuration.
//!
//! Reconciliation rules:
//! - A value present in both the static configuration and the discovery document is taken from
//!   discovery, and the ignored static attributes are reported in one warning.
//! - `scope`, `tokenEndpointAuthMethod`, and `signatureAlgorithm` defaults are auto-adjusted to
//!   a value the provider advertises. Explicit values are never adjusted.
//! - Without a `discoveryEndpoint` the static configuration is used as is.

// self
use crate::{
	_prelude::*,
	auth::ScopeSet,
	config::ProviderConfig,
	http::ReqwestHttpClient,
	jose::{JwksCache, SignatureAlgorithm, ValidationPolicy},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	provider::{ProviderDescriptor, ProviderQuirks, TokenEndpointAuthMethod},
};

/// Discovery failures. All of them surface as 401 on the resource access that triggered
/// discovery.
#[derive(Debug, ThisError)]
pub enum DiscoveryError {
	/// The discovery endpoint is not an HTTPS URL.
	#[error("The discovery endpoint {url} of `{provider}` does not use HTTPS.")]
	Insecure {
		/// Provider identifier.
		provider: String,
		/// Configured URL.
		url: String,
	},
	/// The discovery endpoint answered with a non-success status.
	#[error("The discovery endpoint {url} of `{provider}` returned HTTP status {status}.")]
	HttpStatus {
		/// Provider identifier.
		provider: String,
		/// Discovery URL.
		url: String,
		/// HTTP status code.
		status: u16,
	},
	/// The discovery endpoint could not be contacted.
	#[error("Could not obtain provider info from the discovery endpoint {url} of `{provider}`: {reason}.")]
	Unobtainable {
		/// Provider identifier.
		provider: String,
		/// Discovery URL.
		url: String,
		/// Transport failure.
		reason: String,
	},
	/// The discovery document is not valid JSON of the expected shape.
	#[error("The discovery document from {url} of `{provider}` is malformed.")]
	Parse {
		/// Provider identifier.
		provider: String,
		/// Discovery URL.
		url: String,
		/// Path-aware parse failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// A discovered endpoint is not a valid URL.
	#[error("The discovered `{field}` value `{value}` of `{provider}` is not a valid URL.")]
	InvalidEndpoint {
		/// Provider identifier.
		provider: String,
		/// Discovery document field.
		field: &'static str,
		/// Offending value.
		value: String,
	},
}
impl DiscoveryError {
	/// Stable label for log events.
	pub fn code(&self) -> &'static str {
		match self {
			Self::Insecure { .. } => "discovery.insecure",
			Self::HttpStatus { .. } => "discovery.http_status",
			Self::Unobtainable { .. } => "discovery.unobtainable",
			Self::Parse { .. } => "discovery.parse",
			Self::InvalidEndpoint { .. } => "discovery.invalid_endpoint",
		}
	}
}

/// Subset of the OpenID Provider metadata the engine consumes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryDocument {
	/// `issuer`.
	pub issuer: Option<String>,
	/// `authorization_endpoint`.
	pub authorization_endpoint: Option<String>,
	/// `token_endpoint`.
	pub token_endpoint: Option<String>,
	/// `jwks_uri`.
	pub jwks_uri: Option<String>,
	/// `userinfo_endpoint`.
	pub userinfo_endpoint: Option<String>,
	/// `scopes_supported`.
	pub scopes_supported: Vec<String>,
	/// `response_types_supported`.
	pub response_types_supported: Vec<String>,
	/// `token_endpoint_auth_methods_supported`.
	pub token_endpoint_auth_methods_supported: Vec<String>,
	/// `id_token_signing_alg_values_supported`.
	pub id_token_signing_alg_values_supported: Vec<String>,
}

/// Fetches and parses a discovery document.
pub async fn fetch(
	provider: &str,
	url: &Url,
	http: &ReqwestHttpClient,
) -> Result<DiscoveryDocument, DiscoveryError> {
	if url.scheme() != "https" {
		return Err(DiscoveryError::Insecure { provider: provider.to_owned(), url: url.to_string() });
	}

	tracing::debug!(provider, url = %url, "Fetching discovery document.");

	let reply = http.fetch(url, http.get(url.clone())).await.map_err(|e| {
		DiscoveryError::Unobtainable {
			provider: provider.to_owned(),
			url: url.to_string(),
			reason: e.to_string(),
		}
	})?;

	if !reply.is_success() {
		return Err(DiscoveryError::HttpStatus {
			provider: provider.to_owned(),
			url: url.to_string(),
			status: reply.status,
		});
	}

	reply.json().map_err(|source| DiscoveryError::Parse {
		provider: provider.to_owned(),
		url: url.to_string(),
		source,
	})
}

/// Provider configuration reconciled with its discovery document.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedConfig {
	/// Endpoints, grants, and client authentication flows run against.
	pub descriptor: ProviderDescriptor,
	/// Token validation settings.
	pub policy: ValidationPolicy,
	/// Static attributes superseded by discovered values.
	pub ignored: Vec<&'static str>,
	/// Default attributes auto-adjusted to discovered values.
	pub adjusted: Vec<&'static str>,
}

/// Reconciles `config` with an optional discovery document.
///
/// Pure apart from log events: the same inputs always produce the same output.
pub fn resolve(config: &ProviderConfig, document: Option<&DiscoveryDocument>) -> Result<ResolvedConfig> {
	let provider: &str = config.id.as_ref();
	let profile = config.profile();
	let mut ignored = Vec::new();
	let mut adjusted = Vec::new();
	let mut authorization = config.authorization_endpoint.clone();
	let mut token = config.token_endpoint.clone();
	let mut jwks = config.jwks_uri.clone();
	let mut issuer = config.issuer.clone();
	let mut scope = config.scope.value.clone();
	let mut auth_method = config.token_endpoint_auth_method.value;
	let mut algorithm = config.signature_algorithm.value;

	if let Some(document) = document {
		for (name, field, slot, discovered) in [
			(
				"authorizationEndpoint",
				"authorization_endpoint",
				&mut authorization,
				document.authorization_endpoint.as_deref(),
			),
			("tokenEndpoint", "token_endpoint", &mut token, document.token_endpoint.as_deref()),
			("jwksUri", "jwks_uri", &mut jwks, document.jwks_uri.as_deref()),
		] {
			let Some(discovered) = discovered else { continue };
			let url = Url::parse(discovered).map_err(|_| DiscoveryError::InvalidEndpoint {
				provider: provider.to_owned(),
				field,
				value: discovered.to_owned(),
			})?;

			if slot.is_some() {
				ignored.push(name);
			}

			*slot = Some(url);
		}

		if let Some(discovered) = &document.issuer {
			if issuer.is_some() {
				ignored.push("issuer");
			}

			issuer = Some(discovered.clone());
		}

		if let Some(value) = adjust_scope(config, &document.scopes_supported) {
			scope = value;
			adjusted.push("scope");
		}
		if let Some(value) =
			adjust_auth_method(config, &document.token_endpoint_auth_methods_supported)
		{
			auth_method = value;
			adjusted.push("tokenEndpointAuthMethod");
		}
		if let Some(value) =
			adjust_algorithm(config, &document.id_token_signing_alg_values_supported)
		{
			algorithm = value;
			adjusted.push("signatureAlgorithm");
		}

		if !ignored.is_empty() {
			tracing::warn!(
				provider,
				code = "discovery.static_values_ignored",
				"Discovery is enabled for `{provider}`, so the configured values of {} are ignored.",
				ignored.join(", ")
			);
		}
		if !adjusted.is_empty() {
			tracing::info!(
				provider,
				scope = %scope.normalized(),
				token_endpoint_auth_method = %auth_method,
				signature_algorithm = %algorithm,
				"Default values of {} were adjusted to what `{provider}` advertises.",
				adjusted.join(", ")
			);
		}
	}

	let descriptor = ProviderDescriptor::builder(config.id.clone())
		.issuer(issuer)
		.authorization_endpoint(authorization)
		.token_endpoint(token)
		.jwks_uri(jwks)
		.user_api(config.user_api.clone())
		.support_grants(profile.supported_response_types().iter().map(|ty| ty.grant()))
		.response_type(config.response_type)
		.client_auth_method(auth_method)
		.scope(scope)
		.signature_algorithm(algorithm)
		.quirks(ProviderQuirks {
			pkce_required: profile.requires_pkce(),
			id_token_expected: profile.expects_id_token(),
			basic_auth_supported: profile.supports_basic_auth(),
		})
		.build()?;
	let policy = ValidationPolicy {
		algorithm,
		audiences: config.audiences.clone(),
		clock_skew: config.clock_skew,
		trust_alias: config.trust_alias_name.clone(),
		decryption_alias: config.key_management_key_alias.clone(),
	};

	Ok(ResolvedConfig { descriptor, policy, ignored, adjusted })
}

fn adjust_scope(config: &ProviderConfig, supported: &[String]) -> Option<ScopeSet> {
	let scope = &config.scope;

	if supported.is_empty() || scope.value.is_supported_by(supported) {
		return None;
	}
	if scope.explicit {
		tracing::warn!(
			provider = %config.id,
			code = "discovery.scope_unsupported",
			"The configured scope `{}` of `{}` includes values the provider does not advertise.",
			scope.value.normalized(),
			config.id
		);

		return None;
	}

	Some(scope.value.retain_supported(supported)).filter(|scope| !scope.is_empty())
}

fn adjust_auth_method(
	config: &ProviderConfig,
	supported: &[String],
) -> Option<TokenEndpointAuthMethod> {
	let method = &config.token_endpoint_auth_method;

	if supported.is_empty() || supported.iter().any(|value| value == method.value.as_str()) {
		return None;
	}
	if method.explicit {
		tracing::warn!(
			provider = %config.id,
			code = "discovery.auth_method_unsupported",
			"The configured tokenEndpointAuthMethod `{}` of `{}` is not advertised by the provider.",
			method.value,
			config.id
		);

		return None;
	}

	supported.iter().find_map(|value| value.parse().ok())
}

fn adjust_algorithm(config: &ProviderConfig, supported: &[String]) -> Option<SignatureAlgorithm> {
	let algorithm = &config.signature_algorithm;

	if supported.is_empty()
		|| algorithm.explicit
		|| supported.iter().any(|value| value == algorithm.value.as_str())
	{
		return None;
	}

	supported.iter().find_map(|value| value.parse().ok())
}

/// Resolved view of one provider entry, cached for the lifetime of a configuration generation.
#[derive(Debug)]
pub struct ResolvedProvider {
	/// Reconciled configuration.
	pub config: ResolvedConfig,
	/// JWK set of the provider, when one is known.
	pub jwks: Option<JwksCache>,
}
impl ResolvedProvider {
	/// Wraps a reconciled configuration, preparing its JWK set cache.
	pub fn new(config: ResolvedConfig) -> Self {
		let jwks = config.descriptor.endpoints.jwks.clone().map(JwksCache::new);

		Self { config, jwks }
	}

	/// Resolved descriptor.
	pub fn descriptor(&self) -> &ProviderDescriptor {
		&self.config.descriptor
	}

	/// Validation settings.
	pub fn policy(&self) -> &ValidationPolicy {
		&self.config.policy
	}
}

/// Resolves a provider, fetching its discovery document first when one is configured.
pub async fn resolve_provider(
	config: &ProviderConfig,
	http: &ReqwestHttpClient,
) -> Result<ResolvedProvider> {
	let provider: &str = config.id.as_ref();
	let Some(url) = &config.discovery_endpoint else {
		return resolve(config, None).map(ResolvedProvider::new);
	};
	let span = FlowSpan::new(FlowKind::Discovery, "resolve_provider", provider);

	obs::record_flow_outcome(FlowKind::Discovery, FlowOutcome::Attempt);

	let result = span
		.instrument(async {
			let document = fetch(provider, url, http).await.inspect_err(|e| {
				tracing::error!(provider, code = e.code(), "{e}");
				tracing::error!(
					provider,
					code = "discovery.failed",
					"Failed to obtain the OpenID Connect provider information for `{provider}` from {url}."
				);
			})?;

			resolve(config, Some(&document)).map(ResolvedProvider::new)
		})
		.await;
	let outcome = if result.is_ok() { FlowOutcome::Success } else { FlowOutcome::Failure };

	obs::record_flow_outcome(FlowKind::Discovery, outcome);

	result
}
