//! Validated per-provider configuration loaded from raw attributes.

// self
use crate::{
	_prelude::*,
	auth::{ProviderId, ScopeSet, Secret},
	config::{
		ProviderEntryDocument, Tracked,
		attribute::{AttributeReader, RawValue},
	},
	error::ConfigError,
	jose::{DEFAULT_CLOCK_SKEW, SignatureAlgorithm},
	provider::{ProviderKind, ProviderProfile, ResponseMode, ResponseType, TokenEndpointAuthMethod},
	userapi::UserApiType,
};

/// Header carrying bearer tokens unless `accessTokenHeaderName` says otherwise.
pub const DEFAULT_ACCESS_TOKEN_HEADER: &str = "Authorization";

/// Authorization request parameters the engine sets itself; operators cannot override them.
pub const RESERVED_AUTHZ_PARAMETERS: [&str; 9] = [
	"response_type",
	"client_id",
	"redirect_uri",
	"scope",
	"state",
	"nonce",
	"code_challenge",
	"code_challenge_method",
	"response_mode",
];

/// Immutable configuration of one social login entry.
///
/// Values are exactly what the operator configured, with profile defaults filled in. Discovery
/// never mutates a `ProviderConfig`; it produces a separate resolved view.
#[derive(Clone, Debug, PartialEq)]
pub struct ProviderConfig {
	/// Configuration identifier.
	pub id: ProviderId,
	/// Provider kind.
	pub kind: ProviderKind,
	/// Disabled entries reject every request.
	pub enabled: bool,
	/// OAuth client identifier. Blank values are forwarded to the provider.
	pub client_id: String,
	/// OAuth client secret, decoded from `{xor}` when obfuscated.
	pub client_secret: Option<Secret>,
	/// Static authorization endpoint.
	pub authorization_endpoint: Option<Url>,
	/// Static token endpoint.
	pub token_endpoint: Option<Url>,
	/// Static JWK set endpoint.
	pub jwks_uri: Option<Url>,
	/// Discovery document URL; `None` skips discovery.
	pub discovery_endpoint: Option<Url>,
	/// Expected token issuer.
	pub issuer: Option<String>,
	/// Requested scopes.
	pub scope: Tracked<ScopeSet>,
	/// Requested response type.
	pub response_type: ResponseType,
	/// Requested response mode.
	pub response_mode: ResponseMode,
	/// Client authentication at the token endpoint.
	pub token_endpoint_auth_method: Tracked<TokenEndpointAuthMethod>,
	/// User API endpoint; `None` when explicitly configured empty.
	pub user_api: Option<Url>,
	/// How the user API is called.
	pub user_api_type: UserApiType,
	/// Service account token for the `kube` user API.
	pub user_api_token: Option<Secret>,
	/// Claim holding the principal name.
	pub user_name_attribute: Tracked<String>,
	/// Claim holding group memberships.
	pub group_name_attribute: Option<String>,
	/// Claim holding the realm.
	pub realm_name_attribute: Option<String>,
	/// Claim holding the unique identifier.
	pub user_unique_id_attribute: Option<String>,
	/// Realm used when no realm claim resolves.
	pub realm_name: Option<String>,
	/// SSL trust configuration reference.
	pub ssl_ref: Option<String>,
	/// Authentication filter reference.
	pub auth_filter_ref: Option<String>,
	/// JWT builder that mints a token for authenticated callers.
	pub jwt_builder_ref: Option<String>,
	/// Key store alias verifying signatures instead of the JWK set.
	pub trust_alias_name: Option<String>,
	/// Key store alias of the RSA private key decrypting JWE tokens.
	pub key_management_key_alias: Option<String>,
	/// Requests without an access token fail instead of redirecting.
	pub access_token_required: bool,
	/// Access tokens presented on the request are honored.
	pub access_token_supported: bool,
	/// Header the access token is read from.
	pub access_token_header_name: String,
	/// Implicit responses are relayed through a client-side redirect page.
	pub client_side_redirect_supported: bool,
	/// The principal must exist in the user registry.
	pub map_to_user_registry: bool,
	/// A nonce accompanies OpenID Connect authorization requests.
	pub nonce_enabled: bool,
	/// Algorithm tokens must be signed with.
	pub signature_algorithm: Tracked<SignatureAlgorithm>,
	/// Accepted token audiences.
	pub audiences: Vec<String>,
	/// Tolerance for time-based claims.
	pub clock_skew: Duration,
	/// Inbound query parameters copied onto the authorization request.
	pub forward_login_parameters: Vec<String>,
	/// Static authorization request parameters.
	pub authz_parameters: Vec<(String, String)>,
	/// Origin used for the redirect URI instead of the request origin.
	pub redirect_to_rp_host_and_port: Option<Url>,
}
impl ProviderConfig {
	/// Validates a provider entry.
	///
	/// Fatal problems (missing `clientId`, malformed URLs, unsupported `responseType` or
	/// `signatureAlgorithm`) are errors. Invalid values of lenient attributes are logged and
	/// replaced by their defaults.
	pub fn load(entry: &ProviderEntryDocument) -> Result<Self, ConfigError> {
		let id = ProviderId::new(&entry.id)?;
		let profile = entry.kind.profile();
		let reader = AttributeReader::new(&entry.id, &entry.attributes);
		let client_id = reader.required("clientId")?;
		let defaults = profile.default_endpoints();
		let response_type = reader.strict::<ResponseType>("responseType")?.unwrap_or_default();
		let response_mode = reader
			.lenient::<ResponseMode>("responseMode")
			.unwrap_or_else(|| response_type.default_mode());
		let scope = match reader.non_blank("scope")? {
			Some(scope) => Tracked::explicit(scope.parse::<ScopeSet>()?),
			None => Tracked::default_value(ScopeSet::new(profile.default_scope().iter().copied())?),
		};
		let token_endpoint_auth_method =
			match reader.lenient::<TokenEndpointAuthMethod>("tokenEndpointAuthMethod") {
				Some(method) => Tracked::explicit(method),
				None => Tracked::default_value(TokenEndpointAuthMethod::default()),
			};
		let signature_algorithm = match reader.strict::<SignatureAlgorithm>("signatureAlgorithm")? {
			Some(algorithm) => Tracked::explicit(algorithm),
			None => Tracked::default_value(SignatureAlgorithm::default()),
		};
		let user_name_attribute = match reader.raw("userNameAttribute") {
			RawValue::Absent => Tracked::default_value(profile.default_user_name_attribute().to_owned()),
			RawValue::Empty => Tracked::explicit(String::new()),
			RawValue::Blank(value) => {
				reader.warn_blank("userNameAttribute");

				Tracked::explicit(value.to_owned())
			},
			RawValue::Present(value) => Tracked::explicit(value.trim().to_owned()),
			RawValue::Other(_) => return Err(reader.invalid_type("userNameAttribute", "string")),
		};
		let audiences = match reader.list("audiences")? {
			audiences if audiences.is_empty() => vec![client_id.trim().to_owned()],
			audiences => audiences,
		};
		let config = Self {
			kind: entry.kind,
			enabled: reader.boolean("enabled", true)?,
			client_secret: reader.secret("clientSecret")?,
			authorization_endpoint: endpoint(&reader, "authorizationEndpoint", defaults.authorization)?,
			token_endpoint: endpoint(&reader, "tokenEndpoint", defaults.token)?,
			jwks_uri: reader.url("jwksUri")?,
			discovery_endpoint: reader.url("discoveryEndpoint")?,
			issuer: reader.non_blank("issuer")?,
			scope,
			response_type,
			response_mode,
			token_endpoint_auth_method,
			user_api: user_api(&reader, defaults.user_api)?,
			user_api_type: reader
				.lenient::<UserApiType>("userApiType")
				.unwrap_or_else(|| profile.default_user_api_type()),
			user_api_token: reader.secret("userApiToken")?,
			user_name_attribute,
			group_name_attribute: reader
				.non_blank("groupNameAttribute")?
				.or_else(|| profile.default_group_attribute().map(str::to_owned)),
			realm_name_attribute: reader.non_blank("realmNameAttribute")?,
			user_unique_id_attribute: reader
				.non_blank("userUniqueIdAttribute")?
				.or_else(|| profile.default_unique_id_attribute().map(str::to_owned)),
			realm_name: reader.non_blank("realmName")?,
			ssl_ref: reader.non_blank("sslRef")?,
			auth_filter_ref: reader.non_blank("authFilterRef")?,
			jwt_builder_ref: reader.non_blank("jwtBuilderRef")?,
			trust_alias_name: reader.non_blank("trustAliasName")?,
			key_management_key_alias: reader.non_blank("keyManagementKeyAlias")?,
			access_token_required: reader.boolean("accessTokenRequired", false)?,
			access_token_supported: reader.boolean("accessTokenSupported", false)?,
			access_token_header_name: reader
				.non_blank("accessTokenHeaderName")?
				.unwrap_or_else(|| DEFAULT_ACCESS_TOKEN_HEADER.to_owned()),
			client_side_redirect_supported: reader.boolean("isClientSideRedirectSupported", true)?,
			map_to_user_registry: reader.boolean("mapToUserRegistry", false)?,
			nonce_enabled: reader.boolean("nonceEnabled", true)?,
			signature_algorithm,
			audiences,
			clock_skew: reader.seconds("clockSkew", DEFAULT_CLOCK_SKEW.whole_seconds())?,
			forward_login_parameters: reader.list("forwardLoginParameter")?,
			authz_parameters: authz_parameters(&reader, &entry.id)?,
			redirect_to_rp_host_and_port: reader.url("redirectToRPHostAndPort")?,
			client_id,
			id,
		};

		reader.warn_unknown();

		if config.access_token_required && !config.access_token_supported {
			tracing::warn!(
				provider = %config.id,
				code = "config.access_token_required_without_support",
				"`accessTokenRequired` implies `accessTokenSupported` for `{}`.",
				config.id
			);
		}

		Ok(config)
	}

	/// Profile implementing the provider's capabilities.
	pub fn profile(&self) -> &'static dyn ProviderProfile {
		self.kind.profile()
	}

	/// Bearer tokens on inbound requests are honored.
	pub fn accepts_bearer_tokens(&self) -> bool {
		self.access_token_supported || self.access_token_required
	}

	/// Returns the client secret or the error naming what needed it.
	pub fn require_client_secret(&self, purpose: &'static str) -> Result<&Secret, ConfigError> {
		self.client_secret.as_ref().ok_or_else(|| ConfigError::MissingClientSecret {
			provider: self.id.to_string(),
			purpose,
		})
	}
}

fn endpoint(
	reader: &AttributeReader,
	name: &'static str,
	default: Option<&'static str>,
) -> Result<Option<Url>, ConfigError> {
	match reader.url(name)? {
		Some(url) => Ok(Some(url)),
		None => default.map(|value| reader.parse_url(name, value)).transpose(),
	}
}

fn user_api(
	reader: &AttributeReader,
	default: Option<&'static str>,
) -> Result<Option<Url>, ConfigError> {
	match reader.raw("userApi") {
		RawValue::Absent => default.map(|value| reader.parse_url("userApi", value)).transpose(),
		RawValue::Empty | RawValue::Blank(_) => {
			reader.warn_blank("userApi");

			Ok(None)
		},
		RawValue::Present(value) => reader.parse_url("userApi", value).map(Some),
		RawValue::Other(_) => Err(reader.invalid_type("userApi", "URL string")),
	}
}

fn authz_parameters(
	reader: &AttributeReader,
	provider: &str,
) -> Result<Vec<(String, String)>, ConfigError> {
	let parameters = reader
		.pairs("authzParameters")?
		.into_iter()
		.filter(|(name, value)| {
			let name = name.trim();
			let dropped = if name.is_empty() {
				Some("blank name")
			} else if RESERVED_AUTHZ_PARAMETERS.contains(&name) {
				Some("reserved name")
			} else if value.is_empty() {
				Some("empty value")
			} else {
				None
			};

			if let Some(reason) = dropped {
				tracing::warn!(
					provider,
					parameter = name,
					code = "config.authz_parameter_dropped",
					"The authorization parameter `{name}` is dropped: {reason}."
				);
			}

			dropped.is_none()
		})
		.map(|(name, value)| (name.trim().to_owned(), value))
		.collect();

	Ok(parameters)
}
