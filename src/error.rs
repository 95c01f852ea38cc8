//! Engine-level error taxonomy shared across configuration, discovery, flows, and validation.
//!
//! Every failure a flow can produce maps onto one [`Error`] variant family. Each family
//! exposes a stable `code()` label used in log events and an HTTP status via
//! [`Error::status`], so callers can translate failures into a response without matching on
//! individual variants.

// self
use crate::_prelude::*;

/// Engine-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical engine error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Discovery document could not be obtained or used.
	#[error(transparent)]
	Discovery(#[from] crate::discovery::DiscoveryError),
	/// Provider rejected the authorization request.
	#[error(transparent)]
	Authorization(#[from] AuthorizationError),
	/// Token endpoint exchange failed.
	#[error(transparent)]
	Exchange(#[from] ExchangeError),
	/// Returned token failed signature, decryption, or claim checks.
	#[error(transparent)]
	Validation(#[from] crate::jose::ValidationError),
	/// User API lookup failed.
	#[error(transparent)]
	UserApi(#[from] crate::userapi::UserApiError),
	/// Claims could not be mapped onto a subject.
	#[error(transparent)]
	Mapping(#[from] crate::mapping::MappingError),
	/// Transport failure (DNS, TCP, TLS, timeout).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Flow store backend failure.
	#[error(transparent)]
	Store(#[from] crate::store::StoreError),
	/// Provider resolution already failed in the active generation.
	#[error(transparent)]
	Unresolved(Arc<Error>),

	/// An access token is required but the request did not carry one.
	#[error("The access token was not found in the `{header}` request header.")]
	MissingAccessToken {
		/// Header the engine looked for.
		header: String,
	},
	/// The callback `state` is unknown, expired, already consumed, or bound to another provider.
	#[error("Authorization state is unknown, expired, or was already used.")]
	StateMismatch,
	/// No provider with the given identifier exists in the active generation.
	#[error("Social login configuration `{id}` was not found.")]
	ProviderNotFound {
		/// Requested provider identifier.
		id: String,
	},
	/// The provider exists but is disabled.
	#[error("Social login configuration `{id}` is disabled.")]
	ProviderDisabled {
		/// Requested provider identifier.
		id: String,
	},
}
impl Error {
	/// Returns the taxonomy family of the error.
	pub fn kind(&self) -> ErrorKind {
		match self {
			Self::Config(_) => ErrorKind::Config,
			Self::Discovery(_) => ErrorKind::Discovery,
			Self::Authorization(_) => ErrorKind::Authorization,
			Self::Exchange(_) => ErrorKind::Exchange,
			Self::Validation(_) => ErrorKind::Validation,
			Self::UserApi(_) => ErrorKind::UserApi,
			Self::Mapping(_) => ErrorKind::Mapping,
			Self::Transport(_) => ErrorKind::Transport,
			Self::Store(_) => ErrorKind::Store,
			Self::Unresolved(e) => e.kind(),
			Self::MissingAccessToken { .. } => ErrorKind::MissingAccessToken,
			Self::StateMismatch => ErrorKind::StateMismatch,
			Self::ProviderNotFound { .. } | Self::ProviderDisabled { .. } => ErrorKind::Provider,
		}
	}

	/// Stable, fine-grained label suitable for the `code` field of log events.
	pub fn code(&self) -> &'static str {
		match self {
			Self::Config(e) => e.code(),
			Self::Discovery(e) => e.code(),
			Self::Authorization(e) => e.code(),
			Self::Exchange(e) => e.code(),
			Self::Validation(e) => e.code(),
			Self::UserApi(e) => e.code(),
			Self::Mapping(e) => e.code(),
			Self::Transport(e) => e.code(),
			Self::Store(_) => "store.backend",
			Self::Unresolved(e) => e.code(),
			Self::MissingAccessToken { .. } => "flow.missing_access_token",
			Self::StateMismatch => "flow.state_mismatch",
			Self::ProviderNotFound { .. } => "flow.provider_not_found",
			Self::ProviderDisabled { .. } => "flow.provider_disabled",
		}
	}

	/// HTTP status surfaced to the caller for this failure.
	pub fn status(&self) -> u16 {
		match self {
			Self::Config(e) => e.status(),
			Self::Authorization(e) => e.status(),
			Self::ProviderNotFound { .. } => 404,
			Self::ProviderDisabled { .. } => 403,
			Self::Store(_) => 500,
			Self::Unresolved(e) => e.status(),
			Self::Discovery(_)
			| Self::Exchange(_)
			| Self::Validation(_)
			| Self::UserApi(_)
			| Self::Mapping(_)
			| Self::Transport(_)
			| Self::MissingAccessToken { .. }
			| Self::StateMismatch => 401,
		}
	}
}

/// Taxonomy families of [`Error`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
	/// [`Error::Config`].
	Config,
	/// [`Error::Discovery`].
	Discovery,
	/// [`Error::Authorization`].
	Authorization,
	/// [`Error::Exchange`].
	Exchange,
	/// [`Error::Validation`].
	Validation,
	/// [`Error::UserApi`].
	UserApi,
	/// [`Error::Mapping`].
	Mapping,
	/// [`Error::Transport`].
	Transport,
	/// [`Error::Store`].
	Store,
	/// [`Error::MissingAccessToken`].
	MissingAccessToken,
	/// [`Error::StateMismatch`].
	StateMismatch,
	/// [`Error::ProviderNotFound`] and [`Error::ProviderDisabled`].
	Provider,
}
impl ErrorKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Config => "config",
			Self::Discovery => "discovery",
			Self::Authorization => "authorization",
			Self::Exchange => "exchange",
			Self::Validation => "validation",
			Self::UserApi => "user_api",
			Self::Mapping => "mapping",
			Self::Transport => "transport",
			Self::Store => "store",
			Self::MissingAccessToken => "missing_access_token",
			Self::StateMismatch => "state_mismatch",
			Self::Provider => "provider",
		}
	}
}
impl Display for ErrorKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Configuration and validation failures raised while loading or resolving providers.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// The configuration document could not be parsed.
	#[error("Configuration document is invalid at `{}`.", source.path())]
	Document {
		/// Structured parsing failure, including the JSON path.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// Provider identifier is invalid.
	#[error("Provider identifier is invalid.")]
	InvalidProviderId(#[from] crate::auth::IdentifierError),
	/// Two provider entries share the same identifier.
	#[error("Social login configuration `{id}` is declared more than once.")]
	DuplicateProvider {
		/// Duplicated identifier.
		id: String,
	},
	/// A required attribute is absent or empty.
	#[error("The required attribute `{attribute}` of `{provider}` is missing or empty.")]
	MissingAttribute {
		/// Provider identifier.
		provider: String,
		/// Attribute name.
		attribute: &'static str,
	},
	/// An attribute value has the wrong JSON type.
	#[error("The attribute `{attribute}` of `{provider}` must be a {expected}.")]
	InvalidType {
		/// Provider identifier.
		provider: String,
		/// Attribute name.
		attribute: &'static str,
		/// Expected type description.
		expected: &'static str,
	},
	/// An attribute holds a value outside its accepted set.
	#[error("The attribute `{attribute}` of `{provider}` has the unsupported value `{value}`.")]
	InvalidValue {
		/// Provider identifier.
		provider: String,
		/// Attribute name.
		attribute: &'static str,
		/// Offending value.
		value: String,
	},
	/// An attribute holds a malformed URL.
	#[error("The attribute `{attribute}` of `{provider}` is not a valid URL: `{value}`.")]
	InvalidUrl {
		/// Provider identifier.
		provider: String,
		/// Attribute name.
		attribute: &'static str,
		/// Offending value.
		value: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Endpoints must use HTTPS.
	#[error("The {endpoint} endpoint of `{provider}` must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Provider identifier.
		provider: String,
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Endpoint URL that failed validation.
		url: String,
	},
	/// An endpoint required by the configured flow is neither configured nor discovered.
	#[error("The {endpoint} endpoint of `{provider}` is neither configured nor discovered.")]
	MissingEndpoint {
		/// Provider identifier.
		provider: String,
		/// Missing endpoint label.
		endpoint: &'static str,
	},
	/// The configured flow requires a client secret.
	#[error("The `clientSecret` of `{provider}` is required by the {purpose}.")]
	MissingClientSecret {
		/// Provider identifier.
		provider: String,
		/// What needs the secret.
		purpose: &'static str,
	},
	/// A password attribute uses an encoding the engine cannot decode.
	#[error("The attribute `{attribute}` uses the unsupported password encoding `{encoding}`.")]
	UnsupportedPasswordEncoding {
		/// Attribute name.
		attribute: &'static str,
		/// Encoding tag found in the value.
		encoding: String,
	},
	/// An obfuscated password could not be decoded.
	#[error("The attribute `{attribute}` holds a malformed obfuscated password.")]
	MalformedPassword {
		/// Attribute name.
		attribute: &'static str,
	},
	/// A trust configuration could not be turned into an HTTP client.
	#[error("The SSL configuration `{id}` is invalid.")]
	InvalidSslConfig {
		/// SSL configuration identifier.
		id: String,
		/// Underlying failure.
		#[source]
		source: BoxError,
	},
	/// A key store entry is malformed.
	#[error("The key store entry `{alias}` is invalid: {reason}.")]
	InvalidKeyEntry {
		/// Key alias.
		alias: String,
		/// Human-readable reason.
		reason: String,
	},
	/// A JWT builder configuration is unusable.
	#[error("The JWT builder `{id}` is invalid: {reason}.")]
	InvalidJwtBuilder {
		/// Builder identifier.
		id: String,
		/// Human-readable reason.
		reason: String,
	},
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// Redirect URI cannot be built.
	#[error("Redirect URI is invalid.")]
	InvalidRedirect {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Scopes cannot be normalized.
	#[error("Configured scopes are invalid.")]
	InvalidScope(#[from] crate::auth::ScopeValidationError),
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}

	/// Stable label for log events.
	pub fn code(&self) -> &'static str {
		match self {
			Self::Document { .. } => "config.document",
			Self::InvalidProviderId(_) => "config.invalid_provider_id",
			Self::DuplicateProvider { .. } => "config.duplicate_provider",
			Self::MissingAttribute { .. } => "config.missing_attribute",
			Self::InvalidType { .. } => "config.invalid_type",
			Self::InvalidValue { .. } => "config.invalid_value",
			Self::InvalidUrl { .. } => "config.invalid_url",
			Self::InsecureEndpoint { .. } => "config.insecure_endpoint",
			Self::MissingEndpoint { .. } => "config.missing_endpoint",
			Self::MissingClientSecret { .. } => "config.missing_client_secret",
			Self::UnsupportedPasswordEncoding { .. } => "config.password_encoding",
			Self::MalformedPassword { .. } => "config.malformed_password",
			Self::InvalidSslConfig { .. } => "config.ssl",
			Self::InvalidKeyEntry { .. } => "config.key_entry",
			Self::InvalidJwtBuilder { .. } => "config.jwt_builder",
			Self::HttpClientBuild { .. } => "config.http_client",
			Self::HttpRequest(_) => "config.http_request",
			Self::InvalidRedirect { .. } => "config.redirect_uri",
			Self::InvalidScope(_) => "config.scope",
		}
	}

	/// Endpoint gaps are only detectable once a request arrives, so they surface as 401; every
	/// other configuration problem is a server-side fault.
	pub fn status(&self) -> u16 {
		match self {
			Self::MissingEndpoint { .. } | Self::MissingClientSecret { .. } => 401,
			_ => 500,
		}
	}
}
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Failures reported by the provider on the authorization leg of the flow.
#[derive(Debug, ThisError)]
pub enum AuthorizationError {
	/// The provider redirected back with an OAuth `error`.
	#[error("Provider rejected the authorization request with `{error}`{}.", fmt_description(description))]
	ProviderRejected {
		/// OAuth `error` code.
		error: String,
		/// OAuth `error_description`, when supplied.
		description: Option<String>,
		/// Status chosen by the provider profile.
		status: u16,
	},
	/// The configured response type is not supported by the provider.
	#[error("Response type `{response_type}` is not supported by the provider (supported: {supported:?}).")]
	UnsupportedResponseType {
		/// Configured response type.
		response_type: String,
		/// Response types the provider advertises.
		supported: Vec<String>,
	},
	/// The callback carried neither a code nor an error.
	#[error("Authorization callback carries no authorization code.")]
	MissingCode,
	/// The implicit callback carried none of the expected tokens.
	#[error("Implicit callback carries no `{expected}`.")]
	MissingImplicitToken {
		/// Parameter that was expected.
		expected: &'static str,
	},
}
impl AuthorizationError {
	/// Stable label for log events.
	pub fn code(&self) -> &'static str {
		match self {
			Self::ProviderRejected { .. } => "authorization.provider_rejected",
			Self::UnsupportedResponseType { .. } => "authorization.unsupported_response_type",
			Self::MissingCode => "authorization.missing_code",
			Self::MissingImplicitToken { .. } => "authorization.missing_implicit_token",
		}
	}

	/// HTTP status surfaced for the failure.
	pub fn status(&self) -> u16 {
		match self {
			Self::ProviderRejected { status, .. } => *status,
			_ => 401,
		}
	}
}

fn fmt_description(description: &Option<String>) -> String {
	description.as_ref().map(|d| format!(": {d}")).unwrap_or_default()
}

/// Token endpoint failures. None of them are retried.
#[derive(Debug, ThisError)]
pub enum ExchangeError {
	/// Provider rejected the grant (bad, expired, or reused code).
	#[error("Provider rejected the grant: {reason}.")]
	InvalidGrant {
		/// Provider- or engine-supplied reason string.
		reason: String,
	},
	/// Client authentication failed or the auth method is unsupported by the provider.
	#[error("Client authentication failed: {reason}.")]
	InvalidClient {
		/// Provider- or engine-supplied reason string.
		reason: String,
	},
	/// Provider refused the requested scopes.
	#[error("Provider rejected the requested scope: {reason}.")]
	InvalidScope {
		/// Provider- or engine-supplied reason string.
		reason: String,
	},
	/// Token endpoint returned an unexpected response.
	#[error("Token endpoint returned an unexpected response: {message}.")]
	Endpoint {
		/// Provider- or engine-supplied message summarizing the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Token endpoint responded with JSON that could not be parsed.
	#[error("Token endpoint returned malformed JSON.")]
	ResponseParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::error::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
}
impl ExchangeError {
	/// Stable label for log events.
	pub fn code(&self) -> &'static str {
		match self {
			Self::InvalidGrant { .. } => "exchange.invalid_grant",
			Self::InvalidClient { .. } => "exchange.invalid_client",
			Self::InvalidScope { .. } => "exchange.invalid_scope",
			Self::Endpoint { .. } => "exchange.endpoint",
			Self::ResponseParse { .. } => "exchange.response_parse",
		}
	}
}

/// Transport-level failures (network, TLS, timeouts). These signal that the provider could not
/// be contacted, as opposed to a reachable endpoint answering with an error.
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// The request did not complete before the configured timeout.
	#[error("Timed out while contacting the provider at {target}.")]
	Timeout {
		/// URL of the endpoint.
		target: String,
	},
	/// TLS handshake or certificate trust failure.
	#[error("TLS handshake with {target} failed.")]
	Tls {
		/// URL of the endpoint.
		target: String,
		/// Underlying failure.
		#[source]
		source: BoxError,
	},
	/// Host could not be resolved or the connection was refused.
	#[error("Unable to contact the provider at {target}.")]
	Unreachable {
		/// URL of the endpoint.
		target: String,
		/// Underlying failure.
		#[source]
		source: BoxError,
	},
	/// Other network failure reported by the HTTP client.
	#[error("Network error occurred while calling {target}.")]
	Network {
		/// URL of the endpoint.
		target: String,
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the provider.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(target: impl Into<String>, src: impl 'static + Send + Sync + StdError) -> Self {
		Self::Network { target: target.into(), source: Box::new(src) }
	}

	/// Classifies a reqwest failure by walking its source chain.
	pub fn from_reqwest(target: impl Into<String>, err: ReqwestError) -> Self {
		let target = target.into();

		if err.is_timeout() {
			return Self::Timeout { target };
		}
		if is_tls_failure(&err) {
			return Self::Tls { target, source: Box::new(err) };
		}
		if err.is_connect() {
			return Self::Unreachable { target, source: Box::new(err) };
		}

		Self::Network { target, source: Box::new(err) }
	}

	/// Stable label for log events.
	pub fn code(&self) -> &'static str {
		match self {
			Self::Timeout { .. } => "transport.timeout",
			Self::Tls { .. } => "transport.tls",
			Self::Unreachable { .. } => "transport.unreachable",
			Self::Network { .. } => "transport.network",
			Self::Io(_) => "transport.io",
		}
	}
}

fn is_tls_failure(err: &(dyn StdError + 'static)) -> bool {
	let mut current = Some(err);

	while let Some(e) = current {
		let text = e.to_string().to_ascii_lowercase();

		if text.contains("certificate") || text.contains("handshake") || text.contains("tls") {
			return true;
		}

		current = e.source();
	}

	false
}
