//! Authorization code exchange built on the `oauth2` client.
//!
//! The facade configures client authentication from the resolved descriptor, attaches the PKCE
//! verifier and redirect URI, and maps every failure onto the engine taxonomy using the
//! provider profile's classification.

pub use oauth2;

// std
use std::borrow::Cow;
// crates.io
use oauth2::{
	AuthType, AuthUrl, AuthorizationCode, Client, ClientId, ClientSecret, EndpointNotSet,
	EndpointSet, ExtraTokenFields, HttpClientError, PkceCodeVerifier, RedirectUrl,
	RequestTokenError, StandardRevocableToken, StandardTokenResponse, TokenResponse, TokenUrl,
	basic::{
		BasicErrorResponse, BasicRevocationErrorResponse, BasicTokenIntrospectionResponse,
		BasicTokenType,
	},
};
// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, Secret, TokenSet},
	config::ProviderConfig,
	error::{ConfigError, ExchangeError, TransportError},
	http::{ReqwestHttpClient, ResponseMetadata, ResponseMetadataSlot, TokenHttpClient},
	provider::{ProviderDescriptor, ProviderErrorContext, ProviderProfile, TokenEndpointAuthMethod},
};

/// Non-standard token response fields the engine reads.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdTokenFields {
	/// Compact ID token issued by OpenID Connect providers.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id_token: Option<String>,
}
impl ExtraTokenFields for IdTokenFields {}

/// Token endpoint response carrying an optional ID token.
pub type IdTokenResponse = StandardTokenResponse<IdTokenFields, BasicTokenType>;

type ExchangeClient = Client<
	BasicErrorResponse,
	IdTokenResponse,
	BasicTokenIntrospectionResponse,
	StandardRevocableToken,
	BasicRevocationErrorResponse,
	EndpointSet,
	EndpointNotSet,
	EndpointNotSet,
	EndpointNotSet,
	EndpointSet,
>;
type TokenRequestError<E> = RequestTokenError<HttpClientError<E>, BasicErrorResponse>;

/// Maps HTTP transport failures into engine [`Error`] values.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] emitted while calling `target`.
	fn map_transport_error(
		&self,
		target: &str,
		metadata: Option<&ResponseMetadata>,
		error: HttpClientError<E>,
	) -> Error;
}

/// Default mapper for reqwest-backed transports.
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(
		&self,
		target: &str,
		meta: Option<&ResponseMetadata>,
		err: HttpClientError<ReqwestError>,
	) -> Error {
		match err {
			HttpClientError::Reqwest(inner) => TransportError::from_reqwest(target, *inner).into(),
			HttpClientError::Http(inner) => ConfigError::from(inner).into(),
			HttpClientError::Io(inner) => TransportError::Io(inner).into(),
			HttpClientError::Other(message) => ExchangeError::Endpoint {
				message: format!("HTTP client error while calling {target}: {message}"),
				status: meta_status(meta),
			}
			.into(),
			_ => ExchangeError::Endpoint {
				message: format!("HTTP client error while calling {target}"),
				status: meta_status(meta),
			}
			.into(),
		}
	}
}

/// Authorization code exchange against one resolved provider.
pub struct CodeExchange<C = ReqwestHttpClient, M = ReqwestTransportErrorMapper>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	oauth_client: ExchangeClient,
	http_client: Arc<C>,
	error_mapper: Arc<M>,
	profile: &'static dyn ProviderProfile,
	target: String,
}
impl<C, M> CodeExchange<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Configures the exchange from a provider configuration and its resolved descriptor.
	///
	/// The client secret is mandatory unless the profile authenticates with PKCE alone.
	pub fn from_descriptor(
		config: &ProviderConfig,
		descriptor: &ProviderDescriptor,
		http_client: impl Into<Arc<C>>,
		error_mapper: impl Into<Arc<M>>,
	) -> Result<Self> {
		let profile = config.profile();
		let token = descriptor.endpoints.token.clone().ok_or_else(|| ConfigError::MissingEndpoint {
			provider: config.id.to_string(),
			endpoint: "token",
		})?;
		let secret = if profile.requires_pkce() {
			config.client_secret.clone()
		} else {
			Some(config.require_client_secret("the token exchange")?.clone())
		};
		let mut oauth_client: ExchangeClient = Client::new(ClientId::new(config.client_id.clone()))
			.set_auth_uri(AuthUrl::from_url(descriptor.endpoints.authorization.clone()))
			.set_token_uri(TokenUrl::from_url(token.clone()))
			.set_auth_type(match descriptor.client_auth_method {
				TokenEndpointAuthMethod::ClientSecretBasic => AuthType::BasicAuth,
				TokenEndpointAuthMethod::ClientSecretPost => AuthType::RequestBody,
			});

		if let Some(secret) = secret {
			oauth_client = oauth_client.set_client_secret(ClientSecret::new(secret.expose().to_owned()));
		}

		Ok(Self {
			oauth_client,
			http_client: http_client.into(),
			error_mapper: error_mapper.into(),
			profile,
			target: token.to_string(),
		})
	}

	/// Exchanges `code` for a token set.
	pub async fn exchange(
		&self,
		code: &str,
		redirect_uri: &Url,
		pkce_verifier: Option<&str>,
	) -> Result<TokenSet> {
		let meta = ResponseMetadataSlot::default();
		let instrumented = self.http_client.with_metadata(meta.clone());
		let mut request = self
			.oauth_client
			.exchange_code(AuthorizationCode::new(code.to_owned()))
			.set_redirect_uri(Cow::Owned(RedirectUrl::from_url(redirect_uri.clone())));

		if let Some(verifier) = pkce_verifier {
			request = request.set_pkce_verifier(PkceCodeVerifier::new(verifier.to_owned()));
		}

		tracing::debug!(endpoint = %self.target, "Exchanging authorization code.");

		let response = request
			.request_async(&instrumented)
			.await
			.map_err(|err| self.map_request_error(meta.take(), err))?;

		Ok(token_set(response))
	}

	fn map_request_error(
		&self,
		meta: Option<ResponseMetadata>,
		err: TokenRequestError<C::TransportError>,
	) -> Error {
		let meta = meta.as_ref();

		match err {
			RequestTokenError::ServerResponse(response) => {
				let error: &str = response.error().as_ref();
				let mut ctx = ProviderErrorContext::default().with_oauth_error(error);

				if let Some(description) = response.error_description() {
					ctx = ctx.with_error_description(description.clone());
				}
				if let Some(status) = meta_status(meta) {
					ctx = ctx.with_http_status(status);
				}

				let kind = self.profile.classify_token_error(&ctx);

				ctx.into_error(kind).into()
			},
			RequestTokenError::Parse(source, body) => match meta_status(meta) {
				Some(status) if !(200..300).contains(&status) => {
					let ctx = ProviderErrorContext::default()
						.with_http_status(status)
						.with_body_preview(String::from_utf8_lossy(&body));
					let kind = self.profile.classify_token_error(&ctx);

					ctx.into_error(kind).into()
				},
				status => ExchangeError::ResponseParse { source, status }.into(),
			},
			RequestTokenError::Request(error) =>
				self.error_mapper.map_transport_error(&self.target, meta, error),
			RequestTokenError::Other(message) => ExchangeError::Endpoint {
				message: format!("unexpected token endpoint response: {message}"),
				status: meta_status(meta),
			}
			.into(),
		}
	}
}
impl<C, M> Debug for CodeExchange<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CodeExchange").field("target", &self.target).finish_non_exhaustive()
	}
}

fn token_set(response: IdTokenResponse) -> TokenSet {
	let token_type: &str = response.token_type().as_ref();
	let mut set = TokenSet::new(Secret::new(response.access_token().secret().clone()))
		.with_token_type(token_type);

	if let Some(id_token) = &response.extra_fields().id_token {
		set = set.with_id_token(Secret::new(id_token.clone()));
	}
	if let Some(lifetime) = response.expires_in().and_then(|value| Duration::try_from(value).ok()) {
		set = set.with_expires_in(lifetime);
	}
	if let Some(scope) = response
		.scopes()
		.and_then(|scopes| ScopeSet::new(scopes.iter().map(|scope| scope.as_str())).ok())
	{
		set = set.with_scope(scope);
	}

	set
}

fn meta_status(meta: Option<&ResponseMetadata>) -> Option<u16> {
	meta.and_then(|value| value.status)
}

#[cfg(test)]
mod tests {
	// crates.io
	use httpmock::prelude::*;
	// self
	use super::*;
	use crate::{
		_preludet::test_reqwest_http_client,
		config::ProviderEntryDocument,
		discovery,
		provider::ProviderKind,
	};

	fn config(kind: ProviderKind, server: &MockServer, extra: JsonValue) -> ProviderConfig {
		let mut attributes = serde_json::json!({
			"clientId": "client",
			"clientSecret": "secret",
			"authorizationEndpoint": server.url("/authorize"),
			"tokenEndpoint": server.url("/token"),
		});

		if let (Some(base), JsonValue::Object(extra)) = (attributes.as_object_mut(), extra) {
			base.extend(extra);
		}

		let attributes = match attributes {
			JsonValue::Object(map) => map,
			_ => panic!("Attribute fixture must be an object."),
		};

		ProviderConfig::load(&ProviderEntryDocument { kind, id: "p".into(), attributes })
			.expect("Provider fixture should load.")
	}

	fn exchange(config: &ProviderConfig) -> CodeExchange {
		let resolved = discovery::resolve(config, None).expect("Static configuration should resolve.");

		CodeExchange::from_descriptor(
			config,
			&resolved.descriptor,
			test_reqwest_http_client(),
			ReqwestTransportErrorMapper,
		)
		.expect("Exchange should configure.")
	}

	fn redirect() -> Url {
		Url::parse("https://rp.example/social-login/redirect/p").expect("Redirect fixture should parse.")
	}

	#[tokio::test]
	async fn post_auth_sends_credentials_in_the_body() {
		let server = MockServer::start_async().await;
		let mock = server
			.mock_async(|when, then| {
				when.method(POST)
					.path("/token")
					.form_urlencoded_tuple("client_id", "client")
					.form_urlencoded_tuple("client_secret", "secret")
					.form_urlencoded_tuple("code", "abc")
					.form_urlencoded_tuple("code_verifier", "verifier");
				then.status(200).json_body(serde_json::json!({
					"access_token": "at",
					"token_type": "bearer",
					"expires_in": 3600,
					"id_token": "h.p.s",
				}));
			})
			.await;
		let config = config(ProviderKind::Oidc, &server, serde_json::json!({}));
		let tokens = exchange(&config)
			.exchange("abc", &redirect(), Some("verifier"))
			.await
			.expect("Exchange should succeed.");

		mock.assert_async().await;
		assert_eq!(tokens.access_token.expose(), "at");
		assert_eq!(tokens.id_token.as_ref().map(Secret::expose), Some("h.p.s"));
		assert_eq!(tokens.expires_in, Some(Duration::hours(1)));
	}

	#[tokio::test]
	async fn basic_auth_uses_the_authorization_header() {
		let server = MockServer::start_async().await;
		let mock = server
			.mock_async(|when, then| {
				when.method(POST).path("/token").header_exists("authorization");
				then.status(200).json_body(serde_json::json!({ "access_token": "at", "token_type": "bearer" }));
			})
			.await;
		let config = config(
			ProviderKind::GitHub,
			&server,
			serde_json::json!({ "tokenEndpointAuthMethod": "client_secret_basic" }),
		);

		exchange(&config).exchange("abc", &redirect(), None).await.expect("Exchange should succeed.");
		mock.assert_async().await;
	}

	#[tokio::test]
	async fn provider_errors_are_classified() {
		let server = MockServer::start_async().await;

		server
			.mock_async(|when, then| {
				when.method(POST).path("/token").form_urlencoded_tuple("code", "stale");
				then.status(400).json_body(serde_json::json!({ "error": "invalid_grant" }));
			})
			.await;
		server
			.mock_async(|when, then| {
				when.method(POST).path("/token").form_urlencoded_tuple("code", "fb");
				then.status(400).json_body(serde_json::json!({
					"error": { "message": "Missing client_id parameter.", "type": "OAuthException" }
				}));
			})
			.await;

		let config = config(ProviderKind::Oidc, &server, serde_json::json!({}));
		let exchange = exchange(&config);
		let stale = exchange.exchange("stale", &redirect(), None).await.expect_err("Stale code must fail.");

		assert!(matches!(stale, Error::Exchange(ExchangeError::InvalidGrant { .. })));

		let facebook = exchange.exchange("fb", &redirect(), None).await.expect_err("Bad client must fail.");

		assert!(matches!(facebook, Error::Exchange(ExchangeError::InvalidClient { .. })));
		assert_eq!(facebook.status(), 401);
		assert!(facebook.to_string().to_ascii_lowercase().contains("missing client_id parameter"));
	}

	#[test]
	fn client_secret_is_required_without_pkce() {
		let server = MockServer::start();
		let mut config = config(ProviderKind::GitHub, &server, serde_json::json!({}));

		config.client_secret = None;

		let resolved = discovery::resolve(&config, None).expect("Static configuration should resolve.");
		let err = CodeExchange::<ReqwestHttpClient, ReqwestTransportErrorMapper>::from_descriptor(
			&config,
			&resolved.descriptor,
			test_reqwest_http_client(),
			ReqwestTransportErrorMapper,
		)
		.expect_err("A missing secret must fail.");

		assert!(matches!(err, Error::Config(ConfigError::MissingClientSecret { .. })));
	}
}
