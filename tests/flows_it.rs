#![cfg(feature = "test")]

// std
use std::io::{self, Write};
// crates.io
use color_eyre::eyre::eyre;
use httpmock::prelude::*;
use tracing_subscriber::fmt::MakeWriter;
// self
use social_login::{
	_preludet::*,
	auth::{Claims, Secret},
	config::ConfigDocument,
	error::ExchangeError,
	flows::{FlowState, SocialLogin},
	jose::{
		ContentEncryptionAlgorithm, JwkSet, JwtBuilderDocument, KeyEntryDocument,
		KeyManagementAlgorithm, KeyStore, SignatureAlgorithm, TokenValidator, ValidationError,
		ValidationPolicy, jwe, sign,
	},
	provider::ProviderKind,
	request::{Disposition, InboundRequest},
};

const CLIENT_ID: &str = "client-it";
const OP_ISSUER: &str = "https://op.example";
const OP_KEY: &str = "opSigner";
const RP_ISSUER: &str = "https://rp.example/jwt";
const RP_KEY: &str = "rpSigner";
const PROTECTED: &str = "https://rp.example/app/page";

/// Captures formatted log events for assertions.
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);
impl LogBuffer {
	fn contents(&self) -> String {
		String::from_utf8_lossy(&self.0.lock()).into_owned()
	}
}
impl<'a> MakeWriter<'a> for LogBuffer {
	type Writer = LogWriter;

	fn make_writer(&'a self) -> Self::Writer {
		LogWriter(Arc::clone(&self.0))
	}
}

struct LogWriter(Arc<Mutex<Vec<u8>>>);
impl Write for LogWriter {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		self.0.lock().extend_from_slice(buf);

		Ok(buf.len())
	}

	fn flush(&mut self) -> io::Result<()> {
		Ok(())
	}
}

fn capture_logs() -> (LogBuffer, tracing::subscriber::DefaultGuard) {
	let buffer = LogBuffer::default();
	let subscriber = tracing_subscriber::fmt()
		.with_writer(buffer.clone())
		.with_ansi(false)
		.with_max_level(tracing::Level::DEBUG)
		.finish();
	let guard = tracing::subscriber::set_default(subscriber);

	(buffer, guard)
}

fn url(value: &str) -> Url {
	Url::parse(value).expect("URL fixture should parse.")
}

fn endpoints(server: &MockServer, extra: JsonValue) -> JsonValue {
	let mut attributes = serde_json::json!({
		"clientId": CLIENT_ID,
		"clientSecret": "secret-it",
		"authorizationEndpoint": server.url("/authorize"),
		"tokenEndpoint": server.url("/token"),
	});

	if let (Some(base), JsonValue::Object(extra)) = (attributes.as_object_mut(), extra) {
		base.extend(extra);
	}

	attributes
}

fn op_keys() -> KeyStore {
	KeyStore::default()
		.with_pem(OP_KEY, &key_fixture("rsa2048.key.pem"))
		.expect("Provider signing key should load.")
}

fn id_token(nonce: Option<&str>) -> String {
	let now = OffsetDateTime::now_utc().unix_timestamp();
	let mut claims = Claims::default();

	claims.insert("iss", OP_ISSUER);
	claims.insert("sub", "alice");
	claims.insert("aud", CLIENT_ID);
	claims.insert("iat", now);
	claims.insert("exp", now + 600);

	if let Some(nonce) = nonce {
		claims.insert("nonce", nonce);
	}

	let key = op_keys()
		.signing_key(OP_KEY, SignatureAlgorithm::RS256)
		.expect("Provider signing key should resolve.");

	sign(SignatureAlgorithm::RS256, &key, Some(OP_KEY), &claims).expect("ID token should be signed.")
}

fn with_jwt_builder(mut document: ConfigDocument) -> ConfigDocument {
	document
		.key_store
		.insert(RP_KEY.into(), KeyEntryDocument { pem: key_fixture("rsa2048-other.key.pem") });
	document.jwt_builders.insert("rp".into(), JwtBuilderDocument {
		issuer: Some(RP_ISSUER.into()),
		audiences: vec!["protected-app".into()],
		key_alias: Some(RP_KEY.into()),
		..Default::default()
	});

	document
}

async fn redirect_params(
	engine: &SocialLogin,
	provider: &str,
	request: &InboundRequest,
) -> HashMap<String, String> {
	match engine.authenticate(provider, request).await {
		Disposition::Redirect { location } => location.query_pairs().into_owned().collect(),
		other => panic!("Expected a redirect to the provider, got {other:?}."),
	}
}

fn callback(provider: &str, params: &[(&str, &str)]) -> InboundRequest {
	let redirect = format!("https://rp.example/social-login/redirect/{provider}");

	InboundRequest::get(
		Url::parse_with_params(&redirect, params).expect("Callback URL should parse."),
	)
}

fn failure(disposition: &Disposition) -> (u16, String) {
	let failure = disposition.failure().expect("Disposition should be a failure.");

	(failure.status, failure.error.to_string())
}

#[tokio::test]
async fn oidc_code_flow_validates_the_id_token_and_mints_a_jwt() {
	let server = MockServer::start_async().await;
	let jwk_set = JwkSet {
		keys: vec![
			op_keys()
				.public_jwk(OP_KEY, SignatureAlgorithm::RS256)
				.expect("Provider JWK should be published."),
		],
	};
	let jwks = server
		.mock_async(|when, then| {
			when.method(GET).path("/jwks");
			then.status(200).json_body_obj(&jwk_set);
		})
		.await;
	let document = with_jwt_builder(single_provider_document(
		ProviderKind::Oidc,
		"oidc",
		endpoints(
			&server,
			serde_json::json!({
				"jwksUri": server.url("/jwks"),
				"issuer": OP_ISSUER,
				"realmName": "sample-realm",
				"jwtBuilderRef": "rp",
			}),
		),
	));
	let engine = build_test_engine(document);
	let params = redirect_params(&engine, "oidc", &InboundRequest::get(url(PROTECTED))).await;
	let state = params.get("state").expect("Redirect should carry a state.").clone();
	let nonce = params.get("nonce").expect("OIDC redirect should carry a nonce.").clone();

	assert_eq!(params.get("scope").map(String::as_str), Some("openid profile email"));
	assert_eq!(
		params.get("redirect_uri").map(String::as_str),
		Some("https://rp.example/social-login/redirect/oidc")
	);

	let token = server
		.mock_async(|when, then| {
			when.method(POST).path("/token").form_urlencoded_tuple("code", "auth-code");
			then.status(200).json_body(serde_json::json!({
				"access_token": "at-1",
				"token_type": "Bearer",
				"expires_in": 3600,
				"id_token": id_token(Some(&nonce)),
			}));
		})
		.await;
	let request = callback("oidc", &[("code", "auth-code"), ("state", &state)]);
	let disposition = engine.handle_callback("oidc", &request).await;
	let authentication = disposition.authentication().expect("Callback should authenticate.");

	token.assert_async().await;
	jwks.assert_async().await;
	assert_eq!(authentication.subject.principal, "alice");
	assert_eq!(authentication.subject.realm, "sample-realm");
	assert_eq!(authentication.access_token.as_ref().map(Secret::expose), Some("at-1"));

	let issued = authentication.issued_token.as_ref().expect("A JWT should be minted.");
	let rp_keys = KeyStore::default()
		.with_pem(RP_KEY, &key_fixture("rsa2048-other.key.pem"))
		.expect("Relying party key should load.");
	let policy = ValidationPolicy {
		audiences: vec!["protected-app".into()],
		trust_alias: Some(RP_KEY.into()),
		..Default::default()
	};
	let http = test_reqwest_http_client();
	let validator = TokenValidator {
		policy: &policy,
		issuer: Some(RP_ISSUER),
		client_secret: None,
		keys: &rp_keys,
		jwks: None,
		http: &http,
	};
	let minted = validator.validate(issued.expose(), None).await.expect("Minted JWT should validate.");

	assert_eq!(minted.claims().issuer().as_deref(), Some(RP_ISSUER));
	assert_eq!(minted.claims().audiences(), ["protected-app"]);
	assert_eq!(minted.claims().subject().as_deref(), Some("alice"));
	assert_eq!(minted.claims().string("realm").as_deref(), Some("sample-realm"));

	let replay = engine.handle_callback("oidc", &request).await;

	assert_eq!(failure(&replay).0, 401);
	assert_eq!(replay.failure().and_then(|f| f.failed_in()), Some(FlowState::AwaitingCallback));
}

#[tokio::test]
async fn required_access_token_missing_fails_without_network() {
	let server = MockServer::start_async().await;
	let token = server
		.mock_async(|when, then| {
			when.path("/token");
			then.status(500);
		})
		.await;
	let user = server
		.mock_async(|when, then| {
			when.path("/user");
			then.status(500);
		})
		.await;
	let engine = build_test_engine(single_provider_document(
		ProviderKind::GitHub,
		"gh",
		endpoints(
			&server,
			serde_json::json!({ "userApi": server.url("/user"), "accessTokenRequired": true }),
		),
	));
	let disposition = engine.authenticate("gh", &InboundRequest::get(url(PROTECTED))).await;

	assert_eq!(failure(&disposition).0, 401);
	token.assert_calls_async(0).await;
	user.assert_calls_async(0).await;
}

#[tokio::test]
async fn unsupported_access_tokens_are_ignored_and_the_interactive_flow_succeeds() {
	let server = MockServer::start_async().await;
	let user = server
		.mock_async(|when, then| {
			when.method(GET).path("/user").header("authorization", "Bearer at-gh");
			then.status(200).json_body(serde_json::json!({ "login": "octocat", "id": 42 }));
		})
		.await;
	let token = server
		.mock_async(|when, then| {
			when.method(POST).path("/token").form_urlencoded_tuple("code", "gh-code");
			then.status(200).json_body(serde_json::json!({ "access_token": "at-gh", "token_type": "bearer" }));
		})
		.await;
	let engine = build_test_engine(single_provider_document(
		ProviderKind::GitHub,
		"gh",
		endpoints(
			&server,
			serde_json::json!({ "userApi": server.url("/user"), "accessTokenSupported": false }),
		),
	));
	let request = InboundRequest::get(url(PROTECTED)).with_header("Authorization", "Bearer presented");
	let params = redirect_params(&engine, "gh", &request).await;
	let state = params.get("state").expect("Redirect should carry a state.").clone();

	user.assert_calls_async(0).await;

	let disposition =
		engine.handle_callback("gh", &callback("gh", &[("code", "gh-code"), ("state", &state)])).await;
	let authentication = disposition.authentication().expect("Interactive flow should succeed.");

	token.assert_async().await;
	user.assert_async().await;
	assert_eq!(authentication.subject.principal, "octocat");
}

#[tokio::test]
async fn bearer_tokens_are_resolved_through_the_user_api() -> color_eyre::Result<()> {
	let server = MockServer::start_async().await;
	let user = server
		.mock_async(|when, then| {
			when.method(GET).path("/user").header("authorization", "Bearer presented");
			then.status(200).json_body(serde_json::json!({ "login": "octocat", "id": 42 }));
		})
		.await;
	let engine = build_test_engine(single_provider_document(
		ProviderKind::GitHub,
		"gh",
		endpoints(
			&server,
			serde_json::json!({ "userApi": server.url("/user"), "accessTokenSupported": true }),
		),
	));
	let request =
		InboundRequest::get(Url::parse(PROTECTED)?).with_header("Authorization", "Bearer presented");
	let disposition = engine.authenticate("gh", &request).await;
	let authentication = disposition
		.authentication()
		.ok_or_else(|| eyre!("Bearer token should authenticate, got {disposition:?}."))?;

	user.assert_async().await;
	assert_eq!(authentication.subject.principal, "octocat");
	assert_eq!(authentication.access_token.as_ref().map(Secret::expose), Some("presented"));

	Ok(())
}

#[tokio::test]
async fn blank_client_id_is_forwarded_and_the_provider_error_is_reported() {
	let server = MockServer::start_async().await;
	let engine = build_test_engine(single_provider_document(
		ProviderKind::Oidc,
		"oidc",
		endpoints(&server, serde_json::json!({ "clientId": " ", "issuer": OP_ISSUER })),
	));
	let params = redirect_params(&engine, "oidc", &InboundRequest::get(url(PROTECTED))).await;
	let state = params.get("state").expect("Redirect should carry a state.").clone();

	assert_eq!(params.get("client_id").map(String::as_str), Some(" "));

	let (logs, _guard) = capture_logs();
	let request = callback("oidc", &[
		("error", "invalid_request"),
		("error_description", "The request is missing the required client_id parameter."),
		("state", &state),
	]);
	let disposition = engine.handle_callback("oidc", &request).await;
	let (status, message) = failure(&disposition);

	assert_eq!(status, 400);
	assert!(message.contains("client_id"));
	assert!(logs.contents().contains("client_id"));
}

#[tokio::test]
async fn facebook_rejects_basic_client_authentication() {
	let server = MockServer::start_async().await;
	let token = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(400).json_body(serde_json::json!({
				"error": {
					"message": "Missing client_id parameter.",
					"type": "OAuthException",
					"code": 101,
				}
			}));
		})
		.await;
	let engine = build_test_engine(single_provider_document(
		ProviderKind::Facebook,
		"fb",
		endpoints(
			&server,
			serde_json::json!({
				"userApi": server.url("/me"),
				"tokenEndpointAuthMethod": "client_secret_basic",
			}),
		),
	));
	let params = redirect_params(&engine, "fb", &InboundRequest::get(url(PROTECTED))).await;
	let state = params.get("state").expect("Redirect should carry a state.").clone();
	let disposition =
		engine.handle_callback("fb", &callback("fb", &[("code", "fb-code"), ("state", &state)])).await;
	let (status, message) = failure(&disposition);

	token.assert_async().await;
	assert_eq!(status, 401);
	assert!(message.to_ascii_lowercase().contains("missing client_id parameter"));
	assert!(matches!(
		disposition.failure().map(|f| &f.error),
		Some(Error::Exchange(ExchangeError::InvalidClient { .. }))
	));
	assert_eq!(disposition.failure().and_then(|f| f.failed_in()), Some(FlowState::ExchangingToken));
}

#[tokio::test]
async fn discovery_failure_is_logged_and_reported_as_unauthorized() {
	let server = MockServer::start_async().await;
	let discovery = server
		.mock_async(|when, then| {
			when.method(GET).path("/.well-known/openid-configuration");
			then.status(404);
		})
		.await;
	let engine = build_test_engine(single_provider_document(
		ProviderKind::Oidc,
		"oidc",
		serde_json::json!({
			"clientId": CLIENT_ID,
			"discoveryEndpoint": server.url("/.well-known/openid-configuration"),
		}),
	));
	let (logs, _guard) = capture_logs();
	let disposition = engine.authenticate("oidc", &InboundRequest::get(url(PROTECTED))).await;
	let (status, message) = failure(&disposition);
	let logs = logs.contents();

	discovery.assert_async().await;
	assert_eq!(status, 401);
	assert!(message.contains("404"));
	assert!(logs.contains("404"));
	assert!(logs.contains("Failed to obtain the OpenID Connect provider information"));

	// The failed fetch holds for the rest of the generation.
	let retried = engine.authenticate("oidc", &InboundRequest::get(url(PROTECTED))).await;

	assert_eq!(failure(&retried), (status, message));
	discovery.assert_calls_async(1).await;
}

#[tokio::test]
async fn kube_user_api_on_a_plain_provider_cannot_process_the_response() {
	let server = MockServer::start_async().await;

	server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200).json_body(serde_json::json!({ "access_token": "at-k", "token_type": "bearer" }));
		})
		.await;
	server
		.mock_async(|when, then| {
			when.method(POST).path("/userinfo");
			then.status(200).json_body(serde_json::json!({ "sub": "alice", "name": "Alice" }));
		})
		.await;

	let engine = build_test_engine(single_provider_document(
		ProviderKind::Oidc,
		"oidc",
		endpoints(
			&server,
			serde_json::json!({
				"issuer": OP_ISSUER,
				"userApi": server.url("/userinfo"),
				"userApiType": "kube",
				"userApiToken": "service-account",
			}),
		),
	));
	let params = redirect_params(&engine, "oidc", &InboundRequest::get(url(PROTECTED))).await;
	let state = params.get("state").expect("Redirect should carry a state.").clone();
	let disposition =
		engine.handle_callback("oidc", &callback("oidc", &[("code", "k"), ("state", &state)])).await;
	let (status, message) = failure(&disposition);

	assert_eq!(status, 401);
	assert!(message.contains("Cannot process the response"));
	assert_eq!(disposition.failure().and_then(|f| f.failed_in()), Some(FlowState::ResolvingUserInfo));
}

#[tokio::test]
async fn fragment_responses_are_relayed_by_the_client_side_page() {
	let server = MockServer::start_async().await;
	let engine = build_test_engine(single_provider_document(
		ProviderKind::Oidc,
		"oidc",
		endpoints(&server, serde_json::json!({ "issuer": OP_ISSUER, "responseType": "id_token token" })),
	));
	let disposition = engine.handle_callback("oidc", &callback("oidc", &[])).await;
	let Disposition::ClientSideRedirect { html } = disposition else {
		panic!("A bare fragment callback should be relayed by the browser.");
	};

	assert!(html.contains("https://rp.example/social-login/redirect/oidc"));

	let unknown = engine.handle_callback("oidc", &callback("oidc", &[("state", "forged")])).await;

	assert_eq!(failure(&unknown).0, 401);
}

async fn complete_code_flow(
	engine: &SocialLogin,
	server: &MockServer,
	provider: &str,
	mint: impl Fn(&str) -> String,
) -> Disposition {
	let params = redirect_params(engine, provider, &InboundRequest::get(url(PROTECTED))).await;
	let state = params.get("state").expect("Redirect should carry a state.").clone();
	let nonce = params.get("nonce").expect("OIDC redirect should carry a nonce.").clone();
	let id_token = mint(&nonce);

	server
		.mock_async(|when, then| {
			when.method(POST).path("/token").form_urlencoded_tuple("code", &state);
			then.status(200).json_body(serde_json::json!({
				"access_token": "at-e",
				"token_type": "Bearer",
				"id_token": id_token,
			}));
		})
		.await;

	engine.handle_callback(provider, &callback(provider, &[("code", &state), ("state", &state)])).await
}

#[tokio::test]
async fn encrypted_id_tokens_decrypt_and_algorithms_must_match_exactly() {
	let server = MockServer::start_async().await;
	let mut document = single_provider_document(
		ProviderKind::Oidc,
		"oidc",
		endpoints(
			&server,
			serde_json::json!({
				"issuer": OP_ISSUER,
				"trustAliasName": "opPublic",
				"keyManagementKeyAlias": "rpDecrypt",
			}),
		),
	);

	document.key_store.insert("opPublic".into(), KeyEntryDocument { pem: key_fixture("rsa2048.pub.pem") });
	document
		.key_store
		.insert("rpDecrypt".into(), KeyEntryDocument { pem: key_fixture("rsa2048-other.key.pem") });

	let encryption_key = KeyStore::default()
		.with_pem("rp", &key_fixture("rsa2048-other.key.pem"))
		.expect("Relying party key should load.")
		.encryption_key("rp")
		.expect("Encryption key should resolve.");
	let engine = build_test_engine(document.clone());
	let disposition = complete_code_flow(&engine, &server, "oidc", |nonce| {
		jwe::encrypt(
			id_token(Some(nonce)).as_bytes(),
			KeyManagementAlgorithm::RsaOaep,
			ContentEncryptionAlgorithm::A128GCM,
			&encryption_key,
			None,
		)
		.expect("ID token should be encrypted.")
	})
	.await;

	assert_eq!(
		disposition.authentication().map(|authentication| authentication.subject.principal.as_str()),
		Some("alice")
	);

	let server = MockServer::start_async().await;
	let mut mismatched = single_provider_document(
		ProviderKind::Oidc,
		"oidc",
		endpoints(
			&server,
			serde_json::json!({
				"issuer": OP_ISSUER,
				"trustAliasName": "opPublic",
				"signatureAlgorithm": "RS512",
			}),
		),
	);

	mismatched.key_store = document.key_store;

	let engine = build_test_engine(mismatched);
	let disposition =
		complete_code_flow(&engine, &server, "oidc", |nonce| id_token(Some(nonce))).await;
	let (status, _) = failure(&disposition);

	assert_eq!(status, 401);
	assert!(matches!(
		disposition.failure().map(|f| &f.error),
		Some(Error::Validation(ValidationError::AlgorithmMismatch { .. }))
	));
	assert_eq!(disposition.failure().and_then(|f| f.failed_in()), Some(FlowState::ValidatingToken));
}
