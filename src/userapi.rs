//! User API resolution: turns an access token into claims by calling the provider.
//!
//! Three call shapes exist. `basic` is a bearer `GET` returning a JSON object, `introspect` is
//! an RFC 7662 introspection `POST` authenticated with the client credentials, and `kube` is a
//! Kubernetes `TokenReview` submitted with the service account token. Only OpenShift-style
//! providers answer a `TokenReview`; any other response fails to parse.

// crates.io
use reqwest::header::{ACCEPT, CONTENT_TYPE};
// self
use crate::{
	_prelude::*,
	auth::{ClaimOrigin, Claims, Secret, ValidatedClaims},
	config::ProviderConfig,
	http::{HttpReply, ReqwestHttpClient},
};

const TOKEN_REVIEW_API_VERSION: &str = "authentication.k8s.io/v1";

/// How the user API is called.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum UserApiType {
	/// Bearer `GET` returning claims.
	#[default]
	Basic,
	/// RFC 7662 token introspection.
	Introspect,
	/// Kubernetes `TokenReview`.
	Kube,
}
impl UserApiType {
	/// Configuration value.
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Basic => "basic",
			Self::Introspect => "introspect",
			Self::Kube => "kube",
		}
	}
}
impl Display for UserApiType {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
impl FromStr for UserApiType {
	type Err = crate::provider::UnknownValue;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"basic" => Ok(Self::Basic),
			"introspect" => Ok(Self::Introspect),
			"kube" => Ok(Self::Kube),
			_ => Err(crate::provider::UnknownValue(s.into())),
		}
	}
}

/// User API failures.
#[derive(Debug, ThisError)]
pub enum UserApiError {
	/// An OAuth provider has no user API to obtain claims from.
	#[error("No user API is configured for `{provider}`, so the user cannot be identified.")]
	NotConfigured {
		/// Provider identifier.
		provider: String,
	},
	/// An OpenID Connect provider returned no ID token and no user API is configured.
	#[error("The response from `{provider}` carries no ID token and no user API is configured; the required claims are missing.")]
	MissingClaims {
		/// Provider identifier.
		provider: String,
	},
	/// The `kube` user API needs `userApiToken`.
	#[error("The `kube` user API of `{provider}` requires `userApiToken`.")]
	MissingServiceAccountToken {
		/// Provider identifier.
		provider: String,
	},
	/// The user API answered with a non-success status.
	#[error("User API {uri} returned HTTP {status}: {preview}.")]
	HttpStatus {
		/// Endpoint.
		uri: String,
		/// HTTP status.
		status: u16,
		/// Truncated response body.
		preview: String,
	},
	/// The response could not be processed as the configured user API type.
	#[error("Cannot process the response from the {kind} user API {uri}: {reason}.")]
	BadResponse {
		/// Endpoint.
		uri: String,
		/// Configured user API type.
		kind: UserApiType,
		/// Parse failure.
		reason: String,
	},
	/// Introspection reported the token inactive or the review rejected it.
	#[error("User API {uri} reports the access token as not active{}.", reason.as_ref().map(|r| format!(": {r}")).unwrap_or_default())]
	Inactive {
		/// Endpoint.
		uri: String,
		/// Provider-supplied reason.
		reason: Option<String>,
	},
}
impl UserApiError {
	/// Stable label for log events.
	pub fn code(&self) -> &'static str {
		match self {
			Self::NotConfigured { .. } => "user_api.not_configured",
			Self::MissingClaims { .. } => "user_api.missing_claims",
			Self::MissingServiceAccountToken { .. } => "user_api.missing_service_account_token",
			Self::HttpStatus { .. } => "user_api.http_status",
			Self::BadResponse { .. } => "user_api.bad_response",
			Self::Inactive { .. } => "user_api.inactive",
		}
	}
}

#[derive(Debug, Deserialize)]
struct TokenReview {
	status: TokenReviewStatus,
}

#[derive(Debug, Deserialize)]
struct TokenReviewStatus {
	#[serde(default)]
	authenticated: bool,
	user: Option<TokenReviewUser>,
	error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenReviewUser {
	username: String,
	uid: Option<String>,
	#[serde(default)]
	groups: Vec<String>,
	#[serde(default)]
	extra: JsonMap<String, JsonValue>,
}

/// Calls the user API of one provider configuration.
#[derive(Clone, Copy, Debug)]
pub struct UserApiResolver<'a> {
	/// Provider configuration.
	pub config: &'a ProviderConfig,
	/// Resolved user API endpoint, if any.
	pub uri: Option<&'a Url>,
	/// Transport honoring the provider's `sslRef`.
	pub http: &'a ReqwestHttpClient,
}
impl UserApiResolver<'_> {
	/// Returns the claims describing the owner of `access_token`.
	pub async fn fetch_claims(&self, access_token: &Secret) -> Result<ValidatedClaims> {
		let provider = self.config.id.to_string();
		let Some(uri) = self.uri else {
			tracing::warn!(
				provider,
				code = "user_api.not_configured",
				"No user API is configured for `{provider}`."
			);

			return Err(UserApiError::NotConfigured { provider }.into());
		};
		let kind = self.config.user_api_type;
		let claims = match kind {
			UserApiType::Basic => self.basic(uri, access_token).await?,
			UserApiType::Introspect => self.introspect(uri, access_token).await?,
			UserApiType::Kube => self.kube(uri, access_token).await?,
		};

		tracing::debug!(provider, %uri, kind = kind.as_str(), "User API claims obtained.");

		Ok(ValidatedClaims::new(claims, ClaimOrigin::UserApi))
	}

	async fn basic(&self, uri: &Url, access_token: &Secret) -> Result<Claims> {
		let request = self
			.http
			.get(uri.clone())
			.bearer_auth(access_token.expose())
			.header(ACCEPT, "application/json");
		let reply = self.call(uri, request).await?;
		let body = self.parse::<JsonMap<String, JsonValue>>(uri, &reply)?;

		Ok(Claims::new(self.config.profile().user_api_claims(body)))
	}

	async fn introspect(&self, uri: &Url, access_token: &Secret) -> Result<Claims> {
		let secret = self.config.require_client_secret("introspection user API")?;
		let request = self
			.http
			.post(uri.clone())
			.basic_auth(&self.config.client_id, Some(secret.expose()))
			.header(ACCEPT, "application/json")
			.form(&[("token", access_token.expose()), ("token_type_hint", "access_token")]);
		let reply = self.call(uri, request).await?;
		let body = self.parse::<JsonMap<String, JsonValue>>(uri, &reply)?;

		if body.get("active").and_then(JsonValue::as_bool) != Some(true) {
			return Err(UserApiError::Inactive { uri: uri.to_string(), reason: None }.into());
		}

		Ok(Claims::new(body))
	}

	async fn kube(&self, uri: &Url, access_token: &Secret) -> Result<Claims> {
		let token = self.config.user_api_token.as_ref().filter(|token| !token.is_blank()).ok_or_else(
			|| UserApiError::MissingServiceAccountToken { provider: self.config.id.to_string() },
		)?;
		let review = serde_json::json!({
			"apiVersion": TOKEN_REVIEW_API_VERSION,
			"kind": "TokenReview",
			"spec": { "token": access_token.expose() },
		});
		let request = self
			.http
			.post(uri.clone())
			.bearer_auth(token.expose())
			.header(ACCEPT, "application/json")
			.header(CONTENT_TYPE, "application/json")
			.body(review.to_string());
		let reply = self.call(uri, request).await?;
		let review = self.parse::<TokenReview>(uri, &reply)?;

		if !review.status.authenticated {
			return Err(
				UserApiError::Inactive { uri: uri.to_string(), reason: review.status.error }.into()
			);
		}

		let user = review.status.user.ok_or_else(|| UserApiError::BadResponse {
			uri: uri.to_string(),
			kind: UserApiType::Kube,
			reason: "status.user is missing".into(),
		})?;
		let mut claims = Claims::default();

		claims.insert("username", user.username);
		claims.insert("groups", user.groups);

		if let Some(uid) = user.uid {
			claims.insert("uid", uid);
		}
		if !user.extra.is_empty() {
			claims.insert("extra", user.extra);
		}

		Ok(claims)
	}

	async fn call(&self, uri: &Url, request: reqwest::RequestBuilder) -> Result<HttpReply> {
		let reply = self.http.fetch(uri, request).await?;

		if !reply.is_success() {
			return Err(UserApiError::HttpStatus {
				uri: uri.to_string(),
				status: reply.status,
				preview: reply.preview(),
			}
			.into());
		}

		Ok(reply)
	}

	fn parse<T>(&self, uri: &Url, reply: &HttpReply) -> Result<T, UserApiError>
	where
		T: serde::de::DeserializeOwned,
	{
		reply.json::<T>().map_err(|e| UserApiError::BadResponse {
			uri: uri.to_string(),
			kind: self.config.user_api_type,
			reason: e.to_string(),
		})
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use httpmock::prelude::*;
	// self
	use super::*;
	use crate::{
		_preludet::test_reqwest_http_client, config::ProviderEntryDocument, provider::ProviderKind,
	};

	fn config(kind: ProviderKind, attributes: JsonValue) -> ProviderConfig {
		let attributes = match attributes {
			JsonValue::Object(map) => map,
			_ => panic!("Attribute fixture must be an object."),
		};

		ProviderConfig::load(&ProviderEntryDocument { kind, id: "p1".into(), attributes })
			.expect("Provider fixture should load.")
	}

	fn url(server: &MockServer, path: &str) -> Url {
		Url::parse(&server.url(path)).expect("Mock URL should parse.")
	}

	#[tokio::test]
	async fn basic_sends_the_bearer_token() {
		let server = MockServer::start_async().await;
		let mock = server
			.mock_async(|when, then| {
				when.method(GET).path("/user").header("authorization", "Bearer at-1");
				then.status(200).json_body(serde_json::json!({ "login": "octocat", "id": 1 }));
			})
			.await;
		let config = config(ProviderKind::GitHub, serde_json::json!({ "clientId": "c" }));
		let uri = url(&server, "/user");
		let http = test_reqwest_http_client();
		let resolver = UserApiResolver { config: &config, uri: Some(&uri), http: &http };
		let claims = resolver.fetch_claims(&Secret::new("at-1")).await.expect("User API should answer.");

		mock.assert_async().await;
		assert_eq!(claims.origin(), ClaimOrigin::UserApi);
		assert_eq!(claims.claims().string("login").as_deref(), Some("octocat"));
		assert_eq!(claims.claims().string("id").as_deref(), Some("1"));
	}

	#[tokio::test]
	async fn missing_user_api_is_reported() {
		let config = config(ProviderKind::GitHub, serde_json::json!({ "clientId": "c", "userApi": "" }));
		let http = test_reqwest_http_client();
		let resolver = UserApiResolver { config: &config, uri: config.user_api.as_ref(), http: &http };
		let err = resolver.fetch_claims(&Secret::new("at")).await.expect_err("No user API must fail.");

		assert!(matches!(err, Error::UserApi(UserApiError::NotConfigured { .. })));
	}

	#[tokio::test]
	async fn introspection_requires_an_active_token() {
		let server = MockServer::start_async().await;
		let mock = server
			.mock_async(|when, then| {
				when.method(POST)
					.path("/introspect")
					.header_exists("authorization")
					.form_urlencoded_tuple("token", "at-2");
				then.status(200).json_body(serde_json::json!({ "active": false }));
			})
			.await;
		let config = config(
			ProviderKind::OAuth2,
			serde_json::json!({ "clientId": "c", "clientSecret": "s", "userApiType": "introspect" }),
		);
		let uri = url(&server, "/introspect");
		let http = test_reqwest_http_client();
		let resolver = UserApiResolver { config: &config, uri: Some(&uri), http: &http };
		let err = resolver.fetch_claims(&Secret::new("at-2")).await.expect_err("Inactive token must fail.");

		mock.assert_async().await;
		assert!(matches!(err, Error::UserApi(UserApiError::Inactive { .. })));
	}

	#[tokio::test]
	async fn kube_parses_token_reviews() {
		let server = MockServer::start_async().await;
		let mock = server
			.mock_async(|when, then| {
				when.method(POST)
					.path("/apis/authentication.k8s.io/v1/tokenreviews")
					.header("authorization", "Bearer sa-token")
					.body_includes("\"TokenReview\"")
					.body_includes("at-3");
				then.status(201).json_body(serde_json::json!({
					"kind": "TokenReview",
					"status": {
						"authenticated": true,
						"user": { "username": "system:admin", "uid": "u-1", "groups": ["system:masters"] },
					},
				}));
			})
			.await;
		let config =
			config(ProviderKind::Okd, serde_json::json!({ "clientId": "c", "userApiToken": "sa-token" }));
		let uri = url(&server, "/apis/authentication.k8s.io/v1/tokenreviews");
		let http = test_reqwest_http_client();
		let resolver = UserApiResolver { config: &config, uri: Some(&uri), http: &http };
		let claims = resolver.fetch_claims(&Secret::new("at-3")).await.expect("Review should pass.");

		mock.assert_async().await;
		assert_eq!(claims.claims().string("username").as_deref(), Some("system:admin"));
		assert_eq!(claims.claims().strings("groups"), ["system:masters"]);
	}

	#[tokio::test]
	async fn kube_against_a_plain_user_api_cannot_process_the_response() {
		let server = MockServer::start_async().await;

		server
			.mock_async(|when, then| {
				when.method(POST).path("/user");
				then.status(200).json_body(serde_json::json!({ "login": "octocat" }));
			})
			.await;

		let config = config(
			ProviderKind::GitHub,
			serde_json::json!({ "clientId": "c", "userApiType": "kube", "userApiToken": "t" }),
		);
		let uri = url(&server, "/user");
		let http = test_reqwest_http_client();
		let resolver = UserApiResolver { config: &config, uri: Some(&uri), http: &http };
		let err = resolver.fetch_claims(&Secret::new("at")).await.expect_err("Kube on GitHub must fail.");

		assert!(matches!(err, Error::UserApi(UserApiError::BadResponse { kind: UserApiType::Kube, .. })));
		assert!(err.to_string().contains("Cannot process the response"));
		assert_eq!(err.status(), 401);
	}

	#[tokio::test]
	async fn error_statuses_are_reported() {
		let server = MockServer::start_async().await;

		server
			.mock_async(|when, then| {
				when.method(GET).path("/user");
				then.status(500).body("boom");
			})
			.await;

		let config = config(ProviderKind::GitHub, serde_json::json!({ "clientId": "c" }));
		let uri = url(&server, "/user");
		let http = test_reqwest_http_client();
		let resolver = UserApiResolver { config: &config, uri: Some(&uri), http: &http };
		let err = resolver.fetch_claims(&Secret::new("at")).await.expect_err("500 must fail.");

		assert!(matches!(err, Error::UserApi(UserApiError::HttpStatus { status: 500, .. })));
	}
}
