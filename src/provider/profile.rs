//! Provider profiles: per-provider defaults and capabilities selected by configuration.

// self
use crate::{
	_prelude::*,
	provider::{ProviderErrorContext, ProviderErrorKind, ResponseType, classify_token_error},
	userapi::UserApiType,
};

/// Kind of social login configuration entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderKind {
	/// Facebook.
	#[serde(rename = "facebookLogin")]
	Facebook,
	/// GitHub.
	#[serde(rename = "githubLogin")]
	GitHub,
	/// LinkedIn.
	#[serde(rename = "linkedinLogin")]
	LinkedIn,
	/// Twitter, using OAuth 2.0 with PKCE.
	#[serde(rename = "twitterLogin")]
	Twitter,
	/// Generic OpenID Connect provider.
	#[serde(rename = "oidcLogin")]
	Oidc,
	/// OpenShift (OKD) service account login through the TokenReview API.
	#[serde(rename = "okdServiceLogin")]
	Okd,
	/// Generic OAuth 2.0 provider.
	#[serde(rename = "oauth2Login")]
	OAuth2,
}
impl ProviderKind {
	/// Returns the profile implementing the kind's capabilities.
	pub fn profile(self) -> &'static dyn ProviderProfile {
		match self {
			Self::Facebook => &FacebookProfile,
			Self::GitHub => &GitHubProfile,
			Self::LinkedIn => &LinkedInProfile,
			Self::Twitter => &TwitterProfile,
			Self::Oidc => &OidcProfile,
			Self::Okd => &OkdProfile,
			Self::OAuth2 => &GenericOAuthProfile,
		}
	}

	/// Configuration element name.
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Facebook => "facebookLogin",
			Self::GitHub => "githubLogin",
			Self::LinkedIn => "linkedinLogin",
			Self::Twitter => "twitterLogin",
			Self::Oidc => "oidcLogin",
			Self::Okd => "okdServiceLogin",
			Self::OAuth2 => "oauth2Login",
		}
	}
}
impl Display for ProviderKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Endpoints a profile supplies when the configuration leaves them out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DefaultEndpoints {
	/// Authorization endpoint.
	pub authorization: Option<&'static str>,
	/// Token endpoint.
	pub token: Option<&'static str>,
	/// User API endpoint.
	pub user_api: Option<&'static str>,
}

/// Capability trait implemented once per [`ProviderKind`].
///
/// Providers are not uniform: they differ in defaults, in whether they accept Basic client
/// authentication, and in how they answer a rejected authorization request. Flows consult the
/// profile instead of branching on the provider name.
pub trait ProviderProfile: Send + Sync + Debug {
	/// Kind the profile belongs to.
	fn kind(&self) -> ProviderKind;

	/// Endpoints used when the configuration omits them.
	fn default_endpoints(&self) -> DefaultEndpoints {
		DefaultEndpoints::default()
	}

	/// Scopes requested when the configuration omits them.
	fn default_scope(&self) -> &'static [&'static str];

	/// User API type used when the configuration omits it.
	fn default_user_api_type(&self) -> UserApiType {
		UserApiType::Basic
	}

	/// Claim holding the user name when `userNameAttribute` is omitted.
	fn default_user_name_attribute(&self) -> &'static str;

	/// Claim holding the unique id when `userUniqueIdAttribute` is omitted.
	fn default_unique_id_attribute(&self) -> Option<&'static str> {
		None
	}

	/// Claim holding group memberships when `groupNameAttribute` is omitted.
	fn default_group_attribute(&self) -> Option<&'static str> {
		None
	}

	/// Whether the token endpoint honors `client_secret_basic`.
	fn supports_basic_auth(&self) -> bool {
		true
	}

	/// Whether the provider issues ID tokens (OpenID Connect semantics).
	fn expects_id_token(&self) -> bool {
		false
	}

	/// Whether authorization requests must carry a PKCE challenge.
	fn requires_pkce(&self) -> bool {
		false
	}

	/// Response types the provider accepts.
	fn supported_response_types(&self) -> &'static [ResponseType] {
		&[ResponseType::Code]
	}

	/// Status surfaced when the provider rejects the authorization request with `error`.
	fn authorization_error_status(&self, error: &str) -> u16 {
		match error {
			"access_denied" => 403,
			"server_error" | "temporarily_unavailable" => 500,
			_ => 401,
		}
	}

	/// Classifies a token endpoint failure.
	fn classify_token_error(&self, ctx: &ProviderErrorContext) -> ProviderErrorKind {
		classify_token_error(ctx)
	}

	/// Extracts the claim object from a user API response body.
	fn user_api_claims(&self, body: JsonMap<String, JsonValue>) -> JsonMap<String, JsonValue> {
		body
	}
}

/// Facebook: comma-style scopes, no Basic client authentication.
#[derive(Debug)]
pub struct FacebookProfile;
impl ProviderProfile for FacebookProfile {
	fn kind(&self) -> ProviderKind {
		ProviderKind::Facebook
	}

	fn default_endpoints(&self) -> DefaultEndpoints {
		DefaultEndpoints {
			authorization: Some("https://www.facebook.com/dialog/oauth"),
			token: Some("https://graph.facebook.com/v2.8/oauth/access_token"),
			user_api: Some("https://graph.facebook.com/me?fields=id,name,email"),
		}
	}

	fn default_scope(&self) -> &'static [&'static str] {
		&["email", "public_profile"]
	}

	fn default_user_name_attribute(&self) -> &'static str {
		"email"
	}

	fn default_unique_id_attribute(&self) -> Option<&'static str> {
		Some("id")
	}

	fn supports_basic_auth(&self) -> bool {
		false
	}

	fn authorization_error_status(&self, error: &str) -> u16 {
		match error {
			"access_denied" => 403,
			_ => 401,
		}
	}
}

/// GitHub.
#[derive(Debug)]
pub struct GitHubProfile;
impl ProviderProfile for GitHubProfile {
	fn kind(&self) -> ProviderKind {
		ProviderKind::GitHub
	}

	fn default_endpoints(&self) -> DefaultEndpoints {
		DefaultEndpoints {
			authorization: Some("https://github.com/login/oauth/authorize"),
			token: Some("https://github.com/login/oauth/access_token"),
			user_api: Some("https://api.github.com/user"),
		}
	}

	fn default_scope(&self) -> &'static [&'static str] {
		&["user"]
	}

	fn default_user_name_attribute(&self) -> &'static str {
		"login"
	}

	fn default_unique_id_attribute(&self) -> Option<&'static str> {
		Some("id")
	}
}

/// LinkedIn: no Basic client authentication, rejects bad requests with 400.
#[derive(Debug)]
pub struct LinkedInProfile;
impl ProviderProfile for LinkedInProfile {
	fn kind(&self) -> ProviderKind {
		ProviderKind::LinkedIn
	}

	fn default_endpoints(&self) -> DefaultEndpoints {
		DefaultEndpoints {
			authorization: Some("https://www.linkedin.com/oauth/v2/authorization"),
			token: Some("https://www.linkedin.com/oauth/v2/accessToken"),
			user_api: Some("https://api.linkedin.com/v2/me"),
		}
	}

	fn default_scope(&self) -> &'static [&'static str] {
		&["r_liteprofile", "r_emailaddress"]
	}

	fn default_user_name_attribute(&self) -> &'static str {
		"id"
	}

	fn default_unique_id_attribute(&self) -> Option<&'static str> {
		Some("id")
	}

	fn supports_basic_auth(&self) -> bool {
		false
	}

	fn authorization_error_status(&self, error: &str) -> u16 {
		match error {
			"invalid_request" | "invalid_scope" | "unauthorized_scope_error" => 400,
			"user_cancelled_login" | "user_cancelled_authorize" | "access_denied" => 403,
			_ => 401,
		}
	}
}

/// Twitter over OAuth 2.0: PKCE required, user API wraps claims in `data`.
#[derive(Debug)]
pub struct TwitterProfile;
impl ProviderProfile for TwitterProfile {
	fn kind(&self) -> ProviderKind {
		ProviderKind::Twitter
	}

	fn default_endpoints(&self) -> DefaultEndpoints {
		DefaultEndpoints {
			authorization: Some("https://twitter.com/i/oauth2/authorize"),
			token: Some("https://api.twitter.com/2/oauth2/token"),
			user_api: Some("https://api.twitter.com/2/users/me"),
		}
	}

	fn default_scope(&self) -> &'static [&'static str] {
		&["users.read", "tweet.read"]
	}

	fn default_user_name_attribute(&self) -> &'static str {
		"username"
	}

	fn default_unique_id_attribute(&self) -> Option<&'static str> {
		Some("id")
	}

	fn requires_pkce(&self) -> bool {
		true
	}

	fn authorization_error_status(&self, error: &str) -> u16 {
		match error {
			"invalid_request" => 400,
			"access_denied" => 403,
			_ => 401,
		}
	}

	fn user_api_claims(&self, mut body: JsonMap<String, JsonValue>) -> JsonMap<String, JsonValue> {
		match body.remove("data") {
			Some(JsonValue::Object(data)) => data,
			Some(other) => {
				body.insert("data".into(), other);

				body
			},
			None => body,
		}
	}
}

/// OpenID Connect: ID tokens, implicit response types, and 400 for malformed requests.
#[derive(Debug)]
pub struct OidcProfile;
impl ProviderProfile for OidcProfile {
	fn kind(&self) -> ProviderKind {
		ProviderKind::Oidc
	}

	fn default_scope(&self) -> &'static [&'static str] {
		&["openid", "profile", "email"]
	}

	fn default_user_name_attribute(&self) -> &'static str {
		"sub"
	}

	fn expects_id_token(&self) -> bool {
		true
	}

	fn supported_response_types(&self) -> &'static [ResponseType] {
		&[ResponseType::Code, ResponseType::IdToken, ResponseType::IdTokenToken, ResponseType::Token]
	}

	fn authorization_error_status(&self, error: &str) -> u16 {
		match error {
			"invalid_request" | "unsupported_response_type" | "invalid_scope" => 400,
			"access_denied" | "login_required" | "consent_required" => 403,
			"server_error" | "temporarily_unavailable" => 500,
			_ => 401,
		}
	}
}

/// OpenShift service accounts: claims come from the TokenReview API.
#[derive(Debug)]
pub struct OkdProfile;
impl ProviderProfile for OkdProfile {
	fn kind(&self) -> ProviderKind {
		ProviderKind::Okd
	}

	fn default_scope(&self) -> &'static [&'static str] {
		&["user:full"]
	}

	fn default_user_api_type(&self) -> UserApiType {
		UserApiType::Kube
	}

	fn default_user_name_attribute(&self) -> &'static str {
		"username"
	}

	fn default_unique_id_attribute(&self) -> Option<&'static str> {
		Some("uid")
	}

	fn default_group_attribute(&self) -> Option<&'static str> {
		Some("groups")
	}
}

/// Generic OAuth 2.0 provider.
#[derive(Debug)]
pub struct GenericOAuthProfile;
impl ProviderProfile for GenericOAuthProfile {
	fn kind(&self) -> ProviderKind {
		ProviderKind::OAuth2
	}

	fn default_scope(&self) -> &'static [&'static str] {
		&[]
	}

	fn default_user_name_attribute(&self) -> &'static str {
		"sub"
	}

	fn supported_response_types(&self) -> &'static [ResponseType] {
		&[ResponseType::Code, ResponseType::Token]
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn kinds_deserialize_from_element_names() {
		let kind: ProviderKind =
			serde_json::from_str("\"okdServiceLogin\"").expect("Kind should deserialize.");

		assert_eq!(kind, ProviderKind::Okd);
		assert_eq!(kind.profile().kind(), ProviderKind::Okd);
		assert_eq!(kind.profile().default_user_api_type(), UserApiType::Kube);
	}

	#[test]
	fn providers_disagree_on_status_codes() {
		assert_eq!(ProviderKind::Oidc.profile().authorization_error_status("invalid_request"), 400);
		assert_eq!(ProviderKind::Facebook.profile().authorization_error_status("invalid_request"), 401);
		assert_eq!(ProviderKind::GitHub.profile().authorization_error_status("access_denied"), 403);
	}

	#[test]
	fn capabilities_follow_provider() {
		assert!(!ProviderKind::Facebook.profile().supports_basic_auth());
		assert!(ProviderKind::Twitter.profile().requires_pkce());
		assert!(ProviderKind::Oidc.profile().expects_id_token());
		assert!(!ProviderKind::GitHub.profile().supported_response_types().contains(&ResponseType::Token));
	}

	#[test]
	fn twitter_unwraps_data_envelope() {
		let body = match serde_json::json!({ "data": { "id": "1", "username": "jack" } }) {
			JsonValue::Object(map) => map,
			_ => unreachable!(),
		};
		let claims = ProviderKind::Twitter.profile().user_api_claims(body);

		assert_eq!(claims.get("username"), Some(&JsonValue::from("jack")));
	}
}
