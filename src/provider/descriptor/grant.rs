// self
use crate::_prelude::*;

/// Grant types a social login flow can run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
	/// Authorization Code grant; tokens come from the token endpoint.
	AuthorizationCode,
	/// Implicit grant; tokens come back on the redirect.
	Implicit,
}
impl GrantType {
	/// Returns the RFC 6749 identifier for the grant type.
	pub fn as_str(self) -> &'static str {
		match self {
			GrantType::AuthorizationCode => "authorization_code",
			GrantType::Implicit => "implicit",
		}
	}
}
impl Display for GrantType {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Collection of grant flags wired into the descriptor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportedGrants {
	/// Indicates whether the Authorization Code grant is enabled.
	pub authorization_code: bool,
	/// Indicates whether the Implicit grant is enabled.
	pub implicit: bool,
}
impl SupportedGrants {
	/// Returns true if the provided grant is supported.
	pub fn supports(self, grant: GrantType) -> bool {
		match grant {
			GrantType::AuthorizationCode => self.authorization_code,
			GrantType::Implicit => self.implicit,
		}
	}

	/// Marks a grant as supported.
	pub fn enable(mut self, grant: GrantType) -> Self {
		match grant {
			GrantType::AuthorizationCode => self.authorization_code = true,
			GrantType::Implicit => self.implicit = true,
		}

		self
	}

	/// Returns true when no grants are enabled.
	pub fn is_empty(self) -> bool {
		!self.authorization_code && !self.implicit
	}
}

/// Error returned when an enumerated attribute value is not recognized.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("Unrecognized value `{0}`.")]
pub struct UnknownValue(pub String);

/// OAuth `response_type` values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ResponseType {
	/// `code`.
	#[default]
	Code,
	/// `token`.
	Token,
	/// `id_token`.
	IdToken,
	/// `id_token token`.
	IdTokenToken,
}
impl ResponseType {
	/// Wire value.
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Code => "code",
			Self::Token => "token",
			Self::IdToken => "id_token",
			Self::IdTokenToken => "id_token token",
		}
	}

	/// Grant the response type drives.
	pub fn grant(self) -> GrantType {
		match self {
			Self::Code => GrantType::AuthorizationCode,
			Self::Token | Self::IdToken | Self::IdTokenToken => GrantType::Implicit,
		}
	}

	/// Returns true when the provider returns an ID token on the redirect.
	pub fn returns_id_token(self) -> bool {
		matches!(self, Self::IdToken | Self::IdTokenToken)
	}

	/// Returns true when the provider returns an access token on the redirect.
	pub fn returns_access_token(self) -> bool {
		matches!(self, Self::Token | Self::IdTokenToken)
	}

	/// Response mode used when none is configured.
	pub fn default_mode(self) -> ResponseMode {
		match self.grant() {
			GrantType::AuthorizationCode => ResponseMode::Query,
			GrantType::Implicit => ResponseMode::Fragment,
		}
	}
}
impl Display for ResponseType {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
impl FromStr for ResponseType {
	type Err = UnknownValue;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let mut parts = s.split_whitespace().collect::<Vec<_>>();

		parts.sort_unstable();

		match parts.as_slice() {
			["code"] => Ok(Self::Code),
			["token"] => Ok(Self::Token),
			["id_token"] => Ok(Self::IdToken),
			["id_token", "token"] => Ok(Self::IdTokenToken),
			_ => Err(UnknownValue(s.into())),
		}
	}
}

/// OAuth `response_mode` values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResponseMode {
	/// Parameters in the redirect query string.
	Query,
	/// Parameters in the redirect URL fragment.
	Fragment,
	/// Parameters posted as an HTML form.
	FormPost,
}
impl ResponseMode {
	/// Wire value.
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Query => "query",
			Self::Fragment => "fragment",
			Self::FormPost => "form_post",
		}
	}
}
impl FromStr for ResponseMode {
	type Err = UnknownValue;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"query" => Ok(Self::Query),
			"fragment" => Ok(Self::Fragment),
			"form_post" => Ok(Self::FormPost),
			_ => Err(UnknownValue(s.into())),
		}
	}
}

/// Client authentication methods for token endpoint calls.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenEndpointAuthMethod {
	/// HTTP Basic with `client_id`/`client_secret`.
	ClientSecretBasic,
	/// Form POST body parameters for `client_id`/`client_secret`.
	#[default]
	ClientSecretPost,
}
impl TokenEndpointAuthMethod {
	/// Wire value.
	pub fn as_str(self) -> &'static str {
		match self {
			Self::ClientSecretBasic => "client_secret_basic",
			Self::ClientSecretPost => "client_secret_post",
		}
	}
}
impl Display for TokenEndpointAuthMethod {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
impl FromStr for TokenEndpointAuthMethod {
	type Err = UnknownValue;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"client_secret_basic" => Ok(Self::ClientSecretBasic),
			"client_secret_post" => Ok(Self::ClientSecretPost),
			_ => Err(UnknownValue(s.into())),
		}
	}
}
