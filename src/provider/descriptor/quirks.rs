// self
use crate::_prelude::*;

/// Provider capabilities that influence how flows behave.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderQuirks {
	/// PKCE (S256) must accompany the authorization request.
	pub pkce_required: bool,
	/// The token endpoint is expected to return an `id_token`.
	pub id_token_expected: bool,
	/// The token endpoint honors HTTP Basic client authentication.
	pub basic_auth_supported: bool,
}
impl Default for ProviderQuirks {
	fn default() -> Self {
		Self { pkce_required: false, id_token_expected: false, basic_auth_supported: true }
	}
}
