// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{Rng, distr::Alphanumeric};
use sha2::{Digest, Sha256};
// self
use crate::{
	_prelude::*,
	auth::Secret,
	config::{ProviderConfig, RESERVED_AUTHZ_PARAMETERS},
	provider::{ProviderDescriptor, ResponseMode},
	request::InboundRequest,
	store::AuthorizationRequest,
};

const STATE_LEN: usize = 32;
const NONCE_LEN: usize = 32;
const PKCE_VERIFIER_LEN: usize = 64;

/// Path prefix of the redirect endpoint; the provider identifier follows it.
pub const REDIRECT_PATH: &str = "/social-login/redirect/";

/// Supported PKCE challenge methods.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PkceCodeChallengeMethod {
	/// SHA-256 based PKCE (RFC 7636 S256).
	S256,
}
impl PkceCodeChallengeMethod {
	/// Returns the RFC 7636 identifier for the challenge method.
	pub fn as_str(self) -> &'static str {
		match self {
			PkceCodeChallengeMethod::S256 => "S256",
		}
	}
}

#[derive(Clone)]
pub(super) struct PkcePair {
	verifier: String,
	challenge: String,
	method: PkceCodeChallengeMethod,
}
impl PkcePair {
	pub(super) fn generate() -> Self {
		let verifier = random_string(PKCE_VERIFIER_LEN);
		let challenge = compute_pkce_challenge(&verifier);

		Self { verifier, challenge, method: PkceCodeChallengeMethod::S256 }
	}
}

/// Authorization request URL plus the pending request recorded for the callback.
pub struct AuthorizationSession {
	/// Fully-formed authorization endpoint URL the browser is sent to.
	pub location: Url,
	/// Request to store under its `state`.
	pub pending: AuthorizationRequest,
}
impl Debug for AuthorizationSession {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthorizationSession")
			.field("authorization_endpoint", &self.location.path())
			.field("pending", &self.pending)
			.finish()
	}
}

/// Redirect URI of `config`: `{redirectToRPHostAndPort | request origin}/social-login/redirect/{id}`.
pub fn redirect_uri(config: &ProviderConfig, request: &InboundRequest) -> Url {
	let mut url = config.redirect_to_rp_host_and_port.clone().unwrap_or_else(|| request.origin());

	url.set_path(&format!("{REDIRECT_PATH}{}", config.id));
	url.set_query(None);
	url.set_fragment(None);

	url
}

pub(super) fn build_session(
	config: &ProviderConfig,
	descriptor: &ProviderDescriptor,
	request: &InboundRequest,
) -> AuthorizationSession {
	let provider: &str = &config.id;
	let response_type = descriptor.response_type;
	let redirect_uri = redirect_uri(config, request);
	let state = random_string(STATE_LEN);
	let nonce = (config.profile().expects_id_token() && config.nonce_enabled)
		.then(|| random_string(NONCE_LEN));
	let pkce = descriptor.quirks.pkce_required.then(PkcePair::generate);
	let mut location = descriptor.endpoints.authorization.clone();
	let mut pairs = location.query_pairs_mut();

	pairs.append_pair("response_type", response_type.as_str());
	pairs.append_pair("client_id", &config.client_id);
	pairs.append_pair("redirect_uri", redirect_uri.as_str());

	if !descriptor.scope.is_empty() {
		pairs.append_pair("scope", &descriptor.scope.normalized());
	}

	pairs.append_pair("state", &state);

	if let Some(nonce) = &nonce {
		pairs.append_pair("nonce", nonce);
	}
	if let Some(pkce) = &pkce {
		pairs.append_pair("code_challenge", &pkce.challenge);
		pairs.append_pair("code_challenge_method", pkce.method.as_str());
	}
	if config.response_mode != response_type.default_mode() || config.response_mode == ResponseMode::FormPost
	{
		pairs.append_pair("response_mode", config.response_mode.as_str());
	}

	for name in &config.forward_login_parameters {
		if RESERVED_AUTHZ_PARAMETERS.contains(&name.as_str()) {
			tracing::warn!(
				provider,
				parameter = name.as_str(),
				code = "authorize.reserved_parameter",
				"The login parameter `{name}` is reserved and is not forwarded."
			);

			continue;
		}
		if let Some(value) = request.query_param(name) {
			pairs.append_pair(name, &value);
		}
	}
	for (name, value) in &config.authz_parameters {
		pairs.append_pair(name, value);
	}

	drop(pairs);

	let pending = AuthorizationRequest {
		provider: config.id.clone(),
		state,
		nonce,
		pkce_verifier: pkce.map(|pkce| Secret::new(pkce.verifier)),
		redirect_uri,
		original_url: request.url.clone(),
		response_type,
		created_at: OffsetDateTime::now_utc(),
	};

	AuthorizationSession { location, pending }
}

fn random_string(len: usize) -> String {
	rand::rng().sample_iter(Alphanumeric).take(len).map(char::from).collect()
}

fn compute_pkce_challenge(verifier: &str) -> String {
	let mut hasher = Sha256::new();

	hasher.update(verifier.as_bytes());

	URL_SAFE_NO_PAD.encode(hasher.finalize())
}
