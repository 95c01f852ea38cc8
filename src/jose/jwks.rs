//! JSON Web Keys, key sets, and the per-generation JWKS cache.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::DecodingKey;
use rsa::{RsaPublicKey, traits::PublicKeyParts};
// self
use crate::{
	_prelude::*,
	http::ReqwestHttpClient,
	jose::{KeyFamily, SignatureAlgorithm, ValidationError, VerificationKey, jws::b64_decode},
};

const P521_COORDINATE_LEN: usize = 66;

/// Public JSON Web Key.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
	/// Key type (`RSA`, `EC`, `oct`).
	pub kty: String,
	/// Key identifier.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub kid: Option<String>,
	/// Intended algorithm.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub alg: Option<String>,
	/// Intended use (`sig` or `enc`).
	#[serde(default, rename = "use", skip_serializing_if = "Option::is_none")]
	pub use_: Option<String>,
	/// RSA modulus.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub n: Option<String>,
	/// RSA public exponent.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub e: Option<String>,
	/// EC curve name.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub crv: Option<String>,
	/// EC x coordinate.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub x: Option<String>,
	/// EC y coordinate.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub y: Option<String>,
}
impl Jwk {
	/// Publishes an RSA public key.
	pub fn rsa(kid: &str, algorithm: SignatureAlgorithm, key: &RsaPublicKey) -> Self {
		Self {
			kty: "RSA".into(),
			kid: Some(kid.into()),
			alg: Some(algorithm.as_str().into()),
			use_: Some("sig".into()),
			n: Some(URL_SAFE_NO_PAD.encode(key.n().to_bytes_be())),
			e: Some(URL_SAFE_NO_PAD.encode(key.e().to_bytes_be())),
			..Default::default()
		}
	}

	/// Returns true when the key may verify `algorithm` signatures.
	pub fn accepts(&self, algorithm: SignatureAlgorithm) -> bool {
		if self.use_.as_deref().is_some_and(|u| u != "sig") {
			return false;
		}
		if self.alg.as_deref().is_some_and(|alg| alg != algorithm.as_str()) {
			return false;
		}

		match (self.kty.as_str(), algorithm) {
			("RSA", alg) => alg.family() == KeyFamily::Rsa,
			("EC", SignatureAlgorithm::ES256) => self.crv.as_deref() == Some("P-256"),
			("EC", SignatureAlgorithm::ES384) => self.crv.as_deref() == Some("P-384"),
			("EC", SignatureAlgorithm::ES512) => self.crv.as_deref() == Some("P-521"),
			_ => false,
		}
	}

	/// Converts the key into a verifier for `algorithm`.
	pub fn verification_key(
		&self,
		algorithm: SignatureAlgorithm,
	) -> Result<VerificationKey, ValidationError> {
		let unusable = |reason: &str| ValidationError::VerificationKeyUnavailable {
			reason: format!("JWK {:?} {reason}", self.kid.as_deref().unwrap_or("<no kid>")),
		};

		if !self.accepts(algorithm) {
			return Err(unusable(&format!("cannot verify {algorithm} signatures")));
		}

		match (self.kty.as_str(), algorithm) {
			("RSA", _) => {
				let (n, e) = self.n.as_deref().zip(self.e.as_deref()).ok_or_else(|| unusable("lacks n or e"))?;

				DecodingKey::from_rsa_components(n, e)
					.map(VerificationKey::Jwt)
					.map_err(|e| unusable(&e.to_string()))
			},
			("EC", SignatureAlgorithm::ES512) => {
				let (x, y) = self.coordinates().ok_or_else(|| unusable("lacks x or y"))?;
				let mut sec1 = vec![0x04];

				for coordinate in [x, y] {
					let bytes = b64_decode(coordinate).map_err(|e| unusable(&e.to_string()))?;

					if bytes.len() > P521_COORDINATE_LEN {
						return Err(unusable("has an oversized coordinate"));
					}

					sec1.resize(sec1.len() + P521_COORDINATE_LEN - bytes.len(), 0);
					sec1.extend_from_slice(&bytes);
				}

				VerificationKey::p521_sec1(&sec1).map_err(|e| unusable(&e.to_string()))
			},
			("EC", _) => {
				let (x, y) = self.coordinates().ok_or_else(|| unusable("lacks x or y"))?;

				DecodingKey::from_ec_components(x, y)
					.map(VerificationKey::Jwt)
					.map_err(|e| unusable(&e.to_string()))
			},
			_ => Err(unusable("has an unsupported key type")),
		}
	}

	fn coordinates(&self) -> Option<(&str, &str)> {
		self.x.as_deref().zip(self.y.as_deref())
	}
}

/// JWK set document.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwkSet {
	/// Published keys.
	#[serde(default)]
	pub keys: Vec<Jwk>,
}
impl JwkSet {
	/// Selects the key for a token header: by `kid` when present, otherwise the first key
	/// accepting the algorithm.
	pub fn find(&self, kid: Option<&str>, algorithm: SignatureAlgorithm) -> Option<&Jwk> {
		self.keys.iter().filter(|key| key.accepts(algorithm)).find(|key| match kid {
			Some(kid) => key.kid.as_deref() == Some(kid),
			None => true,
		})
	}
}

/// Lazily fetched JWK set of one provider, scoped to a configuration generation.
///
/// A `kid` the cached set does not know triggers exactly one refetch per lookup.
#[derive(Debug)]
pub struct JwksCache {
	uri: Url,
	keys: Mutex<Option<Arc<JwkSet>>>,
}
impl JwksCache {
	/// Creates an empty cache for `uri`.
	pub fn new(uri: Url) -> Self {
		Self { uri, keys: Mutex::new(None) }
	}

	/// JWK set endpoint.
	pub fn uri(&self) -> &Url {
		&self.uri
	}

	/// Resolves the verification key for a token header.
	pub async fn verification_key(
		&self,
		http: &ReqwestHttpClient,
		kid: Option<&str>,
		algorithm: SignatureAlgorithm,
	) -> Result<VerificationKey, ValidationError> {
		let cached = self.keys.lock().clone();

		if let Some(jwk) = cached.as_deref().and_then(|set| set.find(kid, algorithm)) {
			return jwk.verification_key(algorithm);
		}

		let set = self.refresh(http).await?;

		set.find(kid, algorithm)
			.ok_or_else(|| ValidationError::VerificationKeyUnavailable {
				reason: format!(
					"no key in {} matches kid {:?} for {algorithm}",
					self.uri,
					kid.unwrap_or("<absent>")
				),
			})?
			.verification_key(algorithm)
	}

	async fn refresh(&self, http: &ReqwestHttpClient) -> Result<Arc<JwkSet>, ValidationError> {
		let unavailable =
			|reason: String| ValidationError::JwksUnavailable { uri: self.uri.to_string(), reason };

		tracing::debug!(uri = %self.uri, "Fetching JWK set.");

		let reply = http
			.fetch(&self.uri, http.get(self.uri.clone()))
			.await
			.map_err(|e| unavailable(e.to_string()))?;

		if !reply.is_success() {
			return Err(unavailable(format!("HTTP status {}", reply.status)));
		}

		let set = Arc::new(reply.json::<JwkSet>().map_err(|e| unavailable(e.to_string()))?);

		*self.keys.lock() = Some(Arc::clone(&set));

		Ok(set)
	}
}
