//! JWT builder: signs claim sets and optionally wraps them in a JWE.

// crates.io
use rsa::RsaPublicKey;
// self
use crate::{
	_prelude::*,
	auth::Claims,
	config::password,
	error::ConfigError,
	jose::{
		ContentEncryptionAlgorithm, Jwk, JwkSet, KeyFamily, KeyManagementAlgorithm, KeyStore,
		SignatureAlgorithm, SigningKey, jwe, jws,
	},
};

/// Default token lifetime.
pub const DEFAULT_TOKEN_LIFETIME: Duration = Duration::hours(2);

/// Serialized JWT builder configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JwtBuilderDocument {
	/// `iss` stamped on every token.
	pub issuer: Option<String>,
	/// `aud` stamped on every token.
	pub audiences: Vec<String>,
	/// Lifetime in seconds.
	pub expires_in_seconds: Option<i64>,
	/// Signature algorithm.
	pub signature_algorithm: SignatureAlgorithm,
	/// Key store alias of the signing key (RS*/ES*).
	pub key_alias: Option<String>,
	/// Shared secret for HS*; may be `{xor}`-obfuscated.
	pub shared_key: Option<String>,
	/// Key store alias of the RSA key the token is encrypted for.
	pub key_management_key_alias: Option<String>,
	/// JWE key management algorithm.
	pub key_management_algorithm: KeyManagementAlgorithm,
	/// JWE content encryption algorithm.
	pub content_encryption_algorithm: ContentEncryptionAlgorithm,
	/// Static claims added to every token.
	pub claims: JsonMap<String, JsonValue>,
}

#[derive(Clone)]
struct Encryption {
	key_alg: KeyManagementAlgorithm,
	enc: ContentEncryptionAlgorithm,
	key: RsaPublicKey,
	alias: String,
}

/// Configured token minter.
#[derive(Clone)]
pub struct JwtBuilder {
	id: String,
	issuer: Option<String>,
	audiences: Vec<String>,
	lifetime: Duration,
	algorithm: SignatureAlgorithm,
	signing_key: SigningKey,
	kid: Option<String>,
	public_jwk: Option<Jwk>,
	encryption: Option<Encryption>,
	claims: JsonMap<String, JsonValue>,
}
impl JwtBuilder {
	/// Resolves keys and validates a builder configuration.
	pub fn new(id: &str, document: &JwtBuilderDocument, keys: &KeyStore) -> Result<Self, ConfigError> {
		let invalid =
			|reason: String| ConfigError::InvalidJwtBuilder { id: id.to_owned(), reason };
		let algorithm = document.signature_algorithm;
		let (signing_key, kid, public_jwk) = if algorithm.family() == KeyFamily::Hmac {
			let secret = document
				.shared_key
				.as_deref()
				.filter(|key| !key.is_empty())
				.ok_or_else(|| invalid(format!("{algorithm} requires sharedKey")))?;
			let secret = password::decode("sharedKey", secret)?;

			(SigningKey::hmac(secret.as_bytes()), None, None)
		} else {
			let alias = document
				.key_alias
				.as_deref()
				.ok_or_else(|| invalid(format!("{algorithm} requires keyAlias")))?;
			let key = keys.signing_key(alias, algorithm).map_err(|e| invalid(e.to_string()))?;

			(key, Some(alias.to_owned()), keys.public_jwk(alias, algorithm))
		};
		let encryption = match document.key_management_key_alias.as_deref() {
			Some(alias) => Some(Encryption {
				key_alg: document.key_management_algorithm,
				enc: document.content_encryption_algorithm,
				key: keys.encryption_key(alias).map_err(|e| invalid(e.to_string()))?,
				alias: alias.to_owned(),
			}),
			None => None,
		};
		let lifetime = document
			.expires_in_seconds
			.map(Duration::seconds)
			.unwrap_or(DEFAULT_TOKEN_LIFETIME);

		if !lifetime.is_positive() {
			return Err(invalid("expiresInSeconds must be positive".into()));
		}

		Ok(Self {
			id: id.to_owned(),
			issuer: document.issuer.clone(),
			audiences: document.audiences.clone(),
			lifetime,
			algorithm,
			signing_key,
			kid,
			public_jwk,
			encryption,
			claims: document.claims.clone(),
		})
	}

	/// Builder identifier.
	pub fn id(&self) -> &str {
		&self.id
	}

	/// Signature algorithm.
	pub fn algorithm(&self) -> SignatureAlgorithm {
		self.algorithm
	}

	/// Issuer stamped on tokens.
	pub fn issuer(&self) -> Option<&str> {
		self.issuer.as_deref()
	}

	/// JWK set publishing the verification key; empty for HMAC and EC builders.
	pub fn jwk_set(&self) -> JwkSet {
		JwkSet { keys: self.public_jwk.iter().cloned().collect() }
	}

	/// Mints a compact token from `claims`.
	///
	/// Static claims, `iss`, `aud`, `iat`, and `exp` are filled in when `claims` does not set
	/// them.
	pub fn build(&self, claims: &Claims) -> Result<String, ConfigError> {
		let now = OffsetDateTime::now_utc();
		let mut payload = claims.clone();

		payload.merge_missing(&Claims::new(self.claims.clone()));

		if let Some(issuer) = self.issuer.as_deref().filter(|_| !payload.contains("iss")) {
			payload.insert("iss", issuer);
		}
		if !self.audiences.is_empty() && !payload.contains("aud") {
			match self.audiences.as_slice() {
				[single] => payload.insert("aud", single.as_str()),
				many => payload.insert("aud", many.to_vec()),
			}
		}
		if !payload.contains("iat") {
			payload.insert("iat", now.unix_timestamp());
		}
		if !payload.contains("exp") {
			payload.insert("exp", (now + self.lifetime).unix_timestamp());
		}

		let invalid = |reason: String| ConfigError::InvalidJwtBuilder { id: self.id.clone(), reason };
		let token = jws::sign(self.algorithm, &self.signing_key, self.kid.as_deref(), &payload)
			.map_err(|e| invalid(e.to_string()))?;
		let token = match &self.encryption {
			Some(encryption) => jwe::encrypt(
				token.as_bytes(),
				encryption.key_alg,
				encryption.enc,
				&encryption.key,
				Some(&encryption.alias),
			)
			.map_err(|e| invalid(e.to_string()))?,
			None => token,
		};

		tracing::debug!(builder = %self.id, alg = %self.algorithm, "Token minted.");

		Ok(token)
	}
}
impl Debug for JwtBuilder {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("JwtBuilder")
			.field("id", &self.id)
			.field("issuer", &self.issuer)
			.field("audiences", &self.audiences)
			.field("algorithm", &self.algorithm)
			.field("encrypted", &self.encryption.is_some())
			.finish()
	}
}
