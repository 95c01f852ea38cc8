//! Compact JWS signing and verification.
//!
//! HMAC, RSA, and P-256/P-384 signatures go through `jsonwebtoken`; ES512 is computed with
//! `p521`, which `jsonwebtoken` does not cover.

// crates.io
use base64::{DecodeError, Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, errors::ErrorKind as JwtErrorKind};
use p521::ecdsa::signature::{Signer, Verifier};
// self
use crate::{
	_prelude::*,
	auth::Claims,
	jose::{SignatureAlgorithm, ValidationError},
};

/// Failure while producing a signature or ciphertext.
#[derive(Debug, ThisError)]
#[error("Cryptographic operation failed: {0}.")]
pub struct CryptoError(pub String);

/// Protected header fields the engine inspects.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoseHeader {
	/// `alg`.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub alg: Option<String>,
	/// `enc`; present only on JWE headers.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub enc: Option<String>,
	/// `kid`.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub kid: Option<String>,
	/// `typ`.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub typ: Option<String>,
	/// `cty`.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub cty: Option<String>,
}
impl JoseHeader {
	/// Decodes a base64url header segment.
	pub fn decode(segment: &str) -> Option<Self> {
		let bytes = b64_decode(segment).ok()?;

		serde_json::from_slice(&bytes).ok()
	}

	/// Returns true when the header describes a JWE.
	pub fn is_jwe(&self) -> bool {
		self.enc.is_some()
	}
}

/// Key able to produce signatures.
#[derive(Clone)]
pub enum SigningKey {
	/// Key handled by `jsonwebtoken` (HMAC secret, RSA, P-256, P-384).
	Jwt(EncodingKey),
	/// P-521 key for ES512.
	P521(p521::ecdsa::SigningKey),
}
impl SigningKey {
	/// HMAC key from a shared secret.
	pub fn hmac(secret: &[u8]) -> Self {
		Self::Jwt(EncodingKey::from_secret(secret))
	}

	pub(crate) fn p521(secret: &p521::SecretKey) -> Result<Self, CryptoError> {
		p521::ecdsa::SigningKey::from_slice(&secret.to_bytes())
			.map(Self::P521)
			.map_err(|e| CryptoError(e.to_string()))
	}
}

/// Key able to verify signatures.
#[derive(Clone)]
pub enum VerificationKey {
	/// Key handled by `jsonwebtoken` (HMAC secret, RSA, P-256, P-384).
	Jwt(DecodingKey),
	/// P-521 key for ES512.
	P521(p521::ecdsa::VerifyingKey),
}
impl VerificationKey {
	/// HMAC key from a shared secret.
	pub fn hmac(secret: &[u8]) -> Self {
		Self::Jwt(DecodingKey::from_secret(secret))
	}

	pub(crate) fn p521(public: &p521::PublicKey) -> Result<Self, CryptoError> {
		Self::p521_sec1(&public.to_sec1_bytes())
	}

	pub(crate) fn p521_sec1(sec1: &[u8]) -> Result<Self, CryptoError> {
		p521::ecdsa::VerifyingKey::from_sec1_bytes(sec1)
			.map(Self::P521)
			.map_err(|e| CryptoError(e.to_string()))
	}
}
impl Debug for VerificationKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::Jwt(_) => f.write_str("VerificationKey::Jwt(..)"),
			Self::P521(_) => f.write_str("VerificationKey::P521(..)"),
		}
	}
}

/// Signs `claims` as a compact JWS.
pub fn sign(
	algorithm: SignatureAlgorithm,
	key: &SigningKey,
	kid: Option<&str>,
	claims: &Claims,
) -> Result<String, CryptoError> {
	match (algorithm.to_jwt(), key) {
		(Some(alg), SigningKey::Jwt(key)) => {
			let mut header = Header::new(alg);

			header.kid = kid.map(str::to_owned);

			jsonwebtoken::encode(&header, claims.as_map(), key).map_err(|e| CryptoError(e.to_string()))
		},
		(None, SigningKey::P521(key)) => {
			let header = JoseHeader {
				alg: Some(algorithm.as_str().into()),
				kid: kid.map(str::to_owned),
				typ: Some("JWT".into()),
				..Default::default()
			};
			let signing_input = format!(
				"{}.{}",
				b64_json(&header).map_err(|e| CryptoError(e.to_string()))?,
				b64_json(claims.as_map()).map_err(|e| CryptoError(e.to_string()))?
			);
			let signature: p521::ecdsa::Signature = key.sign(signing_input.as_bytes());

			Ok(format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(signature.to_bytes())))
		},
		_ => Err(CryptoError(format!("key type cannot produce {algorithm} signatures"))),
	}
}

/// Verifies a compact JWS signed with exactly `expected` and returns its header and claims.
pub fn verify(
	token: &str,
	expected: SignatureAlgorithm,
	key: &VerificationKey,
) -> Result<(JoseHeader, Claims), ValidationError> {
	let header = jws_header(token)?;

	check_algorithm(&header, expected)?;

	let claims = match (expected.to_jwt(), key) {
		(Some(alg), VerificationKey::Jwt(key)) => {
			let mut validation = Validation::new(alg);

			validation.required_spec_claims.clear();
			validation.validate_exp = false;
			validation.validate_nbf = false;
			validation.validate_aud = false;

			jsonwebtoken::decode::<JsonMap<String, JsonValue>>(token, key, &validation)
				.map_err(map_jwt_error)?
				.claims
		},
		(None, VerificationKey::P521(key)) => verify_p521(token, key)?,
		_ =>
			return Err(ValidationError::VerificationKeyUnavailable {
				reason: format!("key type cannot verify {expected} signatures"),
			}),
	};

	Ok((header, Claims::new(claims)))
}

/// Decodes the header of a three-part token.
pub fn jws_header(token: &str) -> Result<JoseHeader, ValidationError> {
	let parts = token.split('.').collect::<Vec<_>>();

	if parts.len() != 3 {
		return Err(ValidationError::MalformedToken {
			reason: format!("a signed token has 3 parts, found {}", parts.len()),
		});
	}

	JoseHeader::decode(parts[0])
		.ok_or_else(|| ValidationError::MalformedToken { reason: "header is not valid JSON".into() })
}

fn check_algorithm(header: &JoseHeader, expected: SignatureAlgorithm) -> Result<(), ValidationError> {
	match header.alg.as_deref() {
		Some(alg) if alg == expected.as_str() => Ok(()),
		other => Err(ValidationError::AlgorithmMismatch {
			expected,
			actual: other.unwrap_or("<absent>").to_owned(),
		}),
	}
}

fn verify_p521(
	token: &str,
	key: &p521::ecdsa::VerifyingKey,
) -> Result<JsonMap<String, JsonValue>, ValidationError> {
	let (signing_input, signature) = token
		.rsplit_once('.')
		.ok_or_else(|| ValidationError::MalformedToken { reason: "missing signature".into() })?;
	let signature = b64_decode(signature)
		.ok()
		.and_then(|bytes| p521::ecdsa::Signature::from_slice(&bytes).ok())
		.ok_or(ValidationError::SignatureInvalid)?;

	key.verify(signing_input.as_bytes(), &signature).map_err(|_| ValidationError::SignatureInvalid)?;

	let payload = signing_input.split('.').nth(1).unwrap_or_default();

	b64_decode(payload)
		.ok()
		.and_then(|bytes| serde_json::from_slice(&bytes).ok())
		.ok_or_else(|| ValidationError::MalformedToken { reason: "payload is not a JSON object".into() })
}

fn map_jwt_error(e: jsonwebtoken::errors::Error) -> ValidationError {
	match e.kind() {
		JwtErrorKind::InvalidSignature
		| JwtErrorKind::InvalidAlgorithm
		| JwtErrorKind::InvalidKeyFormat
		| JwtErrorKind::InvalidEcdsaKey
		| JwtErrorKind::InvalidRsaKey(_) => ValidationError::SignatureInvalid,
		_ => ValidationError::MalformedToken { reason: e.to_string() },
	}
}

pub(crate) fn b64_decode(segment: &str) -> Result<Vec<u8>, DecodeError> {
	URL_SAFE_NO_PAD.decode(segment.trim_end_matches('='))
}

pub(crate) fn b64_json<T>(value: &T) -> Result<String, serde_json::Error>
where
	T: ?Sized + Serialize,
{
	Ok(URL_SAFE_NO_PAD.encode(serde_json::to_vec(value)?))
}
