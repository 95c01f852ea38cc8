//! JOSE support: JWS verification and signing, JWE decryption and encryption, JWK sets, the
//! key store, claim validation, and the JWT builder.
//!
//! Signature verification requires an exact algorithm match; a token signed with any other
//! algorithm than the configured one fails. Decryption only happens when the token actually is
//! a JWE, so unencrypted tokens are accepted even when a decryption key is configured.

pub mod alg;
pub mod builder;
pub mod jwe;
pub mod jwks;
pub mod jws;
pub mod keys;
pub mod validator;

pub use alg::*;
pub use builder::*;
pub use jwe::*;
pub use jwks::*;
pub use jws::*;
pub use keys::*;
pub use validator::*;

// self
use crate::_prelude::*;

/// Token validation failures.
#[derive(Debug, ThisError)]
pub enum ValidationError {
	/// The token is not a well-formed JWS.
	#[error("Token is malformed: {reason}.")]
	MalformedToken {
		/// Human-readable reason.
		reason: String,
	},
	/// A JWE must have exactly five dot-separated parts.
	#[error("Encrypted token has {parts} parts instead of 5.")]
	JweWrongPartCount {
		/// Number of parts found.
		parts: usize,
	},
	/// One of the five JWE segments cannot be decoded.
	#[error("Encrypted token segment `{segment}` cannot be parsed.")]
	JweSegmentUnparseable {
		/// Segment name.
		segment: &'static str,
	},
	/// A five-part token whose header describes a JWS.
	#[error("Token was expected to be a JWE but its header describes a JWS.")]
	NotAJwe,
	/// A JWE arrived but no decryption key is configured.
	#[error("Token is a JWE but no `keyManagementKeyAlias` is configured.")]
	DecryptionKeyNotConfigured,
	/// The configured decryption alias does not exist in the key store.
	#[error("Key alias `{alias}` was not found in the key store.")]
	KeyAliasNotFound {
		/// Configured alias.
		alias: String,
	},
	/// The decryption alias names a public key.
	#[error("Key alias `{alias}` holds a public key; decryption requires a private key.")]
	PublicKeyForDecryption {
		/// Configured alias.
		alias: String,
	},
	/// The decryption key is below the minimum RSA size.
	#[error("Key alias `{alias}` holds a {bits}-bit RSA key; at least 2048 bits are required.")]
	KeyTooSmall {
		/// Configured alias.
		alias: String,
		/// Key size in bits.
		bits: usize,
	},
	/// The key cannot be used with the requested algorithm family.
	#[error("Key alias `{alias}` cannot be used for {purpose}.")]
	UnsupportedKeyType {
		/// Configured alias.
		alias: String,
		/// What the key was needed for.
		purpose: &'static str,
	},
	/// The JWE names an algorithm the engine does not implement.
	#[error("Encryption algorithm `{algorithm}` is not supported.")]
	UnsupportedJweAlgorithm {
		/// Offending `alg` or `enc` value.
		algorithm: String,
	},
	/// A JWE segment does not decrypt or authenticate with the configured key.
	#[error("Token decryption failed: segment `{segment}` does not decrypt with the configured key.")]
	DecryptionFailed {
		/// Segment that failed: the encrypted key or the authenticated content.
		segment: &'static str,
	},
	/// The token was signed with a different algorithm than configured.
	#[error("Token is signed with `{actual}` but `{expected}` is required.")]
	AlgorithmMismatch {
		/// Configured algorithm.
		expected: SignatureAlgorithm,
		/// Algorithm named by the token header.
		actual: String,
	},
	/// Signature verification failed.
	#[error("Token signature is invalid.")]
	SignatureInvalid,
	/// No key is available to verify the signature.
	#[error("No key is available to verify the token signature: {reason}.")]
	VerificationKeyUnavailable {
		/// Human-readable reason.
		reason: String,
	},
	/// The JWK set could not be retrieved or parsed.
	#[error("JWK set from {uri} is unusable: {reason}.")]
	JwksUnavailable {
		/// JWK set endpoint.
		uri: String,
		/// Human-readable reason.
		reason: String,
	},
	/// `iss` does not match the configured issuer.
	#[error("Token issuer `{actual}` does not match the expected issuer `{expected}`.")]
	IssuerMismatch {
		/// Configured issuer.
		expected: String,
		/// Token issuer.
		actual: String,
	},
	/// `aud` does not include any accepted audience.
	#[error("Token audience {actual:?} does not include any of {expected:?}.")]
	AudienceMismatch {
		/// Accepted audiences.
		expected: Vec<String>,
		/// Token audiences.
		actual: Vec<String>,
	},
	/// `exp` is in the past (beyond the clock skew).
	#[error("Token expired at {expired_at}.")]
	Expired {
		/// Expiry instant.
		expired_at: OffsetDateTime,
	},
	/// `nbf` or `iat` is in the future (beyond the clock skew).
	#[error("Token is not valid before {not_before}.")]
	NotYetValid {
		/// First valid instant.
		not_before: OffsetDateTime,
	},
	/// A required claim is absent.
	#[error("Token is missing the required claim `{claim}`.")]
	MissingClaim {
		/// Claim name.
		claim: &'static str,
	},
	/// `nonce` does not match the one sent on the authorization request.
	#[error("Token nonce does not match the authorization request.")]
	NonceMismatch,
}
impl ValidationError {
	/// Stable label for log events.
	pub fn code(&self) -> &'static str {
		match self {
			Self::MalformedToken { .. } => "validation.malformed_token",
			Self::JweWrongPartCount { .. } => "validation.jwe_part_count",
			Self::JweSegmentUnparseable { .. } => "validation.jwe_segment",
			Self::NotAJwe => "validation.not_a_jwe",
			Self::DecryptionKeyNotConfigured => "validation.decryption_key_not_configured",
			Self::KeyAliasNotFound { .. } => "validation.key_alias_not_found",
			Self::PublicKeyForDecryption { .. } => "validation.public_key_for_decryption",
			Self::KeyTooSmall { .. } => "validation.key_too_small",
			Self::UnsupportedKeyType { .. } => "validation.unsupported_key_type",
			Self::UnsupportedJweAlgorithm { .. } => "validation.unsupported_jwe_algorithm",
			Self::DecryptionFailed { .. } => "validation.decryption_failed",
			Self::AlgorithmMismatch { .. } => "validation.algorithm_mismatch",
			Self::SignatureInvalid => "validation.signature_invalid",
			Self::VerificationKeyUnavailable { .. } => "validation.verification_key_unavailable",
			Self::JwksUnavailable { .. } => "validation.jwks_unavailable",
			Self::IssuerMismatch { .. } => "validation.issuer_mismatch",
			Self::AudienceMismatch { .. } => "validation.audience_mismatch",
			Self::Expired { .. } => "validation.expired",
			Self::NotYetValid { .. } => "validation.not_yet_valid",
			Self::MissingClaim { .. } => "validation.missing_claim",
			Self::NonceMismatch => "validation.nonce_mismatch",
		}
	}

	/// Returns true for structural JWE failures (part count or unparseable segment).
	pub fn is_format_error(&self) -> bool {
		matches!(
			self,
			Self::JweWrongPartCount { .. }
				| Self::JweSegmentUnparseable { .. }
				| Self::DecryptionFailed { .. }
		)
	}
}
