//! Signature, key-management, and content-encryption algorithm identifiers.

// crates.io
use jsonwebtoken::Algorithm;
// self
use crate::{_prelude::*, provider::UnknownValue};

/// Key family an algorithm operates on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyFamily {
	/// Shared secret.
	Hmac,
	/// RSA key pair.
	Rsa,
	/// Elliptic curve key pair.
	Ec,
}

/// JWS signature algorithms accepted for issued tokens.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignatureAlgorithm {
	/// HMAC with SHA-256.
	HS256,
	/// HMAC with SHA-384.
	HS384,
	/// HMAC with SHA-512.
	HS512,
	/// RSASSA-PKCS1-v1_5 with SHA-256.
	#[default]
	RS256,
	/// RSASSA-PKCS1-v1_5 with SHA-384.
	RS384,
	/// RSASSA-PKCS1-v1_5 with SHA-512.
	RS512,
	/// ECDSA P-256 with SHA-256.
	ES256,
	/// ECDSA P-384 with SHA-384.
	ES384,
	/// ECDSA P-521 with SHA-512.
	ES512,
}
impl SignatureAlgorithm {
	/// Every supported algorithm.
	pub const ALL: [Self; 9] = [
		Self::HS256,
		Self::HS384,
		Self::HS512,
		Self::RS256,
		Self::RS384,
		Self::RS512,
		Self::ES256,
		Self::ES384,
		Self::ES512,
	];

	/// JOSE `alg` value.
	pub fn as_str(self) -> &'static str {
		match self {
			Self::HS256 => "HS256",
			Self::HS384 => "HS384",
			Self::HS512 => "HS512",
			Self::RS256 => "RS256",
			Self::RS384 => "RS384",
			Self::RS512 => "RS512",
			Self::ES256 => "ES256",
			Self::ES384 => "ES384",
			Self::ES512 => "ES512",
		}
	}

	/// Key family used by the algorithm.
	pub fn family(self) -> KeyFamily {
		match self {
			Self::HS256 | Self::HS384 | Self::HS512 => KeyFamily::Hmac,
			Self::RS256 | Self::RS384 | Self::RS512 => KeyFamily::Rsa,
			Self::ES256 | Self::ES384 | Self::ES512 => KeyFamily::Ec,
		}
	}

	/// Equivalent `jsonwebtoken` algorithm; `None` for ES512, which is handled natively.
	pub(crate) fn to_jwt(self) -> Option<Algorithm> {
		match self {
			Self::HS256 => Some(Algorithm::HS256),
			Self::HS384 => Some(Algorithm::HS384),
			Self::HS512 => Some(Algorithm::HS512),
			Self::RS256 => Some(Algorithm::RS256),
			Self::RS384 => Some(Algorithm::RS384),
			Self::RS512 => Some(Algorithm::RS512),
			Self::ES256 => Some(Algorithm::ES256),
			Self::ES384 => Some(Algorithm::ES384),
			Self::ES512 => None,
		}
	}
}
impl Display for SignatureAlgorithm {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
impl FromStr for SignatureAlgorithm {
	type Err = UnknownValue;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::ALL.into_iter().find(|alg| alg.as_str() == s).ok_or_else(|| UnknownValue(s.into()))
	}
}

/// JWE key management algorithms.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyManagementAlgorithm {
	/// RSAES-OAEP with SHA-1.
	#[serde(rename = "RSA-OAEP")]
	RsaOaep,
	/// RSAES-OAEP with SHA-256.
	#[default]
	#[serde(rename = "RSA-OAEP-256")]
	RsaOaep256,
}
impl KeyManagementAlgorithm {
	/// JOSE `alg` value.
	pub fn as_str(self) -> &'static str {
		match self {
			Self::RsaOaep => "RSA-OAEP",
			Self::RsaOaep256 => "RSA-OAEP-256",
		}
	}
}
impl FromStr for KeyManagementAlgorithm {
	type Err = UnknownValue;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"RSA-OAEP" => Ok(Self::RsaOaep),
			"RSA-OAEP-256" => Ok(Self::RsaOaep256),
			_ => Err(UnknownValue(s.into())),
		}
	}
}

/// JWE content encryption algorithms.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentEncryptionAlgorithm {
	/// AES-128 GCM.
	A128GCM,
	/// AES-192 GCM.
	A192GCM,
	/// AES-256 GCM.
	#[default]
	A256GCM,
}
impl ContentEncryptionAlgorithm {
	/// JOSE `enc` value.
	pub fn as_str(self) -> &'static str {
		match self {
			Self::A128GCM => "A128GCM",
			Self::A192GCM => "A192GCM",
			Self::A256GCM => "A256GCM",
		}
	}

	/// Content encryption key length in bytes.
	pub fn key_len(self) -> usize {
		match self {
			Self::A128GCM => 16,
			Self::A192GCM => 24,
			Self::A256GCM => 32,
		}
	}
}
impl FromStr for ContentEncryptionAlgorithm {
	type Err = UnknownValue;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"A128GCM" => Ok(Self::A128GCM),
			"A192GCM" => Ok(Self::A192GCM),
			"A256GCM" => Ok(Self::A256GCM),
			_ => Err(UnknownValue(s.into())),
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn algorithms_parse_exactly() {
		assert_eq!("ES512".parse::<SignatureAlgorithm>().expect("ES512 should parse."), SignatureAlgorithm::ES512);
		assert!("rs256".parse::<SignatureAlgorithm>().is_err());
		assert!("none".parse::<SignatureAlgorithm>().is_err());
		assert_eq!(SignatureAlgorithm::ES512.to_jwt(), None);
		assert_eq!(SignatureAlgorithm::HS384.family(), KeyFamily::Hmac);
	}

	#[test]
	fn jwe_algorithms_expose_wire_values() {
		assert_eq!(
			"RSA-OAEP-256".parse::<KeyManagementAlgorithm>().expect("RSA-OAEP-256 should parse."),
			KeyManagementAlgorithm::RsaOaep256
		);
		assert_eq!(ContentEncryptionAlgorithm::A192GCM.key_len(), 24);
		assert_eq!(KeyManagementAlgorithm::RsaOaep.as_str(), "RSA-OAEP");
	}
}
