//! Token validation: optional JWE unwrapping, exact-algorithm signature verification, and
//! claim checks.

// self
use crate::{
	_prelude::*,
	auth::{ClaimOrigin, Claims, Secret, ValidatedClaims},
	http::ReqwestHttpClient,
	jose::{
		JwksCache, KeyFamily, KeyStore, SignatureAlgorithm, ValidationError, VerificationKey, jwe, jws,
	},
};

/// Claims every validated token must carry.
pub const REQUIRED_CLAIMS: [&str; 5] = ["iss", "sub", "aud", "exp", "iat"];
/// Default tolerance applied to `exp`, `nbf`, and `iat`.
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::seconds(300);

/// Per-provider validation settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationPolicy {
	/// Required signature algorithm.
	pub algorithm: SignatureAlgorithm,
	/// Accepted audiences; empty disables the check.
	pub audiences: Vec<String>,
	/// Tolerance for time-based claims.
	pub clock_skew: Duration,
	/// Key store alias used to verify signatures instead of the JWK set.
	pub trust_alias: Option<String>,
	/// Key store alias of the RSA private key that unwraps JWEs.
	pub decryption_alias: Option<String>,
}
impl Default for ValidationPolicy {
	fn default() -> Self {
		Self {
			algorithm: SignatureAlgorithm::default(),
			audiences: Vec::new(),
			clock_skew: DEFAULT_CLOCK_SKEW,
			trust_alias: None,
			decryption_alias: None,
		}
	}
}

/// Validates tokens issued to one provider configuration.
#[derive(Clone, Copy, Debug)]
pub struct TokenValidator<'a> {
	/// Validation settings.
	pub policy: &'a ValidationPolicy,
	/// Expected `iss`, when known.
	pub issuer: Option<&'a str>,
	/// HMAC key for HS* algorithms.
	pub client_secret: Option<&'a Secret>,
	/// Key store of the generation.
	pub keys: &'a KeyStore,
	/// JWK set of the provider, when a `jwksUri` is configured or discovered.
	pub jwks: Option<&'a JwksCache>,
	/// Transport for JWK set retrieval.
	pub http: &'a ReqwestHttpClient,
}
impl TokenValidator<'_> {
	/// Validates `token`; `nonce` is checked when the authorization request carried one.
	pub async fn validate(
		&self,
		token: &str,
		nonce: Option<&str>,
	) -> Result<ValidatedClaims, ValidationError> {
		let token = token.trim();
		let signed = self.unwrap_encryption(token)?;
		let header = jws::jws_header(&signed)?;
		let algorithm = self.policy.algorithm;

		if header.alg.as_deref() != Some(algorithm.as_str()) {
			return Err(ValidationError::AlgorithmMismatch {
				expected: algorithm,
				actual: header.alg.unwrap_or_else(|| "<absent>".into()),
			});
		}

		let key = self.verification_key(header.kid.as_deref()).await?;
		let (_, claims) = jws::verify(&signed, algorithm, &key)?;

		self.check_claims(&claims, nonce, OffsetDateTime::now_utc())?;

		tracing::debug!(alg = %algorithm, encrypted = signed != token, "Token validated.");

		Ok(ValidatedClaims::new(claims, ClaimOrigin::IdToken))
	}

	fn unwrap_encryption(&self, token: &str) -> Result<String, ValidationError> {
		let parts = token.split('.').count();

		if jwe::looks_encrypted(token) {
			let alias = self
				.policy
				.decryption_alias
				.as_deref()
				.ok_or(ValidationError::DecryptionKeyNotConfigured)?;
			let key = self.keys.decryption_key(alias)?;

			return jwe::decrypt(token, key);
		}
		if parts != 3 && self.policy.decryption_alias.is_some() {
			return Err(ValidationError::JweWrongPartCount { parts });
		}

		Ok(token.to_owned())
	}

	async fn verification_key(&self, kid: Option<&str>) -> Result<VerificationKey, ValidationError> {
		let algorithm = self.policy.algorithm;

		if algorithm.family() == KeyFamily::Hmac {
			return match self.client_secret {
				Some(secret) if !secret.expose().is_empty() =>
					Ok(VerificationKey::hmac(secret.expose().as_bytes())),
				_ => Err(ValidationError::VerificationKeyUnavailable {
					reason: format!("{algorithm} requires the clientSecret"),
				}),
			};
		}
		if let Some(alias) = self.policy.trust_alias.as_deref() {
			return self.keys.verification_key(alias, algorithm);
		}

		match self.jwks {
			Some(jwks) => jwks.verification_key(self.http, kid, algorithm).await,
			None => Err(ValidationError::VerificationKeyUnavailable {
				reason: "neither trustAliasName nor jwksUri is configured".into(),
			}),
		}
	}

	fn check_claims(
		&self,
		claims: &Claims,
		nonce: Option<&str>,
		now: OffsetDateTime,
	) -> Result<(), ValidationError> {
		if let Some(claim) = REQUIRED_CLAIMS.into_iter().find(|claim| !claims.contains(claim)) {
			return Err(ValidationError::MissingClaim { claim });
		}
		if let Some(expected) = self.issuer {
			let actual = claims.issuer().unwrap_or_default();

			if actual != expected {
				return Err(ValidationError::IssuerMismatch { expected: expected.to_owned(), actual });
			}
		}

		let audiences = claims.audiences();

		if !self.policy.audiences.is_empty()
			&& !audiences.iter().any(|aud| self.policy.audiences.contains(aud))
		{
			return Err(ValidationError::AudienceMismatch {
				expected: self.policy.audiences.clone(),
				actual: audiences,
			});
		}

		let skew = self.policy.clock_skew;

		match claims.instant("exp") {
			Some(expired_at) if now - skew >= expired_at =>
				return Err(ValidationError::Expired { expired_at }),
			None => return Err(ValidationError::MissingClaim { claim: "exp" }),
			_ => {},
		}

		for claim in ["nbf", "iat"] {
			if let Some(not_before) = claims.instant(claim).filter(|instant| *instant > now + skew) {
				return Err(ValidationError::NotYetValid { not_before });
			}
		}

		if nonce.is_some_and(|expected| claims.string("nonce").as_deref() != Some(expected)) {
			return Err(ValidationError::NonceMismatch);
		}

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{
		_preludet::{key_fixture, test_reqwest_http_client},
		jose::{ContentEncryptionAlgorithm, KeyManagementAlgorithm, SigningKey, sign},
	};

	const ISSUER: &str = "https://op.example";

	fn keys() -> KeyStore {
		KeyStore::default()
			.with_pem("signer", &key_fixture("rsa2048.key.pem"))
			.and_then(|s| s.with_pem("signerPublic", &key_fixture("rsa2048.pub.pem")))
			.and_then(|s| s.with_pem("decrypt", &key_fixture("rsa2048-other.key.pem")))
			.and_then(|s| s.with_pem("small", &key_fixture("rsa1024.key.pem")))
			.expect("Key fixtures should load.")
	}

	fn claims() -> Claims {
		let now = OffsetDateTime::now_utc().unix_timestamp();
		let mut claims = Claims::default();

		claims.insert("iss", ISSUER);
		claims.insert("sub", "alice");
		claims.insert("aud", "client-1");
		claims.insert("iat", now);
		claims.insert("exp", now + 600);
		claims.insert("nonce", "n-1");

		claims
	}

	fn policy() -> ValidationPolicy {
		ValidationPolicy {
			audiences: vec!["client-1".into()],
			trust_alias: Some("signerPublic".into()),
			..Default::default()
		}
	}

	fn signed(claims: &Claims) -> String {
		let key = keys().signing_key("signer", SignatureAlgorithm::RS256).expect("Signer should resolve.");

		sign(SignatureAlgorithm::RS256, &key, None, claims).expect("Signing should succeed.")
	}

	fn encrypted(claims: &Claims) -> String {
		let public = keys().encryption_key("decrypt").expect("Encryption key should resolve.");

		jwe::encrypt(
			signed(claims).as_bytes(),
			KeyManagementAlgorithm::RsaOaep256,
			ContentEncryptionAlgorithm::A192GCM,
			&public,
			None,
		)
		.expect("Encryption should succeed.")
	}

	async fn validate(policy: &ValidationPolicy, token: &str) -> Result<ValidatedClaims, ValidationError> {
		let keys = keys();
		let http = test_reqwest_http_client();
		let validator = TokenValidator {
			policy,
			issuer: Some(ISSUER),
			client_secret: None,
			keys: &keys,
			jwks: None,
			http: &http,
		};

		validator.validate(token, Some("n-1")).await
	}

	#[tokio::test]
	async fn signed_and_nested_tokens_validate() {
		let mut policy = policy();
		let validated =
			validate(&policy, &signed(&claims())).await.expect("Signed token should validate.");

		assert_eq!(validated.claims().subject().as_deref(), Some("alice"));
		assert_eq!(validated.origin(), ClaimOrigin::IdToken);

		policy.decryption_alias = Some("decrypt".into());

		validate(&policy, &signed(&claims())).await.expect("Plain JWS is accepted with a decryption key.");
		validate(&policy, &encrypted(&claims())).await.expect("Nested JWS in JWE should validate.");
	}

	#[tokio::test]
	async fn jwe_key_problems_are_distinct() {
		let token = encrypted(&claims());
		let mut policy = policy();

		assert!(matches!(
			validate(&policy, &token).await,
			Err(ValidationError::DecryptionKeyNotConfigured)
		));

		policy.decryption_alias = Some("missing".into());

		assert!(matches!(validate(&policy, &token).await, Err(ValidationError::KeyAliasNotFound { .. })));

		policy.decryption_alias = Some("signerPublic".into());

		assert!(matches!(
			validate(&policy, &token).await,
			Err(ValidationError::PublicKeyForDecryption { .. })
		));

		policy.decryption_alias = Some("small".into());

		assert!(matches!(
			validate(&policy, &token).await,
			Err(ValidationError::KeyTooSmall { bits: 1024, .. })
		));

		policy.decryption_alias = Some("signer".into());

		assert!(matches!(
			validate(&policy, &token).await,
			Err(ValidationError::DecryptionFailed { .. })
		));
	}

	#[tokio::test]
	async fn part_counts_are_checked_when_decryption_is_configured() {
		let policy = ValidationPolicy { decryption_alias: Some("decrypt".into()), ..policy() };
		let token = encrypted(&claims());
		let four = token.splitn(5, '.').take(4).collect::<Vec<_>>().join(".");

		assert!(matches!(
			validate(&policy, &four).await,
			Err(ValidationError::JweWrongPartCount { parts: 4 })
		));
		assert!(matches!(
			validate(&policy, &format!("{token}.extra")).await,
			Err(ValidationError::JweWrongPartCount { parts: 6 })
		));

		let jws = signed(&claims());

		assert!(matches!(
			validate(&policy, &format!("{jws}.x.y")).await,
			Err(ValidationError::NotAJwe)
		));
	}

	#[tokio::test]
	async fn claim_failures_are_distinct() {
		let policy = policy();
		let mut wrong_issuer = claims();

		wrong_issuer.insert("iss", "https://evil.example");

		assert!(matches!(
			validate(&policy, &signed(&wrong_issuer)).await,
			Err(ValidationError::IssuerMismatch { .. })
		));

		let mut wrong_audience = claims();

		wrong_audience.insert("aud", serde_json::json!(["other"]));

		assert!(matches!(
			validate(&policy, &signed(&wrong_audience)).await,
			Err(ValidationError::AudienceMismatch { .. })
		));

		let now = OffsetDateTime::now_utc().unix_timestamp();
		let mut expired = claims();

		expired.insert("exp", now - 301);

		assert!(matches!(validate(&policy, &signed(&expired)).await, Err(ValidationError::Expired { .. })));

		let mut within_skew = claims();

		within_skew.insert("exp", now - 60);
		validate(&policy, &signed(&within_skew)).await.expect("Clock skew should be tolerated.");

		let mut future = claims();

		future.insert("nbf", now + 3_600);

		assert!(matches!(
			validate(&policy, &signed(&future)).await,
			Err(ValidationError::NotYetValid { .. })
		));

		let mut missing = claims().into_map();

		missing.remove("sub");

		assert!(matches!(
			validate(&policy, &signed(&Claims::new(missing))).await,
			Err(ValidationError::MissingClaim { claim: "sub" })
		));

		let mut replayed = claims();

		replayed.insert("nonce", "other");

		assert!(matches!(validate(&policy, &signed(&replayed)).await, Err(ValidationError::NonceMismatch)));
	}

	#[tokio::test]
	async fn hmac_uses_the_client_secret() {
		let hmac_policy = ValidationPolicy { algorithm: SignatureAlgorithm::HS256, ..policy() };
		let secret = Secret::new("a-client-secret-of-reasonable-length");
		let token = sign(
			SignatureAlgorithm::HS256,
			&SigningKey::hmac(secret.expose().as_bytes()),
			None,
			&claims(),
		)
		.expect("Signing should succeed.");
		let keys = keys();
		let http = test_reqwest_http_client();
		let mut validator = TokenValidator {
			policy: &hmac_policy,
			issuer: Some(ISSUER),
			client_secret: Some(&secret),
			keys: &keys,
			jwks: None,
			http: &http,
		};

		validator.validate(&token, None).await.expect("HS256 with the client secret should validate.");

		validator.client_secret = None;

		assert!(matches!(
			validator.validate(&token, None).await,
			Err(ValidationError::VerificationKeyUnavailable { .. })
		));
		assert!(matches!(
			validate(&policy(), &token).await,
			Err(ValidationError::AlgorithmMismatch { .. })
		));
	}
}
