//! Compact JWE (RSA-OAEP key wrapping with AES-GCM content encryption).
//!
//! Key management and content encryption are taken from the token header; any supported
//! combination decrypts as long as the RSA key matches.

// crates.io
use aes_gcm::{
	Aes128Gcm, Aes256Gcm, AesGcm, KeyInit, Nonce,
	aead::{Aead, OsRng, Payload, consts::U12, rand_core::RngCore},
	aes::Aes192,
};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
// self
use crate::{
	_prelude::*,
	jose::{
		ContentEncryptionAlgorithm, CryptoError, JoseHeader, KeyManagementAlgorithm, ValidationError,
		jws::{b64_decode, b64_json},
	},
};

type Aes192Gcm = AesGcm<Aes192, U12>;

const IV_LEN: usize = 12;
const TAG_LEN: usize = 16;
/// AES-GCM covers the protected header, IV, ciphertext, and tag together.
const AUTHENTICATED_CONTENT: &str = "protected header, initialization vector, ciphertext, or tag";

/// Returns true when `token` is shaped like a JWE: five parts or a header carrying `enc`.
pub fn looks_encrypted(token: &str) -> bool {
	let header = token.split('.').next().and_then(JoseHeader::decode);

	header.is_some_and(|h| h.is_jwe()) || token.split('.').count() == 5
}

/// Decrypts a compact JWE and returns its plaintext, which is a nested JWS for ID tokens.
pub fn decrypt(token: &str, key: &RsaPrivateKey) -> Result<String, ValidationError> {
	let parts = token.split('.').collect::<Vec<_>>();

	if parts.len() != 5 {
		return Err(ValidationError::JweWrongPartCount { parts: parts.len() });
	}

	let header = JoseHeader::decode(parts[0])
		.ok_or(ValidationError::JweSegmentUnparseable { segment: "protected header" })?;

	if !header.is_jwe() {
		return Err(ValidationError::NotAJwe);
	}

	let key_alg = parse_alg::<KeyManagementAlgorithm>(header.alg.as_deref())?;
	let enc = parse_alg::<ContentEncryptionAlgorithm>(header.enc.as_deref())?;
	let encrypted_key = segment(parts[1], "encrypted key", |bytes| !bytes.is_empty())?;
	let iv = segment(parts[2], "initialization vector", |bytes| bytes.len() == IV_LEN)?;
	let mut ciphertext = segment(parts[3], "ciphertext", |_| true)?;
	let tag = segment(parts[4], "authentication tag", |bytes| bytes.len() == TAG_LEN)?;
	let cek = match key_alg {
		KeyManagementAlgorithm::RsaOaep => key.decrypt(Oaep::new::<sha1::Sha1>(), &encrypted_key),
		KeyManagementAlgorithm::RsaOaep256 => key.decrypt(Oaep::new::<sha2::Sha256>(), &encrypted_key),
	}
	.map_err(|_| ValidationError::DecryptionFailed { segment: "encrypted key" })?;

	if cek.len() != enc.key_len() {
		return Err(ValidationError::DecryptionFailed { segment: "encrypted key" });
	}

	ciphertext.extend_from_slice(&tag);

	let payload = Payload { msg: &ciphertext, aad: parts[0].as_bytes() };
	let nonce = Nonce::from_slice(&iv);
	let plaintext = match enc {
		ContentEncryptionAlgorithm::A128GCM => open::<Aes128Gcm>(&cek, nonce, payload),
		ContentEncryptionAlgorithm::A192GCM => open::<Aes192Gcm>(&cek, nonce, payload),
		ContentEncryptionAlgorithm::A256GCM => open::<Aes256Gcm>(&cek, nonce, payload),
	}?;

	String::from_utf8(plaintext)
		.map_err(|_| ValidationError::MalformedToken { reason: "decrypted payload is not UTF-8".into() })
}

/// Encrypts `plaintext` for `key`; `cty` is set to `JWT` when wrapping a signed token.
pub fn encrypt(
	plaintext: &[u8],
	key_alg: KeyManagementAlgorithm,
	enc: ContentEncryptionAlgorithm,
	key: &RsaPublicKey,
	kid: Option<&str>,
) -> Result<String, CryptoError> {
	let header = JoseHeader {
		alg: Some(key_alg.as_str().into()),
		enc: Some(enc.as_str().into()),
		kid: kid.map(str::to_owned),
		cty: Some("JWT".into()),
		..Default::default()
	};
	let header_b64 = b64_json(&header).map_err(|e| CryptoError(e.to_string()))?;
	let mut cek = vec![0; enc.key_len()];
	let mut iv = [0; IV_LEN];

	OsRng.fill_bytes(&mut cek);
	OsRng.fill_bytes(&mut iv);

	let encrypted_key = match key_alg {
		KeyManagementAlgorithm::RsaOaep => key.encrypt(&mut OsRng, Oaep::new::<sha1::Sha1>(), &cek),
		KeyManagementAlgorithm::RsaOaep256 => key.encrypt(&mut OsRng, Oaep::new::<sha2::Sha256>(), &cek),
	}
	.map_err(|e| CryptoError(e.to_string()))?;
	let payload = Payload { msg: plaintext, aad: header_b64.as_bytes() };
	let nonce = Nonce::from_slice(&iv);
	let sealed = match enc {
		ContentEncryptionAlgorithm::A128GCM => seal::<Aes128Gcm>(&cek, nonce, payload),
		ContentEncryptionAlgorithm::A192GCM => seal::<Aes192Gcm>(&cek, nonce, payload),
		ContentEncryptionAlgorithm::A256GCM => seal::<Aes256Gcm>(&cek, nonce, payload),
	}?;
	let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LEN);

	Ok([
		header_b64,
		URL_SAFE_NO_PAD.encode(encrypted_key),
		URL_SAFE_NO_PAD.encode(iv),
		URL_SAFE_NO_PAD.encode(ciphertext),
		URL_SAFE_NO_PAD.encode(tag),
	]
	.join("."))
}

fn parse_alg<T>(value: Option<&str>) -> Result<T, ValidationError>
where
	T: FromStr,
{
	let value = value.unwrap_or_default();

	value.parse().map_err(|_| ValidationError::UnsupportedJweAlgorithm { algorithm: value.to_owned() })
}

fn segment(
	value: &str,
	name: &'static str,
	valid: impl FnOnce(&[u8]) -> bool,
) -> Result<Vec<u8>, ValidationError> {
	match b64_decode(value) {
		Ok(bytes) if valid(&bytes) => Ok(bytes),
		_ => Err(ValidationError::JweSegmentUnparseable { segment: name }),
	}
}

fn open<C>(cek: &[u8], nonce: &Nonce<U12>, payload: Payload) -> Result<Vec<u8>, ValidationError>
where
	C: KeyInit + Aead<NonceSize = U12>,
{
	C::new_from_slice(cek)
		.map_err(|_| ValidationError::DecryptionFailed { segment: "encrypted key" })?
		.decrypt(nonce, payload)
		.map_err(|_| ValidationError::DecryptionFailed { segment: AUTHENTICATED_CONTENT })
}

fn seal<C>(cek: &[u8], nonce: &Nonce<U12>, payload: Payload) -> Result<Vec<u8>, CryptoError>
where
	C: KeyInit + Aead<NonceSize = U12>,
{
	C::new_from_slice(cek)
		.map_err(|e| CryptoError(e.to_string()))?
		.encrypt(nonce, payload)
		.map_err(|e| CryptoError(e.to_string()))
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{_preludet::key_fixture, jose::KeyStore};

	fn store() -> KeyStore {
		KeyStore::default()
			.with_pem("rsa", &key_fixture("rsa2048.key.pem"))
			.and_then(|s| s.with_pem("rsaOther", &key_fixture("rsa2048-other.key.pem")))
			.expect("RSA fixtures should load.")
	}

	fn sealed(key_alg: KeyManagementAlgorithm, enc: ContentEncryptionAlgorithm) -> String {
		let public = store().encryption_key("rsa").expect("Encryption key should resolve.");

		encrypt(b"inner.jws.token", key_alg, enc, &public, None).expect("Encryption should succeed.")
	}

	#[test]
	fn every_algorithm_pair_decrypts_with_the_matching_key() {
		let store = store();
		let key = store.decryption_key("rsa").expect("Decryption key should resolve.");

		for key_alg in [KeyManagementAlgorithm::RsaOaep, KeyManagementAlgorithm::RsaOaep256] {
			for enc in [
				ContentEncryptionAlgorithm::A128GCM,
				ContentEncryptionAlgorithm::A192GCM,
				ContentEncryptionAlgorithm::A256GCM,
			] {
				let token = sealed(key_alg, enc);

				assert!(looks_encrypted(&token));
				assert_eq!(
					decrypt(&token, key).expect("Matching key should decrypt."),
					"inner.jws.token"
				);
			}
		}
	}

	#[test]
	fn wrong_key_fails_decryption() {
		let store = store();
		let other = store.decryption_key("rsaOther").expect("Other key should resolve.");
		let token = sealed(KeyManagementAlgorithm::RsaOaep256, ContentEncryptionAlgorithm::A256GCM);

		assert!(matches!(
			decrypt(&token, other),
			Err(ValidationError::DecryptionFailed { segment: "encrypted key" })
		));
	}

	#[test]
	fn part_count_and_corrupted_segments_are_format_errors() {
		let store = store();
		let key = store.decryption_key("rsa").expect("Decryption key should resolve.");
		let token = sealed(KeyManagementAlgorithm::RsaOaep, ContentEncryptionAlgorithm::A128GCM);
		let parts = token.split('.').collect::<Vec<_>>();

		for count in [3, 4, 6] {
			let mut altered = parts.clone();

			altered.resize(count, "AAAA");

			let err = decrypt(&altered.join("."), key).expect_err("Wrong part count must fail.");

			assert!(matches!(err, ValidationError::JweWrongPartCount { parts } if parts == count));
		}
		for index in 0..5 {
			let mut altered = parts.iter().map(|p| (*p).to_owned()).collect::<Vec<_>>();

			altered[index] = format!("*{}", altered[index]);

			let err = decrypt(&altered.join("."), key).expect_err("Corrupted segment must fail.");

			assert!(err.is_format_error(), "segment {index}: {err}");
		}
	}

	#[test]
	fn flipped_bytes_in_decodable_segments_are_format_errors() {
		let store = store();
		let key = store.decryption_key("rsa").expect("Decryption key should resolve.");

		for enc in [ContentEncryptionAlgorithm::A128GCM, ContentEncryptionAlgorithm::A256GCM] {
			let token = sealed(KeyManagementAlgorithm::RsaOaep256, enc);
			let parts = token.split('.').collect::<Vec<_>>();

			for (index, part) in parts.iter().enumerate().skip(1) {
				let mut bytes = b64_decode(part).expect("Segment should decode.");

				bytes[0] ^= 0x01;

				let mut altered = parts.iter().map(|p| (*p).to_owned()).collect::<Vec<_>>();

				altered[index] = URL_SAFE_NO_PAD.encode(&bytes);

				let err = decrypt(&altered.join("."), key).expect_err("Flipped segment must fail.");

				assert!(
					matches!(err, ValidationError::DecryptionFailed { .. }),
					"segment {index}: {err}"
				);
				assert!(err.is_format_error(), "segment {index}: {err}");
			}
		}
	}

	#[test]
	fn signed_header_with_five_parts_is_not_a_jwe() {
		let store = store();
		let key = store.decryption_key("rsa").expect("Decryption key should resolve.");
		let header = b64_json(&serde_json::json!({ "alg": "RS256" })).expect("Header should encode.");
		let token = format!("{header}.a.b.c.d");

		assert!(matches!(decrypt(&token, key), Err(ValidationError::NotAJwe)));
	}

	#[test]
	fn unknown_algorithms_are_reported() {
		let store = store();
		let key = store.decryption_key("rsa").expect("Decryption key should resolve.");
		let header = b64_json(&serde_json::json!({ "alg": "RSA1_5", "enc": "A256GCM" }))
			.expect("Header should encode.");

		assert!(matches!(
			decrypt(&format!("{header}.a.b.c.d"), key),
			Err(ValidationError::UnsupportedJweAlgorithm { algorithm }) if algorithm == "RSA1_5"
		));
	}
}
