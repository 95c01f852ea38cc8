//! Obfuscated password handling for secret attributes.
//!
//! Values prefixed with `{xor}` hold base64 of the password bytes XOR-ed with `_`. Any other
//! `{tag}` prefix names an encoding the engine cannot reverse and is rejected.

// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD};
// self
use crate::error::ConfigError;

const XOR_TAG: &str = "{xor}";
const XOR_KEY: u8 = b'_';

/// Decodes a password attribute value into plain text.
pub fn decode(attribute: &'static str, value: &str) -> Result<String, ConfigError> {
	let trimmed = value.trim();

	if let Some(encoded) = strip_tag(trimmed, XOR_TAG) {
		let bytes =
			STANDARD.decode(encoded).map_err(|_| ConfigError::MalformedPassword { attribute })?;
		let plain = bytes.into_iter().map(|b| b ^ XOR_KEY).collect::<Vec<_>>();

		return String::from_utf8(plain).map_err(|_| ConfigError::MalformedPassword { attribute });
	}
	if let Some(tag) = encoding_tag(trimmed) {
		return Err(ConfigError::UnsupportedPasswordEncoding { attribute, encoding: tag.into() });
	}

	Ok(value.to_owned())
}

/// Obfuscates a plain-text password with the `{xor}` encoding.
pub fn encode_xor(plain: &str) -> String {
	let bytes = plain.bytes().map(|b| b ^ XOR_KEY).collect::<Vec<_>>();

	format!("{XOR_TAG}{}", STANDARD.encode(bytes))
}

fn strip_tag<'a>(value: &'a str, tag: &str) -> Option<&'a str> {
	let head = value.get(..tag.len())?;

	head.eq_ignore_ascii_case(tag).then(|| &value[tag.len()..])
}

fn encoding_tag(value: &str) -> Option<&str> {
	let rest = value.strip_prefix('{')?;
	let end = rest.find('}')?;
	let tag = &rest[..end];

	(!tag.is_empty() && tag.chars().all(|c| c.is_ascii_alphanumeric())).then_some(tag)
}
