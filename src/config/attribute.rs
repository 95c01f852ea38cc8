//! Attribute readers that apply the absent/empty/blank policies of provider configuration.

// std
use std::cell::RefCell;
// self
use crate::{_prelude::*, auth::Secret, config::password, error::ConfigError};

/// Configured value together with its provenance.
///
/// Discovery may auto-adjust values the operator never set, but it must leave explicit values
/// alone; `explicit` records which case applies.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tracked<T> {
	/// Effective value.
	pub value: T,
	/// `true` when the operator set the value; `false` when it is a default.
	pub explicit: bool,
}
impl<T> Tracked<T> {
	/// Wraps a default value.
	pub fn default_value(value: T) -> Self {
		Self { value, explicit: false }
	}

	/// Wraps an operator-supplied value.
	pub fn explicit(value: T) -> Self {
		Self { value, explicit: true }
	}

	/// Returns true when the value is a default.
	pub fn is_default(&self) -> bool {
		!self.explicit
	}
}

/// Shape of an attribute value before interpretation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RawValue<'a> {
	/// Attribute not present (or JSON `null`).
	Absent,
	/// Present as the empty string.
	Empty,
	/// Present, non-empty, whitespace only.
	Blank(&'a str),
	/// Present with content.
	Present(&'a str),
	/// Present with a non-string JSON value.
	Other(&'a JsonValue),
}

/// Reads typed values out of one provider entry's attribute map.
pub(crate) struct AttributeReader<'a> {
	provider: &'a str,
	attributes: &'a JsonMap<String, JsonValue>,
	seen: RefCell<BTreeSet<&'static str>>,
}
impl<'a> AttributeReader<'a> {
	pub(crate) fn new(provider: &'a str, attributes: &'a JsonMap<String, JsonValue>) -> Self {
		Self { provider, attributes, seen: RefCell::new(BTreeSet::new()) }
	}

	pub(crate) fn raw(&self, name: &'static str) -> RawValue<'a> {
		self.seen.borrow_mut().insert(name);

		match self.attributes.get(name) {
			None | Some(JsonValue::Null) => RawValue::Absent,
			Some(JsonValue::String(s)) if s.is_empty() => RawValue::Empty,
			Some(JsonValue::String(s)) if s.trim().is_empty() => RawValue::Blank(s),
			Some(JsonValue::String(s)) => RawValue::Present(s),
			Some(other) => RawValue::Other(other),
		}
	}

	/// Free-form string. Absent and empty read as `None`; blank values are kept.
	pub(crate) fn string(&self, name: &'static str) -> Result<Option<String>, ConfigError> {
		match self.raw(name) {
			RawValue::Absent | RawValue::Empty => Ok(None),
			RawValue::Blank(s) | RawValue::Present(s) => Ok(Some(s.to_owned())),
			RawValue::Other(JsonValue::Number(n)) => Ok(Some(n.to_string())),
			RawValue::Other(JsonValue::Bool(b)) => Ok(Some(b.to_string())),
			RawValue::Other(_) => Err(self.invalid_type(name, "string")),
		}
	}

	/// String that is meaningless when blank; blank values are warned about and dropped.
	pub(crate) fn non_blank(&self, name: &'static str) -> Result<Option<String>, ConfigError> {
		let value = self.string(name)?;

		match value {
			Some(v) if v.trim().is_empty() => {
				self.warn_blank(name);

				Ok(None)
			},
			other => Ok(other.map(|v| v.trim().to_owned())),
		}
	}

	/// Required string. Absent and empty values are fatal; blank values are warned about and
	/// forwarded so the failure surfaces at the provider.
	pub(crate) fn required(&self, name: &'static str) -> Result<String, ConfigError> {
		match self.string(name)? {
			None => Err(ConfigError::MissingAttribute {
				provider: self.provider.to_owned(),
				attribute: name,
			}),
			Some(v) => {
				if v.trim().is_empty() {
					self.warn_blank(name);
				}

				Ok(v)
			},
		}
	}

	/// Password attribute, decoding `{xor}` values. Absent and empty read as `None`.
	pub(crate) fn secret(&self, name: &'static str) -> Result<Option<Secret>, ConfigError> {
		match self.string(name)? {
			None => Ok(None),
			Some(v) => {
				if v.trim().is_empty() {
					self.warn_blank(name);
				}

				password::decode(name, &v).map(|plain| Some(Secret::new(plain)))
			},
		}
	}

	/// URL attribute. Absent, empty, and blank read as `None`.
	pub(crate) fn url(&self, name: &'static str) -> Result<Option<Url>, ConfigError> {
		match self.raw(name) {
			RawValue::Absent | RawValue::Empty => Ok(None),
			RawValue::Blank(_) => {
				self.warn_blank(name);

				Ok(None)
			},
			RawValue::Present(s) => self.parse_url(name, s).map(Some),
			RawValue::Other(_) => Err(self.invalid_type(name, "URL string")),
		}
	}

	pub(crate) fn parse_url(&self, name: &'static str, value: &str) -> Result<Url, ConfigError> {
		Url::parse(value.trim()).map_err(|source| ConfigError::InvalidUrl {
			provider: self.provider.to_owned(),
			attribute: name,
			value: value.to_owned(),
			source,
		})
	}

	/// Boolean attribute; accepts JSON booleans and `"true"`/`"false"` strings.
	pub(crate) fn boolean(&self, name: &'static str, default: bool) -> Result<bool, ConfigError> {
		match self.raw(name) {
			RawValue::Absent | RawValue::Empty | RawValue::Blank(_) => Ok(default),
			RawValue::Other(JsonValue::Bool(b)) => Ok(*b),
			RawValue::Present(s) if s.trim().eq_ignore_ascii_case("true") => Ok(true),
			RawValue::Present(s) if s.trim().eq_ignore_ascii_case("false") => Ok(false),
			_ => Err(self.invalid_type(name, "boolean")),
		}
	}

	/// Non-negative number of seconds.
	pub(crate) fn seconds(&self, name: &'static str, default: i64) -> Result<Duration, ConfigError> {
		let seconds = match self.raw(name) {
			RawValue::Absent | RawValue::Empty | RawValue::Blank(_) => default,
			RawValue::Other(JsonValue::Number(n)) =>
				n.as_u64().ok_or_else(|| self.invalid_type(name, "non-negative integer"))? as i64,
			RawValue::Present(s) => s
				.trim()
				.parse::<u32>()
				.map_err(|_| self.invalid_type(name, "non-negative integer"))?
				.into(),
			RawValue::Other(_) => return Err(self.invalid_type(name, "non-negative integer")),
		};

		Ok(Duration::seconds(seconds))
	}

	/// List attribute; accepts a JSON array of strings or a comma/space separated string.
	pub(crate) fn list(&self, name: &'static str) -> Result<Vec<String>, ConfigError> {
		let items = match self.raw(name) {
			RawValue::Absent | RawValue::Empty | RawValue::Blank(_) => Vec::new(),
			RawValue::Present(s) => s
				.split(|c: char| c == ',' || c.is_whitespace())
				.filter(|item| !item.is_empty())
				.map(str::to_owned)
				.collect(),
			RawValue::Other(JsonValue::Array(values)) => values
				.iter()
				.map(|value| match value {
					JsonValue::String(s) => Ok(s.trim().to_owned()),
					_ => Err(self.invalid_type(name, "list of strings")),
				})
				.filter(|item| !matches!(item, Ok(s) if s.is_empty()))
				.collect::<Result<_, _>>()?,
			RawValue::Other(_) => return Err(self.invalid_type(name, "list of strings")),
		};

		Ok(items)
	}

	/// Object attribute mapping names to string values, in declaration order of the keys.
	pub(crate) fn pairs(&self, name: &'static str) -> Result<Vec<(String, String)>, ConfigError> {
		match self.raw(name) {
			RawValue::Absent | RawValue::Empty | RawValue::Blank(_) => Ok(Vec::new()),
			RawValue::Other(JsonValue::Object(map)) => map
				.iter()
				.map(|(k, v)| match v {
					JsonValue::String(s) => Ok((k.clone(), s.clone())),
					JsonValue::Number(n) => Ok((k.clone(), n.to_string())),
					JsonValue::Bool(b) => Ok((k.clone(), b.to_string())),
					_ => Err(self.invalid_type(name, "map of strings")),
				})
				.collect(),
			_ => Err(self.invalid_type(name, "map of strings")),
		}
	}

	/// Enum attribute whose invalid values are ignored with a warning.
	pub(crate) fn lenient<T>(&self, name: &'static str) -> Option<T>
	where
		T: FromStr,
	{
		let raw = match self.raw(name) {
			RawValue::Present(s) => s.trim(),
			RawValue::Absent | RawValue::Empty => return None,
			RawValue::Blank(_) => {
				self.warn_blank(name);

				return None;
			},
			RawValue::Other(value) => {
				tracing::warn!(
					provider = self.provider,
					attribute = name,
					code = "config.invalid_value_ignored",
					"The value `{value}` of attribute `{name}` is not valid and is ignored."
				);

				return None;
			},
		};

		match raw.parse::<T>() {
			Ok(value) => Some(value),
			Err(_) => {
				tracing::warn!(
					provider = self.provider,
					attribute = name,
					code = "config.invalid_value_ignored",
					"The value `{raw}` of attribute `{name}` is not valid and is ignored."
				);

				None
			},
		}
	}

	/// Enum attribute whose invalid values are configuration errors.
	pub(crate) fn strict<T>(&self, name: &'static str) -> Result<Option<T>, ConfigError>
	where
		T: FromStr,
	{
		match self.raw(name) {
			RawValue::Absent | RawValue::Empty => Ok(None),
			RawValue::Present(s) => s.trim().parse::<T>().map(Some).map_err(|_| {
				ConfigError::InvalidValue {
					provider: self.provider.to_owned(),
					attribute: name,
					value: s.to_owned(),
				}
			}),
			RawValue::Blank(s) => Err(ConfigError::InvalidValue {
				provider: self.provider.to_owned(),
				attribute: name,
				value: s.to_owned(),
			}),
			RawValue::Other(_) => Err(self.invalid_type(name, "string")),
		}
	}

	/// Warns about attributes nobody read.
	pub(crate) fn warn_unknown(&self) {
		let seen = self.seen.borrow();

		for name in self.attributes.keys().filter(|k| !seen.contains(k.as_str())) {
			tracing::warn!(
				provider = self.provider,
				attribute = name.as_str(),
				code = "config.unknown_attribute",
				"The attribute `{name}` is not recognized and is ignored."
			);
		}
	}

	pub(crate) fn warn_blank(&self, name: &'static str) {
		tracing::warn!(
			provider = self.provider,
			attribute = name,
			code = "config.blank_attribute",
			"The attribute `{name}` of `{}` is blank.",
			self.provider
		);
	}

	pub(crate) fn invalid_type(&self, name: &'static str, expected: &'static str) -> ConfigError {
		ConfigError::InvalidType { provider: self.provider.to_owned(), attribute: name, expected }
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn attributes(value: JsonValue) -> JsonMap<String, JsonValue> {
		match value {
			JsonValue::Object(map) => map,
			_ => panic!("Attribute fixture must be an object."),
		}
	}

	#[test]
	fn raw_distinguishes_absent_empty_and_blank() {
		let map = attributes(serde_json::json!({ "a": "", "b": "  ", "c": "x", "d": null }));
		let reader = AttributeReader::new("p", &map);

		assert_eq!(reader.raw("a"), RawValue::Empty);
		assert_eq!(reader.raw("b"), RawValue::Blank("  "));
		assert_eq!(reader.raw("c"), RawValue::Present("x"));
		assert_eq!(reader.raw("d"), RawValue::Absent);
		assert_eq!(reader.raw("missing"), RawValue::Absent);
	}

	#[test]
	fn required_rejects_empty_but_forwards_blank() {
		let map = attributes(serde_json::json!({ "clientId": "", "clientSecret": " " }));
		let reader = AttributeReader::new("p", &map);
		let err = reader.required("clientId").expect_err("Empty required value must fail.");

		assert!(matches!(err, ConfigError::MissingAttribute { attribute: "clientId", .. }));
		assert_eq!(reader.required("clientSecret").expect("Blank should be forwarded."), " ");
		assert!(reader.required("absent").is_err());
	}

	#[test]
	fn lenient_ignores_bad_values_and_strict_rejects_them() {
		let map = attributes(serde_json::json!({ "n": "seven", "m": "7" }));
		let reader = AttributeReader::new("p", &map);

		assert_eq!(reader.lenient::<u8>("n"), None);
		assert_eq!(reader.lenient::<u8>("m"), Some(7));
		assert!(matches!(reader.strict::<u8>("n"), Err(ConfigError::InvalidValue { .. })));
		assert_eq!(reader.strict::<u8>("absent").expect("Absent is not an error."), None);
	}

	#[test]
	fn lists_booleans_and_pairs() {
		let map = attributes(serde_json::json!({
			"csv": "login_hint, prompt",
			"arr": ["a", "", "b"],
			"flag": "TRUE",
			"pairs": { "prompt": "login", "max_age": 5 },
		}));
		let reader = AttributeReader::new("p", &map);

		assert_eq!(reader.list("csv").expect("CSV list should parse."), vec!["login_hint", "prompt"]);
		assert_eq!(reader.list("arr").expect("Array list should parse."), vec!["a", "b"]);
		assert!(reader.boolean("flag", false).expect("String booleans should parse."));
		assert!(reader.boolean("absent", true).expect("Defaults should apply."));
		assert_eq!(
			reader.pairs("pairs").expect("Pairs should parse."),
			vec![("max_age".to_string(), "5".to_string()), ("prompt".to_string(), "login".to_string())]
		);
	}

	#[test]
	fn urls_validate_syntax() {
		let map = attributes(serde_json::json!({ "good": "https://op/x", "bad": "::nope" }));
		let reader = AttributeReader::new("p", &map);

		assert!(reader.url("good").expect("Valid URL should parse.").is_some());
		assert!(matches!(reader.url("bad"), Err(ConfigError::InvalidUrl { .. })));
	}
}
