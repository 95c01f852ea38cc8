//! Authentication filters restricting which requests a provider configuration applies to.

// self
use crate::{_prelude::*, auth::FilterId, request::InboundRequest};

/// How a condition compares the request attribute with the configured value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchType {
	/// Attribute contains the value.
	#[default]
	Contains,
	/// Attribute does not contain the value.
	NotContain,
	/// Attribute equals the value.
	Equals,
}
impl MatchType {
	fn eval(self, actual: &str, expected: &str) -> bool {
		match self {
			Self::Contains => actual.contains(expected),
			Self::NotContain => !actual.contains(expected),
			Self::Equals => actual == expected,
		}
	}
}

/// Single filter condition; every condition of a filter must match.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum FilterCondition {
	/// Request path.
	RequestUrl {
		/// Comparison mode.
		#[serde(default)]
		match_type: MatchType,
		/// Expected value.
		value: String,
	},
	/// Host the request was addressed to.
	Host {
		/// Comparison mode.
		#[serde(default)]
		match_type: MatchType,
		/// Expected value.
		value: String,
	},
	/// Remote peer address, compared as text (prefix matching via `contains`).
	RemoteAddress {
		/// Comparison mode.
		#[serde(default)]
		match_type: MatchType,
		/// Expected value.
		value: String,
	},
	/// Request header; without a value the header only has to be present.
	Header {
		/// Header name.
		name: String,
		/// Comparison mode.
		#[serde(default)]
		match_type: MatchType,
		/// Expected value.
		#[serde(default)]
		value: Option<String>,
	},
}
impl FilterCondition {
	/// Evaluates the condition against a request.
	pub fn matches(&self, request: &InboundRequest) -> bool {
		match self {
			Self::RequestUrl { match_type, value } => match_type.eval(request.url.path(), value),
			Self::Host { match_type, value } =>
				match_type.eval(request.url.host_str().unwrap_or_default(), value),
			Self::RemoteAddress { match_type, value } => {
				let remote = request.remote_addr.map(|addr| addr.to_string()).unwrap_or_default();

				match match_type {
					MatchType::Contains => remote.starts_with(value.as_str()),
					other => other.eval(&remote, value),
				}
			},
			Self::Header { name, match_type, value } => match (request.header(name), value) {
				(None, _) => *match_type == MatchType::NotContain,
				(Some(_), None) => *match_type != MatchType::NotContain,
				(Some(actual), Some(expected)) => match_type.eval(actual, expected),
			},
		}
	}
}

/// Serialized filter definition.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthFilterDocument {
	/// Conditions that must all match.
	#[serde(default)]
	pub conditions: Vec<FilterCondition>,
}

/// Named filter evaluated before a provider handles a request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthFilter {
	/// Filter identifier.
	pub id: FilterId,
	/// Conditions that must all match.
	pub conditions: Vec<FilterCondition>,
}
impl AuthFilter {
	/// Creates a filter from its serialized definition.
	pub fn new(id: FilterId, document: &AuthFilterDocument) -> Self {
		Self { id, conditions: document.conditions.clone() }
	}

	/// Returns true when every condition matches.
	pub fn matches(&self, request: &InboundRequest) -> bool {
		self.conditions.iter().all(|condition| condition.matches(request))
	}
}
