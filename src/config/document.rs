//! Serialized configuration document.

// self
use crate::{
	_prelude::*,
	config::AuthFilterDocument,
	error::ConfigError,
	jose::{JwtBuilderDocument, KeyEntryDocument},
	mapping::UserRegistryDocument,
	provider::ProviderKind,
};

/// Root configuration document.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigDocument {
	/// Provider entries, in evaluation order.
	pub providers: Vec<ProviderEntryDocument>,
	/// Authentication filters by id.
	pub auth_filters: BTreeMap<String, AuthFilterDocument>,
	/// SSL trust configurations by id.
	pub ssl: BTreeMap<String, SslConfigDocument>,
	/// PEM keys by alias.
	pub key_store: BTreeMap<String, KeyEntryDocument>,
	/// JWT builders by id.
	pub jwt_builders: BTreeMap<String, JwtBuilderDocument>,
	/// Basic user registry consulted by `mapToUserRegistry`.
	pub user_registry: Option<UserRegistryDocument>,
}
impl ConfigDocument {
	/// Parses a JSON document, reporting the path of the first invalid value.
	pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
		let mut deserializer = serde_json::Deserializer::from_str(json);

		serde_path_to_error::deserialize(&mut deserializer)
			.map_err(|source| ConfigError::Document { source })
	}
}

/// One provider entry: its kind, identifier, and raw attributes.
///
/// Attributes stay untyped here so loading can tell absent, empty, and blank values apart.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProviderEntryDocument {
	/// Provider kind (element name such as `oidcLogin`).
	pub kind: ProviderKind,
	/// Configuration identifier.
	pub id: String,
	/// camelCase attribute names mapped to JSON values.
	#[serde(default)]
	pub attributes: JsonMap<String, JsonValue>,
}

/// TLS trust configuration referenced by `sslRef`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SslConfigDocument {
	/// Accept any certificate and host name. Intended for test providers only.
	pub trust_all: bool,
	/// Additional PEM root certificates.
	pub trusted_certificates: Vec<String>,
	/// Request timeout in milliseconds.
	pub timeout_millis: Option<u64>,
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn documents_parse_with_defaults() {
		let document = ConfigDocument::from_json_str(
			r#"{
				"providers": [
					{ "kind": "oidcLogin", "id": "oidc1", "attributes": { "clientId": "client" } }
				],
				"ssl": { "trustAll": { "trustAll": true, "timeoutMillis": 500 } }
			}"#,
		)
		.expect("Document should parse.");

		assert_eq!(document.providers[0].kind, ProviderKind::Oidc);
		assert_eq!(document.providers[0].attributes["clientId"], "client");
		assert!(document.ssl["trustAll"].trust_all);
		assert_eq!(document.ssl["trustAll"].timeout_millis, Some(500));
		assert!(document.key_store.is_empty());
	}

	#[test]
	fn parse_errors_report_the_path() {
		let err = ConfigDocument::from_json_str(r#"{ "providers": [ { "kind": "myspaceLogin", "id": "x" } ] }"#)
			.expect_err("Unknown provider kinds must fail.");

		match err {
			ConfigError::Document { source } => assert_eq!(source.path().to_string(), "providers[0].kind"),
			other => panic!("Unexpected error: {other}."),
		}
	}
}
