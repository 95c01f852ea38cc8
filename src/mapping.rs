//! Subject mapping: validated claims to principal, groups, realm, and unique id.
//!
//! The user name has no fallback: a blank attribute name or a claim that does not resolve is
//! fatal. Groups, realm, and unique id fall back to defaults when their claims are missing.

// self
use crate::{
	_prelude::*,
	auth::{Subject, ValidatedClaims},
	config::ProviderConfig,
};

/// Subject mapping failures.
#[derive(Debug, ThisError)]
pub enum MappingError {
	/// `userNameAttribute` is empty or blank.
	#[error("The userNameAttribute of `{provider}` is empty or blank, so no user name can be mapped.")]
	UserNameAttributeInvalid {
		/// Provider identifier.
		provider: String,
	},
	/// The claim named by `userNameAttribute` is absent or empty.
	#[error("The user name claim `{attribute}` was not found in the claims from `{provider}`.")]
	UserNameNotFound {
		/// Provider identifier.
		provider: String,
		/// Configured attribute.
		attribute: String,
	},
	/// `mapToUserRegistry` is set but the principal does not exist in the registry.
	#[error("The user `{principal}` was not found in the user registry.")]
	RegistryEntryNotFound {
		/// Mapped principal name.
		principal: String,
	},
}
impl MappingError {
	/// Stable label for log events.
	pub fn code(&self) -> &'static str {
		match self {
			Self::UserNameAttributeInvalid { .. } => "mapping.user_name_attribute_invalid",
			Self::UserNameNotFound { .. } => "mapping.user_name_not_found",
			Self::RegistryEntryNotFound { .. } => "mapping.registry_entry_not_found",
		}
	}
}

/// Registry entry for a known user.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryUser {
	/// Groups the registry assigns to the user.
	pub groups: BTreeSet<String>,
	/// Unique identifier assigned by the registry.
	pub unique_id: Option<String>,
}

/// Local user registry consulted when `mapToUserRegistry` is enabled.
pub trait UserRegistry
where
	Self: Send + Sync + Debug,
{
	/// Realm of the registry.
	fn realm(&self) -> &str;

	/// Looks up a user by principal name.
	fn user(&self, principal: &str) -> Option<RegistryUser>;
}

/// Serialized in-memory registry.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserRegistryDocument {
	/// Registry realm.
	pub realm: Option<String>,
	/// Users by principal name.
	pub users: BTreeMap<String, RegistryUser>,
}

/// In-memory [`UserRegistry`].
#[derive(Clone, Debug, Default)]
pub struct MemoryUserRegistry {
	realm: String,
	users: BTreeMap<String, RegistryUser>,
}
impl MemoryUserRegistry {
	/// Realm used when the document names none.
	pub const DEFAULT_REALM: &'static str = "BasicRegistry";

	/// Creates a registry from its serialized form.
	pub fn new(document: &UserRegistryDocument) -> Self {
		Self {
			realm: document.realm.clone().unwrap_or_else(|| Self::DEFAULT_REALM.to_owned()),
			users: document.users.clone(),
		}
	}

	/// Adds a user.
	pub fn with_user(mut self, principal: impl Into<String>, user: RegistryUser) -> Self {
		self.users.insert(principal.into(), user);

		self
	}
}
impl UserRegistry for MemoryUserRegistry {
	fn realm(&self) -> &str {
		&self.realm
	}

	fn user(&self, principal: &str) -> Option<RegistryUser> {
		self.users.get(principal).cloned()
	}
}

/// Maps claims of one provider configuration onto a [`Subject`].
#[derive(Clone, Copy, Debug)]
pub struct SubjectMapper<'a> {
	/// Provider configuration.
	pub config: &'a ProviderConfig,
	/// Realm used when neither a realm claim nor `realmName` applies.
	pub default_realm: &'a str,
	/// Registry consulted when `mapToUserRegistry` is set.
	pub registry: Option<&'a dyn UserRegistry>,
}
impl SubjectMapper<'_> {
	/// Maps `claims` onto a subject.
	pub fn map(&self, claims: &ValidatedClaims) -> Result<Subject, MappingError> {
		let config = self.config;
		let provider = config.id.to_string();
		let attribute = config.user_name_attribute.value.trim();

		if attribute.is_empty() {
			return Err(MappingError::UserNameAttributeInvalid { provider });
		}

		let claims = claims.claims();
		let principal = claims
			.string(attribute)
			.filter(|value| !value.trim().is_empty())
			.ok_or_else(|| MappingError::UserNameNotFound {
				provider: provider.clone(),
				attribute: attribute.to_owned(),
			})?;
		let mut groups = config
			.group_name_attribute
			.as_deref()
			.map(|name| claims.strings(name).into_iter().collect::<BTreeSet<_>>())
			.unwrap_or_default();
		let mut realm = config
			.realm_name_attribute
			.as_deref()
			.and_then(|name| claims.string(name))
			.or_else(|| config.realm_name.clone())
			.unwrap_or_else(|| self.default_realm.to_owned());
		let mut unique_id = config
			.user_unique_id_attribute
			.as_deref()
			.and_then(|name| claims.string(name))
			.unwrap_or_else(|| principal.clone());

		if config.map_to_user_registry {
			let user = self
				.registry
				.and_then(|registry| registry.user(&principal).map(|user| (registry.realm(), user)));
			let Some((registry_realm, user)) = user else {
				return Err(MappingError::RegistryEntryNotFound { principal });
			};

			groups.extend(user.groups);
			realm = registry_realm.to_owned();

			if let Some(id) = user.unique_id {
				unique_id = id;
			}
		}

		tracing::debug!(provider, principal, realm, groups = groups.len(), "Subject mapped.");

		Ok(Subject { principal, groups, realm, unique_id })
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{
		auth::{ClaimOrigin, Claims},
		config::ProviderEntryDocument,
		provider::ProviderKind,
	};

	fn config(attributes: JsonValue) -> ProviderConfig {
		let attributes = match attributes {
			JsonValue::Object(map) => map,
			_ => panic!("Attribute fixture must be an object."),
		};

		ProviderConfig::load(&ProviderEntryDocument { kind: ProviderKind::Oidc, id: "oidc".into(), attributes })
			.expect("Provider fixture should load.")
	}

	fn claims(value: JsonValue) -> ValidatedClaims {
		match value {
			JsonValue::Object(map) => ValidatedClaims::new(Claims::new(map), ClaimOrigin::IdToken),
			_ => panic!("Claim fixture must be an object."),
		}
	}

	#[test]
	fn attributes_resolve_with_fallbacks() {
		let config = config(serde_json::json!({
			"clientId": "c",
			"groupNameAttribute": "groups",
			"realmNameAttribute": "tenant",
			"userUniqueIdAttribute": "oid",
		}));
		let mapper = SubjectMapper { config: &config, default_realm: "https://op", registry: None };
		let full = mapper
			.map(&claims(serde_json::json!({
				"sub": "alice",
				"groups": ["admins", "users"],
				"tenant": "acme",
				"oid": "42",
			})))
			.expect("Complete claims should map.");

		assert_eq!(full.principal, "alice");
		assert_eq!(full.groups.len(), 2);
		assert_eq!(full.realm, "acme");
		assert_eq!(full.unique_id, "42");

		let sparse = mapper.map(&claims(serde_json::json!({ "sub": "bob" }))).expect("Sparse claims should map.");

		assert!(sparse.groups.is_empty());
		assert_eq!(sparse.realm, "https://op");
		assert_eq!(sparse.unique_id, "bob");
	}

	#[test]
	fn user_name_never_falls_back() {
		let bad_claim = config(serde_json::json!({ "clientId": "c", "userNameAttribute": "upn" }));
		let mapper = SubjectMapper { config: &bad_claim, default_realm: "r", registry: None };

		assert!(matches!(
			mapper.map(&claims(serde_json::json!({ "sub": "alice" }))),
			Err(MappingError::UserNameNotFound { attribute, .. }) if attribute == "upn"
		));

		for value in ["", "   "] {
			let blank = config(serde_json::json!({ "clientId": "c", "userNameAttribute": value }));
			let mapper = SubjectMapper { config: &blank, default_realm: "r", registry: None };

			assert!(matches!(
				mapper.map(&claims(serde_json::json!({ "sub": "alice" }))),
				Err(MappingError::UserNameAttributeInvalid { .. })
			));
		}
	}

	#[test]
	fn registry_membership_is_enforced() {
		let config = config(serde_json::json!({ "clientId": "c", "mapToUserRegistry": true }));
		let registry = MemoryUserRegistry::new(&UserRegistryDocument::default()).with_user(
			"alice",
			RegistryUser { groups: ["staff".to_owned()].into(), unique_id: None },
		);
		let mapper = SubjectMapper { config: &config, default_realm: "r", registry: Some(&registry) };
		let subject =
			mapper.map(&claims(serde_json::json!({ "sub": "alice" }))).expect("Known user should map.");

		assert_eq!(subject.realm, MemoryUserRegistry::DEFAULT_REALM);
		assert!(subject.groups.contains("staff"));
		assert!(matches!(
			mapper.map(&claims(serde_json::json!({ "sub": "mallory" }))),
			Err(MappingError::RegistryEntryNotFound { .. })
		));

		let without_registry = SubjectMapper { config: &config, default_realm: "r", registry: None };

		assert!(matches!(
			without_registry.map(&claims(serde_json::json!({ "sub": "alice" }))),
			Err(MappingError::RegistryEntryNotFound { .. })
		));
	}
}
