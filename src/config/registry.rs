//! Configuration generations and the registry that swaps them.

// self
use crate::{
	_prelude::*,
	auth::FilterId,
	config::{AuthFilter, ConfigDocument, ProviderConfig},
	discovery::{self, ResolvedProvider},
	error::ConfigError,
	http::{HttpClients, ReqwestHttpClient},
	jose::{JwtBuilder, KeyStore},
	mapping::{MemoryUserRegistry, UserRegistry},
};

/// One provider entry of a generation plus its lazily resolved view.
#[derive(Debug)]
pub struct ProviderEntry {
	/// Static configuration.
	pub config: ProviderConfig,
	resolved: OnceCell<Result<Arc<ResolvedProvider>, Arc<Error>>>,
}
impl ProviderEntry {
	/// Wraps a loaded configuration.
	pub fn new(config: ProviderConfig) -> Self {
		Self { config, resolved: OnceCell::new() }
	}

	/// Resolves the provider on first use, running discovery when configured.
	///
	/// The outcome, failures included, is kept for the rest of the generation; only a
	/// reconfiguration fetches the discovery document again.
	pub async fn resolved(&self, http: &ReqwestHttpClient) -> Result<Arc<ResolvedProvider>> {
		let outcome = self
			.resolved
			.get_or_init(|| async {
				discovery::resolve_provider(&self.config, http).await.map(Arc::new).map_err(Arc::new)
			})
			.await;

		match outcome {
			Ok(resolved) => Ok(Arc::clone(resolved)),
			Err(e) => Err(Error::Unresolved(Arc::clone(e))),
		}
	}

	/// Returns the resolved view when resolution already succeeded.
	pub fn resolved_if_ready(&self) -> Option<Arc<ResolvedProvider>> {
		self.resolved.get().and_then(|outcome| outcome.as_ref().ok()).cloned()
	}
}

/// Immutable snapshot of the whole configuration.
#[derive(Debug)]
pub struct ConfigGeneration {
	number: u64,
	providers: Vec<Arc<ProviderEntry>>,
	filters: HashMap<String, AuthFilter>,
	http: HttpClients,
	keys: KeyStore,
	jwt_builders: HashMap<String, JwtBuilder>,
	user_registry: Option<Arc<dyn UserRegistry>>,
}
impl ConfigGeneration {
	/// Builds a generation from a document.
	pub fn build(number: u64, document: &ConfigDocument) -> Result<Self, ConfigError> {
		let http = HttpClients::build(&document.ssl)?;

		Self::build_with_http(number, document, http)
	}

	/// Builds a generation that uses the given HTTP clients instead of building them from the
	/// document's SSL configurations.
	pub fn build_with_http(
		number: u64,
		document: &ConfigDocument,
		http: HttpClients,
	) -> Result<Self, ConfigError> {
		let keys = KeyStore::from_document(&document.key_store)?;
		let filters = document
			.auth_filters
			.iter()
			.map(|(id, filter)| Ok((id.clone(), AuthFilter::new(FilterId::new(id)?, filter))))
			.collect::<Result<HashMap<_, _>, ConfigError>>()?;
		let jwt_builders = document
			.jwt_builders
			.iter()
			.map(|(id, builder)| Ok((id.clone(), JwtBuilder::new(id, builder, &keys)?)))
			.collect::<Result<HashMap<_, _>, ConfigError>>()?;
		let mut seen = BTreeSet::new();
		let mut providers = Vec::with_capacity(document.providers.len());

		for entry in &document.providers {
			let config = ProviderConfig::load(entry)?;

			if !seen.insert(config.id.to_string()) {
				return Err(ConfigError::DuplicateProvider { id: config.id.to_string() });
			}

			warn_unresolved_references(&config, &http, &filters, &jwt_builders, &keys);
			providers.push(Arc::new(ProviderEntry::new(config)));
		}

		let user_registry = document
			.user_registry
			.as_ref()
			.map(|doc| Arc::new(MemoryUserRegistry::new(doc)) as Arc<dyn UserRegistry>);

		tracing::info!(generation = number, providers = providers.len(), "Configuration generation built.");

		Ok(Self { number, providers, filters, http, keys, jwt_builders, user_registry })
	}

	/// Monotonic generation number.
	pub fn number(&self) -> u64 {
		self.number
	}

	/// Provider entries in declaration order.
	pub fn providers(&self) -> &[Arc<ProviderEntry>] {
		&self.providers
	}

	/// Looks up a provider entry.
	pub fn provider(&self, id: &str) -> Option<&Arc<ProviderEntry>> {
		self.providers.iter().find(|entry| &*entry.config.id == id)
	}

	/// Looks up an authentication filter.
	pub fn filter(&self, id: &str) -> Option<&AuthFilter> {
		self.filters.get(id)
	}

	/// HTTP client honoring the provider's `sslRef`.
	pub fn http_for(&self, config: &ProviderConfig) -> &ReqwestHttpClient {
		self.http.get(config.ssl_ref.as_deref())
	}

	/// Key store.
	pub fn keys(&self) -> &KeyStore {
		&self.keys
	}

	/// Looks up a JWT builder.
	pub fn jwt_builder(&self, id: &str) -> Option<&JwtBuilder> {
		self.jwt_builders.get(id)
	}

	/// User registry declared by the document.
	pub fn user_registry(&self) -> Option<&Arc<dyn UserRegistry>> {
		self.user_registry.as_ref()
	}
}

fn warn_unresolved_references(
	config: &ProviderConfig,
	http: &HttpClients,
	filters: &HashMap<String, AuthFilter>,
	jwt_builders: &HashMap<String, JwtBuilder>,
	keys: &KeyStore,
) {
	let provider: &str = &config.id;
	let references = [
		("sslRef", config.ssl_ref.as_deref(), config.ssl_ref.as_deref().is_some_and(|id| http.contains(id))),
		(
			"authFilterRef",
			config.auth_filter_ref.as_deref(),
			config.auth_filter_ref.as_deref().is_some_and(|id| filters.contains_key(id)),
		),
		(
			"jwtBuilderRef",
			config.jwt_builder_ref.as_deref(),
			config.jwt_builder_ref.as_deref().is_some_and(|id| jwt_builders.contains_key(id)),
		),
		(
			"trustAliasName",
			config.trust_alias_name.as_deref(),
			config.trust_alias_name.as_deref().is_some_and(|alias| keys.contains(alias)),
		),
		(
			"keyManagementKeyAlias",
			config.key_management_key_alias.as_deref(),
			config.key_management_key_alias.as_deref().is_some_and(|alias| keys.contains(alias)),
		),
	];

	for (attribute, reference, known) in references {
		let Some(reference) = reference else { continue };

		if !known {
			tracing::warn!(
				provider,
				attribute,
				reference,
				code = "config.unknown_reference",
				"The {attribute} `{reference}` of `{provider}` does not exist."
			);
		}
	}
}

/// Owner of the active [`ConfigGeneration`].
///
/// Readers clone the current `Arc` and keep it for the whole flow; [`ConfigRegistry::reconfigure`]
/// swaps in a new generation without touching flows already running.
#[derive(Debug)]
pub struct ConfigRegistry {
	current: RwLock<Arc<ConfigGeneration>>,
	user_registry: Option<Arc<dyn UserRegistry>>,
	http: Option<HttpClients>,
}
impl ConfigRegistry {
	/// Builds generation 1 from `document`.
	pub fn new(document: ConfigDocument) -> Result<Self, ConfigError> {
		let generation = ConfigGeneration::build(1, &document)?;

		Ok(Self { current: RwLock::new(Arc::new(generation)), user_registry: None, http: None })
	}

	/// Builds generation 1 with fixed HTTP clients; later generations reuse them.
	pub fn with_http_clients(document: ConfigDocument, http: HttpClients) -> Result<Self, ConfigError> {
		let generation = ConfigGeneration::build_with_http(1, &document, http.clone())?;

		Ok(Self { current: RwLock::new(Arc::new(generation)), user_registry: None, http: Some(http) })
	}

	/// Uses `registry` whenever the document does not declare one.
	pub fn with_user_registry(mut self, registry: Arc<dyn UserRegistry>) -> Self {
		self.user_registry = Some(registry);

		self
	}

	/// Returns the active generation.
	pub fn current(&self) -> Arc<ConfigGeneration> {
		Arc::clone(&self.current.read())
	}

	/// Replaces the active generation, returning its number.
	///
	/// On failure the previous generation stays active.
	pub fn reconfigure(&self, document: ConfigDocument) -> Result<u64, ConfigError> {
		let mut current = self.current.write();
		let number = current.number + 1;
		let generation = match &self.http {
			Some(http) => ConfigGeneration::build_with_http(number, &document, http.clone()),
			None => ConfigGeneration::build(number, &document),
		}
		.inspect_err(|e| {
			tracing::error!(
				generation = number,
				code = e.code(),
				"Reconfiguration failed, keeping generation {}: {e}",
				current.number
			);
		})?;

		*current = Arc::new(generation);

		Ok(number)
	}

	/// User registry of `generation`, falling back to the one attached to the registry.
	pub fn user_registry_for(&self, generation: &ConfigGeneration) -> Option<Arc<dyn UserRegistry>> {
		generation.user_registry().or(self.user_registry.as_ref()).cloned()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{
		_preludet::single_provider_document, config::ProviderEntryDocument, provider::ProviderKind,
	};

	fn document() -> ConfigDocument {
		single_provider_document(
			ProviderKind::Oidc,
			"oidc",
			serde_json::json!({
				"clientId": "c",
				"authorizationEndpoint": "https://op.example/authorize",
				"tokenEndpoint": "https://op.example/token",
			}),
		)
	}

	#[test]
	fn reconfigure_swaps_generations_atomically() {
		let registry = ConfigRegistry::new(document()).expect("Document should load.");
		let before = registry.current();

		assert_eq!(before.number(), 1);
		assert!(before.provider("oidc").is_some());

		let mut next = document();

		next.providers[0].id = "oidc2".into();

		assert_eq!(registry.reconfigure(next).expect("Reconfiguration should succeed."), 2);

		let after = registry.current();

		assert!(after.provider("oidc").is_none());
		assert!(after.provider("oidc2").is_some());
		assert!(before.provider("oidc").is_some());
	}

	#[test]
	fn failed_reconfiguration_keeps_the_active_generation() {
		let registry = ConfigRegistry::new(document()).expect("Document should load.");
		let mut duplicated = document();

		duplicated.providers.push(duplicated.providers[0].clone());

		assert!(matches!(
			registry.reconfigure(duplicated),
			Err(ConfigError::DuplicateProvider { id }) if id == "oidc"
		));
		assert_eq!(registry.current().number(), 1);

		let mut missing_client = document();

		missing_client.providers.push(ProviderEntryDocument {
			kind: ProviderKind::GitHub,
			id: "gh".into(),
			attributes: JsonMap::new(),
		});

		assert!(matches!(
			registry.reconfigure(missing_client),
			Err(ConfigError::MissingAttribute { attribute: "clientId", .. })
		));
		assert_eq!(registry.current().number(), 1);
	}

	#[test]
	fn document_registry_takes_precedence() {
		let fallback: Arc<dyn UserRegistry> = Arc::new(MemoryUserRegistry::default());
		let registry = ConfigRegistry::new(document())
			.expect("Document should load.")
			.with_user_registry(Arc::clone(&fallback));

		assert!(registry.user_registry_for(&registry.current()).is_some());

		let mut with_registry = document();

		with_registry.user_registry = Some(crate::mapping::UserRegistryDocument {
			realm: Some("docRealm".into()),
			..Default::default()
		});
		registry.reconfigure(with_registry).expect("Reconfiguration should succeed.");

		let generation = registry.current();
		let resolved =
			registry.user_registry_for(&generation).expect("A user registry should be available.");

		assert_eq!(resolved.realm(), "docRealm");
	}
}
