//! Shared helpers for flow implementations (state tracing, provider lookup, claim resolution,
//! subject completion).

// self
use crate::{
	_prelude::*,
	auth::{Authentication, Claims, Secret, ValidatedClaims},
	config::{ConfigGeneration, ProviderConfig, ProviderEntry},
	discovery::ResolvedProvider,
	flows::FlowState,
	http::ReqwestHttpClient,
	jose::TokenValidator,
	mapping::{SubjectMapper, UserRegistry},
	obs::{self, FlowKind, FlowOutcome},
	request::{Disposition, FlowFailure, InboundRequest},
	userapi::{UserApiError, UserApiResolver},
};

/// Records the states a flow passes through and reports its outcome.
#[derive(Debug)]
pub(crate) struct FlowTrace<'a> {
	kind: FlowKind,
	provider: &'a str,
	states: Vec<FlowState>,
}
impl<'a> FlowTrace<'a> {
	pub(crate) fn new(kind: FlowKind, provider: &'a str, initial: FlowState) -> Self {
		obs::record_flow_outcome(kind, FlowOutcome::Attempt);

		Self { kind, provider, states: vec![initial] }
	}

	pub(crate) fn enter(&mut self, state: FlowState) {
		tracing::trace!(provider = self.provider, state = state.as_str(), "Flow state entered.");

		self.states.push(state);
	}

	pub(crate) fn succeed(mut self, disposition: Disposition) -> Disposition {
		if matches!(disposition, Disposition::Authenticated(_)) {
			self.enter(FlowState::Authenticated);
		}

		obs::record_flow_outcome(self.kind, FlowOutcome::Success);

		disposition
	}

	pub(crate) fn fail(self, error: Error) -> Disposition {
		obs::log_failure(self.provider, &error);
		obs::record_flow_outcome(self.kind, FlowOutcome::Failure);

		Disposition::Failed(FlowFailure { status: error.status(), error, states: self.states })
	}

	pub(crate) fn finish(self, result: Result<Disposition>) -> Disposition {
		match result {
			Ok(disposition) => self.succeed(disposition),
			Err(e) => self.fail(e),
		}
	}
}

/// Looks up an enabled provider entry.
pub(crate) fn lookup(generation: &ConfigGeneration, provider: &str) -> Result<Arc<ProviderEntry>> {
	let entry = generation
		.provider(provider)
		.ok_or_else(|| Error::ProviderNotFound { id: provider.to_owned() })?;

	if !entry.config.enabled {
		return Err(Error::ProviderDisabled { id: provider.to_owned() });
	}

	Ok(Arc::clone(entry))
}

/// Applies the provider's auth filter; unknown filters match every request.
pub(crate) fn filter_matches(
	generation: &ConfigGeneration,
	config: &ProviderConfig,
	request: &InboundRequest,
) -> bool {
	config
		.auth_filter_ref
		.as_deref()
		.and_then(|id| generation.filter(id))
		.is_none_or(|filter| filter.matches(request))
}

/// Everything a flow needs once the provider is resolved.
#[derive(Clone, Copy, Debug)]
pub(crate) struct FlowContext<'a> {
	pub(crate) generation: &'a ConfigGeneration,
	pub(crate) config: &'a ProviderConfig,
	pub(crate) resolved: &'a ResolvedProvider,
	pub(crate) http: &'a ReqwestHttpClient,
	pub(crate) registry: Option<&'a dyn UserRegistry>,
}
impl FlowContext<'_> {
	/// Validates a compact ID token or JWT access token.
	pub(crate) async fn validate_token(
		&self,
		token: &Secret,
		nonce: Option<&str>,
	) -> Result<ValidatedClaims> {
		let validator = TokenValidator {
			policy: self.resolved.policy(),
			issuer: self.resolved.descriptor().issuer.as_deref(),
			client_secret: self.config.client_secret.as_ref(),
			keys: self.generation.keys(),
			jwks: self.resolved.jwks.as_ref(),
			http: self.http,
		};

		Ok(validator.validate(token.expose(), nonce).await?)
	}

	/// Calls the user API with `access_token`.
	///
	/// OpenID Connect providers without a user API report missing claims; OAuth providers report
	/// the missing configuration.
	pub(crate) async fn user_claims(&self, access_token: &Secret) -> Result<ValidatedClaims> {
		let uri = self.resolved.descriptor().endpoints.user_api.as_ref();

		if uri.is_none() && self.config.profile().expects_id_token() {
			let provider = self.config.id.to_string();

			tracing::warn!(
				provider,
				code = "user_api.missing_claims",
				"No user API is configured for `{provider}` and no ID token supplied the claims."
			);

			return Err(UserApiError::MissingClaims { provider }.into());
		}

		UserApiResolver { config: self.config, uri, http: self.http }.fetch_claims(access_token).await
	}

	/// Realm used when neither a claim nor `realmName` supplies one.
	pub(crate) fn default_realm(&self) -> String {
		let descriptor = self.resolved.descriptor();

		descriptor
			.issuer
			.clone()
			.unwrap_or_else(|| descriptor.endpoints.authorization.origin().ascii_serialization())
	}

	/// Maps `claims` onto a subject and mints the configured JWT, if any.
	pub(crate) fn complete(
		&self,
		claims: ValidatedClaims,
		access_token: Option<Secret>,
		expires_at: Option<OffsetDateTime>,
	) -> Result<Authentication> {
		let default_realm = self.default_realm();
		let subject = SubjectMapper {
			config: self.config,
			default_realm: &default_realm,
			registry: self.registry,
		}
		.map(&claims)?;
		let issued_token = match self.config.jwt_builder_ref.as_deref() {
			Some(id) => match self.generation.jwt_builder(id) {
				Some(builder) => {
					let mut payload = Claims::default();

					payload.insert("sub", subject.principal.as_str());
					payload.insert("realm", subject.realm.as_str());
					payload.insert("uniqueSecurityName", subject.unique_id.as_str());

					if !subject.groups.is_empty() {
						payload.insert("groups", subject.groups.iter().cloned().collect::<Vec<_>>());
					}

					Some(Secret::new(builder.build(&payload)?))
				},
				None => None,
			},
			None => None,
		};

		tracing::info!(
			provider = %self.config.id,
			principal = subject.principal.as_str(),
			realm = subject.realm.as_str(),
			"Subject established."
		);

		Ok(Authentication {
			provider: self.config.id.clone(),
			subject,
			claims,
			access_token,
			expires_at,
			issued_token,
		})
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{
		_preludet::single_provider_document,
		config::{AuthFilterDocument, FilterCondition, MatchType},
		provider::ProviderKind,
	};

	fn generation(attributes: JsonValue) -> ConfigGeneration {
		let mut document = single_provider_document(ProviderKind::GitHub, "gh", attributes);

		document.auth_filters.insert(
			"apiOnly".into(),
			AuthFilterDocument {
				conditions: vec![FilterCondition::RequestUrl {
					match_type: MatchType::Contains,
					value: "/api/".into(),
				}],
			},
		);

		ConfigGeneration::build(1, &document).expect("Generation fixture should build.")
	}

	fn request(url: &str) -> InboundRequest {
		InboundRequest::get(Url::parse(url).expect("URL fixture should parse."))
	}

	#[test]
	fn lookup_distinguishes_missing_and_disabled() {
		let enabled = generation(serde_json::json!({ "clientId": "c" }));

		assert!(lookup(&enabled, "gh").is_ok());
		assert!(matches!(lookup(&enabled, "nope"), Err(Error::ProviderNotFound { .. })));

		let disabled = generation(serde_json::json!({ "clientId": "c", "enabled": false }));
		let err = lookup(&disabled, "gh").expect_err("Disabled providers should be rejected.");

		assert_eq!(err.status(), 403);
	}

	#[test]
	fn unknown_filters_match_everything() {
		let filtered = generation(serde_json::json!({ "clientId": "c", "authFilterRef": "apiOnly" }));
		let config = &filtered.providers()[0].config;

		assert!(filter_matches(&filtered, config, &request("https://rp/api/x")));
		assert!(!filter_matches(&filtered, config, &request("https://rp/web/x")));

		let unknown = generation(serde_json::json!({ "clientId": "c", "authFilterRef": "missing" }));

		assert!(filter_matches(&unknown, &unknown.providers()[0].config, &request("https://rp/web/x")));
	}

	#[test]
	fn failures_carry_visited_states() {
		let mut trace = FlowTrace::new(FlowKind::Callback, "gh", FlowState::AwaitingCallback);

		trace.enter(FlowState::ExchangingToken);

		let disposition = trace.fail(Error::StateMismatch);
		let failure = disposition.failure().expect("Disposition should be a failure.");

		assert_eq!(failure.status, 401);
		assert_eq!(failure.states, vec![FlowState::AwaitingCallback, FlowState::ExchangingToken]);
		assert_eq!(failure.failed_in(), Some(FlowState::ExchangingToken));
	}
}
