//! Redirect endpoint: state verification, token exchange, validation, user info, and mapping.

// self
use crate::{
	_prelude::*,
	auth::{Secret, ValidatedClaims},
	config::{ConfigGeneration, ProviderEntry},
	error::AuthorizationError,
	flows::{
		FlowState, SocialLogin,
		authorize::redirect_uri,
		common::{self, FlowContext, FlowTrace},
	},
	http::ReqwestHttpClient,
	oauth::{CodeExchange, ReqwestTransportErrorMapper},
	obs::{FlowKind, FlowSpan},
	provider::{GrantType, ResponseMode},
	request::{Disposition, InboundRequest, client_side_redirect_page},
	store::AuthorizationRequest,
};

/// Parameters a provider puts on a successful or failed callback.
const CALLBACK_PARAMETERS: [&str; 5] = ["code", "state", "error", "access_token", "id_token"];

/// Tokens obtained from the token endpoint or the implicit callback.
struct ReceivedTokens {
	access_token: Option<Secret>,
	id_token: Option<Secret>,
	expires_at: Option<OffsetDateTime>,
}

impl SocialLogin {
	/// Handles the provider's redirect back to `/social-login/redirect/{provider}`.
	pub async fn handle_callback(&self, provider: &str, request: &InboundRequest) -> Disposition {
		let span = FlowSpan::new(FlowKind::Callback, "handle_callback", provider);

		span.instrument(self.handle_callback_in(provider, request)).await
	}

	async fn handle_callback_in(&self, provider: &str, request: &InboundRequest) -> Disposition {
		let generation = self.registry.current();
		let mut trace = FlowTrace::new(FlowKind::Callback, provider, FlowState::AwaitingCallback);
		let entry = match common::lookup(&generation, provider) {
			Ok(entry) => entry,
			Err(e) => return trace.fail(e),
		};
		let result = self.callback(&generation, &entry, request, &mut trace).await;

		trace.finish(result)
	}

	async fn callback(
		&self,
		generation: &ConfigGeneration,
		entry: &ProviderEntry,
		request: &InboundRequest,
		trace: &mut FlowTrace<'_>,
	) -> Result<Disposition> {
		let config = &entry.config;
		let profile = config.profile();

		if let Some(error) = request.param("error") {
			if let Some(state) = request.param("state") {
				self.store.take_authorization(&state, OffsetDateTime::now_utc()).await?;
			}

			return Err(AuthorizationError::ProviderRejected {
				status: profile.authorization_error_status(&error),
				description: request.param("error_description"),
				error,
			}
			.into());
		}
		if !request.has_any_param(&CALLBACK_PARAMETERS) {
			let fragment_response = config.response_type.grant() == GrantType::Implicit
				&& config.response_mode == ResponseMode::Fragment;

			if fragment_response && config.client_side_redirect_supported {
				tracing::debug!(provider = %config.id, "Serving the client-side redirect page.");

				return Ok(Disposition::ClientSideRedirect {
					html: client_side_redirect_page(&redirect_uri(config, request)),
				});
			}

			return Err(AuthorizationError::MissingCode.into());
		}

		let pending = self.take_pending(entry, request).await?;
		let http = generation.http_for(config);
		let resolved = entry.resolved(http).await?;
		let registry = self.registry.user_registry_for(generation);
		let cx = FlowContext { generation, config, resolved: &resolved, http, registry: registry.as_deref() };
		let tokens = match pending.response_type.grant() {
			GrantType::AuthorizationCode => {
				trace.enter(FlowState::ExchangingToken);

				let code = request.param("code").ok_or(AuthorizationError::MissingCode)?;
				let exchange = CodeExchange::<ReqwestHttpClient, ReqwestTransportErrorMapper>::from_descriptor(
					config,
					resolved.descriptor(),
					http.clone(),
					ReqwestTransportErrorMapper,
				)?;
				let set = exchange
					.exchange(&code, &pending.redirect_uri, pending.pkce_verifier.as_ref().map(Secret::expose))
					.await?;

				ReceivedTokens {
					expires_at: set.expires_at(),
					access_token: Some(set.access_token),
					id_token: set.id_token,
				}
			},
			GrantType::Implicit => implicit_tokens(&pending, request)?,
		};
		let mut claims: Option<ValidatedClaims> = None;

		if let Some(id_token) = &tokens.id_token {
			trace.enter(FlowState::ValidatingToken);

			claims = Some(cx.validate_token(id_token, pending.nonce.as_deref()).await?);
		}

		let needs_user_api =
			claims.is_none() || resolved.descriptor().endpoints.user_api.is_some();
		let claims = match (claims, &tokens.access_token) {
			(claims, Some(access_token)) if needs_user_api => {
				trace.enter(FlowState::ResolvingUserInfo);

				let user_claims = cx.user_claims(access_token).await?;

				match claims {
					Some(claims) => claims.merge(user_claims),
					None => user_claims,
				}
			},
			(Some(claims), _) => claims,
			(None, _) =>
				return Err(AuthorizationError::MissingImplicitToken { expected: "access_token" }.into()),
		};

		trace.enter(FlowState::MappingSubject);

		let authentication = cx.complete(claims, tokens.access_token, tokens.expires_at)?;

		tracing::debug!(
			provider = %config.id,
			original_url = %pending.original_url,
			"Authorization callback completed."
		);

		Ok(Disposition::Authenticated(Box::new(authentication)))
	}

	/// Consumes the pending request named by `state`; it must belong to this provider.
	async fn take_pending(
		&self,
		entry: &ProviderEntry,
		request: &InboundRequest,
	) -> Result<AuthorizationRequest> {
		let state = request.param("state").ok_or(Error::StateMismatch)?;
		let pending = self
			.store
			.take_authorization(&state, OffsetDateTime::now_utc())
			.await?
			.ok_or(Error::StateMismatch)?;

		if pending.provider != entry.config.id {
			tracing::warn!(
				provider = %entry.config.id,
				issued_for = %pending.provider,
				code = "flow.state_mismatch",
				"Authorization state was issued for another provider."
			);

			return Err(Error::StateMismatch);
		}

		Ok(pending)
	}
}

fn implicit_tokens(pending: &AuthorizationRequest, request: &InboundRequest) -> Result<ReceivedTokens> {
	let response_type = pending.response_type;
	let access_token = request.param("access_token").map(Secret::new);
	let id_token = request.param("id_token").map(Secret::new);

	if response_type.returns_access_token() && access_token.is_none() {
		return Err(AuthorizationError::MissingImplicitToken { expected: "access_token" }.into());
	}
	if response_type.returns_id_token() && id_token.is_none() {
		return Err(AuthorizationError::MissingImplicitToken { expected: "id_token" }.into());
	}

	let expires_at = request
		.param("expires_in")
		.and_then(|value| value.parse::<i64>().ok())
		.and_then(|seconds| OffsetDateTime::now_utc().checked_add(Duration::seconds(seconds)));

	Ok(ReceivedTokens { access_token, id_token, expires_at })
}
