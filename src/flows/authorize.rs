//! Protected-resource access: bearer short-circuits, lazy resolution, and the redirect to the
//! provider's authorization endpoint.

mod session;

pub use session::*;

// self
use crate::{
	_prelude::*,
	config::{ConfigGeneration, ProviderEntry},
	error::AuthorizationError,
	flows::{
		FlowState, SocialLogin,
		common::{self, FlowTrace},
	},
	obs::{FlowKind, FlowSpan},
	request::{Disposition, InboundRequest},
};

impl SocialLogin {
	/// Handles an unauthenticated request for a resource protected by `provider`.
	///
	/// Returns [`Disposition::NotApplicable`] when the provider's auth filter rejects the request,
	/// so the caller can fall through to another authentication mechanism.
	pub async fn authenticate(&self, provider: &str, request: &InboundRequest) -> Disposition {
		let span = FlowSpan::new(FlowKind::Authenticate, "authenticate", provider);

		span.instrument(self.authenticate_in(provider, request)).await
	}

	async fn authenticate_in(&self, provider: &str, request: &InboundRequest) -> Disposition {
		let generation = self.registry.current();
		let entry = match common::lookup(&generation, provider) {
			Ok(entry) => entry,
			Err(e) =>
				return FlowTrace::new(FlowKind::Authenticate, provider, FlowState::Unauthenticated)
					.fail(e),
		};
		let config = &entry.config;

		if !common::filter_matches(&generation, config, request) {
			tracing::debug!(provider, url = %request.url, "Auth filter does not match the request.");

			return Disposition::NotApplicable;
		}
		if config.accepts_bearer_tokens() {
			let header = &config.access_token_header_name;

			match request.access_token(header) {
				Some(token) => return self.authenticate_bearer(&generation, &entry, token).await,
				None if config.access_token_required => {
					return FlowTrace::new(FlowKind::BearerToken, provider, FlowState::Unauthenticated)
						.fail(Error::MissingAccessToken { header: header.clone() });
				},
				None => {},
			}
		}

		let mut trace = FlowTrace::new(FlowKind::Authenticate, provider, FlowState::Unauthenticated);
		let result = self.redirect(&generation, &entry, request, &mut trace).await;

		trace.finish(result)
	}

	async fn redirect(
		&self,
		generation: &ConfigGeneration,
		entry: &ProviderEntry,
		request: &InboundRequest,
		trace: &mut FlowTrace<'_>,
	) -> Result<Disposition> {
		let config = &entry.config;
		let resolved = entry.resolved(generation.http_for(config)).await?;
		let descriptor = resolved.descriptor();
		let response_type = descriptor.response_type;
		let supported = config.profile().supported_response_types();

		if !supported.contains(&response_type) || !descriptor.supports(response_type.grant()) {
			return Err(AuthorizationError::UnsupportedResponseType {
				response_type: response_type.to_string(),
				supported: supported.iter().map(|ty| ty.as_str().to_owned()).collect(),
			}
			.into());
		}

		trace.enter(FlowState::RedirectedToProvider);

		let session = session::build_session(config, descriptor, request);

		self.store.put_authorization(session.pending).await?;
		trace.enter(FlowState::AwaitingCallback);

		tracing::debug!(
			provider = %config.id,
			endpoint = %descriptor.endpoints.authorization,
			response_type = response_type.as_str(),
			"Redirecting to the authorization endpoint."
		);

		Ok(Disposition::Redirect { location: session.location })
	}
}
