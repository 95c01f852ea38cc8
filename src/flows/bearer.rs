//! Access tokens presented directly on the inbound request.

// self
use crate::{
	_prelude::*,
	auth::Secret,
	config::{ConfigGeneration, ProviderEntry},
	flows::{
		FlowState, SocialLogin,
		common::{FlowContext, FlowTrace},
	},
	obs::{FlowKind, FlowSpan},
	request::Disposition,
	store,
};

impl SocialLogin {
	pub(super) async fn authenticate_bearer(
		&self,
		generation: &ConfigGeneration,
		entry: &ProviderEntry,
		token: String,
	) -> Disposition {
		let provider: &str = &entry.config.id;
		let span = FlowSpan::new(FlowKind::BearerToken, "authenticate_bearer", provider);
		let mut trace = FlowTrace::new(FlowKind::BearerToken, provider, FlowState::Unauthenticated);
		let result = span.instrument(self.bearer(generation, entry, Secret::new(token), &mut trace)).await;

		trace.finish(result)
	}

	async fn bearer(
		&self,
		generation: &ConfigGeneration,
		entry: &ProviderEntry,
		token: Secret,
		trace: &mut FlowTrace<'_>,
	) -> Result<Disposition> {
		let config = &entry.config;
		let key = store::bearer_key(&config.id, token.expose());
		let now = OffsetDateTime::now_utc();

		if let Some(authentication) = self.store.cached_bearer(&key, now).await? {
			tracing::debug!(provider = %config.id, "Bearer token subject served from cache.");

			return Ok(Disposition::Authenticated(Box::new(authentication)));
		}

		let http = generation.http_for(config);
		let resolved = entry.resolved(http).await?;
		let registry = self.registry.user_registry_for(generation);
		let cx = FlowContext { generation, config, resolved: &resolved, http, registry: registry.as_deref() };
		let claims = if config.profile().expects_id_token() && looks_like_jwt(token.expose()) {
			trace.enter(FlowState::ValidatingToken);

			cx.validate_token(&token, None).await?
		} else {
			trace.enter(FlowState::ResolvingUserInfo);

			cx.user_claims(&token).await?
		};
		let expires_at = claims.claims().instant("exp");

		trace.enter(FlowState::MappingSubject);

		let authentication = cx.complete(claims, Some(token), expires_at)?;

		match expires_at {
			Some(expires_at) if expires_at > now => {
				self.store.cache_bearer(key, authentication.clone(), expires_at).await?;
			},
			_ => tracing::debug!(
				provider = %config.id,
				"Bearer token carries no usable expiry; the subject is not cached."
			),
		}

		Ok(Disposition::Authenticated(Box::new(authentication)))
	}
}

/// Compact JWS (3 parts) or JWE (5 parts) serialization.
fn looks_like_jwt(token: &str) -> bool {
	let parts = token.split('.').count();

	(parts == 3 || parts == 5) && token.split('.').all(|part| !part.is_empty() || parts == 5)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn opaque_tokens_are_not_jwts() {
		assert!(looks_like_jwt("a.b.c"));
		assert!(looks_like_jwt("a..c.d.e"));
		assert!(!looks_like_jwt("opaque-access-token"));
		assert!(!looks_like_jwt("a..c"));
	}
}
