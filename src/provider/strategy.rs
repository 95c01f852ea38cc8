//! Token endpoint error classification.
//!
//! Profiles delegate to [`classify_token_error`] unless a provider reports failures in a
//! non-standard way.

// self
use crate::{_prelude::*, error::ExchangeError};

/// Canonical provider error categories.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderErrorKind {
	/// Provider rejected the authorization grant (bad, expired, or replayed code).
	InvalidGrant,
	/// Client authentication failed.
	InvalidClient,
	/// Requested scopes were refused.
	InvalidScope,
	/// Any other endpoint failure.
	Endpoint,
}

/// Context used when classifying token endpoint errors.
///
/// The struct keeps only primitive data (status code, OAuth fields, body preview) so profiles
/// stay decoupled from the HTTP client.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProviderErrorContext {
	/// HTTP status code returned by the provider, when available.
	pub http_status: Option<u16>,
	/// Provider-supplied OAuth `error` field.
	pub oauth_error: Option<String>,
	/// Provider-supplied OAuth `error_description` field.
	pub error_description: Option<String>,
	/// Preview of the response body for non-JSON payloads.
	pub body_preview: Option<String>,
}
impl ProviderErrorContext {
	const BODY_PREVIEW_LIMIT: usize = 256;

	/// Adds an HTTP status code.
	pub fn with_http_status(mut self, status: u16) -> Self {
		self.http_status = Some(status);

		self
	}

	/// Adds the OAuth error code string returned by the provider.
	pub fn with_oauth_error(mut self, error: impl Into<String>) -> Self {
		self.oauth_error = Some(error.into());

		self
	}

	/// Adds the OAuth `error_description` field.
	pub fn with_error_description(mut self, description: impl Into<String>) -> Self {
		self.error_description = Some(description.into());

		self
	}

	/// Adds a body preview for providers that return non-JSON payloads.
	pub fn with_body_preview(mut self, body: impl Into<String>) -> Self {
		self.body_preview = Some(truncate_preview(body.into()));

		self
	}

	/// Human-readable reason assembled from the most specific field available.
	pub fn reason(&self) -> String {
		match (&self.oauth_error, &self.error_description) {
			(Some(error), Some(description)) => format!("{error}: {description}"),
			(Some(error), None) => error.clone(),
			(None, Some(description)) => description.clone(),
			(None, None) => self
				.body_preview
				.clone()
				.filter(|body| !body.trim().is_empty())
				.unwrap_or_else(|| match self.http_status {
					Some(status) => format!("HTTP {status}"),
					None => "no details".into(),
				}),
		}
	}

	/// Builds the exchange error for a classified failure.
	pub fn into_error(self, kind: ProviderErrorKind) -> ExchangeError {
		let reason = self.reason();

		match kind {
			ProviderErrorKind::InvalidGrant => ExchangeError::InvalidGrant { reason },
			ProviderErrorKind::InvalidClient => ExchangeError::InvalidClient { reason },
			ProviderErrorKind::InvalidScope => ExchangeError::InvalidScope { reason },
			ProviderErrorKind::Endpoint =>
				ExchangeError::Endpoint { message: reason, status: self.http_status },
		}
	}
}

/// RFC-guided classification: structured OAuth fields first, then body hints, then status.
///
/// A missing or unrecognized `client_id` is a client authentication failure even when the
/// provider labels it `invalid_request`, which is how providers without Basic support answer
/// a `client_secret_basic` call.
pub fn classify_token_error(ctx: &ProviderErrorContext) -> ProviderErrorKind {
	if let Some(kind) =
		classify_oauth_error(ctx.oauth_error.as_deref(), ctx.error_description.as_deref())
	{
		return kind;
	}
	if let Some(kind) = classify_body(ctx.body_preview.as_deref()) {
		return kind;
	}

	classify_status(ctx.http_status)
}

fn truncate_preview(body: String) -> String {
	if body.chars().count() <= ProviderErrorContext::BODY_PREVIEW_LIMIT {
		return body;
	}

	let mut buf = body.chars().take(ProviderErrorContext::BODY_PREVIEW_LIMIT).collect::<String>();

	buf.push('…');

	buf
}

fn classify_oauth_error(
	oauth_error: Option<&str>,
	error_description: Option<&str>,
) -> Option<ProviderErrorKind> {
	oauth_error
		.and_then(match_exact_value)
		.or_else(|| classify_body(error_description))
		.or_else(|| oauth_error.map(|_| ProviderErrorKind::Endpoint))
}

fn match_exact_value(value: &str) -> Option<ProviderErrorKind> {
	if value.eq_ignore_ascii_case("invalid_grant") || value.eq_ignore_ascii_case("access_denied") {
		Some(ProviderErrorKind::InvalidGrant)
	} else if value.eq_ignore_ascii_case("invalid_client")
		|| value.eq_ignore_ascii_case("unauthorized_client")
	{
		Some(ProviderErrorKind::InvalidClient)
	} else if value.eq_ignore_ascii_case("invalid_scope")
		|| value.eq_ignore_ascii_case("insufficient_scope")
	{
		Some(ProviderErrorKind::InvalidScope)
	} else {
		None
	}
}

fn classify_body(body: Option<&str>) -> Option<ProviderErrorKind> {
	let lowered = body?.to_ascii_lowercase();

	match lowered.as_str() {
		text if text.contains("invalid_grant") => Some(ProviderErrorKind::InvalidGrant),
		text if text.contains("invalid_client") || text.contains("client_id") =>
			Some(ProviderErrorKind::InvalidClient),
		text if text.contains("insufficient_scope") || text.contains("invalid_scope") =>
			Some(ProviderErrorKind::InvalidScope),
		_ => None,
	}
}

fn classify_status(status: Option<u16>) -> ProviderErrorKind {
	match status {
		Some(400) => ProviderErrorKind::InvalidGrant,
		Some(401) => ProviderErrorKind::InvalidClient,
		Some(403) => ProviderErrorKind::InvalidScope,
		_ => ProviderErrorKind::Endpoint,
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn structured_fields_win() {
		let ctx = ProviderErrorContext::default()
			.with_http_status(400)
			.with_oauth_error("invalid_client");

		assert_eq!(classify_token_error(&ctx), ProviderErrorKind::InvalidClient);
	}

	#[test]
	fn missing_client_id_is_client_failure() {
		let ctx = ProviderErrorContext::default()
			.with_http_status(400)
			.with_oauth_error("invalid_request")
			.with_error_description("Missing client_id parameter.");

		assert_eq!(classify_token_error(&ctx), ProviderErrorKind::InvalidClient);
		assert!(matches!(
			ctx.into_error(ProviderErrorKind::InvalidClient),
			ExchangeError::InvalidClient { reason } if reason.contains("Missing client_id parameter")
		));
	}

	#[test]
	fn status_fallback_and_previews() {
		let ctx = ProviderErrorContext::default().with_http_status(502).with_body_preview("x".repeat(300));

		assert_eq!(classify_token_error(&ctx), ProviderErrorKind::Endpoint);
		assert_eq!(ctx.body_preview.as_ref().map(|b| b.chars().count()), Some(257));
		assert_eq!(
			classify_token_error(&ProviderErrorContext::default().with_http_status(401)),
			ProviderErrorKind::InvalidClient
		);
	}

	#[test]
	fn unknown_oauth_error_is_endpoint_failure() {
		let ctx = ProviderErrorContext::default().with_oauth_error("server_error");

		assert_eq!(classify_token_error(&ctx), ProviderErrorKind::Endpoint);
		assert_eq!(ctx.reason(), "server_error");
	}
}
