//! Observability helpers for social login flows.
//!
//! - Every flow runs inside a `social_login.flow` span carrying the `flow` kind, the `stage`
//!   (call site), and the provider identifier.
//! - Enable `metrics` to increment the `social_login_flow_total` counter for every
//!   attempt/success/failure, labeled by `flow` + `outcome`.
//! - [`log_failure`] emits the structured `code`-tagged event every failure path produces.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Flow kinds observed by the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Protected-resource access that may redirect to the provider.
	Authenticate,
	/// Redirect endpoint handling the provider's callback.
	Callback,
	/// Access token presented directly on the inbound request.
	BearerToken,
	/// Lazy discovery document resolution.
	Discovery,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::Authenticate => "authenticate",
			FlowKind::Callback => "callback",
			FlowKind::BearerToken => "bearer_token",
			FlowKind::Discovery => "discovery",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to a flow.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Emits the diagnostic events for a failed flow: the specific cause followed by the generic
/// authentication failure.
pub fn log_failure(provider: &str, error: &Error) {
	::tracing::error!(
		provider,
		code = error.code(),
		kind = error.kind().as_str(),
		status = error.status(),
		"{error}"
	);

	if let Some(source) = error.source() {
		::tracing::debug!(provider, code = error.code(), "caused by: {source}");
	}

	::tracing::error!(
		provider,
		code = "flow.authentication_failed",
		"Authentication with social login configuration `{provider}` failed."
	);
}
