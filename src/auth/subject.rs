//! Authenticated subjects produced by a successful flow.

// self
use crate::{
	_prelude::*,
	auth::{ProviderId, Secret, ValidatedClaims},
};

/// Identity established for the caller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
	/// Principal name.
	pub principal: String,
	/// Group memberships.
	pub groups: BTreeSet<String>,
	/// Realm the principal belongs to.
	pub realm: String,
	/// Unique identifier, falling back to the principal name.
	pub unique_id: String,
}

/// Result of a completed flow: the subject plus the material it was derived from.
#[derive(Clone, Debug)]
pub struct Authentication {
	/// Provider configuration that authenticated the caller.
	pub provider: ProviderId,
	/// Mapped subject.
	pub subject: Subject,
	/// Claims the subject was mapped from.
	pub claims: ValidatedClaims,
	/// Access token, kept so protected resources can call provider APIs.
	pub access_token: Option<Secret>,
	/// Expiry of the access token, when known.
	pub expires_at: Option<OffsetDateTime>,
	/// Token minted by the configured JWT builder.
	pub issued_token: Option<Secret>,
}
