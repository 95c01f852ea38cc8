//! Social login relying party: OAuth 2.0 / OpenID Connect flow engine with lazy discovery,
//! JOSE token validation, user API resolution, and subject mapping.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod config;
pub mod discovery;
pub mod error;
pub mod flows;
pub mod http;
pub mod jose;
pub mod mapping;
pub mod oauth;
pub mod obs;
pub mod provider;
pub mod request;
pub mod store;
pub mod userapi;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// std
	use std::{fs, path::PathBuf};
	// self
	use crate::{
		auth::ProviderId,
		config::{ConfigDocument, ConfigRegistry, ProviderEntryDocument, SslConfigDocument},
		flows::SocialLogin,
		http::ReqwestHttpClient,
		provider::ProviderKind,
	};

	/// Identifier of the trust config that accepts the self-signed certificates produced by
	/// `httpmock`.
	pub const TEST_SSL_REF: &str = "mockTrust";

	/// Builds a reqwest HTTP client that accepts the self-signed certificates produced by
	/// `httpmock` during tests.
	pub fn test_reqwest_http_client() -> ReqwestHttpClient {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.redirect(reqwest::redirect::Policy::none())
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestHttpClient::with_client(client)
	}

	/// Reads a PEM fixture from `tests/fixtures/keys`.
	pub fn key_fixture(name: &str) -> String {
		let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/keys").join(name);

		fs::read_to_string(&path)
			.unwrap_or_else(|e| panic!("Failed to read key fixture {}: {e}.", path.display()))
	}

	/// Returns a config document holding a single provider plus the trust-all SSL config used
	/// with `httpmock`.
	pub fn single_provider_document(
		kind: ProviderKind,
		id: &str,
		attributes: serde_json::Value,
	) -> ConfigDocument {
		let mut attributes = match attributes {
			serde_json::Value::Object(map) => map,
			other => panic!("Provider attributes must be a JSON object, got {other}."),
		};

		attributes.entry("sslRef").or_insert_with(|| TEST_SSL_REF.into());

		let mut document = ConfigDocument::default();

		document.providers.push(ProviderEntryDocument { kind, id: id.into(), attributes });
		document.ssl.insert(TEST_SSL_REF.into(), SslConfigDocument { trust_all: true, ..Default::default() });

		document
	}

	/// Builds a [`SocialLogin`] engine over the provided document.
	pub fn build_test_engine(document: ConfigDocument) -> SocialLogin {
		let registry =
			ConfigRegistry::new(document).expect("Test config document should load successfully.");

		SocialLogin::new(Arc::new(registry))
	}

	/// Parses a provider identifier fixture.
	pub fn provider_id(id: &str) -> ProviderId {
		ProviderId::new(id).expect("Provider identifier fixture should be valid.")
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, BTreeSet, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::OnceCell;
	pub use parking_lot::{Mutex, RwLock};
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use serde_json::{Map as JsonMap, Value as JsonValue};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _, tracing_subscriber as _};
