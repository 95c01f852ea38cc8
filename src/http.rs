//! Transport primitives for provider calls.
//!
//! The module exposes [`TokenHttpClient`] alongside [`ResponseMetadata`] and
//! [`ResponseMetadataSlot`] so the token exchange can classify failures with the HTTP status
//! that produced them. Discovery, JWKS, and user API calls go through
//! [`ReqwestHttpClient::fetch`], which buffers the body and classifies transport failures.
//! One client is built per SSL configuration of a generation and shared by every provider
//! that references it.

// std
use std::ops::Deref;
// crates.io
use oauth2::{AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse};
use reqwest::{Certificate, RequestBuilder, redirect::Policy};
// self
use crate::{_prelude::*, config::SslConfigDocument, error::ConfigError, error::TransportError};

/// Outbound calls give up after this long unless the SSL configuration says otherwise.
pub const DEFAULT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

const PREVIEW_LIMIT: usize = 256;

/// Abstraction over HTTP transports capable of executing token exchanges while publishing
/// response metadata to the error classifier.
///
/// Implementations must be `Send + Sync + 'static` so they can be shared across flows, and
/// the handles they return must own whatever state is required so their request futures
/// remain `Send` for the lifetime of the in-flight operation.
pub trait TokenHttpClient
where
	Self: 'static + Send + Sync,
{
	/// Concrete error emitted by the underlying transport.
	type TransportError: 'static + Send + Sync + StdError;

	/// [`AsyncHttpClient`] handle tied to a [`ResponseMetadataSlot`].
	type Handle: for<'c> AsyncHttpClient<
			'c,
			Error = HttpClientError<Self::TransportError>,
			Future: 'c + Send,
		>
		+ 'static
		+ Send
		+ Sync;

	/// Builds an [`AsyncHttpClient`] handle that records outcomes in `slot`.
	///
	/// Call [`ResponseMetadataSlot::take`] before submitting the request and
	/// [`ResponseMetadataSlot::store`] once the response status is known.
	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle;
}

/// Captures metadata from the most recent HTTP response for downstream error mapping.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadata {
	/// HTTP status code returned by the endpoint, if available.
	pub status: Option<u16>,
}

/// Thread-safe slot for sharing [`ResponseMetadata`] between transport and error layers.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadataSlot(Arc<Mutex<Option<ResponseMetadata>>>);
impl ResponseMetadataSlot {
	/// Stores new metadata for the current request.
	pub fn store(&self, meta: ResponseMetadata) {
		*self.0.lock() = Some(meta);
	}

	/// Returns the captured metadata, if any, consuming it from the slot.
	pub fn take(&self) -> Option<ResponseMetadata> {
		self.0.lock().take()
	}
}

/// Buffered response of a discovery, JWKS, or user API call.
#[derive(Clone, Debug)]
pub struct HttpReply {
	/// HTTP status code.
	pub status: u16,
	/// Raw response body.
	pub body: Vec<u8>,
}
impl HttpReply {
	/// Returns true for 2xx statuses.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	/// Parses the body as JSON, keeping the path of the first failure.
	pub fn json<T>(&self) -> Result<T, serde_path_to_error::Error<serde_json::Error>>
	where
		T: serde::de::DeserializeOwned,
	{
		let mut deserializer = serde_json::Deserializer::from_slice(&self.body);

		serde_path_to_error::deserialize(&mut deserializer)
	}

	/// Returns a truncated, lossy rendering of the body for log events.
	pub fn preview(&self) -> String {
		let text = String::from_utf8_lossy(&self.body);

		text.chars().take(PREVIEW_LIMIT).collect()
	}
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
///
/// Provider endpoints return results directly, so redirects are never followed. Configure
/// any custom [`ReqwestClient`] the same way.
#[derive(Clone)]
pub struct ReqwestHttpClient(pub ReqwestClient);
impl ReqwestHttpClient {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	/// Builds a client honoring an SSL configuration; `None` uses platform trust.
	pub fn from_ssl(id: &str, ssl: Option<&SslConfigDocument>) -> Result<Self, ConfigError> {
		let invalid = |source: ReqwestError| ConfigError::InvalidSslConfig {
			id: id.to_owned(),
			source: Box::new(source),
		};
		let mut builder = ReqwestClient::builder().redirect(Policy::none()).timeout(DEFAULT_TIMEOUT);

		if let Some(ssl) = ssl {
			if let Some(millis) = ssl.timeout_millis {
				builder = builder.timeout(std::time::Duration::from_millis(millis));
			}
			if ssl.trust_all {
				builder = builder.danger_accept_invalid_certs(true).danger_accept_invalid_hostnames(true);
			}

			for pem in &ssl.trusted_certificates {
				builder = builder.add_root_certificate(Certificate::from_pem(pem.as_bytes()).map_err(invalid)?);
			}
		}

		builder.build().map(Self).map_err(invalid)
	}

	/// Sends `request` and buffers the response; transport failures are classified against
	/// `target`.
	pub async fn fetch(&self, target: &Url, request: RequestBuilder) -> Result<HttpReply, TransportError> {
		let response =
			request.send().await.map_err(|e| TransportError::from_reqwest(target.as_str(), e))?;
		let status = response.status().as_u16();
		let body = response
			.bytes()
			.await
			.map_err(|e| TransportError::from_reqwest(target.as_str(), e))?
			.to_vec();

		Ok(HttpReply { status, body })
	}

	pub(crate) fn instrumented(&self, slot: ResponseMetadataSlot) -> InstrumentedHandle {
		InstrumentedHandle::new(self.0.clone(), slot)
	}
}
impl AsRef<ReqwestClient> for ReqwestHttpClient {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
impl Deref for ReqwestHttpClient {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
impl Debug for ReqwestHttpClient {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("ReqwestHttpClient(..)")
	}
}

/// Instrumented adapter that implements [`AsyncHttpClient`] for reqwest.
pub(crate) struct InstrumentedHttpClient {
	client: ReqwestClient,
	slot: ResponseMetadataSlot,
}
impl InstrumentedHttpClient {
	fn new(client: ReqwestClient, slot: ResponseMetadataSlot) -> Self {
		Self { client, slot }
	}
}

/// Handle returned by [`ReqwestHttpClient`] that satisfies [`TokenHttpClient`].
#[derive(Clone)]
pub struct InstrumentedHandle(Arc<InstrumentedHttpClient>);
impl InstrumentedHandle {
	fn new(client: ReqwestClient, slot: ResponseMetadataSlot) -> Self {
		Self(Arc::new(InstrumentedHttpClient::new(client, slot)))
	}
}
impl<'c> AsyncHttpClient<'c> for InstrumentedHandle {
	type Error = HttpClientError<ReqwestError>;
	type Future =
		Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send + Sync>>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		let client = Arc::clone(&self.0);

		Box::pin(async move {
			client.slot.take();

			let response = client
				.client
				.execute(request.try_into().map_err(Box::new)?)
				.await
				.map_err(Box::new)?;
			let status = response.status();
			let headers = response.headers().to_owned();

			client.slot.store(ResponseMetadata { status: Some(status.as_u16()) });

			let mut response_new =
				HttpResponse::new(response.bytes().await.map_err(Box::new)?.to_vec());

			*response_new.status_mut() = status;
			*response_new.headers_mut() = headers;

			Ok(response_new)
		})
	}
}
impl TokenHttpClient for ReqwestHttpClient {
	type Handle = InstrumentedHandle;
	type TransportError = ReqwestError;

	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle {
		self.instrumented(slot)
	}
}

/// HTTP clients of one configuration generation, keyed by SSL configuration id.
#[derive(Clone, Debug)]
pub struct HttpClients {
	default: ReqwestHttpClient,
	by_ref: HashMap<String, ReqwestHttpClient>,
}
impl HttpClients {
	/// Builds the platform-trust client plus one client per SSL configuration.
	pub fn build(ssl: &BTreeMap<String, SslConfigDocument>) -> Result<Self, ConfigError> {
		let default = ReqwestHttpClient::from_ssl("default", None)?;
		let by_ref = ssl
			.iter()
			.map(|(id, doc)| Ok((id.clone(), ReqwestHttpClient::from_ssl(id, Some(doc))?)))
			.collect::<Result<_, ConfigError>>()?;

		Ok(Self { default, by_ref })
	}

	/// Uses `client` for every SSL configuration.
	pub fn uniform(client: ReqwestHttpClient) -> Self {
		Self { default: client, by_ref: HashMap::new() }
	}

	/// Returns true when an SSL configuration with this id exists.
	pub fn contains(&self, ssl_ref: &str) -> bool {
		self.by_ref.contains_key(ssl_ref)
	}

	/// Resolves the client for an `sslRef`; absent or unknown references use platform trust.
	pub fn get(&self, ssl_ref: Option<&str>) -> &ReqwestHttpClient {
		ssl_ref.and_then(|id| self.by_ref.get(id)).unwrap_or(&self.default)
	}
}
