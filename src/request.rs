//! Inbound request model and the dispositions flows hand back to the caller.
//!
//! The engine never touches a servlet or socket: adapters translate their framework's request
//! into [`InboundRequest`] and turn a [`Disposition`] back into an HTTP response.

// std
use std::net::IpAddr;
// crates.io
use oauth2::http::{HeaderMap, HeaderName, HeaderValue, Method, header::AUTHORIZATION};
// self
use crate::{_prelude::*, auth::Authentication, flows::FlowState};

/// Protected-resource or redirect-endpoint request as seen by the engine.
#[derive(Clone, Debug)]
pub struct InboundRequest {
	/// HTTP method.
	pub method: Method,
	/// Full request URL, including the query string.
	pub url: Url,
	/// Request headers.
	pub headers: HeaderMap,
	/// Remote peer address, when known.
	pub remote_addr: Option<IpAddr>,
	/// URL-encoded form body parameters (`form_post` callbacks).
	pub form: Vec<(String, String)>,
}
impl InboundRequest {
	/// Creates a `GET` request.
	pub fn get(url: Url) -> Self {
		Self {
			method: Method::GET,
			url,
			headers: HeaderMap::new(),
			remote_addr: None,
			form: Vec::new(),
		}
	}

	/// Creates a `POST` request carrying a URL-encoded form body.
	pub fn post_form<I, K, V>(url: Url, form: I) -> Self
	where
		I: IntoIterator<Item = (K, V)>,
		K: Into<String>,
		V: Into<String>,
	{
		Self {
			method: Method::POST,
			form: form.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
			..Self::get(url)
		}
	}

	/// Adds a header. Names or values that are not valid HTTP are ignored.
	pub fn with_header(mut self, name: &str, value: &str) -> Self {
		if let (Ok(name), Ok(value)) =
			(HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value))
		{
			self.headers.append(name, value);
		}

		self
	}

	/// Sets the remote peer address.
	pub fn with_remote_addr(mut self, addr: IpAddr) -> Self {
		self.remote_addr = Some(addr);

		self
	}

	/// Returns the first value of a header as text.
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers.get(name).and_then(|value| value.to_str().ok())
	}

	/// Returns the first query parameter with the given name.
	pub fn query_param(&self, name: &str) -> Option<String> {
		self.url.query_pairs().find(|(k, _)| k == name).map(|(_, v)| v.into_owned())
	}

	/// Returns a parameter from the form body, falling back to the query string.
	pub fn param(&self, name: &str) -> Option<String> {
		self.form
			.iter()
			.find(|(k, _)| k == name)
			.map(|(_, v)| v.clone())
			.or_else(|| self.query_param(name))
	}

	/// Returns true when the request carries any of the named parameters.
	pub fn has_any_param(&self, names: &[&str]) -> bool {
		names.iter().any(|name| self.param(name).is_some())
	}

	/// Origin (`scheme://host[:port]`) the request was addressed to.
	pub fn origin(&self) -> Url {
		let mut origin = self.url.clone();

		origin.set_path("");
		origin.set_query(None);
		origin.set_fragment(None);

		origin
	}

	/// Extracts the access token from the configured header.
	///
	/// For `Authorization` the `Bearer` scheme is required; any other header carries the raw
	/// token. Returns `None` when the header is absent or has no usable token.
	pub fn access_token(&self, header_name: &str) -> Option<String> {
		let value = self.header(header_name)?.trim();

		if header_name.eq_ignore_ascii_case(AUTHORIZATION.as_str()) {
			let (scheme, token) = value.split_once(' ')?;

			return (scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty())
				.then(|| token.trim().to_owned());
		}

		(!value.is_empty()).then(|| value.to_owned())
	}
}

/// What the caller should do with the request.
#[derive(Debug)]
pub enum Disposition {
	/// Send a `302` redirect to the provider's authorization endpoint.
	Redirect {
		/// Authorization request URL.
		location: Url,
	},
	/// Serve an HTML page that relays the URL fragment back to the redirect endpoint.
	ClientSideRedirect {
		/// Page markup.
		html: String,
	},
	/// The caller is authenticated.
	Authenticated(Box<Authentication>),
	/// The provider does not apply; fall through to the next authentication mechanism.
	NotApplicable,
	/// Authentication failed.
	Failed(FlowFailure),
}
impl Disposition {
	/// Returns the authentication when the flow succeeded.
	pub fn authentication(&self) -> Option<&Authentication> {
		match self {
			Self::Authenticated(authentication) => Some(authentication),
			_ => None,
		}
	}

	/// Returns the failure when the flow failed.
	pub fn failure(&self) -> Option<&FlowFailure> {
		match self {
			Self::Failed(failure) => Some(failure),
			_ => None,
		}
	}

	/// HTTP status the caller should answer with.
	pub fn status(&self) -> u16 {
		match self {
			Self::Redirect { .. } => 302,
			Self::ClientSideRedirect { .. } | Self::Authenticated(_) => 200,
			Self::NotApplicable => 401,
			Self::Failed(failure) => failure.status,
		}
	}
}

/// Failed flow: the surfaced status, the cause, and the states the flow passed through.
#[derive(Debug)]
pub struct FlowFailure {
	/// HTTP status to surface.
	pub status: u16,
	/// Root cause.
	pub error: Error,
	/// States visited before the failure, ending with the state that failed.
	pub states: Vec<FlowState>,
}
impl FlowFailure {
	/// State in which the flow failed.
	pub fn failed_in(&self) -> Option<FlowState> {
		self.states.last().copied()
	}
}

/// Builds the page that relays an implicit response fragment to the redirect endpoint as a
/// `form_post` submission.
pub fn client_side_redirect_page(redirect_uri: &Url) -> String {
	let action = html_escape(redirect_uri.as_str());

	format!(
		r#"<!DOCTYPE html>
<html>
<head><title>Redirecting</title></head>
<body>
<form id="relay" method="post" action="{action}"></form>
<script>
(function () {{
	var form = document.getElementById("relay");
	var params = new URLSearchParams(window.location.hash.substring(1));
	params.forEach(function (value, name) {{
		var input = document.createElement("input");
		input.type = "hidden";
		input.name = name;
		input.value = value;
		form.appendChild(input);
	}});
	form.submit();
}})();
</script>
<noscript>JavaScript is required to complete the sign-in.</noscript>
</body>
</html>
"#
	)
}

fn html_escape(value: &str) -> String {
	value
		.replace('&', "&amp;")
		.replace('"', "&quot;")
		.replace('<', "&lt;")
		.replace('>', "&gt;")
}
