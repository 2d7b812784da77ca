//! Client-level error types shared across the request pipeline, refresh
//! coordinator, and transport adapters.

// self
use crate::{
	_prelude::*,
	http::{TransportError, TransportResponse},
};

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical client error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// The request was aborted by the caller; never retried.
	#[error("Request was cancelled by the caller.")]
	Cancelled,
	/// Token refresh could not be performed or was rejected; never retried via backoff.
	#[error(transparent)]
	Auth(#[from] AuthError),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Terminal transport or application failure after exhausting the retry budget.
	#[error(transparent)]
	Request(#[from] Box<RequestError>),
}
impl Error {
	/// Wraps a terminal transport failure into [`Error::Request`].
	pub fn request(source: TransportError) -> Self {
		Self::Request(Box::new(RequestError::from_transport(source)))
	}

	/// Returns `true` when the error is the cancellation variant.
	pub fn is_cancelled(&self) -> bool {
		matches!(self, Self::Cancelled)
	}
}

/// Authentication and token refresh failures.
///
/// The variants are [`Clone`] so a single in-flight refresh can fan the same
/// failure out to every request awaiting it.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum AuthError {
	/// Multi-token mode requires a refresh endpoint before a 401 can be recovered.
	#[error("No refresh endpoint is configured.")]
	MissingRefreshEndpoint,
	/// No refresh token is available via callbacks or the token store.
	#[error("No refresh token is available.")]
	MissingRefreshToken,
	/// The refresh endpoint responded without an access token.
	#[error("Refresh response is missing an access token.")]
	MissingAccessToken,
	/// The refresh exchange itself failed.
	#[error("Token refresh exchange failed: {message}.")]
	Exchange {
		/// Transport- or endpoint-supplied message summarizing the failure.
		message: String,
		/// HTTP status code, when the endpoint produced one.
		status: Option<u16>,
	},
}

/// Configuration and validation failures raised by the client.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// The client has been destroyed and no longer accepts requests.
	#[error("Client has been destroyed.")]
	Destroyed,
	/// HTTP transport could not be constructed.
	#[error("HTTP transport could not be constructed.")]
	TransportBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// The request path cannot be joined onto the configured base URL.
	#[error("Base URL cannot be joined with `{path}`.")]
	InvalidUrl {
		/// Path supplied in the request options.
		path: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn transport_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::TransportBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<reqwest::Error> for ConfigError {
	fn from(e: reqwest::Error) -> Self {
		Self::transport_build(e)
	}
}

/// Terminal request failure carrying the underlying transport error, the error
/// response (if one was received), and a stable transport code label.
#[derive(Debug, ThisError)]
#[error("{message}")]
pub struct RequestError {
	/// Human-readable failure summary.
	pub message: String,
	/// Stable transport code label (`timeout`, `network`, `status`, ...).
	pub code: Option<String>,
	/// Response received from the server, when the failure carried one.
	pub response: Option<TransportResponse>,
	/// Underlying transport failure.
	#[source]
	pub source: TransportError,
}
impl RequestError {
	/// Builds a [`RequestError`] from a transport failure, lifting the error
	/// response and code label out of it.
	pub fn from_transport(source: TransportError) -> Self {
		Self {
			message: source.to_string(),
			code: Some(source.kind().as_str().into()),
			response: source.response(),
			source,
		}
	}

	/// HTTP status of the error response, when one was received.
	pub fn status(&self) -> Option<u16> {
		self.source.status()
	}
}
