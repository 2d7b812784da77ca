//! Transport primitives for executing HTTP requests.
//!
//! The module exposes [`TransportPort`] alongside [`TransportRequest`],
//! [`TransportResponse`], and [`TransportError`] so downstream crates can plug
//! in custom HTTP stacks without losing the pipeline's cancellation and
//! progress semantics. The trait is the crate's only dependency on an HTTP
//! implementation; a reqwest-backed adapter ships behind the default
//! `reqwest` feature.

// crates.io
#[cfg(feature = "reqwest")] use futures_util::StreamExt;
// self
use crate::{
	_prelude::*,
	request::{FormValue, Method, RequestBody, ResponseMode},
};

/// Boxed future returned by [`TransportPort::send`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<TransportResponse, TransportError>> + 'a + Send>>;
/// Byte-progress callback invoked by transports on every progress event.
pub type ProgressSink = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Upload chunk size used when a progress sink forces a streamed request body.
#[cfg(feature = "reqwest")] const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// Abstraction over HTTP transports capable of executing one request.
///
/// Implementations must honor the descriptor's timeout, surface cancellation
/// through the [`TransportError::is_cancelled`] shape when the abort handle
/// fires, and invoke the progress sinks on every byte-progress event rather
/// than only at completion.
pub trait TransportPort
where
	Self: 'static + Send + Sync,
{
	/// Executes the request, returning the response or a structured failure.
	///
	/// Non-2xx statuses are failures: they surface as [`TransportError`] values
	/// whose [`kind`](TransportError::kind) is [`TransportErrorKind::Status`]
	/// and which retain the parsed error body for downstream inspection.
	fn send(&self, request: TransportRequest) -> TransportFuture<'_>;
}

/// Transport-level request descriptor produced by the pipeline.
#[derive(Clone)]
pub struct TransportRequest {
	/// HTTP method.
	pub method: Method,
	/// Absolute request URL (base URL already joined).
	pub url: Url,
	/// Header map; later pipeline stages override earlier defaults by key.
	pub headers: HashMap<String, String>,
	/// Query parameters appended to the URL, repeated keys allowed.
	pub query: Vec<(String, String)>,
	/// Request body.
	pub body: RequestBody,
	/// Parsing mode applied to the response body.
	pub response_mode: ResponseMode,
	/// Timeout covering the whole exchange including body transfer.
	pub timeout: Duration,
	/// Upload byte-progress sink.
	pub on_upload_progress: Option<ProgressSink>,
	/// Download byte-progress sink.
	pub on_download_progress: Option<ProgressSink>,
	/// Cooperative cancellation handle.
	pub abort: Option<AbortHandle>,
}
impl Debug for TransportRequest {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TransportRequest")
			.field("method", &self.method)
			.field("url", &self.url.as_str())
			.field("timeout", &self.timeout)
			.finish()
	}
}

/// Cooperative cancellation handle shared between the caller and the transport.
///
/// Aborting is advisory: the transport observes it at call boundaries, and the
/// retry loop checks it before every resend. Aborting with no in-flight call is
/// a no-op.
#[derive(Clone, Debug, Default)]
pub struct AbortHandle(tokio_util::sync::CancellationToken);
impl AbortHandle {
	/// Creates a fresh handle.
	pub fn new() -> Self {
		Self::default()
	}

	/// Requests cancellation of the call this handle is wired into.
	pub fn abort(&self) {
		self.0.cancel();
	}

	/// Returns `true` once [`abort`](Self::abort) has been called.
	pub fn is_aborted(&self) -> bool {
		self.0.is_cancelled()
	}

	/// Resolves when the handle is aborted; resolves immediately if it already was.
	pub async fn cancelled(&self) {
		self.0.cancelled().await
	}
}

/// One byte-progress observation reported by a transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProgressEvent {
	/// Bytes transferred so far.
	pub loaded: u64,
	/// Total bytes expected, when known.
	pub total: Option<u64>,
}
impl ProgressEvent {
	/// Integer completion percentage, `round(loaded * 100 / max(total, 1))`,
	/// clamped at 100.
	pub fn percent(&self) -> u8 {
		let total = self.total.unwrap_or(0).max(1);
		let percent = ((self.loaded as f64 * 100.) / total as f64).round() as u64;

		percent.min(100) as u8
	}
}

/// Response returned by a transport on success (2xx).
#[derive(Clone, Debug)]
pub struct TransportResponse {
	/// HTTP status code.
	pub status: u16,
	/// Response headers, lossily decoded to UTF-8.
	pub headers: HashMap<String, String>,
	/// Parsed response body.
	pub body: ResponseBody,
}
impl TransportResponse {
	/// Returns the JSON body, when the response was parsed as JSON.
	pub fn json(&self) -> Option<&serde_json::Value> {
		match &self.body {
			ResponseBody::Json(value) => Some(value),
			_ => None,
		}
	}

	/// Extracts a `message` string field from a JSON body, when present.
	pub fn message(&self) -> Option<&str> {
		self.body.message()
	}

	/// Deserializes the body into `T`, reporting the JSON path on failure.
	pub fn deserialize<T>(&self) -> Result<T, TransportError>
	where
		T: serde::de::DeserializeOwned,
	{
		let status = Some(self.status);

		match &self.body {
			ResponseBody::Json(value) => serde_path_to_error::deserialize(value.clone())
				.map_err(|e| TransportError::decode(e, status)),
			ResponseBody::Text(text) => {
				let mut de = serde_json::Deserializer::from_str(text);

				serde_path_to_error::deserialize(&mut de)
					.map_err(|e| TransportError::decode(e, status))
			},
			ResponseBody::Bytes(bytes) => {
				let mut de = serde_json::Deserializer::from_slice(bytes);

				serde_path_to_error::deserialize(&mut de)
					.map_err(|e| TransportError::decode(e, status))
			},
			ResponseBody::Empty =>
				Err(TransportError::new(TransportErrorKind::Decode, "Response body is empty", status)),
		}
	}
}

/// Parsed response payload.
#[derive(Clone, Debug, PartialEq)]
pub enum ResponseBody {
	/// No payload (e.g. 204 or an empty body in JSON mode).
	Empty,
	/// JSON payload.
	Json(serde_json::Value),
	/// Text payload.
	Text(String),
	/// Raw bytes payload.
	Bytes(Vec<u8>),
}
impl ResponseBody {
	/// Extracts a `message` string field from a JSON payload, when present.
	pub fn message(&self) -> Option<&str> {
		match self {
			Self::Json(value) => value.get("message").and_then(serde_json::Value::as_str),
			_ => None,
		}
	}
}

/// Stable classification of transport failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportErrorKind {
	/// The abort handle fired before the exchange completed.
	Cancelled,
	/// The per-request timeout elapsed.
	Timeout,
	/// DNS, TCP, or TLS level failure.
	Network,
	/// The server responded with a non-2xx status.
	Status,
	/// The response body could not be decoded in the requested mode.
	Decode,
}
impl TransportErrorKind {
	/// Returns a stable label suitable for error codes and metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Cancelled => "cancelled",
			Self::Timeout => "timeout",
			Self::Network => "network",
			Self::Status => "status",
			Self::Decode => "decode",
		}
	}
}

/// Structured transport failure.
#[derive(Debug, ThisError)]
#[error("{message}")]
pub struct TransportError {
	kind: TransportErrorKind,
	message: String,
	status: Option<u16>,
	response: Option<Box<TransportResponse>>,
	#[source]
	source: Option<crate::error::BoxError>,
}
impl TransportError {
	pub(crate) fn new(
		kind: TransportErrorKind,
		message: impl Into<String>,
		status: Option<u16>,
	) -> Self {
		Self { kind, message: message.into(), status, response: None, source: None }
	}

	/// Builds the cancellation shape.
	pub fn cancelled() -> Self {
		Self::new(TransportErrorKind::Cancelled, "Request was aborted", None)
	}

	/// Builds the timeout shape.
	pub fn timeout() -> Self {
		Self::new(TransportErrorKind::Timeout, "Request timed out", None)
	}

	/// Wraps a transport-specific network failure.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		let mut e = Self::new(TransportErrorKind::Network, "Network error occurred while sending the request", None);

		e.source = Some(Box::new(src));

		e
	}

	/// Builds the non-2xx status shape, retaining the error response.
	pub fn from_status(status: u16, headers: HashMap<String, String>, body: ResponseBody) -> Self {
		Self {
			kind: TransportErrorKind::Status,
			message: format!("Server responded with HTTP status {status}"),
			status: Some(status),
			response: Some(Box::new(TransportResponse { status, headers, body })),
			source: None,
		}
	}

	/// Wraps a body-decoding failure.
	pub fn decode(src: impl 'static + Send + Sync + std::error::Error, status: Option<u16>) -> Self {
		let mut e = Self::new(TransportErrorKind::Decode, "Response body could not be decoded", status);

		e.source = Some(Box::new(src));

		e
	}

	/// Failure classification.
	pub fn kind(&self) -> TransportErrorKind {
		self.kind
	}

	/// Returns `true` for the cancellation shape.
	pub fn is_cancelled(&self) -> bool {
		self.kind == TransportErrorKind::Cancelled
	}

	/// HTTP status code, when the server produced one.
	pub fn status(&self) -> Option<u16> {
		self.status
	}

	/// Parsed error body, when the failure carried one.
	pub fn body(&self) -> Option<&ResponseBody> {
		self.response.as_ref().map(|response| &response.body)
	}

	/// The error response, when the failure carried one.
	pub fn response(&self) -> Option<TransportResponse> {
		self.response.as_deref().cloned()
	}
}

/// Thin wrapper around [`ReqwestClient`] implementing [`TransportPort`].
///
/// The adapter honors per-request timeouts through reqwest's request-level
/// timeout (covering the response body), streams request bodies when an upload
/// progress sink is attached, and streams every response body so download
/// progress fires per chunk.
#[cfg(feature = "reqwest")]
#[derive(Clone)]
pub struct ReqwestTransport(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Builds an adapter over a default reqwest client.
	pub fn new() -> Result<Self, crate::error::ConfigError> {
		Ok(Self(ReqwestClient::builder().build()?))
	}

	/// Wraps an existing [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	async fn dispatch(
		client: ReqwestClient,
		request: TransportRequest,
	) -> Result<TransportResponse, TransportError> {
		let method = match request.method {
			Method::Get => reqwest::Method::GET,
			Method::Post => reqwest::Method::POST,
			Method::Put => reqwest::Method::PUT,
			Method::Patch => reqwest::Method::PATCH,
			Method::Delete => reqwest::Method::DELETE,
			Method::Head => reqwest::Method::HEAD,
			Method::Options => reqwest::Method::OPTIONS,
		};
		let mut builder = client.request(method, request.url.clone()).timeout(request.timeout);

		if !request.query.is_empty() {
			builder = builder.query(&request.query);
		}

		for (name, value) in &request.headers {
			builder = builder.header(name, value);
		}

		builder = match request.body {
			RequestBody::Empty => builder,
			RequestBody::Json(value) => {
				let bytes = serde_json::to_vec(&value)
					.map_err(|e| TransportError::decode(e, None))?;

				builder.body(progress_body(bytes, request.on_upload_progress.clone()))
			},
			RequestBody::Bytes(bytes) =>
				builder.body(progress_body(bytes, request.on_upload_progress.clone())),
			RequestBody::Form(parts) => {
				let mut form = reqwest::multipart::Form::new();

				for part in parts {
					form = match part.value {
						FormValue::Text(text) => form.text(part.name, text),
						FormValue::File { data, file_name, mime } => {
							let mut piece =
								reqwest::multipart::Part::bytes(data).file_name(file_name);

							if let Some(mime) = mime {
								piece = piece.mime_str(&mime).map_err(TransportError::network)?;
							}

							form.part(part.name, piece)
						},
					};
				}

				builder.multipart(form)
			},
		};

		let response = builder.send().await.map_err(map_reqwest_error)?;
		let status = response.status().as_u16();
		let headers = response
			.headers()
			.iter()
			.map(|(name, value)| {
				(name.as_str().to_owned(), String::from_utf8_lossy(value.as_bytes()).into_owned())
			})
			.collect::<HashMap<_, _>>();
		let total = response.content_length();
		let mut stream = response.bytes_stream();
		let mut buf = Vec::new();

		while let Some(chunk) = stream.next().await {
			let chunk = chunk.map_err(map_reqwest_error)?;

			buf.extend_from_slice(&chunk);

			if let Some(sink) = &request.on_download_progress {
				sink(ProgressEvent { loaded: buf.len() as u64, total });
			}
		}

		if !(200..300).contains(&status) {
			return Err(TransportError::from_status(status, headers, lenient_body(&buf)));
		}

		let body = match request.response_mode {
			ResponseMode::Bytes => ResponseBody::Bytes(buf),
			ResponseMode::Text => ResponseBody::Text(String::from_utf8_lossy(&buf).into_owned()),
			ResponseMode::Json =>
				if buf.is_empty() {
					ResponseBody::Empty
				} else {
					serde_json::from_slice(&buf)
						.map(ResponseBody::Json)
						.map_err(|e| TransportError::decode(e, Some(status)))?
				},
		};

		Ok(TransportResponse { status, headers, body })
	}
}
#[cfg(feature = "reqwest")]
impl TransportPort for ReqwestTransport {
	fn send(&self, request: TransportRequest) -> TransportFuture<'_> {
		let client = self.0.clone();

		Box::pin(async move {
			let abort = request.abort.clone();
			let exchange = Self::dispatch(client, request);

			match abort {
				Some(handle) => tokio::select! {
					_ = handle.cancelled() => Err(TransportError::cancelled()),
					result = exchange => result,
				},
				None => exchange.await,
			}
		})
	}
}

/// Parses an error-response payload leniently: JSON when possible, text otherwise.
#[cfg(feature = "reqwest")]
fn lenient_body(bytes: &[u8]) -> ResponseBody {
	if bytes.is_empty() {
		return ResponseBody::Empty;
	}

	serde_json::from_slice(bytes)
		.map(ResponseBody::Json)
		.unwrap_or_else(|_| ResponseBody::Text(String::from_utf8_lossy(bytes).into_owned()))
}

#[cfg(feature = "reqwest")]
fn map_reqwest_error(e: ReqwestError) -> TransportError {
	if e.is_timeout() {
		TransportError::timeout()
	} else {
		TransportError::network(e)
	}
}

#[cfg(feature = "reqwest")]
fn progress_body(bytes: Vec<u8>, sink: Option<ProgressSink>) -> reqwest::Body {
	let Some(sink) = sink else {
		return reqwest::Body::from(bytes);
	};
	let total = bytes.len() as u64;
	let chunks = bytes.chunks(UPLOAD_CHUNK_SIZE.max(1)).map(<[u8]>::to_vec).collect::<Vec<_>>();
	let mut sent = 0_u64;
	let stream = futures_util::stream::iter(chunks.into_iter().map(move |chunk| {
		sent += chunk.len() as u64;

		sink(ProgressEvent { loaded: sent, total: Some(total) });

		Ok::<_, std::io::Error>(chunk)
	}));

	reqwest::Body::wrap_stream(stream)
}
