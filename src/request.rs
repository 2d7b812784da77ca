//! One-shot request descriptions submitted to the client.

// std
use std::fmt::Write;
// self
use crate::{
	_prelude::*,
	observe::ToastKind,
};

/// Default timeout applied to ordinary requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(100);
/// Default timeout applied to multipart uploads.
pub const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(120);
/// Content type applied when the options leave it unset.
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// Integer-percentage progress callback supplied by the caller.
pub type PercentSink = Arc<dyn Fn(u8) + Send + Sync>;
/// Hook invoked when a cancelable request is aborted.
pub type CancelHook = Arc<dyn Fn() + Send + Sync>;

/// HTTP method of a request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Method {
	/// GET.
	#[default]
	Get,
	/// POST.
	Post,
	/// PUT.
	Put,
	/// PATCH.
	Patch,
	/// DELETE.
	Delete,
	/// HEAD.
	Head,
	/// OPTIONS.
	Options,
}
impl Method {
	/// Returns the canonical uppercase method name.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Get => "GET",
			Self::Post => "POST",
			Self::Put => "PUT",
			Self::Patch => "PATCH",
			Self::Delete => "DELETE",
			Self::Head => "HEAD",
			Self::Options => "OPTIONS",
		}
	}
}
impl Display for Method {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Parsing mode applied to response bodies.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResponseMode {
	/// Parse as JSON (empty bodies become [`ResponseBody::Empty`](crate::http::ResponseBody)).
	#[default]
	Json,
	/// Keep the body as text.
	Text,
	/// Keep the body as raw bytes.
	Bytes,
}

/// Request payload.
#[derive(Clone, Debug, Default)]
pub enum RequestBody {
	/// No payload.
	#[default]
	Empty,
	/// JSON payload.
	Json(serde_json::Value),
	/// Raw bytes payload.
	Bytes(Vec<u8>),
	/// Multipart form payload.
	Form(Vec<FormPart>),
}

/// One field of a multipart form.
#[derive(Clone, Debug)]
pub struct FormPart {
	/// Field name.
	pub name: String,
	/// Field payload.
	pub value: FormValue,
}
impl FormPart {
	/// Builds a text field.
	pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
		Self { name: name.into(), value: FormValue::Text(value.into()) }
	}

	/// Builds a file field from raw bytes.
	pub fn file(name: impl Into<String>, file_name: impl Into<String>, data: Vec<u8>) -> Self {
		Self {
			name: name.into(),
			value: FormValue::File { data, file_name: file_name.into(), mime: None },
		}
	}
}

/// Payload of one multipart field.
#[derive(Clone, Debug)]
pub enum FormValue {
	/// Plain text value.
	Text(String),
	/// File value with optional content type.
	File {
		/// Raw file bytes.
		data: Vec<u8>,
		/// File name advertised in the part headers.
		file_name: String,
		/// MIME type advertised in the part headers.
		mime: Option<String>,
	},
}

/// One-shot description of a request; immutable once submitted.
#[derive(Clone, Default)]
pub struct RequestOptions {
	/// HTTP method.
	pub method: Method,
	/// Path joined onto the client's base URL (absolute URLs are used as-is).
	pub url: String,
	/// Query parameters.
	pub params: Vec<(String, String)>,
	/// Request payload.
	pub body: RequestBody,
	/// Extra headers merged over the client defaults.
	pub headers: Vec<(String, String)>,
	/// Content type; defaults to [`DEFAULT_CONTENT_TYPE`].
	pub content_type: Option<String>,
	/// Response parsing mode.
	pub response_mode: ResponseMode,
	/// Timeout override; defaults to [`DEFAULT_TIMEOUT`].
	pub timeout: Option<Duration>,
	/// Backoff retry budget; the request is attempted at most `retry + 1` times.
	pub retry: u32,
	/// Creates an abort handle and exposes it to the observer before the call starts.
	pub cancelable: bool,
	/// Hook invoked when the request is aborted.
	pub on_cancel: Option<CancelHook>,
	/// Upload percentage callback.
	pub on_upload_progress: Option<PercentSink>,
	/// Download percentage callback.
	pub on_download_progress: Option<PercentSink>,
	/// Routes a success notification through the configured toast handler.
	pub success_toast: bool,
	/// Routes a failure notification through the configured toast handler.
	pub error_toast: bool,
	/// Overrides the success toast message extracted from the response body.
	pub toast_message: Option<String>,
	/// Kind reported with the success toast.
	pub toast_kind: Option<ToastKind>,
	/// Overrides the error toast message extracted from the failure body.
	pub error_toast_message: Option<String>,
	/// Kind reported with the error toast.
	pub error_toast_kind: Option<ToastKind>,
	/// Serves and stores the response from the client cache with this TTL.
	pub cache_ttl: Option<Duration>,
	/// Overrides the cache/dedup key derived from method, path, and params.
	pub cache_key: Option<String>,
	/// Collapses concurrent identical requests onto one in-flight call.
	pub deduplicate: bool,
}
impl RequestOptions {
	/// Creates options for a GET request.
	pub fn get(url: impl Into<String>) -> Self {
		Self::new(Method::Get, url)
	}

	/// Creates options for a POST request.
	pub fn post(url: impl Into<String>) -> Self {
		Self::new(Method::Post, url)
	}

	/// Creates options for the provided method and path.
	pub fn new(method: Method, url: impl Into<String>) -> Self {
		Self { method, url: url.into(), ..Default::default() }
	}

	/// Attaches a JSON payload.
	pub fn with_json(mut self, value: serde_json::Value) -> Self {
		self.body = RequestBody::Json(value);

		self
	}

	/// Appends a query parameter.
	pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.params.push((name.into(), value.into()));

		self
	}

	/// Appends a custom header.
	pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.push((name.into(), value.into()));

		self
	}

	/// Overrides the response parsing mode.
	pub fn with_response_mode(mut self, mode: ResponseMode) -> Self {
		self.response_mode = mode;

		self
	}

	/// Overrides the request timeout.
	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = Some(timeout);

		self
	}

	/// Sets the backoff retry budget.
	pub fn with_retry(mut self, retry: u32) -> Self {
		self.retry = retry;

		self
	}

	/// Requests an abort handle for this call.
	pub fn cancelable(mut self) -> Self {
		self.cancelable = true;

		self
	}

	/// Installs a cancellation hook.
	pub fn with_on_cancel(mut self, hook: CancelHook) -> Self {
		self.on_cancel = Some(hook);

		self
	}

	/// Enables the success toast, optionally overriding the message.
	pub fn with_success_toast(mut self, message: Option<String>) -> Self {
		self.success_toast = true;
		self.toast_message = message;

		self
	}

	/// Enables the error toast, optionally overriding the message.
	pub fn with_error_toast(mut self, message: Option<String>) -> Self {
		self.error_toast = true;
		self.error_toast_message = message;

		self
	}

	/// Serves and stores the response from the client cache with the given TTL.
	pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
		self.cache_ttl = Some(ttl);

		self
	}

	/// Collapses concurrent identical requests onto one in-flight call.
	pub fn deduplicate(mut self) -> Self {
		self.deduplicate = true;

		self
	}

	/// Key used for caching and deduplication.
	///
	/// Every component is length-prefixed, so parameter names or values that
	/// contain `&` or `=` cannot collide two distinct requests onto one key,
	/// and non-empty bodies take part in the identity.
	pub(crate) fn coalesce_key(&self) -> String {
		if let Some(key) = &self.cache_key {
			return key.clone();
		}

		let mut key = format!("{} {}:{}", self.method, self.url.len(), self.url);

		for (name, value) in &self.params {
			let _ = write!(key, "&{}:{name}={}:{value}", name.len(), value.len());
		}
		match &self.body {
			RequestBody::Empty => {},
			RequestBody::Json(value) => {
				let _ = write!(key, "|json {value}");
			},
			RequestBody::Bytes(bytes) => {
				let _ = write!(key, "|bytes {}:", bytes.len());

				for byte in bytes {
					let _ = write!(key, "{byte:02x}");
				}
			},
			RequestBody::Form(parts) =>
				for part in parts {
					let _ = write!(key, "|part {}:{}=", part.name.len(), part.name);

					match &part.value {
						FormValue::Text(text) => {
							let _ = write!(key, "text {}:{text}", text.len());
						},
						FormValue::File { data, file_name, .. } => {
							let _ =
								write!(key, "file {}:{file_name} {}:", file_name.len(), data.len());

							for byte in data {
								let _ = write!(key, "{byte:02x}");
							}
						},
					}
				},
		}

		key
	}
}
impl Debug for RequestOptions {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RequestOptions")
			.field("method", &self.method)
			.field("url", &self.url)
			.field("retry", &self.retry)
			.field("cancelable", &self.cancelable)
			.finish()
	}
}

/// Options accepted by [`Client::upload`](crate::client::Client::upload).
#[derive(Clone, Default)]
pub struct UploadOptions {
	/// Extra headers merged over the client defaults.
	pub headers: Vec<(String, String)>,
	/// Timeout override; defaults to [`DEFAULT_UPLOAD_TIMEOUT`].
	pub timeout: Option<Duration>,
	/// Creates an abort handle and exposes it to the observer before the call starts.
	pub cancelable: bool,
	/// Hook invoked when the upload is aborted.
	pub on_cancel: Option<CancelHook>,
	/// Upload percentage callback.
	pub on_upload_progress: Option<PercentSink>,
	/// Download percentage callback.
	pub on_download_progress: Option<PercentSink>,
}
impl UploadOptions {
	/// Creates default upload options.
	pub fn new() -> Self {
		Self::default()
	}

	/// Requests an abort handle for this upload.
	pub fn cancelable(mut self) -> Self {
		self.cancelable = true;

		self
	}

	/// Overrides the upload timeout.
	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = Some(timeout);

		self
	}
}
