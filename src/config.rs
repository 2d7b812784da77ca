//! Per-backend client configuration.

// self
use crate::{
	_prelude::*,
	auth::{RefreshTokens, TokenCallbacks},
	error::{AuthError, RequestError},
	http::TransportResponse,
	observe::ToastHandler,
};

/// Default timeout applied to the refresh exchange.
pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(10);

/// Observer invoked with the new token pair after every successful refresh.
pub type RefreshHook = Arc<dyn Fn(&RefreshTokens) + Send + Sync>;
/// Observer invoked when the refresh exchange fails.
pub type RefreshFailHook = Arc<dyn Fn(&AuthError) + Send + Sync>;
/// Last-chance handler that may convert a terminal failure into a synthetic
/// response; returning `None` lets the original error propagate.
pub type ErrorHandler = Arc<
	dyn for<'a> Fn(
			&'a RequestError,
		) -> Pin<Box<dyn Future<Output = Option<TransportResponse>> + 'a + Send>>
		+ Send
		+ Sync,
>;

/// Configuration identifying one logical backend.
///
/// Created once per backend and handed to [`Client::new`](crate::client::Client::new);
/// token fields move into the client's [`TokenStore`](crate::auth::TokenStore)
/// where the refresh coordinator may update them in place.
#[derive(Clone)]
pub struct ClientConfig {
	/// Base URL request paths are joined onto.
	pub base_url: Url,
	/// Static bearer token used in single-token mode.
	pub token: Option<String>,
	/// Enables the refreshable access/refresh token pair.
	pub multi_token: bool,
	/// Initial access token seed for multi-token mode.
	pub access_token: Option<String>,
	/// Initial refresh token seed for multi-token mode.
	pub refresh_token: Option<String>,
	/// Refresh endpoint path joined onto the base URL.
	pub refresh_endpoint: Option<String>,
	/// Timeout bounding the refresh exchange.
	pub refresh_timeout: Duration,
	/// Caller-owned token storage callbacks.
	pub token_callbacks: Option<TokenCallbacks>,
	/// Observer invoked after every successful refresh.
	pub on_refresh: Option<RefreshHook>,
	/// Observer invoked when a refresh fails.
	pub on_refresh_fail: Option<RefreshFailHook>,
	/// Last-chance terminal-error handler.
	pub error_handler: Option<ErrorHandler>,
	/// Toast handler used when a request enables success/error toasts.
	pub toast_handler: Option<ToastHandler>,
}
impl ClientConfig {
	/// Creates a configuration for the given base URL.
	pub fn new(base_url: Url) -> Self {
		Self {
			base_url,
			token: None,
			multi_token: false,
			access_token: None,
			refresh_token: None,
			refresh_endpoint: None,
			refresh_timeout: DEFAULT_REFRESH_TIMEOUT,
			token_callbacks: None,
			on_refresh: None,
			on_refresh_fail: None,
			error_handler: None,
			toast_handler: None,
		}
	}

	/// Sets a static long-lived bearer token (single-token mode).
	pub fn with_token(mut self, token: impl Into<String>) -> Self {
		self.token = Some(token.into());

		self
	}

	/// Switches to multi-token mode with optional seeds.
	pub fn with_multi_token(
		mut self,
		access_token: Option<String>,
		refresh_token: Option<String>,
	) -> Self {
		self.multi_token = true;
		self.access_token = access_token;
		self.refresh_token = refresh_token;

		self
	}

	/// Sets the refresh endpoint path.
	pub fn with_refresh_endpoint(mut self, endpoint: impl Into<String>) -> Self {
		self.refresh_endpoint = Some(endpoint.into());

		self
	}

	/// Overrides the refresh exchange timeout (defaults to 10 seconds).
	pub fn with_refresh_timeout(mut self, timeout: Duration) -> Self {
		self.refresh_timeout = timeout;

		self
	}

	/// Installs caller-owned token storage callbacks.
	pub fn with_token_callbacks(mut self, callbacks: TokenCallbacks) -> Self {
		self.token_callbacks = Some(callbacks);

		self
	}

	/// Installs the post-refresh observer.
	pub fn with_on_refresh(mut self, hook: RefreshHook) -> Self {
		self.on_refresh = Some(hook);

		self
	}

	/// Installs the refresh-failure observer.
	pub fn with_on_refresh_fail(mut self, hook: RefreshFailHook) -> Self {
		self.on_refresh_fail = Some(hook);

		self
	}

	/// Installs the last-chance terminal-error handler.
	pub fn with_error_handler(mut self, handler: ErrorHandler) -> Self {
		self.error_handler = Some(handler);

		self
	}

	/// Installs the toast handler.
	pub fn with_toast_handler(mut self, handler: ToastHandler) -> Self {
		self.toast_handler = Some(handler);

		self
	}
}
impl Debug for ClientConfig {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ClientConfig")
			.field("base_url", &self.base_url.as_str())
			.field("multi_token", &self.multi_token)
			.field("refresh_endpoint", &self.refresh_endpoint)
			.field("refresh_timeout", &self.refresh_timeout)
			.finish()
	}
}
