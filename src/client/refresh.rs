//! Token refresh orchestration with a single-flight guard.
//!
//! The coordinator is an explicit `Idle | Refreshing(shared future)` state
//! machine: the first 401 stores a [`Shared`] refresh future, every concurrent
//! 401 against the same client awaits that same future, and whichever awaiter
//! observes settlement clears the slot so the next 401 starts a fresh attempt.
//! The guarantee is exactly one network call to the refresh endpoint per
//! burst, with every caller receiving the same token pair or the same
//! [`AuthError`].

mod metrics;

pub use metrics::RefreshMetrics;

// self
use crate::{
	_prelude::*,
	auth::{RefreshTokens, TokenSecret, TokenStore},
	config::RefreshHook,
	error::AuthError,
	http::{TransportPort, TransportRequest},
	obs::{self, RequestKind, RequestOutcome, RequestSpan},
	request::{Method, RequestBody, ResponseMode},
};

type SharedRefresh = Shared<BoxFuture<'static, Result<RefreshTokens, AuthError>>>;

/// Hook applying a freshly issued access token to the client's default headers.
pub type ApplyTokenHook = Arc<dyn Fn(Option<&str>) + Send + Sync>;

/// Everything one refresh exchange needs, owned so the shared future is `'static`.
pub(crate) struct RefreshExchange {
	pub transport: Arc<dyn TransportPort>,
	pub base_url: Url,
	pub endpoint: Option<String>,
	pub timeout: Duration,
	pub tokens: Arc<TokenStore>,
	pub apply: ApplyTokenHook,
	pub on_refresh: Option<RefreshHook>,
}

enum RefreshState {
	Idle,
	Refreshing(SharedRefresh),
}

/// Ensures at most one in-flight refresh per client.
pub struct TokenRefreshCoordinator {
	state: Mutex<RefreshState>,
	metrics: Arc<RefreshMetrics>,
}
impl TokenRefreshCoordinator {
	/// Creates an idle coordinator.
	pub fn new() -> Self {
		Self { state: Mutex::new(RefreshState::Idle), metrics: Default::default() }
	}

	/// Shared counters for refresh exchanges.
	pub fn metrics(&self) -> Arc<RefreshMetrics> {
		self.metrics.clone()
	}

	/// Drops any stored refresh future; the next 401 starts from scratch.
	pub fn reset(&self) {
		*self.state.lock() = RefreshState::Idle;
	}

	/// Joins the in-flight refresh, or starts one when idle.
	pub(crate) async fn refresh(&self, exchange: RefreshExchange) -> Result<RefreshTokens, AuthError> {
		let fut = {
			let mut state = self.state.lock();

			match &*state {
				RefreshState::Refreshing(fut) => fut.clone(),
				RefreshState::Idle => {
					let metrics = self.metrics.clone();
					let span = RequestSpan::new(RequestKind::Refresh, "refresh");
					let fut = span
						.instrument(Self::perform(exchange, metrics))
						.boxed()
						.shared();

					*state = RefreshState::Refreshing(fut.clone());

					fut
				},
			}
		};
		let result = fut.clone().await;

		{
			let mut state = self.state.lock();

			// Clear only our own settled future; a newer refresh may already occupy the slot.
			if let RefreshState::Refreshing(current) = &*state
				&& current.ptr_eq(&fut)
			{
				*state = RefreshState::Idle;
			}
		}

		result
	}

	async fn perform(
		exchange: RefreshExchange,
		metrics: Arc<RefreshMetrics>,
	) -> Result<RefreshTokens, AuthError> {
		metrics.record_attempt();
		obs::record_request_outcome(RequestKind::Refresh, RequestOutcome::Attempt);

		let result = Self::exchange(exchange).await;

		match &result {
			Ok(_) => {
				metrics.record_success();
				obs::record_request_outcome(RequestKind::Refresh, RequestOutcome::Success);
			},
			Err(_) => {
				metrics.record_failure();
				obs::record_request_outcome(RequestKind::Refresh, RequestOutcome::Failure);
			},
		}

		result
	}

	async fn exchange(x: RefreshExchange) -> Result<RefreshTokens, AuthError> {
		let endpoint = x.endpoint.ok_or(AuthError::MissingRefreshEndpoint)?;
		let url = x.base_url.join(&endpoint).map_err(|_| AuthError::Exchange {
			message: format!("refresh endpoint `{endpoint}` is not a valid URL"),
			status: None,
		})?;
		let refresh_token = x
			.tokens
			.refresh_token()
			.filter(|token| !token.is_empty())
			.ok_or(AuthError::MissingRefreshToken)?;
		let request = TransportRequest {
			method: Method::Post,
			url,
			headers: HashMap::from([("Content-Type".into(), "application/json".into())]),
			query: Vec::new(),
			body: RequestBody::Json(serde_json::json!({ "refreshToken": refresh_token })),
			response_mode: ResponseMode::Json,
			timeout: x.timeout,
			on_upload_progress: None,
			on_download_progress: None,
			abort: None,
		};
		let response = x.transport.send(request).await.map_err(|e| AuthError::Exchange {
			message: e.to_string(),
			status: e.status(),
		})?;
		let payload = response.deserialize::<RefreshPayload>().map_err(|e| AuthError::Exchange {
			message: e.to_string(),
			status: Some(response.status),
		})?;
		let access_token =
			payload.access_token.filter(|token| !token.is_empty()).ok_or(AuthError::MissingAccessToken)?;
		// A missing rotated token means the endpoint kept the old one valid.
		let rotated_refresh = payload.refresh_token.unwrap_or(refresh_token);

		x.tokens.store_access_token(Some(&access_token));
		x.tokens.store_refresh_token(Some(&rotated_refresh));
		(x.apply)(Some(&access_token));

		let pair = RefreshTokens {
			access_token: TokenSecret::new(access_token),
			refresh_token: TokenSecret::new(rotated_refresh),
		};

		if let Some(hook) = &x.on_refresh {
			hook(&pair);
		}

		Ok(pair)
	}
}
impl Default for TokenRefreshCoordinator {
	fn default() -> Self {
		Self::new()
	}
}
impl Debug for TokenRefreshCoordinator {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let refreshing = matches!(&*self.state.lock(), RefreshState::Refreshing(_));

		f.debug_struct("TokenRefreshCoordinator").field("refreshing", &refreshing).finish()
	}
}

/// Wire shape of the refresh endpoint response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshPayload {
	access_token: Option<String>,
	refresh_token: Option<String>,
}
