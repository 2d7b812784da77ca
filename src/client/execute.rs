//! The request pipeline.
//!
//! Every call walks the same stages: attach the bearer token, hand the
//! descriptor to the transport, recover a 401 through the single-flight
//! refresh coordinator (once), spend the backoff retry budget, and report
//! lifecycle transitions, toasts, and progress along the way. Cancellation
//! takes precedence over every other failure handling stage.

// self
use crate::{
	_prelude::*,
	backoff,
	client::{
		AUTHORIZATION, Client, apply_bearer,
		cache::{PooledFailure, SharedAttempt},
		refresh::RefreshExchange,
	},
	error::RequestError,
	http::{AbortHandle, ProgressEvent, ProgressSink, TransportRequest, TransportResponse},
	obs::{self, RequestKind, RequestOutcome, RequestSpan},
	observe::{StatePatch, StateSink, StateUpdate, ToastKind},
	request::{
		DEFAULT_CONTENT_TYPE, DEFAULT_TIMEOUT, DEFAULT_UPLOAD_TIMEOUT, FormPart, Method,
		PercentSink, RequestBody, RequestOptions, ResponseMode, UploadOptions,
	},
};

const CONTENT_TYPE: &str = "Content-Type";
const FALLBACK_ERROR_MESSAGE: &str = "An error occurred";
const FALLBACK_SUCCESS_MESSAGE: &str = "Request completed successfully";

type Sink = Arc<dyn StateSink>;

impl Client {
	/// Executes a request through the full pipeline.
	pub async fn request(&self, options: RequestOptions) -> Result<TransportResponse> {
		self.request_inner(options, None).await
	}

	/// Executes a request, reporting lifecycle transitions to `sink`.
	///
	/// The sink receives a begin patch (loading, zeroed progress, and the abort
	/// handle when the request is cancelable) before the first attempt, progress
	/// patches while bytes move, and an idle patch on every exit path.
	pub async fn request_with_observer(
		&self,
		options: RequestOptions,
		sink: Sink,
	) -> Result<TransportResponse> {
		self.request_inner(options, Some(sink)).await
	}

	/// Sends a multipart POST in a single attempt.
	///
	/// Uploads skip the cache, the dedup pool, and the backoff budget; a 401 is
	/// still recovered through the refresh coordinator.
	pub async fn upload(
		&self,
		url: &str,
		parts: Vec<FormPart>,
		options: UploadOptions,
	) -> Result<TransportResponse> {
		self.upload_inner(url, parts, options, None).await
	}

	/// Sends a multipart POST, reporting lifecycle transitions to `sink`.
	pub async fn upload_with_observer(
		&self,
		url: &str,
		parts: Vec<FormPart>,
		options: UploadOptions,
		sink: Sink,
	) -> Result<TransportResponse> {
		self.upload_inner(url, parts, options, Some(sink)).await
	}

	async fn request_inner(
		&self,
		options: RequestOptions,
		sink: Option<Sink>,
	) -> Result<TransportResponse> {
		self.ensure_live()?;
		obs::record_request_outcome(RequestKind::Request, RequestOutcome::Attempt);

		// Bad paths and destroyed clients fail before touching cache or pool.
		let url = self.resolve_url(&options.url)?;
		let key = options.coalesce_key();

		if options.cache_ttl.is_some()
			&& let Some(hit) = self.cache.get(&key)
		{
			obs::record_request_outcome(RequestKind::Request, RequestOutcome::Success);

			return Ok(hit);
		}

		let result = if options.deduplicate {
			self.request_coalesced(&key, url, options, sink).await
		} else {
			self.execute_and_cache(&key, url, &options, sink.as_ref()).await
		};

		record_outcome(RequestKind::Request, &result);

		result
	}

	/// Joins the in-flight attempt for `key`, or becomes its leader.
	async fn request_coalesced(
		&self,
		key: &str,
		url: Url,
		options: RequestOptions,
		sink: Option<Sink>,
	) -> Result<TransportResponse> {
		let mut follower_sink = None;
		let (shared, created): (SharedAttempt, bool) = self.pending.join_or_insert(key, || {
			let client = self.clone();
			let key = key.to_owned();
			let sink = sink.clone();

			async move {
				client
					.execute_and_cache(&key, url, &options, sink.as_ref())
					.await
					.map_err(|e| PooledFailure::of(&e))
			}
			.boxed()
		});

		// Only the leader's sink is wired through the pipeline; followers still
		// observe loading around the shared settlement.
		if !created
			&& let Some(sink) = sink
		{
			sink.update(StateUpdate::Patch(StatePatch::begin(None)));

			follower_sink = Some(sink);
		}

		let result = shared.clone().await;

		self.pending.settle(key, &shared);

		if let Some(sink) = follower_sink {
			sink.update(StateUpdate::Patch(StatePatch::idle()));
		}

		result.map_err(PooledFailure::into_error)
	}

	async fn execute_and_cache(
		&self,
		key: &str,
		url: Url,
		options: &RequestOptions,
		sink: Option<&Sink>,
	) -> Result<TransportResponse> {
		let span = RequestSpan::new(RequestKind::Request, "execute");
		let result = span.instrument(self.execute(url, options, sink)).await;

		if let Ok(response) = &result
			&& let Some(ttl) = options.cache_ttl
		{
			self.cache.put(key.into(), response.clone(), ttl);
		}

		result
	}

	async fn execute(
		&self,
		url: Url,
		options: &RequestOptions,
		sink: Option<&Sink>,
	) -> Result<TransportResponse> {
		let abort = options.cancelable.then(AbortHandle::new);

		notify(sink, StatePatch::begin(abort.clone()));

		let mut descriptor = self.build_descriptor(url, options, abort.clone(), sink);
		let mut attempt = 0;
		let mut refreshed = false;

		loop {
			if abort.as_ref().is_some_and(AbortHandle::is_aborted) {
				return self.fail_cancelled(options.on_cancel.as_ref(), sink);
			}

			let err = match self.transport.send(descriptor.clone()).await {
				Ok(response) => return Ok(self.succeed(options, sink, response)),
				Err(e) => e,
			};

			if err.is_cancelled() {
				return self.fail_cancelled(options.on_cancel.as_ref(), sink);
			}
			// A 401 goes through the refresh coordinator at most once per call;
			// after the refreshed resend it is handled like any other failure.
			if err.status() == Some(401) && !refreshed && self.can_refresh() {
				match self.refresher.refresh(self.refresh_exchange()).await {
					Ok(pair) => {
						descriptor.headers.insert(
							AUTHORIZATION.into(),
							format!("Bearer {}", pair.access_token.expose()),
						);
						refreshed = true;

						continue;
					},
					Err(e) => {
						if let Some(hook) = &self.config.on_refresh_fail {
							hook(&e);
						}

						notify(sink, StatePatch::idle());
						self.toast_failure(options, Some(&e.to_string()));

						return Err(e.into());
					},
				}
			}
			if attempt < options.retry {
				let delay = backoff::backoff_with_jitter(attempt);

				if let Some(abort) = &abort {
					tokio::select! {
						_ = abort.cancelled() =>
							return self.fail_cancelled(options.on_cancel.as_ref(), sink),
						_ = tokio::time::sleep(delay) => {},
					}
				} else {
					tokio::time::sleep(delay).await;
				}

				attempt += 1;

				continue;
			}

			return self
				.fail_terminal(options, sink, Box::new(RequestError::from_transport(err)))
				.await;
		}
	}

	async fn upload_inner(
		&self,
		url: &str,
		parts: Vec<FormPart>,
		options: UploadOptions,
		sink: Option<Sink>,
	) -> Result<TransportResponse> {
		self.ensure_live()?;
		obs::record_request_outcome(RequestKind::Upload, RequestOutcome::Attempt);

		let url = self.resolve_url(url)?;
		let sink = sink.as_ref();
		let abort = options.cancelable.then(AbortHandle::new);

		notify(sink, StatePatch::begin(abort.clone()));

		// Multipart carries its own boundary content type; the JSON default
		// must not leak in from the client headers.
		let mut headers = self.headers.read().clone();

		headers.remove(CONTENT_TYPE);

		if let Some(token) = self.tokens.access_token() {
			headers.insert(AUTHORIZATION.into(), format!("Bearer {token}"));
		}

		for (name, value) in &options.headers {
			headers.insert(name.clone(), value.clone());
		}

		let mut descriptor = TransportRequest {
			method: Method::Post,
			url,
			headers,
			query: Vec::new(),
			body: RequestBody::Form(parts),
			response_mode: ResponseMode::Json,
			timeout: options.timeout.unwrap_or(DEFAULT_UPLOAD_TIMEOUT),
			on_upload_progress: progress_forwarder(
				sink.cloned(),
				options.on_upload_progress.clone(),
				true,
			),
			on_download_progress: progress_forwarder(
				sink.cloned(),
				options.on_download_progress.clone(),
				false,
			),
			abort: abort.clone(),
		};
		let span = RequestSpan::new(RequestKind::Upload, "upload");
		let mut refreshed = false;
		let result = loop {
			if abort.as_ref().is_some_and(AbortHandle::is_aborted) {
				break self.fail_cancelled(options.on_cancel.as_ref(), sink);
			}

			let err = match span.instrument(self.transport.send(descriptor.clone())).await {
				Ok(response) => {
					notify(sink, StatePatch::idle());

					break Ok(response);
				},
				Err(e) => e,
			};

			if err.is_cancelled() {
				break self.fail_cancelled(options.on_cancel.as_ref(), sink);
			}
			if err.status() == Some(401) && !refreshed && self.can_refresh() {
				match self.refresher.refresh(self.refresh_exchange()).await {
					Ok(pair) => {
						descriptor.headers.insert(
							AUTHORIZATION.into(),
							format!("Bearer {}", pair.access_token.expose()),
						);
						refreshed = true;

						continue;
					},
					Err(e) => {
						if let Some(hook) = &self.config.on_refresh_fail {
							hook(&e);
						}

						notify(sink, StatePatch::idle());

						break Err(e.into());
					},
				}
			}

			notify(sink, StatePatch::idle());

			break Err(Error::request(err));
		};

		record_outcome(RequestKind::Upload, &result);

		result
	}

	fn build_descriptor(
		&self,
		url: Url,
		options: &RequestOptions,
		abort: Option<AbortHandle>,
		sink: Option<&Sink>,
	) -> TransportRequest {
		let mut headers = self.headers.read().clone();

		headers.insert(
			CONTENT_TYPE.into(),
			options.content_type.clone().unwrap_or_else(|| DEFAULT_CONTENT_TYPE.into()),
		);

		// Callback-sourced tokens may be newer than the cached default header.
		if let Some(token) = self.tokens.access_token() {
			headers.insert(AUTHORIZATION.into(), format!("Bearer {token}"));
		}

		for (name, value) in &options.headers {
			headers.insert(name.clone(), value.clone());
		}

		TransportRequest {
			method: options.method,
			url,
			headers,
			query: options.params.clone(),
			body: options.body.clone(),
			response_mode: options.response_mode,
			timeout: options.timeout.unwrap_or(DEFAULT_TIMEOUT),
			on_upload_progress: progress_forwarder(
				sink.cloned(),
				options.on_upload_progress.clone(),
				true,
			),
			on_download_progress: progress_forwarder(
				sink.cloned(),
				options.on_download_progress.clone(),
				false,
			),
			abort,
		}
	}

	fn can_refresh(&self) -> bool {
		self.tokens.is_multi_token() && self.config.refresh_endpoint.is_some()
	}

	fn refresh_exchange(&self) -> RefreshExchange {
		let headers = self.headers.clone();

		RefreshExchange {
			transport: self.transport.clone(),
			base_url: self.config.base_url.clone(),
			endpoint: self.config.refresh_endpoint.clone(),
			timeout: self.config.refresh_timeout,
			tokens: self.tokens.clone(),
			apply: Arc::new(move |token| apply_bearer(&headers, token)),
			on_refresh: self.config.on_refresh.clone(),
		}
	}

	fn succeed(
		&self,
		options: &RequestOptions,
		sink: Option<&Sink>,
		response: TransportResponse,
	) -> TransportResponse {
		notify(sink, StatePatch::idle());

		if options.success_toast {
			let message = options
				.toast_message
				.as_deref()
				.or_else(|| response.message())
				.unwrap_or(FALLBACK_SUCCESS_MESSAGE);

			self.toast(message, options.toast_kind.unwrap_or(ToastKind::Success));
		}

		response
	}

	fn fail_cancelled(
		&self,
		on_cancel: Option<&crate::request::CancelHook>,
		sink: Option<&Sink>,
	) -> Result<TransportResponse> {
		notify(sink, StatePatch::idle());

		if let Some(hook) = on_cancel {
			hook();
		}

		Err(Error::Cancelled)
	}

	async fn fail_terminal(
		&self,
		options: &RequestOptions,
		sink: Option<&Sink>,
		err: Box<RequestError>,
	) -> Result<TransportResponse> {
		notify(sink, StatePatch::idle());
		self.toast_failure(options, err.response.as_ref().and_then(TransportResponse::message));

		// Last chance for the application to rescue the failure.
		if let Some(handler) = &self.config.error_handler
			&& let Some(response) = handler(&err).await
		{
			return Ok(response);
		}

		Err(Error::Request(err))
	}

	/// Resolves the failure toast message: per-request override first, then the
	/// failure's own detail, then the generic fallback.
	fn toast_failure(&self, options: &RequestOptions, detail: Option<&str>) {
		let message =
			options.error_toast_message.as_deref().or(detail).unwrap_or(FALLBACK_ERROR_MESSAGE);

		self.toast_error(options, message);
	}

	fn toast_error(&self, options: &RequestOptions, message: &str) {
		if options.error_toast {
			self.toast(message, options.error_toast_kind.unwrap_or(ToastKind::Error));
		}
	}

	fn toast(&self, message: &str, kind: ToastKind) {
		if let Some(handler) = &self.config.toast_handler {
			handler(message, kind);
		}
	}
}

fn notify(sink: Option<&Sink>, patch: StatePatch) {
	if let Some(sink) = sink {
		sink.update(StateUpdate::Patch(patch));
	}
}

fn record_outcome(kind: RequestKind, result: &Result<TransportResponse>) {
	let outcome = match result {
		Ok(_) => RequestOutcome::Success,
		Err(e) if e.is_cancelled() => RequestOutcome::Cancelled,
		Err(_) => RequestOutcome::Failure,
	};

	obs::record_request_outcome(kind, outcome);
}

fn progress_forwarder(
	sink: Option<Sink>,
	percent: Option<PercentSink>,
	upload: bool,
) -> Option<ProgressSink> {
	if sink.is_none() && percent.is_none() {
		return None;
	}

	Some(Arc::new(move |event: ProgressEvent| {
		let pct = event.percent();

		if let Some(percent) = &percent {
			percent(pct);
		}
		if let Some(sink) = &sink {
			let patch = if upload {
				StatePatch { upload_progress: Some(pct), ..Default::default() }
			} else {
				StatePatch { download_progress: Some(pct), ..Default::default() }
			};

			sink.update(StateUpdate::Patch(patch));
		}
	}))
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicU32, Ordering};
	// self
	use super::*;
	use crate::{_preludet::*, config::ClientConfig, error::AuthError, http::ResponseBody};

	#[tokio::test(start_paused = true)]
	async fn retry_budget_bounds_the_attempt_count() {
		let (client, transport) = scripted_client(ClientConfig::new(test_base_url()));

		for _ in 0..3 {
			transport.push_reply(|_| Err(network_error()));
		}

		let err = client
			.request(RequestOptions::get("/unstable").with_retry(2))
			.await
			.expect_err("Three failures should exhaust a retry budget of two.");

		assert!(matches!(err, Error::Request(_)));
		assert_eq!(transport.calls(), 3);
	}

	#[tokio::test(start_paused = true)]
	async fn success_after_backoff_stops_retrying() {
		let (client, transport) = scripted_client(ClientConfig::new(test_base_url()));

		transport.push_reply(|_| Err(network_error()));
		transport.push_reply(|_| Ok(json_response(200, serde_json::json!({ "ok": true }))));
		transport.push_reply(|_| Ok(json_response(201, serde_json::json!({}))));

		let response = client
			.request(RequestOptions::get("/unstable").with_retry(5))
			.await
			.expect("Second attempt should succeed.");

		assert_eq!(response.status, 200);
		assert_eq!(transport.calls(), 2);
	}

	#[tokio::test(start_paused = true)]
	async fn cancellation_wins_over_a_pending_retry() {
		let (client, transport) = scripted_client(ClientConfig::new(test_base_url()));

		transport.push_reply(|request| {
			// Abort lands while the failure is being processed.
			request.abort.as_ref().expect("Cancelable request should carry a handle.").abort();

			Err(network_error())
		});

		let cancelled = Arc::new(AtomicU32::new(0));
		let observed = cancelled.clone();
		let options = RequestOptions::get("/unstable")
			.with_retry(5)
			.cancelable()
			.with_on_cancel(Arc::new(move || {
				observed.fetch_add(1, Ordering::Relaxed);
			}));
		let err = client.request(options).await.expect_err("Abort should cancel the request.");

		assert!(err.is_cancelled());
		assert_eq!(cancelled.load(Ordering::Relaxed), 1);
		assert_eq!(transport.calls(), 1);
	}

	#[tokio::test]
	async fn a_401_is_refreshed_and_resent_once() {
		let config = ClientConfig::new(test_base_url())
			.with_multi_token(Some("stale".into()), Some("r1".into()))
			.with_refresh_endpoint("/auth/refresh");
		let (client, transport) = scripted_client(config);

		transport.push_reply(|request| {
			assert_eq!(request.headers.get(AUTHORIZATION).map(String::as_str), Some("Bearer stale"));

			Err(status_error(401, serde_json::json!({})))
		});
		transport.push_reply(|request| {
			assert!(request.url.path().ends_with("/auth/refresh"));

			Ok(json_response(
				200,
				serde_json::json!({ "accessToken": "a2", "refreshToken": "r2" }),
			))
		});
		transport.push_reply(|request| {
			assert_eq!(request.headers.get(AUTHORIZATION).map(String::as_str), Some("Bearer a2"));

			Ok(json_response(200, serde_json::json!({ "ok": true })))
		});

		let response = client
			.request(RequestOptions::get("/orders"))
			.await
			.expect("Refreshed resend should succeed.");

		assert_eq!(response.status, 200);
		assert_eq!(transport.calls(), 3);
		assert_eq!(client.tokens.access_token(), Some("a2".into()));
		assert_eq!(client.default_header(AUTHORIZATION), Some("Bearer a2".into()));
	}

	#[tokio::test]
	async fn a_second_401_after_refresh_is_terminal() {
		let config = ClientConfig::new(test_base_url())
			.with_multi_token(Some("stale".into()), Some("r1".into()))
			.with_refresh_endpoint("/auth/refresh");
		let (client, transport) = scripted_client(config);

		transport.push_reply(|_| Err(status_error(401, serde_json::json!({}))));
		transport.push_reply(|_| Ok(json_response(200, serde_json::json!({ "accessToken": "a2" }))));
		transport.push_reply(|_| Err(status_error(401, serde_json::json!({}))));

		let err = client
			.request(RequestOptions::get("/orders"))
			.await
			.expect_err("A still-unauthorized resend should not refresh again.");

		match err {
			Error::Request(e) => assert_eq!(e.status(), Some(401)),
			e => panic!("Expected a request error, got {e:?}."),
		}

		assert_eq!(transport.calls(), 3);
	}

	#[tokio::test]
	async fn refresh_failure_reports_the_hook_and_skips_retries() {
		let failures = Arc::new(AtomicU32::new(0));
		let observed = failures.clone();
		let config = ClientConfig::new(test_base_url())
			.with_multi_token(Some("stale".into()), None)
			.with_refresh_endpoint("/auth/refresh")
			.with_on_refresh_fail(Arc::new(move |_| {
				observed.fetch_add(1, Ordering::Relaxed);
			}));
		let (client, transport) = scripted_client(config);

		transport.push_reply(|_| Err(status_error(401, serde_json::json!({}))));

		let err = client
			.request(RequestOptions::get("/orders").with_retry(5))
			.await
			.expect_err("A failed refresh should end the request.");

		assert!(matches!(err, Error::Auth(AuthError::MissingRefreshToken)));
		assert_eq!(failures.load(Ordering::Relaxed), 1);
		// No refresh token, so the 401 is the only transport call.
		assert_eq!(transport.calls(), 1);
	}

	#[tokio::test]
	async fn observer_sees_begin_progress_and_idle() {
		let (client, transport) = scripted_client(ClientConfig::new(test_base_url()));

		transport.push_reply(|request| {
			let progress =
				request.on_upload_progress.as_ref().expect("Upload sink should be wired.");

			progress(ProgressEvent { loaded: 50, total: Some(100) });
			progress(ProgressEvent { loaded: 100, total: Some(100) });

			Ok(json_response(200, serde_json::json!({})))
		});

		let sink = Arc::new(RecordingSink::default());
		let percents = Arc::new(Mutex::new(Vec::new()));
		let recorded = percents.clone();
		let options = RequestOptions::post("/documents").cancelable().with_json(
			serde_json::json!({ "name": "a" }),
		);
		let options = RequestOptions {
			on_upload_progress: Some(Arc::new(move |pct| recorded.lock().push(pct))),
			..options
		};

		client
			.request_with_observer(options, sink.clone())
			.await
			.expect("Request should succeed.");

		let history = sink.history();

		assert!(history.first().is_some_and(|s| s.is_loading && s.abort.is_some()));
		assert!(history.iter().any(|s| s.upload_progress == 50));
		assert!(history.last().is_some_and(|s| !s.is_loading && s.abort.is_none()));
		assert_eq!(*percents.lock(), vec![50, 100]);
	}

	#[tokio::test]
	async fn toasts_use_body_messages_and_overrides() {
		let toasts = Arc::new(Mutex::new(Vec::new()));
		let recorded = toasts.clone();
		let config = ClientConfig::new(test_base_url()).with_toast_handler(Arc::new(
			move |message, kind| recorded.lock().push((message.to_owned(), kind)),
		));
		let (client, transport) = scripted_client(config);

		transport.push_reply(|_| Ok(json_response(200, serde_json::json!({ "message": "saved" }))));
		transport.push_reply(|_| Err(status_error(500, serde_json::json!({ "message": "boom" }))));

		client
			.request(RequestOptions::post("/documents").with_success_toast(None))
			.await
			.expect("First request should succeed.");
		client
			.request(RequestOptions::post("/documents").with_error_toast(None))
			.await
			.expect_err("Second request should fail.");

		assert_eq!(
			*toasts.lock(),
			vec![
				("saved".to_owned(), ToastKind::Success),
				("boom".to_owned(), ToastKind::Error),
			],
		);
	}

	#[tokio::test]
	async fn refresh_failure_toast_honors_the_override() {
		let toasts = Arc::new(Mutex::new(Vec::new()));
		let recorded = toasts.clone();
		let config = ClientConfig::new(test_base_url())
			.with_multi_token(Some("stale".into()), None)
			.with_refresh_endpoint("/auth/refresh")
			.with_toast_handler(Arc::new(move |message, kind| {
				recorded.lock().push((message.to_owned(), kind));
			}));
		let (client, transport) = scripted_client(config);

		transport.push_reply(|_| Err(status_error(401, serde_json::json!({}))));

		let err = client
			.request(RequestOptions::get("/orders").with_error_toast(Some("Session expired".into())))
			.await
			.expect_err("A failed refresh should end the request.");

		assert!(matches!(err, Error::Auth(AuthError::MissingRefreshToken)));
		assert_eq!(*toasts.lock(), vec![("Session expired".to_owned(), ToastKind::Error)]);
	}

	#[tokio::test]
	async fn error_handler_can_rescue_a_terminal_failure() {
		let config = ClientConfig::new(test_base_url()).with_error_handler(Arc::new(|err| {
			let rescued = err.status() == Some(503);

			Box::pin(async move {
				rescued.then(|| TransportResponse {
					status: 200,
					headers: HashMap::new(),
					body: ResponseBody::Empty,
				})
			})
		}));
		let (client, transport) = scripted_client(config);

		transport.push_reply(|_| Err(status_error(503, serde_json::json!({}))));

		let response = client
			.request(RequestOptions::get("/orders"))
			.await
			.expect("Handler should rescue the failure.");

		assert_eq!(response.status, 200);
	}

	#[tokio::test]
	async fn cached_responses_skip_the_transport() {
		let (client, transport) = scripted_client(ClientConfig::new(test_base_url()));

		transport.push_reply(|_| Ok(json_response(200, serde_json::json!({ "page": 1 }))));

		let options =
			RequestOptions::get("/orders").with_cache_ttl(Duration::from_secs(60));
		let first = client.request(options.clone()).await.expect("First request should succeed.");
		let second = client.request(options).await.expect("Second request should be served from cache.");

		assert_eq!(first.status, second.status);
		assert_eq!(transport.calls(), 1);
	}

	#[tokio::test]
	async fn concurrent_identical_requests_are_coalesced() {
		let (client, transport) = scripted_client(ClientConfig::new(test_base_url()));

		transport.push_reply_delayed(Duration::from_millis(50), |_| {
			Ok(json_response(200, serde_json::json!({})))
		});

		let options = RequestOptions::get("/orders").deduplicate();
		let (first, second) = tokio::join!(
			client.request(options.clone()),
			client.request(options.clone()),
		);

		first.expect("Leader should succeed.");
		second.expect("Follower should share the settlement.");
		assert_eq!(transport.calls(), 1);

		transport.push_reply(|_| Ok(json_response(201, serde_json::json!({}))));

		// The pool entry is released after settlement.
		let third = client.request(options).await.expect("Third request should run fresh.");

		assert_eq!(third.status, 201);
		assert_eq!(transport.calls(), 2);
	}

	#[tokio::test]
	async fn upload_sends_multipart_without_the_json_content_type() {
		let (client, transport) = scripted_client(
			ClientConfig::new(test_base_url()).with_token("seed"),
		);

		transport.push_reply(|request| {
			assert!(!request.headers.contains_key(CONTENT_TYPE));
			assert_eq!(request.headers.get(AUTHORIZATION).map(String::as_str), Some("Bearer seed"));
			assert!(matches!(&request.body, RequestBody::Form(parts) if parts.len() == 2));

			Ok(json_response(201, serde_json::json!({})))
		});

		let parts = vec![
			FormPart::text("kind", "avatar"),
			FormPart::file("file", "avatar.png", vec![1, 2, 3]),
		];
		let response = client
			.upload("/uploads", parts, UploadOptions::new())
			.await
			.expect("Upload should succeed.");

		assert_eq!(response.status, 201);
		assert_eq!(transport.calls(), 1);
	}

	#[tokio::test]
	async fn an_upload_401_is_refreshed_and_resent_once() {
		let config = ClientConfig::new(test_base_url())
			.with_multi_token(Some("stale".into()), Some("r1".into()))
			.with_refresh_endpoint("/auth/refresh");
		let (client, transport) = scripted_client(config);

		transport.push_reply(|request| {
			assert_eq!(request.headers.get(AUTHORIZATION).map(String::as_str), Some("Bearer stale"));

			Err(status_error(401, serde_json::json!({})))
		});
		transport.push_reply(|request| {
			assert!(request.url.path().ends_with("/auth/refresh"));

			Ok(json_response(
				200,
				serde_json::json!({ "accessToken": "a2", "refreshToken": "r2" }),
			))
		});
		transport.push_reply(|request| {
			assert_eq!(request.headers.get(AUTHORIZATION).map(String::as_str), Some("Bearer a2"));
			assert!(matches!(&request.body, RequestBody::Form(parts) if parts.len() == 1));

			Ok(json_response(201, serde_json::json!({ "ok": true })))
		});

		let response = client
			.upload("/files", vec![FormPart::text("note", "hello")], UploadOptions::new())
			.await
			.expect("Refreshed multipart resend should succeed.");

		assert_eq!(response.status, 201);
		assert_eq!(transport.calls(), 3);
		assert_eq!(client.tokens.access_token(), Some("a2".into()));
	}
}
