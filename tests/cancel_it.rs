#![cfg(feature = "reqwest")]

// std
use std::{
	sync::{
		Arc, Mutex,
		atomic::{AtomicU32, Ordering},
	},
	time::Duration,
};
// crates.io
use httpmock::prelude::*;
use url::Url;
// self
use bearline::{
	client::Client,
	config::ClientConfig,
	http::AbortHandle,
	observe::{LifecycleState, StateSink, StateUpdate},
	request::RequestOptions,
};

/// Sink that folds every update into an owned state, exposing the abort handle.
#[derive(Default)]
struct CapturingSink {
	state: Mutex<LifecycleState>,
}
impl CapturingSink {
	fn abort_handle(&self) -> Option<AbortHandle> {
		self.state.lock().expect("Sink state should not be poisoned.").abort.clone()
	}

	fn is_loading(&self) -> bool {
		self.state.lock().expect("Sink state should not be poisoned.").is_loading
	}
}
impl StateSink for CapturingSink {
	fn update(&self, update: StateUpdate) {
		update.apply(&mut self.state.lock().expect("Sink state should not be poisoned."));
	}
}

async fn wait_for_abort_handle(sink: &CapturingSink) -> AbortHandle {
	for _ in 0..100 {
		if let Some(handle) = sink.abort_handle() {
			return handle;
		}

		tokio::time::sleep(Duration::from_millis(10)).await;
	}

	panic!("Observer never received an abort handle.");
}

#[tokio::test]
async fn aborting_an_in_flight_request_cancels_it() {
	let server = MockServer::start_async().await;
	let base_url =
		Url::parse(&server.base_url()).expect("Mock server URL should parse successfully.");
	let client = Client::new(ClientConfig::new(base_url)).expect("Client should build successfully.");
	let mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/slow");
			then.status(200)
				.header("content-type", "application/json")
				.body("{}")
				.delay(Duration::from_secs(10));
		})
		.await;
	let cancelled = Arc::new(AtomicU32::new(0));
	let observed = cancelled.clone();
	let sink = Arc::new(CapturingSink::default());
	let task = {
		let client = client.clone();
		let sink = sink.clone();
		let options = RequestOptions::get("/slow")
			.with_retry(5)
			.cancelable()
			.with_on_cancel(Arc::new(move || {
				observed.fetch_add(1, Ordering::Relaxed);
			}));

		tokio::spawn(async move { client.request_with_observer(options, sink).await })
	};
	let handle = wait_for_abort_handle(&sink).await;

	assert!(sink.is_loading());

	client.cancel_request(Some(&handle));

	let err = task
		.await
		.expect("Request task should not panic.")
		.expect_err("An aborted request should not settle successfully.");

	assert!(err.is_cancelled());
	// Cancellation beats the retry budget: the one in-flight call is the only one.
	mock.assert_calls_async(1).await;
	assert_eq!(cancelled.load(Ordering::Relaxed), 1);
	assert!(!sink.is_loading());
	assert!(sink.abort_handle().is_none());
}
