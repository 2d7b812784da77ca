//! Resilient bearer-token HTTP pipeline—automatic 401 refresh with single-flight coalescing,
//! jittered backoff retries, cancellation, and lifecycle observation in one crate built for
//! production.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod backoff;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod http;
pub mod obs;
pub mod observe;
pub mod request;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for tests; enabled via `cfg(test)` or the `test` crate
	//! feature.

	pub use crate::_prelude::*;

	// std
	use std::collections::VecDeque;
	// self
	use crate::{
		client::Client,
		config::ClientConfig,
		http::{
			ResponseBody, TransportError, TransportFuture, TransportPort, TransportRequest,
			TransportResponse,
		},
		observe::{LifecycleState, StateSink, StateUpdate},
	};

	type Reply =
		Box<dyn FnOnce(&TransportRequest) -> Result<TransportResponse, TransportError> + Send>;

	struct ScriptedReply {
		delay: Option<Duration>,
		produce: Reply,
	}

	/// Transport that replays a scripted sequence of replies, recording every
	/// request it receives.
	#[derive(Default)]
	pub struct ScriptedTransport {
		script: Mutex<VecDeque<ScriptedReply>>,
		requests: Mutex<Vec<TransportRequest>>,
	}
	impl ScriptedTransport {
		/// Queues the next reply.
		pub fn push_reply<F>(&self, produce: F)
		where
			F: 'static + FnOnce(&TransportRequest) -> Result<TransportResponse, TransportError> + Send,
		{
			self.script
				.lock()
				.push_back(ScriptedReply { delay: None, produce: Box::new(produce) });
		}

		/// Queues the next reply behind an artificial transport delay.
		pub fn push_reply_delayed<F>(&self, delay: Duration, produce: F)
		where
			F: 'static + FnOnce(&TransportRequest) -> Result<TransportResponse, TransportError> + Send,
		{
			self.script
				.lock()
				.push_back(ScriptedReply { delay: Some(delay), produce: Box::new(produce) });
		}

		/// Number of requests the transport has received.
		pub fn calls(&self) -> usize {
			self.requests.lock().len()
		}

		/// Clones of every request received, in arrival order.
		pub fn requests(&self) -> Vec<TransportRequest> {
			self.requests.lock().clone()
		}
	}
	impl TransportPort for ScriptedTransport {
		fn send(&self, request: TransportRequest) -> TransportFuture<'_> {
			Box::pin(async move {
				self.requests.lock().push(request.clone());

				let reply = self
					.script
					.lock()
					.pop_front()
					.expect("Scripted transport ran out of replies.");

				if let Some(delay) = reply.delay {
					match &request.abort {
						Some(abort) => tokio::select! {
							_ = abort.cancelled() => return Err(TransportError::cancelled()),
							_ = tokio::time::sleep(delay) => {},
						},
						None => tokio::time::sleep(delay).await,
					}
				}
				if request.abort.as_ref().is_some_and(|abort| abort.is_aborted()) {
					return Err(TransportError::cancelled());
				}

				(reply.produce)(&request)
			})
		}
	}

	/// Sink that applies every update to an owned state, keeping a snapshot
	/// history for assertions.
	#[derive(Default)]
	pub struct RecordingSink {
		state: Mutex<LifecycleState>,
		history: Mutex<Vec<LifecycleState>>,
	}
	impl RecordingSink {
		/// Current state after all received updates.
		pub fn snapshot(&self) -> LifecycleState {
			self.state.lock().clone()
		}

		/// State snapshots taken after each update, in arrival order.
		pub fn history(&self) -> Vec<LifecycleState> {
			self.history.lock().clone()
		}
	}
	impl StateSink for RecordingSink {
		fn update(&self, update: StateUpdate) {
			let mut state = self.state.lock();

			update.apply(&mut state);
			self.history.lock().push(state.clone());
		}
	}

	/// Base URL shared by unit tests.
	pub fn test_base_url() -> Url {
		Url::parse("https://api.test.example/").expect("Static test URL should parse.")
	}

	/// Builds a client over an unscripted transport, for tests that never hit it.
	pub fn build_test_client(config: ClientConfig) -> Client {
		Client::with_transport(config, Arc::new(ScriptedTransport::default()))
	}

	/// Builds a client plus a handle to its scripted transport.
	pub fn scripted_client(config: ClientConfig) -> (Client, Arc<ScriptedTransport>) {
		let transport = Arc::new(ScriptedTransport::default());
		let client = Client::with_transport(config, transport.clone());

		(client, transport)
	}

	/// Builds a JSON success response.
	pub fn json_response(status: u16, body: serde_json::Value) -> TransportResponse {
		TransportResponse { status, headers: HashMap::new(), body: ResponseBody::Json(body) }
	}

	/// Builds the non-2xx status failure shape with a JSON body.
	pub fn status_error(status: u16, body: serde_json::Value) -> TransportError {
		TransportError::from_status(status, HashMap::new(), ResponseBody::Json(body))
	}

	/// Builds a connection-level failure shape.
	pub fn network_error() -> TransportError {
		TransportError::network(std::io::Error::new(
			std::io::ErrorKind::ConnectionReset,
			"connection reset by peer",
		))
	}
}

mod _prelude {
	pub use std::{
		collections::HashMap,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
		time::Duration,
	};

	pub use futures_util::{
		FutureExt,
		future::{BoxFuture, Shared},
	};
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;

#[cfg(test)] use httpmock as _;
