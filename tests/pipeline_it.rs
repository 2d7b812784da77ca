#![cfg(feature = "reqwest")]

// crates.io
use httpmock::prelude::*;
use url::Url;
// self
use bearline::{
	client::Client,
	config::ClientConfig,
	error::Error,
	http::ResponseBody,
	request::{RequestOptions, ResponseMode},
};

fn build_client(server: &MockServer, config: fn(ClientConfig) -> ClientConfig) -> Client {
	let base_url =
		Url::parse(&server.base_url()).expect("Mock server URL should parse successfully.");

	Client::new(config(ClientConfig::new(base_url))).expect("Client should build successfully.")
}

#[tokio::test]
async fn get_sends_params_headers_and_bearer() {
	let server = MockServer::start_async().await;
	let client = build_client(&server, |config| config.with_token("seed"));
	let mock = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/orders")
				.query_param("page", "2")
				.header("authorization", "Bearer seed")
				.header("x-trace", "abc");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"items\":[1,2,3]}");
		})
		.await;

	let response = client
		.request(
			RequestOptions::get("/orders").with_param("page", "2").with_header("X-Trace", "abc"),
		)
		.await
		.expect("Request should succeed.");

	mock.assert_async().await;

	assert_eq!(response.status, 200);
	assert_eq!(
		response.json().and_then(|body| body.get("items")).and_then(|items| items.as_array()).map(Vec::len),
		Some(3),
	);
}

#[tokio::test]
async fn retry_budget_resends_until_exhausted() {
	let server = MockServer::start_async().await;
	let client = build_client(&server, |config| config);
	let mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/flaky");
			then.status(500)
				.header("content-type", "application/json")
				.body("{\"message\":\"boom\"}");
		})
		.await;

	let err = client
		.request(RequestOptions::get("/flaky").with_retry(1))
		.await
		.expect_err("A persistent 500 should exhaust the retry budget.");

	mock.assert_calls_async(2).await;

	match err {
		Error::Request(e) => {
			assert_eq!(e.status(), Some(500));
			assert_eq!(e.code.as_deref(), Some("status"));
			assert_eq!(
				e.response.as_ref().and_then(|response| response.message()),
				Some("boom"),
			);
		},
		e => panic!("Expected a request error, got {e:?}."),
	}
}

#[tokio::test]
async fn text_response_mode_keeps_the_raw_body() {
	let server = MockServer::start_async().await;
	let client = build_client(&server, |config| config);

	server
		.mock_async(|when, then| {
			when.method(GET).path("/ping");
			then.status(200).header("content-type", "text/plain").body("pong");
		})
		.await;

	let response = client
		.request(RequestOptions::get("/ping").with_response_mode(ResponseMode::Text))
		.await
		.expect("Request should succeed.");

	assert_eq!(response.body, ResponseBody::Text("pong".into()));
}

#[tokio::test]
async fn empty_json_bodies_are_tolerated() {
	let server = MockServer::start_async().await;
	let client = build_client(&server, |config| config);

	server
		.mock_async(|when, then| {
			when.method(DELETE).path("/orders/7");
			then.status(204);
		})
		.await;

	let response = client
		.request(RequestOptions::new(bearline::request::Method::Delete, "/orders/7"))
		.await
		.expect("Request should succeed.");

	assert_eq!(response.status, 204);
	assert_eq!(response.body, ResponseBody::Empty);
}
