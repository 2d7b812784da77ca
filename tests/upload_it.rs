#![cfg(feature = "reqwest")]

// std
use std::sync::{Arc, Mutex};
// crates.io
use httpmock::prelude::*;
use url::Url;
// self
use bearline::{
	client::Client,
	config::ClientConfig,
	request::{FormPart, UploadOptions},
};

#[tokio::test]
async fn multipart_upload_round_trips() {
	let server = MockServer::start_async().await;
	let base_url =
		Url::parse(&server.base_url()).expect("Mock server URL should parse successfully.");
	let client = Client::new(ClientConfig::new(base_url).with_token("seed"))
		.expect("Client should build successfully.");
	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/uploads")
				.header("authorization", "Bearer seed")
				.header_matches("content-type", "multipart/form-data.*")
				.body_includes("avatar.png")
				.body_includes("kind");
			then.status(201)
				.header("content-type", "application/json")
				.body("{\"message\":\"uploaded\"}");
		})
		.await;
	let downloaded = Arc::new(Mutex::new(Vec::new()));
	let observed = downloaded.clone();
	let options = UploadOptions {
		on_download_progress: Some(Arc::new(move |pct| {
			observed.lock().expect("Progress log should not be poisoned.").push(pct);
		})),
		..UploadOptions::new()
	};
	let parts = vec![
		FormPart::text("kind", "avatar"),
		FormPart::file("file", "avatar.png", b"\x89PNG fake payload".to_vec()),
	];
	let response = client
		.upload("/uploads", parts, options)
		.await
		.expect("Upload should succeed.");

	mock.assert_async().await;

	assert_eq!(response.status, 201);
	assert_eq!(response.message(), Some("uploaded"));
	assert_eq!(
		downloaded.lock().expect("Progress log should not be poisoned.").last(),
		Some(&100),
	);
}
