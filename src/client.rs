//! High-level client that owns one backend configuration and drives the
//! request pipeline.

mod cache;
mod execute;

pub mod refresh;

pub use refresh::RefreshMetrics;

// std
use std::sync::atomic::{AtomicBool, Ordering};
// self
use crate::{
	_prelude::*,
	auth::TokenStore,
	client::{
		cache::{MemoryCache, PendingPool},
		refresh::TokenRefreshCoordinator,
	},
	config::ClientConfig,
	error::ConfigError,
	events::{ClientEvent, Emitter, EventHandler, HandlerId},
	http::{AbortHandle, TransportPort},
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestTransport;

const AUTHORIZATION: &str = "Authorization";

/// Client bound to one logical backend.
///
/// The client owns the transport, the token store, the default-header map, the
/// refresh coordinator, the response cache, and the dedup pool. It is cheap to
/// clone; clones share all of that state. Use one client per backend instead
/// of a process-wide registry.
#[derive(Clone)]
pub struct Client {
	pub(crate) transport: Arc<dyn TransportPort>,
	pub(crate) config: Arc<ClientConfig>,
	pub(crate) tokens: Arc<TokenStore>,
	pub(crate) headers: Arc<RwLock<HashMap<String, String>>>,
	pub(crate) refresher: Arc<TokenRefreshCoordinator>,
	pub(crate) cache: Arc<MemoryCache>,
	pub(crate) pending: Arc<PendingPool>,
	emitter: Arc<Emitter>,
	destroyed: Arc<AtomicBool>,
}
impl Client {
	/// Creates a client backed by the crate's default reqwest transport.
	#[cfg(feature = "reqwest")]
	pub fn new(config: ClientConfig) -> Result<Self> {
		Ok(Self::with_transport(config, Arc::new(ReqwestTransport::new()?)))
	}

	/// Creates a client that reuses the caller-provided transport.
	pub fn with_transport(config: ClientConfig, transport: Arc<dyn TransportPort>) -> Self {
		let tokens = if config.multi_token {
			TokenStore::multi(
				config.access_token.clone(),
				config.refresh_token.clone(),
				config.token_callbacks.clone(),
			)
		} else {
			TokenStore::single(config.token.clone())
		};
		let client = Self {
			transport,
			config: Arc::new(config),
			tokens: Arc::new(tokens),
			headers: Arc::new(RwLock::new(HashMap::new())),
			refresher: Arc::new(TokenRefreshCoordinator::new()),
			cache: Arc::new(MemoryCache::default()),
			pending: Arc::new(PendingPool::default()),
			emitter: Arc::new(Emitter::default()),
			destroyed: Arc::new(AtomicBool::new(false)),
		};

		apply_bearer(&client.headers, client.tokens.access_token().as_deref());

		client
	}

	/// Persists a new access token and applies it to the default headers.
	///
	/// `None` clears the stored token and removes the `Authorization` header;
	/// repeated calls with the same value leave the header map unchanged.
	pub fn set_access_token(&self, token: Option<&str>) {
		self.tokens.store_access_token(token);

		apply_bearer(&self.headers, token);
	}

	/// Persists a new refresh token; `None` clears it.
	pub fn set_refresh_token(&self, token: Option<&str>) {
		self.tokens.store_refresh_token(token);
	}

	/// Overrides the default `Authorization` header, keeping the
	/// mode-appropriate token slot in sync.
	pub fn set_authorization_header(&self, token: Option<&str>) {
		self.set_access_token(token);
	}

	/// Sets a default header sent with every request.
	pub fn set_default_header(&self, name: impl Into<String>, value: impl Into<String>) {
		self.headers.write().insert(name.into(), value.into());
	}

	/// Removes a default header.
	pub fn clear_default_header(&self, name: &str) {
		self.headers.write().remove(name);
	}

	/// Reads the current value of a default header.
	pub fn default_header(&self, name: &str) -> Option<String> {
		self.headers.read().get(name).cloned()
	}

	/// Aborts the in-flight call bound to `handle`; a no-op when `None` or when
	/// the call has already settled.
	pub fn cancel_request(&self, handle: Option<&AbortHandle>) {
		if let Some(handle) = handle {
			handle.abort();
		}
	}

	/// Registers a lifecycle event handler, returning an id for [`off`](Self::off).
	pub fn on(&self, event: ClientEvent, handler: EventHandler) -> HandlerId {
		self.emitter.on(event, handler)
	}

	/// Unregisters a previously registered handler.
	pub fn off(&self, event: ClientEvent, id: HandlerId) {
		self.emitter.off(event, id);
	}

	/// Shared counters for refresh exchanges.
	pub fn refresh_metrics(&self) -> Arc<RefreshMetrics> {
		self.refresher.metrics()
	}

	/// Returns `true` once [`destroy`](Self::destroy) has run.
	pub fn is_destroyed(&self) -> bool {
		self.destroyed.load(Ordering::Acquire)
	}

	/// Tears the client down: clears the refresh coordinator, the cache, and
	/// the dedup pool, then emits [`ClientEvent::Destroy`] exactly once.
	/// Subsequent requests fail with [`ConfigError::Destroyed`].
	pub fn destroy(&self) {
		if self.destroyed.swap(true, Ordering::AcqRel) {
			return;
		}

		self.refresher.reset();
		self.cache.clear();
		self.pending.clear();
		self.emitter.emit(ClientEvent::Destroy);
	}

	pub(crate) fn ensure_live(&self) -> Result<()> {
		if self.is_destroyed() { Err(ConfigError::Destroyed.into()) } else { Ok(()) }
	}

	pub(crate) fn resolve_url(&self, path: &str) -> Result<Url> {
		self.config.base_url.join(path).map_err(|source| {
			ConfigError::InvalidUrl { path: path.into(), source }.into()
		})
	}
}
impl Debug for Client {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Client")
			.field("config", &self.config)
			.field("destroyed", &self.is_destroyed())
			.finish()
	}
}

/// Writes or removes the default `Authorization: Bearer <token>` header.
pub(crate) fn apply_bearer(headers: &RwLock<HashMap<String, String>>, token: Option<&str>) {
	let mut headers = headers.write();

	match token {
		Some(token) => {
			headers.insert(AUTHORIZATION.into(), format!("Bearer {token}"));
		},
		None => {
			headers.remove(AUTHORIZATION);
		},
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::_preludet::*;

	#[test]
	fn access_token_header_application_is_idempotent() {
		let client = build_test_client(ClientConfig::new(test_base_url()).with_token("seed"));

		assert_eq!(client.default_header(AUTHORIZATION), Some("Bearer seed".into()));

		client.set_access_token(Some("a1"));
		client.set_access_token(Some("a1"));

		assert_eq!(client.default_header(AUTHORIZATION), Some("Bearer a1".into()));

		client.set_access_token(None);

		assert_eq!(client.default_header(AUTHORIZATION), None);
	}

	#[test]
	fn authorization_header_setter_keeps_token_slots_in_sync() {
		let config = ClientConfig::new(test_base_url()).with_multi_token(None, None);
		let client = build_test_client(config);

		client.set_authorization_header(Some("fresh"));

		assert_eq!(client.default_header(AUTHORIZATION), Some("Bearer fresh".into()));
		assert_eq!(client.tokens.access_token(), Some("fresh".into()));
	}

	#[test]
	fn default_headers_can_be_set_and_cleared() {
		let client = build_test_client(ClientConfig::new(test_base_url()));

		client.set_default_header("X-Trace", "abc");

		assert_eq!(client.default_header("X-Trace"), Some("abc".into()));

		client.clear_default_header("X-Trace");

		assert_eq!(client.default_header("X-Trace"), None);
	}

	#[test]
	fn destroy_emits_once_and_rejects_requests() {
		// std
		use std::sync::atomic::AtomicU32;

		let client = build_test_client(ClientConfig::new(test_base_url()));
		let fired = Arc::new(AtomicU32::new(0));
		let observed = fired.clone();

		client.on(
			ClientEvent::Destroy,
			Arc::new(move || {
				observed.fetch_add(1, Ordering::Relaxed);
			}),
		);
		client.destroy();
		client.destroy();

		assert_eq!(fired.load(Ordering::Relaxed), 1);
		assert!(client.is_destroyed());
		assert!(matches!(
			client.ensure_live(),
			Err(Error::Config(ConfigError::Destroyed))
		));
	}

	#[tokio::test]
	async fn destroy_clears_cached_and_pending_work() {
		let client = build_test_client(ClientConfig::new(test_base_url()));

		client.cache.put(
			"key".into(),
			json_response(200, serde_json::json!({})),
			Duration::from_secs(60),
		);

		let (_, created) = client
			.pending
			.join_or_insert("key", || async { Ok(json_response(200, serde_json::json!({}))) }.boxed());
		let (_, joined) = client.pending.join_or_insert("key", || unreachable!());

		assert!(created);
		assert!(!joined);
		assert!(client.cache.get("key").is_some());

		client.destroy();

		assert!(client.cache.get("key").is_none());

		let (_, restarted) = client
			.pending
			.join_or_insert("key", || async { Ok(json_response(200, serde_json::json!({}))) }.boxed());

		assert!(restarted);
	}
}
