//! Short-lived response cache and in-flight request coalescing.

// crates.io
use tokio::time::Instant;
// self
use crate::{
	_prelude::*,
	error::{AuthError, Error, RequestError},
	http::{TransportError, TransportErrorKind, TransportResponse},
};

/// Shared settlement of one coalesced request.
pub(crate) type SharedAttempt = Shared<BoxFuture<'static, Result<TransportResponse, PooledFailure>>>;

struct CacheEntry {
	response: TransportResponse,
	stored_at: Instant,
	ttl: Duration,
}
impl CacheEntry {
	fn is_fresh(&self, now: Instant) -> bool {
		now.duration_since(self.stored_at) < self.ttl
	}
}

/// TTL-scoped response cache keyed by the request's coalesce key.
///
/// Entries are evicted lazily on lookup; there is no background sweeper.
#[derive(Default)]
pub(crate) struct MemoryCache {
	entries: Mutex<HashMap<String, CacheEntry>>,
}
impl MemoryCache {
	pub fn get(&self, key: &str) -> Option<TransportResponse> {
		let mut entries = self.entries.lock();

		match entries.get(key) {
			Some(entry) if entry.is_fresh(Instant::now()) => Some(entry.response.clone()),
			Some(_) => {
				entries.remove(key);

				None
			},
			None => None,
		}
	}

	pub fn put(&self, key: String, response: TransportResponse, ttl: Duration) {
		if ttl.is_zero() {
			return;
		}

		self.entries
			.lock()
			.insert(key, CacheEntry { response, stored_at: Instant::now(), ttl });
	}

	pub fn clear(&self) {
		self.entries.lock().clear();
	}
}
impl Debug for MemoryCache {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("MemoryCache").field("entries", &self.entries.lock().len()).finish()
	}
}

/// In-flight requests keyed by coalesce key.
///
/// Concurrent identical requests share one transport exchange; every caller
/// receives a clone of the same settlement.
#[derive(Default)]
pub(crate) struct PendingPool {
	entries: Mutex<HashMap<String, SharedAttempt>>,
}
impl PendingPool {
	/// Joins the in-flight attempt for `key`, or registers the one built by `make`.
	///
	/// Returns the shared future plus whether this caller created it.
	pub fn join_or_insert<F>(&self, key: &str, make: F) -> (SharedAttempt, bool)
	where
		F: FnOnce() -> BoxFuture<'static, Result<TransportResponse, PooledFailure>>,
	{
		let mut entries = self.entries.lock();

		if let Some(existing) = entries.get(key) {
			return (existing.clone(), false);
		}

		let fut = make().shared();

		entries.insert(key.into(), fut.clone());

		(fut, true)
	}

	/// Removes the settled attempt, leaving any newer occupant of `key` alone.
	pub fn settle(&self, key: &str, settled: &SharedAttempt) {
		let mut entries = self.entries.lock();

		if let Some(current) = entries.get(key)
			&& current.ptr_eq(settled)
		{
			entries.remove(key);
		}
	}

	pub fn clear(&self) {
		self.entries.lock().clear();
	}
}
impl Debug for PendingPool {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("PendingPool").field("entries", &self.entries.lock().len()).finish()
	}
}

/// Cloneable projection of [`Error`] carried through a [`SharedAttempt`].
///
/// Followers of a coalesced request receive the leader's failure rebuilt from
/// this shape; the error response body is not retained across the pool.
#[derive(Clone, Debug)]
pub(crate) enum PooledFailure {
	Cancelled,
	Auth(AuthError),
	Transport { message: String, code: Option<String>, status: Option<u16>, kind: TransportErrorKind },
}
impl PooledFailure {
	pub fn of(e: &Error) -> Self {
		match e {
			Error::Cancelled => Self::Cancelled,
			Error::Auth(e) => Self::Auth(e.clone()),
			Error::Request(e) => Self::Transport {
				message: e.message.clone(),
				code: e.code.clone(),
				status: e.status(),
				kind: e.source.kind(),
			},
			// Config failures surface before pool registration; this arm only
			// fires if one slips through mid-flight.
			Error::Config(e) => Self::Transport {
				message: e.to_string(),
				code: None,
				status: None,
				kind: TransportErrorKind::Network,
			},
		}
	}

	pub fn into_error(self) -> Error {
		match self {
			Self::Cancelled => Error::Cancelled,
			Self::Auth(e) => Error::Auth(e),
			Self::Transport { message, code, status, kind } => {
				let source = TransportError::new(kind, message.clone(), status);

				Error::Request(Box::new(RequestError { message, code, response: None, source }))
			},
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::http::ResponseBody;

	fn response(status: u16) -> TransportResponse {
		TransportResponse { status, headers: HashMap::new(), body: ResponseBody::Empty }
	}

	#[tokio::test]
	async fn cache_entries_expire_after_their_ttl() {
		tokio::time::pause();

		let cache = MemoryCache::default();

		cache.put("GET /a".into(), response(200), Duration::from_millis(100));

		assert_eq!(cache.get("GET /a").map(|r| r.status), Some(200));

		tokio::time::advance(Duration::from_millis(150)).await;

		assert!(cache.get("GET /a").is_none());
		// Expired entries are evicted by the failed lookup.
		assert!(cache.entries.lock().is_empty());
	}

	#[test]
	fn zero_ttl_is_never_stored() {
		let cache = MemoryCache::default();

		cache.put("GET /a".into(), response(200), Duration::ZERO);

		assert!(cache.get("GET /a").is_none());
	}

	#[tokio::test]
	async fn pool_coalesces_until_settled() {
		let pool = PendingPool::default();
		let (first, created_first) =
			pool.join_or_insert("GET /a", || async { Ok(response(200)) }.boxed());
		let (second, created_second) = pool.join_or_insert("GET /a", || unreachable!());

		assert!(created_first);
		assert!(!created_second);
		assert!(first.ptr_eq(&second));

		let settled = first.await.expect("Shared attempt should settle successfully.");

		assert_eq!(settled.status, 200);

		pool.settle("GET /a", &second);

		let (_, created_third) =
			pool.join_or_insert("GET /a", || async { Ok(response(201)) }.boxed());

		assert!(created_third);
	}

	#[test]
	fn pooled_failure_round_trips_transport_shape() {
		let original = Error::request(TransportError::from_status(503, HashMap::new(), ResponseBody::Empty));
		let rebuilt = PooledFailure::of(&original).into_error();

		match rebuilt {
			Error::Request(e) => {
				assert_eq!(e.status(), Some(503));
				assert_eq!(e.code.as_deref(), Some("status"));
			},
			e => panic!("Expected a request error, got {e:?}."),
		}

		assert!(PooledFailure::of(&Error::Cancelled).into_error().is_cancelled());
	}
}
