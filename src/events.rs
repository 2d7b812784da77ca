//! Client lifecycle eventing.

// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::_prelude::*;

/// Callback registered through [`Client::on`](crate::client::Client::on).
pub type EventHandler = Arc<dyn Fn() + Send + Sync>;

/// Lifecycle events emitted by the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ClientEvent {
	/// Emitted once when [`Client::destroy`](crate::client::Client::destroy) runs.
	Destroy,
}

/// Opaque handle identifying one registered handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HandlerId(u64);

/// Minimal multi-handler event emitter. Handler panics are isolated from the
/// emitting call site by catch-unwind so one misbehaving observer cannot break
/// `destroy`.
#[derive(Default)]
pub(crate) struct Emitter {
	next_id: AtomicU64,
	handlers: Mutex<HashMap<ClientEvent, Vec<(HandlerId, EventHandler)>>>,
}
impl Emitter {
	pub fn on(&self, event: ClientEvent, handler: EventHandler) -> HandlerId {
		let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));

		self.handlers.lock().entry(event).or_default().push((id, handler));

		id
	}

	pub fn off(&self, event: ClientEvent, id: HandlerId) {
		let mut handlers = self.handlers.lock();

		if let Some(list) = handlers.get_mut(&event) {
			list.retain(|(registered, _)| *registered != id);

			if list.is_empty() {
				handlers.remove(&event);
			}
		}
	}

	pub fn emit(&self, event: ClientEvent) {
		let snapshot = self.handlers.lock().get(&event).cloned().unwrap_or_default();

		for (_, handler) in snapshot {
			let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| handler()));
		}
	}
}
