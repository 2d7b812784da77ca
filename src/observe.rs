//! Request lifecycle observation contracts.
//!
//! The pipeline reports loading, progress, and abort-handle transitions to an
//! optional caller-supplied [`StateSink`], decoupled from any particular UI
//! framework. Updates arrive either as partial [`StatePatch`] values or as
//! whole-state transform functions; sinks own the state and must tolerate
//! updates after they are logically unmounted (silently ignored).

// self
use crate::{_prelude::*, http::AbortHandle};

/// Toast/notification callback invoked only when explicitly enabled per request.
pub type ToastHandler = Arc<dyn Fn(&str, ToastKind) + Send + Sync>;
/// Whole-state transform carried by [`StateUpdate::Transform`].
pub type StateTransform = Arc<dyn Fn(&LifecycleState) -> LifecycleState + Send + Sync>;

/// Observed state of a single request's lifetime.
///
/// Owned exclusively by the caller-supplied sink, never shared across requests;
/// reset to idle on completion, failure, and cancellation alike.
#[derive(Clone, Debug, Default)]
pub struct LifecycleState {
	/// `true` from just before the request is sent until it settles.
	pub is_loading: bool,
	/// Upload completion percentage.
	pub upload_progress: u8,
	/// Download completion percentage.
	pub download_progress: u8,
	/// Abort handle of the in-flight call, when the request is cancelable.
	pub abort: Option<AbortHandle>,
}

/// Partial state patch; `None` fields leave the sink's state untouched.
#[derive(Clone, Debug, Default)]
pub struct StatePatch {
	/// New loading flag.
	pub is_loading: Option<bool>,
	/// New upload percentage.
	pub upload_progress: Option<u8>,
	/// New download percentage.
	pub download_progress: Option<u8>,
	/// New abort handle slot (outer `Some` overwrites, inner `None` clears).
	pub abort: Option<Option<AbortHandle>>,
}
impl StatePatch {
	/// Patch announcing a request that is about to be sent.
	pub fn begin(abort: Option<AbortHandle>) -> Self {
		Self {
			is_loading: Some(true),
			upload_progress: Some(0),
			download_progress: Some(0),
			abort: Some(abort),
		}
	}

	/// Patch resetting the sink to idle; applied on every exit path.
	pub fn idle() -> Self {
		Self {
			is_loading: Some(false),
			upload_progress: Some(0),
			download_progress: Some(0),
			abort: Some(None),
		}
	}

	/// Applies the patch to a state value.
	pub fn apply(&self, state: &mut LifecycleState) {
		if let Some(is_loading) = self.is_loading {
			state.is_loading = is_loading;
		}
		if let Some(upload_progress) = self.upload_progress {
			state.upload_progress = upload_progress;
		}
		if let Some(download_progress) = self.download_progress {
			state.download_progress = download_progress;
		}
		if let Some(abort) = &self.abort {
			state.abort = abort.clone();
		}
	}
}

/// One state update pushed to a [`StateSink`].
#[derive(Clone)]
pub enum StateUpdate {
	/// Partial patch.
	Patch(StatePatch),
	/// Whole-state transform evaluated against the sink's current state.
	Transform(StateTransform),
}
impl StateUpdate {
	/// Evaluates the update against the provided state.
	pub fn apply(&self, state: &mut LifecycleState) {
		match self {
			Self::Patch(patch) => patch.apply(state),
			Self::Transform(transform) => *state = transform(state),
		}
	}
}
impl Debug for StateUpdate {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::Patch(patch) => f.debug_tuple("StateUpdate::Patch").field(patch).finish(),
			Self::Transform(_) => f.write_str("StateUpdate::Transform(..)"),
		}
	}
}

/// Observer receiving lifecycle updates for a single request.
pub trait StateSink
where
	Self: Send + Sync,
{
	/// Accepts one state update.
	fn update(&self, update: StateUpdate);
}

/// Kinds accepted by the toast handler.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ToastKind {
	/// Success notification.
	#[default]
	Success,
	/// Error notification.
	Error,
	/// Warning notification.
	Warning,
	/// Informational notification.
	Info,
}
impl ToastKind {
	/// Returns a stable label for the kind.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Success => "success",
			Self::Error => "error",
			Self::Warning => "warning",
			Self::Info => "info",
		}
	}
}
impl Display for ToastKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
