//! One-shot deferred tasks and the proactive refresh scheduler built on them.
//!
//! A [`DeferredSlot`] holds at most one pending task. Replacing it aborts the previous task
//! before the new one is spawned, so a slot never has two timers outstanding. A task removes
//! its own entry before it runs, which lets it re-arm the same slot without aborting itself.
//!
//! Tasks run on the ambient tokio runtime. Outside one, arming is refused instead of panicking.

// std
use std::sync::atomic::{AtomicU64, Ordering};
// crates.io
use tokio::{runtime::Handle, task::JoinHandle};
// self
use crate::{
	_prelude::*,
	clock::Clock,
	session::{RefreshSchedule, SessionFuture},
};

struct DeferredEntry {
	generation: u64,
	handle: JoinHandle<()>,
}

/// Single pending tokio task, replaced with cancel-then-arm semantics.
#[derive(Default)]
pub(crate) struct DeferredSlot {
	entry: Arc<Mutex<Option<DeferredEntry>>>,
	generation: AtomicU64,
}
impl DeferredSlot {
	/// Aborts any pending task and runs `task` after `delay`.
	///
	/// Returns `false`, leaving the slot empty, when called outside a tokio runtime.
	pub(crate) fn replace<F>(&self, delay: StdDuration, task: F) -> bool
	where
		F: 'static + Send + FnOnce() -> SessionFuture<'static, ()>,
	{
		// Held until the new entry is stored so the task cannot observe a half-armed slot.
		let mut entry = self.entry.lock();

		if let Some(previous) = entry.take() {
			previous.handle.abort();
		}

		let Ok(runtime) = Handle::try_current() else {
			return false;
		};

		let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
		let slot = Arc::clone(&self.entry);
		let handle = runtime.spawn(async move {
			tokio::time::sleep(delay).await;

			{
				let mut entry = slot.lock();

				if entry.as_ref().is_some_and(|current| current.generation == generation) {
					entry.take();
				}
			}

			task().await;
		});

		*entry = Some(DeferredEntry { generation, handle });

		true
	}

	/// Aborts the pending task, if any. Returns whether one was pending.
	pub(crate) fn cancel(&self) -> bool {
		match self.entry.lock().take() {
			Some(previous) => {
				previous.handle.abort();

				true
			},
			None => false,
		}
	}

	/// Whether a task is waiting to fire.
	pub(crate) fn is_pending(&self) -> bool {
		self.entry.lock().is_some()
	}
}
impl Debug for DeferredSlot {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("DeferredSlot").field("pending", &self.is_pending()).finish()
	}
}

/// Arms at most one proactive refresh per session.
///
/// No retry happens here: if the refresh callback fails, nothing is re-armed and the session
/// relies on the runtime token-expired path or a manual reload.
pub struct RefreshScheduler {
	clock: Arc<dyn Clock>,
	slot: DeferredSlot,
}
impl RefreshScheduler {
	/// Creates a scheduler that measures delays with `clock`.
	pub fn new(clock: Arc<dyn Clock>) -> Self {
		Self { clock, slot: DeferredSlot::default() }
	}

	/// Cancels any pending refresh, then arms `on_refresh` to run
	/// [`REFRESH_MARGIN`](crate::session::REFRESH_MARGIN) before `expires_at`.
	///
	/// Returns the schedule when a timer was armed, or `None` when the refresh instant is already
	/// behind `now` or no tokio runtime is available; in that case nothing is pending afterwards.
	pub fn arm<F>(&self, expires_at: OffsetDateTime, on_refresh: F) -> Option<RefreshSchedule>
	where
		F: 'static + Send + FnOnce() -> SessionFuture<'static, ()>,
	{
		let schedule = RefreshSchedule::for_expiry(expires_at);

		self.slot.cancel();

		let delay = schedule.delay_from(self.clock.now())?;

		self.slot.replace(delay, on_refresh).then_some(schedule)
	}

	/// Cancels the pending refresh. Returns whether one was pending.
	pub fn cancel(&self) -> bool {
		self.slot.cancel()
	}

	/// Whether a refresh is waiting to fire.
	pub fn is_pending(&self) -> bool {
		self.slot.is_pending()
	}
}
impl Debug for RefreshScheduler {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RefreshScheduler").field("pending", &self.is_pending()).finish()
	}
}
