//! Async driver of one embed session.

// std
use std::sync::{
	Weak,
	atomic::{AtomicBool, AtomicU64, Ordering},
};
// self
use crate::{
	_prelude::*,
	auth::EmbedToken,
	clock::{Clock, SystemClock},
	obs::{self, FlowKind, FlowOutcome, FlowSpan, TraceEntry, TraceEvent, TraceSink, TracingSink},
	session::{
		DeferredSlot, EmbedConfiguration, EmbedSessionSource, EmbedSurface, LoadFailureOutcome,
		RefreshScheduler, RuntimeErrorAction, SessionError, SessionFuture, SessionIntent,
		SessionMachine, SessionPresenter, SessionState, SurfaceEvent,
	},
};

struct ControllerInner {
	source: Arc<dyn EmbedSessionSource>,
	surface: Arc<dyn EmbedSurface>,
	presenter: Arc<dyn SessionPresenter>,
	trace: Arc<dyn TraceSink>,
	machine: Mutex<SessionMachine>,
	refresh: RefreshScheduler,
	retry: DeferredSlot,
	current: Mutex<Option<EmbedToken>>,
	embedded: AtomicBool,
	closed: AtomicBool,
	// Bumped by manual retries; failures of loads started under an older value are not counted.
	load_epoch: AtomicU64,
}

/// Builder for [`SessionController`].
pub struct SessionControllerBuilder {
	source: Arc<dyn EmbedSessionSource>,
	surface: Arc<dyn EmbedSurface>,
	presenter: Option<Arc<dyn SessionPresenter>>,
	trace: Option<Arc<dyn TraceSink>>,
	clock: Option<Arc<dyn Clock>>,
}
impl SessionControllerBuilder {
	/// Sets the presentation adapter. Intents are dropped when none is set.
	pub fn presenter(mut self, presenter: Arc<dyn SessionPresenter>) -> Self {
		self.presenter = Some(presenter);

		self
	}

	/// Sets the trace sink (defaults to [`TracingSink`]).
	pub fn trace(mut self, trace: Arc<dyn TraceSink>) -> Self {
		self.trace = Some(trace);

		self
	}

	/// Sets the clock used for refresh scheduling (defaults to [`SystemClock`]).
	pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = Some(clock);

		self
	}

	/// Builds an idle controller.
	pub fn build(self) -> SessionController {
		let presenter = self.presenter.unwrap_or_else(|| Arc::new(|_: SessionIntent| {}));
		let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

		SessionController(Arc::new(ControllerInner {
			source: self.source,
			surface: self.surface,
			presenter,
			trace: self.trace.unwrap_or_else(|| Arc::new(TracingSink)),
			machine: Mutex::new(SessionMachine::default()),
			refresh: RefreshScheduler::new(clock),
			retry: DeferredSlot::default(),
			current: Mutex::new(None),
			embedded: AtomicBool::new(false),
			closed: AtomicBool::new(false),
			load_epoch: AtomicU64::new(0),
		}))
	}
}

/// Cloneable handle to one embed session.
///
/// Timers hold only weak references, so dropping every handle also stops the session; call
/// [`shutdown`](Self::shutdown) to stop it while handles remain.
///
/// Timers are spawned on the ambient tokio runtime. Driven from outside one, loads and refreshes
/// still run but arm no timers.
#[derive(Clone)]
pub struct SessionController(Arc<ControllerInner>);
impl SessionController {
	/// Starts building a controller around a token source and an embed surface.
	pub fn builder(
		source: Arc<dyn EmbedSessionSource>,
		surface: Arc<dyn EmbedSurface>,
	) -> SessionControllerBuilder {
		SessionControllerBuilder { source, surface, presenter: None, trace: None, clock: None }
	}

	/// Current state.
	pub fn state(&self) -> SessionState {
		self.0.machine.lock().state()
	}

	/// Consecutive load failures counted so far.
	pub fn retry_attempt(&self) -> u32 {
		self.0.machine.lock().retry().attempt()
	}

	/// Token currently pushed into the surface.
	pub fn current_token(&self) -> Option<EmbedToken> {
		self.0.current.lock().clone()
	}

	/// Whether a proactive refresh is armed.
	pub fn refresh_pending(&self) -> bool {
		self.0.refresh.is_pending()
	}

	/// Whether an automatic load retry is armed.
	pub fn retry_pending(&self) -> bool {
		self.0.retry.is_pending()
	}

	/// Fetches configuration and a fresh token, embeds the report, and arms the refresh timer.
	///
	/// A failure schedules an automatic retry while attempts remain and is returned either way;
	/// once attempts are exhausted the error is [`SessionError::RetriesExhausted`].
	pub fn load(&self) -> SessionFuture<'_, Result<(), SessionError>> {
		Box::pin(async move {
			const KIND: FlowKind = FlowKind::SessionLoad;

			let correlation_id = obs::correlation_id();
			let span = FlowSpan::new(KIND, "load", correlation_id);

			obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

			let result = span.instrument(self.load_once(correlation_id)).await;

			obs::record_result(KIND, result)
		})
	}

	/// Forgets counted failures, cancels a pending automatic retry, and loads again.
	///
	/// A load already in flight keeps running, but its failure no longer counts as an attempt.
	pub fn manual_retry(&self) -> SessionFuture<'_, Result<(), SessionError>> {
		self.0.retry.cancel();
		self.0.machine.lock().manual_retry();
		self.0.load_epoch.fetch_add(1, Ordering::SeqCst);

		self.load()
	}

	/// Loads again without forgetting counted failures; a pending automatic retry is cancelled so
	/// only one load runs.
	pub fn reload(&self) -> SessionFuture<'_, Result<(), SessionError>> {
		self.0.retry.cancel();

		self.load()
	}

	/// Fetches a fresh token, pushes it into the live report, and re-arms the refresh timer.
	///
	/// Nothing is retried on failure: the viewer is told to reload and no refresh stays armed.
	pub fn refresh(&self) -> SessionFuture<'_, Result<(), SessionError>> {
		Box::pin(async move {
			const KIND: FlowKind = FlowKind::SessionRefresh;

			let correlation_id = obs::correlation_id();
			let span = FlowSpan::new(KIND, "refresh", correlation_id);

			obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

			let result = span.instrument(self.refresh_once(correlation_id)).await.map_err(|e| {
				self.record(
					TraceEntry::new(correlation_id, KIND, TraceEvent::RefreshFailed)
						.with_detail(e.to_string()),
				);

				let intents = self.0.machine.lock().refresh_failed();

				self.present(intents);

				SessionError::RefreshFailed { source: Box::new(e) }
			});

			obs::record_result(KIND, result)
		})
	}

	/// Dispatches an event from the embed surface.
	///
	/// A token-expired runtime error triggers [`refresh`](Self::refresh) immediately and returns
	/// its outcome; other events never fail.
	pub fn handle_event(&self, event: SurfaceEvent) -> SessionFuture<'_, Result<(), SessionError>> {
		Box::pin(async move {
			let correlation_id = obs::correlation_id();

			match event {
				SurfaceEvent::Loaded => {
					let intents = self.0.machine.lock().loaded();

					self.present(intents);
					self.record(TraceEntry::new(
						correlation_id,
						FlowKind::SessionLoad,
						TraceEvent::Loaded,
					));

					Ok(())
				},
				SurfaceEvent::Rendered => {
					self.record(TraceEntry::new(
						correlation_id,
						FlowKind::SessionLoad,
						TraceEvent::Rendered,
					));

					Ok(())
				},
				SurfaceEvent::Error(error) => {
					self.record(
						TraceEntry::new(correlation_id, FlowKind::SessionLoad, TraceEvent::RuntimeError)
							.with_detail(error.message.clone()),
					);

					let (action, intents) = self.0.machine.lock().runtime_error(&error);

					self.present(intents);

					match action {
						RuntimeErrorAction::Refresh => self.refresh().await,
						RuntimeErrorAction::Surface => Ok(()),
					}
				},
			}
		})
	}

	/// Cancels both timers; later loads and refreshes arm nothing.
	pub fn shutdown(&self) {
		self.0.closed.store(true, Ordering::SeqCst);
		self.0.refresh.cancel();
		self.0.retry.cancel();
	}

	async fn load_once(&self, correlation_id: Uuid) -> Result<(), SessionError> {
		let epoch = self.0.load_epoch.load(Ordering::SeqCst);
		let intents = self.0.machine.lock().begin_load();

		self.present(intents);
		self.record(TraceEntry::new(correlation_id, FlowKind::SessionLoad, TraceEvent::Loading));

		match self.connect().await {
			Ok(token) => {
				self.0.embedded.store(true, Ordering::SeqCst);
				self.install(token, correlation_id);

				Ok(())
			},
			// Superseded by a manual retry.
			Err(e) if self.0.load_epoch.load(Ordering::SeqCst) != epoch => Err(e),
			Err(e) => self.load_failed(e, correlation_id),
		}
	}

	async fn connect(&self) -> Result<EmbedToken, SessionError> {
		let config = self.0.source.fetch_config().await?;
		let token = self.0.source.fetch_token().await?;

		self.0.surface.embed(EmbedConfiguration::new(&config, &token)).await?;

		Ok(token)
	}

	fn load_failed(&self, error: SessionError, correlation_id: Uuid) -> Result<(), SessionError> {
		let (outcome, intents) = self.0.machine.lock().load_failed(&error.to_string());

		self.present(intents);
		self.record(
			TraceEntry::new(correlation_id, FlowKind::SessionLoad, TraceEvent::LoadFailed)
				.with_detail(error.to_string()),
		);

		match outcome {
			LoadFailureOutcome::Retry { attempt, delay } => {
				if self.schedule_retry(delay) {
					self.record(
						TraceEntry::new(correlation_id, FlowKind::SessionLoad, TraceEvent::RetryScheduled)
							.with_detail(format!("attempt {attempt} in {}s", delay.as_secs())),
					);
				}

				Err(error)
			},
			LoadFailureOutcome::Exhausted { attempts } =>
				Err(SessionError::RetriesExhausted { attempts, last: Box::new(error) }),
		}
	}

	async fn refresh_once(&self, correlation_id: Uuid) -> Result<(), SessionError> {
		let token = self.0.source.fetch_token().await?;

		// Nothing to push into before the first successful embed.
		if !self.0.embedded.load(Ordering::SeqCst) {
			return Ok(());
		}

		self.0.surface.set_access_token(&token.value).await?;
		self.record(TraceEntry::new(correlation_id, FlowKind::SessionRefresh, TraceEvent::Refreshed));
		self.install(token, correlation_id);

		Ok(())
	}

	fn install(&self, token: EmbedToken, correlation_id: Uuid) {
		let expires_at = token.expires_at;

		*self.0.current.lock() = Some(token);

		self.present(vec![SessionIntent::TokenExpiry(expires_at)]);
		self.arm_refresh(expires_at, correlation_id);
	}

	fn arm_refresh(&self, expires_at: OffsetDateTime, correlation_id: Uuid) {
		if self.0.closed.load(Ordering::SeqCst) {
			return;
		}

		let weak = Arc::downgrade(&self.0);
		let armed = self.0.refresh.arm(expires_at, move || {
			Box::pin(async move {
				if let Some(controller) = upgrade(&weak) {
					let _ = controller.refresh().await;
				}
			})
		});

		if let Some(schedule) = armed {
			self.record(
				TraceEntry::new(correlation_id, FlowKind::SessionRefresh, TraceEvent::RefreshScheduled)
					.with_detail(format!("refresh at {}", schedule.next_refresh_at)),
			);
		}
	}

	fn schedule_retry(&self, delay: StdDuration) -> bool {
		if self.0.closed.load(Ordering::SeqCst) {
			return false;
		}

		let weak = Arc::downgrade(&self.0);

		self.0.retry.replace(delay, move || {
			Box::pin(async move {
				if let Some(controller) = upgrade(&weak) {
					let _ = controller.load().await;
				}
			})
		})
	}

	fn present(&self, intents: Vec<SessionIntent>) {
		for intent in intents {
			self.0.presenter.present(intent);
		}
	}

	fn record(&self, entry: TraceEntry) {
		self.0.trace.record(entry);
	}
}
impl Debug for SessionController {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionController")
			.field("state", &self.state())
			.field("retry_attempt", &self.retry_attempt())
			.field("refresh", &self.0.refresh)
			.field("retry", &self.0.retry)
			.finish()
	}
}

fn upgrade(weak: &Weak<ControllerInner>) -> Option<SessionController> {
	weak.upgrade().map(SessionController)
}
