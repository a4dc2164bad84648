//! Pure session state machine: states, retry bookkeeping, refresh schedule math, and the
//! presentation intents each transition emits. Nothing here touches timers or I/O.

// self
use crate::{_prelude::*, session::SurfaceError};

/// Consecutive load failures tolerated before giving up.
pub const MAX_LOAD_ATTEMPTS: u32 = 3;
/// Linear backoff unit between load retries.
pub const RETRY_BASE_DELAY: StdDuration = StdDuration::from_secs(2);
/// Lead time before embed token expiry at which a replacement is fetched.
pub const REFRESH_MARGIN: Duration = Duration::minutes(5);

const RETRIES_EXHAUSTED: &str = "Failed to load report after multiple attempts";
const REFRESH_FAILED: &str = "Token expired. Please refresh the page.";
const UNKNOWN_RUNTIME_ERROR: &str = "Unknown error occurred";

/// Connectivity of one embed session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SessionState {
	/// Nothing loaded yet.
	#[default]
	Idle,
	/// A load is in flight.
	Connecting,
	/// The surface reported the report as loaded.
	Connected,
	/// The last load failed; left only by a retry or a manual action.
	Disconnected,
}

/// Status indicator shown to the viewer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConnectionStatus {
	/// A load is in flight.
	Connecting,
	/// The report is live.
	Connected,
	/// The session lost its report.
	Disconnected,
}
impl ConnectionStatus {
	/// Indicator text.
	pub const fn label(self) -> &'static str {
		match self {
			ConnectionStatus::Connecting => "Connecting...",
			ConnectionStatus::Connected => "Connected",
			ConnectionStatus::Disconnected => "Disconnected",
		}
	}
}

/// Side effect requested from the presentation adapter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionIntent {
	/// Show the loading indicator in place of the report.
	ShowLoader,
	/// Hide the loading indicator and reveal the report.
	HideLoader,
	/// Show a user-visible failure message.
	ShowError(String),
	/// Clear any visible failure message.
	HideError,
	/// Update the connectivity indicator.
	Status(ConnectionStatus),
	/// Display the expiry of the token now in use.
	TokenExpiry(OffsetDateTime),
}

/// Consecutive load failures since the last success or manual reset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RetryState {
	attempt: u32,
}
impl RetryState {
	/// Delay before retry number `attempt` (1-based): `RETRY_BASE_DELAY × attempt`.
	pub fn delay(attempt: u32) -> StdDuration {
		RETRY_BASE_DELAY * attempt
	}

	/// Failures counted so far.
	pub fn attempt(&self) -> u32 {
		self.attempt
	}

	/// Counts one more failure and returns the delay before the next attempt, or `None` once
	/// [`MAX_LOAD_ATTEMPTS`] retries have been spent.
	pub fn next_delay(&mut self) -> Option<StdDuration> {
		if self.attempt >= MAX_LOAD_ATTEMPTS {
			return None;
		}

		self.attempt += 1;

		Some(Self::delay(self.attempt))
	}

	/// Forgets every counted failure.
	pub fn reset(&mut self) {
		self.attempt = 0;
	}
}

/// When a proactive refresh should happen for a given embed token expiry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RefreshSchedule {
	/// Expiry reported by the embedding API.
	pub expires_at: OffsetDateTime,
	/// `expires_at − REFRESH_MARGIN`.
	pub next_refresh_at: OffsetDateTime,
}
impl RefreshSchedule {
	/// Computes the schedule for a token expiring at `expires_at`.
	pub fn for_expiry(expires_at: OffsetDateTime) -> Self {
		Self { expires_at, next_refresh_at: expires_at - REFRESH_MARGIN }
	}

	/// Time left until the refresh instant, or `None` when it is not strictly in the future.
	pub fn delay_from(&self, now: OffsetDateTime) -> Option<StdDuration> {
		let delay = self.next_refresh_at - now;

		if delay.is_positive() { StdDuration::try_from(delay).ok() } else { None }
	}
}

/// What happens after a failed load.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadFailureOutcome {
	/// Load again after `delay`.
	Retry {
		/// Retry number, 1-based.
		attempt: u32,
		/// Wait before the retry.
		delay: StdDuration,
	},
	/// No automatic retry remains.
	Exhausted {
		/// Failures counted.
		attempts: u32,
	},
}

/// Reaction to a runtime error reported by the embed surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuntimeErrorAction {
	/// The token expired; refresh now without touching the state.
	Refresh,
	/// Show the error; connectivity is unchanged.
	Surface,
}

/// Session state plus retry bookkeeping.
#[derive(Clone, Debug, Default)]
pub struct SessionMachine {
	state: SessionState,
	retry: RetryState,
}
impl SessionMachine {
	/// Current state.
	pub fn state(&self) -> SessionState {
		self.state
	}

	/// Retry bookkeeping.
	pub fn retry(&self) -> RetryState {
		self.retry
	}

	/// Enters `Connecting`.
	pub fn begin_load(&mut self) -> Vec<SessionIntent> {
		self.state = SessionState::Connecting;

		vec![
			SessionIntent::ShowLoader,
			SessionIntent::HideError,
			SessionIntent::Status(ConnectionStatus::Connecting),
		]
	}

	/// The surface reported the report as loaded: enters `Connected` and resets retries.
	pub fn loaded(&mut self) -> Vec<SessionIntent> {
		self.state = SessionState::Connected;
		self.retry.reset();

		vec![SessionIntent::HideLoader, SessionIntent::Status(ConnectionStatus::Connected)]
	}

	/// A load failed with `message`: enters `Disconnected` and decides whether to retry.
	pub fn load_failed(&mut self, message: &str) -> (LoadFailureOutcome, Vec<SessionIntent>) {
		self.state = SessionState::Disconnected;

		let mut intents =
			vec![SessionIntent::HideLoader, SessionIntent::Status(ConnectionStatus::Disconnected)];

		match self.retry.next_delay() {
			Some(delay) => {
				let attempt = self.retry.attempt();

				intents.push(SessionIntent::ShowError(format!(
					"Connection failed. Retrying {attempt}/{MAX_LOAD_ATTEMPTS}..."
				)));

				(LoadFailureOutcome::Retry { attempt, delay }, intents)
			},
			None => {
				let shown = if message.trim().is_empty() { RETRIES_EXHAUSTED } else { message };

				intents.push(SessionIntent::ShowError(shown.to_owned()));

				(LoadFailureOutcome::Exhausted { attempts: self.retry.attempt() }, intents)
			},
		}
	}

	/// A user asked to try again: forgets every counted failure.
	pub fn manual_retry(&mut self) {
		self.retry.reset();
	}

	/// Classifies a runtime error. Neither branch changes the state.
	pub fn runtime_error(&self, error: &SurfaceError) -> (RuntimeErrorAction, Vec<SessionIntent>) {
		if error.is_token_expired() {
			return (RuntimeErrorAction::Refresh, Vec::new());
		}

		let message = if error.message.trim().is_empty() {
			UNKNOWN_RUNTIME_ERROR
		} else {
			error.message.as_str()
		};

		(
			RuntimeErrorAction::Surface,
			vec![SessionIntent::ShowError(format!("Report error: {message}"))],
		)
	}

	/// A refresh failed; the session is left as is and the viewer must reload.
	pub fn refresh_failed(&self) -> Vec<SessionIntent> {
		vec![SessionIntent::ShowError(REFRESH_FAILED.into())]
	}
}
