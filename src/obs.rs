//! Observability helpers shared by the broker and the session controller.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `embed_token_broker.flow` with the `flow`
//!   and `stage` fields, and to let [`TracingSink`] forward trace entries as events.
//! - Enable `metrics` to increment the `embed_token_broker_flow_total` counter for every
//!   attempt/success/failure, labeled by `flow` + `outcome`.
//!
//! Diagnostics that tests need to assert on go through the injected [`TraceSink`] port instead of
//! a global subscriber.

mod metrics;
mod sink;
mod tracing;

pub use metrics::*;
pub use sink::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Operations observed by the broker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowKind {
	/// Client-credentials exchange with the identity provider.
	IdentityToken,
	/// `GenerateToken` call against the embedding API.
	EmbedToken,
	/// Initial or retried session load.
	SessionLoad,
	/// Proactive or reactive embed token refresh inside a live session.
	SessionRefresh,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::IdentityToken => "identity_token",
			FlowKind::EmbedToken => "embed_token",
			FlowKind::SessionLoad => "session_load",
			FlowKind::SessionRefresh => "session_refresh",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to a broker helper.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Creates a fresh correlation identifier for one broker operation.
pub fn correlation_id() -> Uuid {
	Uuid::new_v4()
}
