//! Injected diagnostics port.

// self
use crate::{_prelude::*, obs::FlowKind};

/// Notable points in a flow that are worth a diagnostic line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceEvent {
	/// A cached identity token was reused.
	CacheHit,
	/// No usable identity token was cached.
	CacheMiss,
	/// The identity provider issued a new token.
	Acquired,
	/// The embedding API issued a new embed token.
	Issued,
	/// A broker call failed.
	Failed,
	/// A session load started.
	Loading,
	/// The embed surface reported the report as loaded.
	Loaded,
	/// A session load attempt failed.
	LoadFailed,
	/// A delayed load retry was armed.
	RetryScheduled,
	/// A proactive refresh timer was armed.
	RefreshScheduled,
	/// A new embed token was pushed to the live surface.
	Refreshed,
	/// A refresh attempt failed.
	RefreshFailed,
	/// The embed surface reported a runtime error.
	RuntimeError,
	/// The embed surface finished rendering.
	Rendered,
}
impl TraceEvent {
	/// Returns a stable label for log fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			TraceEvent::CacheHit => "cache_hit",
			TraceEvent::CacheMiss => "cache_miss",
			TraceEvent::Acquired => "acquired",
			TraceEvent::Issued => "issued",
			TraceEvent::Failed => "failed",
			TraceEvent::Loading => "loading",
			TraceEvent::Loaded => "loaded",
			TraceEvent::LoadFailed => "load_failed",
			TraceEvent::RetryScheduled => "retry_scheduled",
			TraceEvent::RefreshScheduled => "refresh_scheduled",
			TraceEvent::Refreshed => "refreshed",
			TraceEvent::RefreshFailed => "refresh_failed",
			TraceEvent::RuntimeError => "runtime_error",
			TraceEvent::Rendered => "rendered",
		}
	}

	/// Whether the event describes a failure.
	pub const fn is_failure(self) -> bool {
		matches!(
			self,
			TraceEvent::Failed
				| TraceEvent::LoadFailed
				| TraceEvent::RefreshFailed
				| TraceEvent::RuntimeError
		)
	}
}
impl Display for TraceEvent {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// One diagnostic record. Secrets never appear in `detail`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TraceEntry {
	/// Correlation id shared by every entry of one operation.
	pub correlation_id: Uuid,
	/// Operation the entry belongs to.
	pub flow: FlowKind,
	/// What happened.
	pub event: TraceEvent,
	/// Free-form context such as an error message or a delay.
	pub detail: Option<String>,
}
impl TraceEntry {
	/// Creates an entry without detail.
	pub fn new(correlation_id: Uuid, flow: FlowKind, event: TraceEvent) -> Self {
		Self { correlation_id, flow, event, detail: None }
	}

	/// Attaches detail text.
	pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
		self.detail = Some(detail.into());

		self
	}
}

/// Receives diagnostic entries from the broker and the session controller.
pub trait TraceSink
where
	Self: Send + Sync,
{
	/// Records one entry. Implementations must not block.
	fn record(&self, entry: TraceEntry);
}

/// Forwards entries to the `tracing` subscriber; failures are logged at `warn`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;
impl TraceSink for TracingSink {
	fn record(&self, entry: TraceEntry) {
		#[cfg(feature = "tracing")]
		{
			let detail = entry.detail.as_deref().unwrap_or_default();

			if entry.event.is_failure() {
				tracing::warn!(
					correlation_id = %entry.correlation_id,
					flow = entry.flow.as_str(),
					event = entry.event.as_str(),
					detail,
					"broker trace"
				);
			} else {
				tracing::info!(
					correlation_id = %entry.correlation_id,
					flow = entry.flow.as_str(),
					event = entry.event.as_str(),
					detail,
					"broker trace"
				);
			}
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = entry;
		}
	}
}

/// Keeps every entry in memory so tests can assert on the diagnostic trail.
#[derive(Debug, Default)]
pub struct MemorySink(Mutex<Vec<TraceEntry>>);
impl MemorySink {
	/// Snapshot of every recorded entry, oldest first.
	pub fn entries(&self) -> Vec<TraceEntry> {
		self.0.lock().clone()
	}

	/// Events recorded for one flow, oldest first.
	pub fn events(&self, flow: FlowKind) -> Vec<TraceEvent> {
		self.0.lock().iter().filter(|entry| entry.flow == flow).map(|entry| entry.event).collect()
	}

	/// Drops every recorded entry.
	pub fn clear(&self) {
		self.0.lock().clear();
	}
}
impl TraceSink for MemorySink {
	fn record(&self, entry: TraceEntry) {
		self.0.lock().push(entry);
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn memory_sink_filters_by_flow() {
		let sink = MemorySink::default();
		let id = Uuid::new_v4();

		sink.record(TraceEntry::new(id, FlowKind::IdentityToken, TraceEvent::CacheMiss));
		sink.record(TraceEntry::new(id, FlowKind::EmbedToken, TraceEvent::Issued));
		sink.record(
			TraceEntry::new(id, FlowKind::IdentityToken, TraceEvent::Failed).with_detail("boom"),
		);

		assert_eq!(sink.events(FlowKind::IdentityToken), [TraceEvent::CacheMiss, TraceEvent::Failed]);
		assert_eq!(sink.entries()[2].detail.as_deref(), Some("boom"));

		sink.clear();

		assert!(sink.entries().is_empty());
	}

	#[test]
	fn tracing_sink_accepts_entries() {
		TracingSink.record(TraceEntry::new(Uuid::nil(), FlowKind::SessionLoad, TraceEvent::Loading));
	}
}
