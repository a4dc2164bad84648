//! Injectable time sources so expiry rules can be exercised without wall-clock waits.

// self
use crate::_prelude::*;

/// Represents a clock, which can tell the current time.
pub trait Clock
where
	Self: Send + Sync,
{
	/// Gets the current time according to this clock.
	fn now(&self) -> OffsetDateTime;
}

/// The system clock, in UTC.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SystemClock;
impl Clock for SystemClock {
	fn now(&self) -> OffsetDateTime {
		OffsetDateTime::now_utc()
	}
}

/// A shareable test clock which only moves when told to.
///
/// Clones observe the same instant, so a test can keep one handle while the broker owns another.
#[derive(Clone, Debug)]
pub struct ManualClock(Arc<Mutex<OffsetDateTime>>);
impl ManualClock {
	/// Creates a clock frozen at `start`.
	pub fn new(start: OffsetDateTime) -> Self {
		Self(Arc::new(Mutex::new(start)))
	}

	/// Moves the clock to `instant`.
	pub fn set(&self, instant: OffsetDateTime) {
		*self.0.lock() = instant;
	}

	/// Moves the clock forward by `delta`.
	pub fn advance(&self, delta: Duration) {
		*self.0.lock() += delta;
	}
}
impl Clock for ManualClock {
	fn now(&self) -> OffsetDateTime {
		*self.0.lock()
	}
}
