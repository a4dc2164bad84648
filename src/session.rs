//! Client-side embed session: keeps one viewer supplied with a valid embed token.
//!
//! [`SessionMachine`] holds the states and retry bookkeeping and emits [`SessionIntent`]s;
//! [`SessionController`] drives it against three ports ([`EmbedSessionSource`],
//! [`EmbedSurface`], [`SessionPresenter`]) and owns the two timers: the proactive
//! [`RefreshScheduler`] and the load retry timer.

mod controller;
mod machine;
mod scheduler;
mod source;
mod surface;

pub use controller::*;
pub use machine::*;
pub use scheduler::*;
pub use source::*;
pub use surface::*;

// self
use crate::_prelude::*;

/// Boxed future returned by session ports and controller operations.
pub type SessionFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a + Send>>;

/// Failures surfaced by [`SessionController`].
#[derive(Debug, ThisError)]
pub enum SessionError {
	/// Configuration or token could not be fetched.
	#[error(transparent)]
	Load(#[from] SourceError),
	/// The surface refused to embed or to take the new token.
	#[error(transparent)]
	Surface(#[from] SurfaceError),
	/// The last automatic retry failed; only a manual retry starts over.
	#[error("Report load failed after {attempts} retries: {last}")]
	RetriesExhausted {
		/// Retries spent.
		attempts: u32,
		/// Failure of the final attempt.
		#[source]
		last: Box<SessionError>,
	},
	/// A token refresh failed; the viewer must reload.
	#[error("Embed token refresh failed: {source}")]
	RefreshFailed {
		/// Underlying failure.
		#[source]
		source: Box<SessionError>,
	},
}
