//! Token models: the redacted secret wrapper, the cached identity token, and the embed token.

// self
use crate::_prelude::*;

/// Time subtracted from an identity token's issuer-reported lifetime before it is treated as
/// expired by the cache.
pub const IDENTITY_SAFETY_MARGIN: Duration = Duration::seconds(300);

/// Redacted secret wrapper keeping bearer material and client secrets out of logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenSecret(String);
impl TokenSecret {
	/// Wraps a new secret string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the inner value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}
}
impl AsRef<str> for TokenSecret {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl Debug for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("TokenSecret").field(&"<redacted>").finish()
	}
}
impl Display for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

/// Identity-provider access token held in the single process-wide cache slot.
///
/// Values are replaced on renewal, never mutated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CachedIdentityToken {
	/// Bearer value presented to the embedding API.
	pub value: TokenSecret,
	/// Instant the exchange completed.
	pub issued_at: OffsetDateTime,
	/// Instant after which the token must not be reused.
	pub expires_at: OffsetDateTime,
}
impl CachedIdentityToken {
	/// Builds a cache entry from the issuer-reported lifetime, applying
	/// [`IDENTITY_SAFETY_MARGIN`].
	///
	/// Returns `None` when the expiry instant falls outside the representable date range.
	pub fn from_lifetime(
		value: TokenSecret,
		issued_at: OffsetDateTime,
		lifetime: Duration,
	) -> Option<Self> {
		let expires_at =
			issued_at.checked_add(lifetime)?.checked_sub(IDENTITY_SAFETY_MARGIN)?;

		Some(Self { value, issued_at, expires_at })
	}

	/// Returns `true` while `instant` is strictly before the expiry instant.
	pub fn is_valid_at(&self, instant: OffsetDateTime) -> bool {
		instant < self.expires_at
	}
}

/// View-only bearer credential scoped to one workspace/report pair.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedToken {
	/// Bearer value handed to the embed surface.
	pub value: TokenSecret,
	/// Expiry reported by the embedding API; never computed locally.
	#[serde(with = "time::serde::rfc3339")]
	pub expires_at: OffsetDateTime,
	/// Report-viewing URL for the workspace/report pair.
	pub embed_url: Url,
	/// Trace identifier of the issuance call.
	pub correlation_id: Uuid,
}
impl EmbedToken {
	/// Time left before the token expires, clamped at zero.
	pub fn remaining_at(&self, instant: OffsetDateTime) -> Duration {
		let remaining = self.expires_at - instant;

		if remaining.is_negative() { Duration::ZERO } else { remaining }
	}
}
