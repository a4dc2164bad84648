//! Single-slot cache for the service principal's identity-provider access token.
//!
//! The cache owns exactly one [`CachedIdentityToken`] at a time. A hit never touches the
//! network; a miss performs one client-credentials exchange and replaces the slot. Concurrent
//! misses coalesce behind a singleflight guard: the first caller performs the exchange, the rest
//! re-check the slot once it finishes and reuse the result. Failures leave the slot untouched and
//! are never retried here.

// self
use crate::{
	_prelude::*,
	auth::CachedIdentityToken,
	clock::Clock,
	config::BrokerConfig,
	endpoints::EMBEDDING_API_SCOPE,
	error::ConfigError,
	http::TokenHttpClient,
	oauth::{ClientCredentialsFacade, TransportErrorMapper},
	obs::{self, FlowKind, FlowOutcome, FlowSpan, TraceEntry, TraceEvent, TraceSink},
};

/// Process-wide identity token cache.
pub struct IdentityTokenCache<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	facade: ClientCredentialsFacade<C, M>,
	clock: Arc<dyn Clock>,
	trace: Arc<dyn TraceSink>,
	slot: Mutex<Option<CachedIdentityToken>>,
	singleflight: AsyncMutex<()>,
}
impl<C, M> IdentityTokenCache<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates an empty cache for the configured service principal.
	pub fn new(
		config: &BrokerConfig,
		http_client: Arc<C>,
		error_mapper: Arc<M>,
		clock: Arc<dyn Clock>,
		trace: Arc<dyn TraceSink>,
	) -> Result<Self> {
		let token_endpoint =
			config.endpoints.token_endpoint(&config.tenant_id).map_err(ConfigError::from)?;
		let facade = ClientCredentialsFacade::new(
			token_endpoint,
			&config.client_id,
			&config.client_secret,
			http_client,
			error_mapper,
		);

		Ok(Self {
			facade,
			clock,
			trace,
			slot: Mutex::new(None),
			singleflight: AsyncMutex::new(()),
		})
	}

	/// Returns a token that is valid right now, exchanging credentials only when the slot is
	/// empty or expired.
	///
	/// Every call records a trace entry under a fresh correlation id, hit or miss.
	pub async fn acquire(&self) -> Result<CachedIdentityToken> {
		const KIND: FlowKind = FlowKind::IdentityToken;

		let correlation_id = obs::correlation_id();
		let span = FlowSpan::new(KIND, "acquire", correlation_id);

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.acquire_traced(correlation_id)).await;

		obs::record_result(KIND, result)
	}

	/// Returns the cached token without contacting the identity provider, expired or not.
	pub fn peek(&self) -> Option<CachedIdentityToken> {
		self.slot.lock().clone()
	}

	/// Empties the slot so the next [`acquire`](Self::acquire) performs an exchange.
	pub fn invalidate(&self) {
		self.slot.lock().take();
	}

	async fn acquire_traced(&self, correlation_id: Uuid) -> Result<CachedIdentityToken> {
		if let Some(token) = self.valid_token() {
			self.record(TraceEntry::new(correlation_id, FlowKind::IdentityToken, TraceEvent::CacheHit));

			return Ok(token);
		}

		let _singleflight = self.singleflight.lock().await;

		// Another caller may have refilled the slot while this one waited.
		if let Some(token) = self.valid_token() {
			self.record(
				TraceEntry::new(correlation_id, FlowKind::IdentityToken, TraceEvent::CacheHit)
					.with_detail("coalesced"),
			);

			return Ok(token);
		}

		self.record(TraceEntry::new(correlation_id, FlowKind::IdentityToken, TraceEvent::CacheMiss));

		let issued = self.facade.exchange(EMBEDDING_API_SCOPE).await.and_then(|grant| {
			CachedIdentityToken::from_lifetime(grant.access_token, self.clock.now(), grant.lifetime)
				.ok_or_else(|| Error::authentication("token response carried an unusable expires_in"))
		});

		match issued {
			Ok(token) => {
				*self.slot.lock() = Some(token.clone());

				self.record(
					TraceEntry::new(correlation_id, FlowKind::IdentityToken, TraceEvent::Acquired)
						.with_detail(format!("expires at {}", token.expires_at)),
				);

				Ok(token)
			},
			Err(e) => {
				self.record(
					TraceEntry::new(correlation_id, FlowKind::IdentityToken, TraceEvent::Failed)
						.with_detail(e.to_string()),
				);

				Err(e)
			},
		}
	}

	fn valid_token(&self) -> Option<CachedIdentityToken> {
		let now = self.clock.now();

		self.slot.lock().as_ref().filter(|token| token.is_valid_at(now)).cloned()
	}

	fn record(&self, entry: TraceEntry) {
		self.trace.record(entry);
	}
}
impl<C, M> Debug for IdentityTokenCache<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("IdentityTokenCache").field("cached", &self.slot.lock().is_some()).finish()
	}
}
