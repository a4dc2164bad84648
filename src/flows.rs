//! Server-side token lifecycle: the identity token cache, the embed token issuer, and the
//! [`Broker`] facade that wires them to one configuration.

mod embed;
mod identity;

pub use embed::*;
pub use identity::*;

// self
use crate::{
	_prelude::*,
	api::ReportConfig,
	auth::EmbedToken,
	clock::Clock,
	config::{BrokerConfig, ReportTarget},
	http::TokenHttpClient,
	oauth::TransportErrorMapper,
	obs::TraceSink,
};
#[cfg(feature = "reqwest")]
use crate::{
	clock::SystemClock,
	http::{REQUEST_TIMEOUT, ReqwestHttpClient},
	oauth::ReqwestTransportErrorMapper,
	obs::TracingSink,
};

/// Boxed future returned by [`EmbedTokenService`] methods.
pub type BrokerFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;

#[cfg(feature = "reqwest")]
/// Broker specialized for the crate's default reqwest transport stack.
pub type ReqwestBroker = Broker<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Object-safe view of a broker, consumed by the HTTP API and the in-process session source.
pub trait EmbedTokenService
where
	Self: Send + Sync,
{
	/// Deployment label.
	fn environment(&self) -> &str;

	/// Non-sensitive configuration for the served report.
	fn report_config(&self, correlation_id: Uuid) -> ReportConfig;

	/// Mints a fresh embed token for the served report.
	fn issue_embed_token(&self) -> BrokerFuture<'_, EmbedToken>;
}

/// Owns the identity token cache and the embed token issuer for one service principal and one
/// report.
pub struct Broker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Shared identity token cache.
	pub identity: Arc<IdentityTokenCache<C, M>>,
	/// Issuer bound to the configured report.
	pub issuer: Arc<EmbedTokenIssuer<C, M>>,
	environment: String,
}
impl<C, M> Broker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a broker that reuses the caller-provided transport, mapper, clock, and trace sink.
	pub fn with_http_client(
		config: BrokerConfig,
		http_client: impl Into<Arc<C>>,
		mapper: impl Into<Arc<M>>,
		clock: Arc<dyn Clock>,
		trace: Arc<dyn TraceSink>,
	) -> Result<Self> {
		let http_client = http_client.into();
		let mapper = mapper.into();
		let identity = Arc::new(IdentityTokenCache::new(
			&config,
			http_client.clone(),
			mapper.clone(),
			clock,
			trace.clone(),
		)?);
		let issuer = Arc::new(EmbedTokenIssuer::new(
			identity.clone(),
			http_client,
			mapper,
			config.endpoints,
			config.target,
			trace,
		));

		Ok(Self { identity, issuer, environment: config.environment })
	}

	/// Report served by this broker.
	pub fn target(&self) -> &ReportTarget {
		self.issuer.target()
	}
}
#[cfg(feature = "reqwest")]
impl Broker<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Creates a broker with the default stack: a reqwest transport bounded by
	/// [`REQUEST_TIMEOUT`], the system clock, and a [`TracingSink`].
	pub fn new(config: BrokerConfig) -> Result<Self> {
		let http_client = ReqwestHttpClient::with_timeout(REQUEST_TIMEOUT)?;

		Self::with_http_client(
			config,
			http_client,
			ReqwestTransportErrorMapper,
			Arc::new(SystemClock),
			Arc::new(TracingSink),
		)
	}
}
impl<C, M> EmbedTokenService for Broker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn environment(&self) -> &str {
		&self.environment
	}

	fn report_config(&self, correlation_id: Uuid) -> ReportConfig {
		let target = self.target();

		ReportConfig {
			workspace_id: target.workspace_id.clone(),
			report_id: target.report_id.clone(),
			environment: self.environment.clone(),
			correlation_id,
		}
	}

	fn issue_embed_token(&self) -> BrokerFuture<'_, EmbedToken> {
		Box::pin(self.issuer.issue_default())
	}
}
impl<C, M> Clone for Broker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn clone(&self) -> Self {
		Self {
			identity: self.identity.clone(),
			issuer: self.issuer.clone(),
			environment: self.environment.clone(),
		}
	}
}
impl<C, M> Debug for Broker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Broker")
			.field("target", self.target())
			.field("environment", &self.environment)
			.finish()
	}
}
