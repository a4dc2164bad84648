//! Where a session gets its report configuration and embed tokens from.

// crates.io
#[cfg(feature = "reqwest")] use reqwest::{Response, header::CONTENT_TYPE};
// self
use crate::{
	_prelude::*,
	api::ReportConfig,
	auth::EmbedToken,
	error::BoxError,
	flows::EmbedTokenService,
	obs,
	session::SessionFuture,
};
#[cfg(feature = "reqwest")]
use crate::{
	api::{TokenFailurePayload, TokenSuccessPayload},
	error::ConfigError,
	http::REQUEST_TIMEOUT,
};

/// Failure to obtain configuration or a token.
#[derive(Debug, ThisError)]
pub enum SourceError {
	/// The in-process broker failed.
	#[error(transparent)]
	Broker(#[from] Error),
	/// The broker API answered with a failure status.
	#[error("{message}")]
	Rejected {
		/// HTTP status code.
		status: u16,
		/// Message reported by the API.
		message: String,
	},
	/// The broker API could not be reached or answered something unreadable.
	#[error("Broker API request failed.")]
	Transport {
		/// Underlying failure.
		#[source]
		source: BoxError,
	},
}
impl SourceError {
	/// Wraps a transport failure.
	pub fn transport(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::Transport { source: Box::new(src) }
	}
}

/// Supplies an embed session with configuration and fresh tokens.
pub trait EmbedSessionSource
where
	Self: Send + Sync,
{
	/// Fetches the non-sensitive report configuration.
	fn fetch_config(&self) -> SessionFuture<'_, Result<ReportConfig, SourceError>>;

	/// Fetches a fresh embed token.
	fn fetch_token(&self) -> SessionFuture<'_, Result<EmbedToken, SourceError>>;
}

/// Calls a broker in the same process.
#[derive(Clone)]
pub struct DirectSource(Arc<dyn EmbedTokenService>);
impl DirectSource {
	/// Wraps a broker.
	pub fn new(service: Arc<dyn EmbedTokenService>) -> Self {
		Self(service)
	}
}
impl EmbedSessionSource for DirectSource {
	fn fetch_config(&self) -> SessionFuture<'_, Result<ReportConfig, SourceError>> {
		Box::pin(async move { Ok(self.0.report_config(obs::correlation_id())) })
	}

	fn fetch_token(&self) -> SessionFuture<'_, Result<EmbedToken, SourceError>> {
		Box::pin(async move { self.0.issue_embed_token().await.map_err(SourceError::from) })
	}
}
impl Debug for DirectSource {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("DirectSource").field(&self.0.environment()).finish()
	}
}

/// Calls the broker's HTTP API (`GET /api/config`, `POST /api/token`).
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug)]
pub struct HttpSessionSource {
	client: ReqwestClient,
	base: Url,
}
#[cfg(feature = "reqwest")]
impl HttpSessionSource {
	/// Targets the API under `base` with a client bounded by [`REQUEST_TIMEOUT`].
	pub fn new(base: Url) -> Result<Self, ConfigError> {
		let client = ReqwestClient::builder().timeout(REQUEST_TIMEOUT).build()?;

		Ok(Self::with_client(client, base))
	}

	/// Targets the API under `base` with a caller-provided client.
	pub fn with_client(client: ReqwestClient, mut base: Url) -> Self {
		if !base.path().ends_with('/') {
			let path = format!("{}/", base.path());

			base.set_path(&path);
		}

		Self { client, base }
	}

	fn endpoint(&self, path: &str) -> Result<Url, SourceError> {
		self.base.join(path).map_err(SourceError::transport)
	}
}
#[cfg(feature = "reqwest")]
impl EmbedSessionSource for HttpSessionSource {
	fn fetch_config(&self) -> SessionFuture<'_, Result<ReportConfig, SourceError>> {
		Box::pin(async move {
			let response = self
				.client
				.get(self.endpoint("api/config")?)
				.send()
				.await
				.map_err(SourceError::transport)?;

			if !response.status().is_success() {
				return Err(rejected(response, "Config fetch failed").await);
			}

			response.json::<ReportConfig>().await.map_err(SourceError::transport)
		})
	}

	fn fetch_token(&self) -> SessionFuture<'_, Result<EmbedToken, SourceError>> {
		Box::pin(async move {
			let response = self
				.client
				.post(self.endpoint("api/token")?)
				.header(CONTENT_TYPE, "application/json")
				.send()
				.await
				.map_err(SourceError::transport)?;

			if !response.status().is_success() {
				return Err(rejected(response, "Token fetch failed").await);
			}

			let payload =
				response.json::<TokenSuccessPayload>().await.map_err(SourceError::transport)?;

			Ok(payload.into_embed_token())
		})
	}
}

/// Prefers the API's own failure message; falls back to `{context}: {reason}`.
#[cfg(feature = "reqwest")]
async fn rejected(response: Response, context: &str) -> SourceError {
	let status = response.status();
	let fallback =
		format!("{context}: {}", status.canonical_reason().unwrap_or_else(|| status.as_str()));
	let message = match response.json::<TokenFailurePayload>().await {
		Ok(payload) if !payload.error.is_empty() => payload.error,
		_ => fallback,
	};

	SourceError::Rejected { status: status.as_u16(), message }
}
