//! Broker-level error types shared by the identity cache, the embed issuer, and the exposed API.

// self
use crate::{_prelude::*, auth::IdentifierError, endpoints::EndpointError};

/// Broker-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical broker error exposed by public APIs.
///
/// Every network-facing operation either succeeds or raises one of these variants; none of them
/// are retried inside the broker.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Missing or malformed configuration; fatal at startup.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// The client-credentials exchange with the identity provider failed.
	#[error("Identity provider authentication failed: {reason}.")]
	Authentication {
		/// Provider- or broker-supplied reason string.
		reason: String,
		/// Underlying transport or parsing failure, when one exists.
		#[source]
		source: Option<BoxError>,
	},
	/// The embedding API answered 403; the service principal lacks workspace access.
	#[error("Embedding API denied access: {reason}.")]
	AccessDenied {
		/// Broker-supplied reason string.
		reason: String,
	},
	/// Any other embed token issuance failure.
	#[error("Embed token issuance failed: {message}.")]
	EmbedIssuance {
		/// Human-readable summary of the failure.
		message: String,
		/// HTTP status code, when the embedding API answered.
		status: Option<u16>,
		/// Underlying transport or parsing failure, when one exists.
		#[source]
		source: Option<BoxError>,
	},
}
impl Error {
	pub(crate) fn authentication(reason: impl Into<String>) -> Self {
		Self::Authentication { reason: reason.into(), source: None }
	}

	pub(crate) fn authentication_from(upstream: UpstreamError) -> Self {
		match upstream {
			UpstreamError::Config(e) => Self::Config(e),
			other => Self::Authentication { reason: other.to_string(), source: Some(Box::new(other)) },
		}
	}

	pub(crate) fn issuance_from(upstream: UpstreamError) -> Self {
		match upstream {
			UpstreamError::Config(e) => Self::Config(e),
			other => Self::EmbedIssuance {
				message: other.to_string(),
				status: other.status(),
				source: Some(Box::new(other)),
			},
		}
	}
}

/// Configuration and validation failures raised by the broker.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// A service endpoint is invalid.
	#[error(transparent)]
	Endpoint(#[from] EndpointError),
	/// Required environment variables are absent or empty.
	#[error("Missing required environment variables: {}.", names.join(", "))]
	MissingVariables {
		/// Every missing variable, in declaration order.
		names: Vec<&'static str>,
	},
	/// An environment variable holds a malformed identifier.
	#[error("{variable} is invalid.")]
	InvalidIdentifier {
		/// Offending variable name.
		variable: &'static str,
		/// Validation failure.
		#[source]
		source: IdentifierError,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Failure reported by a transport before the broker classifies it for its caller.
#[derive(Debug, ThisError)]
pub enum UpstreamError {
	/// The request could not be built.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Temporary upstream failure.
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),
}
impl UpstreamError {
	/// HTTP status attached to the failure, if the upstream answered at all.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Transient(TransientError::Endpoint { status, .. })
			| Self::Transient(TransientError::ResponseParse { status, .. }) => *status,
			_ => None,
		}
	}
}

/// Temporary failure variants.
#[derive(Debug, ThisError)]
pub enum TransientError {
	/// Upstream returned an unexpected but non-fatal response, or timed out.
	#[error("Upstream returned an unexpected response: {message}.")]
	Endpoint {
		/// Provider- or broker-supplied message summarizing the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Upstream responded with JSON that could not be parsed.
	#[error("Upstream returned malformed JSON.")]
	ResponseParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::error::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling upstream.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling upstream.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}
