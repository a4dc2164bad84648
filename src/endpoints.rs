//! Identity-provider and embedding-API endpoint set, plus the URLs derived from it.
//!
//! The defaults target the public cloud. Tests and sovereign-cloud deployments override
//! individual bases through [`ServiceEndpointsBuilder`], which enforces HTTPS for every
//! non-loopback host.

// std
use std::net::{Ipv4Addr, Ipv6Addr};
// crates.io
use url::Host;
// self
use crate::{
	_prelude::*,
	auth::{ReportId, TenantId, WorkspaceId},
};

/// Scope requested in the client-credentials exchange.
pub const EMBEDDING_API_SCOPE: &str = "https://analysis.windows.net/powerbi/api/.default";

const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";
const DEFAULT_API: &str = "https://api.powerbi.com";
const DEFAULT_APP: &str = "https://app.powerbi.com";

/// Errors raised while constructing endpoints or deriving URLs from them.
#[derive(Debug, PartialEq, Eq, ThisError)]
pub enum EndpointError {
	/// Endpoint string could not be parsed.
	#[error("The {endpoint} endpoint is not a valid URL.")]
	Parse {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Endpoints must use HTTPS unless they point at a loopback host.
	#[error("The {endpoint} endpoint must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Endpoint URL that failed validation.
		url: String,
	},
	/// Endpoint cannot carry path segments (e.g. `mailto:`).
	#[error("The {endpoint} endpoint cannot be used as a base URL.")]
	CannotBeABase {
		/// Which endpoint failed validation.
		endpoint: &'static str,
	},
}

/// Base URLs for the identity provider, the embedding REST API, and the report viewer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEndpoints {
	/// Identity-provider authority host.
	pub authority: Url,
	/// Embedding REST API base.
	pub api: Url,
	/// Report viewer base used to build embed URLs.
	pub app: Url,
}
impl ServiceEndpoints {
	/// Creates a builder seeded with the public-cloud defaults.
	pub fn builder() -> ServiceEndpointsBuilder {
		ServiceEndpointsBuilder::default()
	}

	/// `{authority}/{tenant}/oauth2/v2.0/token`
	pub fn token_endpoint(&self, tenant: &TenantId) -> Result<Url, EndpointError> {
		extend_path(&self.authority, "authority", &[tenant.as_ref(), "oauth2", "v2.0", "token"])
	}

	/// `{api}/v1.0/myorg/groups/{workspace}/reports/{report}/GenerateToken`
	pub fn generate_token_endpoint(
		&self,
		workspace: &WorkspaceId,
		report: &ReportId,
	) -> Result<Url, EndpointError> {
		extend_path(&self.api, "api", &[
			"v1.0",
			"myorg",
			"groups",
			workspace.as_ref(),
			"reports",
			report.as_ref(),
			"GenerateToken",
		])
	}

	/// `{app}/reportEmbed?reportId={report}&groupId={workspace}`
	pub fn report_embed_url(
		&self,
		workspace: &WorkspaceId,
		report: &ReportId,
	) -> Result<Url, EndpointError> {
		let mut url = extend_path(&self.app, "app", &["reportEmbed"])?;

		url.query_pairs_mut()
			.append_pair("reportId", report.as_ref())
			.append_pair("groupId", workspace.as_ref());

		Ok(url)
	}
}

/// Builder for [`ServiceEndpoints`] values.
#[derive(Debug, Default)]
pub struct ServiceEndpointsBuilder {
	/// Identity-provider authority override.
	pub authority: Option<Url>,
	/// Embedding API base override.
	pub api: Option<Url>,
	/// Report viewer base override.
	pub app: Option<Url>,
}
impl ServiceEndpointsBuilder {
	/// Overrides the identity-provider authority.
	pub fn authority(mut self, url: Url) -> Self {
		self.authority = Some(url);

		self
	}

	/// Overrides the embedding API base.
	pub fn api(mut self, url: Url) -> Self {
		self.api = Some(url);

		self
	}

	/// Overrides the report viewer base.
	pub fn app(mut self, url: Url) -> Self {
		self.app = Some(url);

		self
	}

	/// Consumes the builder and validates the resulting endpoints.
	pub fn build(self) -> Result<ServiceEndpoints, EndpointError> {
		let endpoints = ServiceEndpoints {
			authority: or_default(self.authority, "authority", DEFAULT_AUTHORITY)?,
			api: or_default(self.api, "api", DEFAULT_API)?,
			app: or_default(self.app, "app", DEFAULT_APP)?,
		};

		validate_endpoint("authority", &endpoints.authority)?;
		validate_endpoint("api", &endpoints.api)?;
		validate_endpoint("app", &endpoints.app)?;

		Ok(endpoints)
	}
}

/// Parses an endpoint override, tagging failures with the endpoint name.
pub(crate) fn parse_endpoint(endpoint: &'static str, raw: &str) -> Result<Url, EndpointError> {
	Url::parse(raw).map_err(|source| EndpointError::Parse { endpoint, source })
}

fn or_default(
	url: Option<Url>,
	endpoint: &'static str,
	default: &str,
) -> Result<Url, EndpointError> {
	match url {
		Some(url) => Ok(url),
		None => parse_endpoint(endpoint, default),
	}
}

fn validate_endpoint(endpoint: &'static str, url: &Url) -> Result<(), EndpointError> {
	if url.cannot_be_a_base() {
		return Err(EndpointError::CannotBeABase { endpoint });
	}

	match url.scheme() {
		"https" => Ok(()),
		"http" if is_loopback(url) => Ok(()),
		_ => Err(EndpointError::InsecureEndpoint { endpoint, url: url.to_string() }),
	}
}

fn is_loopback(url: &Url) -> bool {
	match url.host() {
		Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
		Some(Host::Ipv4(ip)) => ip.is_loopback() || ip == Ipv4Addr::UNSPECIFIED,
		Some(Host::Ipv6(ip)) => ip.is_loopback() || ip == Ipv6Addr::UNSPECIFIED,
		None => false,
	}
}

fn extend_path(base: &Url, endpoint: &'static str, segments: &[&str]) -> Result<Url, EndpointError> {
	let mut url = base.clone();

	url.path_segments_mut()
		.map_err(|_| EndpointError::CannotBeABase { endpoint })?
		.pop_if_empty()
		.extend(segments);

	Ok(url)
}
