//! Startup configuration: service-principal credentials, the embedded report, and endpoints.

// self
use crate::{
	_prelude::*,
	auth::{ClientId, IdentifierError, ReportId, TenantId, TokenSecret, WorkspaceId},
	endpoints::{self, ServiceEndpoints},
	error::ConfigError,
};

const REQUIRED_VARIABLES: [&str; 5] =
	["CLIENT_ID", "CLIENT_SECRET", "TENANT_ID", "WORKSPACE_ID", "REPORT_ID"];
const DEFAULT_ENVIRONMENT: &str = "development";

/// Workspace/report pair an embed token is scoped to.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReportTarget {
	/// Workspace (group) that hosts the report.
	pub workspace_id: WorkspaceId,
	/// Report to embed.
	pub report_id: ReportId,
}

/// Validated broker configuration.
#[derive(Clone, Debug)]
pub struct BrokerConfig {
	/// Directory that owns the service principal.
	pub tenant_id: TenantId,
	/// Service principal application identifier.
	pub client_id: ClientId,
	/// Service principal secret.
	pub client_secret: TokenSecret,
	/// Report served to every session.
	pub target: ReportTarget,
	/// Deployment label echoed by the configuration endpoint.
	pub environment: String,
	/// Upstream endpoints.
	pub endpoints: ServiceEndpoints,
}
impl BrokerConfig {
	/// Loads configuration from the process environment.
	///
	/// Reads `CLIENT_ID`, `CLIENT_SECRET`, `TENANT_ID`, `WORKSPACE_ID`, `REPORT_ID`, the
	/// optional `APP_ENV` label (falling back to `NODE_ENV`), and the optional
	/// `AUTHORITY_HOST`, `API_BASE_URL`, and `APP_BASE_URL` endpoint overrides.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_lookup(|key| std::env::var(key).ok())
	}

	/// Loads configuration through an arbitrary variable lookup. Empty values count as missing.
	pub fn from_lookup<F>(mut lookup: F) -> Result<Self, ConfigError>
	where
		F: FnMut(&str) -> Option<String>,
	{
		let mut read = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
		let values = REQUIRED_VARIABLES.map(|key| read(key));
		let missing = REQUIRED_VARIABLES
			.iter()
			.zip(values.iter())
			.filter(|(_, value)| value.is_none())
			.map(|(key, _)| *key)
			.collect::<Vec<_>>();

		if !missing.is_empty() {
			return Err(ConfigError::MissingVariables { names: missing });
		}

		let [client_id, client_secret, tenant_id, workspace_id, report_id] =
			values.map(Option::unwrap_or_default);
		let mut endpoints = ServiceEndpoints::builder();

		if let Some(raw) = read("AUTHORITY_HOST") {
			endpoints = endpoints.authority(endpoints::parse_endpoint("authority", &raw)?);
		}
		if let Some(raw) = read("API_BASE_URL") {
			endpoints = endpoints.api(endpoints::parse_endpoint("api", &raw)?);
		}
		if let Some(raw) = read("APP_BASE_URL") {
			endpoints = endpoints.app(endpoints::parse_endpoint("app", &raw)?);
		}

		Ok(Self {
			tenant_id: identifier("TENANT_ID", TenantId::new(tenant_id))?,
			client_id: identifier("CLIENT_ID", ClientId::new(client_id))?,
			client_secret: TokenSecret::new(client_secret),
			target: ReportTarget {
				workspace_id: identifier("WORKSPACE_ID", WorkspaceId::new(workspace_id))?,
				report_id: identifier("REPORT_ID", ReportId::new(report_id))?,
			},
			environment: read("APP_ENV")
				.or_else(|| read("NODE_ENV"))
				.unwrap_or_else(|| DEFAULT_ENVIRONMENT.into()),
			endpoints: endpoints.build()?,
		})
	}
}

fn identifier<T>(
	variable: &'static str,
	parsed: Result<T, IdentifierError>,
) -> Result<T, ConfigError> {
	parsed.map_err(|source| ConfigError::InvalidIdentifier { variable, source })
}
