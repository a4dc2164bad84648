//! Embed token issuance against the embedding API's `GenerateToken` endpoint.

// crates.io
use oauth2::{
	AsyncHttpClient, HttpRequest,
	http::{
		Method, StatusCode,
		header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
	},
};
// self
use crate::{
	_prelude::*,
	auth::{EmbedToken, ReportId, TokenSecret, WorkspaceId},
	config::ReportTarget,
	endpoints::ServiceEndpoints,
	error::{ConfigError, TransientError},
	flows::IdentityTokenCache,
	http::{ResponseMetadataSlot, TokenHttpClient},
	oauth::{self, TransportErrorMapper},
	obs::{self, FlowKind, FlowOutcome, FlowSpan, TraceEntry, TraceEvent, TraceSink},
};

const ERROR_BODY_PREVIEW: usize = 256;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateTokenRequest {
	access_level: &'static str,
	dataset_id: Option<String>,
}

#[derive(Deserialize)]
struct GenerateTokenResponse {
	token: String,
	#[serde(with = "time::serde::rfc3339")]
	expiration: OffsetDateTime,
}

/// Mints a fresh view-only embed token on every call; nothing is cached here.
pub struct EmbedTokenIssuer<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	identity: Arc<IdentityTokenCache<C, M>>,
	http_client: Arc<C>,
	error_mapper: Arc<M>,
	endpoints: ServiceEndpoints,
	target: ReportTarget,
	trace: Arc<dyn TraceSink>,
}
impl<C, M> EmbedTokenIssuer<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates an issuer that authenticates through `identity`.
	pub fn new(
		identity: Arc<IdentityTokenCache<C, M>>,
		http_client: Arc<C>,
		error_mapper: Arc<M>,
		endpoints: ServiceEndpoints,
		target: ReportTarget,
		trace: Arc<dyn TraceSink>,
	) -> Self {
		Self { identity, http_client, error_mapper, endpoints, target, trace }
	}

	/// Report the issuer was configured for.
	pub fn target(&self) -> &ReportTarget {
		&self.target
	}

	/// Issues a token for the configured workspace/report pair.
	pub async fn issue_default(&self) -> Result<EmbedToken> {
		self.issue(&self.target.workspace_id, &self.target.report_id).await
	}

	/// Issues a token for `workspace`/`report`.
	///
	/// # Errors
	///
	/// - [`Error::Authentication`] when the identity token cannot be acquired, unchanged.
	/// - [`Error::AccessDenied`] when the embedding API answers 403.
	/// - [`Error::EmbedIssuance`] for every other failure, including malformed responses.
	pub async fn issue(&self, workspace: &WorkspaceId, report: &ReportId) -> Result<EmbedToken> {
		const KIND: FlowKind = FlowKind::EmbedToken;

		let correlation_id = obs::correlation_id();
		let span = FlowSpan::new(KIND, "issue", correlation_id);

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.issue_once(workspace, report, correlation_id)).await;

		match &result {
			Ok(token) => self.trace.record(
				TraceEntry::new(correlation_id, KIND, TraceEvent::Issued)
					.with_detail(format!("expires at {}", token.expires_at)),
			),
			Err(e) => self
				.trace
				.record(TraceEntry::new(correlation_id, KIND, TraceEvent::Failed).with_detail(e.to_string())),
		}

		obs::record_result(KIND, result)
	}

	async fn issue_once(
		&self,
		workspace: &WorkspaceId,
		report: &ReportId,
		correlation_id: Uuid,
	) -> Result<EmbedToken> {
		let identity = self.identity.acquire().await?;
		let endpoint =
			self.endpoints.generate_token_endpoint(workspace, report).map_err(ConfigError::from)?;
		let embed_url =
			self.endpoints.report_embed_url(workspace, report).map_err(ConfigError::from)?;
		let request = build_request(&endpoint, &identity.value)?;
		let meta = ResponseMetadataSlot::default();
		let handle = self.http_client.with_metadata(meta.clone());
		let response = handle.call(request).await.map_err(|e| {
			Error::issuance_from(oauth::map_transport_failure(
				FlowKind::EmbedToken,
				meta.take().as_ref(),
				e,
				self.error_mapper.as_ref(),
			))
		})?;
		let status = response.status();

		if status == StatusCode::FORBIDDEN {
			return Err(Error::AccessDenied {
				reason: format!("the service principal cannot generate tokens in workspace {workspace}"),
			});
		}
		if !status.is_success() {
			return Err(Error::EmbedIssuance {
				message: format!(
					"GenerateToken answered {}: {}",
					status.as_u16(),
					body_preview(response.body())
				),
				status: Some(status.as_u16()),
				source: None,
			});
		}

		let mut deserializer = serde_json::Deserializer::from_slice(response.body());
		let parsed: GenerateTokenResponse = serde_path_to_error::deserialize(&mut deserializer)
			.map_err(|source| {
				Error::issuance_from(
					TransientError::ResponseParse { source, status: Some(status.as_u16()) }.into(),
				)
			})?;

		Ok(EmbedToken {
			value: TokenSecret::new(parsed.token),
			expires_at: parsed.expiration,
			embed_url,
			correlation_id,
		})
	}
}
impl<C, M> Debug for EmbedTokenIssuer<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("EmbedTokenIssuer")
			.field("endpoints", &self.endpoints)
			.field("target", &self.target)
			.finish()
	}
}

fn build_request(endpoint: &Url, bearer: &TokenSecret) -> Result<HttpRequest> {
	let body = serde_json::to_vec(&GenerateTokenRequest { access_level: "View", dataset_id: None })
		.map_err(|e| Error::EmbedIssuance {
			message: "request body could not be encoded".into(),
			status: None,
			source: Some(Box::new(e)),
		})?;

	oauth2::http::Request::builder()
		.method(Method::POST)
		.uri(endpoint.as_str())
		.header(AUTHORIZATION, format!("Bearer {}", bearer.expose()))
		.header(CONTENT_TYPE, "application/json")
		.header(ACCEPT, "application/json")
		.body(body)
		.map_err(|e| ConfigError::from(e).into())
}

fn body_preview(body: &[u8]) -> String {
	String::from_utf8_lossy(body).chars().take(ERROR_BODY_PREVIEW).collect()
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn request_body_is_view_only_without_dataset() {
		let endpoint = Url::parse("https://api.example.com/v1.0/myorg/groups/ws/reports/rep/GenerateToken")
			.expect("Endpoint fixture should parse.");
		let request =
			build_request(&endpoint, &TokenSecret::new("aad")).expect("Request should build.");
		let body: serde_json::Value =
			serde_json::from_slice(request.body()).expect("Body should be JSON.");

		assert_eq!(request.method(), Method::POST);
		assert_eq!(
			request.headers().get(AUTHORIZATION).and_then(|v| v.to_str().ok()),
			Some("Bearer aad")
		);
		assert_eq!(body, serde_json::json!({ "accessLevel": "View", "datasetId": null }));
	}

	#[test]
	fn error_previews_are_bounded() {
		let body = "x".repeat(ERROR_BODY_PREVIEW * 2);

		assert_eq!(body_preview(body.as_bytes()).len(), ERROR_BODY_PREVIEW);
	}
}
