//! JSON payloads of the exposed configuration, token, and health endpoints, and the mapping from
//! broker failures to user-facing statuses.

#[cfg(feature = "server")] mod server;
#[cfg(feature = "server")] pub use server::*;

// self
use crate::{
	_prelude::*,
	auth::{EmbedToken, ReportId, TokenSecret, WorkspaceId},
};

/// Message returned for identity-provider failures.
pub const AUTHENTICATION_FAILED: &str = "Authentication failed. Please check configuration.";
/// Message returned when the embedding API denies workspace access.
pub const ACCESS_DENIED: &str = "Access denied. Please verify Power BI permissions.";
/// Message returned for every other issuance failure.
pub const ISSUANCE_FAILED: &str = "Failed to generate embed token";
/// Message returned by the fallback route.
pub const NOT_FOUND: &str = "Endpoint not found";

/// Non-sensitive report configuration handed to sessions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportConfig {
	/// Workspace hosting the report.
	pub workspace_id: WorkspaceId,
	/// Report to embed.
	pub report_id: ReportId,
	/// Deployment label.
	pub environment: String,
	/// Correlation id of the request that produced this payload.
	pub correlation_id: Uuid,
}

/// Body of a successful token response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenSuccessPayload {
	/// Always `true`.
	pub success: bool,
	/// Embed token value.
	pub token: TokenSecret,
	/// Report-viewing URL.
	pub embed_url: Url,
	/// Expiry reported by the embedding API.
	#[serde(with = "time::serde::rfc3339")]
	pub expiry: OffsetDateTime,
	/// Correlation id of the request.
	pub correlation_id: Uuid,
}
impl TokenSuccessPayload {
	/// Wraps an issued token for the request identified by `correlation_id`.
	pub fn new(token: EmbedToken, correlation_id: Uuid) -> Self {
		Self {
			success: true,
			token: token.value,
			embed_url: token.embed_url,
			expiry: token.expires_at,
			correlation_id,
		}
	}

	/// Converts the payload back into an [`EmbedToken`].
	pub fn into_embed_token(self) -> EmbedToken {
		EmbedToken {
			value: self.token,
			expires_at: self.expiry,
			embed_url: self.embed_url,
			correlation_id: self.correlation_id,
		}
	}
}

/// Body of every failed response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenFailurePayload {
	/// Always `false`.
	pub success: bool,
	/// User-facing message; never includes upstream detail.
	pub error: String,
	/// Correlation id of the request.
	pub correlation_id: Uuid,
	/// Instant the failure was produced.
	#[serde(default, skip_serializing_if = "Option::is_none", with = "time::serde::rfc3339::option")]
	pub timestamp: Option<OffsetDateTime>,
}
impl TokenFailurePayload {
	/// Builds a failure body.
	pub fn new(
		error: impl Into<String>,
		correlation_id: Uuid,
		timestamp: Option<OffsetDateTime>,
	) -> Self {
		Self { success: false, error: error.into(), correlation_id, timestamp }
	}
}

/// Body of the health endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthPayload {
	/// Always `healthy` while the process serves requests.
	pub status: String,
	/// Instant the health check was answered.
	#[serde(with = "time::serde::rfc3339")]
	pub timestamp: OffsetDateTime,
	/// Deployment label.
	pub environment: String,
	/// Correlation id of the request.
	pub correlation_id: Uuid,
}

/// HTTP status and user-facing message for a failed token request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FailureClass {
	/// HTTP status code.
	pub status: u16,
	/// User-facing message.
	pub message: &'static str,
}

/// Maps a broker error to the status and message a token request answers with.
pub fn classify_failure(err: &Error) -> FailureClass {
	match err {
		Error::Authentication { .. } => FailureClass { status: 401, message: AUTHENTICATION_FAILED },
		Error::AccessDenied { .. } => FailureClass { status: 403, message: ACCESS_DENIED },
		Error::Config(_) | Error::EmbedIssuance { .. } =>
			FailureClass { status: 500, message: ISSUANCE_FAILED },
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros::datetime;
	// self
	use super::*;

	#[test]
	fn failures_map_to_distinct_statuses() {
		assert_eq!(classify_failure(&Error::authentication("invalid_client")).status, 401);
		assert_eq!(
			classify_failure(&Error::AccessDenied { reason: "no workspace access".into() }),
			FailureClass { status: 403, message: ACCESS_DENIED }
		);
		assert_eq!(
			classify_failure(&Error::EmbedIssuance {
				message: "GenerateToken answered 500".into(),
				status: Some(500),
				source: None,
			}),
			FailureClass { status: 500, message: ISSUANCE_FAILED }
		);
	}

	#[test]
	fn success_payload_uses_camel_case() {
		let payload = TokenSuccessPayload::new(
			EmbedToken {
				value: TokenSecret::new("embed"),
				expires_at: datetime!(2025-01-01 01:00 UTC),
				embed_url: Url::parse("https://app.powerbi.com/reportEmbed?reportId=r&groupId=w")
					.expect("Fixture URL should parse."),
				correlation_id: Uuid::nil(),
			},
			Uuid::nil(),
		);
		let json = serde_json::to_value(&payload).expect("Payload should serialize.");

		assert_eq!(json["success"], true);
		assert_eq!(json["token"], "embed");
		assert_eq!(json["expiry"], "2025-01-01T01:00:00Z");
		assert_eq!(json["embedUrl"], "https://app.powerbi.com/reportEmbed?reportId=r&groupId=w");
		assert_eq!(json["correlationId"], Uuid::nil().to_string());
	}

	#[test]
	fn not_found_failures_omit_the_timestamp() {
		let json = serde_json::to_value(TokenFailurePayload::new(NOT_FOUND, Uuid::nil(), None))
			.expect("Payload should serialize.");

		assert_eq!(json["success"], false);
		assert!(json.get("timestamp").is_none());
	}
}
