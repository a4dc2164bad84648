// crates.io
use httpmock::prelude::*;
use serde_json::json;
use time::macros::datetime;
// self
use embed_token_broker::{
	_preludet::*,
	api::{self, ReportConfig},
	error::Error,
	flows::EmbedTokenService,
	obs::{FlowKind, TraceEvent},
};

const START: OffsetDateTime = datetime!(2025-01-01 00:00 UTC);

fn token_path() -> String {
	format!("/{TEST_TENANT}/oauth2/v2.0/token")
}

fn generate_token_path() -> String {
	format!("/v1.0/myorg/groups/{TEST_WORKSPACE}/reports/{TEST_REPORT}/GenerateToken")
}

async fn mock_identity(server: &MockServer) -> httpmock::Mock<'_> {
	server
		.mock_async(|when, then| {
			when.method(POST).path(token_path());
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"identity-token\",\"token_type\":\"Bearer\",\"expires_in\":3600}",
			);
		})
		.await
}

#[tokio::test]
async fn issues_a_view_only_token_for_the_configured_report() {
	let server = MockServer::start_async().await;
	let (broker, _clock, sink) = build_reqwest_test_broker(&server.base_url(), START);
	let identity = mock_identity(&server).await;
	let generate = server
		.mock_async(|when, then| {
			when.method(POST)
				.path(generate_token_path())
				.header("authorization", "Bearer identity-token")
				.header("content-type", "application/json")
				.json_body(json!({ "accessLevel": "View", "datasetId": null }));
			then.status(200).header("content-type", "application/json").body(
				"{\"token\":\"embed-1\",\"tokenId\":\"4b76f5ed-5a06-4150-8d1b-60f8e4c186f4\",\"expiration\":\"2025-01-01T01:00:00Z\"}",
			);
		})
		.await;
	let token = broker.issue_embed_token().await.expect("Issuance should succeed.");

	assert_eq!(token.value.expose(), "embed-1");
	assert_eq!(token.expires_at, datetime!(2025-01-01 01:00 UTC));
	assert_eq!(
		token.embed_url.as_str(),
		format!("{}/reportEmbed?reportId={TEST_REPORT}&groupId={TEST_WORKSPACE}", server.base_url())
	);

	identity.assert_async().await;
	generate.assert_async().await;

	assert_eq!(sink.events(FlowKind::EmbedToken), vec![TraceEvent::Issued]);
}

#[tokio::test]
async fn every_issuance_mints_a_fresh_token_on_one_identity_token() {
	let server = MockServer::start_async().await;
	let (broker, _clock, _sink) = build_reqwest_test_broker(&server.base_url(), START);
	let identity = mock_identity(&server).await;
	let generate = server
		.mock_async(|when, then| {
			when.method(POST).path(generate_token_path());
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"token\":\"embed-n\",\"expiration\":\"2025-01-01T01:00:00Z\"}");
		})
		.await;

	for _ in 0..3 {
		broker.issue_embed_token().await.expect("Issuance should succeed.");
	}

	identity.assert_calls_async(1).await;
	generate.assert_calls_async(3).await;
}

#[tokio::test]
async fn forbidden_workspace_is_access_denied() {
	let server = MockServer::start_async().await;
	let (broker, _clock, sink) = build_reqwest_test_broker(&server.base_url(), START);
	let _identity = mock_identity(&server).await;
	let generate = server
		.mock_async(|when, then| {
			when.method(POST).path(generate_token_path());
			then.status(403).body("{\"error\":{\"code\":\"PowerBINotAuthorizedException\"}}");
		})
		.await;
	let err = broker.issue_embed_token().await.expect_err("403 must fail.");

	assert!(matches!(err, Error::AccessDenied { .. }), "Unexpected error: {err:?}.");
	assert_eq!(api::classify_failure(&err).status, 403);
	assert_eq!(sink.events(FlowKind::EmbedToken), vec![TraceEvent::Failed]);

	generate.assert_async().await;
}

#[tokio::test]
async fn upstream_failures_keep_status_and_a_body_preview() {
	let server = MockServer::start_async().await;
	let (broker, _clock, _sink) = build_reqwest_test_broker(&server.base_url(), START);
	let _identity = mock_identity(&server).await;
	let _generate = server
		.mock_async(|when, then| {
			when.method(POST).path(generate_token_path());
			then.status(500).body("capacity paused");
		})
		.await;
	let err = broker.issue_embed_token().await.expect_err("500 must fail.");

	match err {
		Error::EmbedIssuance { ref message, status, .. } => {
			assert_eq!(status, Some(500));
			assert!(message.contains("capacity paused"));
		},
		other => panic!("Unexpected error variant: {other:?}."),
	}
}

#[tokio::test]
async fn malformed_token_response_is_an_issuance_failure() {
	let server = MockServer::start_async().await;
	let (broker, _clock, _sink) = build_reqwest_test_broker(&server.base_url(), START);
	let _identity = mock_identity(&server).await;
	let _generate = server
		.mock_async(|when, then| {
			when.method(POST).path(generate_token_path());
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"token\":\"embed-1\",\"expiration\":\"tomorrow\"}");
		})
		.await;
	let err = broker.issue_embed_token().await.expect_err("Malformed bodies must fail.");

	assert!(
		matches!(err, Error::EmbedIssuance { status: Some(200), source: Some(_), .. }),
		"Unexpected error: {err:?}."
	);
	assert_eq!(api::classify_failure(&err).status, 500);
}

#[tokio::test]
async fn identity_failures_propagate_without_calling_the_api() {
	let server = MockServer::start_async().await;
	let (broker, _clock, _sink) = build_reqwest_test_broker(&server.base_url(), START);
	let _identity = server
		.mock_async(|when, then| {
			when.method(POST).path(token_path());
			then.status(400)
				.header("content-type", "application/json")
				.body("{\"error\":\"unauthorized_client\"}");
		})
		.await;
	let generate = server
		.mock_async(|when, then| {
			when.method(POST).path(generate_token_path());
			then.status(200);
		})
		.await;
	let err = broker.issue_embed_token().await.expect_err("Identity failure must propagate.");

	assert!(matches!(err, Error::Authentication { .. }), "Unexpected error: {err:?}.");
	assert_eq!(api::classify_failure(&err).status, 401);

	generate.assert_calls_async(0).await;
}

#[tokio::test]
async fn report_config_carries_no_secrets() {
	let server = MockServer::start_async().await;
	let (broker, _clock, _sink) = build_reqwest_test_broker(&server.base_url(), START);
	let config: ReportConfig = broker.report_config(Uuid::nil());
	let json = serde_json::to_value(&config).expect("Config should serialize.");

	assert_eq!(json["workspaceId"], TEST_WORKSPACE);
	assert_eq!(json["reportId"], TEST_REPORT);
	assert_eq!(json["environment"], "test");
	assert!(!json.to_string().contains("test-secret"));
}
