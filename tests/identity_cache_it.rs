// crates.io
use httpmock::prelude::*;
use time::macros::datetime;
// self
use embed_token_broker::{
	_preludet::*,
	error::Error,
	obs::{FlowKind, TraceEvent},
};

const START: OffsetDateTime = datetime!(2025-01-01 00:00 UTC);

fn token_path() -> String {
	format!("/{TEST_TENANT}/oauth2/v2.0/token")
}

#[tokio::test]
async fn identity_token_is_reused_until_the_safety_margin() {
	let server = MockServer::start_async().await;
	let (broker, clock, _sink) = build_reqwest_test_broker(&server.base_url(), START);
	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path(token_path())
				.header("content-type", "application/x-www-form-urlencoded");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"identity-1\",\"token_type\":\"Bearer\",\"expires_in\":3600}",
			);
		})
		.await;
	let first = broker.identity.acquire().await.expect("Initial acquisition should succeed.");

	assert_eq!(first.value.expose(), "identity-1");
	assert_eq!(first.issued_at, START);
	assert_eq!(first.expires_at, START + Duration::seconds(3300));

	clock.advance(Duration::seconds(3299));

	let cached = broker.identity.acquire().await.expect("Cached acquisition should succeed.");

	assert_eq!(cached, first);

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn expired_identity_token_triggers_a_new_exchange() {
	let server = MockServer::start_async().await;
	let (broker, clock, sink) = build_reqwest_test_broker(&server.base_url(), START);
	let mut mock = server
		.mock_async(|when, then| {
			when.method(POST).path(token_path());
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"identity-old\",\"token_type\":\"Bearer\",\"expires_in\":3600}",
			);
		})
		.await;

	broker.identity.acquire().await.expect("Initial acquisition should succeed.");
	mock.assert_calls_async(1).await;
	mock.delete_async().await;

	let renewed = server
		.mock_async(|when, then| {
			when.method(POST).path(token_path());
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"identity-new\",\"token_type\":\"Bearer\",\"expires_in\":3600}",
			);
		})
		.await;

	clock.advance(Duration::seconds(3301));

	let token = broker.identity.acquire().await.expect("Renewal should succeed.");

	assert_eq!(token.value.expose(), "identity-new");
	assert_eq!(token.issued_at, START + Duration::seconds(3301));

	renewed.assert_calls_async(1).await;

	assert_eq!(sink.events(FlowKind::IdentityToken), vec![
		TraceEvent::CacheMiss,
		TraceEvent::Acquired,
		TraceEvent::CacheMiss,
		TraceEvent::Acquired,
	]);
}

#[tokio::test]
async fn failed_exchange_leaves_the_cache_untouched() {
	let server = MockServer::start_async().await;
	let (broker, clock, sink) = build_reqwest_test_broker(&server.base_url(), START);
	let mut mock = server
		.mock_async(|when, then| {
			when.method(POST).path(token_path());
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"identity-kept\",\"token_type\":\"Bearer\",\"expires_in\":3600}",
			);
		})
		.await;
	let kept = broker.identity.acquire().await.expect("Initial acquisition should succeed.");

	mock.delete_async().await;

	let rejected = server
		.mock_async(|when, then| {
			when.method(POST).path(token_path());
			then.status(401).header("content-type", "application/json").body(
				"{\"error\":\"invalid_client\",\"error_description\":\"AADSTS7000215: Invalid client secret.\"}",
			);
		})
		.await;

	clock.advance(Duration::seconds(4000));

	let err = broker.identity.acquire().await.expect_err("Rejected exchange should fail.");

	assert!(
		matches!(err, Error::Authentication { ref reason, .. } if reason.contains("invalid_client")),
		"Unexpected error: {err:?}."
	);
	assert_eq!(broker.identity.peek(), Some(kept));
	assert_eq!(sink.events(FlowKind::IdentityToken).last(), Some(&TraceEvent::Failed));

	rejected.assert_async().await;
}

#[tokio::test]
async fn missing_lifetime_is_an_authentication_failure() {
	let server = MockServer::start_async().await;
	let (broker, _clock, _sink) = build_reqwest_test_broker(&server.base_url(), START);
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path(token_path());
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"access_token\":\"identity-forever\",\"token_type\":\"Bearer\"}");
		})
		.await;
	let err = broker.identity.acquire().await.expect_err("Lifetime-less tokens must be refused.");

	assert!(matches!(err, Error::Authentication { .. }));
	assert_eq!(broker.identity.peek(), None);

	mock.assert_async().await;
}

#[tokio::test]
async fn unrepresentable_lifetime_is_an_authentication_failure() {
	let server = MockServer::start_async().await;
	let (broker, _clock, sink) = build_reqwest_test_broker(&server.base_url(), START);
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path(token_path());
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"identity-1\",\"token_type\":\"Bearer\",\"expires_in\":9999999999999}",
			);
		})
		.await;
	let err = broker.identity.acquire().await.expect_err("Out-of-range lifetimes must be refused.");

	assert!(
		matches!(err, Error::Authentication { ref reason, .. } if reason.contains("expires_in")),
		"Unexpected error: {err:?}."
	);
	assert_eq!(broker.identity.peek(), None);
	assert_eq!(sink.events(FlowKind::IdentityToken), vec![
		TraceEvent::CacheMiss,
		TraceEvent::Failed,
	]);

	mock.assert_async().await;
}

#[tokio::test]
async fn concurrent_misses_share_one_exchange() {
	let server = MockServer::start_async().await;
	let (broker, _clock, sink) = build_reqwest_test_broker(&server.base_url(), START);
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path(token_path());
			then.status(200)
				.header("content-type", "application/json")
				.delay(StdDuration::from_millis(100))
				.body(
					"{\"access_token\":\"identity-shared\",\"token_type\":\"Bearer\",\"expires_in\":3600}",
				);
		})
		.await;
	let (first, second) = tokio::join!(broker.identity.acquire(), broker.identity.acquire());
	let first = first.expect("First concurrent acquisition should succeed.");
	let second = second.expect("Second concurrent acquisition should succeed.");

	assert_eq!(first, second);

	mock.assert_calls_async(1).await;

	let entries = sink.entries();

	assert_eq!(entries.len(), 3);
	assert!(entries.iter().any(|entry| {
		entry.event == TraceEvent::CacheHit && entry.detail.as_deref() == Some("coalesced")
	}));
}

#[tokio::test]
async fn invalidated_cache_exchanges_again() {
	let server = MockServer::start_async().await;
	let (broker, _clock, _sink) = build_reqwest_test_broker(&server.base_url(), START);
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path(token_path());
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"identity-again\",\"token_type\":\"Bearer\",\"expires_in\":3600}",
			);
		})
		.await;

	broker.identity.acquire().await.expect("Initial acquisition should succeed.");
	broker.identity.invalidate();

	assert_eq!(broker.identity.peek(), None);

	broker.identity.acquire().await.expect("Acquisition after invalidation should succeed.");

	mock.assert_calls_async(2).await;
}
