// crates.io
use time::macros::datetime;
// self
use embed_token_broker::{
	_preludet::*,
	clock::ManualClock,
	error::{ConfigError, Error, Result, TransientError, TransportError, UpstreamError},
	flows::{Broker, EmbedTokenService},
	http::{ResponseMetadata, ResponseMetadataSlot, TokenHttpClient},
	oauth::{
		TransportErrorMapper,
		oauth2::{
			AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse,
			http::{HeaderValue, StatusCode, header::CONTENT_TYPE},
		},
	},
	obs::{FlowKind, MemorySink},
};

const START: OffsetDateTime = datetime!(2025-01-01 00:00 UTC);

#[derive(Debug)]
enum FakeTransportError {
	Throttled,
}
impl Display for FakeTransportError {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::Throttled => write!(f, "Transport throttled."),
		}
	}
}
impl StdError for FakeTransportError {}

/// Answers identity exchanges when `identity_ok` is set and throttles everything else.
#[derive(Clone, Copy)]
struct FakeHttpClient {
	retry_after: Duration,
	identity_ok: bool,
}
impl FakeHttpClient {
	fn throttled(retry_after: Duration) -> Self {
		Self { retry_after, identity_ok: false }
	}

	fn throttled_after_identity(retry_after: Duration) -> Self {
		Self { retry_after, identity_ok: true }
	}
}
impl TokenHttpClient for FakeHttpClient {
	type Handle = FakeHttpHandle;
	type TransportError = FakeTransportError;

	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle {
		FakeHttpHandle { slot, retry_after: self.retry_after, identity_ok: self.identity_ok }
	}
}

struct FakeHttpHandle {
	slot: ResponseMetadataSlot,
	retry_after: Duration,
	identity_ok: bool,
}
impl<'a> AsyncHttpClient<'a> for FakeHttpHandle {
	type Error = HttpClientError<FakeTransportError>;
	type Future =
		Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'a + Send + Sync>>;

	fn call(&'a self, request: HttpRequest) -> Self::Future {
		let slot = self.slot.clone();
		let retry_after = self.retry_after;
		let identity = request.uri().path().ends_with("/oauth2/v2.0/token");
		let identity_ok = self.identity_ok;

		Box::pin(async move {
			assert!(
				slot.take().is_none(),
				"ResponseMetadataSlot must be clear before dispatching a request."
			);

			if identity && identity_ok {
				slot.store(ResponseMetadata { status: Some(200), retry_after: None });

				let mut response = HttpResponse::new(
					b"{\"access_token\":\"identity-fake\",\"token_type\":\"Bearer\",\"expires_in\":3600}"
						.to_vec(),
				);

				*response.status_mut() = StatusCode::OK;
				response.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

				return Ok(response);
			}

			slot.store(ResponseMetadata { status: Some(429), retry_after: Some(retry_after) });

			Err(HttpClientError::Reqwest(Box::new(FakeTransportError::Throttled)))
		})
	}
}

#[derive(Clone, Default)]
struct RecordingTransportErrorMapper {
	metadata: Arc<Mutex<Vec<(FlowKind, Option<ResponseMetadata>)>>>,
}
impl RecordingTransportErrorMapper {
	fn recorded_metadata(&self) -> Vec<(FlowKind, Option<ResponseMetadata>)> {
		self.metadata.lock().clone()
	}
}
impl TransportErrorMapper<FakeTransportError> for RecordingTransportErrorMapper {
	fn map_transport_error(
		&self,
		flow: FlowKind,
		meta: Option<&ResponseMetadata>,
		err: HttpClientError<FakeTransportError>,
	) -> UpstreamError {
		let status = meta.and_then(|value| value.status);
		let retry_after = meta.and_then(|value| value.retry_after);

		self.metadata.lock().push((flow, meta.cloned()));

		match err {
			HttpClientError::Reqwest(inner) => TransientError::Endpoint {
				message: format!("Fake transport error: {inner}"),
				status,
				retry_after,
			}
			.into(),
			HttpClientError::Http(inner) => ConfigError::from(inner).into(),
			HttpClientError::Io(inner) => TransportError::Io(inner).into(),
			other => TransientError::Endpoint {
				message: format!("Unhandled HTTP client error while calling the {flow} endpoint: {other:?}"),
				status,
				retry_after,
			}
			.into(),
		}
	}
}

fn build_broker(
	http_client: FakeHttpClient,
	mapper: RecordingTransportErrorMapper,
) -> Broker<FakeHttpClient, RecordingTransportErrorMapper> {
	Broker::with_http_client(
		test_config(test_endpoints("https://mock.example.com")),
		http_client,
		mapper,
		Arc::new(ManualClock::new(START)),
		Arc::new(MemorySink::default()),
	)
	.expect("Broker should build around the fake transport.")
}

fn upstream_source(err: &Error) -> &UpstreamError {
	StdError::source(err)
		.and_then(|source| source.downcast_ref::<UpstreamError>())
		.expect("Error should carry the classified upstream failure.")
}

#[tokio::test]
async fn fake_token_http_client_surfaces_metadata() {
	let broker = build_broker(
		FakeHttpClient::throttled(Duration::seconds(5)),
		RecordingTransportErrorMapper::default(),
	);
	let err = broker.identity.acquire().await.expect_err("Exchange should be throttled with HTTP 429.");

	assert!(matches!(err, Error::Authentication { .. }), "Unexpected error variant: {err:?}.");

	match upstream_source(&err) {
		UpstreamError::Transient(TransientError::Endpoint { status, retry_after, .. }) => {
			assert_eq!(*status, Some(429));
			assert_eq!(*retry_after, Some(Duration::seconds(5)));
		},
		other => panic!("Unexpected upstream variant: {other:?}."),
	}
}

#[tokio::test]
async fn fake_mapper_captures_response_metadata() {
	let mapper = RecordingTransportErrorMapper::default();
	let broker =
		build_broker(FakeHttpClient::throttled(Duration::seconds(30)), mapper.clone());
	let _ = broker.identity.acquire().await.expect_err("Exchange should be throttled with HTTP 429.");
	let observed = mapper.recorded_metadata();

	assert_eq!(observed.len(), 1, "Mapper must record a single request.");

	let (flow, meta) = observed.first().cloned().expect("Metadata should be recorded once.");
	let meta = meta.expect("Response metadata should be present.");

	assert_eq!(flow, FlowKind::IdentityToken);
	assert_eq!(meta.status, Some(429));
	assert_eq!(meta.retry_after, Some(Duration::seconds(30)));
}

#[tokio::test]
async fn issuance_transport_failures_keep_the_upstream_status() {
	let mapper = RecordingTransportErrorMapper::default();
	let broker = build_broker(
		FakeHttpClient::throttled_after_identity(Duration::seconds(12)),
		mapper.clone(),
	);
	let err = broker.issue_embed_token().await.expect_err("Issuance should be throttled.");

	match &err {
		Error::EmbedIssuance { status, .. } => assert_eq!(*status, Some(429)),
		other => panic!("Unexpected error variant: {other:?}."),
	}

	assert_eq!(upstream_source(&err).status(), Some(429));
	assert_eq!(
		mapper.recorded_metadata().into_iter().map(|(flow, _)| flow).collect::<Vec<_>>(),
		vec![FlowKind::EmbedToken]
	);
	assert!(broker.identity.peek().is_some(), "The identity token should stay cached.");
}
