//! Client-credentials facade over the `oauth2` crate plus transport error classification.

pub use oauth2;

// crates.io
use oauth2::{
	AuthType, ClientId as OAuthClientId, ClientSecret, EndpointNotSet, EndpointSet,
	HttpClientError, RequestTokenError, Scope, TokenResponse, TokenUrl,
	basic::{BasicClient, BasicRequestTokenError},
};
// self
use crate::{
	_prelude::*,
	auth::{ClientId, TokenSecret},
	error::{ConfigError, TransientError, TransportError, UpstreamError},
	http::{ResponseMetadata, ResponseMetadataSlot, TokenHttpClient},
	obs::FlowKind,
};

type TokenOnlyClient =
	BasicClient<EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;
type FacadeFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;

/// Maps HTTP transport failures into [`UpstreamError`] values.
///
/// The caller decides which broker [`Error`] the upstream failure becomes; the mapper only
/// separates request-construction problems from timeouts and network faults.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] emitted by the transport.
	fn map_transport_error(
		&self,
		flow: FlowKind,
		metadata: Option<&ResponseMetadata>,
		error: HttpClientError<E>,
	) -> UpstreamError;
}

/// Default mapper for reqwest-backed transports.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
#[cfg(feature = "reqwest")]
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(
		&self,
		flow: FlowKind,
		meta: Option<&ResponseMetadata>,
		err: HttpClientError<ReqwestError>,
	) -> UpstreamError {
		match err {
			HttpClientError::Reqwest(inner) => map_reqwest_error(flow, meta, *inner),
			HttpClientError::Http(inner) => ConfigError::from(inner).into(),
			HttpClientError::Io(inner) => TransportError::Io(inner).into(),
			HttpClientError::Other(message) => TransientError::Endpoint {
				message: format!("HTTP client error occurred while calling the {flow} endpoint: {message}"),
				status: meta_status(meta),
				retry_after: meta_retry_after(meta),
			}
			.into(),
			_ => TransientError::Endpoint {
				message: format!("HTTP client error occurred while calling the {flow} endpoint"),
				status: meta_status(meta),
				retry_after: meta_retry_after(meta),
			}
			.into(),
		}
	}
}

/// Access token plus its issuer-reported lifetime, as returned by the identity provider.
#[derive(Clone, Debug)]
pub(crate) struct IdentityGrant {
	pub(crate) access_token: TokenSecret,
	pub(crate) lifetime: Duration,
}

/// `client_credentials` exchange bound to one token endpoint and one service principal.
pub(crate) struct ClientCredentialsFacade<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	oauth_client: TokenOnlyClient,
	http_client: Arc<C>,
	error_mapper: Arc<M>,
}
impl<C, M> ClientCredentialsFacade<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Secrets travel in the form body, which every Azure AD tenant accepts.
	pub(crate) fn new(
		token_endpoint: Url,
		client_id: &ClientId,
		client_secret: &TokenSecret,
		http_client: Arc<C>,
		error_mapper: Arc<M>,
	) -> Self {
		let oauth_client = BasicClient::new(OAuthClientId::new(client_id.to_string()))
			.set_client_secret(ClientSecret::new(client_secret.expose().to_owned()))
			.set_token_uri(TokenUrl::from_url(token_endpoint))
			.set_auth_type(AuthType::RequestBody);

		Self { oauth_client, http_client, error_mapper }
	}

	/// Performs one exchange. Every failure surfaces as [`Error::Authentication`] unless the
	/// request itself could not be built.
	pub(crate) fn exchange<'a>(&'a self, scope: &'a str) -> FacadeFuture<'a, IdentityGrant> {
		let meta = ResponseMetadataSlot::default();

		Box::pin(async move {
			let instrumented = self.http_client.with_metadata(meta.clone());
			let response = self
				.oauth_client
				.exchange_client_credentials()
				.add_scope(Scope::new(scope.to_owned()))
				.request_async(&instrumented)
				.await
				.map_err(|err| map_request_error(meta.take(), err, self.error_mapper.as_ref()))?;
			let expires_in = response
				.expires_in()
				.ok_or_else(|| Error::authentication("token response omitted expires_in"))?
				.as_secs();
			let expires_in = i64::try_from(expires_in)
				.ok()
				.filter(|secs| *secs > 0)
				.ok_or_else(|| Error::authentication("token response carried an unusable expires_in"))?;

			Ok(IdentityGrant {
				access_token: TokenSecret::new(response.access_token().secret().to_owned()),
				lifetime: Duration::seconds(expires_in),
			})
		})
	}
}

/// Classifies a raw transport failure for the given flow.
pub(crate) fn map_transport_failure<E, M>(
	flow: FlowKind,
	meta: Option<&ResponseMetadata>,
	err: HttpClientError<E>,
	mapper: &M,
) -> UpstreamError
where
	E: 'static + Send + Sync + StdError,
	M: ?Sized + TransportErrorMapper<E>,
{
	mapper.map_transport_error(flow, meta, err)
}

fn map_request_error<E, M>(
	meta: Option<ResponseMetadata>,
	err: BasicRequestTokenError<HttpClientError<E>>,
	mapper: &M,
) -> Error
where
	E: 'static + Send + Sync + StdError,
	M: ?Sized + TransportErrorMapper<E>,
{
	let meta_ref = meta.as_ref();

	match err {
		RequestTokenError::ServerResponse(response) => {
			let reason = match response.error_description() {
				Some(description) => format!("{}: {description}", response.error().as_ref()),
				None => response.error().as_ref().to_owned(),
			};

			Error::authentication(reason)
		},
		RequestTokenError::Request(error) => Error::authentication_from(map_transport_failure(
			FlowKind::IdentityToken,
			meta_ref,
			error,
			mapper,
		)),
		RequestTokenError::Parse(source, _body) => Error::authentication_from(
			TransientError::ResponseParse { source, status: meta_status(meta_ref) }.into(),
		),
		RequestTokenError::Other(message) => Error::authentication_from(
			TransientError::Endpoint {
				message: format!("token endpoint returned an unexpected response: {message}"),
				status: meta_status(meta_ref),
				retry_after: meta_retry_after(meta_ref),
			}
			.into(),
		),
	}
}

#[cfg(feature = "reqwest")]
fn map_reqwest_error(
	flow: FlowKind,
	meta: Option<&ResponseMetadata>,
	err: ReqwestError,
) -> UpstreamError {
	if err.is_builder() {
		return ConfigError::from(err).into();
	}
	if err.is_timeout() {
		return TransientError::Endpoint {
			message: format!("request timed out while calling the {flow} endpoint"),
			status: meta_status(meta).or_else(|| err.status().map(|code| code.as_u16())),
			retry_after: meta_retry_after(meta),
		}
		.into();
	}

	TransportError::from(err).into()
}

fn meta_status(meta: Option<&ResponseMetadata>) -> Option<u16> {
	meta.and_then(|value| value.status)
}

fn meta_retry_after(meta: Option<&ResponseMetadata>) -> Option<Duration> {
	meta.and_then(|value| value.retry_after)
}

#[cfg(all(test, feature = "reqwest"))]
mod tests {
	// self
	use super::*;
	use crate::http::ReqwestHttpClient;

	#[test]
	fn other_transport_errors_keep_metadata() {
		let meta = ResponseMetadata { status: Some(429), retry_after: Some(Duration::seconds(7)) };
		let err = ReqwestTransportErrorMapper.map_transport_error(
			FlowKind::EmbedToken,
			Some(&meta),
			HttpClientError::Other("connection reset".into()),
		);

		assert!(matches!(
			err,
			UpstreamError::Transient(TransientError::Endpoint {
				status: Some(429),
				retry_after: Some(retry),
				ref message,
			}) if retry == Duration::seconds(7) && message.contains("embed_token")
		));
	}

	#[test]
	fn io_errors_are_transport_failures() {
		let err = ReqwestTransportErrorMapper.map_transport_error(
			FlowKind::IdentityToken,
			None,
			HttpClientError::Io(std::io::Error::other("broken pipe")),
		);

		assert!(matches!(err, UpstreamError::Transport(TransportError::Io(_))));
		assert_eq!(err.status(), None);
	}

	#[test]
	fn facade_builds_from_validated_endpoint() {
		let client_id = ClientId::new("7d3c1e55-2f0a-4b8e-b7c4-2e6d9a8f4c22")
			.expect("Client fixture should be valid.");
		let _facade = ClientCredentialsFacade::new(
			Url::parse("https://login.example.com/tenant/oauth2/v2.0/token")
				.expect("Token endpoint should parse."),
			&client_id,
			&TokenSecret::new("secret"),
			Arc::new(ReqwestHttpClient::default()),
			Arc::new(ReqwestTransportErrorMapper),
		);
	}
}
