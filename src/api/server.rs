//! axum router serving the configuration, token, and health endpoints.
//!
//! Rate limiting, CORS, compression, and static assets are left to outer layers.

// crates.io
use axum::{
	Json, Router,
	extract::State,
	http::StatusCode,
	response::{IntoResponse, Response},
	routing::{get, post},
};
// self
use crate::{
	_prelude::*,
	api::{
		HealthPayload, NOT_FOUND, ReportConfig, TokenFailurePayload, TokenSuccessPayload,
		classify_failure,
	},
	clock::{Clock, SystemClock},
	flows::EmbedTokenService,
	obs,
};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct ApiState {
	service: Arc<dyn EmbedTokenService>,
	clock: Arc<dyn Clock>,
}
impl ApiState {
	/// Creates state backed by `service` and the system clock.
	pub fn new(service: Arc<dyn EmbedTokenService>) -> Self {
		Self { service, clock: Arc::new(SystemClock) }
	}

	/// Replaces the clock used for response timestamps.
	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;

		self
	}
}
impl Debug for ApiState {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ApiState").field("environment", &self.service.environment()).finish()
	}
}

/// Failure answered by a handler.
#[derive(Debug)]
pub struct ApiFailure {
	status: StatusCode,
	payload: TokenFailurePayload,
}
impl IntoResponse for ApiFailure {
	fn into_response(self) -> Response {
		(self.status, Json(self.payload)).into_response()
	}
}

/// Builds the router. Unknown paths answer a JSON 404.
pub fn router(state: ApiState) -> Router {
	Router::new()
		.route("/api/config", get(report_config))
		.route("/api/token", post(embed_token))
		.route("/health", get(health))
		.fallback(not_found)
		.with_state(state)
}

async fn report_config(State(state): State<ApiState>) -> Json<ReportConfig> {
	Json(state.service.report_config(obs::correlation_id()))
}

async fn embed_token(
	State(state): State<ApiState>,
) -> Result<Json<TokenSuccessPayload>, ApiFailure> {
	let correlation_id = obs::correlation_id();

	match state.service.issue_embed_token().await {
		Ok(token) => Ok(Json(TokenSuccessPayload::new(token, correlation_id))),
		Err(e) => {
			let class = classify_failure(&e);

			#[cfg(feature = "tracing")]
			{
				tracing::error!(
					%correlation_id,
					status = class.status,
					error = %e,
					"token generation failed"
				);
			}

			Err(ApiFailure {
				status: StatusCode::from_u16(class.status)
					.unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
				payload: TokenFailurePayload::new(
					class.message,
					correlation_id,
					Some(state.clock.now()),
				),
			})
		},
	}
}

async fn health(State(state): State<ApiState>) -> Json<HealthPayload> {
	Json(HealthPayload {
		status: "healthy".into(),
		timestamp: state.clock.now(),
		environment: state.service.environment().to_owned(),
		correlation_id: obs::correlation_id(),
	})
}

async fn not_found() -> ApiFailure {
	ApiFailure {
		status: StatusCode::NOT_FOUND,
		payload: TokenFailurePayload::new(NOT_FOUND, obs::correlation_id(), None),
	}
}
