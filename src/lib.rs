//! Time-bounded token brokering for embedded reports.
//!
//! The broker caches a service principal's identity token, mints view-only embed tokens per
//! client session, and keeps a live session supplied with a valid token until the viewer walks
//! away.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod api;
pub mod auth;
pub mod clock;
pub mod config;
pub mod endpoints;
pub mod error;
pub mod flows;
pub mod http;
pub mod oauth;
pub mod obs;
pub mod session;
#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		auth::{ClientId, ReportId, TenantId, TokenSecret, WorkspaceId},
		clock::{Clock, ManualClock},
		config::{BrokerConfig, ReportTarget},
		endpoints::ServiceEndpoints,
		flows::Broker,
		http::ReqwestHttpClient,
		oauth::ReqwestTransportErrorMapper,
		obs::{MemorySink, TraceSink},
	};

	/// Broker type alias used by reqwest-backed integration tests.
	pub type ReqwestTestBroker = Broker<ReqwestHttpClient, ReqwestTransportErrorMapper>;

	/// Tenant fixture shared by integration tests.
	pub const TEST_TENANT: &str = "0b6f7a2e-8c41-4d2b-9a51-5a3c1f0e9d11";
	/// Client fixture shared by integration tests.
	pub const TEST_CLIENT: &str = "7d3c1e55-2f0a-4b8e-b7c4-2e6d9a8f4c22";
	/// Workspace fixture shared by integration tests.
	pub const TEST_WORKSPACE: &str = "f1e2d3c4-b5a6-4978-8695-a4b3c2d1e0f9";
	/// Report fixture shared by integration tests.
	pub const TEST_REPORT: &str = "9a8b7c6d-5e4f-4a3b-8c2d-1e0f9a8b7c6d";

	/// Builds a reqwest HTTP client that accepts the self-signed certificates produced by
	/// `httpmock` during tests.
	pub fn test_reqwest_http_client() -> ReqwestHttpClient {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestHttpClient::with_client(client)
	}

	/// Points every service endpoint at a single mock server base URL.
	pub fn test_endpoints(base_url: &str) -> ServiceEndpoints {
		let base = Url::parse(base_url).expect("Mock server base URL should parse.");

		ServiceEndpoints::builder()
			.authority(base.clone())
			.api(base.clone())
			.app(base)
			.build()
			.expect("Mock endpoints should pass validation.")
	}

	/// Builds a configuration with fixed fixtures targeting the provided endpoints.
	pub fn test_config(endpoints: ServiceEndpoints) -> BrokerConfig {
		BrokerConfig {
			tenant_id: TenantId::new(TEST_TENANT).expect("Tenant fixture should be valid."),
			client_id: ClientId::new(TEST_CLIENT).expect("Client fixture should be valid."),
			client_secret: TokenSecret::new("test-secret"),
			target: ReportTarget {
				workspace_id: WorkspaceId::new(TEST_WORKSPACE)
					.expect("Workspace fixture should be valid."),
				report_id: ReportId::new(TEST_REPORT).expect("Report fixture should be valid."),
			},
			environment: "test".into(),
			endpoints,
		}
	}

	/// Constructs a [`Broker`] wired to a manual clock and an in-memory trace sink so tests can
	/// drive expiry deterministically and inspect trace entries.
	pub fn build_reqwest_test_broker(
		base_url: &str,
		start: OffsetDateTime,
	) -> (ReqwestTestBroker, ManualClock, Arc<MemorySink>) {
		let clock = ManualClock::new(start);
		let sink = Arc::new(MemorySink::default());
		let trace: Arc<dyn TraceSink> = sink.clone();
		let dyn_clock: Arc<dyn Clock> = Arc::new(clock.clone());
		let broker = Broker::with_http_client(
			test_config(test_endpoints(base_url)),
			test_reqwest_http_client(),
			Arc::new(ReqwestTransportErrorMapper),
			dyn_clock,
			trace,
		)
		.expect("Test broker should build.");

		(broker, clock, sink)
	}
}

mod _prelude {
	pub use std::{
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
		time::Duration as StdDuration,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::Mutex;
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;
	pub use uuid::Uuid;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)]
use {
	color_eyre as _, dotenvy as _, httpmock as _, tower as _, tracing_subscriber as _,
};
