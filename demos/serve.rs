//! Serves the broker API on `PORT` (default 3000) with configuration read from the environment
//! or a `.env` file.
//!
//! ```sh
//! RUST_LOG=info cargo run --example serve
//! ```

// std
use std::{net::SocketAddr, sync::Arc};
// crates.io
use color_eyre::Result;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
// self
use embed_token_broker::{
	api::{self, ApiState},
	config::BrokerConfig,
	flows::ReqwestBroker,
};

const DEFAULT_PORT: u16 = 3000;

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;
	// A missing .env file is fine; the process environment still applies.
	let _ = dotenvy::dotenv();

	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
		.init();

	let config = BrokerConfig::from_env()?;
	let broker = ReqwestBroker::new(config)?;
	let port = std::env::var("PORT").ok().and_then(|raw| raw.parse().ok()).unwrap_or(DEFAULT_PORT);
	let listener = TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], port))).await?;

	tracing::info!(port, report = %broker.target().report_id, "serving embed token broker");

	axum::serve(listener, api::router(ApiState::new(Arc::new(broker))))
		.with_graceful_shutdown(shutdown_signal()?)
		.await?;

	tracing::info!("server closed");

	Ok(())
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM. Handlers are installed before the future is returned.
fn shutdown_signal() -> std::io::Result<impl Future<Output = ()>> {
	#[cfg(unix)]
	let mut terminate =
		tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

	Ok(async move {
		#[cfg(unix)]
		let terminate = async move {
			terminate.recv().await;
		};
		#[cfg(not(unix))]
		let terminate = std::future::pending::<()>();

		tokio::select! {
			result = tokio::signal::ctrl_c() => {
				if result.is_err() {
					tracing::warn!("ctrl-c handler unavailable; shutting down");
				}
			},
			_ = terminate => tracing::info!("received SIGTERM; shutting down"),
		}
	})
}
