//! Ports to the visual embedding surface and the presentation adapter.

// self
use crate::{
	_prelude::*,
	api::ReportConfig,
	auth::{EmbedToken, ReportId, TokenSecret},
	session::{SessionFuture, SessionIntent},
};

const TOKEN_EXPIRED_MARKER: &str = "TokenExpired";

/// Failure reported by the embed surface, either while embedding or on its runtime error
/// channel.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("{message}")]
pub struct SurfaceError {
	/// Message as reported by the surface.
	pub message: String,
}
impl SurfaceError {
	/// Wraps a surface message.
	pub fn new(message: impl Into<String>) -> Self {
		Self { message: message.into() }
	}

	/// Whether the message signals that the embed token expired.
	pub fn is_token_expired(&self) -> bool {
		self.message.contains(TOKEN_EXPIRED_MARKER)
	}
}

/// Events emitted by a live embed session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SurfaceEvent {
	/// The report finished loading.
	Loaded,
	/// The report finished rendering.
	Rendered,
	/// The report reported a runtime error.
	Error(SurfaceError),
}

/// Access granted to the viewer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum Permission {
	/// View only.
	#[default]
	Read,
}

/// Canvas background.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum Background {
	/// Let the host page show through.
	#[default]
	Transparent,
}

/// How report pages are fitted into the container.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum DisplayOption {
	/// Scale pages to the container width.
	#[default]
	FitToWidth,
}

/// Page layout of the embedded report.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Layout {
	/// Custom layout with the given display option.
	Custom(DisplayOption),
}
impl Default for Layout {
	fn default() -> Self {
		Self::Custom(DisplayOption::default())
	}
}

/// Fixed display options.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbedSettings {
	/// Show the filter pane.
	pub filter_pane_enabled: bool,
	/// Show page navigation.
	pub nav_content_pane_enabled: bool,
	/// Canvas background.
	pub background: Background,
	/// Page layout.
	pub layout: Layout,
}
impl Default for EmbedSettings {
	fn default() -> Self {
		Self {
			filter_pane_enabled: true,
			nav_content_pane_enabled: true,
			background: Background::Transparent,
			layout: Layout::default(),
		}
	}
}

/// Everything a surface needs to embed one report.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbedConfiguration {
	/// Report to render.
	pub id: ReportId,
	/// Report-viewing URL.
	pub embed_url: Url,
	/// Embed token.
	pub access_token: TokenSecret,
	/// Viewer permission.
	pub permissions: Permission,
	/// Display options.
	pub settings: EmbedSettings,
}
impl EmbedConfiguration {
	/// Builds a view-only configuration from the served report and a fresh token.
	pub fn new(config: &ReportConfig, token: &EmbedToken) -> Self {
		Self {
			id: config.report_id.clone(),
			embed_url: token.embed_url.clone(),
			access_token: token.value.clone(),
			permissions: Permission::Read,
			settings: EmbedSettings::default(),
		}
	}
}

/// The visual embedding surface.
///
/// Hosts forward the surface's events to
/// [`SessionController::handle_event`](crate::session::SessionController::handle_event).
pub trait EmbedSurface
where
	Self: Send + Sync,
{
	/// Creates (or recreates) the embedded report.
	fn embed(&self, configuration: EmbedConfiguration) -> SessionFuture<'_, Result<(), SurfaceError>>;

	/// Swaps the access token of the live report without recreating it.
	fn set_access_token<'a>(
		&'a self,
		token: &'a TokenSecret,
	) -> SessionFuture<'a, Result<(), SurfaceError>>;
}

/// Consumes the intents emitted by session transitions.
pub trait SessionPresenter
where
	Self: Send + Sync,
{
	/// Applies one intent.
	fn present(&self, intent: SessionIntent);
}
impl<F> SessionPresenter for F
where
	F: Send + Sync + Fn(SessionIntent),
{
	fn present(&self, intent: SessionIntent) {
		self(intent)
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros::datetime;
	// self
	use super::*;
	use crate::auth::WorkspaceId;

	#[test]
	fn token_expiry_is_detected_by_marker() {
		assert!(SurfaceError::new("TokenExpired: Access token has expired").is_token_expired());
		assert!(!SurfaceError::new("token expired").is_token_expired());
	}

	#[test]
	fn configuration_is_view_only_with_fixed_layout() {
		let config = ReportConfig {
			workspace_id: WorkspaceId::new("ws").expect("Workspace fixture should be valid."),
			report_id: ReportId::new("rep").expect("Report fixture should be valid."),
			environment: "test".into(),
			correlation_id: Uuid::nil(),
		};
		let token = EmbedToken {
			value: TokenSecret::new("embed"),
			expires_at: datetime!(2025-01-01 01:00 UTC),
			embed_url: Url::parse("https://app.powerbi.com/reportEmbed?reportId=rep&groupId=ws")
				.expect("Fixture URL should parse."),
			correlation_id: Uuid::nil(),
		};
		let configuration = EmbedConfiguration::new(&config, &token);
		let json = serde_json::to_value(&configuration).expect("Configuration should serialize.");

		assert_eq!(configuration.permissions, Permission::Read);
		assert_eq!(json["accessToken"], "embed");
		assert_eq!(json["settings"]["filterPaneEnabled"], true);
		assert_eq!(json["settings"]["background"], "Transparent");
		assert_eq!(json["settings"]["layout"]["Custom"], "FitToWidth");
	}
}
