// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Event enrichment.

use std::sync::Arc;

use tracing::{debug, warn};
use tracks_common_http::{CLIENT_NAME, CLIENT_VERSION};
use tracks_crash_core::{AppState, BuildType, DiagnosticEvent, LogFile, SdkInfo, UserContext};
use tracks_event_logging::UploadQueue;

use crate::provider::ContextProvider;

pub const LOCALE_TAG: &str = "locale";
pub const APP_STATE_TAG: &str = "app.state";
pub const SDK_NAME_TAG: &str = "sdk.name";
pub const SDK_VERSION_TAG: &str = "sdk.version";

const UNKNOWN: &str = "unknown";

/// Per-send inputs read from the data provider.
#[derive(Debug, Clone, Default)]
pub struct Scope {
	pub user: Option<UserContext>,
	pub release: Option<String>,
	pub build_type: BuildType,
}

/// Attaches locale, lifecycle, user and release metadata to events, and
/// binds a queued log when one is available.
#[derive(Clone)]
pub struct Enricher {
	context: Arc<dyn ContextProvider>,
	queue: Option<Arc<UploadQueue>>,
}

impl Enricher {
	pub fn new(context: Arc<dyn ContextProvider>, queue: Option<Arc<UploadQueue>>) -> Self {
		Self { context, queue }
	}

	/// Full enrichment. The returned log, if any, is claimed and must be
	/// removed or released by the caller once delivery settles.
	pub async fn enrich(&self, event: &mut DiagnosticEvent, scope: &Scope) -> Option<LogFile> {
		self.apply_metadata(event, scope);
		self.attach_log(event).await
	}

	/// Everything except the log lookup. Safe to call while panicking.
	pub fn apply_metadata(&self, event: &mut DiagnosticEvent, scope: &Scope) {
		let locale = self
			.context
			.locale_language_code()
			.filter(|code| !code.is_empty())
			.unwrap_or_else(|| UNKNOWN.to_string());
		event.tags.insert(LOCALE_TAG.to_string(), locale);

		let app_state = self.context.app_state().unwrap_or(AppState::Unknown);
		event
			.tags
			.insert(APP_STATE_TAG.to_string(), app_state.as_str().to_string());

		event.user = Some(scope.user.clone().unwrap_or_else(UserContext::anonymous));

		if event.release.is_none() {
			event.release = scope.release.clone();
		}
		if event.environment.is_none() {
			event.environment = Some(scope.build_type.as_str().to_string());
		}

		event
			.tags
			.entry(SDK_NAME_TAG.to_string())
			.or_insert_with(|| CLIENT_NAME.to_string());
		event
			.tags
			.entry(SDK_VERSION_TAG.to_string())
			.or_insert_with(|| CLIENT_VERSION.to_string());
		if event.sdk.is_none() {
			event.sdk = Some(SdkInfo {
				name: CLIENT_NAME.to_string(),
				version: CLIENT_VERSION.to_string(),
			});
		}
	}

	async fn attach_log(&self, event: &mut DiagnosticEvent) -> Option<LogFile> {
		let queue = self.queue.as_ref()?;

		if let Some(identifier) = event.associated_log_identifier.clone() {
			return match queue.claim(&identifier).await {
				Ok(Some(log)) => Some(log),
				Ok(None) => {
					self.keep_if_resident(queue, event, &identifier).await;
					None
				}
				Err(e) => {
					// Existence unknown; the reference stays.
					warn!(identifier, error = %e, "failed to look up referenced log");
					None
				}
			};
		}

		match queue.claim_newest().await {
			Ok(Some(log)) => {
				debug!(
					event_id = %event.event_id,
					identifier = %log.identifier,
					"attached queued log to event"
				);
				event.associated_log_identifier = Some(log.identifier.clone());
				Some(log)
			}
			Ok(None) => None,
			Err(e) => {
				warn!(error = %e, "failed to look up pending logs");
				None
			}
		}
	}

	/// A reference to a log held by another in-flight event is kept; only a
	/// reference to a log that has left the queue is dropped.
	async fn keep_if_resident(
		&self,
		queue: &UploadQueue,
		event: &mut DiagnosticEvent,
		identifier: &str,
	) {
		match queue.contains(identifier).await {
			Ok(true) => {
				debug!(
					event_id = %event.event_id,
					identifier,
					"referenced log is claimed elsewhere, keeping reference"
				);
			}
			Ok(false) => {
				debug!(
					event_id = %event.event_id,
					identifier,
					"referenced log is not queued, dropping reference"
				);
				event.associated_log_identifier = None;
			}
			Err(e) => {
				warn!(identifier, error = %e, "failed to look up referenced log");
			}
		}
	}
}
