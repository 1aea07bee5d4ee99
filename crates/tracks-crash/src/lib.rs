// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Crash and error reporting for Tracks.
//!
//! Errors, messages and panics are turned into events, checked against the
//! send policy, enriched with locale, app state and user, optionally bound to
//! a queued diagnostic log, and uploaded to a Sentry-compatible collector as
//! envelopes.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use tracks_crash::{CrashLogging, EnvDataProvider, ExtraMap, Severity, UploadQueue};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let crash_logging = CrashLogging::builder()
//!         .data_provider(Arc::new(EnvDataProvider::new()))
//!         .queue(Arc::new(UploadQueue::from_xdg()?))
//!         .build()?;
//!
//!     // Validates the DSN and installs the panic hook.
//!     crash_logging.start()?;
//!
//!     // Fire and forget.
//!     if let Err(e) = std::fs::read("/etc/missing") {
//!         crash_logging.log_error(&e, ExtraMap::new(), Severity::Error);
//!     }
//!
//!     // Upload logs left over from earlier sessions.
//!     crash_logging.retry_pending_logs().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Send policy
//!
//! Debug builds report only when `force_crash_logging` is set (or
//! `TRACKS_FORCE_CRASH_LOGGING` is truthy). Every build honours the user's
//! opt-out, which is read from the data provider for each event.
//!
//! # Logs
//!
//! When an [`UploadQueue`] is configured, each outgoing event takes the most
//! recent queued log that no other in-flight event holds. The log is removed
//! once the collector accepts the envelope and stays queued otherwise.

mod backtrace;
mod client;
mod delivery;
mod enricher;
mod envelope;
mod error;
mod gatekeeper;
mod panic_hook;
mod provider;
mod transport;

pub use backtrace::capture_stacktrace;
pub use client::{
	ClientConfig, CrashLogging, CrashLoggingBuilder, CrashLoggingConfig, DEFAULT_MAX_ENVELOPE_BYTES,
	FORCE_CRASH_LOGGING_ENV,
};
pub use delivery::{DeliveryClient, DeliveryOutcome};
pub use enricher::{Enricher, Scope, APP_STATE_TAG, LOCALE_TAG, SDK_NAME_TAG, SDK_VERSION_TAG};
pub use envelope::{decode as decode_envelope, DecodedItem, EnvelopeError, ENVELOPE_CONTENT_TYPE};
pub use error::{CrashLoggingError, DeliveryError, Result, TransportError};
pub use gatekeeper::should_send;
pub use provider::{
	ContextProvider, CrashLoggingDataProvider, EnvDataProvider, SystemContextProvider,
	BUILD_TYPE_ENV, DSN_ENV, OPT_OUT_ENV, RELEASE_ENV,
};
pub use transport::{HttpTransport, Transport, TransportRequest, TransportResponse, AUTH_HEADER};

// Re-export core types for convenience
pub use tracks_crash_core::{
	AppState, BuildType, DiagnosticEvent, Dsn, ExtraMap, ExtraValue, LogFile, Severity, Stacktrace,
	UserContext,
};
pub use tracks_event_logging::{RetentionPolicy, UploadQueue};
