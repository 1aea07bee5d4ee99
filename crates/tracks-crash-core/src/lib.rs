// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core types for Tracks crash and error reporting.
//!
//! This crate holds the data model shared by the upload queue
//! (`tracks-event-logging`) and the reporting client (`tracks-crash`):
//!
//! - [`DiagnosticEvent`]: a crash, error or message bound for the collector
//! - [`ExtraValue`]: the closed value type used for caller-supplied context
//! - [`UserContext`] and [`AppState`]: enrichment inputs
//! - [`LogFile`]: a diagnostic log artifact waiting for upload
//! - [`Dsn`]: the parsed destination connection string and its auth header
//! - [`BuildType`]: build classification used by the send policy

pub mod build;
pub mod context;
pub mod dsn;
pub mod error;
pub mod event;
pub mod log_file;
pub mod value;

pub use build::BuildType;
pub use context::{AppState, UserContext};
pub use dsn::{Dsn, SENTRY_PROTOCOL_VERSION};
pub use error::{CrashError, Result};
pub use event::{
	DiagnosticEvent, ErrorReport, EventId, ExceptionInfo, Frame, SdkInfo, Severity, Stacktrace,
	ThreadSnapshot, Values,
};
pub use log_file::{is_valid_identifier, LogFile};
pub use value::{ExtraMap, ExtraValue};
