// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the crash logging client.

use thiserror::Error;
use tracks_event_logging::QueueError;

use crate::envelope::EnvelopeError;

/// Result type alias for crash logging operations.
pub type Result<T> = std::result::Result<T, CrashLoggingError>;

/// Errors surfaced by [`CrashLogging`](crate::CrashLogging).
#[derive(Debug, Error)]
pub enum CrashLoggingError {
	/// The destination connection string is missing or malformed.
	#[error("invalid DSN: {0}")]
	InvalidDsn(String),

	/// `start()` has not completed successfully.
	#[error("crash logging has not been started")]
	NotStarted,

	/// No Tokio runtime was available to run uploads on.
	#[error("no Tokio runtime available")]
	MissingRuntime,

	/// The collector answered with a non-success status.
	#[error("server error (status {status}): {message}")]
	ServerError {
		/// HTTP status code.
		status: u16,
		/// Response body.
		message: String,
	},

	/// The collector is rate limiting this client.
	#[error("rate limited, retry after {retry_after_secs:?} seconds")]
	RateLimited {
		/// Parsed `Retry-After` header value.
		retry_after_secs: Option<u64>,
	},

	#[error(transparent)]
	Delivery(#[from] DeliveryError),

	#[error(transparent)]
	Queue(#[from] QueueError),
}

/// Errors from a single delivery attempt.
#[derive(Debug, Error)]
pub enum DeliveryError {
	/// Credentials could not be turned into an auth header.
	#[error("cannot authenticate: {0}")]
	Auth(String),

	#[error("transport failed: {0}")]
	Transport(#[from] TransportError),

	#[error("failed to encode envelope: {0}")]
	Encode(#[from] EnvelopeError),

	/// The blocking variant gave up waiting.
	#[error("delivery did not complete within the deadline")]
	Timeout,

	/// The blocking variant has no runtime it can wait on safely.
	#[error("no multi-threaded Tokio runtime available to wait on")]
	RuntimeUnavailable,
}

/// Errors raised by a [`Transport`](crate::Transport).
#[derive(Debug, Error)]
pub enum TransportError {
	#[error("HTTP request failed: {0}")]
	Http(#[from] reqwest::Error),

	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	#[error("{0}")]
	Other(String),
}
