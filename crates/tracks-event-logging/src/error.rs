// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

/// Errors from the upload queue. All of them leave the queue as it was;
/// callers retry later.
#[derive(Debug, Error)]
pub enum QueueError {
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	#[error("invalid log identifier: {0:?}")]
	InvalidIdentifier(String),

	#[error("log already queued: {0}")]
	Duplicate(String),

	#[error("ledger error: {0}")]
	Ledger(#[from] serde_json::Error),

	#[error("could not determine data directory")]
	NoDataDir,
}

pub type Result<T> = std::result::Result<T, QueueError>;
