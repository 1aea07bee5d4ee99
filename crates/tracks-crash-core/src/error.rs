// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the crash data model.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CrashError {
	#[error("invalid DSN: {0}")]
	InvalidDsn(String),

	#[error("invalid severity: {0}")]
	InvalidSeverity(String),

	#[error("invalid build type: {0}")]
	InvalidBuildType(String),

	#[error("invalid app state: {0}")]
	InvalidAppState(String),

	#[error("serialization error: {0}")]
	Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CrashError>;
