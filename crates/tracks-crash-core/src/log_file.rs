// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Diagnostic log artifacts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Longest identifier accepted, so it always fits in a file name.
const MAX_IDENTIFIER_LEN: usize = 128;

/// One log file, either still owned by the host application or resident in
/// the upload queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogFile {
	pub identifier: String,
	pub location: PathBuf,
	/// Admission order within the queue; 0 until admitted.
	#[serde(default)]
	pub sequence: u64,
	pub created_at: DateTime<Utc>,
}

impl LogFile {
	/// A log at `location` with a freshly generated identifier.
	pub fn new(location: impl Into<PathBuf>) -> Self {
		Self::with_identifier(Uuid::new_v4().to_string(), location)
	}

	pub fn with_identifier(identifier: impl Into<String>, location: impl Into<PathBuf>) -> Self {
		Self {
			identifier: identifier.into(),
			location: location.into(),
			sequence: 0,
			created_at: Utc::now(),
		}
	}

	pub fn path(&self) -> &Path {
		&self.location
	}

	/// File name used when the log is uploaded as an attachment.
	pub fn attachment_name(&self) -> String {
		format!("{}.log", self.identifier)
	}
}

/// Whether `identifier` can name a file directly inside the queue directory.
///
/// Rejects empty names, path separators, hidden names (reserved for temp
/// files and the ledger) and anything longer than 128 bytes.
pub fn is_valid_identifier(identifier: &str) -> bool {
	!identifier.is_empty()
		&& identifier.len() <= MAX_IDENTIFIER_LEN
		&& !identifier.starts_with('.')
		&& !identifier.contains(['/', '\\', '\0'])
}
