// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::time::Duration;

/// Limits applied by [`UploadQueue::prune`](crate::UploadQueue::prune).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionPolicy {
	/// Logs admitted longer ago than this are discarded.
	pub max_age: Option<Duration>,
	/// Oldest logs beyond this count are discarded.
	pub max_entries: Option<usize>,
}

impl RetentionPolicy {
	/// Keeps everything.
	pub fn unlimited() -> Self {
		Self {
			max_age: None,
			max_entries: None,
		}
	}
}

impl Default for RetentionPolicy {
	fn default() -> Self {
		Self {
			max_age: Some(Duration::from_secs(7 * 24 * 60 * 60)),
			max_entries: Some(50),
		}
	}
}
