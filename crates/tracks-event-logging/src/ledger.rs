// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Admission-order ledger stored next to the queued logs.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;

pub(crate) const LEDGER_FILE: &str = ".ledger.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct LedgerEntry {
	pub sequence: u64,
	pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct Ledger {
	#[serde(default)]
	pub next_sequence: u64,
	#[serde(default)]
	pub entries: BTreeMap<String, LedgerEntry>,
}

impl Ledger {
	pub fn path(dir: &Path) -> PathBuf {
		dir.join(LEDGER_FILE)
	}

	/// Loads the ledger. A missing or unreadable ledger yields an empty one;
	/// logs without an entry still sort by modification time.
	pub async fn load(dir: &Path) -> Self {
		let path = Self::path(dir);
		let contents = match tokio::fs::read(&path).await {
			Ok(contents) => contents,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::default(),
			Err(e) => {
				warn!(path = %path.display(), error = %e, "failed to read queue ledger");
				return Self::default();
			}
		};

		match serde_json::from_slice(&contents) {
			Ok(ledger) => ledger,
			Err(e) => {
				warn!(path = %path.display(), error = %e, "corrupt queue ledger, ignoring");
				Self::default()
			}
		}
	}

	pub async fn save(&self, dir: &Path) -> Result<()> {
		let path = Self::path(dir);
		let tmp_path = dir.join(format!("{LEDGER_FILE}.{}.tmp", uuid::Uuid::new_v4().simple()));

		let json = serde_json::to_vec_pretty(self)?;
		tokio::fs::write(&tmp_path, &json).await?;
		if let Err(e) = tokio::fs::rename(&tmp_path, &path).await {
			let _ = tokio::fs::remove_file(&tmp_path).await;
			return Err(e.into());
		}

		debug!(path = %path.display(), count = self.entries.len(), "saved queue ledger");
		Ok(())
	}

	/// Records a new admission and returns its entry.
	pub fn admit(&mut self, identifier: &str, created_at: DateTime<Utc>) -> LedgerEntry {
		let floor = self
			.entries
			.values()
			.map(|e| e.sequence + 1)
			.max()
			.unwrap_or(1);
		let sequence = self.next_sequence.max(floor);
		self.next_sequence = sequence + 1;

		let entry = LedgerEntry {
			sequence,
			created_at,
		};
		self.entries.insert(identifier.to_string(), entry);
		entry
	}

	pub fn forget(&mut self, identifier: &str) -> bool {
		self.entries.remove(identifier).is_some()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	#[test]
	fn sequences_are_monotonic() {
		let mut ledger = Ledger::default();
		let a = ledger.admit("a", Utc::now());
		let b = ledger.admit("b", Utc::now());
		ledger.forget("b");
		let c = ledger.admit("c", Utc::now());

		assert!(a.sequence < b.sequence);
		assert!(b.sequence < c.sequence);
	}

	#[test]
	fn sequences_stay_above_existing_entries_after_reset() {
		let mut ledger = Ledger::default();
		ledger.admit("a", Utc::now());
		ledger.admit("b", Utc::now());
		ledger.next_sequence = 0;

		let c = ledger.admit("c", Utc::now());
		assert!(c.sequence > ledger.entries["b"].sequence);
	}

	#[tokio::test]
	async fn save_and_load_roundtrip() {
		let tmp = TempDir::new().unwrap();
		let mut ledger = Ledger::default();
		let entry = ledger.admit("log-1", Utc::now());
		ledger.save(tmp.path()).await.unwrap();

		let loaded = Ledger::load(tmp.path()).await;
		assert_eq!(loaded.entries["log-1"], entry);
		assert_eq!(loaded.next_sequence, ledger.next_sequence);
	}

	#[tokio::test]
	async fn corrupt_ledger_loads_empty() {
		let tmp = TempDir::new().unwrap();
		tokio::fs::write(Ledger::path(tmp.path()), b"{not json").await.unwrap();

		let loaded = Ledger::load(tmp.path()).await;
		assert!(loaded.entries.is_empty());
	}
}
