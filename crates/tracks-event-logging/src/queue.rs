// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The upload queue.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use tracks_crash_core::{is_valid_identifier, LogFile};

use crate::error::{QueueError, Result};
use crate::ledger::Ledger;
use crate::retention::RetentionPolicy;

/// Durable FIFO of log files awaiting upload.
///
/// Writes go to a uniquely named hidden temp file and are renamed into place,
/// so concurrent callers never observe partial entries. Ledger updates are
/// serialized by an async mutex; reads never take it because the ledger is
/// itself replaced atomically.
///
/// Logs can be *claimed* while an upload carrying them is in flight. A
/// claimed log is skipped by [`claim_newest`](Self::claim_newest) and
/// [`prune`](Self::prune) until it is released or removed.
pub struct UploadQueue {
	dir: PathBuf,
	ledger_lock: tokio::sync::Mutex<()>,
	in_flight: Mutex<HashSet<String>>,
}

impl UploadQueue {
	/// A queue stored in `dir`. The directory is created lazily.
	pub fn new(dir: impl Into<PathBuf>) -> Self {
		Self {
			dir: dir.into(),
			ledger_lock: tokio::sync::Mutex::new(()),
			in_flight: Mutex::new(HashSet::new()),
		}
	}

	/// A queue under `$XDG_DATA_HOME/tracks/logs`.
	pub fn from_xdg() -> Result<Self> {
		let data_dir = dirs::data_dir().ok_or(QueueError::NoDataDir)?;
		let dir = data_dir.join("tracks").join("logs");

		info!(queue_dir = %dir.display(), "initialized log upload queue");

		Ok(Self::new(dir))
	}

	pub fn dir(&self) -> &Path {
		&self.dir
	}

	/// Creates the storage directory if needed. Safe to call concurrently.
	pub async fn ensure_storage_exists(&self) -> Result<()> {
		tokio::fs::create_dir_all(&self.dir).await?;
		Ok(())
	}

	/// Copies `log` into the queue and returns the queued record.
	///
	/// On failure nothing becomes visible: the temp copy is removed and the
	/// source is left untouched.
	pub async fn enqueue(&self, log: &LogFile) -> Result<LogFile> {
		self.validate_new(&log.identifier).await?;

		let tmp_path = self.temp_path(&log.identifier);
		if let Err(e) = tokio::fs::copy(&log.location, &tmp_path).await {
			discard_temp(&tmp_path).await;
			warn!(
				identifier = %log.identifier,
				source = %log.location.display(),
				error = %e,
				"failed to copy log into queue"
			);
			return Err(e.into());
		}

		self.admit(&log.identifier, &tmp_path).await
	}

	/// Queues in-memory log contents under `identifier`.
	pub async fn enqueue_bytes(&self, identifier: &str, contents: &[u8]) -> Result<LogFile> {
		self.validate_new(identifier).await?;

		let tmp_path = self.temp_path(identifier);
		if let Err(e) = tokio::fs::write(&tmp_path, contents).await {
			discard_temp(&tmp_path).await;
			warn!(identifier, error = %e, "failed to write log into queue");
			return Err(e.into());
		}

		self.admit(identifier, &tmp_path).await
	}

	/// The earliest-admitted resident log.
	pub async fn peek_oldest(&self) -> Result<Option<LogFile>> {
		Ok(self.pending().await?.into_iter().next())
	}

	/// The most recently admitted resident log.
	pub async fn peek_newest(&self) -> Result<Option<LogFile>> {
		Ok(self.pending().await?.pop())
	}

	/// All resident logs, oldest first.
	///
	/// Logs the ledger knows about are ordered by admission sequence; any
	/// others follow, ordered by modification time.
	pub async fn pending(&self) -> Result<Vec<LogFile>> {
		let mut entries = match tokio::fs::read_dir(&self.dir).await {
			Ok(entries) => entries,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
			Err(e) => return Err(e.into()),
		};

		let ledger = Ledger::load(&self.dir).await;
		let mut logs = Vec::new();

		while let Some(entry) = entries.next_entry().await? {
			let Some(name) = entry.file_name().to_str().map(str::to_string) else {
				continue;
			};
			if !is_valid_identifier(&name) {
				continue;
			}

			let metadata = match entry.metadata().await {
				Ok(metadata) if metadata.is_file() => metadata,
				Ok(_) => continue,
				// Removed between listing and stat.
				Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
				Err(e) => return Err(e.into()),
			};

			let (ledgered, sequence, created_at) = match ledger.entries.get(&name) {
				Some(e) => (true, e.sequence, e.created_at),
				None => {
					let modified = metadata
						.modified()
						.map(DateTime::<Utc>::from)
						.unwrap_or_else(|_| Utc::now());
					(false, 0, modified)
				}
			};

			logs.push((
				!ledgered,
				LogFile {
					location: entry.path(),
					identifier: name,
					sequence,
					created_at,
				},
			));
		}

		logs.sort_by(|(a_unledgered, a), (b_unledgered, b)| {
			a_unledgered
				.cmp(b_unledgered)
				.then(a.sequence.cmp(&b.sequence))
				.then(a.created_at.cmp(&b.created_at))
				.then(a.identifier.cmp(&b.identifier))
		});

		Ok(logs.into_iter().map(|(_, log)| log).collect())
	}

	pub async fn len(&self) -> Result<usize> {
		Ok(self.pending().await?.len())
	}

	pub async fn is_empty(&self) -> Result<bool> {
		Ok(self.len().await? == 0)
	}

	pub async fn contains(&self, identifier: &str) -> Result<bool> {
		if !is_valid_identifier(identifier) {
			return Ok(false);
		}
		Ok(tokio::fs::try_exists(self.dir.join(identifier)).await?)
	}

	pub async fn get(&self, identifier: &str) -> Result<Option<LogFile>> {
		if !self.contains(identifier).await? {
			return Ok(None);
		}
		Ok(self
			.pending()
			.await?
			.into_iter()
			.find(|log| log.identifier == identifier))
	}

	/// Deletes a queued log. Removing an absent log is not an error.
	pub async fn remove(&self, log: &LogFile) -> Result<bool> {
		self.remove_identifier(&log.identifier).await
	}

	/// Deletes a queued log by identifier; returns whether a file was removed.
	///
	/// A claim on the log is dropped only once the file is gone, so no other
	/// caller can claim it in between.
	pub async fn remove_identifier(&self, identifier: &str) -> Result<bool> {
		if !is_valid_identifier(identifier) {
			self.release(identifier);
			return Ok(false);
		}

		let deleted = tokio::fs::remove_file(self.dir.join(identifier)).await;
		self.release(identifier);
		let removed = match deleted {
			Ok(()) => true,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
			Err(e) => {
				warn!(identifier, error = %e, "failed to remove queued log");
				return Err(e.into());
			}
		};

		let _guard = self.ledger_lock.lock().await;
		let mut ledger = Ledger::load(&self.dir).await;
		if ledger.forget(identifier) {
			if let Err(e) = ledger.save(&self.dir).await {
				warn!(identifier, error = %e, "failed to update ledger after removal");
			}
		}

		if removed {
			info!(identifier, "removed log from upload queue");
		}
		Ok(removed)
	}

	/// Claims a specific resident log. Returns `None` when it is absent or
	/// already claimed.
	pub async fn claim(&self, identifier: &str) -> Result<Option<LogFile>> {
		let Some(log) = self.get(identifier).await? else {
			return Ok(None);
		};

		if !self.mark(&log.identifier) {
			return Ok(None);
		}
		self.confirm_claim(log).await
	}

	/// Claims the most recently admitted log that is not already claimed.
	pub async fn claim_newest(&self) -> Result<Option<LogFile>> {
		let mut pending = self.pending().await?;

		while let Some(log) = pending.pop() {
			if !self.mark(&log.identifier) {
				continue;
			}
			if let Some(log) = self.confirm_claim(log).await? {
				debug!(identifier = %log.identifier, "claimed log for upload");
				return Ok(Some(log));
			}
		}
		Ok(None)
	}

	/// Returns a claimed log to the pool, e.g. after a failed upload.
	pub fn release(&self, identifier: &str) {
		self.lock_in_flight().remove(identifier);
	}

	pub fn is_claimed(&self, identifier: &str) -> bool {
		self.lock_in_flight().contains(identifier)
	}

	/// Discards logs outside `policy`, oldest first. Claimed logs are kept.
	pub async fn prune(&self, policy: &RetentionPolicy) -> Result<Vec<LogFile>> {
		let pending = self.pending().await?;
		let now = Utc::now();

		let mut keep = Vec::new();
		let mut discard = Vec::new();
		for log in pending {
			let expired = policy
				.max_age
				.and_then(|age| chrono::Duration::from_std(age).ok())
				.is_some_and(|age| now - log.created_at > age);
			if expired && !self.is_claimed(&log.identifier) {
				discard.push(log);
			} else {
				keep.push(log);
			}
		}

		if let Some(max) = policy.max_entries {
			let mut excess = keep.len().saturating_sub(max);
			keep.retain(|log| {
				if excess > 0 && !self.is_claimed(&log.identifier) {
					excess -= 1;
					discard.push(log.clone());
					false
				} else {
					true
				}
			});
		}

		let mut discarded = Vec::with_capacity(discard.len());
		for log in discard {
			// Claimed since the scan; leave it to its holder.
			if !self.mark(&log.identifier) {
				keep.push(log);
				continue;
			}
			self.remove(&log).await?;
			discarded.push(log);
		}

		self.compact_ledger(&keep).await;

		if !discarded.is_empty() {
			info!(discarded = discarded.len(), kept = keep.len(), "pruned log upload queue");
		}
		Ok(discarded)
	}

	async fn compact_ledger(&self, resident: &[LogFile]) {
		let _guard = self.ledger_lock.lock().await;
		let mut ledger = Ledger::load(&self.dir).await;
		let before = ledger.entries.len();
		ledger
			.entries
			.retain(|id, _| resident.iter().any(|log| &log.identifier == id));

		if ledger.entries.len() != before {
			if let Err(e) = ledger.save(&self.dir).await {
				warn!(error = %e, "failed to compact queue ledger");
			}
		}
	}

	async fn validate_new(&self, identifier: &str) -> Result<()> {
		if !is_valid_identifier(identifier) {
			return Err(QueueError::InvalidIdentifier(identifier.to_string()));
		}
		self.ensure_storage_exists().await?;
		if self.contains(identifier).await? {
			return Err(QueueError::Duplicate(identifier.to_string()));
		}
		Ok(())
	}

	fn temp_path(&self, identifier: &str) -> PathBuf {
		self.dir
			.join(format!(".{identifier}.{}.tmp", uuid::Uuid::new_v4().simple()))
	}

	/// Moves a fully written temp file into place and records its order.
	async fn admit(&self, identifier: &str, tmp_path: &Path) -> Result<LogFile> {
		let path = self.dir.join(identifier);
		let _guard = self.ledger_lock.lock().await;

		if tokio::fs::try_exists(&path).await? {
			discard_temp(tmp_path).await;
			return Err(QueueError::Duplicate(identifier.to_string()));
		}

		if let Err(e) = tokio::fs::rename(tmp_path, &path).await {
			discard_temp(tmp_path).await;
			return Err(e.into());
		}

		let mut ledger = Ledger::load(&self.dir).await;
		let entry = ledger.admit(identifier, Utc::now());
		if let Err(e) = ledger.save(&self.dir).await {
			// The log is queued; it just sorts by mtime until the ledger is rewritten.
			warn!(identifier, error = %e, "failed to record log in ledger");
		}

		info!(identifier, sequence = entry.sequence, "queued log for upload");

		Ok(LogFile {
			identifier: identifier.to_string(),
			location: path,
			sequence: entry.sequence,
			created_at: entry.created_at,
		})
	}

	/// Marks `identifier` in flight; false when someone already holds it.
	fn mark(&self, identifier: &str) -> bool {
		self.lock_in_flight().insert(identifier.to_string())
	}

	/// The listing may predate a removal; a claim only stands if the file
	/// is still there once the mark is held.
	async fn confirm_claim(&self, log: LogFile) -> Result<Option<LogFile>> {
		match tokio::fs::try_exists(&log.location).await {
			Ok(true) => Ok(Some(log)),
			Ok(false) => {
				self.release(&log.identifier);
				Ok(None)
			}
			Err(e) => {
				self.release(&log.identifier);
				Err(e.into())
			}
		}
	}

	fn lock_in_flight(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
		self.in_flight
			.lock()
			.unwrap_or_else(|poisoned| poisoned.into_inner())
	}
}

async fn discard_temp(path: &Path) {
	if let Err(e) = tokio::fs::remove_file(path).await {
		if e.kind() != std::io::ErrorKind::NotFound {
			warn!(path = %path.display(), error = %e, "failed to remove temp file");
		}
	}
}
