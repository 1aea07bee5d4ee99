// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Durable upload queue for diagnostic log files.
//!
//! The queue is a directory holding one file per log, named by the log's
//! identifier. A file's presence is the only thing that makes a log a
//! member of the queue. Admission order is kept in a sidecar ledger
//! (`.ledger.json`) so that `peek_oldest` is FIFO regardless of how the
//! filesystem orders directory listings.
//!
//! ```ignore
//! use tracks_event_logging::UploadQueue;
//! use tracks_crash_core::LogFile;
//!
//! let queue = UploadQueue::from_xdg()?;
//! let queued = queue.enqueue(&LogFile::new("/tmp/session.log")).await?;
//!
//! if let Some(oldest) = queue.peek_oldest().await? {
//!     upload(&oldest).await?;
//!     queue.remove(&oldest).await?;
//! }
//! ```

mod error;
mod ledger;
mod queue;
mod retention;

pub use error::{QueueError, Result};
pub use queue::UploadQueue;
pub use retention::RetentionPolicy;
