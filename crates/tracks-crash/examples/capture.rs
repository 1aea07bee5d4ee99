// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Example: report errors and upload a diagnostic log with tracks-crash.
//!
//! Run with:
//!   TRACKS_SENTRY_DSN=https://key@sentry.example.com/1 \
//!   TRACKS_BUILD_TYPE=production \
//!     cargo run --example capture -p tracks-crash

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;
use tracks_crash::{
	CrashLogging, EnvDataProvider, ExtraMap, ExtraValue, Severity, UploadQueue, UserContext, DSN_ENV,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	tracing_subscriber::fmt()
		.with_env_filter(
			EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tracks_crash=debug")),
		)
		.init();

	if std::env::var(DSN_ENV).is_err() {
		eprintln!("{DSN_ENV} environment variable required");
		std::process::exit(1);
	}

	let queue = Arc::new(UploadQueue::from_xdg()?);
	println!("Log queue: {}", queue.dir().display());

	let provider = EnvDataProvider::new().with_user(UserContext::with_id("user_example_123"));
	let crash_logging = CrashLogging::builder()
		.data_provider(Arc::new(provider))
		.queue(Arc::clone(&queue))
		.force_crash_logging(true)
		.build()?;
	crash_logging.start()?;

	// A log from this session, attached to the next outgoing event.
	let session = format!("example-{}", std::process::id());
	queue
		.enqueue_bytes(&session, b"startup\nsync started\nsync failed\n")
		.await?;

	let mut context = ExtraMap::new();
	context.insert("screen".to_string(), ExtraValue::from("post-list"));
	context.insert("retry".to_string(), ExtraValue::from(3));

	println!("\nSending an error and waiting for the result...");
	let error = std::io::Error::new(std::io::ErrorKind::TimedOut, "sync timed out");
	let outcome = crash_logging
		.send_errors_immediately([&error], context.clone(), Severity::Error)
		.await?;
	println!("  outcome: {outcome:?}");

	println!("\nLogging a message in the background...");
	crash_logging.log_message("example finished syncing", context, Severity::Info);
	tokio::time::sleep(Duration::from_secs(2)).await;

	println!("\nUploading pending logs...");
	let uploaded = crash_logging.retry_pending_logs().await?;
	println!("  uploaded {uploaded} log(s)");

	Ok(())
}
