// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Delivery of enriched events to the collector.

use std::future::Future;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{debug, info, warn};
use tracks_common_config::SecretString;
use tracks_crash_core::{DiagnosticEvent, Dsn};
use tracks_event_logging::UploadQueue;

use crate::envelope::{self, Attachment, EnvelopeError, ENVELOPE_CONTENT_TYPE};
use crate::error::DeliveryError;
use crate::transport::{parse_retry_after, Transport, TransportRequest, TransportResponse};

/// How a delivery attempt settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
	/// The collector accepted the envelope (2xx).
	Delivered { status: u16 },
	/// The collector answered with a non-success status.
	Rejected {
		status: u16,
		body: String,
		/// Seconds from `Retry-After` on a 429.
		retry_after_secs: Option<u64>,
	},
	/// The batch could not be encoded; each event was handed to a
	/// best-effort single-event send whose result is not reported.
	FellBack { events: usize },
	/// Nothing was sent: the send policy refused or there was nothing to send.
	Suppressed,
}

impl DeliveryOutcome {
	pub fn is_delivered(&self) -> bool {
		matches!(self, Self::Delivered { .. })
	}
}

/// An outcome plus the queued logs whose bytes the collector accepted.
#[derive(Debug)]
pub(crate) struct SendReport {
	pub outcome: DeliveryOutcome,
	/// Empty unless the outcome is [`DeliveryOutcome::Delivered`].
	pub uploaded_logs: Vec<String>,
}

impl SendReport {
	fn nothing_uploaded(outcome: DeliveryOutcome) -> Self {
		Self {
			outcome,
			uploaded_logs: Vec::new(),
		}
	}
}

/// Serializes events into envelopes and hands them to a [`Transport`].
#[derive(Clone)]
pub struct DeliveryClient {
	transport: Arc<dyn Transport>,
	queue: Option<Arc<UploadQueue>>,
	max_envelope_bytes: Option<usize>,
	runtime: Option<Handle>,
}

impl DeliveryClient {
	pub fn new(transport: Arc<dyn Transport>) -> Self {
		Self {
			transport,
			queue: None,
			max_envelope_bytes: None,
			runtime: None,
		}
	}

	/// Queue used to read the bytes of attached logs.
	pub fn with_queue(mut self, queue: Arc<UploadQueue>) -> Self {
		self.queue = Some(queue);
		self
	}

	/// Envelopes larger than this fail to encode and take the fallback path.
	pub fn with_max_envelope_bytes(mut self, max: Option<usize>) -> Self {
		self.max_envelope_bytes = max;
		self
	}

	/// Runtime used by [`send_blocking`](Self::send_blocking).
	pub fn with_runtime(mut self, handle: Handle) -> Self {
		self.runtime = Some(handle);
		self
	}

	/// Sends `events` as one envelope.
	///
	/// If the batch cannot be encoded, each event is sent on its own in a
	/// spawned task, without attachments, and the result is
	/// [`DeliveryOutcome::FellBack`].
	pub async fn send(
		&self,
		events: &[DiagnosticEvent],
		dsn: &str,
	) -> Result<DeliveryOutcome, DeliveryError> {
		Ok(self.send_with_report(events, dsn, None).await?.outcome)
	}

	/// [`send`](Self::send), also reporting which logs went out.
	///
	/// With `attachable`, only those logs are read from the queue; other
	/// references are sent as metadata only. Logs are dropped, largest
	/// first, until the envelope fits `max_envelope_bytes`; only when the
	/// events alone do not fit does the batch fall back.
	pub(crate) async fn send_with_report(
		&self,
		events: &[DiagnosticEvent],
		dsn: &str,
		attachable: Option<&[String]>,
	) -> Result<SendReport, DeliveryError> {
		let dsn = parse_dsn(dsn)?;
		if events.is_empty() {
			return Ok(SendReport::nothing_uploaded(DeliveryOutcome::Suppressed));
		}

		let (mut uploaded_logs, mut attachments): (Vec<String>, Vec<Attachment>) = self
			.load_attachments(events, attachable)
			.await
			.into_iter()
			.unzip();

		let encoded = loop {
			match envelope::encode(events, &attachments, self.max_envelope_bytes) {
				Err(EnvelopeError::TooLarge { size, limit }) if !attachments.is_empty() => {
					let largest = attachments
						.iter()
						.enumerate()
						.max_by_key(|(_, a)| a.bytes.len())
						.map(|(index, _)| index)
						.unwrap_or_default();
					attachments.remove(largest);
					let identifier = uploaded_logs.remove(largest);
					warn!(identifier, size, limit, "envelope over limit, sending without log");
				}
				other => break other,
			}
		};

		let body = match encoded {
			Ok(body) => body,
			Err(e) => {
				warn!(
					error = %e,
					events = events.len(),
					"failed to encode batch, falling back to single-event sends"
				);
				self.fall_back(events, &dsn);
				return Ok(SendReport::nothing_uploaded(DeliveryOutcome::FellBack {
					events: events.len(),
				}));
			}
		};

		let response = self.transport.send(request(&dsn, body)).await?;
		let outcome = settle(response, events.len());
		if !outcome.is_delivered() {
			uploaded_logs.clear();
		}
		Ok(SendReport {
			outcome,
			uploaded_logs,
		})
	}

	/// Blocks the calling thread until [`send`](Self::send) settles or
	/// `deadline` passes.
	///
	/// Must not be called from a current-thread runtime; on a multi-thread
	/// runtime the wait is wrapped in `block_in_place`.
	pub fn send_blocking(
		&self,
		events: Vec<DiagnosticEvent>,
		dsn: &str,
		deadline: Duration,
	) -> Result<DeliveryOutcome, DeliveryError> {
		let handle = self
			.runtime
			.clone()
			.or_else(|| Handle::try_current().ok())
			.ok_or(DeliveryError::RuntimeUnavailable)?;

		let client = self.clone();
		let dsn = dsn.to_string();
		wait_for(
			&handle,
			async move { client.send(&events, &dsn).await },
			deadline,
		)?
	}

	/// Sends a single event without any runtime, for use from a panic hook.
	pub fn send_sync(
		&self,
		event: &DiagnosticEvent,
		dsn: &str,
	) -> Result<DeliveryOutcome, DeliveryError> {
		let dsn = parse_dsn(dsn)?;
		let body = envelope::encode(std::slice::from_ref(event), &[], None)?;
		let response = self.transport.send_blocking(request(&dsn, body))?;
		Ok(settle(response, 1))
	}

	async fn load_attachments(
		&self,
		events: &[DiagnosticEvent],
		attachable: Option<&[String]>,
	) -> Vec<(String, Attachment)> {
		let Some(queue) = &self.queue else {
			return Vec::new();
		};

		let mut attachments = Vec::new();
		for event in events {
			let Some(identifier) = &event.associated_log_identifier else {
				continue;
			};
			if attachable.is_some_and(|ids| !ids.contains(identifier)) {
				continue;
			}

			let log = match queue.get(identifier).await {
				Ok(Some(log)) => log,
				Ok(None) => {
					debug!(identifier, "attached log left the queue before upload");
					continue;
				}
				Err(e) => {
					warn!(identifier, error = %e, "failed to look up attached log");
					continue;
				}
			};

			match tokio::fs::read(log.path()).await {
				Ok(bytes) => attachments.push((
					identifier.clone(),
					Attachment {
						event_id: event.event_id,
						filename: log.attachment_name(),
						bytes,
					},
				)),
				Err(e) => warn!(identifier, error = %e, "failed to read attached log"),
			}
		}
		attachments
	}

	fn fall_back(&self, events: &[DiagnosticEvent], dsn: &Dsn) {
		for event in events {
			let transport = Arc::clone(&self.transport);
			let dsn = dsn.clone();
			let event = event.clone();

			tokio::spawn(async move {
				let body = match envelope::encode(std::slice::from_ref(&event), &[], None) {
					Ok(body) => body,
					Err(e) => {
						warn!(event_id = %event.event_id, error = %e, "dropping event that cannot be encoded");
						return;
					}
				};

				match transport.send(request(&dsn, body)).await {
					Ok(response) => {
						let outcome = settle(response, 1);
						debug!(event_id = %event.event_id, ?outcome, "best-effort send settled");
					}
					Err(e) => {
						debug!(event_id = %event.event_id, error = %e, "best-effort send failed");
					}
				}
			});
		}
	}
}

fn parse_dsn(dsn: &str) -> Result<Dsn, DeliveryError> {
	dsn.parse().map_err(|e: tracks_crash_core::CrashError| DeliveryError::Auth(e.to_string()))
}

fn request(dsn: &Dsn, body: Vec<u8>) -> TransportRequest {
	let auth = dsn.auth_header(&tracks_common_http::client_identifier(), Utc::now().timestamp());
	TransportRequest {
		url: dsn.envelope_url(),
		auth: SecretString::new(auth),
		content_type: ENVELOPE_CONTENT_TYPE,
		body,
	}
}

fn settle(response: TransportResponse, events: usize) -> DeliveryOutcome {
	let status = response.status;
	if (200..300).contains(&status) {
		info!(status, events, "delivered events");
		return DeliveryOutcome::Delivered { status };
	}

	let retry_after_secs = if status == 429 {
		response.retry_after.as_deref().and_then(parse_retry_after)
	} else {
		None
	};
	warn!(status, events, retry_after_secs, "collector rejected events");

	DeliveryOutcome::Rejected {
		status,
		body: response.body,
		retry_after_secs,
	}
}

/// Runs `future` on `handle` and waits for it on the calling thread.
pub(crate) fn wait_for<F>(handle: &Handle, future: F, deadline: Duration) -> Result<F::Output, DeliveryError>
where
	F: Future + Send + 'static,
	F::Output: Send + 'static,
{
	let on_worker = match Handle::try_current() {
		Ok(current) => match current.runtime_flavor() {
			RuntimeFlavor::MultiThread => true,
			_ => return Err(DeliveryError::RuntimeUnavailable),
		},
		Err(_) => false,
	};

	let (tx, rx) = mpsc::sync_channel(1);
	handle.spawn(async move {
		let _ = tx.send(future.await);
	});

	let wait = || rx.recv_timeout(deadline);
	let received = if on_worker {
		tokio::task::block_in_place(wait)
	} else {
		wait()
	};

	received.map_err(|e| match e {
		RecvTimeoutError::Timeout => DeliveryError::Timeout,
		RecvTimeoutError::Disconnected => DeliveryError::RuntimeUnavailable,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use async_trait::async_trait;
	use std::sync::Mutex;
	use tracks_crash_core::Severity;

	use crate::error::TransportError;

	const DSN: &str = "https://public@collector.example.com/42";

	struct Recorder {
		status: u16,
		retry_after: Option<String>,
		requests: Mutex<Vec<TransportRequest>>,
	}

	impl Recorder {
		fn new(status: u16) -> Arc<Self> {
			Arc::new(Self {
				status,
				retry_after: None,
				requests: Mutex::new(Vec::new()),
			})
		}
	}

	#[async_trait]
	impl Transport for Recorder {
		async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
			self.requests.lock().unwrap().push(request);
			Ok(TransportResponse {
				status: self.status,
				retry_after: self.retry_after.clone(),
				body: "nope".to_string(),
			})
		}
	}

	#[tokio::test]
	async fn test_delivered_on_2xx() {
		let recorder = Recorder::new(200);
		let client = DeliveryClient::new(recorder.clone());

		let outcome = client
			.send(&[DiagnosticEvent::new(Severity::Error, "boom")], DSN)
			.await
			.unwrap();

		assert_eq!(outcome, DeliveryOutcome::Delivered { status: 200 });
		let requests = recorder.requests.lock().unwrap();
		assert_eq!(requests[0].url, "https://collector.example.com/api/42/envelope/");
		assert!(requests[0].auth.expose().contains("sentry_key=public"));
		assert_eq!(requests[0].content_type, ENVELOPE_CONTENT_TYPE);
	}

	#[tokio::test]
	async fn test_non_success_is_rejected_not_error() {
		let client = DeliveryClient::new(Recorder::new(500));

		let outcome = client
			.send(&[DiagnosticEvent::new(Severity::Error, "boom")], DSN)
			.await
			.unwrap();

		assert!(matches!(
			outcome,
			DeliveryOutcome::Rejected {
				status: 500,
				retry_after_secs: None,
				..
			}
		));
	}

	#[tokio::test]
	async fn test_rate_limit_reads_retry_after() {
		let recorder = Arc::new(Recorder {
			status: 429,
			retry_after: Some("60".to_string()),
			requests: Mutex::new(Vec::new()),
		});
		let client = DeliveryClient::new(recorder);

		let outcome = client
			.send(&[DiagnosticEvent::new(Severity::Error, "boom")], DSN)
			.await
			.unwrap();

		assert!(matches!(
			outcome,
			DeliveryOutcome::Rejected {
				status: 429,
				retry_after_secs: Some(60),
				..
			}
		));
	}

	#[tokio::test]
	async fn test_malformed_dsn_is_auth_error() {
		let recorder = Recorder::new(200);
		let client = DeliveryClient::new(recorder.clone());

		let result = client
			.send(&[DiagnosticEvent::new(Severity::Error, "boom")], "not a dsn")
			.await;

		assert!(matches!(result, Err(DeliveryError::Auth(_))));
		assert!(recorder.requests.lock().unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_empty_batch_sends_nothing() {
		let recorder = Recorder::new(200);
		let client = DeliveryClient::new(recorder.clone());

		assert_eq!(client.send(&[], DSN).await.unwrap(), DeliveryOutcome::Suppressed);
		assert!(recorder.requests.lock().unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_oversized_batch_falls_back_to_single_sends() {
		let recorder = Recorder::new(200);
		let client = DeliveryClient::new(recorder.clone()).with_max_envelope_bytes(Some(16));
		let events: Vec<_> = (0..3)
			.map(|i| DiagnosticEvent::new(Severity::Error, format!("event {i}")))
			.collect();

		let outcome = client.send(&events, DSN).await.unwrap();
		assert_eq!(outcome, DeliveryOutcome::FellBack { events: 3 });

		for _ in 0..100 {
			if recorder.requests.lock().unwrap().len() == 3 {
				break;
			}
			tokio::time::sleep(Duration::from_millis(10)).await;
		}

		let requests = recorder.requests.lock().unwrap();
		assert_eq!(requests.len(), 3);
		for request in requests.iter() {
			let (_, items) = envelope::decode(&request.body).unwrap();
			assert_eq!(items.len(), 1);
		}
	}

	async fn queue_with(logs: &[(&str, usize)]) -> (Arc<UploadQueue>, tempfile::TempDir) {
		let tmp = tempfile::TempDir::new().unwrap();
		let queue = Arc::new(UploadQueue::new(tmp.path().join("logs")));
		for (identifier, size) in logs {
			queue
				.enqueue_bytes(identifier, &vec![b'x'; *size])
				.await
				.unwrap();
		}
		(queue, tmp)
	}

	#[tokio::test]
	async fn test_report_lists_only_logs_that_went_out() {
		let (queue, _tmp) = queue_with(&[("held", 4), ("elsewhere", 4)]).await;
		let recorder = Recorder::new(200);
		let client = DeliveryClient::new(recorder.clone()).with_queue(queue);
		let events = vec![
			DiagnosticEvent::new(Severity::Error, "one").with_log("held"),
			DiagnosticEvent::new(Severity::Error, "two").with_log("missing"),
			DiagnosticEvent::new(Severity::Error, "three").with_log("elsewhere"),
		];
		let attachable = ["held".to_string(), "missing".to_string()];

		let report = client
			.send_with_report(&events, DSN, Some(&attachable))
			.await
			.unwrap();

		assert!(report.outcome.is_delivered());
		assert_eq!(report.uploaded_logs, vec!["held"]);

		let requests = recorder.requests.lock().unwrap();
		let (_, items) = envelope::decode(&requests[0].body).unwrap();
		let filenames: Vec<_> = items
			.iter()
			.filter(|item| item.header["type"] == "attachment")
			.map(|item| item.header["filename"].as_str().unwrap().to_string())
			.collect();
		assert_eq!(filenames, vec!["held.log"]);
	}

	#[tokio::test]
	async fn test_oversized_log_is_dropped_instead_of_the_batch() {
		let (queue, _tmp) = queue_with(&[("small", 16), ("big", 16 * 1024)]).await;
		let recorder = Recorder::new(200);
		let client = DeliveryClient::new(recorder.clone())
			.with_queue(queue)
			.with_max_envelope_bytes(Some(8 * 1024));
		let events = vec![
			DiagnosticEvent::new(Severity::Error, "one").with_log("big"),
			DiagnosticEvent::new(Severity::Error, "two").with_log("small"),
		];

		let report = client.send_with_report(&events, DSN, None).await.unwrap();

		assert_eq!(report.outcome, DeliveryOutcome::Delivered { status: 200 });
		assert_eq!(report.uploaded_logs, vec!["small"]);
		let requests = recorder.requests.lock().unwrap();
		assert_eq!(requests.len(), 1, "no fallback sends");
		let (_, items) = envelope::decode(&requests[0].body).unwrap();
		assert_eq!(items.len(), 3);
	}

	#[tokio::test]
	async fn test_rejected_send_uploads_no_logs() {
		let (queue, _tmp) = queue_with(&[("log", 4)]).await;
		let client = DeliveryClient::new(Recorder::new(503)).with_queue(queue);
		let events = vec![DiagnosticEvent::new(Severity::Error, "boom").with_log("log")];

		let report = client.send_with_report(&events, DSN, None).await.unwrap();

		assert!(matches!(report.outcome, DeliveryOutcome::Rejected { status: 503, .. }));
		assert!(report.uploaded_logs.is_empty());
	}

	#[test]
	fn test_send_blocking_without_runtime_is_unavailable() {
		let client = DeliveryClient::new(Recorder::new(200));
		let result = client.send_blocking(
			vec![DiagnosticEvent::new(Severity::Error, "boom")],
			DSN,
			Duration::from_secs(1),
		);
		assert!(matches!(result, Err(DeliveryError::RuntimeUnavailable)));
	}

	#[test]
	fn test_send_blocking_waits_on_runtime() {
		let runtime = tokio::runtime::Builder::new_multi_thread()
			.worker_threads(1)
			.enable_all()
			.build()
			.unwrap();
		let recorder = Recorder::new(202);
		let client = DeliveryClient::new(recorder.clone()).with_runtime(runtime.handle().clone());

		let outcome = client
			.send_blocking(
				vec![DiagnosticEvent::new(Severity::Error, "boom")],
				DSN,
				Duration::from_secs(5),
			)
			.unwrap();

		assert_eq!(outcome, DeliveryOutcome::Delivered { status: 202 });
		assert_eq!(recorder.requests.lock().unwrap().len(), 1);
	}

	#[test]
	fn test_send_sync_uses_blocking_transport() {
		let recorder = Recorder::new(200);
		let client = DeliveryClient::new(recorder.clone());

		let outcome = client
			.send_sync(&DiagnosticEvent::new(Severity::Fatal, "panic"), DSN)
			.unwrap();

		assert!(outcome.is_delivered());
		assert_eq!(recorder.requests.lock().unwrap().len(), 1);
	}
}
