// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Crash logging client: the host-facing entry point.

use std::error::Error as StdError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, RwLock};
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::{debug, info, warn};
use tracks_common_config::env_flag;
use tracks_crash_core::{
	CrashError, DiagnosticEvent, Dsn, ErrorReport, ExceptionInfo, ExtraMap, Severity, Stacktrace,
	ThreadSnapshot, UserContext,
};
use tracks_event_logging::{RetentionPolicy, UploadQueue};

use crate::backtrace::capture_stacktrace;
use crate::delivery::{wait_for, DeliveryClient, DeliveryOutcome};
use crate::enricher::{Enricher, Scope};
use crate::error::{CrashLoggingError, DeliveryError, Result};
use crate::gatekeeper::should_send;
use crate::panic_hook::{self, PanicReporter};
use crate::provider::{ContextProvider, CrashLoggingDataProvider, SystemContextProvider};
use crate::transport::{HttpTransport, Transport};

/// Environment flag that enables reporting from debug builds.
pub const FORCE_CRASH_LOGGING_ENV: &str = "TRACKS_FORCE_CRASH_LOGGING";

/// Envelope size the collector accepts.
pub const DEFAULT_MAX_ENVELOPE_BYTES: usize = 20 * 1024 * 1024;

const CRASH_MESSAGE: &str = "deliberate crash requested through CrashLogging::crash";
const PENDING_LOG_MESSAGE: &str = "Pending log upload";

/// HTTP settings for the delivery client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
	/// Timeout for HTTP requests.
	pub request_timeout: Duration,
	/// Batches encoding larger than this fall back to single-event sends.
	pub max_envelope_bytes: Option<usize>,
}

impl Default for ClientConfig {
	fn default() -> Self {
		Self {
			request_timeout: Duration::from_secs(30),
			max_envelope_bytes: Some(DEFAULT_MAX_ENVELOPE_BYTES),
		}
	}
}

/// Settings for a [`CrashLogging`] instance.
#[derive(Debug, Clone)]
pub struct CrashLoggingConfig {
	pub client: ClientConfig,
	/// Report from debug builds too.
	pub force_crash_logging: bool,
	/// Applied to the upload queue at start.
	pub retention: RetentionPolicy,
	pub install_panic_hook: bool,
}

impl CrashLoggingConfig {
	/// Reads [`FORCE_CRASH_LOGGING_ENV`].
	pub fn force_crash_logging_from_env() -> bool {
		env_flag(FORCE_CRASH_LOGGING_ENV)
	}
}

impl Default for CrashLoggingConfig {
	fn default() -> Self {
		Self {
			client: ClientConfig::default(),
			force_crash_logging: Self::force_crash_logging_from_env(),
			retention: RetentionPolicy::default(),
			install_panic_hook: true,
		}
	}
}

/// Builder for constructing a [`CrashLogging`].
pub struct CrashLoggingBuilder {
	data_provider: Option<Arc<dyn CrashLoggingDataProvider>>,
	context_provider: Option<Arc<dyn ContextProvider>>,
	queue: Option<Arc<UploadQueue>>,
	transport: Option<Arc<dyn Transport>>,
	runtime: Option<Handle>,
	config: CrashLoggingConfig,
}

impl CrashLoggingBuilder {
	pub fn new() -> Self {
		Self {
			data_provider: None,
			context_provider: None,
			queue: None,
			transport: None,
			runtime: None,
			config: CrashLoggingConfig::default(),
		}
	}

	/// Source of DSN, consent and identity. Without one nothing is sent.
	pub fn data_provider(mut self, provider: Arc<dyn CrashLoggingDataProvider>) -> Self {
		self.data_provider = Some(provider);
		self
	}

	/// Locale and lifecycle source. Defaults to [`SystemContextProvider`].
	pub fn context_provider(mut self, provider: Arc<dyn ContextProvider>) -> Self {
		self.context_provider = Some(provider);
		self
	}

	/// Queue whose logs are attached to outgoing events.
	pub fn queue(mut self, queue: Arc<UploadQueue>) -> Self {
		self.queue = Some(queue);
		self
	}

	/// Replaces the default `reqwest` transport.
	pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
		self.transport = Some(transport);
		self
	}

	/// Runtime for uploads. Defaults to the runtime `start()` is called on.
	pub fn runtime(mut self, handle: Handle) -> Self {
		self.runtime = Some(handle);
		self
	}

	pub fn request_timeout(mut self, timeout: Duration) -> Self {
		self.config.client.request_timeout = timeout;
		self
	}

	pub fn max_envelope_bytes(mut self, max: Option<usize>) -> Self {
		self.config.client.max_envelope_bytes = max;
		self
	}

	pub fn force_crash_logging(mut self, force: bool) -> Self {
		self.config.force_crash_logging = force;
		self
	}

	pub fn retention(mut self, policy: RetentionPolicy) -> Self {
		self.config.retention = policy;
		self
	}

	pub fn install_panic_hook(mut self, install: bool) -> Self {
		self.config.install_panic_hook = install;
		self
	}

	pub fn config(mut self, config: CrashLoggingConfig) -> Self {
		self.config = config;
		self
	}

	pub fn build(self) -> Result<CrashLogging> {
		let transport = match self.transport {
			Some(transport) => transport,
			None => Arc::new(
				HttpTransport::new(self.config.client.request_timeout).map_err(DeliveryError::from)?,
			),
		};

		let mut delivery = DeliveryClient::new(transport)
			.with_max_envelope_bytes(self.config.client.max_envelope_bytes);
		if let Some(queue) = &self.queue {
			delivery = delivery.with_queue(Arc::clone(queue));
		}

		let context_provider = self
			.context_provider
			.unwrap_or_else(|| Arc::new(SystemContextProvider::new()));

		let runtime = OnceLock::new();
		if let Some(handle) = self.runtime {
			let _ = runtime.set(handle);
		}

		let inner = Arc::new(CrashLoggingInner {
			data_provider: self.data_provider,
			enricher: Enricher::new(context_provider, self.queue.clone()),
			delivery,
			queue: self.queue,
			config: self.config,
			state: Mutex::new(Lifecycle::NotStarted),
			started: AtomicBool::new(false),
			runtime,
			user: RwLock::new(None),
		});

		Ok(CrashLogging { inner })
	}
}

impl Default for CrashLoggingBuilder {
	fn default() -> Self {
		Self::new()
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
	NotStarted,
	Started,
}

struct CrashLoggingInner {
	data_provider: Option<Arc<dyn CrashLoggingDataProvider>>,
	enricher: Enricher,
	delivery: DeliveryClient,
	queue: Option<Arc<UploadQueue>>,
	config: CrashLoggingConfig,
	state: Mutex<Lifecycle>,
	started: AtomicBool,
	runtime: OnceLock<Handle>,
	user: RwLock<Option<UserContext>>,
}

impl CrashLoggingInner {
	fn allowed(&self) -> bool {
		should_send(self.data_provider.as_deref(), self.config.force_crash_logging)
	}

	fn scope(&self) -> Scope {
		let user = self
			.user
			.read()
			.unwrap_or_else(|poisoned| poisoned.into_inner())
			.clone();

		match &self.data_provider {
			Some(provider) => Scope {
				user,
				release: provider.release(),
				build_type: provider.build_type(),
			},
			None => Scope {
				user,
				..Scope::default()
			},
		}
	}

	fn dsn(&self) -> Result<String> {
		self.data_provider
			.as_ref()
			.and_then(|provider| provider.sentry_dsn())
			.map(|dsn| dsn.expose().clone())
			.ok_or_else(|| DeliveryError::Auth("no DSN configured".to_string()).into())
	}

	fn refresh_user(&self) {
		let user = self
			.data_provider
			.as_ref()
			.and_then(|provider| provider.current_user());
		*self
			.user
			.write()
			.unwrap_or_else(|poisoned| poisoned.into_inner()) = user;
	}

	/// Gatekeeper, then delivery.
	async fn submit(&self, events: Vec<DiagnosticEvent>) -> Result<DeliveryOutcome> {
		if !self.allowed() {
			return Ok(DeliveryOutcome::Suppressed);
		}
		self.deliver(events).await
	}

	/// Enriches and sends `events`, then settles any logs they carried.
	async fn deliver(&self, mut events: Vec<DiagnosticEvent>) -> Result<DeliveryOutcome> {
		let scope = self.scope();
		let mut claimed = Vec::new();
		for event in &mut events {
			if let Some(log) = self.enricher.enrich(event, &scope).await {
				claimed.push(log.identifier);
			}
		}

		let result = match self.dsn() {
			Ok(dsn) => self
				.delivery
				.send_with_report(&events, &dsn, Some(claimed.as_slice()))
				.await
				.map_err(CrashLoggingError::from),
			Err(e) => Err(e),
		};

		let uploaded: &[String] = match &result {
			Ok(report) => report.uploaded_logs.as_slice(),
			Err(_) => &[],
		};
		self.settle_logs(&claimed, uploaded).await;
		result.map(|report| report.outcome)
	}

	/// Logs the collector received leave the queue; every other claimed log
	/// is released for the next attempt.
	async fn settle_logs(&self, claimed: &[String], uploaded: &[String]) {
		let Some(queue) = &self.queue else {
			return;
		};

		for identifier in claimed {
			if !uploaded.contains(identifier) {
				queue.release(identifier);
				continue;
			}
			if let Err(e) = queue.remove_identifier(identifier).await {
				warn!(identifier, error = %e, "failed to remove uploaded log");
				queue.release(identifier);
			}
		}
	}

	fn error_event<E>(&self, error: &E, context: ExtraMap, severity: Severity) -> DiagnosticEvent
	where
		E: StdError + ?Sized,
	{
		let report = ErrorReport::new(error);
		let event = DiagnosticEvent::from_report(&report, severity, Some(capture_stacktrace()))
			.with_extra(context);

		if let Some(provider) = &self.data_provider {
			provider.did_log_error(&event);
		}
		event
	}

	fn message_event(&self, message: String, context: ExtraMap, severity: Severity) -> DiagnosticEvent {
		let mut event = DiagnosticEvent::new(severity, message).with_extra(context);
		event.threads = vec![ThreadSnapshot::current(capture_stacktrace(), false)].into();

		if let Some(provider) = &self.data_provider {
			provider.did_log_message(&event);
		}
		event
	}
}

impl PanicReporter for CrashLoggingInner {
	fn report_panic(&self, message: &str, location: Option<&str>, stacktrace: Stacktrace) {
		if !self.started.load(Ordering::SeqCst) || !self.allowed() {
			return;
		}
		let Ok(dsn) = self.dsn() else {
			return;
		};

		let mut event = DiagnosticEvent::new(Severity::Fatal, message);
		event.exception = vec![ExceptionInfo {
			ty: "panic".to_string(),
			value: message.to_string(),
			stacktrace: (!stacktrace.is_empty()).then(|| stacktrace.clone()),
		}]
		.into();
		event.threads = vec![ThreadSnapshot::current(stacktrace, true)].into();
		if let Some(location) = location {
			event.extra.insert("panic.location".to_string(), location.into());
		}
		self.enricher.apply_metadata(&mut event, &self.scope());

		// We're panicking: no runtime, no tracing subscriber guarantees.
		match self.delivery.send_sync(&event, &dsn) {
			Ok(outcome) if outcome.is_delivered() => {}
			Ok(outcome) => eprintln!("Crash report was not accepted: {outcome:?}"),
			Err(e) => eprintln!("Failed to report panic to crash logging: {e}"),
		}
	}
}

/// Reports errors, messages and panics to a Sentry-compatible collector.
///
/// Owned by the host application; clones share state. Nothing is sent
/// until [`start`](Self::start) succeeds.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use tracks_crash::{CrashLogging, EnvDataProvider, ExtraMap, Severity, UploadQueue};
///
/// let crash_logging = CrashLogging::builder()
///     .data_provider(Arc::new(EnvDataProvider::new()))
///     .queue(Arc::new(UploadQueue::from_xdg()?))
///     .build()?;
/// crash_logging.start()?;
///
/// if let Err(e) = sync_posts().await {
///     crash_logging.log_error(&e, ExtraMap::new(), Severity::Error);
/// }
/// ```
#[derive(Clone)]
pub struct CrashLogging {
	inner: Arc<CrashLoggingInner>,
}

impl CrashLogging {
	pub fn builder() -> CrashLoggingBuilder {
		CrashLoggingBuilder::new()
	}

	/// Validates the DSN, binds a runtime, caches the current user,
	/// installs the panic hook and prunes the upload queue.
	///
	/// Runs at most once per instance; later calls return `Ok(())`. On error
	/// the instance stays not started and `start` may be retried.
	pub fn start(&self) -> Result<()> {
		let inner = &self.inner;
		let mut state = inner
			.state
			.lock()
			.unwrap_or_else(|poisoned| poisoned.into_inner());
		if *state == Lifecycle::Started {
			debug!("crash logging already started");
			return Ok(());
		}

		let provider = inner
			.data_provider
			.as_ref()
			.ok_or_else(|| CrashLoggingError::InvalidDsn("no data provider configured".to_string()))?;
		let raw_dsn = provider
			.sentry_dsn()
			.ok_or_else(|| CrashLoggingError::InvalidDsn("no DSN configured".to_string()))?;
		let dsn: Dsn = raw_dsn
			.expose()
			.parse()
			.map_err(|e: CrashError| CrashLoggingError::InvalidDsn(e.to_string()))?;

		let handle = match inner.runtime.get() {
			Some(handle) => handle.clone(),
			None => Handle::try_current().map_err(|_| CrashLoggingError::MissingRuntime)?,
		};
		let _ = inner.runtime.set(handle.clone());

		inner.refresh_user();

		if inner.config.install_panic_hook {
			let reporter: Arc<dyn PanicReporter> = self.inner.clone();
			panic_hook::register(&reporter);
			debug!("panic hook installed");
		}

		if let Some(queue) = &inner.queue {
			let queue = Arc::clone(queue);
			let policy = inner.config.retention.clone();
			handle.spawn(async move {
				if let Err(e) = queue.ensure_storage_exists().await {
					warn!(error = %e, "failed to create log queue directory");
					return;
				}
				if let Err(e) = queue.prune(&policy).await {
					warn!(error = %e, "failed to apply log retention");
				}
			});
		}

		*state = Lifecycle::Started;
		inner.started.store(true, Ordering::SeqCst);

		info!(
			dsn = %dsn,
			build_type = %provider.build_type(),
			force_crash_logging = inner.config.force_crash_logging,
			"crash logging started"
		);
		Ok(())
	}

	pub fn is_started(&self) -> bool {
		self.inner.started.load(Ordering::SeqCst)
	}

	pub fn queue(&self) -> Option<&Arc<UploadQueue>> {
		self.inner.queue.as_ref()
	}

	/// Reports `error` in the background.
	pub fn log_error<E>(&self, error: &E, context: ExtraMap, severity: Severity)
	where
		E: StdError + ?Sized,
	{
		let Some(handle) = self.started_handle() else {
			warn!(error = %error, "crash logging not started, dropping error");
			return;
		};

		let event = self.inner.error_event(error, context, severity);
		self.dispatch(&handle, event);
	}

	/// Reports a free-form message in the background.
	pub fn log_message(&self, message: impl Into<String>, context: ExtraMap, severity: Severity) {
		let message = message.into();
		let Some(handle) = self.started_handle() else {
			warn!(message, "crash logging not started, dropping message");
			return;
		};

		let event = self.inner.message_event(message, context, severity);
		self.dispatch(&handle, event);
	}

	/// Sends one event per error as a single batch and calls `callback`
	/// exactly once with the result.
	///
	/// When the batch cannot be encoded the events are sent individually on
	/// a best-effort basis and `callback` is not called.
	pub fn log_errors_immediately<'a, E, I, F>(
		&self,
		errors: I,
		context: ExtraMap,
		severity: Severity,
		callback: F,
	) where
		E: StdError + ?Sized + 'a,
		I: IntoIterator<Item = &'a E>,
		F: FnOnce(Result<()>) + Send + 'static,
	{
		let Some(handle) = self.started_handle() else {
			callback(Err(CrashLoggingError::NotStarted));
			return;
		};

		let events = self.error_events(errors, &context, severity);
		let inner = Arc::clone(&self.inner);
		handle.spawn(async move {
			match into_result(inner.submit(events).await) {
				Some(result) => callback(result),
				None => debug!("batch degraded to best-effort sends, callback not invoked"),
			}
		});
	}

	/// Async form of [`log_errors_immediately`](Self::log_errors_immediately)
	/// returning the raw outcome.
	pub async fn send_errors_immediately<'a, E, I>(
		&self,
		errors: I,
		context: ExtraMap,
		severity: Severity,
	) -> Result<DeliveryOutcome>
	where
		E: StdError + ?Sized + 'a,
		I: IntoIterator<Item = &'a E>,
	{
		self.ensure_started()?;
		let events = self.error_events(errors, &context, severity);
		self.inner.submit(events).await
	}

	/// Reports `error` and blocks until delivery settles or `timeout` passes.
	///
	/// Must not be called from a current-thread runtime.
	pub fn log_error_and_wait<E>(
		&self,
		error: &E,
		context: ExtraMap,
		severity: Severity,
		timeout: Duration,
	) -> Result<()>
	where
		E: StdError + ?Sized,
	{
		let handle = self.started_handle().ok_or(CrashLoggingError::NotStarted)?;

		let event = self.inner.error_event(error, context, severity);
		let inner = Arc::clone(&self.inner);
		let outcome = wait_for(&handle, async move { inner.submit(vec![event]).await }, timeout)?;

		into_result(outcome).unwrap_or(Ok(()))
	}

	/// Terminates the process. The panic hook reports a fatal event first.
	///
	/// The panic is caught before it can unwind into a runtime or a
	/// `JoinHandle`, then the process aborts, whichever thread this runs on.
	pub fn crash(&self) -> ! {
		let _ = std::panic::catch_unwind(|| panic!("{CRASH_MESSAGE}"));
		std::process::abort()
	}

	/// Re-reads the current user, e.g. after login or logout.
	pub fn refresh_user_context(&self) {
		self.inner.refresh_user();
		debug!("refreshed user context");
	}

	/// Uploads queued logs oldest first, each with an informational carrier
	/// event, stopping at the first one that is not accepted.
	///
	/// Returns how many logs were uploaded and removed.
	pub async fn retry_pending_logs(&self) -> Result<usize> {
		self.ensure_started()?;
		let inner = &self.inner;
		let Some(queue) = &inner.queue else {
			return Ok(0);
		};
		if !inner.allowed() {
			return Ok(0);
		}

		let dsn = inner.dsn()?;
		let scope = inner.scope();
		let mut uploaded = 0;

		for pending in queue.pending().await? {
			let Some(log) = queue.claim(&pending.identifier).await? else {
				continue;
			};

			let mut event = DiagnosticEvent::new(Severity::Info, PENDING_LOG_MESSAGE)
				.with_log(log.identifier.clone());
			inner.enricher.apply_metadata(&mut event, &scope);

			let result = inner
				.delivery
				.send_with_report(
					std::slice::from_ref(&event),
					&dsn,
					Some(std::slice::from_ref(&log.identifier)),
				)
				.await
				.map_err(CrashLoggingError::from);

			match result {
				Ok(report) if report.uploaded_logs.contains(&log.identifier) => {
					queue.remove(&log).await?;
					uploaded += 1;
				}
				Ok(report) if report.outcome.is_delivered() => {
					// Accepted without the log, e.g. too large to fit.
					queue.release(&log.identifier);
					warn!(identifier = %log.identifier, "pending log was not uploaded, keeping it");
				}
				other => {
					queue.release(&log.identifier);
					info!(identifier = %log.identifier, uploaded, "stopping pending log upload");
					return match into_result(other.map(|report| report.outcome)) {
						Some(Err(e)) => Err(e),
						_ => Ok(uploaded),
					};
				}
			}
		}

		info!(uploaded, "uploaded pending logs");
		Ok(uploaded)
	}

	fn ensure_started(&self) -> Result<()> {
		if self.is_started() {
			Ok(())
		} else {
			Err(CrashLoggingError::NotStarted)
		}
	}

	fn started_handle(&self) -> Option<Handle> {
		if !self.is_started() {
			return None;
		}
		self.inner.runtime.get().cloned()
	}

	fn error_events<'a, E, I>(&self, errors: I, context: &ExtraMap, severity: Severity) -> Vec<DiagnosticEvent>
	where
		E: StdError + ?Sized + 'a,
		I: IntoIterator<Item = &'a E>,
	{
		errors
			.into_iter()
			.map(|error| self.inner.error_event(error, context.clone(), severity))
			.collect()
	}

	fn dispatch(&self, handle: &Handle, event: DiagnosticEvent) {
		if !self.inner.allowed() {
			return;
		}

		let inner = Arc::clone(&self.inner);
		let event_id = event.event_id;
		handle.spawn(async move {
			match inner.deliver(vec![event]).await {
				Ok(outcome) => debug!(%event_id, ?outcome, "event delivery settled"),
				Err(e) => warn!(%event_id, error = %e, "event delivery failed"),
			}
		});
	}
}

/// Collapses an outcome into the callback result. `None` for batches that
/// fell back to best-effort sends.
fn into_result(outcome: Result<DeliveryOutcome>) -> Option<Result<()>> {
	match outcome {
		Ok(DeliveryOutcome::Delivered { .. }) | Ok(DeliveryOutcome::Suppressed) => Some(Ok(())),
		Ok(DeliveryOutcome::FellBack { .. }) => None,
		Ok(DeliveryOutcome::Rejected {
			status: 429,
			retry_after_secs,
			..
		}) => Some(Err(CrashLoggingError::RateLimited { retry_after_secs })),
		Ok(DeliveryOutcome::Rejected { status, body, .. }) => Some(Err(CrashLoggingError::ServerError {
			status,
			message: body,
		})),
		Err(e) => Some(Err(e)),
	}
}
