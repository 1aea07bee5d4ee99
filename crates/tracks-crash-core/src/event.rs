// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Diagnostic event types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::context::UserContext;
use crate::error::CrashError;
use crate::value::ExtraMap;

/// Unique identifier for an event, serialized as 32 lowercase hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventId(pub Uuid);

impl EventId {
	pub fn new() -> Self {
		Self(Uuid::new_v4())
	}
}

impl Default for EventId {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Display for EventId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0.simple())
	}
}

impl FromStr for EventId {
	type Err = uuid::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Ok(Self(Uuid::parse_str(s)?))
	}
}

impl Serialize for EventId {
	fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.collect_str(self)
	}
}

impl<'de> Deserialize<'de> for EventId {
	fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let s = String::deserialize(deserializer)?;
		s.parse().map_err(serde::de::Error::custom)
	}
}

/// Severity of an event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
	Fatal,
	#[default]
	Error,
	Warning,
	Info,
	Debug,
}

impl fmt::Display for Severity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Fatal => write!(f, "fatal"),
			Self::Error => write!(f, "error"),
			Self::Warning => write!(f, "warning"),
			Self::Info => write!(f, "info"),
			Self::Debug => write!(f, "debug"),
		}
	}
}

impl FromStr for Severity {
	type Err = CrashError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"fatal" => Ok(Self::Fatal),
			"error" => Ok(Self::Error),
			"warning" => Ok(Self::Warning),
			"info" => Ok(Self::Info),
			"debug" => Ok(Self::Debug),
			_ => Err(CrashError::InvalidSeverity(s.to_string())),
		}
	}
}

/// Sentry's `{"values": [...]}` wrapper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Values<T> {
	pub values: Vec<T>,
}

impl<T> Values<T> {
	pub fn new() -> Self {
		Self { values: Vec::new() }
	}

	pub fn is_empty(&self) -> bool {
		self.values.is_empty()
	}
}

impl<T> Default for Values<T> {
	fn default() -> Self {
		Self::new()
	}
}

impl<T> From<Vec<T>> for Values<T> {
	fn from(values: Vec<T>) -> Self {
		Self { values }
	}
}

/// Stack trace containing multiple frames, outermost call last.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stacktrace {
	pub frames: Vec<Frame>,
}

impl Stacktrace {
	pub fn is_empty(&self) -> bool {
		self.frames.is_empty()
	}
}

/// A single stack frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub function: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub module: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub filename: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub abs_path: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub lineno: Option<u32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub colno: Option<u32>,
	/// User code vs dependency
	#[serde(default)]
	pub in_app: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub instruction_addr: Option<String>,
}

/// One exception in a causal chain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExceptionInfo {
	#[serde(rename = "type")]
	pub ty: String,
	pub value: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub stacktrace: Option<Stacktrace>,
}

/// Execution state of one thread at capture time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreadSnapshot {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	#[serde(default)]
	pub crashed: bool,
	#[serde(default)]
	pub current: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub stacktrace: Option<Stacktrace>,
}

impl ThreadSnapshot {
	/// Snapshot of the calling thread.
	pub fn current(stacktrace: Stacktrace, crashed: bool) -> Self {
		let thread = std::thread::current();
		Self {
			id: Some(format!("{:?}", thread.id())),
			name: thread.name().map(str::to_string),
			crashed,
			current: true,
			stacktrace: (!stacktrace.is_empty()).then_some(stacktrace),
		}
	}
}

/// SDK identification embedded in every event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SdkInfo {
	pub name: String,
	pub version: String,
}

/// The description of an error at the time it was reported.
///
/// Captures the type name, the displayed message and the messages of its
/// `source()` chain, outermost first.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorReport {
	pub type_name: String,
	pub value: String,
	pub causes: Vec<String>,
}

impl ErrorReport {
	pub fn new<E>(error: &E) -> Self
	where
		E: std::error::Error + ?Sized,
	{
		let mut causes = Vec::new();
		let mut source = error.source();
		while let Some(cause) = source {
			causes.push(cause.to_string());
			source = cause.source();
		}

		Self {
			type_name: std::any::type_name::<E>().to_string(),
			value: error.to_string(),
			causes,
		}
	}

	pub fn with_type_name(mut self, type_name: impl Into<String>) -> Self {
		self.type_name = type_name.into();
		self
	}

	/// Exception values ordered innermost cause first, as the collector expects.
	pub fn exceptions(&self, stacktrace: Option<Stacktrace>) -> Vec<ExceptionInfo> {
		let mut values: Vec<ExceptionInfo> = self
			.causes
			.iter()
			.rev()
			.map(|cause| ExceptionInfo {
				ty: "Error".to_string(),
				value: cause.clone(),
				stacktrace: None,
			})
			.collect();

		values.push(ExceptionInfo {
			ty: self.type_name.clone(),
			value: self.value.clone(),
			stacktrace,
		});
		values
	}
}

/// A crash, error or message destined for the remote collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticEvent {
	pub event_id: EventId,
	pub timestamp: DateTime<Utc>,
	pub level: Severity,
	#[serde(default)]
	pub message: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub platform: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub release: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub environment: Option<String>,
	#[serde(default)]
	pub tags: BTreeMap<String, String>,
	#[serde(default)]
	pub extra: ExtraMap,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub user: Option<UserContext>,
	#[serde(default, skip_serializing_if = "Values::is_empty")]
	pub exception: Values<ExceptionInfo>,
	#[serde(default, skip_serializing_if = "Values::is_empty")]
	pub threads: Values<ThreadSnapshot>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub sdk: Option<SdkInfo>,
	/// Back-reference to a queued log file, resolved during enrichment.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub associated_log_identifier: Option<String>,
}

impl DiagnosticEvent {
	pub fn new(level: Severity, message: impl Into<String>) -> Self {
		Self {
			event_id: EventId::new(),
			timestamp: Utc::now(),
			level,
			message: message.into(),
			platform: Some("native".to_string()),
			release: None,
			environment: None,
			tags: BTreeMap::new(),
			extra: ExtraMap::new(),
			user: None,
			exception: Values::new(),
			threads: Values::new(),
			sdk: None,
			associated_log_identifier: None,
		}
	}

	/// Event describing an error and its cause chain.
	pub fn from_report(report: &ErrorReport, level: Severity, stacktrace: Option<Stacktrace>) -> Self {
		let mut event = Self::new(level, report.value.clone());
		event.exception = report.exceptions(stacktrace).into();
		event
	}

	pub fn with_extra(mut self, extra: ExtraMap) -> Self {
		self.extra.extend(extra);
		self
	}

	pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.tags.insert(key.into(), value.into());
		self
	}

	pub fn with_log(mut self, identifier: impl Into<String>) -> Self {
		self.associated_log_identifier = Some(identifier.into());
		self
	}

	pub fn to_json(&self) -> crate::Result<Vec<u8>> {
		Ok(serde_json::to_vec(self)?)
	}

	pub fn from_json(bytes: &[u8]) -> crate::Result<Self> {
		Ok(serde_json::from_slice(bytes)?)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::value::ExtraValue;
	use proptest::prelude::*;
	use std::io;

	#[derive(Debug)]
	struct UploadFailed {
		source: io::Error,
	}

	impl fmt::Display for UploadFailed {
		fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
			write!(f, "media upload failed")
		}
	}

	impl std::error::Error for UploadFailed {
		fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
			Some(&self.source)
		}
	}

	#[test]
	fn event_id_is_simple_hex() {
		let id = EventId::new();
		let s = id.to_string();
		assert_eq!(s.len(), 32);
		assert!(s.chars().all(|c| c.is_ascii_hexdigit()));
		assert_eq!(s.parse::<EventId>().unwrap(), id);
	}

	#[test]
	fn severity_defaults_to_error() {
		assert_eq!(Severity::default(), Severity::Error);
		assert_eq!(Severity::default().to_string(), "error");
	}

	#[test]
	fn report_captures_type_and_cause_chain() {
		let error = UploadFailed {
			source: io::Error::new(io::ErrorKind::TimedOut, "socket timed out"),
		};
		let report = ErrorReport::new(&error);

		assert!(report.type_name.ends_with("UploadFailed"));
		assert_eq!(report.value, "media upload failed");
		assert_eq!(report.causes, vec!["socket timed out".to_string()]);

		let exceptions = report.exceptions(None);
		assert_eq!(exceptions.len(), 2);
		assert_eq!(exceptions[0].value, "socket timed out");
		assert_eq!(exceptions[1].value, "media upload failed");
	}

	#[test]
	fn from_report_sets_message_and_exception() {
		let report = ErrorReport::new(&io::Error::new(io::ErrorKind::NotFound, "gone"))
			.with_type_name("NSURLErrorDomain");
		let event = DiagnosticEvent::from_report(&report, Severity::Warning, None);

		assert_eq!(event.message, "gone");
		assert_eq!(event.level, Severity::Warning);
		assert_eq!(event.exception.values[0].ty, "NSURLErrorDomain");
	}

	#[test]
	fn json_roundtrip_preserves_reported_fields() {
		let mut user = UserContext::with_id("42");
		user.email = Some("user@example.com".into());
		user.data.insert("sites".into(), ExtraValue::Int(3));

		let mut event = DiagnosticEvent::new(Severity::Fatal, "database locked")
			.with_tag("locale", "en")
			.with_tag("app.state", "background")
			.with_log("log-1");
		event.user = Some(user);
		event.extra.insert("attempt".into(), ExtraValue::Int(2));

		let decoded = DiagnosticEvent::from_json(&event.to_json().unwrap()).unwrap();
		assert_eq!(decoded.level, event.level);
		assert_eq!(decoded.message, event.message);
		assert_eq!(decoded.tags, event.tags);
		assert_eq!(decoded.user, event.user);
		assert_eq!(decoded.associated_log_identifier.as_deref(), Some("log-1"));
	}

	#[test]
	fn empty_collections_are_omitted_from_json() {
		let value = serde_json::to_value(DiagnosticEvent::new(Severity::Info, "hi")).unwrap();
		assert!(value.get("exception").is_none());
		assert!(value.get("threads").is_none());
		assert!(value.get("user").is_none());
		assert_eq!(value["level"], "info");
	}

	proptest! {
		#[test]
		fn severity_roundtrip(level in prop_oneof![
			Just(Severity::Fatal),
			Just(Severity::Error),
			Just(Severity::Warning),
			Just(Severity::Info),
			Just(Severity::Debug),
		]) {
			let parsed: Severity = level.to_string().parse().unwrap();
			prop_assert_eq!(level, parsed);
		}
	}
}
