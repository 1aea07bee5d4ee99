// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Envelope encoding.
//!
//! An envelope is a JSON header line followed by items, each an item header
//! line and a payload whose length the header declares:
//!
//! ```text
//! {"sent_at":"2025-01-01T00:00:00Z","sdk":{"name":"tracks-rust","version":"0.1.0"}}
//! {"type":"event","length":123}
//! {...event json...}
//! {"type":"attachment","length":5,"filename":"abc.log","content_type":"text/plain","event_id":"..."}
//! hello
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracks_common_http::{CLIENT_NAME, CLIENT_VERSION};
use tracks_crash_core::{DiagnosticEvent, EventId, SdkInfo};

pub const ENVELOPE_CONTENT_TYPE: &str = "application/x-sentry-envelope";

const ATTACHMENT_CONTENT_TYPE: &str = "text/plain";

#[derive(Debug, Error)]
pub enum EnvelopeError {
	#[error("serialization failed: {0}")]
	Serialization(#[from] serde_json::Error),

	#[error("envelope is {size} bytes, limit is {limit}")]
	TooLarge { size: usize, limit: usize },
}

/// A log attached to one of the envelope's events.
#[derive(Debug, Clone)]
pub struct Attachment {
	pub event_id: EventId,
	pub filename: String,
	pub bytes: Vec<u8>,
}

#[derive(Serialize)]
struct EnvelopeHeader<'a> {
	#[serde(skip_serializing_if = "Option::is_none")]
	event_id: Option<&'a EventId>,
	sent_at: DateTime<Utc>,
	sdk: SdkInfo,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ItemHeader<'a> {
	Event {
		length: usize,
	},
	Attachment {
		length: usize,
		filename: &'a str,
		content_type: &'static str,
		event_id: &'a EventId,
	},
}

/// Envelope under construction.
#[derive(Debug, Default)]
pub struct EnvelopeBuilder {
	items: Vec<u8>,
	first_event: Option<EventId>,
	events: usize,
}

impl EnvelopeBuilder {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn add_event(&mut self, event: &DiagnosticEvent) -> Result<&mut Self, EnvelopeError> {
		let payload = serde_json::to_vec(event)?;
		self.push_item(
			&ItemHeader::Event {
				length: payload.len(),
			},
			&payload,
		)?;

		self.events += 1;
		if self.first_event.is_none() {
			self.first_event = Some(event.event_id);
		}
		Ok(self)
	}

	pub fn add_attachment(&mut self, attachment: &Attachment) -> Result<&mut Self, EnvelopeError> {
		self.push_item(
			&ItemHeader::Attachment {
				length: attachment.bytes.len(),
				filename: &attachment.filename,
				content_type: ATTACHMENT_CONTENT_TYPE,
				event_id: &attachment.event_id,
			},
			&attachment.bytes,
		)?;
		Ok(self)
	}

	/// Finishes the envelope, failing when it exceeds `max_bytes`.
	pub fn finish(self, max_bytes: Option<usize>) -> Result<Vec<u8>, EnvelopeError> {
		// The header only names an event when the envelope carries exactly one.
		let header = EnvelopeHeader {
			event_id: self.first_event.as_ref().filter(|_| self.events == 1),
			sent_at: Utc::now(),
			sdk: SdkInfo {
				name: CLIENT_NAME.to_string(),
				version: CLIENT_VERSION.to_string(),
			},
		};

		let mut body = serde_json::to_vec(&header)?;
		body.push(b'\n');
		body.extend_from_slice(&self.items);

		if let Some(limit) = max_bytes {
			if body.len() > limit {
				return Err(EnvelopeError::TooLarge {
					size: body.len(),
					limit,
				});
			}
		}
		Ok(body)
	}

	fn push_item(&mut self, header: &ItemHeader<'_>, payload: &[u8]) -> Result<(), EnvelopeError> {
		serde_json::to_writer(&mut self.items, header)?;
		self.items.push(b'\n');
		self.items.extend_from_slice(payload);
		self.items.push(b'\n');
		Ok(())
	}
}

/// Encodes `events` and their attachments into one envelope.
pub fn encode(
	events: &[DiagnosticEvent],
	attachments: &[Attachment],
	max_bytes: Option<usize>,
) -> Result<Vec<u8>, EnvelopeError> {
	let mut builder = EnvelopeBuilder::new();
	for event in events {
		builder.add_event(event)?;
		for attachment in attachments.iter().filter(|a| a.event_id == event.event_id) {
			builder.add_attachment(attachment)?;
		}
	}
	builder.finish(max_bytes)
}

/// A decoded item, for tests and diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedItem {
	pub header: serde_json::Value,
	pub payload: Vec<u8>,
}

/// Splits an envelope back into its header and items.
pub fn decode(body: &[u8]) -> Result<(serde_json::Value, Vec<DecodedItem>), EnvelopeError> {
	let (header_line, mut rest) = split_line(body);
	let header = serde_json::from_slice(header_line)?;

	let mut items = Vec::new();
	while !rest.is_empty() {
		let (item_line, after) = split_line(rest);
		if item_line.is_empty() {
			rest = after;
			continue;
		}
		let item_header: serde_json::Value = serde_json::from_slice(item_line)?;

		let payload = match item_header.get("length").and_then(|l| l.as_u64()) {
			Some(length) => {
				let length = (length as usize).min(after.len());
				let payload = after[..length].to_vec();
				rest = after[length..].strip_prefix(b"\n").unwrap_or(&after[length..]);
				payload
			}
			None => {
				let (payload, next) = split_line(after);
				rest = next;
				payload.to_vec()
			}
		};

		items.push(DecodedItem {
			header: item_header,
			payload,
		});
	}

	Ok((header, items))
}

fn split_line(bytes: &[u8]) -> (&[u8], &[u8]) {
	match bytes.iter().position(|b| *b == b'\n') {
		Some(idx) => (&bytes[..idx], &bytes[idx + 1..]),
		None => (bytes, &[]),
	}
}
