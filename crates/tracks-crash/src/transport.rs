// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Request transport.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, RETRY_AFTER};
use reqwest::Client;
use tracing::debug;
use tracks_common_config::SecretString;

use crate::error::TransportError;

/// Header carrying the computed auth string.
pub const AUTH_HEADER: &str = "X-Sentry-Auth";

/// Timeout for uploads made while the process is panicking.
const BLOCKING_TIMEOUT: Duration = Duration::from_secs(5);

/// One upload.
#[derive(Debug, Clone)]
pub struct TransportRequest {
	pub url: String,
	/// Value of the [`AUTH_HEADER`] header.
	pub auth: SecretString,
	pub content_type: &'static str,
	pub body: Vec<u8>,
}

/// The collector's answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
	pub status: u16,
	/// Raw `Retry-After` header, when present.
	pub retry_after: Option<String>,
	pub body: String,
}

/// Sends requests and returns responses. Non-success statuses are responses,
/// not errors.
#[async_trait]
pub trait Transport: Send + Sync {
	async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError>;

	/// Sends without an ambient runtime, blocking the calling thread.
	///
	/// The default drives [`send`](Self::send) on a private current-thread
	/// runtime in a helper thread.
	fn send_blocking(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
		std::thread::scope(|scope| {
			scope
				.spawn(|| -> Result<TransportResponse, TransportError> {
					let runtime = tokio::runtime::Builder::new_current_thread()
						.enable_all()
						.build()?;
					runtime.block_on(self.send(request))
				})
				.join()
				.unwrap_or_else(|_| Err(TransportError::Other("transport thread panicked".to_string())))
		})
	}
}

/// [`Transport`] over `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
	client: Client,
}

impl HttpTransport {
	pub fn new(request_timeout: Duration) -> Result<Self, TransportError> {
		let client = tracks_common_http::client_with_timeout(request_timeout)?;
		Ok(Self { client })
	}

	pub fn with_client(client: Client) -> Self {
		Self { client }
	}
}

#[async_trait]
impl Transport for HttpTransport {
	async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
		debug!(url = %request.url, bytes = request.body.len(), "sending envelope");

		let response = self
			.client
			.post(&request.url)
			.header(AUTH_HEADER, request.auth.expose())
			.header(CONTENT_TYPE, request.content_type)
			.body(request.body)
			.send()
			.await?;

		let status = response.status().as_u16();
		let retry_after = response
			.headers()
			.get(RETRY_AFTER)
			.and_then(|v| v.to_str().ok())
			.map(str::to_string);
		let body = response.text().await.unwrap_or_default();

		Ok(TransportResponse {
			status,
			retry_after,
			body,
		})
	}

	/// Uses `reqwest::blocking` on a helper thread, since a blocking client
	/// cannot run inside an async context.
	fn send_blocking(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
		std::thread::scope(|scope| {
			scope
				.spawn(|| -> Result<TransportResponse, TransportError> {
					let client = reqwest::blocking::Client::builder()
						.user_agent(tracks_common_http::user_agent())
						.timeout(BLOCKING_TIMEOUT)
						.build()?;

					let response = client
						.post(&request.url)
						.header(AUTH_HEADER, request.auth.expose())
						.header(CONTENT_TYPE, request.content_type)
						.body(request.body)
						.send()?;

					let status = response.status().as_u16();
					let retry_after = response
						.headers()
						.get(RETRY_AFTER)
						.and_then(|v| v.to_str().ok())
						.map(str::to_string);
					let body = response.text().unwrap_or_default();

					Ok(TransportResponse {
						status,
						retry_after,
						body,
					})
				})
				.join()
				.unwrap_or_else(|_| Err(TransportError::Other("transport thread panicked".to_string())))
		})
	}
}

/// Parses a `Retry-After` value given in seconds. HTTP dates are ignored.
pub(crate) fn parse_retry_after(value: &str) -> Option<u64> {
	value
		.trim()
		.parse::<f64>()
		.ok()
		.filter(|secs| secs.is_finite() && *secs >= 0.0)
		.map(|secs| secs.ceil() as u64)
}
