// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Shared HTTP client construction for Tracks.
//!
//! Every request the SDK makes carries the same client identifier, which is
//! also the `sentry_client` value in the auth header.

use std::time::Duration;

use reqwest::{Client, ClientBuilder};

/// Client name reported to the collector.
pub const CLIENT_NAME: &str = "tracks-rust";

/// SDK version reported to the collector.
pub const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// `tracks-rust/{version}`
pub fn client_identifier() -> String {
	format!("{CLIENT_NAME}/{CLIENT_VERSION}")
}

/// Returns the standard User-Agent string (same as [`client_identifier`]).
pub fn user_agent() -> String {
	client_identifier()
}

/// Creates a client builder with the standard User-Agent.
///
/// ```ignore
/// let client = tracks_common_http::builder()
///     .timeout(Duration::from_secs(30))
///     .build()?;
/// ```
pub fn builder() -> ClientBuilder {
	Client::builder().user_agent(user_agent())
}

/// Builds a client with the given request timeout.
pub fn client_with_timeout(timeout: Duration) -> reqwest::Result<Client> {
	builder().timeout(timeout).build()
}
