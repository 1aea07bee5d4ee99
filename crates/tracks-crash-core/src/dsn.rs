// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Destination connection strings.
//!
//! A DSN has the form `{scheme}://{public_key}[:{secret_key}]@{host}[:{port}]/[{path}/]{project_id}`.
//! It yields both the upload endpoint and the credentials for the
//! `X-Sentry-Auth` header.

use std::fmt;
use std::str::FromStr;

use tracks_common_config::Secret;
use url::Url;

use crate::error::CrashError;

/// Protocol version sent in the auth header.
pub const SENTRY_PROTOCOL_VERSION: u32 = 7;

/// A parsed destination.
#[derive(Clone, PartialEq, Eq)]
pub struct Dsn {
	scheme: String,
	public_key: Secret<String>,
	secret_key: Option<Secret<String>>,
	host: String,
	port: Option<u16>,
	path: String,
	project_id: String,
}

impl Dsn {
	pub fn scheme(&self) -> &str {
		&self.scheme
	}

	pub fn host(&self) -> &str {
		&self.host
	}

	pub fn port(&self) -> Option<u16> {
		self.port
	}

	pub fn project_id(&self) -> &str {
		&self.project_id
	}

	pub fn public_key(&self) -> &Secret<String> {
		&self.public_key
	}

	pub fn secret_key(&self) -> Option<&Secret<String>> {
		self.secret_key.as_ref()
	}

	fn base_url(&self) -> String {
		match self.port {
			Some(port) => format!("{}://{}:{}{}", self.scheme, self.host, port, self.path),
			None => format!("{}://{}{}", self.scheme, self.host, self.path),
		}
	}

	/// Endpoint accepting envelopes (batched events and attachments).
	pub fn envelope_url(&self) -> String {
		format!("{}/api/{}/envelope/", self.base_url(), self.project_id)
	}

	/// Build the `X-Sentry-Auth` header value.
	///
	/// `client` identifies the SDK (`name/version`), `timestamp` is Unix
	/// seconds at send time.
	pub fn auth_header(&self, client: &str, timestamp: i64) -> String {
		let mut header = format!(
			"Sentry sentry_version={SENTRY_PROTOCOL_VERSION}, sentry_client={client}, sentry_timestamp={timestamp}, sentry_key={}",
			self.public_key.expose()
		);
		if let Some(secret) = &self.secret_key {
			header.push_str(", sentry_secret=");
			header.push_str(secret.expose());
		}
		header
	}
}

impl FromStr for Dsn {
	type Err = CrashError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let url = Url::parse(s.trim()).map_err(|e| CrashError::InvalidDsn(e.to_string()))?;

		let scheme = match url.scheme() {
			"http" | "https" => url.scheme().to_string(),
			other => return Err(CrashError::InvalidDsn(format!("unsupported scheme: {other}"))),
		};

		if url.username().is_empty() {
			return Err(CrashError::InvalidDsn("missing public key".to_string()));
		}
		let public_key = Secret::new(url.username().to_string());
		let secret_key = url
			.password()
			.filter(|p| !p.is_empty())
			.map(|p| Secret::new(p.to_string()));

		let host = url
			.host_str()
			.filter(|h| !h.is_empty())
			.ok_or_else(|| CrashError::InvalidDsn("missing host".to_string()))?
			.to_string();

		let trimmed = url.path().trim_end_matches('/');
		let (path, project_id) = match trimmed.rsplit_once('/') {
			Some((path, project_id)) => (path.to_string(), project_id.to_string()),
			None => (String::new(), trimmed.to_string()),
		};
		if project_id.is_empty() {
			return Err(CrashError::InvalidDsn("missing project id".to_string()));
		}

		Ok(Self {
			scheme,
			public_key,
			secret_key,
			host,
			port: url.port(),
			path,
			project_id,
		})
	}
}

impl fmt::Display for Dsn {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}/{}", self.base_url().replacen("://", "://[REDACTED]@", 1), self.project_id)
	}
}

impl fmt::Debug for Dsn {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Dsn")
			.field("scheme", &self.scheme)
			.field("public_key", &self.public_key)
			.field("host", &self.host)
			.field("port", &self.port)
			.field("project_id", &self.project_id)
			.finish_non_exhaustive()
	}
}
