// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Enrichment context: user identity and application lifecycle state.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CrashError;
use crate::value::ExtraMap;

/// Identity attached to every outgoing event.
///
/// An anonymous user has every identity field unset but is still sent, so
/// the collector can count events without a user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserContext {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub email: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub username: Option<String>,
	/// IP address (sensitive - not displayed by default)
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub ip_address: Option<String>,
	/// Free-form attributes, e.g. `is_logged_in` or the account's site count.
	#[serde(default, skip_serializing_if = "ExtraMap::is_empty")]
	pub data: ExtraMap,
}

impl UserContext {
	pub fn anonymous() -> Self {
		Self::default()
	}

	pub fn with_id(id: impl Into<String>) -> Self {
		Self {
			id: Some(id.into()),
			..Self::default()
		}
	}

	pub fn is_anonymous(&self) -> bool {
		self.id.is_none() && self.email.is_none() && self.username.is_none()
	}
}

/// Application lifecycle state at the time the event was built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppState {
	Foreground,
	Background,
	Inactive,
	#[default]
	Unknown,
}

impl AppState {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Foreground => "foreground",
			Self::Background => "background",
			Self::Inactive => "inactive",
			Self::Unknown => "unknown",
		}
	}
}

impl fmt::Display for AppState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for AppState {
	type Err = CrashError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"foreground" | "active" => Ok(Self::Foreground),
			"background" => Ok(Self::Background),
			"inactive" => Ok(Self::Inactive),
			"unknown" => Ok(Self::Unknown),
			_ => Err(CrashError::InvalidAppState(s.to_string())),
		}
	}
}
