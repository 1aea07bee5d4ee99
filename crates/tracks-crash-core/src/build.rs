// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Build classification.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CrashError;

/// How the host application was built. Debug builds only report when
/// crash logging is explicitly forced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildType {
	Debug,
	Alpha,
	Beta,
	Production,
}

impl BuildType {
	pub fn is_debug(self) -> bool {
		matches!(self, Self::Debug)
	}

	/// Environment name attached to events.
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Debug => "debug",
			Self::Alpha => "alpha",
			Self::Beta => "beta",
			Self::Production => "production",
		}
	}
}

impl Default for BuildType {
	fn default() -> Self {
		if cfg!(debug_assertions) {
			Self::Debug
		} else {
			Self::Production
		}
	}
}

impl fmt::Display for BuildType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for BuildType {
	type Err = CrashError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"debug" => Ok(Self::Debug),
			"alpha" => Ok(Self::Alpha),
			"beta" => Ok(Self::Beta),
			"production" | "release" => Ok(Self::Production),
			_ => Err(CrashError::InvalidBuildType(s.to_string())),
		}
	}
}
