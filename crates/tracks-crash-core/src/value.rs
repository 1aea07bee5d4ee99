// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Caller-supplied context values.
//!
//! `ExtraValue` keeps the JSON shape of Sentry's `extra` bag while limiting
//! what callers can put into it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Map of context values keyed by name.
pub type ExtraMap = BTreeMap<String, ExtraValue>;

/// A scalar or nested value attached to an event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExtraValue {
	#[default]
	Null,
	Bool(bool),
	Int(i64),
	Float(f64),
	String(String),
	List(Vec<ExtraValue>),
	Map(ExtraMap),
}

impl ExtraValue {
	pub fn as_str(&self) -> Option<&str> {
		match self {
			Self::String(s) => Some(s),
			_ => None,
		}
	}

	pub fn is_null(&self) -> bool {
		matches!(self, Self::Null)
	}
}

impl From<&str> for ExtraValue {
	fn from(value: &str) -> Self {
		Self::String(value.to_string())
	}
}

impl From<String> for ExtraValue {
	fn from(value: String) -> Self {
		Self::String(value)
	}
}

impl From<bool> for ExtraValue {
	fn from(value: bool) -> Self {
		Self::Bool(value)
	}
}

impl From<i64> for ExtraValue {
	fn from(value: i64) -> Self {
		Self::Int(value)
	}
}

impl From<i32> for ExtraValue {
	fn from(value: i32) -> Self {
		Self::Int(value.into())
	}
}

impl From<u32> for ExtraValue {
	fn from(value: u32) -> Self {
		Self::Int(value.into())
	}
}

impl From<f64> for ExtraValue {
	fn from(value: f64) -> Self {
		Self::Float(value)
	}
}

impl<T: Into<ExtraValue>> From<Vec<T>> for ExtraValue {
	fn from(values: Vec<T>) -> Self {
		Self::List(values.into_iter().map(Into::into).collect())
	}
}

impl From<ExtraMap> for ExtraValue {
	fn from(map: ExtraMap) -> Self {
		Self::Map(map)
	}
}

impl<T: Into<ExtraValue>> From<Option<T>> for ExtraValue {
	fn from(value: Option<T>) -> Self {
		value.map(Into::into).unwrap_or(Self::Null)
	}
}

impl From<serde_json::Value> for ExtraValue {
	fn from(value: serde_json::Value) -> Self {
		use serde_json::Value;

		match value {
			Value::Null => Self::Null,
			Value::Bool(b) => Self::Bool(b),
			Value::Number(n) => match n.as_i64() {
				Some(i) => Self::Int(i),
				None => n.as_f64().map(Self::Float).unwrap_or(Self::Null),
			},
			Value::String(s) => Self::String(s),
			Value::Array(items) => Self::List(items.into_iter().map(Into::into).collect()),
			Value::Object(map) => Self::Map(map.into_iter().map(|(k, v)| (k, v.into())).collect()),
		}
	}
}
