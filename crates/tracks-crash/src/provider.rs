// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Collaborators the host application supplies.

use std::sync::RwLock;

use tracing::warn;
use tracks_common_config::{env_flag, env_string, load_secret_env, SecretString};
use tracks_crash_core::{AppState, BuildType, DiagnosticEvent, UserContext};

pub const DSN_ENV: &str = "TRACKS_SENTRY_DSN";
pub const RELEASE_ENV: &str = "TRACKS_RELEASE";
pub const BUILD_TYPE_ENV: &str = "TRACKS_BUILD_TYPE";
pub const OPT_OUT_ENV: &str = "TRACKS_OPT_OUT";

/// Source of credentials, consent and identity.
///
/// Every method is called fresh when it is needed; implementations must not
/// assume their answers are cached.
pub trait CrashLoggingDataProvider: Send + Sync {
	/// Destination connection string.
	fn sentry_dsn(&self) -> Option<SecretString>;

	fn release(&self) -> Option<String>;

	fn build_type(&self) -> BuildType;

	fn user_has_opted_out(&self) -> bool;

	fn current_user(&self) -> Option<UserContext>;

	/// Called after an error event has been constructed.
	fn did_log_error(&self, _event: &DiagnosticEvent) {}

	/// Called after a message event has been constructed.
	fn did_log_message(&self, _event: &DiagnosticEvent) {}
}

/// Source of device metadata used during enrichment.
pub trait ContextProvider: Send + Sync {
	/// Language part of the current locale, e.g. `en`.
	fn locale_language_code(&self) -> Option<String>;

	fn app_state(&self) -> Option<AppState>;
}

/// Locale from the operating system; app state as last reported by the host.
#[derive(Debug, Default)]
pub struct SystemContextProvider {
	app_state: RwLock<Option<AppState>>,
}

impl SystemContextProvider {
	pub fn new() -> Self {
		Self::default()
	}

	/// Records a lifecycle transition reported by the host.
	pub fn set_app_state(&self, state: AppState) {
		let mut guard = self
			.app_state
			.write()
			.unwrap_or_else(|poisoned| poisoned.into_inner());
		*guard = Some(state);
	}
}

impl ContextProvider for SystemContextProvider {
	fn locale_language_code(&self) -> Option<String> {
		sys_locale::get_locale().and_then(|locale| language_code(&locale))
	}

	fn app_state(&self) -> Option<AppState> {
		*self
			.app_state
			.read()
			.unwrap_or_else(|poisoned| poisoned.into_inner())
	}
}

/// `en-US`, `en_US.UTF-8` and `EN` all yield `en`.
pub(crate) fn language_code(locale: &str) -> Option<String> {
	let code = locale
		.split(['-', '_', '.', '@'])
		.next()
		.map(str::trim)
		.filter(|code| !code.is_empty() && *code != "C" && *code != "POSIX")?;
	Some(code.to_ascii_lowercase())
}

/// Data provider backed by environment variables.
///
/// | Variable | Meaning |
/// |----------|---------|
/// | `TRACKS_SENTRY_DSN` / `TRACKS_SENTRY_DSN_FILE` | destination |
/// | `TRACKS_RELEASE` | release identifier |
/// | `TRACKS_BUILD_TYPE` | `debug`, `alpha`, `beta` or `production` |
/// | `TRACKS_OPT_OUT` | `1`/`true`/`yes`/`on` to opt out |
///
/// The user is fixed at construction.
#[derive(Debug, Default)]
pub struct EnvDataProvider {
	user: Option<UserContext>,
}

impl EnvDataProvider {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_user(mut self, user: UserContext) -> Self {
		self.user = Some(user);
		self
	}
}

impl CrashLoggingDataProvider for EnvDataProvider {
	fn sentry_dsn(&self) -> Option<SecretString> {
		match load_secret_env(DSN_ENV) {
			Ok(dsn) => dsn,
			Err(e) => {
				warn!(error = %e, "failed to load DSN from environment");
				None
			}
		}
	}

	fn release(&self) -> Option<String> {
		env_string(RELEASE_ENV)
	}

	fn build_type(&self) -> BuildType {
		match env_string(BUILD_TYPE_ENV) {
			Some(value) => value.parse().unwrap_or_else(|e| {
				warn!(error = %e, "ignoring {BUILD_TYPE_ENV}");
				BuildType::default()
			}),
			None => BuildType::default(),
		}
	}

	fn user_has_opted_out(&self) -> bool {
		env_flag(OPT_OUT_ENV)
	}

	fn current_user(&self) -> Option<UserContext> {
		self.user.clone()
	}
}
