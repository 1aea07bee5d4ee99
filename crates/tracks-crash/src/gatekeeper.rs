// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Send policy.

use tracing::debug;

use crate::provider::CrashLoggingDataProvider;

/// Decides whether an event may leave the device.
///
/// Debug builds send only when `force_crash_logging` is set; every build
/// honours the user's opt-out. Without a provider nothing is sent.
pub fn should_send(
	provider: Option<&dyn CrashLoggingDataProvider>,
	force_crash_logging: bool,
) -> bool {
	let Some(provider) = provider else {
		debug!("no data provider configured, not sending");
		return false;
	};

	let opted_out = provider.user_has_opted_out();
	let build_type = provider.build_type();

	let allowed = if build_type.is_debug() {
		force_crash_logging && !opted_out
	} else {
		!opted_out
	};

	if !allowed {
		debug!(%build_type, opted_out, force_crash_logging, "event suppressed by send policy");
	}
	allowed
}
