// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Panic hook integration for automatic crash reporting.

use std::backtrace::Backtrace;
use std::panic::PanicHookInfo;
use std::sync::{Arc, OnceLock, RwLock, Weak};

use tracks_crash_core::Stacktrace;

use crate::backtrace::parse_backtrace;

/// Receives panics captured by the hook.
pub(crate) trait PanicReporter: Send + Sync {
	fn report_panic(&self, message: &str, location: Option<&str>, stacktrace: Stacktrace);
}

static INSTALLED: OnceLock<()> = OnceLock::new();
static REPORTER: RwLock<Option<Weak<dyn PanicReporter>>> = RwLock::new(None);

/// Routes panics to `reporter`, installing the process hook on first use.
///
/// The hook wraps whatever hook was installed before it and calls it after
/// reporting. Registering again replaces the reporter, not the hook.
pub(crate) fn register(reporter: &Arc<dyn PanicReporter>) {
	{
		let mut current = REPORTER.write().unwrap_or_else(|poisoned| poisoned.into_inner());
		*current = Some(Arc::downgrade(reporter));
	}

	INSTALLED.get_or_init(|| {
		let previous = std::panic::take_hook();
		std::panic::set_hook(Box::new(move |info| {
			let backtrace = Backtrace::force_capture();
			report(info, &backtrace);
			previous(info);
		}));
	});
}

fn report(info: &PanicHookInfo<'_>, backtrace: &Backtrace) {
	let reporter = REPORTER
		.read()
		.unwrap_or_else(|poisoned| poisoned.into_inner())
		.as_ref()
		.and_then(Weak::upgrade);
	let Some(reporter) = reporter else {
		return;
	};

	let message = panic_message(info);
	let location = info
		.location()
		.map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()));

	reporter.report_panic(&message, location.as_deref(), parse_backtrace(backtrace));
}

pub(crate) fn panic_message(info: &PanicHookInfo<'_>) -> String {
	if let Some(s) = info.payload().downcast_ref::<&str>() {
		s.to_string()
	} else if let Some(s) = info.payload().downcast_ref::<String>() {
		s.clone()
	} else {
		"Box<dyn Any>".to_string()
	}
}
