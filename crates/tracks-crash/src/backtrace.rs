// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Stack capture for reported errors and panics.

use std::backtrace::Backtrace;

use rustc_demangle::demangle;
use tracks_crash_core::{Frame, Stacktrace};

/// Prefixes of frames that belong to the runtime rather than the host.
const SYSTEM_PREFIXES: &[&str] = &[
	"std::",
	"core::",
	"alloc::",
	"tokio::",
	"futures::",
	"futures_util::",
	"async_trait::",
	"tracing::",
	"backtrace::",
	"panic_unwind::",
	"tracks_crash::",
	"rust_begin_unwind",
	"rust_panic",
	"__rust_",
	"_rust_",
];

const SYSTEM_SEGMENTS: &[&str] = &[
	"::panic::",
	"::panicking::",
	"::rt::",
	"::sys_common::",
	"::backtrace::",
];

/// Capture the current stack. Frames are ordered outermost call first.
pub fn capture_stacktrace() -> Stacktrace {
	parse_backtrace(&Backtrace::force_capture())
}

pub fn parse_backtrace(backtrace: &Backtrace) -> Stacktrace {
	parse_backtrace_str(&format!("{backtrace:#}"))
}

/// Parses the `{:#}` rendering of a backtrace:
///
/// ```text
///    0: my_app::handlers::process
///              at ./src/handlers.rs:42:9
///    1: my_app::main
/// ```
pub(crate) fn parse_backtrace_str(rendered: &str) -> Stacktrace {
	let mut frames: Vec<Frame> = Vec::new();

	for line in rendered.lines() {
		let line = line.trim();
		if line.is_empty() {
			continue;
		}

		if let Some(location) = line.strip_prefix("at ") {
			if let Some(frame) = frames.last_mut() {
				apply_location(frame, location);
			}
			continue;
		}

		if let Some(frame) = parse_symbol_line(line) {
			frames.push(frame);
		}
	}

	// Rendered innermost first; the collector wants the crashing frame last.
	frames.reverse();
	Stacktrace { frames }
}

fn parse_symbol_line(line: &str) -> Option<Frame> {
	let symbol = match line.split_once(':') {
		Some((index, rest)) if index.trim().parse::<u32>().is_ok() => rest.trim(),
		_ => line,
	};
	if symbol.is_empty() {
		return None;
	}

	let function = format!("{:#}", demangle(symbol));
	let module = module_of(&function);
	let in_app = is_in_app(&function);

	Some(Frame {
		function: Some(function),
		module,
		in_app,
		..Frame::default()
	})
}

/// `./src/main.rs:42:9` → filename, line, column.
fn apply_location(frame: &mut Frame, location: &str) {
	let mut parts = location.rsplitn(3, ':');
	let col = parts.next();
	let line = parts.next();
	let file = parts.next();

	let (file, lineno, colno) = match (file, line, col) {
		(Some(file), Some(line), Some(col)) => (file, line.parse().ok(), col.parse().ok()),
		_ => (location, None, None),
	};

	frame.abs_path = Some(file.to_string());
	frame.filename = Some(
		file.rsplit(['/', '\\'])
			.next()
			.unwrap_or(file)
			.to_string(),
	);
	frame.lineno = lineno;
	frame.colno = colno;
}

/// `my_app::handlers::process` → `my_app::handlers`. Trait impls such as
/// `<T as Trait>::method` keep everything before the last separator.
fn module_of(function: &str) -> Option<String> {
	function
		.rfind("::")
		.map(|idx| function[..idx].to_string())
		.filter(|module| !module.is_empty())
}

fn is_in_app(function: &str) -> bool {
	let trimmed = function.trim_start_matches('<');
	!SYSTEM_PREFIXES.iter().any(|p| trimmed.starts_with(p))
		&& !SYSTEM_SEGMENTS.iter().any(|s| function.contains(s))
}
