// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Configuration primitives shared by the Tracks crates.
//!
//! - [`Secret<T>`]: keeps DSN keys and other credentials out of logs
//! - [`load_secret_env`] / [`env_flag`]: environment loading with `*_FILE`
//!   support and lenient boolean parsing

pub mod env;
pub mod secret;

pub use env::{env_flag, env_string, load_secret_env, parse_flag, SecretEnvError};
pub use secret::{Secret, SecretString, REDACTED};
