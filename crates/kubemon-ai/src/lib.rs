/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: crates/kubemon-ai/src/lib.rs
 *
 * AI invocation wrapper crate (C7). See `invoker::AiInvoker` for dispatch
 * and `circuit::CircuitBreaker` for the failure-gating policy; the session
 * log in `session_log` is an optional add-on wired up by the caller.
 *
 * SPDX-License-Identifier: Apache-2.0
 */

pub mod circuit;
pub mod invoker;
pub mod session_log;

pub use circuit::{CircuitBreaker, CircuitOpenError};
pub use invoker::{Action, AiConfig, AiError, AiInvoker, AiMode, AiResponse, Recommendation};
pub use session_log::{SessionLog, SessionLogEntry, SessionLogError};
