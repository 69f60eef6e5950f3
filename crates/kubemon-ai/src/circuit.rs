/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: crates/kubemon-ai/src/circuit.rs
 *
 * Three-state circuit breaker guarding the AI subprocess (spec §4.6.3):
 * closed while invocations succeed, opens after `threshold` consecutive
 * failures, and after `reset_timeout` admits exactly one half-open trial
 * before deciding whether to close again or reopen. The generation counter
 * exists so a trial call started under one half-open window can't be
 * mistaken for belonging to a later one if two calls race past the
 * deadline check simultaneously.
 *
 * SPDX-License-Identifier: Apache-2.0
 */

use kubemon_types::CircuitState;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("circuit breaker is open")]
pub struct CircuitOpenError;

struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    generation: u64,
    opened_at: Option<Instant>,
}

pub struct CircuitBreaker {
    inner: Mutex<Inner>,
    threshold: u32,
    reset_timeout: Duration,
}

/// A permit to attempt a call, tied to the generation the breaker was in
/// when it was issued. `report_success`/`report_failure` only have effect
/// if the breaker is still on the same generation, so a half-open trial
/// that finishes after a newer generation has already started doesn't
/// clobber it.
pub struct Permit(u64);

impl CircuitBreaker {
    pub fn new(threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                generation: 0,
                opened_at: None,
            }),
            threshold,
            reset_timeout,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().expect("circuit lock poisoned").state
    }

    /// Gates an attempted call. Closed and half-open states admit the
    /// call; open admits it only once `reset_timeout` has elapsed since it
    /// tripped, at which point it transitions to half-open and bumps the
    /// generation for this one trial.
    pub fn try_acquire(&self) -> Result<Permit, CircuitOpenError> {
        let mut inner = self.inner.lock().expect("circuit lock poisoned");
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => Ok(Permit(inner.generation)),
            CircuitState::Open => {
                let elapsed = inner.opened_at.map(|t| t.elapsed()).unwrap_or(Duration::MAX);
                if elapsed >= self.reset_timeout {
                    inner.state = CircuitState::HalfOpen;
                    inner.generation += 1;
                    Ok(Permit(inner.generation))
                } else {
                    Err(CircuitOpenError)
                }
            }
        }
    }

    pub fn report_success(&self, permit: Permit) {
        let mut inner = self.inner.lock().expect("circuit lock poisoned");
        if inner.generation != permit.0 {
            return;
        }
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
    }

    pub fn report_failure(&self, permit: Permit) {
        let mut inner = self.inner.lock().expect("circuit lock poisoned");
        if inner.generation != permit.0 {
            return;
        }
        match inner.state {
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                inner.generation += 1;
            }
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                    inner.generation += 1;
                }
            }
            CircuitState::Open => {}
        }
    }
}
