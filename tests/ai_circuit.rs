/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: tests/ai_circuit.rs
 *
 * S5: repeated AI subprocess failures trip the circuit breaker, after which
 * further calls are rejected without spawning the subprocess again. Uses
 * the real `false` executable (always exits non-zero) rather than a mock,
 * the same "drive the real subprocess" discipline `kubemon-ai`'s own unit
 * tests use with `sh`.
 *
 * SPDX-License-Identifier: Apache-2.0
 */

use kubemon_ai::{AiConfig, AiError, AiInvoker};
use kubemon_types::CircuitState;
use std::path::PathBuf;
use std::time::Duration;

fn invoker_over_a_failing_executable(threshold: u32) -> AiInvoker {
    let config = AiConfig {
        executable: PathBuf::from("false"),
        timeout: Duration::from_secs(5),
        circuit_threshold: threshold,
        circuit_reset_timeout: Duration::from_secs(60),
        ..AiConfig::default()
    };
    AiInvoker::new(config).expect("'false' is on PATH on any POSIX runner")
}

#[tokio::test]
async fn consecutive_failures_trip_the_circuit_open() {
    let invoker = invoker_over_a_failing_executable(2);
    assert_eq!(invoker.circuit_state(), CircuitState::Closed);

    let first = invoker.query_assistant("why is the cluster unhealthy?").await;
    assert!(matches!(first, Err(AiError::NonZeroExit(_, _))));
    assert_eq!(invoker.circuit_state(), CircuitState::Closed, "one failure is below the threshold of 2");

    let second = invoker.query_assistant("why is the cluster unhealthy?").await;
    assert!(matches!(second, Err(AiError::NonZeroExit(_, _))));
    assert_eq!(invoker.circuit_state(), CircuitState::Open, "the threshold-th failure must open the breaker");
}

#[tokio::test]
async fn an_open_circuit_rejects_calls_without_spawning_the_subprocess_again() {
    let invoker = invoker_over_a_failing_executable(1);

    let tripped = invoker.query_assistant("question").await;
    assert!(matches!(tripped, Err(AiError::NonZeroExit(_, _))));
    assert_eq!(invoker.circuit_state(), CircuitState::Open);

    let rejected = invoker.query_assistant("question").await;
    assert!(matches!(rejected, Err(AiError::CircuitOpen)));
    assert_eq!(invoker.circuit_state(), CircuitState::Open);
}

#[tokio::test]
async fn analyze_diagnostic_and_predict_share_the_same_breaker_as_query_assistant() {
    let invoker = invoker_over_a_failing_executable(1);

    let result = kubemon_types::CheckResult {
        name: "nodes".to_string(),
        status: kubemon_types::HealthStatus::Unhealthy,
        message: "node NotReady".to_string(),
        timestamp: chrono::Utc::now(),
        duration_ms: 5,
        details: Default::default(),
        metrics: vec![],
        error: None,
        confidence: 1.0,
        predictions: vec![],
        labels: Default::default(),
    };

    let tripped = invoker.analyze_diagnostic(&result).await;
    assert!(matches!(tripped, Err(AiError::NonZeroExit(_, _))));
    assert_eq!(invoker.circuit_state(), CircuitState::Open);

    // A different mode must be rejected by the same breaker instance.
    let rejected = invoker.predict(&[result]).await;
    assert!(matches!(rejected, Err(AiError::CircuitOpen)));
}
