/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: crates/kubemon-ai/src/session_log.rs
 *
 * Optional append-only log of AI conversation turns (spec §4.6.4), backed
 * by `sqlx`'s SQLite driver. No secondary indices: the table is scanned by
 * `session_id` only when a transcript is requested, matching the pack's
 * `hypermesh-online-hypermesh` use of `sqlx` for its own local state rather
 * than a query-heavy store.
 *
 * SPDX-License-Identifier: Apache-2.0
 */

use chrono::Utc;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionLogError {
    #[error("session log database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SessionLogEntry {
    pub session_id: String,
    pub role: String,
    pub content: String,
    pub timestamp: i64,
}

/// Append-only session transcript store. `role` is caller-defined
/// (`"request"` / `"response"` for the AI wrapper's own use) rather than a
/// closed enum, since external callers may want to log their own turns too.
pub struct SessionLog {
    pool: SqlitePool,
}

impl SessionLog {
    pub async fn connect(path: &Path) -> Result<Self, SessionLogError> {
        let url = format!("sqlite://{}?mode=rwc", path.display());
        let pool = SqlitePoolOptions::new().max_connections(4).connect(&url).await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS session_log (
                session_id TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                timestamp INTEGER NOT NULL
            )",
        )
        .execute(&pool)
        .await?;
        Ok(Self { pool })
    }

    pub async fn record(&self, session_id: &str, role: &str, content: &str) -> Result<(), SessionLogError> {
        sqlx::query("INSERT INTO session_log (session_id, role, content, timestamp) VALUES (?, ?, ?, ?)")
            .bind(session_id)
            .bind(role)
            .bind(content)
            .bind(Utc::now().timestamp())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Every turn recorded for `session_id`, oldest first.
    pub async fn transcript(&self, session_id: &str) -> Result<Vec<SessionLogEntry>, SessionLogError> {
        let rows = sqlx::query_as::<_, SessionLogEntry>(
            "SELECT session_id, role, content, timestamp FROM session_log WHERE session_id = ? ORDER BY timestamp ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn record_then_transcript_round_trips_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("sessions.sqlite");
        let log = SessionLog::connect(&db_path).await.unwrap();

        log.record("session-1", "request", "what is wrong with pod x?").await.unwrap();
        log.record("session-1", "response", "pod x is crash-looping").await.unwrap();
        log.record("session-2", "request", "unrelated session").await.unwrap();

        let transcript = log.transcript("session-1").await.unwrap();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[0].role, "request");
        assert_eq!(transcript[1].role, "response");
    }
}
