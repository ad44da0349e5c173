// ABOUTME: MySQL connection utilities for the source and destination databases
// ABOUTME: Handles pool setup, a liveness check, and readable connection errors

use crate::error::MigrationError;
use crate::utils;
use anyhow::Result;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlPool, MySqlPoolOptions};
use sqlx::Connection;
use std::str::FromStr;

/// Connections held per pool. Work is sequential, but the reconciler streams
/// a source cursor while issuing lookups, and the copier reads while it
/// writes, so each side needs room for one cursor plus one statement.
const MAX_CONNECTIONS: u32 = 2;

/// Connect to a MySQL database
///
/// `side` names the endpoint ("source" or "destination") in log lines and
/// errors. A single connection runs `SELECT 1` before the pool is built, so
/// bad credentials or an unreachable host fail here with the driver's own
/// error. The pool retries failed connects until its acquire timeout, which
/// would hide a refused connection behind a timeout.
pub async fn connect(side: &'static str, connection_string: &str) -> Result<MySqlPool> {
    tracing::info!(
        "Connecting to {} database {}...",
        side,
        utils::redact_url(connection_string)
    );

    let options = MySqlConnectOptions::from_str(connection_string).map_err(|e| explain(side, e))?;

    let mut conn = MySqlConnection::connect_with(&options)
        .await
        .map_err(|e| explain(side, e))?;
    sqlx::query("SELECT 1")
        .execute(&mut conn)
        .await
        .map_err(|e| explain(side, e))?;
    conn.close().await.map_err(|e| explain(side, e))?;

    let pool = MySqlPoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .connect_with(options)
        .await
        .map_err(|e| explain(side, e))?;

    tracing::info!("✓ Connected to {}", side);
    Ok(pool)
}

/// Attach a hint for the common connection failures.
fn explain(side: &'static str, e: sqlx::Error) -> anyhow::Error {
    let error_msg = e.to_string();
    let hint = if error_msg.contains("Access denied") {
        Some(
            "Authentication failed: Invalid username or password.\n\
             Please verify your database credentials.",
        )
    } else if error_msg.contains("Unknown database") {
        Some("Database does not exist. Please create it first or check the connection URL.")
    } else if error_msg.contains("Connection refused") {
        Some(
            "Connection refused: Unable to reach database server.\n\
             Please check:\n\
             - The host and port are correct\n\
             - The database server is running\n\
             - Firewall rules allow connections",
        )
    } else if matches!(e, sqlx::Error::PoolTimedOut) || error_msg.contains("timed out") {
        Some("Connection timeout: Database server did not respond in time.")
    } else {
        None
    };

    let err = anyhow::Error::new(MigrationError::Connect { side, source: e });
    match hint {
        Some(hint) => err.context(hint),
        None => err,
    }
}
