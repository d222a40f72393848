use chrono::{DateTime, Duration, Utc};
use log::{trace, warn};
use sqlx::SqliteConnection;

use crate::{db_types::IdempotencyStatus, traits::ClaimOutcome, traits::SettlementDatabaseError};

/// Atomically claims `key` for processing.
///
/// The insert races are settled by the unique index on `event_key`: whoever inserts first owns the claim, and the
/// loser observes the existing row. A `Processing` claim older than its expiry is treated as abandoned and taken
/// over; a `Failed` key is retryable by design.
pub async fn claim(
    key: &str,
    validity: Duration,
    conn: &mut SqliteConnection,
) -> Result<ClaimOutcome, SettlementDatabaseError> {
    let now = Utc::now();
    let expires_at = now + validity;
    let inserted = sqlx::query(
        r#"
            INSERT INTO event_keys (event_key, status, expires_at, created_at, updated_at)
            VALUES ($1, 'Processing', $2, $3, $3)
            ON CONFLICT (event_key) DO NOTHING;
        "#,
    )
    .bind(key)
    .bind(expires_at)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    if inserted.rows_affected() == 1 {
        trace!("🎟️ Event key {key} claimed");
        return Ok(ClaimOutcome::Claimed);
    }
    let (status, claim_expiry): (IdempotencyStatus, DateTime<Utc>) =
        sqlx::query_as("SELECT status, expires_at FROM event_keys WHERE event_key = $1")
            .bind(key)
            .fetch_one(&mut *conn)
            .await?;
    match status {
        IdempotencyStatus::Completed => Ok(ClaimOutcome::AlreadyCompleted),
        IdempotencyStatus::Processing if claim_expiry > now => Ok(ClaimOutcome::AlreadyProcessing),
        IdempotencyStatus::Processing | IdempotencyStatus::Failed => {
            // Take over an abandoned or failed claim. The status predicate keeps this atomic under races: only one
            // contender's update sticks.
            let taken = sqlx::query(
                r#"
                    UPDATE event_keys
                    SET status = 'Processing', expires_at = $2, updated_at = $3
                    WHERE event_key = $1 AND status = $4 AND expires_at = $5;
                "#,
            )
            .bind(key)
            .bind(expires_at)
            .bind(now)
            .bind(status)
            .bind(claim_expiry)
            .execute(&mut *conn)
            .await?;
            if taken.rows_affected() == 1 {
                trace!("🎟️ Stale claim on event key {key} taken over");
                Ok(ClaimOutcome::Claimed)
            } else {
                Ok(ClaimOutcome::AlreadyProcessing)
            }
        },
    }
}

pub async fn complete(key: &str, conn: &mut SqliteConnection) -> Result<(), SettlementDatabaseError> {
    let result = sqlx::query("UPDATE event_keys SET status = 'Completed', updated_at = $2 WHERE event_key = $1")
        .bind(key)
        .bind(Utc::now())
        .execute(conn)
        .await?;
    if result.rows_affected() == 0 {
        warn!("🎟️ Tried to complete event key {key}, but it has no record");
    }
    Ok(())
}

pub async fn fail(key: &str, conn: &mut SqliteConnection) -> Result<(), SettlementDatabaseError> {
    let result = sqlx::query("UPDATE event_keys SET status = 'Failed', updated_at = $2 WHERE event_key = $1")
        .bind(key)
        .bind(Utc::now())
        .execute(conn)
        .await?;
    if result.rows_affected() == 0 {
        warn!("🎟️ Tried to fail event key {key}, but it has no record");
    }
    Ok(())
}
