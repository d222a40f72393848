use chrono::Utc;
use gsp_common::Money;
use log::trace;
use sqlx::SqliteConnection;

use crate::{db_types::Wallet, traits::SettlementDatabaseError};

pub async fn fetch(actor_id: &str, conn: &mut SqliteConnection) -> Result<Option<Wallet>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM wallets WHERE actor_id = $1").bind(actor_id).fetch_optional(conn).await
}

/// Adds to the actor's settled balance, creating the wallet on first credit.
pub async fn credit(
    actor_id: &str,
    amount: Money,
    conn: &mut SqliteConnection,
) -> Result<Wallet, SettlementDatabaseError> {
    let wallet = adjust(actor_id, amount, Money::default(), conn).await?;
    trace!("💰️ Credited {amount} to {actor_id}; balance now {}", wallet.balance);
    Ok(wallet)
}

/// Adds to the actor's pending (unsettled) balance, creating the wallet if needed.
pub async fn credit_pending(
    actor_id: &str,
    amount: Money,
    conn: &mut SqliteConnection,
) -> Result<Wallet, SettlementDatabaseError> {
    let wallet = adjust(actor_id, Money::default(), amount, conn).await?;
    trace!("💰️ Credited {amount} to {actor_id} (pending); pending now {}", wallet.pending_balance);
    Ok(wallet)
}

async fn adjust(
    actor_id: &str,
    balance_delta: Money,
    pending_delta: Money,
    conn: &mut SqliteConnection,
) -> Result<Wallet, SettlementDatabaseError> {
    let now = Utc::now();
    let wallet = sqlx::query_as(
        r#"
            INSERT INTO wallets (actor_id, balance, pending_balance, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4)
            ON CONFLICT (actor_id) DO UPDATE
            SET balance = balance + excluded.balance,
                pending_balance = pending_balance + excluded.pending_balance,
                updated_at = excluded.updated_at
            RETURNING *;
        "#,
    )
    .bind(actor_id)
    .bind(balance_delta.value())
    .bind(pending_delta.value())
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(wallet)
}

/// Removes `amount` from the actor's funds, drawing settled balance first and pending balance for the remainder.
/// Fails without touching the row when the combined funds fall short.
pub async fn debit(
    actor_id: &str,
    amount: Money,
    conn: &mut SqliteConnection,
) -> Result<Wallet, SettlementDatabaseError> {
    let wallet = fetch(actor_id, &mut *conn)
        .await?
        .ok_or_else(|| SettlementDatabaseError::WalletNotFound(actor_id.to_string()))?;
    if wallet.available() < amount {
        return Err(SettlementDatabaseError::InsufficientFunds {
            actor_id: actor_id.to_string(),
            available: wallet.available(),
            required: amount,
        });
    }
    let from_balance = if wallet.balance < amount { wallet.balance } else { amount };
    let from_pending = amount - from_balance;
    let updated: Wallet = sqlx::query_as(
        r#"
            UPDATE wallets
            SET balance = balance - $2, pending_balance = pending_balance - $3, updated_at = $4
            WHERE actor_id = $1
            RETURNING *;
        "#,
    )
    .bind(actor_id)
    .bind(from_balance.value())
    .bind(from_pending.value())
    .bind(Utc::now())
    .fetch_one(&mut *conn)
    .await?;
    trace!("💰️ Debited {amount} from {actor_id}; available now {}", updated.available());
    Ok(updated)
}
