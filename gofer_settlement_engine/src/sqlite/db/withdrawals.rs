use chrono::Utc;
use gsp_common::Money;
use sqlx::SqliteConnection;

use crate::{
    db_types::{Withdrawal, WithdrawalStatus},
    traits::SettlementDatabaseError,
};

pub async fn insert(
    out_biz_no: &str,
    actor_id: &str,
    amount: Money,
    conn: &mut SqliteConnection,
) -> Result<Withdrawal, SettlementDatabaseError> {
    let now = Utc::now();
    let withdrawal = sqlx::query_as(
        r#"
            INSERT INTO withdrawals (out_biz_no, actor_id, amount, status, created_at, updated_at)
            VALUES ($1, $2, $3, 'Pending', $4, $4)
            RETURNING *;
        "#,
    )
    .bind(out_biz_no)
    .bind(actor_id)
    .bind(amount.value())
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(withdrawal)
}

pub async fn fetch(out_biz_no: &str, conn: &mut SqliteConnection) -> Result<Option<Withdrawal>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM withdrawals WHERE out_biz_no = $1").bind(out_biz_no).fetch_optional(conn).await
}

pub async fn update(
    out_biz_no: &str,
    status: WithdrawalStatus,
    transfer_order_id: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<Withdrawal, SettlementDatabaseError> {
    sqlx::query_as(
        r#"
            UPDATE withdrawals
            SET status = $2, transfer_order_id = COALESCE($3, transfer_order_id), updated_at = $4
            WHERE out_biz_no = $1
            RETURNING *;
        "#,
    )
    .bind(out_biz_no)
    .bind(status)
    .bind(transfer_order_id)
    .bind(Utc::now())
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| SettlementDatabaseError::WithdrawalNotFound(out_biz_no.to_string()))
}
