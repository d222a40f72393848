use chrono::Utc;
use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewPaymentOrder, OrderNumber, OrderType, PaymentOrder, PaymentOrderStatus},
    traits::SettlementDatabaseError,
};

/// Inserts a new payment order. The partial unique index on `(order_type, reference) WHERE status = 'Waiting'`
/// rejects the insert if a live intent already exists, so callers must resolve any existing `Waiting` row first.
pub async fn insert(
    order: NewPaymentOrder,
    conn: &mut SqliteConnection,
) -> Result<PaymentOrder, SettlementDatabaseError> {
    let now = Utc::now();
    let order: PaymentOrder = sqlx::query_as(
        r#"
            INSERT INTO payment_orders (
                order_number,
                order_type,
                reference,
                amount,
                status,
                created_at,
                expires_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, 'Waiting', $5, $6, $5)
            RETURNING *;
        "#,
    )
    .bind(order.order_number)
    .bind(order.order_type)
    .bind(order.reference)
    .bind(order.amount.value())
    .bind(now)
    .bind(order.expires_at)
    .fetch_one(conn)
    .await?;
    debug!("📝️ Payment order [{}] inserted with id {}", order.order_number, order.id);
    Ok(order)
}

pub async fn fetch_by_order_number(
    order_number: &OrderNumber,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentOrder>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM payment_orders WHERE order_number = $1")
        .bind(order_number.as_str())
        .fetch_optional(conn)
        .await
}

/// The `Waiting` row for the given `(order_type, reference)`, if any. At most one can exist.
pub async fn fetch_waiting(
    order_type: OrderType,
    reference: &OrderNumber,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentOrder>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM payment_orders WHERE order_type = $1 AND reference = $2 AND status = 'Waiting'")
        .bind(order_type)
        .bind(reference.as_str())
        .fetch_optional(conn)
        .await
}

pub async fn set_pay_url(
    order_number: &OrderNumber,
    pay_url: &str,
    conn: &mut SqliteConnection,
) -> Result<PaymentOrder, SettlementDatabaseError> {
    sqlx::query_as("UPDATE payment_orders SET pay_url = $2, updated_at = $3 WHERE order_number = $1 RETURNING *")
        .bind(order_number.as_str())
        .bind(pay_url)
        .bind(Utc::now())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| SettlementDatabaseError::PaymentOrderNotFound(order_number.clone()))
}

/// `Waiting` → `Paid`, stamping `paid_at` and the provider trade id. The status predicate in the statement keeps
/// this correct even if a competing transition slipped in after the caller's re-read.
pub async fn mark_paid(
    order_number: &OrderNumber,
    trade_no: &str,
    conn: &mut SqliteConnection,
) -> Result<PaymentOrder, SettlementDatabaseError> {
    let now = Utc::now();
    sqlx::query_as(
        r#"
            UPDATE payment_orders
            SET status = 'Paid', provider_trade_id = $2, paid_at = $3, updated_at = $3
            WHERE order_number = $1 AND status = 'Waiting'
            RETURNING *;
        "#,
    )
    .bind(order_number.as_str())
    .bind(trade_no)
    .bind(now)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| SettlementDatabaseError::PaymentOrderNotFound(order_number.clone()))
}

pub async fn update_status(
    order_number: &OrderNumber,
    from: PaymentOrderStatus,
    to: PaymentOrderStatus,
    conn: &mut SqliteConnection,
) -> Result<PaymentOrder, SettlementDatabaseError> {
    sqlx::query_as(
        "UPDATE payment_orders SET status = $3, updated_at = $4 WHERE order_number = $1 AND status = $2 RETURNING *",
    )
    .bind(order_number.as_str())
    .bind(from)
    .bind(to)
    .bind(Utc::now())
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| SettlementDatabaseError::PaymentOrderNotFound(order_number.clone()))
}

/// The `Paid` payment order settling the given business order, if any. Used when a wallet-funded refund retires
/// the ledger row alongside the business order.
pub async fn fetch_paid_for_reference(
    reference: &OrderNumber,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentOrder>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM payment_orders WHERE reference = $1 AND status = 'Paid' ORDER BY paid_at DESC LIMIT 1")
        .bind(reference.as_str())
        .fetch_optional(conn)
        .await
}

pub async fn fetch_expired_waiting(
    now: chrono::DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<PaymentOrder>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM payment_orders WHERE status = 'Waiting' AND expires_at <= $1 ORDER BY expires_at")
        .bind(now)
        .fetch_all(conn)
        .await
}
