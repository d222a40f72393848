use chrono::{DateTime, Utc};
use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{BusinessOrder, BusinessOrderStatus, NewBusinessOrder, OrderNumber},
    traits::SettlementDatabaseError,
};

pub async fn insert(
    order: NewBusinessOrder,
    conn: &mut SqliteConnection,
) -> Result<BusinessOrder, SettlementDatabaseError> {
    let now = Utc::now();
    let order: BusinessOrder = sqlx::query_as(
        r#"
            INSERT INTO business_orders (
                order_number,
                order_type,
                status,
                requester_id,
                agent_id,
                service_tier,
                amount,
                agent_fee,
                platform_fee,
                deadline_at,
                created_at,
                updated_at
            ) VALUES ($1, $2, 'PaymentPending', $3, $4, $5, $6, $7, $8, $9, $10, $10)
            RETURNING *;
        "#,
    )
    .bind(order.order_number)
    .bind(order.order_type)
    .bind(order.requester_id)
    .bind(order.agent_id)
    .bind(order.service_tier)
    .bind(order.amount.value())
    .bind(order.agent_fee.value())
    .bind(order.platform_fee.value())
    .bind(order.deadline_at)
    .bind(now)
    .fetch_one(conn)
    .await?;
    debug!("📝️ Business order [{}] inserted with id {}", order.order_number, order.id);
    Ok(order)
}

pub async fn fetch_by_order_number(
    order_number: &OrderNumber,
    conn: &mut SqliteConnection,
) -> Result<Option<BusinessOrder>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM business_orders WHERE order_number = $1")
        .bind(order_number.as_str())
        .fetch_optional(conn)
        .await
}

pub async fn update_status(
    order_number: &OrderNumber,
    status: BusinessOrderStatus,
    conn: &mut SqliteConnection,
) -> Result<BusinessOrder, SettlementDatabaseError> {
    sqlx::query_as("UPDATE business_orders SET status = $2, updated_at = $3 WHERE order_number = $1 RETURNING *")
        .bind(order_number.as_str())
        .bind(status)
        .bind(Utc::now())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| SettlementDatabaseError::BusinessOrderNotFound(order_number.clone()))
}

pub async fn set_refunding(
    order_number: &OrderNumber,
    conn: &mut SqliteConnection,
) -> Result<BusinessOrder, SettlementDatabaseError> {
    let now = Utc::now();
    sqlx::query_as(
        r#"
            UPDATE business_orders
            SET status = 'Refunding', refund_requested_at = $2, updated_at = $2
            WHERE order_number = $1
            RETURNING *;
        "#,
    )
    .bind(order_number.as_str())
    .bind(now)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| SettlementDatabaseError::BusinessOrderNotFound(order_number.clone()))
}

pub async fn set_locked(
    order_number: &OrderNumber,
    reason: &str,
    conn: &mut SqliteConnection,
) -> Result<BusinessOrder, SettlementDatabaseError> {
    sqlx::query_as(
        r#"
            UPDATE business_orders
            SET status = 'Locked', locked_reason = $2, updated_at = $3
            WHERE order_number = $1
            RETURNING *;
        "#,
    )
    .bind(order_number.as_str())
    .bind(reason)
    .bind(Utc::now())
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| SettlementDatabaseError::BusinessOrderNotFound(order_number.clone()))
}

pub async fn increment_timeout(
    order_number: &OrderNumber,
    conn: &mut SqliteConnection,
) -> Result<BusinessOrder, SettlementDatabaseError> {
    sqlx::query_as(
        "UPDATE business_orders SET timeout_count = timeout_count + 1, updated_at = $2 WHERE order_number = $1 \
         RETURNING *",
    )
    .bind(order_number.as_str())
    .bind(Utc::now())
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| SettlementDatabaseError::BusinessOrderNotFound(order_number.clone()))
}

/// Gives the order to an agent. Only orders sitting in the assignable pool can be taken.
pub async fn assign_agent(
    order_number: &OrderNumber,
    agent_id: &str,
    conn: &mut SqliteConnection,
) -> Result<BusinessOrder, SettlementDatabaseError> {
    let order = fetch_by_order_number(order_number, &mut *conn)
        .await?
        .ok_or_else(|| SettlementDatabaseError::BusinessOrderNotFound(order_number.clone()))?;
    if order.status != BusinessOrderStatus::Pending {
        return Err(SettlementDatabaseError::WrongOrderStatus {
            order_number: order_number.clone(),
            status: order.status,
            operation: "agent assignment".to_string(),
        });
    }
    sqlx::query_as(
        "UPDATE business_orders SET agent_id = $2, status = 'Assigned', updated_at = $3 WHERE order_number = $1 \
         RETURNING *",
    )
    .bind(order_number.as_str())
    .bind(agent_id)
    .bind(Utc::now())
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| SettlementDatabaseError::BusinessOrderNotFound(order_number.clone()))
}

/// Clears the agent assignment and returns the order to the assignable pool.
pub async fn reset_assignment(
    order_number: &OrderNumber,
    conn: &mut SqliteConnection,
) -> Result<BusinessOrder, SettlementDatabaseError> {
    sqlx::query_as(
        r#"
            UPDATE business_orders
            SET agent_id = NULL, status = 'Pending', updated_at = $2
            WHERE order_number = $1
            RETURNING *;
        "#,
    )
    .bind(order_number.as_str())
    .bind(Utc::now())
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| SettlementDatabaseError::BusinessOrderNotFound(order_number.clone()))
}

pub async fn fetch_overdue_active(
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<BusinessOrder>, sqlx::Error> {
    sqlx::query_as(
        r#"
            SELECT * FROM business_orders
            WHERE deadline_at IS NOT NULL AND deadline_at <= $1 AND status IN ('Assigned', 'InTransit')
            ORDER BY deadline_at;
        "#,
    )
    .bind(now)
    .fetch_all(conn)
    .await
}

pub async fn fetch_overdue_refunding(
    cutoff: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<BusinessOrder>, sqlx::Error> {
    sqlx::query_as(
        r#"
            SELECT * FROM business_orders
            WHERE status = 'Refunding' AND refund_requested_at IS NOT NULL AND refund_requested_at <= $1
            ORDER BY refund_requested_at;
        "#,
    )
    .bind(cutoff)
    .fetch_all(conn)
    .await
}

/// Copies the order into `archived_orders` and deletes the live row, in that order, so a fault can only ever leave
/// the order in both places, never in neither.
pub async fn archive(
    order_number: &OrderNumber,
    conn: &mut SqliteConnection,
) -> Result<(), SettlementDatabaseError> {
    let now = Utc::now();
    let result = sqlx::query(
        r#"
            INSERT INTO archived_orders (
                order_number, order_type, status, requester_id, agent_id, service_tier, amount, agent_fee,
                platform_fee, timeout_count, deadline_at, refund_requested_at, locked_reason, created_at,
                updated_at, archived_at
            )
            SELECT order_number, order_type, status, requester_id, agent_id, service_tier, amount, agent_fee,
                   platform_fee, timeout_count, deadline_at, refund_requested_at, locked_reason, created_at,
                   updated_at, $2
            FROM business_orders WHERE order_number = $1;
        "#,
    )
    .bind(order_number.as_str())
    .bind(now)
    .execute(&mut *conn)
    .await?;
    if result.rows_affected() == 0 {
        return Err(SettlementDatabaseError::BusinessOrderNotFound(order_number.clone()));
    }
    sqlx::query("DELETE FROM business_orders WHERE order_number = $1")
        .bind(order_number.as_str())
        .execute(&mut *conn)
        .await?;
    debug!("📝️ Business order [{order_number}] archived");
    Ok(())
}
