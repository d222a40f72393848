//! Order-family side effects of ledger transitions.
//!
//! The dispatch over [`OrderType`] is a closed three-way selection: each arm advances only its own order family.
//! Every function here runs on the caller's connection, which in practice is the same transaction that mutates the
//! payment-order ledger, so a failure in any arm rolls the whole transition back.
use log::{debug, warn};
use sqlx::SqliteConnection;

use crate::{
    db_types::{BusinessOrder, BusinessOrderStatus, OrderNumber, OrderType},
    sqlite::db::business_orders,
    traits::SettlementDatabaseError,
};

/// Advances a business order out of `PaymentPending` after its payment order was confirmed.
pub async fn advance_on_payment(
    reference: &OrderNumber,
    conn: &mut SqliteConnection,
) -> Result<BusinessOrder, SettlementDatabaseError> {
    let order = business_orders::fetch_by_order_number(reference, conn)
        .await?
        .ok_or_else(|| SettlementDatabaseError::BusinessOrderNotFound(reference.clone()))?;
    if order.status != BusinessOrderStatus::PaymentPending {
        return Err(SettlementDatabaseError::WrongOrderStatus {
            order_number: reference.clone(),
            status: order.status,
            operation: "post-payment advance".to_string(),
        });
    }
    let next = match order.order_type {
        // A parcel with a pre-arranged courier skips the assignment pool.
        OrderType::Parcel if order.agent_id.is_some() => BusinessOrderStatus::Assigned,
        OrderType::Parcel => BusinessOrderStatus::Pending,
        OrderType::Shopping => BusinessOrderStatus::Pending,
        OrderType::PurchaseRequest => BusinessOrderStatus::Pending,
    };
    debug!("🧭️ {} order [{reference}] advances PaymentPending → {next}", order.order_type);
    business_orders::update_status(reference, next, conn).await
}

/// Cancels a business order whose payment intent was closed without payment. Orders already past `PaymentPending`
/// are left untouched; the payment must have landed through another path and the close event is stale news.
pub async fn cancel_on_trade_close(
    reference: &OrderNumber,
    conn: &mut SqliteConnection,
) -> Result<Option<BusinessOrder>, SettlementDatabaseError> {
    let order = match business_orders::fetch_by_order_number(reference, conn).await? {
        Some(order) => order,
        None => {
            warn!("🧭️ Trade close for [{reference}], but no business order references it");
            return Ok(None);
        },
    };
    if order.status != BusinessOrderStatus::PaymentPending {
        debug!("🧭️ [{reference}] is {}, leaving it alone on trade close", order.status);
        return Ok(Some(order));
    }
    let updated = business_orders::update_status(reference, BusinessOrderStatus::Cancelled, conn).await?;
    Ok(Some(updated))
}

/// Marks a business order refunded after the gateway confirmed a refund. Only `Refunding` orders move; anything
/// else is logged and left for a human.
pub async fn settle_on_refund(
    reference: &OrderNumber,
    conn: &mut SqliteConnection,
) -> Result<Option<BusinessOrder>, SettlementDatabaseError> {
    let order = match business_orders::fetch_by_order_number(reference, conn).await? {
        Some(order) => order,
        None => {
            warn!("🧭️ Refund confirmation for [{reference}], but no business order references it");
            return Ok(None);
        },
    };
    if order.status != BusinessOrderStatus::Refunding {
        debug!("🧭️ [{reference}] is {}, not Refunding; leaving it alone on refund confirmation", order.status);
        return Ok(Some(order));
    }
    let updated = business_orders::update_status(reference, BusinessOrderStatus::Refunded, conn).await?;
    Ok(Some(updated))
}
