//! `SqliteDatabase` is the concrete SQLite backend for the settlement engine.
//!
//! The reconciliation transitions each run inside a single transaction: the current ledger status is re-read there
//! (the second idempotency layer behind the event-key store), the guard is evaluated, and the order-family side
//! effect executes on the same connection. A failure anywhere rolls the whole unit back, so `Paid` is never visible
//! with a silently-failed fulfilment hook.
use std::fmt::Debug;

use chrono::{DateTime, Duration, Utc};
use gsp_common::Money;
use log::*;
use sqlx::SqlitePool;

use super::db::{business_orders, fulfilment, idempotency, new_pool, payment_orders, wallets, withdrawals};
use crate::{
    db_types::{
        BusinessOrder,
        BusinessOrderStatus,
        NewBusinessOrder,
        NewPaymentOrder,
        OrderNumber,
        PaymentOrder,
        PaymentOrderStatus,
        Wallet,
        Withdrawal,
        WithdrawalStatus,
    },
    traits::{ClaimOutcome, ReconcileOutcome, SettlementDatabase, SettlementDatabaseError},
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, SettlementDatabaseError> {
        let pool = new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl SettlementDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn create_or_reuse_payment_order(
        &self,
        order: NewPaymentOrder,
    ) -> Result<(PaymentOrder, bool), SettlementDatabaseError> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();
        if let Some(existing) = payment_orders::fetch_waiting(order.order_type, &order.reference, &mut tx).await? {
            if existing.expires_at > now {
                debug!("🗃️ Reusing live payment order [{}] for {}", existing.order_number, existing.reference);
                tx.commit().await?;
                return Ok((existing, false));
            }
            // A lapsed intent still holds the one-Waiting-per-reference slot; retire it before inserting.
            payment_orders::update_status(
                &existing.order_number,
                PaymentOrderStatus::Waiting,
                PaymentOrderStatus::Cancelled,
                &mut tx,
            )
            .await?;
            debug!("🗃️ Expired payment order [{}] cancelled on reuse", existing.order_number);
        }
        let created = payment_orders::insert(order, &mut tx).await?;
        tx.commit().await?;
        Ok((created, true))
    }

    async fn attach_pay_url(
        &self,
        order_number: &OrderNumber,
        pay_url: &str,
    ) -> Result<PaymentOrder, SettlementDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        payment_orders::set_pay_url(order_number, pay_url, &mut conn).await
    }

    async fn fetch_payment_order(
        &self,
        order_number: &OrderNumber,
    ) -> Result<Option<PaymentOrder>, SettlementDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        Ok(payment_orders::fetch_by_order_number(order_number, &mut conn).await?)
    }

    async fn confirm_payment_order(
        &self,
        order_number: &OrderNumber,
        trade_no: &str,
    ) -> Result<ReconcileOutcome, SettlementDatabaseError> {
        let mut tx = self.pool.begin().await?;
        let order = payment_orders::fetch_by_order_number(order_number, &mut tx)
            .await?
            .ok_or_else(|| SettlementDatabaseError::PaymentOrderNotFound(order_number.clone()))?;
        if order.status.is_past_waiting() {
            debug!("🗃️ Payment confirmation for [{order_number}] is stale; ledger is already {}", order.status);
            return Ok(ReconcileOutcome::Stale { order_number: order.order_number, status: order.status });
        }
        let payment = payment_orders::mark_paid(order_number, trade_no, &mut tx).await?;
        let business = fulfilment::advance_on_payment(&payment.reference, &mut tx).await?;
        tx.commit().await?;
        info!("🗃️ Payment order [{order_number}] marked Paid; {} advanced to {}", business.order_number, business.status);
        Ok(ReconcileOutcome::Paid { payment, business })
    }

    async fn cancel_payment_order(
        &self,
        order_number: &OrderNumber,
    ) -> Result<ReconcileOutcome, SettlementDatabaseError> {
        let mut tx = self.pool.begin().await?;
        let order = payment_orders::fetch_by_order_number(order_number, &mut tx)
            .await?
            .ok_or_else(|| SettlementDatabaseError::PaymentOrderNotFound(order_number.clone()))?;
        if order.status.is_past_waiting() {
            debug!("🗃️ Trade close for [{order_number}] is stale; ledger is already {}", order.status);
            return Ok(ReconcileOutcome::Stale { order_number: order.order_number, status: order.status });
        }
        let payment = payment_orders::update_status(
            order_number,
            PaymentOrderStatus::Waiting,
            PaymentOrderStatus::Cancelled,
            &mut tx,
        )
        .await?;
        let business = fulfilment::cancel_on_trade_close(&payment.reference, &mut tx).await?;
        tx.commit().await?;
        info!("🗃️ Payment order [{order_number}] cancelled");
        Ok(ReconcileOutcome::Cancelled { payment, business })
    }

    async fn refund_payment_order(
        &self,
        order_number: &OrderNumber,
    ) -> Result<ReconcileOutcome, SettlementDatabaseError> {
        let mut tx = self.pool.begin().await?;
        let order = payment_orders::fetch_by_order_number(order_number, &mut tx)
            .await?
            .ok_or_else(|| SettlementDatabaseError::PaymentOrderNotFound(order_number.clone()))?;
        if order.status != PaymentOrderStatus::Paid {
            debug!("🗃️ Refund confirmation for [{order_number}] is a no-op; ledger is {}", order.status);
            return Ok(ReconcileOutcome::Stale { order_number: order.order_number, status: order.status });
        }
        let payment = payment_orders::update_status(
            order_number,
            PaymentOrderStatus::Paid,
            PaymentOrderStatus::Refunded,
            &mut tx,
        )
        .await?;
        let business = fulfilment::settle_on_refund(&payment.reference, &mut tx).await?;
        tx.commit().await?;
        info!("🗃️ Payment order [{order_number}] refunded");
        Ok(ReconcileOutcome::Refunded { payment, business })
    }

    async fn claim_event_key(&self, key: &str, validity: Duration) -> Result<ClaimOutcome, SettlementDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        idempotency::claim(key, validity, &mut conn).await
    }

    async fn complete_event_key(&self, key: &str) -> Result<(), SettlementDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        idempotency::complete(key, &mut conn).await
    }

    async fn fail_event_key(&self, key: &str) -> Result<(), SettlementDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        idempotency::fail(key, &mut conn).await
    }

    async fn insert_business_order(&self, order: NewBusinessOrder) -> Result<BusinessOrder, SettlementDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        business_orders::insert(order, &mut conn).await
    }

    async fn fetch_business_order(
        &self,
        order_number: &OrderNumber,
    ) -> Result<Option<BusinessOrder>, SettlementDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        Ok(business_orders::fetch_by_order_number(order_number, &mut conn).await?)
    }

    async fn assign_agent(
        &self,
        order_number: &OrderNumber,
        agent_id: &str,
    ) -> Result<BusinessOrder, SettlementDatabaseError> {
        let mut tx = self.pool.begin().await?;
        let order = business_orders::assign_agent(order_number, agent_id, &mut tx).await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn begin_refund(&self, order_number: &OrderNumber) -> Result<BusinessOrder, SettlementDatabaseError> {
        let mut tx = self.pool.begin().await?;
        let order = business_orders::fetch_by_order_number(order_number, &mut tx)
            .await?
            .ok_or_else(|| SettlementDatabaseError::BusinessOrderNotFound(order_number.clone()))?;
        let refundable = matches!(
            order.status,
            BusinessOrderStatus::Pending
                | BusinessOrderStatus::Assigned
                | BusinessOrderStatus::InTransit
                | BusinessOrderStatus::Delivered
        );
        if !refundable {
            return Err(SettlementDatabaseError::WrongOrderStatus {
                order_number: order_number.clone(),
                status: order.status,
                operation: "refund request".to_string(),
            });
        }
        let updated = business_orders::set_refunding(order_number, &mut tx).await?;
        tx.commit().await?;
        Ok(updated)
    }

    async fn lock_business_order(
        &self,
        order_number: &OrderNumber,
        reason: &str,
    ) -> Result<BusinessOrder, SettlementDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        let order = business_orders::set_locked(order_number, reason, &mut conn).await?;
        warn!("🗃️ Business order [{order_number}] locked: {reason}");
        Ok(order)
    }

    async fn finalize_refund(
        &self,
        order_number: &OrderNumber,
    ) -> Result<(BusinessOrder, Option<PaymentOrder>), SettlementDatabaseError> {
        let mut tx = self.pool.begin().await?;
        let order = business_orders::fetch_by_order_number(order_number, &mut tx)
            .await?
            .ok_or_else(|| SettlementDatabaseError::BusinessOrderNotFound(order_number.clone()))?;
        if order.status != BusinessOrderStatus::Refunding {
            return Err(SettlementDatabaseError::WrongOrderStatus {
                order_number: order_number.clone(),
                status: order.status,
                operation: "refund finalization".to_string(),
            });
        }
        let business = business_orders::update_status(order_number, BusinessOrderStatus::Refunded, &mut tx).await?;
        // Retire the Paid ledger row alongside. The payment order references this business order.
        let payment = match payment_orders::fetch_paid_for_reference(order_number, &mut tx).await? {
            Some(paid) => Some(
                payment_orders::update_status(
                    &paid.order_number,
                    PaymentOrderStatus::Paid,
                    PaymentOrderStatus::Refunded,
                    &mut tx,
                )
                .await?,
            ),
            None => None,
        };
        tx.commit().await?;
        info!("🗃️ Business order [{order_number}] refunded");
        Ok((business, payment))
    }

    async fn fetch_overdue_active_orders(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<BusinessOrder>, SettlementDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        Ok(business_orders::fetch_overdue_active(now, &mut conn).await?)
    }

    async fn fetch_overdue_refunding_orders(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<BusinessOrder>, SettlementDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        Ok(business_orders::fetch_overdue_refunding(cutoff, &mut conn).await?)
    }

    async fn fetch_expired_waiting_orders(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<PaymentOrder>, SettlementDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        Ok(payment_orders::fetch_expired_waiting(now, &mut conn).await?)
    }

    async fn increment_timeout_counter(
        &self,
        order_number: &OrderNumber,
    ) -> Result<BusinessOrder, SettlementDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        business_orders::increment_timeout(order_number, &mut conn).await
    }

    async fn reset_assignment(&self, order_number: &OrderNumber) -> Result<BusinessOrder, SettlementDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        business_orders::reset_assignment(order_number, &mut conn).await
    }

    async fn archive_business_order(&self, order_number: &OrderNumber) -> Result<(), SettlementDatabaseError> {
        let mut tx = self.pool.begin().await?;
        business_orders::archive(order_number, &mut tx).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn fetch_wallet(&self, actor_id: &str) -> Result<Option<Wallet>, SettlementDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        Ok(wallets::fetch(actor_id, &mut conn).await?)
    }

    async fn credit_wallet(&self, actor_id: &str, amount: Money) -> Result<Wallet, SettlementDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        wallets::credit(actor_id, amount, &mut conn).await
    }

    async fn credit_wallet_pending(&self, actor_id: &str, amount: Money) -> Result<Wallet, SettlementDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        wallets::credit_pending(actor_id, amount, &mut conn).await
    }

    async fn debit_wallet(&self, actor_id: &str, amount: Money) -> Result<Wallet, SettlementDatabaseError> {
        let mut tx = self.pool.begin().await?;
        let wallet = wallets::debit(actor_id, amount, &mut tx).await?;
        tx.commit().await?;
        Ok(wallet)
    }

    async fn insert_withdrawal(
        &self,
        out_biz_no: &str,
        actor_id: &str,
        amount: Money,
    ) -> Result<Withdrawal, SettlementDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        withdrawals::insert(out_biz_no, actor_id, amount, &mut conn).await
    }

    async fn update_withdrawal(
        &self,
        out_biz_no: &str,
        status: WithdrawalStatus,
        transfer_order_id: Option<&str>,
    ) -> Result<Withdrawal, SettlementDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        withdrawals::update(out_biz_no, status, transfer_order_id, &mut conn).await
    }

    async fn fetch_withdrawal(&self, out_biz_no: &str) -> Result<Option<Withdrawal>, SettlementDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        Ok(withdrawals::fetch(out_biz_no, &mut conn).await?)
    }

    async fn close(&mut self) -> Result<(), SettlementDatabaseError> {
        self.pool.close().await;
        Ok(())
    }
}
