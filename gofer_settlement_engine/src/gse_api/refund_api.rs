use std::{fmt::Debug, sync::Arc};

use gsp_common::Money;
use log::*;
use paygate_tools::{PayGateApi, Payee, TransferStatus};

use crate::{
    db_types::{BusinessOrder, BusinessOrderStatus, OrderNumber, Withdrawal, WithdrawalStatus},
    events::{EventProducers, OrderLockedEvent, OrderRefundedEvent, WithdrawalFailedEvent},
    gse_api::{
        errors::SettlementApiError,
        objects::{RefundOutcome, WithdrawalOutcome},
    },
    locks::LockManager,
    traits::{SettlementDatabase, SettlementDatabaseError},
};

const MAX_TRANSFER_ATTEMPTS: u32 = 3;
const TRANSFER_RETRY_BASE_DELAY: std::time::Duration = std::time::Duration::from_millis(250);

/// Tunables for the refund workflow.
#[derive(Debug, Clone, Copy)]
pub struct RefundPolicy {
    /// When set, refunds additionally return a platform-funded share of the platform fee to the payer.
    pub full_refund: bool,
    /// Percentage of the platform fee transferred under the full-refund policy.
    pub platform_share_percent: u8,
}

impl Default for RefundPolicy {
    fn default() -> Self {
        Self { full_refund: false, platform_share_percent: 0 }
    }
}

/// `RefundApi` owns the balance-checked fund movements: wallet-funded refunds of business orders, and agent
/// cash-outs through the gateway.
pub struct RefundApi<B, G> {
    db: B,
    gateway: G,
    locks: Arc<LockManager>,
    producers: EventProducers,
    policy: RefundPolicy,
}

impl<B, G> Debug for RefundApi<B, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RefundApi")
    }
}

impl<B: Clone, G: Clone> Clone for RefundApi<B, G> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            gateway: self.gateway.clone(),
            locks: Arc::clone(&self.locks),
            producers: self.producers.clone(),
            policy: self.policy,
        }
    }
}

impl<B, G> RefundApi<B, G> {
    pub fn new(db: B, gateway: G, locks: Arc<LockManager>, producers: EventProducers, policy: RefundPolicy) -> Self {
        Self { db, gateway, locks, producers, policy }
    }
}

impl<B, G> RefundApi<B, G>
where
    B: SettlementDatabase,
    G: PayGateApi,
{
    /// Moves an order into `Refunding`. The actual fund movement happens in [`Self::process_refund`], driven
    /// immediately by the caller or later by the sweeper.
    pub async fn request_refund(&self, order_number: &OrderNumber) -> Result<BusinessOrder, SettlementApiError> {
        let order = self.db.begin_refund(order_number).await?;
        info!("↩️ Refund requested for business order [{order_number}]");
        Ok(order)
    }

    /// Executes the refund of a `Refunding` business order.
    ///
    /// The refund amount is the agent's entitled income share (`agent_fee`), not the payer's full amount. Business
    /// rule violations (no agent, insufficient agent funds) freeze the order in `Locked` with a notification and
    /// leave every wallet untouched; they are not errors and will not be retried automatically.
    pub async fn process_refund(&self, order_number: &OrderNumber) -> Result<RefundOutcome, SettlementApiError> {
        let _guard = self.locks.acquire(order_number.as_str()).await?;
        let order = self
            .db
            .fetch_business_order(order_number)
            .await?
            .ok_or_else(|| SettlementDatabaseError::BusinessOrderNotFound(order_number.clone()))?;
        if order.status != BusinessOrderStatus::Refunding {
            debug!("↩️ [{order_number}] is {}, nothing to refund", order.status);
            return Ok(RefundOutcome::Skipped { order_number: order_number.clone(), status: order.status });
        }
        let agent_id = match &order.agent_id {
            Some(agent) => agent.clone(),
            None => {
                return self.lock_with_reason(&order, "refund requires an assigned agent, but none is set").await;
            },
        };
        let refund_amount = order.agent_fee;
        let available = self.db.fetch_wallet(&agent_id).await?.map(|w| w.available()).unwrap_or_default();
        if available < refund_amount {
            let reason =
                format!("agent {agent_id} holds {available}, which does not cover the {refund_amount} refund");
            return self.lock_with_reason(&order, &reason).await;
        }
        match self.db.debit_wallet(&agent_id, refund_amount).await {
            Ok(_) => {},
            Err(SettlementDatabaseError::InsufficientFunds { available, required, .. }) => {
                // The balance moved between the check and the debit. Same treatment as the up-front check.
                let reason = format!("agent {agent_id} holds {available}, which does not cover the {required} refund");
                return self.lock_with_reason(&order, &reason).await;
            },
            Err(e) => return Err(e.into()),
        }
        if let Err(e) = self.db.credit_wallet(&order.requester_id, refund_amount).await {
            error!("↩️ Crediting {} failed after debiting {agent_id}; compensating. {e}", order.requester_id);
            if let Err(e2) = self.db.credit_wallet(&agent_id, refund_amount).await {
                error!(
                    "↩️ Compensation failed as well; wallet {agent_id} is short {refund_amount} and needs manual \
                     repair. {e2}"
                );
            }
            let reason = format!("payer credit failed; refund rolled back: {e}");
            return self.lock_with_reason(&order, &reason).await;
        }
        if self.policy.full_refund && self.policy.platform_share_percent > 0 {
            self.transfer_platform_share(&order).await;
        }
        let (business, _) = self.db.finalize_refund(order_number).await?;
        for producer in &self.producers.order_refunded_producer {
            producer.publish_event(OrderRefundedEvent { order: business.clone(), amount: refund_amount }).await;
        }
        info!("↩️ Refund of {refund_amount} for [{order_number}] complete");
        Ok(RefundOutcome::Refunded(business))
    }

    async fn lock_with_reason(
        &self,
        order: &BusinessOrder,
        reason: &str,
    ) -> Result<RefundOutcome, SettlementApiError> {
        let locked = self.db.lock_business_order(&order.order_number, reason).await?;
        for producer in &self.producers.order_locked_producer {
            producer.publish_event(OrderLockedEvent { order: locked.clone(), reason: reason.to_string() }).await;
        }
        Ok(RefundOutcome::Locked { order: locked, reason: reason.to_string() })
    }

    /// Best-effort platform-funded partial refund under the full-refund policy. The `out_biz_no` is derived from
    /// the order number, so a repeated attempt after a fault cannot pay the share twice.
    async fn transfer_platform_share(&self, order: &BusinessOrder) {
        let share = order.platform_fee.percent(self.policy.platform_share_percent);
        if share.is_zero() {
            return;
        }
        let out_biz_no = format!("pr-{}", order.order_number);
        let payee = Payee { actor_id: order.requester_id.clone(), account: order.requester_id.clone() };
        match self.gateway.transfer_funds(&out_biz_no, share, &payee).await {
            Ok(result) => {
                debug!("↩️ Platform share {share} for [{}] transferred ({})", order.order_number, result.status)
            },
            Err(e) => warn!("↩️ Platform share transfer for [{}] did not go through: {e}", order.order_number),
        }
    }

    /// Agent cash-out. The wallet is debited first; the gateway transfer retries transient faults with backed-off
    /// attempts (safe because the gateway deduplicates on `out_biz_no`), and any definitive failure credits the
    /// amount straight back.
    pub async fn request_withdrawal(
        &self,
        actor_id: &str,
        amount: Money,
        account: &str,
    ) -> Result<WithdrawalOutcome, SettlementApiError> {
        self.db.debit_wallet(actor_id, amount).await?;
        let out_biz_no = format!("wd-{:016x}", rand::random::<u64>());
        let withdrawal = self.db.insert_withdrawal(&out_biz_no, actor_id, amount).await?;
        info!("💸️ Withdrawal {out_biz_no} of {amount} requested by {actor_id}");
        let payee = Payee { actor_id: actor_id.to_string(), account: account.to_string() };
        let mut attempt = 0;
        let result = loop {
            attempt += 1;
            match self.gateway.transfer_funds(&out_biz_no, amount, &payee).await {
                Ok(result) => break Ok(result),
                Err(e) if e.is_transient() && attempt < MAX_TRANSFER_ATTEMPTS => {
                    warn!("💸️ Transient fault on transfer {out_biz_no} (attempt {attempt}), retrying: {e}");
                    tokio::time::sleep(TRANSFER_RETRY_BASE_DELAY * 2u32.pow(attempt - 1)).await;
                },
                Err(e) => break Err(e),
            }
        };
        match result {
            Ok(result) if result.status == TransferStatus::Failed => {
                self.refund_failed_withdrawal(&withdrawal, Some(&result.transfer_order_id), "gateway reported FAILED")
                    .await
            },
            Ok(result) => {
                let status = match result.status {
                    TransferStatus::Succeeded => WithdrawalStatus::Confirmed,
                    _ => WithdrawalStatus::Pending,
                };
                let withdrawal =
                    self.db.update_withdrawal(&out_biz_no, status, Some(&result.transfer_order_id)).await?;
                info!("💸️ Withdrawal {out_biz_no} accepted by the gateway ({})", result.status);
                Ok(WithdrawalOutcome::Accepted { withdrawal })
            },
            Err(e) => self.refund_failed_withdrawal(&withdrawal, None, &e.to_string()).await,
        }
    }

    /// Settles a withdrawal from an asynchronous fund-transfer-changed notification. Idempotent: a withdrawal
    /// already out of `Pending` is left alone.
    pub async fn settle_withdrawal(
        &self,
        out_biz_no: &str,
        status: TransferStatus,
        transfer_order_id: Option<&str>,
    ) -> Result<Option<Withdrawal>, SettlementApiError> {
        let withdrawal = match self.db.fetch_withdrawal(out_biz_no).await? {
            Some(w) => w,
            None => {
                warn!("💸️ Transfer notification for unknown out_biz_no {out_biz_no}");
                return Ok(None);
            },
        };
        if withdrawal.status != WithdrawalStatus::Pending {
            debug!("💸️ Withdrawal {out_biz_no} is already {}, ignoring notification", withdrawal.status);
            return Ok(Some(withdrawal));
        }
        let settled = match status {
            TransferStatus::Succeeded => {
                self.db.update_withdrawal(out_biz_no, WithdrawalStatus::Confirmed, transfer_order_id).await?
            },
            TransferStatus::Failed => {
                match self.refund_failed_withdrawal(&withdrawal, transfer_order_id, "gateway reported FAILED").await?
                {
                    WithdrawalOutcome::Failed { withdrawal, .. } | WithdrawalOutcome::Accepted { withdrawal } => {
                        withdrawal
                    },
                }
            },
            TransferStatus::Processing => withdrawal,
        };
        Ok(Some(settled))
    }

    async fn refund_failed_withdrawal(
        &self,
        withdrawal: &Withdrawal,
        transfer_order_id: Option<&str>,
        reason: &str,
    ) -> Result<WithdrawalOutcome, SettlementApiError> {
        error!("💸️ Withdrawal {} failed: {reason}. Returning {} to {}", withdrawal.out_biz_no, withdrawal.amount,
            withdrawal.actor_id);
        self.db.credit_wallet(&withdrawal.actor_id, withdrawal.amount).await?;
        let updated =
            self.db.update_withdrawal(&withdrawal.out_biz_no, WithdrawalStatus::Failed, transfer_order_id).await?;
        for producer in &self.producers.withdrawal_failed_producer {
            producer
                .publish_event(WithdrawalFailedEvent {
                    actor_id: withdrawal.actor_id.clone(),
                    amount: withdrawal.amount,
                    reason: reason.to_string(),
                })
                .await;
        }
        Ok(WithdrawalOutcome::Failed { withdrawal: updated, reason: reason.to_string() })
    }
}
