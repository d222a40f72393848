use std::{fmt::Debug, sync::Arc};

use chrono::Utc;
use log::*;
use paygate_tools::PayGateApi;

use crate::{
    db_types::{BusinessOrder, ServiceTier},
    events::{EventProducers, OrderReassignedEvent, PaymentOrderCancelledEvent},
    gse_api::{
        errors::SettlementApiError,
        objects::{RefundOutcome, SweepConfig, SweepSummary},
        refund_api::{RefundApi, RefundPolicy},
    },
    locks::LockManager,
    traits::{ReconcileOutcome, SettlementDatabase},
};

/// `SweeperApi` runs the periodic staleness passes, independent of notification traffic:
///
/// 1. Business orders past their fulfillment deadline are timed out: the counter increments, and the order is
///    either returned to the assignment pool or, at its service-tier archival threshold, moved to immutable
///    archive storage.
/// 2. `Refunding` orders older than the grace period have their refund driven.
/// 3. `Waiting` payment orders past their validity are cancelled, with a best-effort gateway trade close.
///
/// Per-order failures are caught individually so one bad order never blocks the rest of a sweep; a failed order
/// simply stays eligible for the next cycle.
pub struct SweeperApi<B, G> {
    db: B,
    gateway: G,
    producers: EventProducers,
    refunds: RefundApi<B, G>,
    config: SweepConfig,
}

impl<B, G> Debug for SweeperApi<B, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SweeperApi")
    }
}

impl<B: Clone, G: Clone> SweeperApi<B, G> {
    pub fn new(
        db: B,
        gateway: G,
        locks: Arc<LockManager>,
        producers: EventProducers,
        policy: RefundPolicy,
        config: SweepConfig,
    ) -> Self {
        let refunds = RefundApi::new(db.clone(), gateway.clone(), locks, producers.clone(), policy);
        Self { db, gateway, producers, refunds, config }
    }
}

impl<B, G> SweeperApi<B, G>
where
    B: SettlementDatabase,
    G: PayGateApi,
{
    pub async fn run_sweep(&self) -> Result<SweepSummary, SettlementApiError> {
        let now = Utc::now();
        let mut summary = SweepSummary::default();

        for order in self.db.fetch_overdue_active_orders(now).await? {
            if let Err(e) = self.handle_overdue(&order, &mut summary).await {
                error!("🕰️ Timeout handling failed for [{}]: {e}", order.order_number);
                summary.failures += 1;
            }
        }

        let cutoff = now - self.config.refund_grace;
        for order in self.db.fetch_overdue_refunding_orders(cutoff).await? {
            match self.refunds.process_refund(&order.order_number).await {
                Ok(RefundOutcome::Refunded(_)) => summary.refunds_completed += 1,
                Ok(RefundOutcome::Locked { .. }) => summary.refunds_locked += 1,
                Ok(RefundOutcome::Skipped { .. }) => {},
                Err(e) => {
                    // No in-cycle retry; the order stays Refunding and the next sweep picks it up again.
                    error!("🕰️ Sweep-driven refund failed for [{}]: {e}", order.order_number);
                    summary.failures += 1;
                },
            }
        }

        for payment in self.db.fetch_expired_waiting_orders(now).await? {
            match self.expire_payment_order(&payment.order_number).await {
                Ok(()) => summary.expired_payment_orders.push(payment.order_number),
                Err(e) => {
                    error!("🕰️ Could not expire payment order [{}]: {e}", payment.order_number);
                    summary.failures += 1;
                },
            }
        }

        Ok(summary)
    }

    async fn handle_overdue(
        &self,
        order: &BusinessOrder,
        summary: &mut SweepSummary,
    ) -> Result<(), SettlementApiError> {
        let updated = self.db.increment_timeout_counter(&order.order_number).await?;
        let threshold = match updated.service_tier {
            ServiceTier::Standard => self.config.standard_archive_threshold,
            ServiceTier::Expedited => self.config.expedited_archive_threshold,
        };
        if updated.timeout_count >= threshold {
            self.db.archive_business_order(&updated.order_number).await?;
            info!(
                "🕰️ [{}] hit its archival threshold ({threshold}) and was moved to the archive",
                updated.order_number
            );
            summary.archived.push(updated.order_number);
        } else {
            let previous_agent = updated.agent_id.clone();
            let reset = self.db.reset_assignment(&updated.order_number).await?;
            info!(
                "🕰️ [{}] timed out ({} of {threshold}); assignment cleared, order is available again",
                reset.order_number, reset.timeout_count
            );
            for producer in &self.producers.order_reassigned_producer {
                producer
                    .publish_event(OrderReassignedEvent {
                        order: reset.clone(),
                        previous_agent: previous_agent.clone(),
                    })
                    .await;
            }
            summary.reassigned.push(reset.order_number);
        }
        Ok(())
    }

    async fn expire_payment_order(
        &self,
        order_number: &crate::db_types::OrderNumber,
    ) -> Result<(), SettlementApiError> {
        let outcome = self.db.cancel_payment_order(order_number).await?;
        if let ReconcileOutcome::Cancelled { payment, business } = outcome {
            // The gateway-side trade may still be open; closing it is best-effort.
            if let Err(e) = self.gateway.close_trade(payment.order_number.as_str()).await {
                warn!("🕰️ Could not close gateway trade for expired order [{}]: {e}", payment.order_number);
            }
            for producer in &self.producers.order_cancelled_producer {
                producer
                    .publish_event(PaymentOrderCancelledEvent {
                        payment: payment.clone(),
                        business: business.clone(),
                    })
                    .await;
            }
        }
        Ok(())
    }
}
