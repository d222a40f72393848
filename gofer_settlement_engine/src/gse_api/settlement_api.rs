use std::{fmt::Debug, sync::Arc};

use chrono::Duration;
use log::*;
use paygate_tools::{PayGateApi, PayGateError};

use crate::{
    db_types::{BusinessOrderStatus, NewPaymentOrder, OrderNumber, OrderType},
    events::{EventProducers, PaymentOrderCancelledEvent, PaymentOrderPaidEvent},
    gse_api::{
        errors::SettlementApiError,
        objects::{PayableOrder, PaymentStatusCheck, TradeEvent},
    },
    locks::LockManager,
    traits::{ClaimOutcome, ReconcileOutcome, SettlementDatabase},
};

const DEFAULT_PAYMENT_VALIDITY_MINUTES: i64 = 30;
const DEFAULT_EVENT_KEY_VALIDITY_MINUTES: i64 = 5;
const QUERY_ATTEMPTS: u32 = 2;
const QUERY_RETRY_DELAY: std::time::Duration = std::time::Duration::from_millis(200);

/// `SettlementFlowApi` is the primary API for creating payment orders and reconciling gateway events against them.
///
/// Push (webhook/message) and pull (status query) traffic both funnel into [`Self::apply_trade_event`], so both
/// enjoy the same idempotency guarantee: the event-key store filters duplicates before the call, and the ledger
/// transition re-reads current status inside its failure-atomic unit to absorb anything that slipped through.
pub struct SettlementFlowApi<B, G> {
    db: B,
    gateway: G,
    locks: Arc<LockManager>,
    producers: EventProducers,
    payment_validity: Duration,
    event_key_validity: Duration,
}

impl<B, G> Debug for SettlementFlowApi<B, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SettlementFlowApi")
    }
}

impl<B, G> SettlementFlowApi<B, G> {
    pub fn new(db: B, gateway: G, locks: Arc<LockManager>, producers: EventProducers) -> Self {
        Self {
            db,
            gateway,
            locks,
            producers,
            payment_validity: Duration::minutes(DEFAULT_PAYMENT_VALIDITY_MINUTES),
            event_key_validity: Duration::minutes(DEFAULT_EVENT_KEY_VALIDITY_MINUTES),
        }
    }

    pub fn with_payment_validity(mut self, validity: Duration) -> Self {
        self.payment_validity = validity;
        self
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn db_mut(&mut self) -> &mut B {
        &mut self.db
    }
}

impl<B, G> SettlementFlowApi<B, G>
where
    B: SettlementDatabase,
    G: PayGateApi,
{
    /// Returns a payable artifact for the business order `reference`, creating the payment order if no live one
    /// exists.
    ///
    /// The whole check-then-insert runs under the reference lock, so concurrent calls for the same reference
    /// serialize and every caller receives the same order number. A cached artifact is served as-is; asking the
    /// gateway again for a live order could mint a second gateway-side trade record. If the gateway call fails
    /// after the row was persisted, the error surfaces to the caller but the row remains the source of truth: the
    /// next call reuses it and mints the artifact then.
    pub async fn create_or_get_payment_order(
        &self,
        order_type: OrderType,
        reference: &OrderNumber,
        amount: gsp_common::Money,
    ) -> Result<PayableOrder, SettlementApiError> {
        let business = self
            .db
            .fetch_business_order(reference)
            .await?
            .ok_or_else(|| crate::traits::SettlementDatabaseError::BusinessOrderNotFound(reference.clone()))?;
        if business.status != BusinessOrderStatus::PaymentPending {
            return Err(SettlementApiError::NotPayable(reference.clone()));
        }
        let _guard = self.locks.acquire(reference.as_str()).await?;
        let new_order = NewPaymentOrder::new(order_type, reference.clone(), amount, self.payment_validity);
        let (order, created) = self.db.create_or_reuse_payment_order(new_order).await?;
        if created {
            debug!("🔄️📦️ New payment order [{}] for {reference}", order.order_number);
        } else {
            debug!("🔄️📦️ Payment order [{}] reused for {reference}", order.order_number);
        }
        if order.pay_url.is_some() {
            return Ok(order.into());
        }
        let subject = format!("Gofer {} order {reference}", order.order_type);
        let description = format!("Settlement of {} for order {reference}", order.amount);
        let artifact = self
            .gateway
            .create_pay_artifact(order.order_number.as_str(), order.amount, &subject, &description)
            .await?;
        let order = self.db.attach_pay_url(&order.order_number, &artifact.url).await?;
        Ok(order.into())
    }

    /// Applies one gateway event to the ledger.
    ///
    /// | Current  | Event           | Guard                        | Next      | Side effect                        |
    /// |----------|-----------------|------------------------------|-----------|------------------------------------|
    /// | Waiting  | payment-success | status ∈ {SUCCESS, FINISHED} | Paid      | family post-payment arm; paid event |
    /// | Waiting  | trade-closed    | —                            | Cancelled | cancel PaymentPending order; event  |
    /// | Paid     | refund-success  | —                            | Refunded  | family refund arm; refunded event   |
    /// | (other)  | any             | ledger already past event    | no change | debug log only                      |
    ///
    /// The guard and the family side effect run inside the backend's failure-atomic unit; the notification events
    /// publish only after it commits.
    pub async fn apply_trade_event(&self, event: TradeEvent) -> Result<ReconcileOutcome, SettlementApiError> {
        let outcome = match event {
            TradeEvent::PaymentSuccess { order_number, trade_status, trade_no } => {
                if !trade_status.is_paid() {
                    return Err(SettlementApiError::NotAPaidStatus(trade_status));
                }
                self.db.confirm_payment_order(&order_number, &trade_no).await?
            },
            TradeEvent::TradeClosed { order_number } => self.db.cancel_payment_order(&order_number).await?,
            TradeEvent::RefundSuccess { order_number } => self.db.refund_payment_order(&order_number).await?,
        };
        match &outcome {
            ReconcileOutcome::Paid { payment, business } => {
                for producer in &self.producers.order_paid_producer {
                    producer
                        .publish_event(PaymentOrderPaidEvent { payment: payment.clone(), business: business.clone() })
                        .await;
                }
            },
            ReconcileOutcome::Cancelled { payment, business } => {
                for producer in &self.producers.order_cancelled_producer {
                    producer
                        .publish_event(PaymentOrderCancelledEvent {
                            payment: payment.clone(),
                            business: business.clone(),
                        })
                        .await;
                }
            },
            ReconcileOutcome::Refunded { payment, business } => {
                if let Some(business) = business {
                    for producer in &self.producers.order_refunded_producer {
                        producer
                            .publish_event(crate::events::OrderRefundedEvent {
                                order: business.clone(),
                                amount: payment.amount,
                            })
                            .await;
                    }
                }
            },
            ReconcileOutcome::Stale { order_number, status } => {
                debug!("🔄️💰️ Event for [{order_number}] absorbed as a no-op; ledger is {status}");
            },
        }
        Ok(outcome)
    }

    /// The pull-path accessor: asks the gateway for the authoritative trade status and funnels the answer through
    /// [`Self::apply_trade_event`]. The read-only query gets one bounded retry on transient faults.
    pub async fn check_payment_status(
        &self,
        order_number: &OrderNumber,
    ) -> Result<PaymentStatusCheck, SettlementApiError> {
        let mut attempt = 0;
        let query = loop {
            attempt += 1;
            match self.gateway.query_trade(order_number.as_str()).await {
                Ok(result) => break Ok(result),
                Err(PayGateError::TradeNotFound(_)) => {
                    // The gateway has no trade yet (e.g. the artifact was never minted). Not an error: the payer
                    // simply has not been able to pay.
                    return Ok(PaymentStatusCheck::StillWaiting);
                },
                Err(e) if e.is_transient() && attempt < QUERY_ATTEMPTS => {
                    warn!("🔄️🔍️ Transient gateway fault querying [{order_number}], retrying: {e}");
                    tokio::time::sleep(QUERY_RETRY_DELAY).await;
                },
                Err(e) => break Err(e),
            }
        };
        let query = match query {
            Ok(q) => q,
            Err(e) => {
                warn!("🔄️🔍️ Could not query trade status for [{order_number}]: {e}");
                return Ok(PaymentStatusCheck::GatewayError(e.to_string()));
            },
        };
        match query.trade_status {
            s if s.is_paid() => {
                self.apply_trade_event(TradeEvent::PaymentSuccess {
                    order_number: order_number.clone(),
                    trade_status: s,
                    trade_no: query.trade_no,
                })
                .await?;
                Ok(PaymentStatusCheck::ConfirmedPaid(s))
            },
            paygate_tools::TradeStatus::Closed => {
                self.apply_trade_event(TradeEvent::TradeClosed { order_number: order_number.clone() }).await?;
                Ok(PaymentStatusCheck::ConfirmedClosed)
            },
            _ => Ok(PaymentStatusCheck::StillWaiting),
        }
    }

    //----------------------------------- Idempotency passthroughs -----------------------------------

    /// Claims an external event key ahead of any side effect.
    pub async fn claim_event(&self, key: &str) -> Result<ClaimOutcome, SettlementApiError> {
        Ok(self.db.claim_event_key(key, self.event_key_validity).await?)
    }

    pub async fn complete_event(&self, key: &str) -> Result<(), SettlementApiError> {
        Ok(self.db.complete_event_key(key).await?)
    }

    pub async fn fail_event(&self, key: &str) -> Result<(), SettlementApiError> {
        Ok(self.db.fail_event_key(key).await?)
    }
}
