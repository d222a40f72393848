use chrono::{DateTime, Duration, Utc};
use gsp_common::Money;
use paygate_tools::TradeStatus;
use serde::Serialize;

use crate::db_types::{BusinessOrder, BusinessOrderStatus, OrderNumber, PaymentOrder, Withdrawal};

//--------------------------------------    PayableOrder     ---------------------------------------------------------
/// What a create-or-get payment-order call hands back to the client.
#[derive(Debug, Clone, Serialize)]
pub struct PayableOrder {
    pub order_number: OrderNumber,
    pub reference: OrderNumber,
    pub amount: Money,
    pub pay_url: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl From<PaymentOrder> for PayableOrder {
    fn from(order: PaymentOrder) -> Self {
        Self {
            order_number: order.order_number,
            reference: order.reference,
            amount: order.amount,
            pay_url: order.pay_url,
            expires_at: order.expires_at,
        }
    }
}

//--------------------------------------     TradeEvent      ---------------------------------------------------------
/// A verified, deduplicated gateway event about one payment order. Both the push (webhook/message) and pull
/// (status query) paths produce these, so one transition function serves them all.
#[derive(Debug, Clone)]
pub enum TradeEvent {
    PaymentSuccess { order_number: OrderNumber, trade_status: TradeStatus, trade_no: String },
    TradeClosed { order_number: OrderNumber },
    RefundSuccess { order_number: OrderNumber },
}

impl TradeEvent {
    pub fn order_number(&self) -> &OrderNumber {
        match self {
            TradeEvent::PaymentSuccess { order_number, .. } => order_number,
            TradeEvent::TradeClosed { order_number } => order_number,
            TradeEvent::RefundSuccess { order_number } => order_number,
        }
    }
}

//--------------------------------------  PaymentStatusCheck ---------------------------------------------------------
/// Result of the pull-path status accessor.
#[derive(Debug, Clone, Serialize)]
pub enum PaymentStatusCheck {
    StillWaiting,
    ConfirmedPaid(TradeStatus),
    ConfirmedClosed,
    GatewayError(String),
}

//--------------------------------------    RefundOutcome    ---------------------------------------------------------
#[derive(Debug, Clone)]
pub enum RefundOutcome {
    Refunded(BusinessOrder),
    /// The refund could not proceed; the order was frozen with a human-actionable reason and no wallet was touched
    /// beyond any compensation already applied.
    Locked { order: BusinessOrder, reason: String },
    /// The order was not in `Refunding` (a duplicate drive, or someone resolved it first). Nothing was done.
    Skipped { order_number: OrderNumber, status: BusinessOrderStatus },
}

//--------------------------------------  WithdrawalOutcome  ---------------------------------------------------------
#[derive(Debug, Clone)]
pub enum WithdrawalOutcome {
    /// The transfer was accepted (or is processing) at the gateway.
    Accepted { withdrawal: Withdrawal },
    /// The transfer definitively failed; the amount is back in the wallet.
    Failed { withdrawal: Withdrawal, reason: String },
}

//--------------------------------------     SweepConfig     ---------------------------------------------------------
#[derive(Debug, Clone, Copy)]
pub struct SweepConfig {
    /// Timeout sweeps before a standard-tier order is archived.
    pub standard_archive_threshold: i64,
    /// Timeout sweeps before an expedited-tier order is archived. Lower: expedited orders are abandoned faster.
    pub expedited_archive_threshold: i64,
    /// How long a `Refunding` order may sit before the sweeper drives its refund.
    pub refund_grace: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self { standard_archive_threshold: 3, expedited_archive_threshold: 2, refund_grace: Duration::minutes(15) }
    }
}

//--------------------------------------    SweepSummary     ---------------------------------------------------------
#[derive(Debug, Clone, Default)]
pub struct SweepSummary {
    pub reassigned: Vec<OrderNumber>,
    pub archived: Vec<OrderNumber>,
    pub refunds_completed: usize,
    pub refunds_locked: usize,
    pub expired_payment_orders: Vec<OrderNumber>,
    /// Orders skipped because their individual handling failed. They stay eligible for the next sweep.
    pub failures: usize,
}

impl SweepSummary {
    pub fn total_touched(&self) -> usize {
        self.reassigned.len()
            + self.archived.len()
            + self.refunds_completed
            + self.refunds_locked
            + self.expired_payment_orders.len()
    }
}
