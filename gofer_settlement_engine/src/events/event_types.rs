use gsp_common::Money;

use crate::db_types::{BusinessOrder, PaymentOrder};

/// A payment order moved to `Paid` and the business order advanced out of `PaymentPending`.
#[derive(Debug, Clone)]
pub struct PaymentOrderPaidEvent {
    pub payment: PaymentOrder,
    pub business: BusinessOrder,
}

/// A payment order moved to `Cancelled` (trade closed or intent expired).
#[derive(Debug, Clone)]
pub struct PaymentOrderCancelledEvent {
    pub payment: PaymentOrder,
    pub business: Option<BusinessOrder>,
}

/// A business order finished the refund workflow.
#[derive(Debug, Clone)]
pub struct OrderRefundedEvent {
    pub order: BusinessOrder,
    pub amount: Money,
}

/// A business order was frozen for human attention.
#[derive(Debug, Clone)]
pub struct OrderLockedEvent {
    pub order: BusinessOrder,
    pub reason: String,
}

/// The sweeper cleared a stale assignment and made the order re-assignable.
#[derive(Debug, Clone)]
pub struct OrderReassignedEvent {
    pub order: BusinessOrder,
    pub previous_agent: Option<String>,
}

/// An agent cash-out definitively failed and the amount was returned to the wallet.
#[derive(Debug, Clone)]
pub struct WithdrawalFailedEvent {
    pub actor_id: String,
    pub amount: Money,
    pub reason: String,
}
