use crate::db_types::{BusinessOrder, OrderNumber, PaymentOrder, PaymentOrderStatus};

//--------------------------------------    ClaimOutcome     ---------------------------------------------------------
/// Result of atomically claiming an external event key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The key is new (or previously `Failed`, or its `Processing` claim expired); the caller owns it and must mark
    /// it `Completed` or `Failed` when done.
    Claimed,
    /// Another handler holds a live `Processing` claim. Treat the event as a duplicate.
    AlreadyProcessing,
    /// The event was fully handled before. Treat the event as a duplicate.
    AlreadyCompleted,
}

impl ClaimOutcome {
    pub fn is_duplicate(&self) -> bool {
        !matches!(self, ClaimOutcome::Claimed)
    }
}

//--------------------------------------  ReconcileOutcome   ---------------------------------------------------------
/// What one application of the reconciliation transition function did. `Stale` is the no-op arm: the ledger was
/// already at or past the reported state, so the event was absorbed without any side effect.
#[derive(Debug, Clone)]
pub enum ReconcileOutcome {
    Paid { payment: PaymentOrder, business: BusinessOrder },
    Cancelled { payment: PaymentOrder, business: Option<BusinessOrder> },
    Refunded { payment: PaymentOrder, business: Option<BusinessOrder> },
    Stale { order_number: OrderNumber, status: PaymentOrderStatus },
}

impl ReconcileOutcome {
    pub fn is_stale(&self) -> bool {
        matches!(self, ReconcileOutcome::Stale { .. })
    }
}
