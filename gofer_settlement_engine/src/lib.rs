//! Gofer Settlement Engine
//!
//! The settlement engine is the payment-settlement and order-reconciliation core of the Gofer marketplace. It owns
//! the payment-order ledger, the reconciliation transition function that applies asynchronous gateway events to it,
//! the refund/withdrawal workflow, and the staleness sweeps. It is ingress-agnostic: the HTTP server feeds it
//! verified, deduplicated events and it guarantees at most one financial side effect per real-world payment event.
//!
//! The library is divided into three main sections:
//! 1. Database management ([`mod@sqlite`]). SQLite is the supported backend; access goes through the
//!    [`traits::SettlementDatabase`] trait so the public APIs stay backend-agnostic. The data types used in the
//!    database are defined in [`db_types`] and are public.
//! 2. The public API ([`SettlementFlowApi`], [`RefundApi`], [`SweeperApi`]). These orchestrate locking,
//!    idempotency-key claims, the ledger transition function and the fund-movement workflows.
//! 3. The event hook system ([`mod@events`]). Terminal transitions (paid, cancelled, refunded, locked, reassigned)
//!    emit fire-and-forget events; subscribers deliver user notifications without ever blocking a transition.
pub mod db_types;
pub mod events;
mod gse_api;
pub mod locks;
#[cfg(feature = "sqlite")]
mod sqlite;
pub mod traits;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use gse_api::{
    errors::SettlementApiError,
    objects::{
        PayableOrder,
        PaymentStatusCheck,
        RefundOutcome,
        SweepConfig,
        SweepSummary,
        TradeEvent,
        WithdrawalOutcome,
    },
    refund_api::{RefundApi, RefundPolicy},
    settlement_api::SettlementFlowApi,
    sweeper_api::SweeperApi,
};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use traits::{ClaimOutcome, ReconcileOutcome, SettlementDatabase, SettlementDatabaseError};
