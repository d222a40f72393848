use chrono::{DateTime, Duration, Utc};
use gsp_common::Money;
use thiserror::Error;

use crate::{
    db_types::{
        BusinessOrder,
        BusinessOrderStatus,
        NewBusinessOrder,
        NewPaymentOrder,
        OrderNumber,
        PaymentOrder,
        Wallet,
        Withdrawal,
        WithdrawalStatus,
    },
    traits::{ClaimOutcome, ReconcileOutcome},
};

/// The storage behaviour a backend must provide to run the settlement engine.
///
/// This covers:
/// * The payment-order ledger and its reconciliation transitions. Each transition method executes in a single
///   failure-atomic unit: the current ledger status is re-read inside that unit (the second idempotency layer behind
///   the event-key store), the guard is evaluated, and the order-family advance runs in the same unit, so a hook
///   failure rolls the whole transition back.
/// * The idempotency store for external event keys.
/// * Business-order state driven by payment and staleness.
/// * Wallet balances consulted and adjusted by the refund/withdrawal workflow.
#[allow(async_fn_in_trait)]
pub trait SettlementDatabase: Clone {
    /// The URL of the database.
    fn url(&self) -> &str;

    //----------------------------------- Payment order ledger -----------------------------------

    /// Under the caller's lock, returns the live `Waiting` payment order for `(order_type, reference)` if one
    /// exists, otherwise inserts `order` as a new row. An expired `Waiting` row found on the way is cancelled in
    /// the same atomic unit, preserving the one-live-intent-per-reference invariant.
    ///
    /// The boolean is `true` when a new row was inserted.
    async fn create_or_reuse_payment_order(
        &self,
        order: NewPaymentOrder,
    ) -> Result<(PaymentOrder, bool), SettlementDatabaseError>;

    /// Caches the payable artifact minted by the gateway on the payment order row.
    async fn attach_pay_url(
        &self,
        order_number: &OrderNumber,
        pay_url: &str,
    ) -> Result<PaymentOrder, SettlementDatabaseError>;

    async fn fetch_payment_order(
        &self,
        order_number: &OrderNumber,
    ) -> Result<Option<PaymentOrder>, SettlementDatabaseError>;

    //----------------------------------- Reconciliation transitions -----------------------------------

    /// `Waiting` → `Paid`. Sets `paid_at` and the provider trade id, and advances the referenced business order
    /// through its order-family post-payment arm (Parcel orders with a pre-assigned courier go to `Assigned`,
    /// everything else to `Pending`). If the ledger is already past `Waiting` the call is a no-op and returns
    /// [`ReconcileOutcome::Stale`].
    async fn confirm_payment_order(
        &self,
        order_number: &OrderNumber,
        trade_no: &str,
    ) -> Result<ReconcileOutcome, SettlementDatabaseError>;

    /// `Waiting` → `Cancelled`. Cancels the referenced business order if it is still `PaymentPending`. A ledger
    /// already past `Waiting` yields [`ReconcileOutcome::Stale`].
    async fn cancel_payment_order(
        &self,
        order_number: &OrderNumber,
    ) -> Result<ReconcileOutcome, SettlementDatabaseError>;

    /// `Paid` → `Refunded`, driven by a gateway refund-success event. Marks the referenced business order
    /// `Refunded` if it was `Refunding`. Any other ledger status yields [`ReconcileOutcome::Stale`].
    async fn refund_payment_order(
        &self,
        order_number: &OrderNumber,
    ) -> Result<ReconcileOutcome, SettlementDatabaseError>;

    //----------------------------------- Idempotency store -----------------------------------

    /// Atomically claims `key` for processing. The claim expires after `validity`, so a handler that died without
    /// marking the key can be taken over later.
    async fn claim_event_key(&self, key: &str, validity: Duration) -> Result<ClaimOutcome, SettlementDatabaseError>;

    /// Marks a claimed key durably handled. Future claims return [`ClaimOutcome::AlreadyCompleted`].
    async fn complete_event_key(&self, key: &str) -> Result<(), SettlementDatabaseError>;

    /// Marks a claimed key failed. Future claims may retry it.
    async fn fail_event_key(&self, key: &str) -> Result<(), SettlementDatabaseError>;

    //----------------------------------- Business orders -----------------------------------

    async fn insert_business_order(&self, order: NewBusinessOrder) -> Result<BusinessOrder, SettlementDatabaseError>;

    async fn fetch_business_order(
        &self,
        order_number: &OrderNumber,
    ) -> Result<Option<BusinessOrder>, SettlementDatabaseError>;

    /// Hands a `Pending` order to an agent, moving it to `Assigned`.
    async fn assign_agent(
        &self,
        order_number: &OrderNumber,
        agent_id: &str,
    ) -> Result<BusinessOrder, SettlementDatabaseError>;

    /// Moves an order into `Refunding` and stamps `refund_requested_at`. Only orders in a post-payment,
    /// pre-completion status may enter the refund workflow.
    async fn begin_refund(&self, order_number: &OrderNumber) -> Result<BusinessOrder, SettlementDatabaseError>;

    /// Freezes the order in `Locked` with a human-actionable reason. No automatic resolution follows.
    async fn lock_business_order(
        &self,
        order_number: &OrderNumber,
        reason: &str,
    ) -> Result<BusinessOrder, SettlementDatabaseError>;

    /// Completes a wallet-funded refund: the business order moves `Refunding` → `Refunded` and the corresponding
    /// `Paid` payment order moves to `Refunded`, in one atomic unit.
    async fn finalize_refund(
        &self,
        order_number: &OrderNumber,
    ) -> Result<(BusinessOrder, Option<PaymentOrder>), SettlementDatabaseError>;

    //----------------------------------- Sweeps -----------------------------------

    /// Orders past their fulfillment deadline that are still actively assigned (`Assigned` or `InTransit`).
    async fn fetch_overdue_active_orders(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<BusinessOrder>, SettlementDatabaseError>;

    /// `Refunding` orders whose refund was requested before `cutoff`.
    async fn fetch_overdue_refunding_orders(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<BusinessOrder>, SettlementDatabaseError>;

    /// `Waiting` payment orders whose validity lapsed before `now`.
    async fn fetch_expired_waiting_orders(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<PaymentOrder>, SettlementDatabaseError>;

    /// Bumps the timeout counter for an overdue order, returning the updated row.
    async fn increment_timeout_counter(
        &self,
        order_number: &OrderNumber,
    ) -> Result<BusinessOrder, SettlementDatabaseError>;

    /// Clears the agent assignment and resets the order to `Pending` so it can be taken again.
    async fn reset_assignment(&self, order_number: &OrderNumber) -> Result<BusinessOrder, SettlementDatabaseError>;

    /// Copies the order into immutable archive storage and removes it from the live set.
    async fn archive_business_order(&self, order_number: &OrderNumber) -> Result<(), SettlementDatabaseError>;

    //----------------------------------- Wallets -----------------------------------

    async fn fetch_wallet(&self, actor_id: &str) -> Result<Option<Wallet>, SettlementDatabaseError>;

    /// Adds `amount` to the actor's settled balance, creating the wallet if needed.
    async fn credit_wallet(&self, actor_id: &str, amount: Money) -> Result<Wallet, SettlementDatabaseError>;

    /// Adds `amount` to the actor's pending balance (income earned but not yet released), creating the wallet if
    /// needed.
    async fn credit_wallet_pending(&self, actor_id: &str, amount: Money) -> Result<Wallet, SettlementDatabaseError>;

    /// Removes `amount` from the actor's funds, drawing on the settled balance first and the pending balance for
    /// the remainder. Fails with [`SettlementDatabaseError::InsufficientFunds`] without mutating anything if the
    /// combined funds do not cover the amount.
    async fn debit_wallet(&self, actor_id: &str, amount: Money) -> Result<Wallet, SettlementDatabaseError>;

    //----------------------------------- Withdrawals -----------------------------------

    async fn insert_withdrawal(
        &self,
        out_biz_no: &str,
        actor_id: &str,
        amount: Money,
    ) -> Result<Withdrawal, SettlementDatabaseError>;

    async fn update_withdrawal(
        &self,
        out_biz_no: &str,
        status: WithdrawalStatus,
        transfer_order_id: Option<&str>,
    ) -> Result<Withdrawal, SettlementDatabaseError>;

    async fn fetch_withdrawal(&self, out_biz_no: &str) -> Result<Option<Withdrawal>, SettlementDatabaseError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), SettlementDatabaseError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum SettlementDatabaseError {
    #[error("Internal storage engine error: {0}")]
    DatabaseError(String),
    #[error("The payment order {0} does not exist")]
    PaymentOrderNotFound(OrderNumber),
    #[error("The business order {0} does not exist")]
    BusinessOrderNotFound(OrderNumber),
    #[error("No wallet exists for actor {0}")]
    WalletNotFound(String),
    #[error("Insufficient funds for {actor_id}: available {available}, required {required}")]
    InsufficientFunds { actor_id: String, available: Money, required: Money },
    #[error("Business order {order_number} is {status}, which forbids {operation}")]
    WrongOrderStatus { order_number: OrderNumber, status: BusinessOrderStatus, operation: String },
    #[error("No withdrawal exists for out_biz_no {0}")]
    WithdrawalNotFound(String),
}

impl From<sqlx::Error> for SettlementDatabaseError {
    fn from(e: sqlx::Error) -> Self {
        SettlementDatabaseError::DatabaseError(e.to_string())
    }
}
