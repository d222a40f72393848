use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Duration, Utc};
use gsp_common::Money;
use log::error;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Invalid status value: {0}")]
pub struct ConversionError(String);

//--------------------------------------     OrderNumber     ---------------------------------------------------------
/// A lightweight wrapper around a platform order number. Used for both payment orders ("GSP-…") and the business
/// orders they reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct OrderNumber(pub String);

impl OrderNumber {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Mint a fresh payment-order number.
    pub fn new_payment_number() -> Self {
        Self(format!("GSP-{:016x}", rand::random::<u64>()))
    }
}

impl FromStr for OrderNumber {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderNumber {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OrderNumber {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Display for OrderNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

//--------------------------------------      OrderType      ---------------------------------------------------------
/// The three business-order families that settle through the shared payment-order abstraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum OrderType {
    /// Point-to-point parcel delivery.
    Parcel,
    /// Shopping from a partnered merchant, delivered by a courier.
    Shopping,
    /// Purchase-on-behalf: the courier buys the requested goods anywhere and delivers them.
    PurchaseRequest,
}

impl Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderType::Parcel => write!(f, "Parcel"),
            OrderType::Shopping => write!(f, "Shopping"),
            OrderType::PurchaseRequest => write!(f, "PurchaseRequest"),
        }
    }
}

impl FromStr for OrderType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Parcel" => Ok(Self::Parcel),
            "Shopping" => Ok(Self::Shopping),
            "PurchaseRequest" => Ok(Self::PurchaseRequest),
            s => Err(ConversionError(format!("Invalid order type: {s}"))),
        }
    }
}

//--------------------------------------  PaymentOrderStatus ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum PaymentOrderStatus {
    /// The payment intent exists and the payer has not completed payment.
    Waiting,
    /// Payment confirmed by the gateway.
    Paid,
    /// The paid amount has been returned to the payer.
    Refunded,
    /// Closed without payment (payer abandoned, trade closed, or intent expired).
    Cancelled,
}

impl PaymentOrderStatus {
    /// `Paid` admits exactly one further move (to `Refunded`); `Refunded` and `Cancelled` admit none. Any status in
    /// this set may never move back to `Waiting`.
    pub fn is_past_waiting(&self) -> bool {
        !matches!(self, PaymentOrderStatus::Waiting)
    }
}

impl Display for PaymentOrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentOrderStatus::Waiting => write!(f, "Waiting"),
            PaymentOrderStatus::Paid => write!(f, "Paid"),
            PaymentOrderStatus::Refunded => write!(f, "Refunded"),
            PaymentOrderStatus::Cancelled => write!(f, "Cancelled"),
        }
    }
}

impl FromStr for PaymentOrderStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Waiting" => Ok(Self::Waiting),
            "Paid" => Ok(Self::Paid),
            "Refunded" => Ok(Self::Refunded),
            "Cancelled" => Ok(Self::Cancelled),
            s => Err(ConversionError(format!("Invalid payment order status: {s}"))),
        }
    }
}

impl From<String> for PaymentOrderStatus {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid payment order status: {value}. But this conversion cannot fail. Defaulting to Waiting");
            PaymentOrderStatus::Waiting
        })
    }
}

//-------------------------------------- BusinessOrderStatus ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum BusinessOrderStatus {
    /// Created, awaiting payment confirmation.
    PaymentPending,
    /// Paid and waiting for an agent to take it.
    Pending,
    /// An agent has accepted the order.
    Assigned,
    /// The agent is underway.
    InTransit,
    /// Goods handed over; awaiting requester confirmation.
    Delivered,
    /// Requester confirmed; income released to the agent.
    Completed,
    /// A human operator has to look at this order.
    PlatformIntervention,
    /// A refund has been requested and is being worked.
    Refunding,
    Refunded,
    Cancelled,
    /// Frozen with a reason; no automatic resolution will be attempted.
    Locked,
}

impl BusinessOrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BusinessOrderStatus::Completed | BusinessOrderStatus::Refunded | BusinessOrderStatus::Cancelled)
    }
}

impl Display for BusinessOrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BusinessOrderStatus::PaymentPending => "PaymentPending",
            BusinessOrderStatus::Pending => "Pending",
            BusinessOrderStatus::Assigned => "Assigned",
            BusinessOrderStatus::InTransit => "InTransit",
            BusinessOrderStatus::Delivered => "Delivered",
            BusinessOrderStatus::Completed => "Completed",
            BusinessOrderStatus::PlatformIntervention => "PlatformIntervention",
            BusinessOrderStatus::Refunding => "Refunding",
            BusinessOrderStatus::Refunded => "Refunded",
            BusinessOrderStatus::Cancelled => "Cancelled",
            BusinessOrderStatus::Locked => "Locked",
        };
        write!(f, "{s}")
    }
}

impl FromStr for BusinessOrderStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PaymentPending" => Ok(Self::PaymentPending),
            "Pending" => Ok(Self::Pending),
            "Assigned" => Ok(Self::Assigned),
            "InTransit" => Ok(Self::InTransit),
            "Delivered" => Ok(Self::Delivered),
            "Completed" => Ok(Self::Completed),
            "PlatformIntervention" => Ok(Self::PlatformIntervention),
            "Refunding" => Ok(Self::Refunding),
            "Refunded" => Ok(Self::Refunded),
            "Cancelled" => Ok(Self::Cancelled),
            "Locked" => Ok(Self::Locked),
            s => Err(ConversionError(format!("Invalid business order status: {s}"))),
        }
    }
}

//--------------------------------------     ServiceTier     ---------------------------------------------------------
/// Service tier of a business order. Expedited orders are archived after fewer timeout sweeps than standard ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum ServiceTier {
    Standard,
    Expedited,
}

impl Display for ServiceTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceTier::Standard => write!(f, "Standard"),
            ServiceTier::Expedited => write!(f, "Expedited"),
        }
    }
}

impl FromStr for ServiceTier {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Standard" => Ok(Self::Standard),
            "Expedited" => Ok(Self::Expedited),
            s => Err(ConversionError(format!("Invalid service tier: {s}"))),
        }
    }
}

//--------------------------------------    PaymentOrder     ---------------------------------------------------------
/// The platform-local payment-intent record, distinct from the gateway's own trade record. Append-only: rows are
/// never deleted, and only the reconciliation engine and the sweeper mutate them.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PaymentOrder {
    pub id: i64,
    pub order_number: OrderNumber,
    pub order_type: OrderType,
    /// The business order this payment intent settles.
    pub reference: OrderNumber,
    pub amount: Money,
    pub status: PaymentOrderStatus,
    /// Cached payable artifact. Empty when the gateway call failed after the row was persisted; regenerated on the
    /// next create-or-get call.
    pub pay_url: Option<String>,
    pub provider_trade_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------   NewPaymentOrder   ---------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewPaymentOrder {
    pub order_number: OrderNumber,
    pub order_type: OrderType,
    pub reference: OrderNumber,
    pub amount: Money,
    pub expires_at: DateTime<Utc>,
}

impl NewPaymentOrder {
    pub fn new(order_type: OrderType, reference: OrderNumber, amount: Money, validity: Duration) -> Self {
        Self {
            order_number: OrderNumber::new_payment_number(),
            order_type,
            reference,
            amount,
            expires_at: Utc::now() + validity,
        }
    }
}

//--------------------------------------    BusinessOrder    ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct BusinessOrder {
    pub id: i64,
    pub order_number: OrderNumber,
    pub order_type: OrderType,
    pub status: BusinessOrderStatus,
    pub requester_id: String,
    /// The courier fulfilling the order, once one has accepted it.
    pub agent_id: Option<String>,
    pub service_tier: ServiceTier,
    /// The full amount the requester pays.
    pub amount: Money,
    /// The agent's entitled income share. This, not `amount`, is what a wallet-funded refund moves.
    pub agent_fee: Money,
    pub platform_fee: Money,
    /// Number of times the sweeper has found this order past its deadline.
    pub timeout_count: i64,
    pub deadline_at: Option<DateTime<Utc>>,
    pub refund_requested_at: Option<DateTime<Utc>>,
    pub locked_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------  NewBusinessOrder   ---------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewBusinessOrder {
    pub order_number: OrderNumber,
    pub order_type: OrderType,
    pub requester_id: String,
    pub agent_id: Option<String>,
    pub service_tier: ServiceTier,
    pub amount: Money,
    pub agent_fee: Money,
    pub platform_fee: Money,
    pub deadline_at: Option<DateTime<Utc>>,
}

impl NewBusinessOrder {
    pub fn new(order_number: OrderNumber, order_type: OrderType, requester_id: String, amount: Money) -> Self {
        Self {
            order_number,
            order_type,
            requester_id,
            agent_id: None,
            service_tier: ServiceTier::Standard,
            amount,
            agent_fee: Money::default(),
            platform_fee: Money::default(),
            deadline_at: None,
        }
    }

    pub fn with_agent(mut self, agent_id: &str) -> Self {
        self.agent_id = Some(agent_id.to_string());
        self
    }

    pub fn with_tier(mut self, tier: ServiceTier) -> Self {
        self.service_tier = tier;
        self
    }

    pub fn with_fees(mut self, agent_fee: Money, platform_fee: Money) -> Self {
        self.agent_fee = agent_fee;
        self.platform_fee = platform_fee;
        self
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline_at = Some(deadline);
        self
    }
}

//--------------------------------------  IdempotencyStatus  ---------------------------------------------------------
/// Processing state of one external event key. `Failed` permits a later retry; the other two short-circuit it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type)]
pub enum IdempotencyStatus {
    Processing,
    Completed,
    Failed,
}

impl Display for IdempotencyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdempotencyStatus::Processing => write!(f, "Processing"),
            IdempotencyStatus::Completed => write!(f, "Completed"),
            IdempotencyStatus::Failed => write!(f, "Failed"),
        }
    }
}

//--------------------------------------       Wallet        ---------------------------------------------------------
/// A balance snapshot for one actor. The settlement engine consults and adjusts wallets; it does not keep a ledger of
/// the movements behind them.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Wallet {
    pub id: i64,
    pub actor_id: String,
    pub balance: Money,
    pub pending_balance: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    /// Funds the refund workflow may draw on: settled plus pending income.
    pub fn available(&self) -> Money {
        self.balance + self.pending_balance
    }
}

//--------------------------------------     Withdrawal      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum WithdrawalStatus {
    /// Transfer requested; awaiting gateway confirmation.
    Pending,
    Confirmed,
    Failed,
}

impl Display for WithdrawalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WithdrawalStatus::Pending => write!(f, "Pending"),
            WithdrawalStatus::Confirmed => write!(f, "Confirmed"),
            WithdrawalStatus::Failed => write!(f, "Failed"),
        }
    }
}

/// An agent cash-out request and its settlement state. `out_biz_no` is the gateway-side deduplication key.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Withdrawal {
    pub id: i64,
    pub out_biz_no: String,
    pub actor_id: String,
    pub amount: Money,
    pub status: WithdrawalStatus,
    pub transfer_order_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
