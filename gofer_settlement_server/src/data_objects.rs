use std::fmt::Display;

use chrono::{DateTime, Utc};
use gofer_settlement_engine::db_types::{NewBusinessOrder, OrderNumber, OrderType, ServiceTier};
use gsp_common::Money;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }

    pub fn failure<S: Display>(message: S) -> Self {
        Self { success: false, message: message.to_string() }
    }
}

/// Registers a business order with the settlement core. Amounts are in cents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrderRequest {
    pub order_number: String,
    pub order_type: OrderType,
    pub requester_id: String,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub service_tier: Option<ServiceTier>,
    pub amount: i64,
    #[serde(default)]
    pub agent_fee: i64,
    #[serde(default)]
    pub platform_fee: i64,
    #[serde(default)]
    pub deadline_at: Option<DateTime<Utc>>,
}

impl From<NewOrderRequest> for NewBusinessOrder {
    fn from(req: NewOrderRequest) -> Self {
        let mut order = NewBusinessOrder::new(
            OrderNumber::from(req.order_number),
            req.order_type,
            req.requester_id,
            Money::from_cents(req.amount),
        )
        .with_fees(Money::from_cents(req.agent_fee), Money::from_cents(req.platform_fee));
        if let Some(agent) = &req.agent_id {
            order = order.with_agent(agent);
        }
        if let Some(tier) = req.service_tier {
            order = order.with_tier(tier);
        }
        if let Some(deadline) = req.deadline_at {
            order = order.with_deadline(deadline);
        }
        order
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub actor_id: String,
    /// Amount in cents.
    pub amount: i64,
    /// The payout account identity at the gateway.
    pub account: String,
}
