use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Unrecognised gateway status value: {0}")]
pub struct StatusParseError(String);

//--------------------------------------    TradeStatus      ---------------------------------------------------------
/// The gateway's view of a trade, using its native wire values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeStatus {
    /// The trade exists, but the buyer has not paid yet.
    WaitBuyerPay,
    /// Payment has been received.
    Success,
    /// Payment received and the trade fully settled on the gateway side.
    Finished,
    /// The trade was closed without payment, or refunded in full after payment.
    Closed,
}

impl TradeStatus {
    pub fn is_paid(&self) -> bool {
        matches!(self, TradeStatus::Success | TradeStatus::Finished)
    }
}

impl Display for TradeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeStatus::WaitBuyerPay => write!(f, "WAIT_BUYER_PAY"),
            TradeStatus::Success => write!(f, "TRADE_SUCCESS"),
            TradeStatus::Finished => write!(f, "TRADE_FINISHED"),
            TradeStatus::Closed => write!(f, "TRADE_CLOSED"),
        }
    }
}

impl FromStr for TradeStatus {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WAIT_BUYER_PAY" => Ok(Self::WaitBuyerPay),
            "TRADE_SUCCESS" => Ok(Self::Success),
            "TRADE_FINISHED" => Ok(Self::Finished),
            "TRADE_CLOSED" => Ok(Self::Closed),
            s => Err(StatusParseError(s.to_string())),
        }
    }
}

//--------------------------------------   TransferStatus    ---------------------------------------------------------
/// Status of an outbound fund transfer (withdrawal payout).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferStatus {
    Processing,
    Succeeded,
    Failed,
}

impl Display for TransferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferStatus::Processing => write!(f, "PROCESSING"),
            TransferStatus::Succeeded => write!(f, "SUCCEEDED"),
            TransferStatus::Failed => write!(f, "FAILED"),
        }
    }
}

impl FromStr for TransferStatus {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PROCESSING" => Ok(Self::Processing),
            "SUCCEEDED" => Ok(Self::Succeeded),
            "FAILED" => Ok(Self::Failed),
            s => Err(StatusParseError(s.to_string())),
        }
    }
}

//--------------------------------------    PayArtifact      ---------------------------------------------------------
/// The payable artifact minted by the gateway for a payment order. The client presents this to the payer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayArtifact {
    pub url: String,
}

//--------------------------------------  TradeQueryResult   ---------------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeQueryResult {
    pub trade_status: TradeStatus,
    /// The gateway's own trade record id.
    pub trade_no: String,
}

//--------------------------------------       Payee         ---------------------------------------------------------
/// The receiving side of an outbound transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payee {
    pub actor_id: String,
    /// The payee's account identity at the gateway.
    pub account: String,
}

//--------------------------------------   TransferResult    ---------------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferResult {
    pub transfer_order_id: String,
    pub status: TransferStatus,
}
