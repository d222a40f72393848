use paygate_tools::{PayGateError, TradeStatus};
use thiserror::Error;

use crate::{db_types::OrderNumber, locks::LockError, traits::SettlementDatabaseError};

#[derive(Debug, Clone, Error)]
pub enum SettlementApiError {
    #[error("{0}")]
    Database(#[from] SettlementDatabaseError),
    #[error("{0}")]
    Lock(#[from] LockError),
    #[error("Payment gateway error. {0}")]
    Gateway(#[from] PayGateError),
    #[error("Business order {0} does not accept payment in its current state")]
    NotPayable(OrderNumber),
    #[error("A payment-success event carried non-paid trade status {0}")]
    NotAPaidStatus(TradeStatus),
}
