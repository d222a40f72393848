use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use gofer_settlement_engine::{locks::LockError, SettlementApiError, SettlementDatabaseError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
    #[error("The order is busy. Retry later. {0}")]
    BusyRetryLater(String),
    #[error("The payment gateway could not complete the call. {0}")]
    GatewayUnavailable(String),
    #[error("The request violates a business rule. {0}")]
    BusinessRuleViolation(String),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
            Self::BusyRetryLater(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::GatewayUnavailable(_) => StatusCode::BAD_GATEWAY,
            Self::BusinessRuleViolation(_) => StatusCode::CONFLICT,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}

impl From<SettlementApiError> for ServerError {
    fn from(e: SettlementApiError) -> Self {
        match e {
            SettlementApiError::Lock(LockError::Busy(k)) => Self::BusyRetryLater(k),
            SettlementApiError::Lock(e) => Self::BackendError(e.to_string()),
            SettlementApiError::Gateway(e) => Self::GatewayUnavailable(e.to_string()),
            SettlementApiError::NotPayable(o) => {
                Self::BusinessRuleViolation(format!("order {o} does not accept payment"))
            },
            SettlementApiError::NotAPaidStatus(s) => {
                Self::InvalidRequestBody(format!("trade status {s} is not a paid status"))
            },
            SettlementApiError::Database(e) => e.into(),
        }
    }
}

impl From<SettlementDatabaseError> for ServerError {
    fn from(e: SettlementDatabaseError) -> Self {
        match e {
            SettlementDatabaseError::PaymentOrderNotFound(_)
            | SettlementDatabaseError::BusinessOrderNotFound(_)
            | SettlementDatabaseError::WalletNotFound(_)
            | SettlementDatabaseError::WithdrawalNotFound(_) => Self::NoRecordFound(e.to_string()),
            SettlementDatabaseError::InsufficientFunds { .. }
            | SettlementDatabaseError::WrongOrderStatus { .. } => Self::BusinessRuleViolation(e.to_string()),
            SettlementDatabaseError::DatabaseError(e) => Self::BackendError(format!("Database error: {e}")),
        }
    }
}
