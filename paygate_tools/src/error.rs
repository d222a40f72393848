use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum PayGateError {
    #[error("Could not initialize client: {0}")]
    Initialization(String),
    #[error("Gateway request failed: {0}")]
    RequestError(String),
    #[error("Invalid gateway response: {0}")]
    ResponseError(String),
    #[error("Gateway rejected the call. Code {code}. {message}")]
    Rejected { code: String, message: String },
    #[error("No trade exists on the gateway for order {0}")]
    TradeNotFound(String),
    #[error("Gateway response signature is missing or invalid")]
    SignatureInvalid,
}

impl PayGateError {
    /// Transport-level failures (timeouts, connection resets) are worth retrying; everything else is a definitive
    /// answer from the gateway.
    pub fn is_transient(&self) -> bool {
        matches!(self, PayGateError::RequestError(_))
    }
}

impl From<reqwest::Error> for PayGateError {
    fn from(e: reqwest::Error) -> Self {
        PayGateError::RequestError(e.to_string())
    }
}
