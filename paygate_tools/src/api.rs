use std::str::FromStr;

use gsp_common::Money;
use log::*;
use serde::Deserialize;

use crate::{
    config::PayGateConfig,
    data_objects::{PayArtifact, Payee, TradeQueryResult, TradeStatus, TransferResult, TransferStatus},
    error::PayGateError,
    signing,
};

const CODE_OK: &str = "10000";
const CODE_TRADE_NOT_FOUND: &str = "40004";

/// The outbound gateway operations the settlement engine depends on.
///
/// Implemented by the HTTP client ([`PayGateClient`]) and by the deterministic in-memory gateway used in tests
/// ([`crate::testing::TestGateway`]). Note that `transfer_funds` is deduplicated on the gateway side by `out_biz_no`,
/// which is what makes client-side retry of that call safe.
#[allow(async_fn_in_trait)]
pub trait PayGateApi: Clone {
    /// Mint a payable artifact for a payment order. The artifact is what the payer is redirected to.
    async fn create_pay_artifact(
        &self,
        order_number: &str,
        amount: Money,
        subject: &str,
        description: &str,
    ) -> Result<PayArtifact, PayGateError>;

    /// Query the authoritative trade status for a payment order.
    async fn query_trade(&self, order_number: &str) -> Result<TradeQueryResult, PayGateError>;

    /// Close an unpaid trade so the payer can no longer complete it.
    async fn close_trade(&self, order_number: &str) -> Result<(), PayGateError>;

    /// Request an outbound fund transfer. Retries with the same `out_biz_no` are idempotent at the gateway.
    async fn transfer_funds(
        &self,
        out_biz_no: &str,
        amount: Money,
        payee: &Payee,
    ) -> Result<TransferResult, PayGateError>;
}

//--------------------------------------   PayGateClient     ---------------------------------------------------------
#[derive(Clone)]
pub struct PayGateClient {
    config: PayGateConfig,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    code: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    pay_url: Option<String>,
    #[serde(default)]
    trade_status: Option<String>,
    #[serde(default)]
    trade_no: Option<String>,
    #[serde(default)]
    transfer_order_id: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

impl PayGateClient {
    pub fn new(config: PayGateConfig) -> Result<Self, PayGateError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.read_timeout)
            .build()
            .map_err(|e| PayGateError::Initialization(e.to_string()))?;
        Ok(Self { config, client })
    }

    fn base_params(&self, method: &str) -> Vec<(String, String)> {
        vec![("app_id".to_string(), self.config.app_id.clone()), ("method".to_string(), method.to_string())]
    }

    async fn call(&self, path: &str, mut params: Vec<(String, String)>) -> Result<Envelope, PayGateError> {
        let sig = signing::sign_params(self.config.gateway_secret.reveal(), &params);
        params.push((signing::SIGN_FIELD.to_string(), sig));
        let url = format!("{}{path}", self.config.base_url);
        trace!("📡️ POST {url}");
        let response = self.client.post(&url).form(&params).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PayGateError::ResponseError(format!("HTTP {status} from {path}")));
        }
        let envelope = response.json::<Envelope>().await.map_err(|e| PayGateError::ResponseError(e.to_string()))?;
        Ok(envelope)
    }
}

impl PayGateApi for PayGateClient {
    async fn create_pay_artifact(
        &self,
        order_number: &str,
        amount: Money,
        subject: &str,
        description: &str,
    ) -> Result<PayArtifact, PayGateError> {
        let mut params = self.base_params("trade.create");
        params.push(("out_trade_no".to_string(), order_number.to_string()));
        params.push(("total_amount".to_string(), amount.to_string()));
        params.push(("subject".to_string(), subject.to_string()));
        params.push(("body".to_string(), description.to_string()));
        let envelope = self.call("/api/trade/create", params).await?;
        if envelope.code != CODE_OK {
            return Err(PayGateError::Rejected { code: envelope.code, message: envelope.message });
        }
        let url = envelope
            .pay_url
            .ok_or_else(|| PayGateError::ResponseError("trade.create response carried no pay_url".to_string()))?;
        debug!("📡️ Minted pay artifact for order {order_number}");
        Ok(PayArtifact { url })
    }

    async fn query_trade(&self, order_number: &str) -> Result<TradeQueryResult, PayGateError> {
        let mut params = self.base_params("trade.query");
        params.push(("out_trade_no".to_string(), order_number.to_string()));
        let envelope = self.call("/api/trade/query", params).await?;
        match envelope.code.as_str() {
            CODE_OK => {},
            CODE_TRADE_NOT_FOUND => return Err(PayGateError::TradeNotFound(order_number.to_string())),
            _ => return Err(PayGateError::Rejected { code: envelope.code, message: envelope.message }),
        }
        let raw = envelope
            .trade_status
            .ok_or_else(|| PayGateError::ResponseError("trade.query response carried no trade_status".to_string()))?;
        let trade_status =
            TradeStatus::from_str(&raw).map_err(|e| PayGateError::ResponseError(e.to_string()))?;
        Ok(TradeQueryResult { trade_status, trade_no: envelope.trade_no.unwrap_or_default() })
    }

    async fn close_trade(&self, order_number: &str) -> Result<(), PayGateError> {
        let mut params = self.base_params("trade.close");
        params.push(("out_trade_no".to_string(), order_number.to_string()));
        let envelope = self.call("/api/trade/close", params).await?;
        if envelope.code != CODE_OK {
            return Err(PayGateError::Rejected { code: envelope.code, message: envelope.message });
        }
        Ok(())
    }

    async fn transfer_funds(
        &self,
        out_biz_no: &str,
        amount: Money,
        payee: &Payee,
    ) -> Result<TransferResult, PayGateError> {
        let mut params = self.base_params("fund.transfer");
        params.push(("out_biz_no".to_string(), out_biz_no.to_string()));
        params.push(("amount".to_string(), amount.to_string()));
        params.push(("payee_account".to_string(), payee.account.clone()));
        let envelope = self.call("/api/transfer", params).await?;
        if envelope.code != CODE_OK {
            return Err(PayGateError::Rejected { code: envelope.code, message: envelope.message });
        }
        let transfer_order_id = envelope
            .transfer_order_id
            .ok_or_else(|| PayGateError::ResponseError("transfer response carried no order id".to_string()))?;
        let raw = envelope
            .status
            .ok_or_else(|| PayGateError::ResponseError("transfer response carried no status".to_string()))?;
        let status = TransferStatus::from_str(&raw).map_err(|e| PayGateError::ResponseError(e.to_string()))?;
        Ok(TransferResult { transfer_order_id, status })
    }
}
