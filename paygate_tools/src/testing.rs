//! A deterministic, in-memory stand-in for the PayGate API.
//!
//! Used by the engine and server test suites. Behaviour is scripted per test: trade statuses can be set directly,
//! artifact minting can be made to fail a set number of times, and transfer outcomes are played back from a queue.
//! Transfers are deduplicated by `out_biz_no`, matching the real gateway's contract.
use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
};

use gsp_common::Money;

use crate::{
    PayArtifact, PayGateApi, PayGateError, Payee, TradeQueryResult, TradeStatus, TransferResult, TransferStatus,
};

#[derive(Clone, Default)]
pub struct TestGateway {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    trades: HashMap<String, TradeQueryResult>,
    closed: Vec<String>,
    artifact_failures: u32,
    artifact_calls: u32,
    transfer_script: VecDeque<Result<TransferStatus, PayGateError>>,
    transfers: HashMap<String, TransferResult>,
    transfer_attempts: u32,
}

impl TestGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_trade_status(&self, order_number: &str, trade_status: TradeStatus, trade_no: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .trades
            .insert(order_number.to_string(), TradeQueryResult { trade_status, trade_no: trade_no.to_string() });
    }

    /// Make the next `n` `create_pay_artifact` calls fail with a transient error.
    pub fn fail_next_artifacts(&self, n: u32) {
        self.inner.lock().unwrap().artifact_failures = n;
    }

    /// Queue the outcome of the next (non-deduplicated) `transfer_funds` call.
    pub fn script_transfer(&self, outcome: Result<TransferStatus, PayGateError>) {
        self.inner.lock().unwrap().transfer_script.push_back(outcome);
    }

    pub fn artifact_calls(&self) -> u32 {
        self.inner.lock().unwrap().artifact_calls
    }

    pub fn transfer_attempts(&self) -> u32 {
        self.inner.lock().unwrap().transfer_attempts
    }

    pub fn closed_trades(&self) -> Vec<String> {
        self.inner.lock().unwrap().closed.clone()
    }
}

impl PayGateApi for TestGateway {
    async fn create_pay_artifact(
        &self,
        order_number: &str,
        _amount: Money,
        _subject: &str,
        _description: &str,
    ) -> Result<PayArtifact, PayGateError> {
        let mut inner = self.inner.lock().unwrap();
        inner.artifact_calls += 1;
        if inner.artifact_failures > 0 {
            inner.artifact_failures -= 1;
            return Err(PayGateError::RequestError("scripted artifact failure".to_string()));
        }
        Ok(PayArtifact { url: format!("https://pay.test/checkout/{order_number}") })
    }

    async fn query_trade(&self, order_number: &str) -> Result<TradeQueryResult, PayGateError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .trades
            .get(order_number)
            .cloned()
            .unwrap_or(TradeQueryResult { trade_status: TradeStatus::WaitBuyerPay, trade_no: String::new() }))
    }

    async fn close_trade(&self, order_number: &str) -> Result<(), PayGateError> {
        let mut inner = self.inner.lock().unwrap();
        inner.closed.push(order_number.to_string());
        inner.trades.insert(
            order_number.to_string(),
            TradeQueryResult { trade_status: TradeStatus::Closed, trade_no: String::new() },
        );
        Ok(())
    }

    async fn transfer_funds(
        &self,
        out_biz_no: &str,
        _amount: Money,
        _payee: &Payee,
    ) -> Result<TransferResult, PayGateError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(existing) = inner.transfers.get(out_biz_no) {
            return Ok(existing.clone());
        }
        inner.transfer_attempts += 1;
        let outcome = inner.transfer_script.pop_front().unwrap_or(Ok(TransferStatus::Succeeded));
        match outcome {
            Ok(status) => {
                let result =
                    TransferResult { transfer_order_id: format!("T{:04}", inner.transfer_attempts), status };
                inner.transfers.insert(out_biz_no.to_string(), result.clone());
                Ok(result)
            },
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn transfers_are_deduplicated_by_out_biz_no() {
        let gw = TestGateway::new();
        let payee = Payee { actor_id: "agent-1".to_string(), account: "acct-1".to_string() };
        let first = gw.transfer_funds("wd-1", Money::from_cents(100), &payee).await.unwrap();
        let second = gw.transfer_funds("wd-1", Money::from_cents(100), &payee).await.unwrap();
        assert_eq!(first.transfer_order_id, second.transfer_order_id);
        assert_eq!(gw.transfer_attempts(), 1);
    }
}
