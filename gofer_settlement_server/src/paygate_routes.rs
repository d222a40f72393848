//! Gateway notification ingress.
//!
//! Two paths share one pipeline: the synchronous webhook (form-encoded, answered with the exact acknowledgement
//! token to stop gateway retries) and the asynchronous push-message channel (JSON envelope keyed by the gateway
//! message id). Pipeline: capture the raw fields → verify the signature against exactly those fields → claim the
//! event's idempotency key → classify → dispatch into the engine → mark the key Completed or Failed. A duplicate
//! claim short-circuits straight to the acknowledgement with no side effect, and any failure on the webhook path
//! yields the retry body, never the ack token, preserving at-least-once delivery.
use std::str::FromStr;

use actix_web::{web, HttpResponse};
use gofer_settlement_engine::{
    db_types::OrderNumber,
    RefundApi,
    SettlementDatabase,
    SettlementFlowApi,
    TradeEvent,
};
use gsp_common::Secret;
use log::*;
use paygate_tools::{signing, PayGateApi, TradeStatus, TransferStatus};
use serde::Deserialize;

use crate::{data_objects::JsonResponse, errors::ServerError};

/// The exact body the gateway treats as "delivered, stop retrying".
pub const WEBHOOK_ACK: &str = "success";
/// Any body other than the ack token makes the gateway retry; this is the conventional one.
pub const WEBHOOK_RETRY: &str = "failure";

//--------------------------------------     WebhookAck      ---------------------------------------------------------
/// Outcome of the webhook pipeline, decoupled from the internal error representation. Only at the HTTP boundary
/// does this become a response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookAck {
    Acknowledged,
    Retry,
}

impl WebhookAck {
    pub fn into_response(self) -> HttpResponse {
        match self {
            WebhookAck::Acknowledged => HttpResponse::Ok().body(WEBHOOK_ACK),
            WebhookAck::Retry => HttpResponse::Ok().body(WEBHOOK_RETRY),
        }
    }
}

//-------------------------------------- NotificationVerifier --------------------------------------------------------
/// Verifies inbound notification signatures with the shared gateway secret.
#[derive(Clone)]
pub struct NotificationVerifier {
    secret: Secret<String>,
}

impl NotificationVerifier {
    pub fn new(secret: Secret<String>) -> Self {
        Self { secret }
    }

    pub fn verify(&self, params: &[(String, String)]) -> bool {
        signing::verify_params(self.secret.reveal(), params)
    }
}

//--------------------------------------   Webhook ingress   ---------------------------------------------------------

#[derive(Debug, Clone)]
struct WebhookFields {
    notify_type: String,
    out_trade_no: Option<String>,
    trade_no: Option<String>,
    trade_status: Option<String>,
    refund_status: Option<String>,
    out_biz_no: Option<String>,
    transfer_status: Option<String>,
    transfer_order_id: Option<String>,
}

fn field(params: &[(String, String)], name: &str) -> Option<String> {
    params.iter().find(|(k, v)| k == name && !v.is_empty()).map(|(_, v)| v.clone())
}

impl WebhookFields {
    fn from_params(params: &[(String, String)]) -> Option<Self> {
        let notify_type = field(params, "notify_type")?;
        Some(Self {
            notify_type,
            out_trade_no: field(params, "out_trade_no"),
            trade_no: field(params, "trade_no"),
            trade_status: field(params, "trade_status"),
            refund_status: field(params, "refund_status"),
            out_biz_no: field(params, "out_biz_no"),
            transfer_status: field(params, "transfer_status"),
            transfer_order_id: field(params, "transfer_order_id"),
        })
    }

    /// The idempotency key for this delivery: the provider trade id when the gateway sent one, otherwise the
    /// (kind, reference, status) triple. Identical redeliveries always map to the same key.
    fn event_key(&self) -> String {
        match self.notify_type.as_str() {
            "transfer_changed" => format!(
                "transfer:{}:{}",
                self.out_biz_no.clone().unwrap_or_default(),
                self.transfer_status.clone().unwrap_or_default()
            ),
            kind => {
                let reference =
                    self.trade_no.clone().or_else(|| self.out_trade_no.clone()).unwrap_or_default();
                let status =
                    self.trade_status.clone().or_else(|| self.refund_status.clone()).unwrap_or_default();
                format!("{kind}:{reference}:{status}")
            },
        }
    }
}

/// The synchronous webhook endpoint.
pub async fn paygate_webhook<B, G>(
    body: web::Bytes,
    verifier: web::Data<NotificationVerifier>,
    api: web::Data<SettlementFlowApi<B, G>>,
    refunds: web::Data<RefundApi<B, G>>,
) -> HttpResponse
where
    B: SettlementDatabase,
    G: PayGateApi,
{
    // The raw fields are captured once and verified as-is; nothing signature-relevant gets re-encoded.
    let params: Vec<(String, String)> = match serde_urlencoded::from_bytes(&body) {
        Ok(params) => params,
        Err(e) => {
            warn!("🛰️ Unreadable webhook body: {e}");
            return HttpResponse::BadRequest().body("invalid body");
        },
    };
    if !verifier.verify(&params) {
        warn!("🛰️ Webhook rejected: missing or invalid signature");
        return HttpResponse::Forbidden().body("invalid signature");
    }
    let ack = process_webhook(&params, api.get_ref(), refunds.get_ref()).await;
    ack.into_response()
}

async fn process_webhook<B, G>(
    params: &[(String, String)],
    api: &SettlementFlowApi<B, G>,
    refunds: &RefundApi<B, G>,
) -> WebhookAck
where
    B: SettlementDatabase,
    G: PayGateApi,
{
    let fields = match WebhookFields::from_params(params) {
        Some(fields) => fields,
        None => {
            warn!("🛰️ Webhook carried no notify_type; asking the gateway to retry");
            return WebhookAck::Retry;
        },
    };
    let key = fields.event_key();
    let claim = match api.claim_event(&key).await {
        Ok(claim) => claim,
        Err(e) => {
            error!("🛰️ Could not claim event key {key}: {e}");
            return WebhookAck::Retry;
        },
    };
    if claim.is_duplicate() {
        debug!("🛰️ Duplicate delivery of {key}; acknowledging with no side effect");
        return WebhookAck::Acknowledged;
    }
    match dispatch_trade_fields(&fields, api, refunds).await {
        Ok(()) => match api.complete_event(&key).await {
            Ok(()) => WebhookAck::Acknowledged,
            Err(e) => {
                error!("🛰️ Handled {key} but could not record completion: {e}");
                WebhookAck::Retry
            },
        },
        Err(e) => {
            warn!("🛰️ Handling of {key} failed: {e}");
            if let Err(e) = api.fail_event(&key).await {
                error!("🛰️ Could not mark {key} as failed: {e}");
            }
            WebhookAck::Retry
        },
    }
}

async fn dispatch_trade_fields<B, G>(
    fields: &WebhookFields,
    api: &SettlementFlowApi<B, G>,
    refunds: &RefundApi<B, G>,
) -> Result<(), ServerError>
where
    B: SettlementDatabase,
    G: PayGateApi,
{
    match fields.notify_type.as_str() {
        "trade_changed" => {
            let order_number = fields
                .out_trade_no
                .clone()
                .map(OrderNumber::from)
                .ok_or_else(|| ServerError::InvalidRequestBody("trade_changed without out_trade_no".to_string()))?;
            let raw = fields
                .trade_status
                .as_deref()
                .ok_or_else(|| ServerError::InvalidRequestBody("trade_changed without trade_status".to_string()))?;
            let status =
                TradeStatus::from_str(raw).map_err(|e| ServerError::InvalidRequestBody(e.to_string()))?;
            match status {
                s if s.is_paid() => {
                    api.apply_trade_event(TradeEvent::PaymentSuccess {
                        order_number,
                        trade_status: s,
                        trade_no: fields.trade_no.clone().unwrap_or_default(),
                    })
                    .await?;
                },
                TradeStatus::Closed => {
                    api.apply_trade_event(TradeEvent::TradeClosed { order_number }).await?;
                },
                _ => debug!("🛰️ Trade for [{order_number}] still waiting for the buyer; nothing to do"),
            }
            Ok(())
        },
        "refund_changed" => {
            let order_number = fields
                .out_trade_no
                .clone()
                .map(OrderNumber::from)
                .ok_or_else(|| ServerError::InvalidRequestBody("refund_changed without out_trade_no".to_string()))?;
            match fields.refund_status.as_deref() {
                Some("REFUND_SUCCESS") => {
                    api.apply_trade_event(TradeEvent::RefundSuccess { order_number }).await?;
                },
                other => debug!("🛰️ Ignoring refund status {other:?} for [{order_number}]"),
            }
            Ok(())
        },
        "transfer_changed" => {
            let out_biz_no = fields
                .out_biz_no
                .clone()
                .ok_or_else(|| ServerError::InvalidRequestBody("transfer_changed without out_biz_no".to_string()))?;
            let raw = fields.transfer_status.as_deref().ok_or_else(|| {
                ServerError::InvalidRequestBody("transfer_changed without transfer_status".to_string())
            })?;
            let status =
                TransferStatus::from_str(raw).map_err(|e| ServerError::InvalidRequestBody(e.to_string()))?;
            refunds.settle_withdrawal(&out_biz_no, status, fields.transfer_order_id.as_deref()).await?;
            Ok(())
        },
        other => Err(ServerError::InvalidRequestBody(format!("unknown notify_type: {other}"))),
    }
}

//--------------------------------------  Push-message ingress -------------------------------------------------------

/// The typed push envelope. `body` stays a raw JSON string because it participates in signature verification; it is
/// only parsed after the signature checks out.
#[derive(Debug, Clone, Deserialize)]
pub struct PushMessage {
    pub msg_id: String,
    pub kind: String,
    pub body: String,
    #[serde(default)]
    pub sign: String,
}

impl PushMessage {
    fn signed_fields(&self) -> Vec<(String, String)> {
        vec![
            ("body".to_string(), self.body.clone()),
            ("kind".to_string(), self.kind.clone()),
            ("msg_id".to_string(), self.msg_id.clone()),
            (signing::SIGN_FIELD.to_string(), self.sign.clone()),
        ]
    }
}

#[derive(Debug, Deserialize)]
struct TradeChangedBody {
    out_trade_no: String,
    trade_status: String,
    #[serde(default)]
    trade_no: String,
}

#[derive(Debug, Deserialize)]
struct TransferChangedBody {
    out_biz_no: String,
    status: String,
    #[serde(default)]
    transfer_order_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SettlementBody {
    batch_id: String,
}

#[derive(Debug, Deserialize)]
struct AuthChangedBody {
    app_id: String,
}

/// The asynchronous push-message endpoint, keyed by the gateway message id. Non-2xx responses are redelivered by
/// the gateway's message channel.
pub async fn paygate_messages<B, G>(
    body: web::Json<PushMessage>,
    verifier: web::Data<NotificationVerifier>,
    api: web::Data<SettlementFlowApi<B, G>>,
    refunds: web::Data<RefundApi<B, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: SettlementDatabase,
    G: PayGateApi,
{
    let message = body.into_inner();
    if !verifier.verify(&message.signed_fields()) {
        warn!("🛰️ Push message {} rejected: missing or invalid signature", message.msg_id);
        return Ok(HttpResponse::Forbidden().json(JsonResponse::failure("invalid signature")));
    }
    let key = format!("msg:{}", message.msg_id);
    let claim = api.claim_event(&key).await?;
    if claim.is_duplicate() {
        debug!("🛰️ Duplicate push message {key}; no side effect");
        return Ok(HttpResponse::Ok().json(JsonResponse::success("duplicate delivery")));
    }
    match dispatch_push_message(&message, api.get_ref(), refunds.get_ref()).await {
        Ok(()) => {
            api.complete_event(&key).await?;
            Ok(HttpResponse::Ok().json(JsonResponse::success("message processed")))
        },
        Err(e) => {
            warn!("🛰️ Handling of push message {key} failed: {e}");
            if let Err(e2) = api.fail_event(&key).await {
                error!("🛰️ Could not mark {key} as failed: {e2}");
            }
            Err(e)
        },
    }
}

async fn dispatch_push_message<B, G>(
    message: &PushMessage,
    api: &SettlementFlowApi<B, G>,
    refunds: &RefundApi<B, G>,
) -> Result<(), ServerError>
where
    B: SettlementDatabase,
    G: PayGateApi,
{
    let invalid = |e: serde_json::Error| ServerError::InvalidRequestBody(e.to_string());
    match message.kind.as_str() {
        "trade_changed" => {
            let body: TradeChangedBody = serde_json::from_str(&message.body).map_err(invalid)?;
            let order_number = OrderNumber::from(body.out_trade_no);
            let status = TradeStatus::from_str(&body.trade_status)
                .map_err(|e| ServerError::InvalidRequestBody(e.to_string()))?;
            match status {
                s if s.is_paid() => {
                    api.apply_trade_event(TradeEvent::PaymentSuccess {
                        order_number,
                        trade_status: s,
                        trade_no: body.trade_no,
                    })
                    .await?;
                },
                TradeStatus::Closed => {
                    api.apply_trade_event(TradeEvent::TradeClosed { order_number }).await?;
                },
                _ => debug!("🛰️ Trade for [{order_number}] still waiting for the buyer; nothing to do"),
            }
            Ok(())
        },
        "transfer_changed" => {
            let body: TransferChangedBody = serde_json::from_str(&message.body).map_err(invalid)?;
            let status = TransferStatus::from_str(&body.status)
                .map_err(|e| ServerError::InvalidRequestBody(e.to_string()))?;
            refunds.settle_withdrawal(&body.out_biz_no, status, body.transfer_order_id.as_deref()).await?;
            Ok(())
        },
        "settlement" => {
            // Settlement bookkeeping lives with the gateway; the platform only acknowledges the batch.
            let body: SettlementBody = serde_json::from_str(&message.body).map_err(invalid)?;
            info!("🛰️ Settlement batch {} acknowledged", body.batch_id);
            Ok(())
        },
        "auth_changed" => {
            let body: AuthChangedBody = serde_json::from_str(&message.body).map_err(invalid)?;
            warn!("🛰️ Gateway authorization changed for app {}; operator review advised", body.app_id);
            Ok(())
        },
        other => Err(ServerError::InvalidRequestBody(format!("unknown message kind: {other}"))),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn event_key_prefers_the_provider_trade_id() {
        let fields = WebhookFields::from_params(&params(&[
            ("notify_type", "trade_changed"),
            ("out_trade_no", "GSP-1"),
            ("trade_no", "TN-1"),
            ("trade_status", "TRADE_SUCCESS"),
        ]))
        .unwrap();
        assert_eq!(fields.event_key(), "trade_changed:TN-1:TRADE_SUCCESS");
    }

    #[test]
    fn event_key_falls_back_to_the_order_reference() {
        let fields = WebhookFields::from_params(&params(&[
            ("notify_type", "trade_changed"),
            ("out_trade_no", "GSP-2"),
            ("trade_status", "TRADE_CLOSED"),
        ]))
        .unwrap();
        assert_eq!(fields.event_key(), "trade_changed:GSP-2:TRADE_CLOSED");
    }

    #[test]
    fn identical_deliveries_share_one_key() {
        let raw = params(&[
            ("notify_type", "trade_changed"),
            ("out_trade_no", "GSP-3"),
            ("trade_no", "TN-3"),
            ("trade_status", "TRADE_SUCCESS"),
        ]);
        let a = WebhookFields::from_params(&raw).unwrap().event_key();
        let b = WebhookFields::from_params(&raw).unwrap().event_key();
        assert_eq!(a, b);
    }

    #[test]
    fn transfer_events_key_on_the_dedup_number() {
        let fields = WebhookFields::from_params(&params(&[
            ("notify_type", "transfer_changed"),
            ("out_biz_no", "wd-77"),
            ("transfer_status", "FAILED"),
        ]))
        .unwrap();
        assert_eq!(fields.event_key(), "transfer:wd-77:FAILED");
    }

    #[test]
    fn missing_notify_type_is_unclassifiable() {
        assert!(WebhookFields::from_params(&params(&[("out_trade_no", "GSP-4")])).is_none());
    }
}
