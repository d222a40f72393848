//! Request handler definitions for the order-facing routes.
//!
//! Handlers stay generic over the storage backend and gateway client so the test suite can drive them against the
//! in-memory gateway; [`crate::server`] registers them with the production types.
use actix_web::{get, web, HttpResponse, Responder};
use gofer_settlement_engine::{
    db_types::OrderNumber,
    RefundApi,
    RefundOutcome,
    SettlementDatabase,
    SettlementFlowApi,
    WithdrawalOutcome,
};
use log::*;
use paygate_tools::PayGateApi;

use crate::{
    data_objects::{JsonResponse, NewOrderRequest, WithdrawalRequest},
    errors::ServerError,
};

#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

/// Registers a business order with the settlement core.
pub async fn create_order<B, G>(
    body: web::Json<NewOrderRequest>,
    api: web::Data<SettlementFlowApi<B, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: SettlementDatabase,
    G: PayGateApi,
{
    let request = body.into_inner();
    debug!("💻️ POST order {}", request.order_number);
    let order = api.db().insert_business_order(request.into()).await.map_err(ServerError::from)?;
    Ok(HttpResponse::Created().json(order))
}

/// Create-or-get the payment order for a business order and return its payable artifact.
pub async fn pay_order<B, G>(
    path: web::Path<String>,
    api: web::Data<SettlementFlowApi<B, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: SettlementDatabase,
    G: PayGateApi,
{
    let reference = OrderNumber::from(path.into_inner());
    debug!("💻️ POST pay for order {reference}");
    let business = api
        .db()
        .fetch_business_order(&reference)
        .await
        .map_err(ServerError::from)?
        .ok_or_else(|| ServerError::NoRecordFound(format!("business order {reference}")))?;
    let payable = api.create_or_get_payment_order(business.order_type, &reference, business.amount).await?;
    Ok(HttpResponse::Ok().json(payable))
}

/// The pull-path status accessor for a payment order.
pub async fn payment_status<B, G>(
    path: web::Path<String>,
    api: web::Data<SettlementFlowApi<B, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: SettlementDatabase,
    G: PayGateApi,
{
    let order_number = OrderNumber::from(path.into_inner());
    let check = api.check_payment_status(&order_number).await?;
    Ok(HttpResponse::Ok().json(check))
}

/// Puts a business order into the refund workflow and drives it immediately. The sweeper re-drives it later if
/// this attempt could not finish.
pub async fn refund_order<B, G>(
    path: web::Path<String>,
    refunds: web::Data<RefundApi<B, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: SettlementDatabase,
    G: PayGateApi,
{
    let reference = OrderNumber::from(path.into_inner());
    debug!("💻️ POST refund for order {reference}");
    refunds.request_refund(&reference).await?;
    let outcome = refunds.process_refund(&reference).await?;
    let response = match outcome {
        RefundOutcome::Refunded(order) => {
            JsonResponse::success(format!("Order {} refunded", order.order_number))
        },
        RefundOutcome::Locked { reason, .. } => JsonResponse::failure(format!("Refund is held: {reason}")),
        RefundOutcome::Skipped { status, .. } => {
            JsonResponse::failure(format!("Nothing to refund; order is {status}"))
        },
    };
    Ok(HttpResponse::Ok().json(response))
}

/// Agent cash-out.
pub async fn request_withdrawal<B, G>(
    body: web::Json<WithdrawalRequest>,
    refunds: web::Data<RefundApi<B, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: SettlementDatabase,
    G: PayGateApi,
{
    let request = body.into_inner();
    debug!("💻️ POST withdrawal of {} cents for {}", request.amount, request.actor_id);
    let outcome = refunds
        .request_withdrawal(&request.actor_id, gsp_common::Money::from_cents(request.amount), &request.account)
        .await?;
    let response = match outcome {
        WithdrawalOutcome::Accepted { withdrawal } => HttpResponse::Ok()
            .json(JsonResponse::success(format!("Withdrawal {} accepted", withdrawal.out_biz_no))),
        WithdrawalOutcome::Failed { reason, .. } => {
            HttpResponse::Ok().json(JsonResponse::failure(format!("Withdrawal failed: {reason}")))
        },
    };
    Ok(response)
}
