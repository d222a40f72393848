//! Ledger reconciliation behaviour: serialized payment-order creation, idempotent event application, and
//! out-of-order delivery tolerance.
mod support;

use std::{
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicI32, Ordering},
        Arc,
    },
};

use futures_util::future::join_all;
use gofer_settlement_engine::{
    db_types::{BusinessOrderStatus, OrderNumber, OrderType, PaymentOrderStatus},
    events::{EventHandler, EventProducers, PaymentOrderPaidEvent},
    ClaimOutcome,
    ReconcileOutcome,
    SettlementApiError,
    SettlementDatabase,
    SettlementFlowApi,
    TradeEvent,
};
use gsp_common::Money;
use paygate_tools::TradeStatus;
use support::TestHarness;

#[tokio::test]
async fn concurrent_creates_share_one_payment_order() {
    let h = TestHarness::new().await;
    h.db.insert_business_order(support::new_order("R-100", OrderType::Parcel)).await.unwrap();
    let mut tasks = Vec::new();
    for _ in 0..8 {
        let db = h.db.clone();
        let gateway = h.gateway.clone();
        let locks = Arc::clone(&h.locks);
        tasks.push(tokio::spawn(async move {
            let api = SettlementFlowApi::new(db, gateway, locks, EventProducers::default());
            api.create_or_get_payment_order(OrderType::Parcel, &OrderNumber::from("R-100"), Money::from_cents(2500))
                .await
        }));
    }
    let results: Vec<_> = join_all(tasks).await.into_iter().map(|r| r.unwrap().unwrap()).collect();
    let first = &results[0].order_number;
    assert!(results.iter().all(|p| &p.order_number == first), "every caller must see the same payment order");
    assert!(results.iter().all(|p| p.pay_url.is_some()));
    // Only the creator talked to the gateway; everyone else got the cached artifact.
    assert_eq!(h.gateway.artifact_calls(), 1);
    h.tear_down().await;
}

#[tokio::test]
async fn payment_success_applies_once_and_replays_are_noops() {
    let h = TestHarness::new().await;
    h.db.insert_business_order(support::new_order("R-100", OrderType::Parcel)).await.unwrap();

    let hook_calls = Arc::new(AtomicI32::new(0));
    let counter = Arc::clone(&hook_calls);
    let handler = EventHandler::new(
        8,
        Arc::new(move |_: PaymentOrderPaidEvent| {
            let counter = Arc::clone(&counter);
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }) as Pin<Box<dyn Future<Output = ()> + Send>>
        }),
    );
    let mut producers = EventProducers::default();
    producers.order_paid_producer.push(handler.subscribe());
    let api = h.flow_api_with_producers(producers);

    let payable = api
        .create_or_get_payment_order(OrderType::Parcel, &OrderNumber::from("R-100"), Money::from_cents(2500))
        .await
        .unwrap();
    assert!(payable.pay_url.is_some());

    let event = TradeEvent::PaymentSuccess {
        order_number: payable.order_number.clone(),
        trade_status: TradeStatus::Success,
        trade_no: "TN-1".to_string(),
    };
    let outcome = api.apply_trade_event(event.clone()).await.unwrap();
    assert!(matches!(outcome, ReconcileOutcome::Paid { .. }));
    // At-least-once delivery: the identical event lands again.
    let replay = api.apply_trade_event(event.clone()).await.unwrap();
    assert!(replay.is_stale());
    let replay = api.apply_trade_event(event).await.unwrap();
    assert!(replay.is_stale());

    let payment = api.db().fetch_payment_order(&payable.order_number).await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentOrderStatus::Paid);
    assert_eq!(payment.provider_trade_id.as_deref(), Some("TN-1"));
    assert!(payment.paid_at.is_some());
    let business = api.db().fetch_business_order(&OrderNumber::from("R-100")).await.unwrap().unwrap();
    assert_eq!(business.status, BusinessOrderStatus::Pending);

    drop(api);
    handler.start_handler().await;
    assert_eq!(hook_calls.load(Ordering::SeqCst), 1, "exactly one paid notification for N deliveries");
    h.tear_down().await;
}

#[tokio::test]
async fn payment_success_after_trade_close_is_absorbed() {
    let h = TestHarness::new().await;
    h.db.insert_business_order(support::new_order("R-101", OrderType::Shopping)).await.unwrap();
    let api = h.flow_api();
    let payable = api
        .create_or_get_payment_order(OrderType::Shopping, &OrderNumber::from("R-101"), Money::from_cents(2500))
        .await
        .unwrap();

    let closed = api.apply_trade_event(TradeEvent::TradeClosed { order_number: payable.order_number.clone() }).await;
    assert!(matches!(closed.unwrap(), ReconcileOutcome::Cancelled { .. }));
    // A stale WAITING→PAID report arrives after the terminal event.
    let late = api
        .apply_trade_event(TradeEvent::PaymentSuccess {
            order_number: payable.order_number.clone(),
            trade_status: TradeStatus::Success,
            trade_no: "TN-2".to_string(),
        })
        .await
        .unwrap();
    assert!(late.is_stale());

    let payment = api.db().fetch_payment_order(&payable.order_number).await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentOrderStatus::Cancelled);
    let business = api.db().fetch_business_order(&OrderNumber::from("R-101")).await.unwrap().unwrap();
    assert_eq!(business.status, BusinessOrderStatus::Cancelled);
    h.tear_down().await;
}

#[tokio::test]
async fn trade_close_after_payment_success_is_absorbed() {
    let h = TestHarness::new().await;
    h.db.insert_business_order(support::new_order("R-102", OrderType::PurchaseRequest)).await.unwrap();
    let api = h.flow_api();
    let payable = api
        .create_or_get_payment_order(OrderType::PurchaseRequest, &OrderNumber::from("R-102"), Money::from_cents(2500))
        .await
        .unwrap();

    api.apply_trade_event(TradeEvent::PaymentSuccess {
        order_number: payable.order_number.clone(),
        trade_status: TradeStatus::Finished,
        trade_no: "TN-3".to_string(),
    })
    .await
    .unwrap();
    let late = api.apply_trade_event(TradeEvent::TradeClosed { order_number: payable.order_number.clone() }).await;
    assert!(late.unwrap().is_stale());

    let payment = api.db().fetch_payment_order(&payable.order_number).await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentOrderStatus::Paid, "a terminal-or-Paid ledger never moves backward");
    let business = api.db().fetch_business_order(&OrderNumber::from("R-102")).await.unwrap().unwrap();
    assert_eq!(business.status, BusinessOrderStatus::Pending);
    h.tear_down().await;
}

#[tokio::test]
async fn event_keys_short_circuit_duplicates() {
    let h = TestHarness::new().await;
    let api = h.flow_api();

    assert_eq!(api.claim_event("trade:TN-1:TRADE_SUCCESS").await.unwrap(), ClaimOutcome::Claimed);
    assert_eq!(api.claim_event("trade:TN-1:TRADE_SUCCESS").await.unwrap(), ClaimOutcome::AlreadyProcessing);
    api.complete_event("trade:TN-1:TRADE_SUCCESS").await.unwrap();
    assert_eq!(api.claim_event("trade:TN-1:TRADE_SUCCESS").await.unwrap(), ClaimOutcome::AlreadyCompleted);

    // A failed handling attempt leaves the key retryable.
    assert_eq!(api.claim_event("msg:M-77").await.unwrap(), ClaimOutcome::Claimed);
    api.fail_event("msg:M-77").await.unwrap();
    assert_eq!(api.claim_event("msg:M-77").await.unwrap(), ClaimOutcome::Claimed);
    h.tear_down().await;
}

#[tokio::test]
async fn ledger_survives_artifact_mint_failure() {
    let h = TestHarness::new().await;
    h.db.insert_business_order(support::new_order("R-103", OrderType::Parcel)).await.unwrap();
    let api = h.flow_api();
    h.gateway.fail_next_artifacts(1);

    let reference = OrderNumber::from("R-103");
    let first = api.create_or_get_payment_order(OrderType::Parcel, &reference, Money::from_cents(2500)).await;
    assert!(matches!(first, Err(SettlementApiError::Gateway(_))));

    // The ledger row persisted; the retry reuses it and mints the artifact this time.
    let second =
        api.create_or_get_payment_order(OrderType::Parcel, &reference, Money::from_cents(2500)).await.unwrap();
    assert!(second.pay_url.is_some());
    assert_eq!(h.gateway.artifact_calls(), 2);

    // Further calls serve the cached artifact without another gateway round trip.
    let third = api.create_or_get_payment_order(OrderType::Parcel, &reference, Money::from_cents(2500)).await.unwrap();
    assert_eq!(third.order_number, second.order_number);
    assert_eq!(h.gateway.artifact_calls(), 2);
    h.tear_down().await;
}

#[tokio::test]
async fn expired_waiting_intent_is_replaced_on_reuse() {
    let h = TestHarness::new().await;
    h.db.insert_business_order(support::new_order("R-104", OrderType::Parcel)).await.unwrap();
    let reference = OrderNumber::from("R-104");

    let instant_expiry = h.flow_api().with_payment_validity(chrono::Duration::zero());
    let stale =
        instant_expiry.create_or_get_payment_order(OrderType::Parcel, &reference, Money::from_cents(2500)).await.unwrap();

    let api = h.flow_api();
    let fresh = api.create_or_get_payment_order(OrderType::Parcel, &reference, Money::from_cents(2500)).await.unwrap();
    assert_ne!(stale.order_number, fresh.order_number);
    let retired = api.db().fetch_payment_order(&stale.order_number).await.unwrap().unwrap();
    assert_eq!(retired.status, PaymentOrderStatus::Cancelled);
    h.tear_down().await;
}

#[tokio::test]
async fn non_payable_orders_are_rejected() {
    let h = TestHarness::new().await;
    h.db.insert_business_order(support::new_order("R-105", OrderType::Shopping)).await.unwrap();
    h.db.lock_business_order(&OrderNumber::from("R-105"), "operator hold").await.unwrap();
    let api = h.flow_api();
    let result =
        api.create_or_get_payment_order(OrderType::Shopping, &OrderNumber::from("R-105"), Money::from_cents(2500)).await;
    assert!(matches!(result, Err(SettlementApiError::NotPayable(_))));
    h.tear_down().await;
}

#[tokio::test]
async fn pull_path_confirms_through_the_same_transition() {
    let h = TestHarness::new().await;
    h.db.insert_business_order(support::new_order("R-106", OrderType::Parcel)).await.unwrap();
    let api = h.flow_api();
    let payable = api
        .create_or_get_payment_order(OrderType::Parcel, &OrderNumber::from("R-106"), Money::from_cents(2500))
        .await
        .unwrap();

    // Nothing on the gateway yet.
    let check = api.check_payment_status(&payable.order_number).await.unwrap();
    assert!(matches!(check, gofer_settlement_engine::PaymentStatusCheck::StillWaiting));

    h.gateway.set_trade_status(payable.order_number.as_str(), TradeStatus::Success, "TN-9");
    let check = api.check_payment_status(&payable.order_number).await.unwrap();
    assert!(matches!(check, gofer_settlement_engine::PaymentStatusCheck::ConfirmedPaid(TradeStatus::Success)));
    let business = api.db().fetch_business_order(&OrderNumber::from("R-106")).await.unwrap().unwrap();
    assert_eq!(business.status, BusinessOrderStatus::Pending);

    // Pulling again re-reports the confirmation but the ledger absorbs it as a no-op.
    let check = api.check_payment_status(&payable.order_number).await.unwrap();
    assert!(matches!(check, gofer_settlement_engine::PaymentStatusCheck::ConfirmedPaid(TradeStatus::Success)));
    let payment = api.db().fetch_payment_order(&payable.order_number).await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentOrderStatus::Paid);
    h.tear_down().await;
}
