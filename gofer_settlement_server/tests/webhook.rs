//! End-to-end webhook ingestion: the R-100 scenario, replay safety, and signature rejection.
use std::sync::Arc;

use actix_web::{test, App};
use gofer_settlement_engine::{
    db_types::{BusinessOrderStatus, OrderNumber, PaymentOrderStatus},
    events::EventProducers,
    locks::LockManager,
    test_utils::prepare_env::{prepare_test_env, random_db_path},
    SettlementDatabase,
    SqliteDatabase,
};
use gofer_settlement_server::{
    config::ServerConfig,
    paygate_routes::{WEBHOOK_ACK, WEBHOOK_RETRY},
    server::configure_app,
};
use gsp_common::Secret;
use paygate_tools::{signing, testing::TestGateway};
use serde_json::json;

const SECRET: &str = "test-secret";

struct WebhookHarness {
    db: SqliteDatabase,
    gateway: TestGateway,
    config: ServerConfig,
}

async fn harness() -> WebhookHarness {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
    let gateway = TestGateway::new();
    let mut config = ServerConfig::default();
    config.paygate.gateway_secret = Secret::new(SECRET.to_string());
    WebhookHarness { db, gateway, config }
}

fn signed_form(pairs: &[(&str, &str)]) -> String {
    let mut params: Vec<(String, String)> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    let sig = signing::sign_params(SECRET, &params);
    params.push((signing::SIGN_FIELD.to_string(), sig));
    serde_urlencoded::to_string(&params).expect("Error encoding form")
}

fn webhook_request(body: String) -> actix_web::test::TestRequest {
    test::TestRequest::post()
        .uri("/paygate/webhook")
        .insert_header(("content-type", "application/x-www-form-urlencoded"))
        .set_payload(body)
}

#[actix_web::test]
async fn webhook_confirms_a_payment_exactly_once() {
    let h = harness().await;
    let locks = Arc::new(LockManager::new(std::time::Duration::from_secs(5), std::time::Duration::from_secs(2)));
    let app = test::init_service(App::new().configure(configure_app(
        h.db.clone(),
        h.gateway.clone(),
        locks,
        EventProducers::default(),
        &h.config,
    )))
    .await;

    // Register the business order with the settlement core.
    let order = json!({
        "order_number": "R-100",
        "order_type": "Parcel",
        "requester_id": "requester-1",
        "amount": 2500,
        "agent_fee": 1500,
        "platform_fee": 500,
    });
    let resp = test::call_service(&app, test::TestRequest::post().uri("/orders").set_json(&order).to_request()).await;
    assert_eq!(resp.status(), 201);

    // Mint the payment intent.
    let resp =
        test::call_service(&app, test::TestRequest::post().uri("/orders/R-100/pay").to_request()).await;
    assert!(resp.status().is_success());
    let payable: serde_json::Value = test::read_body_json(resp).await;
    let order_number = payable["order_number"].as_str().unwrap().to_string();
    assert_eq!(payable["amount"], 2500);
    assert!(payable["pay_url"].as_str().unwrap().contains(&order_number));

    // The gateway confirms payment.
    let body = signed_form(&[
        ("notify_type", "trade_changed"),
        ("out_trade_no", &order_number),
        ("trade_no", "TN-100"),
        ("trade_status", "TRADE_SUCCESS"),
    ]);
    let resp = test::call_service(&app, webhook_request(body.clone()).to_request()).await;
    assert!(resp.status().is_success());
    assert_eq!(test::read_body(resp).await, WEBHOOK_ACK.as_bytes());

    let payment = h.db.fetch_payment_order(&OrderNumber::from(order_number.as_str())).await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentOrderStatus::Paid);
    assert_eq!(payment.provider_trade_id.as_deref(), Some("TN-100"));
    let business = h.db.fetch_business_order(&OrderNumber::from("R-100")).await.unwrap().unwrap();
    assert_eq!(business.status, BusinessOrderStatus::Pending);

    // The gateway redelivers the identical payload: same ack token, no further state change.
    let resp = test::call_service(&app, webhook_request(body).to_request()).await;
    assert_eq!(test::read_body(resp).await, WEBHOOK_ACK.as_bytes());
    let payment = h.db.fetch_payment_order(&OrderNumber::from(order_number.as_str())).await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentOrderStatus::Paid);
}

#[actix_web::test]
async fn tampered_webhooks_are_rejected_without_state_change() {
    let h = harness().await;
    let locks = Arc::new(LockManager::new(std::time::Duration::from_secs(5), std::time::Duration::from_secs(2)));
    let app = test::init_service(App::new().configure(configure_app(
        h.db.clone(),
        h.gateway.clone(),
        locks,
        EventProducers::default(),
        &h.config,
    )))
    .await;

    let mut params: Vec<(String, String)> = [
        ("notify_type", "trade_changed"),
        ("out_trade_no", "GSP-bogus"),
        ("trade_status", "TRADE_SUCCESS"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    params.push((signing::SIGN_FIELD.to_string(), "deadbeef".to_string()));
    let body = serde_urlencoded::to_string(&params).unwrap();
    let resp = test::call_service(&app, webhook_request(body).to_request()).await;
    assert_eq!(resp.status(), 403);

    // Missing signature is the same authenticity failure.
    let body = serde_urlencoded::to_string(&[("notify_type", "trade_changed"), ("out_trade_no", "GSP-bogus")])
        .unwrap();
    let resp = test::call_service(&app, webhook_request(body).to_request()).await;
    assert_eq!(resp.status(), 403);
}

#[actix_web::test]
async fn webhooks_for_unknown_orders_ask_for_a_retry() {
    let h = harness().await;
    let locks = Arc::new(LockManager::new(std::time::Duration::from_secs(5), std::time::Duration::from_secs(2)));
    let app = test::init_service(App::new().configure(configure_app(
        h.db.clone(),
        h.gateway.clone(),
        locks,
        EventProducers::default(),
        &h.config,
    )))
    .await;

    let body = signed_form(&[
        ("notify_type", "trade_changed"),
        ("out_trade_no", "GSP-unknown"),
        ("trade_status", "TRADE_SUCCESS"),
    ]);
    let resp = test::call_service(&app, webhook_request(body.clone()).to_request()).await;
    assert!(resp.status().is_success());
    assert_eq!(test::read_body(resp).await, WEBHOOK_RETRY.as_bytes());

    // A Failed event key does not block the retry the gateway will send.
    let resp = test::call_service(&app, webhook_request(body).to_request()).await;
    assert_eq!(test::read_body(resp).await, WEBHOOK_RETRY.as_bytes());
}

#[actix_web::test]
async fn push_messages_deduplicate_on_the_message_id() {
    let h = harness().await;
    let locks = Arc::new(LockManager::new(std::time::Duration::from_secs(5), std::time::Duration::from_secs(2)));
    let app = test::init_service(App::new().configure(configure_app(
        h.db.clone(),
        h.gateway.clone(),
        locks,
        EventProducers::default(),
        &h.config,
    )))
    .await;

    let payload = json!({"batch_id": "B-2024-06-10"}).to_string();
    let fields = vec![
        ("body".to_string(), payload.clone()),
        ("kind".to_string(), "settlement".to_string()),
        ("msg_id".to_string(), "M-42".to_string()),
    ];
    let sign = signing::sign_params(SECRET, &fields);
    let message = json!({"msg_id": "M-42", "kind": "settlement", "body": payload, "sign": sign});

    let resp = test::call_service(
        &app,
        test::TestRequest::post().uri("/paygate/messages").set_json(&message).to_request(),
    )
    .await;
    assert!(resp.status().is_success());
    let first: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(first["success"], true);

    let resp = test::call_service(
        &app,
        test::TestRequest::post().uri("/paygate/messages").set_json(&message).to_request(),
    )
    .await;
    let second: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(second["message"], "duplicate delivery");
}
