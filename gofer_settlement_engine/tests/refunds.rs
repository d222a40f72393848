//! Refund workflow and withdrawal (cash-out) behaviour.
mod support;

use std::{
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicI32, Ordering},
        Arc,
    },
};

use gofer_settlement_engine::{
    db_types::{BusinessOrderStatus, OrderNumber, OrderType, PaymentOrderStatus, WithdrawalStatus},
    events::{EventHandler, EventProducers, OrderLockedEvent},
    RefundOutcome,
    RefundPolicy,
    SettlementApiError,
    SettlementDatabase,
    SettlementDatabaseError,
    TradeEvent,
    WithdrawalOutcome,
};
use gsp_common::Money;
use paygate_tools::{PayGateError, TradeStatus, TransferStatus};
use support::TestHarness;

const AGENT: &str = "agent-7";
const REQUESTER: &str = "requester-1";

/// Seeds a paid business order with an assigned agent, ready to enter the refund workflow. Returns the business
/// order reference and the payment order number settling it.
async fn paid_order_with_agent(h: &TestHarness, reference: &str) -> (OrderNumber, OrderNumber) {
    let reference = OrderNumber::from(reference);
    h.db.insert_business_order(support::new_order(reference.as_str(), OrderType::Parcel).with_agent(AGENT))
        .await
        .unwrap();
    let api = h.flow_api();
    let payable =
        api.create_or_get_payment_order(OrderType::Parcel, &reference, Money::from_cents(2500)).await.unwrap();
    api.apply_trade_event(TradeEvent::PaymentSuccess {
        order_number: payable.order_number.clone(),
        trade_status: TradeStatus::Success,
        trade_no: format!("TN-{reference}"),
    })
    .await
    .unwrap();
    (reference, payable.order_number)
}

#[tokio::test]
async fn refund_moves_the_agent_share_to_the_payer() {
    let h = TestHarness::new().await;
    let (reference, payment_no) = paid_order_with_agent(&h, "R-200").await;
    h.db.credit_wallet(AGENT, Money::from_cents(2000)).await.unwrap();

    let refunds = h.refund_api(RefundPolicy::default());
    refunds.request_refund(&reference).await.unwrap();
    let outcome = refunds.process_refund(&reference).await.unwrap();
    assert!(matches!(outcome, RefundOutcome::Refunded(_)));

    // The agent's entitled share (15.00) moved, not the payer's full 25.00.
    let agent_wallet = h.db.fetch_wallet(AGENT).await.unwrap().unwrap();
    assert_eq!(agent_wallet.available(), Money::from_cents(500));
    let payer_wallet = h.db.fetch_wallet(REQUESTER).await.unwrap().unwrap();
    assert_eq!(payer_wallet.balance, Money::from_cents(1500));

    let business = h.db.fetch_business_order(&reference).await.unwrap().unwrap();
    assert_eq!(business.status, BusinessOrderStatus::Refunded);
    // The ledger row retired alongside.
    let payment = h.db.fetch_payment_order(&payment_no).await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentOrderStatus::Refunded);
    h.tear_down().await;
}

#[tokio::test]
async fn refund_with_insufficient_agent_funds_locks_without_touching_wallets() {
    let h = TestHarness::new().await;
    let (reference, _) = paid_order_with_agent(&h, "R-201").await;
    h.db.credit_wallet(AGENT, Money::from_cents(900)).await.unwrap();

    let locked_notifications = Arc::new(AtomicI32::new(0));
    let counter = Arc::clone(&locked_notifications);
    let handler = EventHandler::new(
        8,
        Arc::new(move |_: OrderLockedEvent| {
            let counter = Arc::clone(&counter);
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }) as Pin<Box<dyn Future<Output = ()> + Send>>
        }),
    );
    let mut producers = EventProducers::default();
    producers.order_locked_producer.push(handler.subscribe());
    let refunds = h.refund_api_with_producers(producers, RefundPolicy::default());

    refunds.request_refund(&reference).await.unwrap();
    let outcome = refunds.process_refund(&reference).await.unwrap();
    assert!(matches!(outcome, RefundOutcome::Locked { .. }));

    let business = h.db.fetch_business_order(&reference).await.unwrap().unwrap();
    assert_eq!(business.status, BusinessOrderStatus::Locked);
    assert!(business.locked_reason.is_some());
    let agent_wallet = h.db.fetch_wallet(AGENT).await.unwrap().unwrap();
    assert_eq!(agent_wallet.available(), Money::from_cents(900), "zero wallet mutation on a locked refund");
    assert!(h.db.fetch_wallet(REQUESTER).await.unwrap().is_none());

    drop(refunds);
    handler.start_handler().await;
    assert_eq!(locked_notifications.load(Ordering::SeqCst), 1);
    h.tear_down().await;
}

#[tokio::test]
async fn refund_without_an_agent_locks_the_order() {
    let h = TestHarness::new().await;
    let reference = OrderNumber::from("R-202");
    h.db.insert_business_order(support::new_order("R-202", OrderType::Shopping)).await.unwrap();
    let api = h.flow_api();
    let payable =
        api.create_or_get_payment_order(OrderType::Shopping, &reference, Money::from_cents(2500)).await.unwrap();
    api.apply_trade_event(TradeEvent::PaymentSuccess {
        order_number: payable.order_number,
        trade_status: TradeStatus::Success,
        trade_no: "TN-202".to_string(),
    })
    .await
    .unwrap();

    let refunds = h.refund_api(RefundPolicy::default());
    refunds.request_refund(&reference).await.unwrap();
    let outcome = refunds.process_refund(&reference).await.unwrap();
    match outcome {
        RefundOutcome::Locked { reason, .. } => assert!(reason.contains("agent")),
        other => panic!("expected Locked, got {other:?}"),
    }
    h.tear_down().await;
}

#[tokio::test]
async fn refund_of_a_non_refunding_order_is_skipped() {
    let h = TestHarness::new().await;
    let (reference, _) = paid_order_with_agent(&h, "R-203").await;
    let refunds = h.refund_api(RefundPolicy::default());
    let outcome = refunds.process_refund(&reference).await.unwrap();
    assert!(matches!(outcome, RefundOutcome::Skipped { status: BusinessOrderStatus::Assigned, .. }));
    h.tear_down().await;
}

#[tokio::test]
async fn unpaid_orders_cannot_request_refunds() {
    let h = TestHarness::new().await;
    h.db.insert_business_order(support::new_order("R-204", OrderType::Parcel)).await.unwrap();
    let refunds = h.refund_api(RefundPolicy::default());
    let result = refunds.request_refund(&OrderNumber::from("R-204")).await;
    assert!(matches!(
        result,
        Err(SettlementApiError::Database(SettlementDatabaseError::WrongOrderStatus { .. }))
    ));
    h.tear_down().await;
}

#[tokio::test]
async fn full_refund_policy_also_transfers_the_platform_share() {
    let h = TestHarness::new().await;
    let (reference, _) = paid_order_with_agent(&h, "R-205").await;
    h.db.credit_wallet(AGENT, Money::from_cents(2000)).await.unwrap();

    let policy = RefundPolicy { full_refund: true, platform_share_percent: 60 };
    let refunds = h.refund_api(policy);
    refunds.request_refund(&reference).await.unwrap();
    let outcome = refunds.process_refund(&reference).await.unwrap();
    assert!(matches!(outcome, RefundOutcome::Refunded(_)));
    // 60% of the 5.00 platform fee goes out through the gateway.
    assert_eq!(h.gateway.transfer_attempts(), 1);
    h.tear_down().await;
}

//----------------------------------------------- Withdrawals ---------------------------------------------------------

#[tokio::test]
async fn withdrawal_debits_the_wallet_and_confirms() {
    let h = TestHarness::new().await;
    h.db.credit_wallet(AGENT, Money::from_cents(5000)).await.unwrap();
    let refunds = h.refund_api(RefundPolicy::default());
    let outcome = refunds.request_withdrawal(AGENT, Money::from_cents(3000), "bank-acct-7").await.unwrap();
    match outcome {
        WithdrawalOutcome::Accepted { withdrawal } => {
            assert_eq!(withdrawal.status, WithdrawalStatus::Confirmed);
            assert!(withdrawal.transfer_order_id.is_some());
        },
        other => panic!("expected Accepted, got {other:?}"),
    }
    let wallet = h.db.fetch_wallet(AGENT).await.unwrap().unwrap();
    assert_eq!(wallet.balance, Money::from_cents(2000));
    h.tear_down().await;
}

#[tokio::test]
async fn withdrawal_retries_transient_faults_with_one_debit() {
    let h = TestHarness::new().await;
    h.db.credit_wallet(AGENT, Money::from_cents(5000)).await.unwrap();
    h.gateway.script_transfer(Err(PayGateError::RequestError("read timeout".to_string())));
    h.gateway.script_transfer(Err(PayGateError::RequestError("connection reset".to_string())));

    let refunds = h.refund_api(RefundPolicy::default());
    let outcome = refunds.request_withdrawal(AGENT, Money::from_cents(1000), "bank-acct-7").await.unwrap();
    assert!(matches!(outcome, WithdrawalOutcome::Accepted { .. }));
    assert_eq!(h.gateway.transfer_attempts(), 3);
    let wallet = h.db.fetch_wallet(AGENT).await.unwrap().unwrap();
    assert_eq!(wallet.balance, Money::from_cents(4000), "retries must not debit twice");
    h.tear_down().await;
}

#[tokio::test]
async fn terminal_withdrawal_failure_restores_the_wallet() {
    let h = TestHarness::new().await;
    h.db.credit_wallet(AGENT, Money::from_cents(5000)).await.unwrap();
    h.gateway
        .script_transfer(Err(PayGateError::Rejected { code: "40001".to_string(), message: "payee blocked".to_string() }));

    let refunds = h.refund_api(RefundPolicy::default());
    let outcome = refunds.request_withdrawal(AGENT, Money::from_cents(1500), "bank-acct-7").await.unwrap();
    match outcome {
        WithdrawalOutcome::Failed { withdrawal, .. } => assert_eq!(withdrawal.status, WithdrawalStatus::Failed),
        other => panic!("expected Failed, got {other:?}"),
    }
    let wallet = h.db.fetch_wallet(AGENT).await.unwrap().unwrap();
    assert_eq!(wallet.balance, Money::from_cents(5000));
    h.tear_down().await;
}

#[tokio::test]
async fn withdrawal_with_insufficient_funds_is_a_typed_error() {
    let h = TestHarness::new().await;
    h.db.credit_wallet(AGENT, Money::from_cents(100)).await.unwrap();
    let refunds = h.refund_api(RefundPolicy::default());
    let result = refunds.request_withdrawal(AGENT, Money::from_cents(5000), "bank-acct-7").await;
    assert!(matches!(
        result,
        Err(SettlementApiError::Database(SettlementDatabaseError::InsufficientFunds { .. }))
    ));
    assert_eq!(h.gateway.transfer_attempts(), 0);
    h.tear_down().await;
}

#[tokio::test]
async fn asynchronous_transfer_failure_settles_once() {
    let h = TestHarness::new().await;
    h.db.credit_wallet(AGENT, Money::from_cents(5000)).await.unwrap();
    h.gateway.script_transfer(Ok(TransferStatus::Processing));

    let refunds = h.refund_api(RefundPolicy::default());
    let outcome = refunds.request_withdrawal(AGENT, Money::from_cents(2000), "bank-acct-7").await.unwrap();
    let withdrawal = match outcome {
        WithdrawalOutcome::Accepted { withdrawal } => {
            assert_eq!(withdrawal.status, WithdrawalStatus::Pending);
            withdrawal
        },
        other => panic!("expected Accepted, got {other:?}"),
    };
    assert_eq!(h.db.fetch_wallet(AGENT).await.unwrap().unwrap().balance, Money::from_cents(3000));

    // The fund-transfer-changed notification reports failure; the amount comes back exactly once.
    let settled =
        refunds.settle_withdrawal(&withdrawal.out_biz_no, TransferStatus::Failed, None).await.unwrap().unwrap();
    assert_eq!(settled.status, WithdrawalStatus::Failed);
    assert_eq!(h.db.fetch_wallet(AGENT).await.unwrap().unwrap().balance, Money::from_cents(5000));
    let replay =
        refunds.settle_withdrawal(&withdrawal.out_biz_no, TransferStatus::Failed, None).await.unwrap().unwrap();
    assert_eq!(replay.status, WithdrawalStatus::Failed);
    assert_eq!(h.db.fetch_wallet(AGENT).await.unwrap().unwrap().balance, Money::from_cents(5000));
    h.tear_down().await;
}
