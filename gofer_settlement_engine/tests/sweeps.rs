//! Timeout/reassignment sweeping, tier-dependent archival, and sweep-driven refunds.
mod support;

use chrono::{Duration, Utc};
use gofer_settlement_engine::{
    db_types::{BusinessOrderStatus, OrderNumber, OrderType, PaymentOrderStatus, ServiceTier},
    RefundPolicy,
    SettlementDatabase,
    SweepConfig,
    TradeEvent,
};
use gsp_common::Money;
use paygate_tools::TradeStatus;
use support::TestHarness;

const AGENT: &str = "agent-9";

/// Seeds a paid order assigned to an agent whose fulfillment deadline already lapsed.
async fn overdue_assigned_order(h: &TestHarness, reference: &str, tier: ServiceTier) -> OrderNumber {
    let reference = OrderNumber::from(reference);
    let order = support::new_order(reference.as_str(), OrderType::Parcel)
        .with_agent(AGENT)
        .with_tier(tier)
        .with_deadline(Utc::now() - Duration::minutes(10));
    h.db.insert_business_order(order).await.unwrap();
    let api = h.flow_api();
    let payable =
        api.create_or_get_payment_order(OrderType::Parcel, &reference, Money::from_cents(2500)).await.unwrap();
    api.apply_trade_event(TradeEvent::PaymentSuccess {
        order_number: payable.order_number,
        trade_status: TradeStatus::Success,
        trade_no: format!("TN-{reference}"),
    })
    .await
    .unwrap();
    // Payment moved the pre-assigned parcel straight to Assigned.
    reference
}

#[tokio::test]
async fn standard_order_is_archived_exactly_on_the_third_timeout_sweep() {
    let h = TestHarness::new().await;
    let reference = overdue_assigned_order(&h, "R-300", ServiceTier::Standard).await;
    let sweeper = h.sweeper(SweepConfig::default());

    // Sweep 1: timed out, reassignable again.
    let summary = sweeper.run_sweep().await.unwrap();
    assert_eq!(summary.reassigned, vec![reference.clone()]);
    assert!(summary.archived.is_empty());
    let order = h.db.fetch_business_order(&reference).await.unwrap().unwrap();
    assert_eq!(order.status, BusinessOrderStatus::Pending);
    assert_eq!(order.timeout_count, 1);
    assert!(order.agent_id.is_none());

    // Another courier takes it, and it goes stale again.
    h.db.assign_agent(&reference, AGENT).await.unwrap();
    let summary = sweeper.run_sweep().await.unwrap();
    assert_eq!(summary.reassigned, vec![reference.clone()]);
    assert_eq!(h.db.fetch_business_order(&reference).await.unwrap().unwrap().timeout_count, 2);

    // Third strike: archived, gone from the live set.
    h.db.assign_agent(&reference, AGENT).await.unwrap();
    let summary = sweeper.run_sweep().await.unwrap();
    assert_eq!(summary.archived, vec![reference.clone()]);
    assert!(summary.reassigned.is_empty());
    assert!(h.db.fetch_business_order(&reference).await.unwrap().is_none());
    h.tear_down().await;
}

#[tokio::test]
async fn expedited_orders_hit_the_lower_archival_threshold() {
    let h = TestHarness::new().await;
    let reference = overdue_assigned_order(&h, "R-301", ServiceTier::Expedited).await;
    let sweeper = h.sweeper(SweepConfig::default());

    let summary = sweeper.run_sweep().await.unwrap();
    assert_eq!(summary.reassigned, vec![reference.clone()]);

    h.db.assign_agent(&reference, AGENT).await.unwrap();
    let summary = sweeper.run_sweep().await.unwrap();
    assert_eq!(summary.archived, vec![reference.clone()]);
    assert!(h.db.fetch_business_order(&reference).await.unwrap().is_none());
    h.tear_down().await;
}

#[tokio::test]
async fn overdue_refunds_are_driven_with_per_order_isolation() {
    let h = TestHarness::new().await;
    // Two refunding orders: one agent can cover the refund, the other cannot.
    let funded = OrderNumber::from("R-302");
    let starved = OrderNumber::from("R-303");
    for (reference, agent) in [(&funded, "agent-funded"), (&starved, "agent-starved")] {
        h.db.insert_business_order(
            support::new_order(reference.as_str(), OrderType::Shopping).with_agent(agent),
        )
        .await
        .unwrap();
        let api = h.flow_api();
        let payable =
            api.create_or_get_payment_order(OrderType::Shopping, reference, Money::from_cents(2500)).await.unwrap();
        api.apply_trade_event(TradeEvent::PaymentSuccess {
            order_number: payable.order_number,
            trade_status: TradeStatus::Success,
            trade_no: format!("TN-{reference}"),
        })
        .await
        .unwrap();
        let refunds = h.refund_api(RefundPolicy::default());
        refunds.request_refund(reference).await.unwrap();
    }
    h.db.credit_wallet("agent-funded", Money::from_cents(2000)).await.unwrap();
    h.db.credit_wallet("agent-starved", Money::from_cents(100)).await.unwrap();

    let config = SweepConfig { refund_grace: Duration::zero(), ..SweepConfig::default() };
    let summary = h.sweeper(config).run_sweep().await.unwrap();
    assert_eq!(summary.refunds_completed, 1);
    assert_eq!(summary.refunds_locked, 1);

    assert_eq!(h.db.fetch_business_order(&funded).await.unwrap().unwrap().status, BusinessOrderStatus::Refunded);
    assert_eq!(h.db.fetch_business_order(&starved).await.unwrap().unwrap().status, BusinessOrderStatus::Locked);
    h.tear_down().await;
}

#[tokio::test]
async fn expired_payment_intents_are_cancelled_and_closed_at_the_gateway() {
    let h = TestHarness::new().await;
    h.db.insert_business_order(support::new_order("R-304", OrderType::Parcel)).await.unwrap();
    let api = h.flow_api().with_payment_validity(Duration::zero());
    let payable = api
        .create_or_get_payment_order(OrderType::Parcel, &OrderNumber::from("R-304"), Money::from_cents(2500))
        .await
        .unwrap();

    let summary = h.sweeper(SweepConfig::default()).run_sweep().await.unwrap();
    assert_eq!(summary.expired_payment_orders, vec![payable.order_number.clone()]);

    let payment = h.db.fetch_payment_order(&payable.order_number).await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentOrderStatus::Cancelled);
    let business = h.db.fetch_business_order(&OrderNumber::from("R-304")).await.unwrap().unwrap();
    assert_eq!(business.status, BusinessOrderStatus::Cancelled);
    assert_eq!(h.gateway.closed_trades(), vec![payable.order_number.as_str().to_string()]);
    h.tear_down().await;
}

#[tokio::test]
async fn orders_within_their_deadline_are_left_alone() {
    let h = TestHarness::new().await;
    let reference = OrderNumber::from("R-305");
    let order = support::new_order(reference.as_str(), OrderType::Parcel)
        .with_agent(AGENT)
        .with_deadline(Utc::now() + Duration::hours(1));
    h.db.insert_business_order(order).await.unwrap();
    let api = h.flow_api();
    let payable =
        api.create_or_get_payment_order(OrderType::Parcel, &reference, Money::from_cents(2500)).await.unwrap();
    api.apply_trade_event(TradeEvent::PaymentSuccess {
        order_number: payable.order_number,
        trade_status: TradeStatus::Success,
        trade_no: "TN-305".to_string(),
    })
    .await
    .unwrap();

    let summary = h.sweeper(SweepConfig::default()).run_sweep().await.unwrap();
    assert_eq!(summary.total_touched(), 0);
    let order = h.db.fetch_business_order(&reference).await.unwrap().unwrap();
    assert_eq!(order.status, BusinessOrderStatus::Assigned);
    assert_eq!(order.timeout_count, 0);
    h.tear_down().await;
}
