#![allow(dead_code)]
pub mod prepare_env;

use std::{sync::Arc, time::Duration};

use gofer_settlement_engine::{
    db_types::{NewBusinessOrder, OrderNumber, OrderType},
    events::EventProducers,
    locks::LockManager,
    RefundApi,
    RefundPolicy,
    SettlementDatabase,
    SettlementFlowApi,
    SqliteDatabase,
    SweepConfig,
    SweeperApi,
};
use gsp_common::Money;
use paygate_tools::testing::TestGateway;
use sqlx::{migrate::MigrateDatabase, Sqlite};

pub struct TestHarness {
    pub url: String,
    pub db: SqliteDatabase,
    pub gateway: TestGateway,
    pub locks: Arc<LockManager>,
}

impl TestHarness {
    pub async fn new() -> Self {
        let url = prepare_env::random_db_path();
        prepare_env::prepare_test_env(&url).await;
        let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
        let gateway = TestGateway::new();
        let locks = Arc::new(LockManager::new(Duration::from_secs(5), Duration::from_secs(2)));
        Self { url, db, gateway, locks }
    }

    pub fn flow_api(&self) -> SettlementFlowApi<SqliteDatabase, TestGateway> {
        self.flow_api_with_producers(EventProducers::default())
    }

    pub fn flow_api_with_producers(
        &self,
        producers: EventProducers,
    ) -> SettlementFlowApi<SqliteDatabase, TestGateway> {
        SettlementFlowApi::new(self.db.clone(), self.gateway.clone(), Arc::clone(&self.locks), producers)
    }

    pub fn refund_api(&self, policy: RefundPolicy) -> RefundApi<SqliteDatabase, TestGateway> {
        self.refund_api_with_producers(EventProducers::default(), policy)
    }

    pub fn refund_api_with_producers(
        &self,
        producers: EventProducers,
        policy: RefundPolicy,
    ) -> RefundApi<SqliteDatabase, TestGateway> {
        RefundApi::new(self.db.clone(), self.gateway.clone(), Arc::clone(&self.locks), producers, policy)
    }

    pub fn sweeper(&self, config: SweepConfig) -> SweeperApi<SqliteDatabase, TestGateway> {
        SweeperApi::new(
            self.db.clone(),
            self.gateway.clone(),
            Arc::clone(&self.locks),
            EventProducers::default(),
            RefundPolicy::default(),
            config,
        )
    }

    pub async fn tear_down(mut self) {
        let _ = self.db.close().await;
        Sqlite::drop_database(&self.url).await.expect("Error dropping test database");
    }
}

/// A business order with the fee split used throughout the tests: 25.00 total, 15.00 agent income, 5.00 platform.
pub fn new_order(order_number: &str, order_type: OrderType) -> NewBusinessOrder {
    NewBusinessOrder::new(
        OrderNumber::from(order_number),
        order_type,
        "requester-1".to_string(),
        Money::from_cents(2500),
    )
    .with_fees(Money::from_cents(1500), Money::from_cents(500))
}
