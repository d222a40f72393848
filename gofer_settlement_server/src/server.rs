use std::{sync::Arc, time::Duration};

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use gofer_settlement_engine::{
    events::{EventHandlers, EventProducers},
    locks::LockManager,
    RefundApi,
    SettlementDatabase,
    SettlementFlowApi,
    SqliteDatabase,
};
use paygate_tools::{PayGateApi, PayGateClient};

use crate::{
    config::ServerConfig,
    errors::ServerError,
    notifier::{notification_hooks, LogNotifier, Notifier},
    paygate_routes::{paygate_messages, paygate_webhook, NotificationVerifier},
    routes,
    sweeper::start_sweeper,
};

const EVENT_BUFFER_SIZE: usize = 32;

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let gateway =
        PayGateClient::new(config.paygate.clone()).map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);
    let handlers = EventHandlers::new(EVENT_BUFFER_SIZE, notification_hooks(notifier));
    let producers = handlers.producers();
    handlers.start_handlers().await;
    let locks = Arc::new(LockManager::new(config.lock_ttl, config.lock_wait));
    start_sweeper(db.clone(), gateway.clone(), Arc::clone(&locks), producers.clone(), &config);
    let srv = create_server_instance(config, db, gateway, locks, producers)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    gateway: PayGateClient,
    locks: Arc<LockManager>,
    producers: EventProducers,
) -> Result<Server, ServerError> {
    let host = config.host.clone();
    let port = config.port;
    let srv = HttpServer::new(move || {
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("gsp::access_log"))
            .configure(configure_app(db.clone(), gateway.clone(), Arc::clone(&locks), producers.clone(), &config))
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((host.as_str(), port))?
    .run();
    Ok(srv)
}

/// Registers the app data and routes. Generic over the backend and gateway so the test suite can assemble the same
/// application around the in-memory gateway.
pub fn configure_app<B, G>(
    db: B,
    gateway: G,
    locks: Arc<LockManager>,
    producers: EventProducers,
    config: &ServerConfig,
) -> impl FnOnce(&mut web::ServiceConfig)
where
    B: SettlementDatabase + Send + Sync + 'static,
    G: PayGateApi + Send + Sync + 'static,
{
    let flow_api = SettlementFlowApi::new(db.clone(), gateway.clone(), Arc::clone(&locks), producers.clone())
        .with_payment_validity(config.payment_validity);
    let refund_api = RefundApi::new(db, gateway, locks, producers, config.refund_policy());
    let verifier = NotificationVerifier::new(config.paygate.gateway_secret.clone());
    move |service_config: &mut web::ServiceConfig| {
        service_config
            .app_data(web::Data::new(flow_api))
            .app_data(web::Data::new(refund_api))
            .app_data(web::Data::new(verifier))
            .service(routes::health)
            .route("/orders", web::post().to(routes::create_order::<B, G>))
            .route("/orders/{order_number}/pay", web::post().to(routes::pay_order::<B, G>))
            .route("/orders/{order_number}/refund", web::post().to(routes::refund_order::<B, G>))
            .route("/payments/{order_number}/status", web::get().to(routes::payment_status::<B, G>))
            .route("/withdrawals", web::post().to(routes::request_withdrawal::<B, G>))
            .route("/paygate/webhook", web::post().to(paygate_webhook::<B, G>))
            .route("/paygate/messages", web::post().to(paygate_messages::<B, G>));
    }
}
