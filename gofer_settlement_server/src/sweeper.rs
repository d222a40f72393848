use std::sync::Arc;

use gofer_settlement_engine::{events::EventProducers, locks::LockManager, SqliteDatabase, SweeperApi};
use log::*;
use paygate_tools::PayGateClient;
use tokio::task::JoinHandle;

use crate::config::ServerConfig;

/// Starts the staleness sweeper. Do not await the returned JoinHandle, as it will run indefinitely.
pub fn start_sweeper(
    db: SqliteDatabase,
    gateway: PayGateClient,
    locks: Arc<LockManager>,
    producers: EventProducers,
    config: &ServerConfig,
) -> JoinHandle<()> {
    let api =
        SweeperApi::new(db, gateway, Arc::clone(&locks), producers, config.refund_policy(), config.sweep_config());
    let interval = config.sweep_interval;
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        info!("🕰️ Staleness sweeper started");
        loop {
            timer.tick().await;
            let reclaimed = locks.sweep_expired();
            if reclaimed > 0 {
                debug!("🕰️ Reclaimed {reclaimed} expired locks");
            }
            match api.run_sweep().await {
                Ok(summary) => {
                    info!(
                        "🕰️ Sweep complete: {} reassigned, {} archived, {} refunds driven, {} payment intents \
                         expired, {} failures",
                        summary.reassigned.len(),
                        summary.archived.len(),
                        summary.refunds_completed + summary.refunds_locked,
                        summary.expired_payment_orders.len(),
                        summary.failures
                    );
                },
                Err(e) => {
                    error!("🕰️ Error running staleness sweep: {e}");
                },
            }
        }
    })
}
