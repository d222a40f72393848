use std::{env, time::Duration as StdDuration};

use chrono::Duration;
use gofer_settlement_engine::{RefundPolicy, SweepConfig};
use log::*;
use paygate_tools::PayGateConfig;

const DEFAULT_GSP_HOST: &str = "127.0.0.1";
const DEFAULT_GSP_PORT: u16 = 8460;
const DEFAULT_PAYMENT_VALIDITY_MINUTES: i64 = 30;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
const DEFAULT_REFUND_GRACE_MINUTES: i64 = 15;
const DEFAULT_ARCHIVE_THRESHOLD_STANDARD: i64 = 3;
const DEFAULT_ARCHIVE_THRESHOLD_EXPEDITED: i64 = 2;
const DEFAULT_LOCK_TTL: StdDuration = StdDuration::from_secs(10);
const DEFAULT_LOCK_WAIT: StdDuration = StdDuration::from_secs(2);

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// How long a freshly minted payment intent stays payable.
    pub payment_validity: Duration,
    pub sweep_interval: StdDuration,
    /// How long a `Refunding` order may wait before the sweeper drives its refund.
    pub refund_grace: Duration,
    pub standard_archive_threshold: i64,
    pub expedited_archive_threshold: i64,
    pub full_refund_policy: bool,
    pub platform_share_percent: u8,
    /// TTL on per-reference locks; abandoned locks expire after this.
    pub lock_ttl: StdDuration,
    /// How long a request waits for a contended lock before failing fast.
    pub lock_wait: StdDuration,
    pub paygate: PayGateConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_GSP_HOST.to_string(),
            port: DEFAULT_GSP_PORT,
            database_url: String::default(),
            payment_validity: Duration::minutes(DEFAULT_PAYMENT_VALIDITY_MINUTES),
            sweep_interval: StdDuration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            refund_grace: Duration::minutes(DEFAULT_REFUND_GRACE_MINUTES),
            standard_archive_threshold: DEFAULT_ARCHIVE_THRESHOLD_STANDARD,
            expedited_archive_threshold: DEFAULT_ARCHIVE_THRESHOLD_EXPEDITED,
            full_refund_policy: false,
            platform_share_percent: 0,
            lock_ttl: DEFAULT_LOCK_TTL,
            lock_wait: DEFAULT_LOCK_WAIT,
            paygate: PayGateConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_env_or_default() -> Self {
        let host = env::var("GSP_HOST").ok().unwrap_or_else(|| DEFAULT_GSP_HOST.into());
        let port = env::var("GSP_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for GSP_PORT. {e} Using the default, {DEFAULT_GSP_PORT}, instead."
                    );
                    DEFAULT_GSP_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_GSP_PORT);
        let database_url = env::var("GSP_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ GSP_DATABASE_URL is not set. Please set it to the URL for the settlement database.");
            String::default()
        });
        let payment_validity =
            Duration::minutes(env_i64("GSP_PAYMENT_VALIDITY_MINUTES", DEFAULT_PAYMENT_VALIDITY_MINUTES));
        let sweep_interval = StdDuration::from_secs(
            env_i64("GSP_SWEEP_INTERVAL_SECS", DEFAULT_SWEEP_INTERVAL_SECS as i64).unsigned_abs(),
        );
        let refund_grace = Duration::minutes(env_i64("GSP_REFUND_GRACE_MINUTES", DEFAULT_REFUND_GRACE_MINUTES));
        let standard_archive_threshold =
            env_i64("GSP_ARCHIVE_THRESHOLD_STANDARD", DEFAULT_ARCHIVE_THRESHOLD_STANDARD);
        let expedited_archive_threshold =
            env_i64("GSP_ARCHIVE_THRESHOLD_EXPEDITED", DEFAULT_ARCHIVE_THRESHOLD_EXPEDITED);
        let full_refund_policy =
            gsp_common::parse_boolean_flag(env::var("GSP_FULL_REFUND_POLICY").ok(), false);
        let platform_share_percent = env_i64("GSP_PLATFORM_SHARE_PERCENT", 0).clamp(0, 100) as u8;
        let paygate = PayGateConfig::new_from_env_or_default();
        Self {
            host,
            port,
            database_url,
            payment_validity,
            sweep_interval,
            refund_grace,
            standard_archive_threshold,
            expedited_archive_threshold,
            full_refund_policy,
            platform_share_percent,
            lock_ttl: DEFAULT_LOCK_TTL,
            lock_wait: DEFAULT_LOCK_WAIT,
            paygate,
        }
    }

    pub fn sweep_config(&self) -> SweepConfig {
        SweepConfig {
            standard_archive_threshold: self.standard_archive_threshold,
            expedited_archive_threshold: self.expedited_archive_threshold,
            refund_grace: self.refund_grace,
        }
    }

    pub fn refund_policy(&self) -> RefundPolicy {
        RefundPolicy { full_refund: self.full_refund_policy, platform_share_percent: self.platform_share_percent }
    }
}

fn env_i64(var: &str, default: i64) -> i64 {
    match env::var(var) {
        Ok(s) => s.parse::<i64>().unwrap_or_else(|e| {
            warn!("🪛️ Invalid configuration value for {var}. {e}");
            default
        }),
        Err(_) => default,
    }
}
