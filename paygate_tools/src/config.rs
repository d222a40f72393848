use std::time::Duration;

use gsp_common::Secret;
use log::*;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct PayGateConfig {
    /// Base URL of the gateway API, e.g. "https://api.paygate.example".
    pub base_url: String,
    /// The application id assigned by the gateway.
    pub app_id: String,
    /// Shared secret used to sign outbound requests and verify inbound notifications.
    pub gateway_secret: Secret<String>,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl Default for PayGateConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.paygate.example".to_string(),
            app_id: String::default(),
            gateway_secret: Secret::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

impl PayGateConfig {
    pub fn new_from_env_or_default() -> Self {
        let base_url = std::env::var("GSP_PAYGATE_URL").unwrap_or_else(|_| {
            warn!("GSP_PAYGATE_URL not set, using (probably useless) default");
            "https://api.paygate.example".to_string()
        });
        let app_id = std::env::var("GSP_PAYGATE_APP_ID").unwrap_or_else(|_| {
            warn!("GSP_PAYGATE_APP_ID not set, using an empty app id");
            String::default()
        });
        let gateway_secret = Secret::new(std::env::var("GSP_PAYGATE_SECRET").unwrap_or_else(|_| {
            warn!("GSP_PAYGATE_SECRET not set, using (probably useless) default");
            "00000000000000".to_string()
        }));
        let connect_timeout = env_duration_secs("GSP_PAYGATE_CONNECT_TIMEOUT", DEFAULT_CONNECT_TIMEOUT);
        let read_timeout = env_duration_secs("GSP_PAYGATE_READ_TIMEOUT", DEFAULT_READ_TIMEOUT);
        Self { base_url, app_id, gateway_secret, connect_timeout, read_timeout }
    }
}

fn env_duration_secs(var: &str, default: Duration) -> Duration {
    match std::env::var(var) {
        Ok(s) => s.parse::<u64>().map(Duration::from_secs).unwrap_or_else(|e| {
            warn!("Invalid value for {var}: {e}. Using the default of {}s", default.as_secs());
            default
        }),
        Err(_) => default,
    }
}
