//! Client-side integration for the PayGate payment gateway.
//!
//! PayGate is the external payment provider the Gofer marketplace settles through. This crate owns everything that
//! speaks the gateway's protocol: configuration, the canonical parameter signing scheme, the typed request/response
//! objects, and the HTTP client. The settlement engine consumes the [`PayGateApi`] trait so that tests can substitute
//! the deterministic [`testing::TestGateway`] for the real thing.
mod api;
mod config;
mod data_objects;
mod error;
pub mod signing;
pub mod testing;

pub use api::{PayGateApi, PayGateClient};
pub use config::PayGateConfig;
pub use data_objects::{PayArtifact, Payee, TradeQueryResult, TradeStatus, TransferResult, TransferStatus};
pub use error::PayGateError;
