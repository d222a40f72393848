//! # Gofer settlement server
//!
//! The HTTP ingress for the settlement engine. It is responsible for:
//! * Receiving and verifying payment-gateway webhooks and push messages, deduplicating them, and dispatching them
//!   into the reconciliation engine.
//! * Serving the payment-order creation and status-query routes to marketplace clients.
//! * Running the periodic staleness sweeper.
//! * Turning engine events into user notifications.
//!
//! ## Configuration
//! The server is configured via `GSP_*` environment variables. See [config](config/index.html) for details.
//!
//! ## Routes
//! * `/health`: liveness check.
//! * `/paygate/webhook`: synchronous gateway notifications (form-encoded, signed).
//! * `/paygate/messages`: asynchronous gateway push messages (JSON envelope, signed).
//! * `/orders`, `/orders/{order_number}/pay`, `/orders/{order_number}/refund`: order-facing operations.
//! * `/payments/{order_number}/status`: the pull-path payment status accessor.
//! * `/withdrawals`: agent cash-out.
pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod notifier;
pub mod paygate_routes;
pub mod routes;
pub mod server;
pub mod sweeper;
