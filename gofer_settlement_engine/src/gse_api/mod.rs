pub mod errors;
pub mod objects;
pub mod refund_api;
pub mod settlement_api;
pub mod sweeper_api;
