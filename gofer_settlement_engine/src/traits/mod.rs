mod data_objects;
mod settlement_database;

pub use data_objects::{ClaimOutcome, ReconcileOutcome};
pub use settlement_database::{SettlementDatabase, SettlementDatabaseError};
