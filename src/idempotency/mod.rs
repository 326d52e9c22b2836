//! Idempotency module
//!
//! Exactly-once processing of externally delivered subscription events,
//! keyed by (event id, event type) in the event ledger.

pub mod ledger;

pub use ledger::LedgerOutcome;
