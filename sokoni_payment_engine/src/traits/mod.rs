//! Trait definitions that storage backends must implement to drive the ledger.

mod ledger;

pub use ledger::{ApplyResult, LedgerError, PaymentLedgerDatabase, RejectReason};
