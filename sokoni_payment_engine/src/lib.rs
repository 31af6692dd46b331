//! Sokoni Payment Engine
//!
//! The Sokoni Payment Engine keeps the marketplace's internal ledger consistent with the payment provider's view of
//! the world, despite duplicate, out-of-order and delayed delivery of payment events. This library contains the
//! core logic for the ledger. It is transport-agnostic; the HTTP surface lives in the server crate.
//!
//! The library is divided into three main sections:
//! 1. Database management and control (the `sqlite` module). SQLite is the supported backend. You should never need to
//!    access the database directly; use the public API instead. The exception is the data types used in the
//!    database, which are defined in the [`db_types`] module and are public.
//! 2. The provider's wire types ([`eversend_types`]): the loosely-typed webhook payload and its validation into a
//!    strongly-typed [`eversend_types::PaymentEvent`]. Validation is the only door into the ledger.
//! 3. The engine public API ([`LedgerApi`] and [`AuditApi`]): idempotent event application under per-wallet
//!    serialization, and append-only audit recording. Backends implement the traits in [`traits`] to drive them.
pub mod db_types;
pub mod eversend_types;
pub mod helpers;
mod spe_api;
#[cfg(feature = "sqlite")]
mod sqlite;
pub mod traits;

#[cfg(feature = "test_utils")]
pub mod test_utils;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use spe_api::{
    audit_api::AuditApi,
    ledger_api::{EventOrigin, LedgerApi, DEFAULT_COMMISSION_RATE_BPS},
};
pub use traits::{ApplyResult, LedgerError, PaymentLedgerDatabase, RejectReason};
