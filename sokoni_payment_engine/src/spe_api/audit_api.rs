use log::warn;

use crate::{
    db_types::{AuditEntry, NewAuditEntry},
    traits::{LedgerError, PaymentLedgerDatabase},
};

/// Append-only access to the audit log.
///
/// Audit writes are best-effort observability, not a correctness dependency: [`AuditApi::record`] never fails the
/// caller. If the write itself fails, the failure is logged and the caller's outcome stands.
#[derive(Clone, Debug)]
pub struct AuditApi<B> {
    db: B,
}

impl<B> AuditApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> AuditApi<B>
where B: PaymentLedgerDatabase
{
    pub async fn record(&self, entry: NewAuditEntry) {
        let action = entry.action.clone();
        if let Err(e) = self.db.insert_audit_entry(entry).await {
            warn!("📋️ Could not write audit entry \"{action}\". {e}");
        }
    }

    pub async fn entries_for_actor(&self, actor: &str) -> Result<Vec<AuditEntry>, LedgerError> {
        self.db.fetch_audit_entries_for_actor(actor).await
    }
}
