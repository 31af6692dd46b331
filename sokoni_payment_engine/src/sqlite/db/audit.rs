use sqlx::SqliteConnection;

use crate::{
    db_types::{AuditEntry, NewAuditEntry},
    traits::LedgerError,
};

pub async fn insert(entry: NewAuditEntry, conn: &mut SqliteConnection) -> Result<(), LedgerError> {
    let _ = sqlx::query(
        r#"
            INSERT INTO audit_log (actor, ip_address, user_agent, action, payload_snapshot)
            VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(entry.actor)
    .bind(entry.ip_address)
    .bind(entry.user_agent)
    .bind(entry.action)
    .bind(entry.payload_snapshot)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn fetch_for_actor(actor: &str, conn: &mut SqliteConnection) -> Result<Vec<AuditEntry>, LedgerError> {
    let entries = sqlx::query_as(r#"SELECT * FROM audit_log WHERE actor = ? ORDER BY created_at DESC, id DESC"#)
        .bind(actor)
        .fetch_all(conn)
        .await?;
    Ok(entries)
}
