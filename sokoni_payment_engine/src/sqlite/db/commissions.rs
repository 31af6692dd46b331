use log::debug;
use spg_common::Money;
use sqlx::SqliteConnection;

use crate::{db_types::Commission, traits::LedgerError};

/// Records the platform commission for a completed transaction. At most one commission can exist per transaction;
/// re-inserting returns the existing row unchanged.
pub async fn insert_for_transaction(
    transaction_id: i64,
    amount: Money,
    rate_bps: i64,
    conn: &mut SqliteConnection,
) -> Result<Commission, LedgerError> {
    let inserted: Option<Commission> = sqlx::query_as(
        r#"
            INSERT INTO commissions (transaction_id, amount, rate_bps) VALUES ($1, $2, $3)
            ON CONFLICT (transaction_id) DO NOTHING
            RETURNING *;
        "#,
    )
    .bind(transaction_id)
    .bind(amount)
    .bind(rate_bps)
    .fetch_optional(&mut *conn)
    .await?;
    match inserted {
        Some(commission) => {
            debug!("🪙️ Commission of {amount} ({rate_bps} bps) recorded for transaction #{transaction_id}");
            Ok(commission)
        },
        None => fetch_for_transaction(transaction_id, conn).await?.ok_or(LedgerError::DatabaseError(format!(
            "Commission for transaction #{transaction_id} exists but could not be fetched"
        ))),
    }
}

pub async fn fetch_for_transaction(
    transaction_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<Commission>, LedgerError> {
    let commission = sqlx::query_as(r#"SELECT * FROM commissions WHERE transaction_id = ?"#)
        .bind(transaction_id)
        .fetch_optional(conn)
        .await?;
    Ok(commission)
}
