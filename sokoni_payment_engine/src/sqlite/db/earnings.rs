use log::debug;
use spg_common::Money;
use sqlx::SqliteConnection;

use crate::{db_types::Earning, traits::LedgerError};

pub async fn insert(
    transaction_id: i64,
    beneficiary: &str,
    amount: Money,
    conn: &mut SqliteConnection,
) -> Result<Earning, LedgerError> {
    let earning = sqlx::query_as(
        r#"
            INSERT INTO earnings (transaction_id, beneficiary, amount) VALUES ($1, $2, $3)
            RETURNING *;
        "#,
    )
    .bind(transaction_id)
    .bind(beneficiary)
    .bind(amount)
    .fetch_one(conn)
    .await?;
    debug!("🪙️ Earning of {amount} recorded for {beneficiary} on transaction #{transaction_id}");
    Ok(earning)
}

/// Marks every pending earning for the beneficiary as paid. Returns the number of earnings settled.
pub async fn settle_for_beneficiary(beneficiary: &str, conn: &mut SqliteConnection) -> Result<u64, LedgerError> {
    let result = sqlx::query(
        r#"
            UPDATE earnings SET
            status = 'Paid',
            updated_at = CURRENT_TIMESTAMP
            WHERE beneficiary = $1 AND status = 'Pending'
        "#,
    )
    .bind(beneficiary)
    .execute(conn)
    .await?;
    let settled = result.rows_affected();
    if settled > 0 {
        debug!("🪙️ Settled {settled} pending earnings for {beneficiary}");
    }
    Ok(settled)
}

pub async fn fetch_for_transaction(
    transaction_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<Earning>, LedgerError> {
    let earnings = sqlx::query_as(r#"SELECT * FROM earnings WHERE transaction_id = ?"#)
        .bind(transaction_id)
        .fetch_all(conn)
        .await?;
    Ok(earnings)
}
