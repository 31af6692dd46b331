use sqlx::SqliteConnection;

use crate::{
    db_types::{NewTransaction, Transaction, TransactionStatus},
    traits::LedgerError,
};

/// Inserts a new transaction row. The unique constraint on `external_reference` turns a concurrent double-insert
/// into [`LedgerError::TransactionAlreadyExists`], which callers treat as a duplicate delivery.
pub async fn idempotent_insert(
    new_tx: NewTransaction,
    conn: &mut SqliteConnection,
) -> Result<Transaction, LedgerError> {
    let reference = new_tx.external_reference.clone();
    let status = new_tx.status.to_string();
    let transaction_type = new_tx.transaction_type.to_string();
    let transaction = sqlx::query_as(
        r#"
            INSERT INTO transactions (external_reference, provider_id, wallet_id, transaction_type, amount,
                currency, country, charges, account_number, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *;
        "#,
    )
    .bind(new_tx.external_reference)
    .bind(new_tx.provider_id)
    .bind(new_tx.wallet_id)
    .bind(transaction_type)
    .bind(new_tx.amount)
    .bind(new_tx.currency)
    .bind(new_tx.country)
    .bind(new_tx.charges)
    .bind(new_tx.account_number)
    .bind(status)
    .fetch_one(conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(err) if err.is_unique_violation() => LedgerError::TransactionAlreadyExists(reference),
        _ => LedgerError::from(e),
    })?;
    Ok(transaction)
}

pub async fn fetch_by_reference(
    reference: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Transaction>, LedgerError> {
    let transaction = sqlx::query_as(r#"SELECT * FROM transactions WHERE external_reference = ?"#)
        .bind(reference)
        .fetch_optional(conn)
        .await?;
    Ok(transaction)
}

pub async fn update_status(
    id: i64,
    status: TransactionStatus,
    provider_id: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<Transaction, LedgerError> {
    let status = status.to_string();
    let transaction = sqlx::query_as(
        r#"
            UPDATE transactions SET
            status = $1,
            provider_id = COALESCE($2, provider_id),
            updated_at = CURRENT_TIMESTAMP
            WHERE id = $3
            RETURNING *;
        "#,
    )
    .bind(status)
    .bind(provider_id)
    .bind(id)
    .fetch_optional(conn)
    .await?
    .ok_or(LedgerError::TransactionNotFound(format!("internal id {id}")))?;
    Ok(transaction)
}
