use log::{debug, trace};
use spg_common::Money;
use sqlx::SqliteConnection;

use crate::{db_types::Wallet, traits::LedgerError};

pub async fn fetch_wallet(
    owner_id: &str,
    currency: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Wallet>, LedgerError> {
    let wallet = sqlx::query_as(r#"SELECT * FROM wallets WHERE owner_id = $1 AND currency = $2"#)
        .bind(owner_id)
        .bind(currency)
        .fetch_optional(conn)
        .await?;
    Ok(wallet)
}

/// Fetches the wallet for the given (owner, currency) pair, creating an empty one on first reference.
pub async fn fetch_or_create_wallet(
    owner_id: &str,
    currency: &str,
    conn: &mut SqliteConnection,
) -> Result<Wallet, LedgerError> {
    if let Some(wallet) = fetch_wallet(owner_id, currency, &mut *conn).await? {
        trace!("💼️ Wallet #{} found for {owner_id}/{currency}", wallet.id);
        return Ok(wallet);
    }
    let wallet: Wallet = sqlx::query_as(
        r#"
            INSERT INTO wallets (owner_id, currency) VALUES ($1, $2)
            ON CONFLICT (owner_id, currency) DO UPDATE SET updated_at = updated_at
            RETURNING *;
        "#,
    )
    .bind(owner_id)
    .bind(currency)
    .fetch_one(conn)
    .await?;
    debug!("💼️ Created new wallet #{} for {owner_id}/{currency}", wallet.id);
    Ok(wallet)
}

/// Adds a (possibly negative) delta to the wallet balance and returns the new balance.
/// The caller is responsible for holding the wallet's serialization lock and for funds checks.
pub async fn adjust_balance(wallet_id: i64, delta: Money, conn: &mut SqliteConnection) -> Result<Money, LedgerError> {
    let row: Wallet = sqlx::query_as(
        r#"
            UPDATE wallets SET
            balance = balance + $1,
            updated_at = CURRENT_TIMESTAMP
            WHERE id = $2
            RETURNING *;
        "#,
    )
    .bind(delta)
    .bind(wallet_id)
    .fetch_optional(conn)
    .await?
    .ok_or(LedgerError::DatabaseError(format!("Wallet #{wallet_id} disappeared during balance update")))?;
    trace!("💼️ Wallet #{wallet_id} balance adjusted by {delta} to {}", row.balance);
    Ok(row.balance)
}
