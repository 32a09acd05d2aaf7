use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Sqlite, SqlitePool, Transaction};
use tracing::debug;
use uuid::Uuid;

/// Durable per-(prefix, year) counter row.
///
/// `current_number` is the count of numbers issued so far for the key.
/// It only ever moves forward, and only through [`Self::claim_next`].
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DocumentNumberSequence {
    pub id: Uuid,
    pub prefix: String,
    pub year: i32,
    pub current_number: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DocumentNumberSequence {
    pub async fn find_by_key(
        pool: &SqlitePool,
        prefix: &str,
        year: i32,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT id, prefix, year, current_number, created_at, updated_at
            FROM document_number_sequences
            WHERE prefix = $1 AND year = $2
            "#,
        )
        .bind(prefix)
        .bind(year)
        .fetch_optional(pool)
        .await
    }

    /// Claim the next number for `(prefix, year)` inside `tx`.
    ///
    /// The UPDATE both takes the write lock and increments in a single
    /// statement, so there is no window between reading the current value
    /// and writing the next one. A concurrent claimant for the same key
    /// blocks on the lock until this transaction commits or rolls back,
    /// then computes its number from the post-commit value. Nothing is
    /// durable until the caller commits; a rollback un-claims the number.
    pub async fn claim_next(
        tx: &mut Transaction<'_, Sqlite>,
        prefix: &str,
        year: i32,
    ) -> Result<i64, sqlx::Error> {
        loop {
            let claimed: Option<i64> = sqlx::query_scalar(
                r#"
                UPDATE document_number_sequences
                SET current_number = current_number + 1,
                    updated_at = datetime('now', 'subsec')
                WHERE prefix = $1 AND year = $2
                RETURNING current_number
                "#,
            )
            .bind(prefix)
            .bind(year)
            .fetch_optional(&mut **tx)
            .await?;

            if let Some(number) = claimed {
                debug!(prefix, year, number, "claimed document number");
                return Ok(number);
            }

            // First issuance for this key: create the counter at zero and
            // loop back to claim through the locked UPDATE. The unique
            // (prefix, year) index makes the loser of a creation race fall
            // through to the row the winner created.
            sqlx::query(
                r#"
                INSERT INTO document_number_sequences (id, prefix, year, current_number)
                VALUES ($1, $2, $3, 0)
                ON CONFLICT (prefix, year) DO NOTHING
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(prefix)
            .bind(year)
            .execute(&mut **tx)
            .await?;

            debug!(prefix, year, "created counter row for new key");
        }
    }
}
