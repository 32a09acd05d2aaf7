//! Atomic, gapless, year-scoped document numbering.
//!
//! Each `(document type, year)` pair owns a durable counter. Issuing a
//! number increments that counter inside a transaction, so numbers for a
//! key are unique, contiguous from 1, and survive concurrent issuance
//! without duplication. A consumed number is never reused, even when the
//! caller abandons it after commit; that is the price of gaplessness.

use std::{fmt, time::Duration};

use backon::{ExponentialBuilder, Retryable};
use chrono::{DateTime, Datelike, Utc};
use db::models::{document_number_sequence::DocumentNumberSequence, document_type::DocumentType};
use serde::{Deserialize, Serialize};
use sqlx::{Sqlite, SqlitePool, Transaction};
use thiserror::Error;
use tracing::debug;

/// Zero-padding width of the numeric suffix, e.g. `INV-2025-00001`.
pub const NUMBER_WIDTH: usize = 5;

#[derive(Debug, Error)]
pub enum NumberingError {
    #[error("invalid document type prefix: {0:?}")]
    InvalidPrefix(String),
    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[from] sqlx::Error),
}

/// A freshly issued document number. The caller embeds the `Display`
/// rendering in the document record; this subsystem does not persist it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentNumber {
    pub document_type: DocumentType,
    pub year: i32,
    pub number: i64,
}

impl fmt::Display for DocumentNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{:0width$}",
            self.document_type.prefix(),
            self.year,
            self.number,
            width = NUMBER_WIDTH
        )
    }
}

#[derive(Clone)]
pub struct NumberingService {
    pool: SqlitePool,
}

impl NumberingService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Issue the next number for the document type named by `prefix`,
    /// scoped to the calendar year of `now`.
    ///
    /// Either the counter is durably advanced and the matching number
    /// returned, or the call fails and the counter is untouched. Failures
    /// are hard: the caller must not create a document without a number
    /// from a successful call. Retrying a failed call is safe; each
    /// attempt is an independent transaction.
    pub async fn issue_next(
        &self,
        prefix: &str,
        now: DateTime<Utc>,
    ) -> Result<DocumentNumber, NumberingError> {
        let document_type = DocumentType::from_prefix(prefix)
            .ok_or_else(|| NumberingError::InvalidPrefix(prefix.to_string()))?;
        self.issue_next_for(document_type, now).await
    }

    /// Typed variant of [`Self::issue_next`].
    pub async fn issue_next_for(
        &self,
        document_type: DocumentType,
        now: DateTime<Utc>,
    ) -> Result<DocumentNumber, NumberingError> {
        // SQLite reports lock contention as a busy error instead of
        // blocking when a write transaction's snapshot has gone stale.
        // Each retry is a fresh transaction against the post-commit
        // counter value, so contenders line up behind the winner.
        let issued = (|| async { self.try_issue(document_type, now).await })
            .retry(
                ExponentialBuilder::default()
                    .with_min_delay(Duration::from_millis(2))
                    .with_max_delay(Duration::from_millis(100))
                    .with_max_times(30),
            )
            .when(is_busy)
            .await?;

        debug!(number = %issued, "issued document number");
        Ok(issued)
    }

    /// Claim the next number inside a caller-supplied transaction, so a
    /// document insert and its number share one commit. Rolling back the
    /// transaction un-claims the number.
    pub async fn issue_next_in(
        tx: &mut Transaction<'_, Sqlite>,
        document_type: DocumentType,
        now: DateTime<Utc>,
    ) -> Result<DocumentNumber, NumberingError> {
        Ok(Self::claim(tx, document_type, now).await?)
    }

    async fn try_issue(
        &self,
        document_type: DocumentType,
        now: DateTime<Utc>,
    ) -> Result<DocumentNumber, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let issued = Self::claim(&mut tx, document_type, now).await?;
        tx.commit().await?;
        Ok(issued)
    }

    async fn claim(
        tx: &mut Transaction<'_, Sqlite>,
        document_type: DocumentType,
        now: DateTime<Utc>,
    ) -> Result<DocumentNumber, sqlx::Error> {
        let year = now.year();
        let number = DocumentNumberSequence::claim_next(tx, document_type.prefix(), year).await?;
        Ok(DocumentNumber {
            document_type,
            year,
            number,
        })
    }
}

/// SQLITE_BUSY and its extended codes (BUSY_RECOVERY, BUSY_SNAPSHOT,
/// BUSY_TIMEOUT). Anything else is a real storage failure.
fn is_busy(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => {
            matches!(db.code().as_deref(), Some("5" | "261" | "517" | "773"))
        }
        _ => false,
    }
}
