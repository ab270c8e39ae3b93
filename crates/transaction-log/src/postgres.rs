use async_trait::async_trait;
use common::TransactionId;
use messaging::Envelope;
use sqlx::{PgPool, Row, postgres::PgRow};
use tracing::debug;
use uuid::Uuid;

use crate::{
    EntryId, LogEntry, Result, Sequence, TransactionLogError,
    log::{AppendOptions, EntryStream, TransactionLog, validate_append},
};

/// PostgreSQL-backed transaction log.
#[derive(Clone)]
pub struct PostgresTransactionLog {
    pool: PgPool,
}

impl PostgresTransactionLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_entry(row: PgRow) -> Result<LogEntry> {
        let envelope: serde_json::Value = row.try_get("envelope")?;
        let envelope: Envelope = serde_json::from_value(envelope)?;

        Ok(LogEntry {
            entry_id: EntryId::from_uuid(row.try_get::<Uuid, _>("id")?),
            transaction_id: TransactionId::from_uuid(row.try_get::<Uuid, _>("transaction_id")?),
            sequence: Sequence::new(row.try_get("sequence")?),
            recorded_at: row.try_get("recorded_at")?,
            envelope,
        })
    }
}

#[async_trait]
impl TransactionLog for PostgresTransactionLog {
    #[tracing::instrument(skip(self, envelopes, options), fields(count = envelopes.len()))]
    async fn append(
        &self,
        transaction_id: TransactionId,
        envelopes: Vec<Envelope>,
        options: AppendOptions,
    ) -> Result<Sequence> {
        validate_append(transaction_id, &envelopes)?;

        let mut tx = self.pool.begin().await?;

        let current: Option<i64> =
            sqlx::query_scalar("SELECT MAX(sequence) FROM transaction_log WHERE transaction_id = $1")
                .bind(transaction_id.as_uuid())
                .fetch_one(&mut *tx)
                .await?;
        let current = Sequence::new(current.unwrap_or(0));

        if let Some(expected) = options.expected_sequence
            && current != expected
        {
            return Err(TransactionLogError::SequenceConflict {
                transaction_id,
                expected,
                actual: current,
            });
        }

        let mut sequence = current;
        for envelope in envelopes {
            sequence = sequence.next();
            let entry = LogEntry::new(envelope, sequence);
            let body = serde_json::to_value(&entry.envelope)?;

            sqlx::query(
                r#"
                INSERT INTO transaction_log (id, transaction_id, sequence, kind, state, envelope, recorded_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(entry.entry_id.as_uuid())
            .bind(transaction_id.as_uuid())
            .bind(sequence.as_i64())
            .bind(entry.kind().as_str())
            .bind(entry.state().as_str())
            .bind(body)
            .bind(entry.recorded_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                // A concurrent writer took this sequence first.
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.constraint() == Some("unique_transaction_sequence")
                {
                    return TransactionLogError::SequenceConflict {
                        transaction_id,
                        expected: options.expected_sequence.unwrap_or(current),
                        actual: sequence,
                    };
                }
                TransactionLogError::Database(e)
            })?;
        }

        tx.commit().await?;
        debug!(%transaction_id, %sequence, "Appended to transaction log");
        metrics::counter!("transaction_log_appends_total").increment(1);
        Ok(sequence)
    }

    async fn read_stream(&self, transaction_id: TransactionId) -> Result<Vec<LogEntry>> {
        self.read_stream_from(transaction_id, Sequence::first())
            .await
    }

    async fn read_stream_from(
        &self,
        transaction_id: TransactionId,
        from: Sequence,
    ) -> Result<Vec<LogEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, transaction_id, sequence, envelope, recorded_at
            FROM transaction_log
            WHERE transaction_id = $1 AND sequence >= $2
            ORDER BY sequence ASC
            "#,
        )
        .bind(transaction_id.as_uuid())
        .bind(from.as_i64())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_entry).collect()
    }

    async fn stream_position(&self, transaction_id: TransactionId) -> Result<Option<Sequence>> {
        let sequence: Option<i64> =
            sqlx::query_scalar("SELECT MAX(sequence) FROM transaction_log WHERE transaction_id = $1")
                .bind(transaction_id.as_uuid())
                .fetch_one(&self.pool)
                .await?;

        Ok(sequence.map(Sequence::new))
    }

    async fn stream_all(&self) -> Result<EntryStream> {
        use futures_util::StreamExt;

        let stream = sqlx::query(
            r#"
            SELECT id, transaction_id, sequence, envelope, recorded_at
            FROM transaction_log
            ORDER BY position ASC
            "#,
        )
        .fetch(&self.pool)
        .map(|result| match result {
            Ok(row) => Self::row_to_entry(row),
            Err(e) => Err(TransactionLogError::Database(e)),
        });

        Ok(Box::pin(stream))
    }
}
