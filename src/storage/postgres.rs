use anyhow::Result;
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder};

use super::{HoldingsStore, InsertOutcome};
use crate::edgar::types::{Holding, MetadataRecord, NewFiling};

// Stay under Postgres's bind-parameter limit; 14 columns per row.
const HOLDINGS_BATCH_SIZE: usize = 1000;

/// Postgres-backed store. The pool is created at the run boundary and
/// dropped with the store; nothing holds a global connection.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the target tables when absent. Reruns only delete rows, so
    /// the schema survives across loads.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS filings (
                 id BIGSERIAL PRIMARY KEY,
                 filing_id TEXT NOT NULL,
                 filing_date DATE NOT NULL,
                 cik TEXT NOT NULL
             )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS holdings (
                 id BIGSERIAL PRIMARY KEY,
                 filing_id BIGINT NOT NULL REFERENCES filings(id) ON DELETE CASCADE,
                 name_of_issuer TEXT NOT NULL,
                 title_of_class TEXT NOT NULL,
                 cusip TEXT NOT NULL,
                 value BIGINT NOT NULL,
                 shares BIGINT NOT NULL,
                 share_type TEXT NOT NULL,
                 put_call TEXT,
                 investment_discretion TEXT NOT NULL,
                 other_manager TEXT,
                 voting_authority_sole BIGINT NOT NULL,
                 voting_authority_shared BIGINT NOT NULL,
                 voting_authority_none BIGINT NOT NULL
             )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS filings_metadata (
                 cik TEXT NOT NULL,
                 accession_number TEXT NOT NULL,
                 filing_date DATE NOT NULL,
                 report_date DATE NOT NULL,
                 form TEXT NOT NULL,
                 file_number TEXT NOT NULL,
                 size BIGINT NOT NULL,
                 PRIMARY KEY (cik, accession_number)
             )",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn insert_holding_row(&self, filing_pk: i64, holding: &Holding) -> Result<()> {
        sqlx::query(
            "INSERT INTO holdings (
                 filing_id, name_of_issuer, title_of_class, cusip, value, shares,
                 share_type, put_call, investment_discretion, other_manager,
                 voting_authority_sole, voting_authority_shared, voting_authority_none
             ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(filing_pk)
        .bind(&holding.name_of_issuer)
        .bind(&holding.title_of_class)
        .bind(&holding.cusip)
        .bind(holding.value)
        .bind(holding.shares)
        .bind(&holding.share_type)
        .bind(&holding.put_call)
        .bind(&holding.investment_discretion)
        .bind(&holding.other_manager)
        .bind(holding.voting_authority_sole)
        .bind(holding.voting_authority_shared)
        .bind(holding.voting_authority_none)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Inserts one filing's holdings in chunked multi-row statements inside
    /// a single transaction, so the filing's rows commit or roll back
    /// together.
    async fn insert_holdings_batched(&self, filing_pk: i64, holdings: &[Holding]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for chunk in holdings.chunks(HOLDINGS_BATCH_SIZE) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO holdings (
                     filing_id, name_of_issuer, title_of_class, cusip, value, shares,
                     share_type, put_call, investment_discretion, other_manager,
                     voting_authority_sole, voting_authority_shared, voting_authority_none
                 ) ",
            );
            builder.push_values(chunk, |mut row, holding| {
                row.push_bind(filing_pk)
                    .push_bind(&holding.name_of_issuer)
                    .push_bind(&holding.title_of_class)
                    .push_bind(&holding.cusip)
                    .push_bind(holding.value)
                    .push_bind(holding.shares)
                    .push_bind(&holding.share_type)
                    .push_bind(&holding.put_call)
                    .push_bind(&holding.investment_discretion)
                    .push_bind(&holding.other_manager)
                    .push_bind(holding.voting_authority_sole)
                    .push_bind(holding.voting_authority_shared)
                    .push_bind(holding.voting_authority_none);
            });
            builder.build().execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl HoldingsStore for PgStore {
    async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM holdings").execute(&self.pool).await?;
        sqlx::query("DELETE FROM filings").execute(&self.pool).await?;
        Ok(())
    }

    async fn insert_filing(&self, filing: &NewFiling) -> Result<i64> {
        let row: (i64,) = sqlx::query_as(
            "INSERT INTO filings (filing_id, filing_date, cik)
             VALUES ($1, $2, $3)
             RETURNING id",
        )
        .bind(&filing.filing_id)
        .bind(filing.filing_date)
        .bind(&filing.cik)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    async fn insert_holdings(
        &self,
        filing_pk: i64,
        holdings: &[Holding],
    ) -> Result<InsertOutcome> {
        if holdings.is_empty() {
            return Ok(InsertOutcome::default());
        }
        match self.insert_holdings_batched(filing_pk, holdings).await {
            Ok(()) => Ok(InsertOutcome {
                inserted: holdings.len() as u64,
                failed: 0,
            }),
            Err(e) => {
                // Retry row by row so one bad holding only costs itself.
                log::warn!(
                    "batched insert of {} holdings failed ({}), retrying per row",
                    holdings.len(),
                    e
                );
                let mut outcome = InsertOutcome::default();
                for holding in holdings {
                    match self.insert_holding_row(filing_pk, holding).await {
                        Ok(()) => outcome.inserted += 1,
                        Err(e) => {
                            log::error!("failed to insert holding {}: {}", holding.cusip, e);
                            outcome.failed += 1;
                        }
                    }
                }
                Ok(outcome)
            }
        }
    }

    async fn upsert_metadata(&self, cik: &str, records: &[MetadataRecord]) -> Result<u64> {
        let mut inserted = 0;
        for record in records {
            let result = sqlx::query(
                "INSERT INTO filings_metadata
                     (cik, accession_number, filing_date, report_date, form, file_number, size)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)
                 ON CONFLICT (cik, accession_number) DO NOTHING",
            )
            .bind(cik)
            .bind(&record.accession_number)
            .bind(record.filing_date)
            .bind(record.report_date)
            .bind(&record.form)
            .bind(&record.file_number)
            .bind(record.size)
            .execute(&self.pool)
            .await?;
            inserted += result.rows_affected();
        }
        Ok(inserted)
    }
}
