use anyhow::Result;
use async_trait::async_trait;

use crate::edgar::types::{Holding, MetadataRecord, NewFiling};

/// Per-filing outcome of a holdings insert. Row failures are counted, not
/// raised: one bad row must not lose its siblings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertOutcome {
    pub inserted: u64,
    pub failed: u64,
}

/// Sink for the load pipeline: filing and holding tables plus the metadata
/// side channel. The loader treats this purely as insert/delete primitives.
#[async_trait]
pub trait HoldingsStore {
    /// Deletes all holdings then all filings. Schema persists across runs;
    /// this is what makes reprocessing the same inputs idempotent.
    async fn clear(&self) -> Result<()>;

    /// Inserts one filing row and returns its generated id for foreign-key
    /// linkage.
    async fn insert_filing(&self, filing: &NewFiling) -> Result<i64>;

    /// Inserts the holdings of one filing. An `Err` means the store itself
    /// is unusable; individual row failures come back in the outcome.
    async fn insert_holdings(&self, filing_pk: i64, holdings: &[Holding])
        -> Result<InsertOutcome>;

    /// Insert-ignore for metadata rows: existing (cik, accession) pairs are
    /// never overwritten. Returns the number of rows actually inserted.
    async fn upsert_metadata(&self, cik: &str, records: &[MetadataRecord]) -> Result<u64>;
}

pub mod memory;
pub mod postgres;

pub use self::memory::MemoryStore;
pub use self::postgres::PgStore;
