use anyhow::Result;
use async_trait::async_trait;
use std::sync::RwLock;

use super::{HoldingsStore, InsertOutcome};
use crate::edgar::types::{Holding, MetadataRecord, NewFiling};

/// A filing row as the in-memory store holds it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFiling {
    pub id: i64,
    pub filing: NewFiling,
}

/// A holding row linked to its owning filing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredHolding {
    pub filing_pk: i64,
    pub holding: Holding,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: i64,
    filings: Vec<StoredFiling>,
    holdings: Vec<StoredHolding>,
    metadata: Vec<(String, MetadataRecord)>,
}

/// In-memory store with the same observable behavior as the Postgres one.
/// Used by the integration tests and by `--dry-run` imports.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filings(&self) -> Vec<StoredFiling> {
        self.inner.read().unwrap().filings.clone()
    }

    pub fn holdings(&self) -> Vec<StoredHolding> {
        self.inner.read().unwrap().holdings.clone()
    }

    pub fn holdings_for(&self, filing_pk: i64) -> Vec<Holding> {
        self.inner
            .read()
            .unwrap()
            .holdings
            .iter()
            .filter(|h| h.filing_pk == filing_pk)
            .map(|h| h.holding.clone())
            .collect()
    }

    pub fn metadata(&self) -> Vec<(String, MetadataRecord)> {
        self.inner.read().unwrap().metadata.clone()
    }
}

#[async_trait]
impl HoldingsStore for MemoryStore {
    async fn clear(&self) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner.holdings.clear();
        inner.filings.clear();
        Ok(())
    }

    async fn insert_filing(&self, filing: &NewFiling) -> Result<i64> {
        let mut inner = self.inner.write().unwrap();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.filings.push(StoredFiling {
            id,
            filing: filing.clone(),
        });
        Ok(id)
    }

    async fn insert_holdings(
        &self,
        filing_pk: i64,
        holdings: &[Holding],
    ) -> Result<InsertOutcome> {
        let mut inner = self.inner.write().unwrap();
        for holding in holdings {
            inner.holdings.push(StoredHolding {
                filing_pk,
                holding: holding.clone(),
            });
        }
        Ok(InsertOutcome {
            inserted: holdings.len() as u64,
            failed: 0,
        })
    }

    async fn upsert_metadata(&self, cik: &str, records: &[MetadataRecord]) -> Result<u64> {
        let mut inner = self.inner.write().unwrap();
        let mut inserted = 0;
        for record in records {
            let exists = inner.metadata.iter().any(|(existing_cik, existing)| {
                existing_cik == cik && existing.accession_number == record.accession_number
            });
            if !exists {
                inner.metadata.push((cik.to_string(), record.clone()));
                inserted += 1;
            }
        }
        Ok(inserted)
    }
}
