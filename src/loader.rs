use anyhow::{Context, Result};
use chrono::Local;
use std::fmt;
use std::fs;
use std::path::Path;

use crate::edgar::accession;
use crate::edgar::csv::{parse_holdings_csv, parse_metadata_csv, FilingGroup};
use crate::edgar::info_table::parse_info_table;
use crate::edgar::locate::locate_sources;
use crate::edgar::types::{Holding, NewFiling, RawHoldingRecord};
use crate::storage::HoldingsStore;

/// Run totals reported to the operator. Per-row and per-filing failures end
/// up here instead of aborting the batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub filings_loaded: u64,
    pub holdings_loaded: u64,
    pub filings_skipped: u64,
    pub holdings_failed: u64,
}

impl fmt::Display for LoadSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} filing(s) loaded, {} holding(s) loaded, {} filing(s) skipped, {} holding(s) failed",
            self.filings_loaded, self.holdings_loaded, self.filings_skipped, self.holdings_failed
        )
    }
}

/// Sequential batch loader. Each entry point clears the target tables
/// first, so reprocessing the same inputs is idempotent. Clear-then-reload
/// assumes this run owns the tables; callers must serialize runs
/// externally.
pub struct FilingLoader<'a, S> {
    store: &'a S,
}

impl<'a, S: HoldingsStore> FilingLoader<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Loads every per-CIK flat holdings export found under `root`.
    ///
    /// The filing date is derived from the accession id embedded in each
    /// row's grouping column. A structurally malformed export is fatal to
    /// the import.
    pub async fn load_csv_exports(&self, root: &Path) -> Result<LoadSummary> {
        let sources = locate_sources(root)?;
        self.store.clear().await?;

        let mut summary = LoadSummary::default();
        for source in &sources {
            let Some(path) = &source.holdings_csv else {
                continue;
            };
            let content = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let groups = parse_holdings_csv(&content)
                .with_context(|| format!("failed to parse {}", path.display()))?;
            log::info!(
                "CIK {}: {} filing group(s) in {}",
                source.cik,
                groups.len(),
                path.display()
            );
            self.load_groups(&groups, Some(&source.cik), &mut summary)
                .await;
        }

        log::info!("CSV import finished: {}", summary);
        Ok(summary)
    }

    /// Loads one flat holdings export. Rows without an explicit CIK column
    /// fall back to the CIK embedded in the accession id.
    pub async fn load_csv_file(&self, path: &Path) -> Result<LoadSummary> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let groups = parse_holdings_csv(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;

        self.store.clear().await?;
        let mut summary = LoadSummary::default();
        self.load_groups(&groups, None, &mut summary).await;

        log::info!("CSV import finished: {}", summary);
        Ok(summary)
    }

    /// Loads every per-filing information-table document found under
    /// `root`. Filing folder names carry no parseable accession date, so
    /// the load date stands in as the filing date. A document that fails to
    /// parse skips that filing only; the run continues.
    pub async fn load_info_tables(&self, root: &Path) -> Result<LoadSummary> {
        let sources = locate_sources(root)?;
        self.store.clear().await?;

        let load_date = Local::now().date_naive();
        let mut summary = LoadSummary::default();
        for source in &sources {
            log::info!("processing CIK {} ({} filing folder(s))", source.cik, source.filings.len());
            for filing_source in &source.filings {
                let content = match fs::read_to_string(&filing_source.info_table) {
                    Ok(content) => content,
                    Err(e) => {
                        log::error!(
                            "skipping {}: failed to read {}: {}",
                            filing_source.accession,
                            filing_source.info_table.display(),
                            e
                        );
                        summary.filings_skipped += 1;
                        continue;
                    }
                };
                let Some(entries) = parse_info_table(&content) else {
                    log::error!(
                        "skipping {} due to XML parsing error",
                        filing_source.accession
                    );
                    summary.filings_skipped += 1;
                    continue;
                };

                let filing = NewFiling {
                    filing_id: filing_source.accession.clone(),
                    filing_date: load_date,
                    cik: source.cik.clone(),
                };
                self.load_filing(&filing, &entries, &mut summary).await;
            }
        }

        log::info!("XML import finished: {}", summary);
        Ok(summary)
    }

    /// Insert-ignores every metadata export found under `root` into the
    /// side-channel table. Returns the number of rows newly inserted.
    /// Per-file failures are logged and the scan continues.
    pub async fn load_metadata(&self, root: &Path) -> Result<u64> {
        let sources = locate_sources(root)?;

        let mut inserted = 0;
        for source in &sources {
            let Some(path) = &source.metadata else {
                continue;
            };
            let records = match fs::read_to_string(path)
                .map_err(anyhow::Error::from)
                .and_then(|content| parse_metadata_csv(&content))
            {
                Ok(records) => records,
                Err(e) => {
                    log::error!("error processing metadata for CIK {}: {}", source.cik, e);
                    continue;
                }
            };
            let count = self.store.upsert_metadata(&source.cik, &records).await?;
            log::info!(
                "CIK {}: {} metadata row(s) inserted ({} in file)",
                source.cik,
                count,
                records.len()
            );
            inserted += count;
        }
        Ok(inserted)
    }

    async fn load_groups(
        &self,
        groups: &[FilingGroup],
        default_cik: Option<&str>,
        summary: &mut LoadSummary,
    ) {
        for group in groups {
            // CIK precedence: explicit column, then the folder the file came
            // from, then the digits embedded in the accession id.
            let cik = group
                .cik
                .clone()
                .or_else(|| default_cik.map(str::to_string))
                .unwrap_or_else(|| accession::issuer_cik(&group.filing_id).to_string());
            let filing = NewFiling {
                filing_id: group.filing_id.clone(),
                filing_date: accession::filing_date_for(&group.filing_id),
                cik,
            };
            self.load_filing(&filing, &group.rows, summary).await;
        }
    }

    async fn load_filing(
        &self,
        filing: &NewFiling,
        rows: &[RawHoldingRecord],
        summary: &mut LoadSummary,
    ) {
        log::info!(
            "processing filing {} with {} holding(s)",
            filing.filing_id,
            rows.len()
        );

        let filing_pk = match self.store.insert_filing(filing).await {
            Ok(id) => id,
            Err(e) => {
                log::error!("error inserting filing {}: {}", filing.filing_id, e);
                summary.filings_skipped += 1;
                return;
            }
        };
        summary.filings_loaded += 1;

        if rows.is_empty() {
            return;
        }

        let holdings: Vec<Holding> = rows.iter().map(Holding::from_raw).collect();
        match self.store.insert_holdings(filing_pk, &holdings).await {
            Ok(outcome) => {
                summary.holdings_loaded += outcome.inserted;
                summary.holdings_failed += outcome.failed;
                if outcome.failed > 0 {
                    log::warn!(
                        "filing {}: {} holding(s) failed to insert",
                        filing.filing_id,
                        outcome.failed
                    );
                }
            }
            Err(e) => {
                log::error!(
                    "error inserting holdings for filing {}: {}",
                    filing.filing_id,
                    e
                );
                summary.holdings_failed += holdings.len() as u64;
            }
        }
    }
}
