use anyhow::{anyhow, Result};
use std::fs;
use std::path::{Path, PathBuf};

// Filesystem layout left behind by the 13F scraper.
pub const CIK_DIR_PREFIX: &str = "filings_13f_";
pub const FILING_DIR_PREFIX: &str = "filing_";
pub const INFO_TABLE_FILE: &str = "form13fInfoTable.xml";
pub const METADATA_FILE: &str = "form13f_metadata.csv";
pub const HOLDINGS_FILE: &str = "all_13f_holdings.csv";

/// One per-filing subfolder holding an information-table document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilingSource {
    /// Accession string taken from the folder name.
    pub accession: String,
    pub info_table: PathBuf,
}

/// Everything discoverable under one per-CIK folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CikSource {
    pub cik: String,
    pub dir: PathBuf,
    pub metadata: Option<PathBuf>,
    pub holdings_csv: Option<PathBuf>,
    pub filings: Vec<FilingSource>,
}

/// Walks the scrape root and returns the manifest of loadable inputs, in
/// name order so discovery is deterministic. Does no parsing. A missing
/// root directory is fatal: there is nothing to load and the run must not
/// clear storage first.
pub fn locate_sources(root: &Path) -> Result<Vec<CikSource>> {
    if !root.is_dir() {
        return Err(anyhow!("input directory not found: {}", root.display()));
    }

    let mut sources = Vec::new();
    for entry in sorted_dir(root)? {
        let name = entry.file_name().and_then(|n| n.to_str()).unwrap_or("");
        let Some(cik) = name.strip_prefix(CIK_DIR_PREFIX) else {
            continue;
        };
        if !entry.is_dir() {
            continue;
        }

        let metadata = existing(entry.join(METADATA_FILE));
        let holdings_csv = existing(entry.join(HOLDINGS_FILE));

        let mut filings = Vec::new();
        for filing_dir in sorted_dir(&entry)? {
            let dir_name = filing_dir.file_name().and_then(|n| n.to_str()).unwrap_or("");
            let Some(accession) = dir_name.strip_prefix(FILING_DIR_PREFIX) else {
                continue;
            };
            if !filing_dir.is_dir() {
                continue;
            }
            match existing(filing_dir.join(INFO_TABLE_FILE)) {
                Some(info_table) => filings.push(FilingSource {
                    accession: accession.to_string(),
                    info_table,
                }),
                None => log::warn!("no {} in {}", INFO_TABLE_FILE, filing_dir.display()),
            }
        }

        log::debug!(
            "CIK {}: metadata={}, holdings_csv={}, {} filing folder(s)",
            cik,
            metadata.is_some(),
            holdings_csv.is_some(),
            filings.len()
        );

        sources.push(CikSource {
            cik: cik.to_string(),
            dir: entry,
            metadata,
            holdings_csv,
            filings,
        });
    }

    log::info!("located {} CIK folder(s) under {}", sources.len(), root.display());
    Ok(sources)
}

fn sorted_dir(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)?
        .collect::<std::io::Result<Vec<_>>>()?
        .into_iter()
        .map(|e| e.path())
        .collect();
    entries.sort();
    Ok(entries)
}

fn existing(path: PathBuf) -> Option<PathBuf> {
    path.is_file().then_some(path)
}
