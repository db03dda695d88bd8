use anyhow::{Context, Result};
use csv::ReaderBuilder;
use serde::Deserialize;
use std::collections::HashMap;

use super::types::{MetadataRecord, RawHoldingRecord};

/// One row of the flat holdings export. The `Filing Date` column actually
/// carries the accession id; the export reuses the header name.
#[derive(Debug, Deserialize)]
struct CsvHoldingRow {
    #[serde(rename = "NAME OF ISSUER")]
    name_of_issuer: String,
    #[serde(rename = "TITLE OF CLASS")]
    title_of_class: String,
    #[serde(rename = "CUSIP")]
    cusip: String,
    #[serde(rename = "VALUE (x$1000)", default)]
    value: Option<String>,
    #[serde(rename = "SHRS OR PRN AMT", default)]
    shares: Option<String>,
    #[serde(rename = "SH/PRN", default)]
    share_type: Option<String>,
    #[serde(rename = "PUT/CALL", default)]
    put_call: Option<String>,
    #[serde(rename = "INVESTMENT DISCRETION", default)]
    investment_discretion: Option<String>,
    #[serde(rename = "OTHER MANAGER", default)]
    other_manager: Option<String>,
    #[serde(rename = "VOTING AUTHORITY SOLE", default)]
    voting_authority_sole: Option<String>,
    #[serde(rename = "VOTING AUTHORITY SHARED", default)]
    voting_authority_shared: Option<String>,
    #[serde(rename = "VOTING AUTHORITY NONE", default)]
    voting_authority_none: Option<String>,
    #[serde(rename = "Filing Date")]
    filing_id: String,
    #[serde(rename = "CIK", default)]
    cik: Option<String>,
}

impl CsvHoldingRow {
    fn into_raw(self) -> RawHoldingRecord {
        RawHoldingRecord {
            name_of_issuer: self.name_of_issuer,
            title_of_class: self.title_of_class,
            cusip: self.cusip,
            value: self.value,
            shares: self.shares,
            share_type: self.share_type,
            put_call: self.put_call,
            investment_discretion: self.investment_discretion,
            other_manager: self.other_manager,
            voting_authority_sole: self.voting_authority_sole,
            voting_authority_shared: self.voting_authority_shared,
            voting_authority_none: self.voting_authority_none,
        }
    }
}

/// Holdings belonging to one filing, in the order the export listed them.
#[derive(Debug, Clone, PartialEq)]
pub struct FilingGroup {
    /// Raw accession string from the grouping column.
    pub filing_id: String,
    /// Explicit CIK column value, present only in the CIK-aware export.
    pub cik: Option<String>,
    pub rows: Vec<RawHoldingRecord>,
}

/// Decodes a flat holdings export into per-filing groups, preserving
/// first-seen group order and row order within each group.
///
/// Structural problems (untabular data, missing required columns) fail the
/// whole import; individual rows with empty optional fields pass through
/// with `None`s for the loader to coerce.
pub fn parse_holdings_csv(input: &str) -> Result<Vec<FilingGroup>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_reader(input.as_bytes());

    let mut groups: Vec<FilingGroup> = Vec::new();
    let mut index: HashMap<(String, Option<String>), usize> = HashMap::new();

    for (line, row) in reader.deserialize::<CsvHoldingRow>().enumerate() {
        let row = row.with_context(|| format!("malformed holdings row {}", line + 1))?;
        let key = (row.filing_id.clone(), row.cik.clone());
        let slot = *index.entry(key).or_insert_with(|| {
            groups.push(FilingGroup {
                filing_id: row.filing_id.clone(),
                cik: row.cik.clone(),
                rows: Vec::new(),
            });
            groups.len() - 1
        });
        groups[slot].rows.push(row.into_raw());
    }

    Ok(groups)
}

/// Decodes a `form13f_metadata.csv` export. Column names follow the SEC
/// submissions feed (`accessionNumber`, `filingDate`, ...).
pub fn parse_metadata_csv(input: &str) -> Result<Vec<MetadataRecord>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_reader(input.as_bytes());

    let mut records = Vec::new();
    for (line, record) in reader.deserialize::<MetadataRecord>().enumerate() {
        records.push(record.with_context(|| format!("malformed metadata row {}", line + 1))?);
    }
    Ok(records)
}
