use chrono::NaiveDate;
use serde::Deserialize;

/// One holding as it comes out of a parser: text fields verbatim, numeric
/// and optional fields untouched. Coercion is the loader's job, not the
/// parsers'.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawHoldingRecord {
    pub name_of_issuer: String,
    pub title_of_class: String,
    pub cusip: String,
    pub value: Option<String>,
    pub shares: Option<String>,
    pub share_type: Option<String>,
    pub put_call: Option<String>,
    pub investment_discretion: Option<String>,
    pub other_manager: Option<String>,
    pub voting_authority_sole: Option<String>,
    pub voting_authority_shared: Option<String>,
    pub voting_authority_none: Option<String>,
}

/// A filing row awaiting insertion. The generated storage id comes back
/// from the store and links the holdings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFiling {
    pub filing_id: String,
    pub filing_date: NaiveDate,
    pub cik: String,
}

/// A fully coerced holding row, ready for storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Holding {
    pub name_of_issuer: String,
    pub title_of_class: String,
    pub cusip: String,
    pub value: i64,
    pub shares: i64,
    pub share_type: String,
    pub put_call: Option<String>,
    pub investment_discretion: String,
    pub other_manager: Option<String>,
    pub voting_authority_sole: i64,
    pub voting_authority_shared: i64,
    pub voting_authority_none: i64,
}

impl Holding {
    /// Coerces a raw record into a storable row. Never fails: unparsable
    /// numeric fields default to 0 and the row is kept, per the load
    /// invariant that bad values zero-fill rather than drop holdings.
    pub fn from_raw(raw: &RawHoldingRecord) -> Self {
        Holding {
            name_of_issuer: raw.name_of_issuer.clone(),
            title_of_class: raw.title_of_class.clone(),
            cusip: raw.cusip.clone(),
            value: coerce_amount(raw.value.as_deref()),
            shares: coerce_amount(raw.shares.as_deref()),
            share_type: raw.share_type.clone().unwrap_or_default(),
            put_call: none_if_blank(raw.put_call.as_deref()),
            investment_discretion: raw.investment_discretion.clone().unwrap_or_default(),
            other_manager: none_if_blank(raw.other_manager.as_deref()),
            voting_authority_sole: coerce_amount(raw.voting_authority_sole.as_deref()),
            voting_authority_shared: coerce_amount(raw.voting_authority_shared.as_deref()),
            voting_authority_none: coerce_amount(raw.voting_authority_none.as_deref()),
        }
    }
}

/// Parses a reported amount, tolerating thousands separators and
/// surrounding whitespace. Missing or non-numeric values become 0.
pub fn coerce_amount(value: Option<&str>) -> i64 {
    value
        .map(|v| v.trim().replace(',', ""))
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(0)
}

fn none_if_blank(value: Option<&str>) -> Option<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => None,
    }
}

/// One row of the side-channel filing metadata export.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct MetadataRecord {
    #[serde(rename = "accessionNumber")]
    pub accession_number: String,
    #[serde(rename = "filingDate")]
    pub filing_date: NaiveDate,
    #[serde(rename = "reportDate")]
    pub report_date: NaiveDate,
    pub form: String,
    #[serde(rename = "fileNumber")]
    pub file_number: String,
    pub size: i64,
}
