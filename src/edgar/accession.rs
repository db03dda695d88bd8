use chrono::NaiveDate;
use once_cell::sync::Lazy;
use std::fmt;
use std::str::FromStr;

/// Filing date used when an accession string cannot be parsed. A bad
/// identifier must not abort a batch run, so it maps to this sentinel
/// instead of an error.
pub static FALLBACK_FILING_DATE: Lazy<NaiveDate> =
    Lazy::new(|| NaiveDate::from_ymd_opt(1970, 1, 1).unwrap());

/// SEC accession identifier, e.g. `0001234567-22-000123`: the filer CIK as
/// embedded in the id, a two-digit year and a submission sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessionId {
    pub issuer_digits: String,
    pub year_suffix: u32,
    pub sequence: u64,
}

impl AccessionId {
    /// The fiscal quarter-end date the filing reports as of: one of
    /// 03-31, 06-30, 09-30 or 12-31 of year `2000 + year_suffix`.
    ///
    /// The quarter group is `ceil(sequence / 3)`; groups beyond 4 wrap
    /// modularly back into 1..=4 so every numeric sequence lands on a
    /// canonical quarter.
    pub fn quarter_end_date(&self) -> NaiveDate {
        let year = (2000 + self.year_suffix) as i32;
        let group = self.sequence.div_ceil(3) as i64;
        let quarter = (group - 1).rem_euclid(4) + 1;
        let (month, day) = match quarter {
            1 => (3, 31),
            2 => (6, 30),
            3 => (9, 30),
            _ => (12, 31),
        };
        // Quarter ends are fixed calendar dates, always valid.
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }
}

impl fmt::Display for AccessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{:02}-{:06}",
            self.issuer_digits, self.year_suffix, self.sequence
        )
    }
}

impl FromStr for AccessionId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('-').collect();
        if parts.len() < 3 {
            return Err(format!("accession id has fewer than 3 parts: {}", s));
        }

        let year_suffix: u32 = parts[1]
            .trim()
            .parse()
            .map_err(|_| format!("non-numeric year in accession id: {}", s))?;
        if year_suffix > 99 {
            return Err(format!("year suffix out of 00-99 range: {}", s));
        }

        // parseInt semantics: take the leading digit run of the sequence part.
        let digits: String = parts[2]
            .trim()
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        let sequence: u64 = digits
            .parse()
            .map_err(|_| format!("non-numeric sequence in accession id: {}", s))?;

        Ok(AccessionId {
            issuer_digits: parts[0].trim().to_string(),
            year_suffix,
            sequence,
        })
    }
}

/// Derives the filing date for a raw accession string, falling back to the
/// sentinel date when the id is malformed.
pub fn filing_date_for(raw: &str) -> NaiveDate {
    match raw.parse::<AccessionId>() {
        Ok(id) => id.quarter_end_date(),
        Err(e) => {
            log::warn!("using fallback filing date: {}", e);
            *FALLBACK_FILING_DATE
        }
    }
}

/// The CIK portion embedded at the front of an accession string. Defined for
/// any input: a string without hyphens is returned whole.
pub fn issuer_cik(raw: &str) -> &str {
    raw.split('-').next().unwrap_or(raw)
}
