use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use tempfile::tempdir;

use thirteenf::edgar::types::{Holding, MetadataRecord, NewFiling};
use thirteenf::storage::{HoldingsStore, InsertOutcome, MemoryStore};
use thirteenf::FilingLoader;

const CSV_HEADER: &str = "NAME OF ISSUER,TITLE OF CLASS,CUSIP,VALUE (x$1000),SHRS OR PRN AMT,SH/PRN,PUT/CALL,INVESTMENT DISCRETION,OTHER MANAGER,VOTING AUTHORITY SOLE,VOTING AUTHORITY SHARED,VOTING AUTHORITY NONE,Filing Date";

const INFO_TABLE_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ns1:informationTable xmlns:ns1="http://www.sec.gov/edgar/document/thirteenf/informationtable">
  <ns1:infoTable>
    <ns1:nameOfIssuer>APPLE INC</ns1:nameOfIssuer>
    <ns1:titleOfClass>COM</ns1:titleOfClass>
    <ns1:cusip>037833100</ns1:cusip>
    <ns1:value>915644</ns1:value>
    <ns1:shrsOrPrnAmt>
      <ns1:sshPrnamt>5916</ns1:sshPrnamt>
      <ns1:sshPrnamtType>SH</ns1:sshPrnamtType>
    </ns1:shrsOrPrnAmt>
    <ns1:investmentDiscretion>SOLE</ns1:investmentDiscretion>
    <ns1:votingAuthority>
      <ns1:Sole>5916</ns1:Sole>
      <ns1:Shared>0</ns1:Shared>
      <ns1:None>0</ns1:None>
    </ns1:votingAuthority>
  </ns1:infoTable>
</ns1:informationTable>"#;

fn write_filing_folder(root: &Path, cik: &str, accession: &str, xml: &str) {
    let dir = root
        .join(format!("filings_13f_{}", cik))
        .join(format!("filing_{}", accession));
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("form13fInfoTable.xml"), xml).unwrap();
}

#[tokio::test]
async fn csv_rows_sharing_an_accession_load_as_one_filing() {
    let tmp = tempdir().unwrap();
    let csv_path = tmp.path().join("form13f_holdings.csv");
    fs::write(
        &csv_path,
        format!(
            "{}\n{}\n{}\n",
            CSV_HEADER,
            "APPLE INC,COM,037833100,915644,5916,SH,,SOLE,,5916,0,0,0001234567-22-000123",
            "NVIDIA CORP,COM,67066G104,234120,1200,SH,,DFND,,0,1200,0,0001234567-22-000123",
        ),
    )
    .unwrap();

    let store = MemoryStore::new();
    let loader = FilingLoader::new(&store);
    let summary = loader.load_csv_file(&csv_path).await.unwrap();

    assert_eq!(summary.filings_loaded, 1);
    assert_eq!(summary.holdings_loaded, 2);
    assert_eq!(summary.filings_skipped, 0);
    assert_eq!(summary.holdings_failed, 0);

    let filings = store.filings();
    assert_eq!(filings.len(), 1);
    let filing = &filings[0].filing;
    assert_eq!(filing.filing_id, "0001234567-22-000123");
    // Sequence 000123 derives quarter 1 of 2022.
    assert_eq!(
        filing.filing_date,
        NaiveDate::from_ymd_opt(2022, 3, 31).unwrap()
    );
    assert_eq!(filing.cik, "0001234567");

    let holdings = store.holdings_for(filings[0].id);
    assert_eq!(holdings.len(), 2);
    assert_eq!(holdings[0].name_of_issuer, "APPLE INC");
    assert_eq!(holdings[0].value, 915644);
    assert_eq!(holdings[1].voting_authority_shared, 1200);
}

#[tokio::test]
async fn reloading_the_same_export_is_idempotent() {
    let tmp = tempdir().unwrap();
    let csv_path = tmp.path().join("form13f_holdings.csv");
    fs::write(
        &csv_path,
        format!(
            "{}\n{}\n{}\n",
            CSV_HEADER,
            "APPLE INC,COM,037833100,915644,5916,SH,,SOLE,,5916,0,0,0001234567-22-000123",
            "NVIDIA CORP,COM,67066G104,234120,1200,SH,,SOLE,,1200,0,0,0009999999-23-000007",
        ),
    )
    .unwrap();

    let store = MemoryStore::new();
    let loader = FilingLoader::new(&store);

    let first = loader.load_csv_file(&csv_path).await.unwrap();
    let first_filings: Vec<_> = store.filings().into_iter().map(|f| f.filing).collect();
    let first_holdings: Vec<_> = store.holdings().into_iter().map(|h| h.holding).collect();

    let second = loader.load_csv_file(&csv_path).await.unwrap();
    let second_filings: Vec<_> = store.filings().into_iter().map(|f| f.filing).collect();
    let second_holdings: Vec<_> = store.holdings().into_iter().map(|h| h.holding).collect();

    assert_eq!(first, second);
    assert_eq!(first_filings, second_filings);
    assert_eq!(first_holdings, second_holdings);
}

#[tokio::test]
async fn unparsable_value_fields_are_zero_filled_not_dropped() {
    let tmp = tempdir().unwrap();
    let csv_path = tmp.path().join("form13f_holdings.csv");
    fs::write(
        &csv_path,
        format!(
            "{}\n{}\n",
            CSV_HEADER,
            "APPLE INC,COM,037833100,n/a,unknown,SH,,SOLE,,bogus,0,0,0001234567-22-000123",
        ),
    )
    .unwrap();

    let store = MemoryStore::new();
    let loader = FilingLoader::new(&store);
    let summary = loader.load_csv_file(&csv_path).await.unwrap();

    assert_eq!(summary.holdings_loaded, 1);
    let holdings = store.holdings();
    assert_eq!(holdings.len(), 1);
    let holding = &holdings[0].holding;
    assert_eq!(holding.value, 0);
    assert_eq!(holding.shares, 0);
    assert_eq!(holding.voting_authority_sole, 0);
    assert_eq!(holding.name_of_issuer, "APPLE INC");
}

#[tokio::test]
async fn xml_entry_without_putcall_persists_with_null() {
    let tmp = tempdir().unwrap();
    write_filing_folder(tmp.path(), "1067983", "0001234567-22-000123", INFO_TABLE_XML);

    let store = MemoryStore::new();
    let loader = FilingLoader::new(&store);
    let summary = loader.load_info_tables(tmp.path()).await.unwrap();

    assert_eq!(summary.filings_loaded, 1);
    assert_eq!(summary.holdings_loaded, 1);

    let filings = store.filings();
    assert_eq!(filings[0].filing.cik, "1067983");
    assert_eq!(filings[0].filing.filing_id, "0001234567-22-000123");
    // The XML path stamps filings with the load date.
    assert_eq!(filings[0].filing.filing_date, Local::now().date_naive());

    let holdings = store.holdings_for(filings[0].id);
    assert_eq!(holdings.len(), 1);
    assert_eq!(holdings[0].put_call, None);
    assert_eq!(holdings[0].name_of_issuer, "APPLE INC");
    assert_eq!(holdings[0].shares, 5916);
    assert_eq!(holdings[0].share_type, "SH");
    assert_eq!(holdings[0].voting_authority_sole, 5916);
}

#[tokio::test]
async fn malformed_xml_skips_that_filing_and_continues() {
    let tmp = tempdir().unwrap();
    write_filing_folder(tmp.path(), "1067983", "0001111111-22-000001", INFO_TABLE_XML);
    write_filing_folder(
        tmp.path(),
        "1067983",
        "0002222222-22-000002",
        "<informationTable><infoTable>",
    );
    write_filing_folder(tmp.path(), "1067983", "0003333333-22-000003", INFO_TABLE_XML);

    let store = MemoryStore::new();
    let loader = FilingLoader::new(&store);
    let summary = loader.load_info_tables(tmp.path()).await.unwrap();

    assert_eq!(summary.filings_loaded, 2);
    assert_eq!(summary.filings_skipped, 1);
    assert_eq!(summary.holdings_loaded, 2);

    let loaded: Vec<String> = store
        .filings()
        .iter()
        .map(|f| f.filing.filing_id.clone())
        .collect();
    assert_eq!(loaded, ["0001111111-22-000001", "0003333333-22-000003"]);
}

#[tokio::test]
async fn zero_holding_filing_is_still_persisted() {
    let tmp = tempdir().unwrap();
    write_filing_folder(
        tmp.path(),
        "19617",
        "0000019617-22-000050",
        "<informationTable/>",
    );

    let store = MemoryStore::new();
    let loader = FilingLoader::new(&store);
    let summary = loader.load_info_tables(tmp.path()).await.unwrap();

    assert_eq!(summary.filings_loaded, 1);
    assert_eq!(summary.holdings_loaded, 0);
    assert_eq!(store.filings().len(), 1);
    assert!(store.holdings().is_empty());
}

#[tokio::test]
async fn per_cik_exports_take_the_folder_cik() {
    let tmp = tempdir().unwrap();
    let cik_dir = tmp.path().join("filings_13f_1067983");
    fs::create_dir_all(&cik_dir).unwrap();
    fs::write(
        cik_dir.join("all_13f_holdings.csv"),
        format!(
            "{}\n{}\n",
            CSV_HEADER,
            "APPLE INC,COM,037833100,915644,5916,SH,,SOLE,,5916,0,0,0001234567-22-000123",
        ),
    )
    .unwrap();

    let store = MemoryStore::new();
    let loader = FilingLoader::new(&store);
    let summary = loader.load_csv_exports(tmp.path()).await.unwrap();

    assert_eq!(summary.filings_loaded, 1);
    assert_eq!(store.filings()[0].filing.cik, "1067983");
}

#[tokio::test]
async fn missing_root_aborts_without_clearing() {
    let store = MemoryStore::new();
    let loader = FilingLoader::new(&store);

    // Seed rows from a successful run.
    let tmp = tempdir().unwrap();
    write_filing_folder(tmp.path(), "19617", "0000019617-22-000050", INFO_TABLE_XML);
    loader.load_info_tables(tmp.path()).await.unwrap();
    assert_eq!(store.filings().len(), 1);

    let missing = tmp.path().join("no-such-subdir");
    assert!(loader.load_info_tables(&missing).await.is_err());
    // The earlier load survives: discovery failed before the clear.
    assert_eq!(store.filings().len(), 1);
}

/// Store double that fails on command: one filing's insert is rejected, one
/// filing's holdings insert errors wholly, and one filing loses its last
/// row at row level. Everything else delegates to a `MemoryStore`.
struct FlakyStore {
    inner: MemoryStore,
    reject_filing: &'static str,
    reject_holdings_of: &'static str,
    drop_last_row_of: &'static str,
    filing_ids: Mutex<HashMap<i64, String>>,
}

impl FlakyStore {
    fn new(
        reject_filing: &'static str,
        reject_holdings_of: &'static str,
        drop_last_row_of: &'static str,
    ) -> Self {
        Self {
            inner: MemoryStore::new(),
            reject_filing,
            reject_holdings_of,
            drop_last_row_of,
            filing_ids: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl HoldingsStore for FlakyStore {
    async fn clear(&self) -> Result<()> {
        self.inner.clear().await
    }

    async fn insert_filing(&self, filing: &NewFiling) -> Result<i64> {
        if filing.filing_id == self.reject_filing {
            return Err(anyhow!("duplicate key value violates unique constraint"));
        }
        let id = self.inner.insert_filing(filing).await?;
        self.filing_ids
            .lock()
            .unwrap()
            .insert(id, filing.filing_id.clone());
        Ok(id)
    }

    async fn insert_holdings(&self, filing_pk: i64, holdings: &[Holding]) -> Result<InsertOutcome> {
        let filing_id = self
            .filing_ids
            .lock()
            .unwrap()
            .get(&filing_pk)
            .cloned()
            .unwrap_or_default();
        if filing_id == self.reject_holdings_of {
            return Err(anyhow!("connection reset during holdings insert"));
        }
        if filing_id == self.drop_last_row_of && !holdings.is_empty() {
            let kept = &holdings[..holdings.len() - 1];
            let mut outcome = self.inner.insert_holdings(filing_pk, kept).await?;
            outcome.failed += 1;
            return Ok(outcome);
        }
        self.inner.insert_holdings(filing_pk, holdings).await
    }

    async fn upsert_metadata(&self, cik: &str, records: &[MetadataRecord]) -> Result<u64> {
        self.inner.upsert_metadata(cik, records).await
    }
}

#[tokio::test]
async fn insert_failures_are_counted_and_siblings_continue() {
    let tmp = tempdir().unwrap();
    let csv_path = tmp.path().join("form13f_holdings.csv");
    fs::write(
        &csv_path,
        format!(
            "{}\n{}\n{}\n{}\n{}\n",
            CSV_HEADER,
            "APPLE INC,COM,037833100,100,1,SH,,SOLE,,1,0,0,0001111111-22-000001",
            "NVIDIA CORP,COM,67066G104,200,2,SH,,SOLE,,2,0,0,0002222222-22-000002",
            "MSFT CORP,COM,594918104,300,3,SH,,SOLE,,3,0,0,0003333333-22-000003",
            "COCA COLA CO,COM,191216100,400,4,SH,,SOLE,,4,0,0,0003333333-22-000003",
        ),
    )
    .unwrap();

    let store = FlakyStore::new(
        "0001111111-22-000001",
        "0002222222-22-000002",
        "0003333333-22-000003",
    );
    let loader = FilingLoader::new(&store);
    let summary = loader.load_csv_file(&csv_path).await.unwrap();

    // The rejected filing is skipped; the other two still load.
    assert_eq!(summary.filings_loaded, 2);
    assert_eq!(summary.filings_skipped, 1);
    // One whole-filing holdings failure (1 row) plus one row-level failure.
    assert_eq!(summary.holdings_loaded, 1);
    assert_eq!(summary.holdings_failed, 2);

    let loaded: Vec<String> = store
        .inner
        .filings()
        .iter()
        .map(|f| f.filing.filing_id.clone())
        .collect();
    assert_eq!(loaded, ["0002222222-22-000002", "0003333333-22-000003"]);

    let holdings = store.inner.holdings();
    assert_eq!(holdings.len(), 1);
    assert_eq!(holdings[0].holding.name_of_issuer, "MSFT CORP");
}

#[tokio::test]
async fn metadata_rows_are_insert_ignored() {
    let tmp = tempdir().unwrap();
    let cik_dir = tmp.path().join("filings_13f_1067983");
    fs::create_dir_all(&cik_dir).unwrap();
    fs::write(
        cik_dir.join("form13f_metadata.csv"),
        "accessionNumber,filingDate,reportDate,form,fileNumber,size\n\
         0001234567-22-000123,2022-05-12,2022-03-31,13F-HR,028-12345,48213\n\
         0001234567-22-000321,2022-08-10,2022-06-30,13F-HR,028-12345,51910\n",
    )
    .unwrap();

    let store = MemoryStore::new();
    let loader = FilingLoader::new(&store);

    let first = loader.load_metadata(tmp.path()).await.unwrap();
    assert_eq!(first, 2);
    // Existing rows are never overwritten on conflict.
    let second = loader.load_metadata(tmp.path()).await.unwrap();
    assert_eq!(second, 0);
    assert_eq!(store.metadata().len(), 2);
}

#[tokio::test]
async fn metadata_failure_in_one_cik_does_not_stop_the_scan() {
    let tmp = tempdir().unwrap();
    let bad_dir = tmp.path().join("filings_13f_111");
    fs::create_dir_all(&bad_dir).unwrap();
    fs::write(bad_dir.join("form13f_metadata.csv"), "not,a,metadata\nfile\n").unwrap();

    let good_dir = tmp.path().join("filings_13f_222");
    fs::create_dir_all(&good_dir).unwrap();
    fs::write(
        good_dir.join("form13f_metadata.csv"),
        "accessionNumber,filingDate,reportDate,form,fileNumber,size\n\
         0000000222-23-000001,2023-02-14,2022-12-31,13F-HR,028-99999,1024\n",
    )
    .unwrap();

    let store = MemoryStore::new();
    let loader = FilingLoader::new(&store);
    let inserted = loader.load_metadata(tmp.path()).await.unwrap();

    assert_eq!(inserted, 1);
    assert_eq!(store.metadata()[0].0, "222");
}
