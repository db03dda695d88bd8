use anyhow::Result;
use std::path::PathBuf;
use structopt::StructOpt;

use thirteenf::storage::{HoldingsStore, MemoryStore, PgStore};
use thirteenf::{FilingLoader, ImportConfig};

#[derive(Debug, StructOpt)]
#[structopt(
    name = "thirteenf-import",
    about = "Load SEC 13F-HR holdings disclosures into Postgres"
)]
struct Opt {
    /// Parse and summarize without touching the database
    #[structopt(long)]
    dry_run: bool,

    #[structopt(subcommand)]
    command: Command,
}

#[derive(Debug, StructOpt)]
enum Command {
    /// Replace-load flat holdings CSV exports
    Csv {
        /// Scrape root containing filings_13f_<CIK> folders
        #[structopt(long, default_value = "form 13F-HR", parse(from_os_str))]
        root: PathBuf,
        /// Load a single export instead of scanning the root
        #[structopt(long, parse(from_os_str))]
        file: Option<PathBuf>,
    },
    /// Replace-load per-filing information-table XML documents
    Xml {
        #[structopt(long, default_value = "form 13F-HR", parse(from_os_str))]
        root: PathBuf,
    },
    /// Insert-ignore filing metadata exports into the side table
    Metadata {
        #[structopt(long, default_value = "form 13F-HR", parse(from_os_str))]
        root: PathBuf,
    },
}

async fn run<S: HoldingsStore>(store: &S, command: &Command) -> Result<()> {
    let loader = FilingLoader::new(store);
    match command {
        Command::Csv { root, file } => {
            let summary = match file {
                Some(file) => loader.load_csv_file(file).await?,
                None => loader.load_csv_exports(root).await?,
            };
            println!("Import completed: {}", summary);
        }
        Command::Xml { root } => {
            let summary = loader.load_info_tables(root).await?;
            println!("Import completed: {}", summary);
        }
        Command::Metadata { root } => {
            let inserted = loader.load_metadata(root).await?;
            println!("Metadata import completed: {} row(s) inserted", inserted);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();

    let opt = Opt::from_args();

    if opt.dry_run {
        let store = MemoryStore::new();
        run(&store, &opt.command).await
    } else {
        let config = ImportConfig::from_env()?;
        let store = PgStore::connect(&config.database_url()).await?;
        store.ensure_schema().await?;
        run(&store, &opt.command).await
    }
}
