mod config;
mod database;
mod error;
mod fetch;
mod ingest;
mod manifest;
mod models;
mod normalize;
mod sample;
mod samplesheet;
mod store;
mod walker;

use std::error::Error;
use std::path::Path;

use env_logger::Env;
use structopt::StructOpt;

use crate::database::Database;
use crate::fetch::{Credentials, Fetcher};
use crate::store::MemoryStore;

#[macro_use]
extern crate log;

type Result<T> = std::result::Result<T, Box<dyn Error>>;

/// Print the parsed content of one input file, without touching any store
fn check(file: &Path) -> Result<()> {
    let ext = file
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    if walker::METADATA_EXTENSIONS.contains(&ext.as_str()) {
        let rows = samplesheet::read_metadata(file)?;
        for r in &rows {
            println!("{}", serde_json::to_string(r)?);
        }
        info!("{}: {} metadata rows", file.display(), rows.len());
    } else if walker::MANIFEST_EXTENSIONS.contains(&ext.as_str()) {
        let entries = manifest::read_manifest(file)?;
        for e in &entries {
            println!("{}", serde_json::to_string(e)?);
        }
        info!("{}: {} file entries", file.display(), entries.len());
    } else {
        return Err(Box::from(format!("Don't know how to parse {}", file.display())));
    }
    Ok(())
}

fn ingest(
    connstr: &str,
    datadir: &Path,
    fetcher: Option<Fetcher>,
    truncate: bool,
    dry_run: bool,
) -> Result<()> {
    if let Some(fetcher) = fetcher {
        fetcher.clean()?;
        fetcher.fetch()?;
    }

    let report = if dry_run {
        let mut store = MemoryStore::new();
        let report = ingest::run(&mut store, datadir, truncate)?;
        info!(
            "Dry run: would store {} metadata records, {} runs and {} files",
            store.metadata.len(),
            store.runs.len(),
            store.files.len()
        );
        report
    } else {
        let mut db = Database::new(connstr, false)?;
        ingest::run(&mut db, datadir, truncate)?
    };

    report.log_summary();
    Ok(())
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let config = config::Opt::from_args();

    // set up logging
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    match config.cmd {
        config::Command::Ingest {
            url,
            user,
            password,
            skip_fetch,
            no_truncate,
            dry_run,
        } => {
            let fetcher = if skip_fetch {
                None
            } else {
                let auth = user.map(|user| Credentials {
                    user,
                    password: password.unwrap_or_default(),
                });
                Some(Fetcher::new(&config.datadir, &url, auth)?)
            };
            ingest(&config.connstr, &config.datadir, fetcher, !no_truncate, dry_run)
        }

        config::Command::Initialize => {
            Database::new(&config.connstr, true)?;
            Ok(())
        }

        config::Command::Check { file } => check(&file),
    }
}
