pub mod cli;
pub mod database;
pub mod importer;
pub mod inference;
pub mod naming;
pub mod primary_key;
pub mod report;
pub mod schema;
pub mod source;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, info};

use crate::cli::Cli;

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("csv_sqlite_import", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let options = Cli::parse().into_options()?;
    info!(
        "Importing CSV files from {:?} into {:?}",
        options.csv_dir, options.db_path
    );
    let summary = importer::run_import(&options)
        .with_context(|| format!("Importing {:?}", options.csv_dir))?;
    print!("{}", report::render_summary(&summary));
    summary.into_result().map(|_| ())
}
