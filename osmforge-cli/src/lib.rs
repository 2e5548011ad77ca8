//! Command-line interface for the import pipeline.
#![forbid(unsafe_code)]

use std::fs::File;
use std::io::BufReader;

use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Parser, Subcommand};
use log::info;

use osmforge_cache::{run_query, ElementCache, Expansion, QueryRequest};
use osmforge_core::mapping::Mapping;
use osmforge_pipeline::{run_import, run_update, stream, PipelineConfig};
use osmforge_store::{FeatureStore, Slot};

mod error;

pub use error::CliError;

/// Run the CLI with the current process arguments.
pub fn run() -> Result<(), CliError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::try_parse().map_err(CliError::ArgumentParsing)?;
    cli.dispatch()
}

#[derive(Debug, Parser)]
#[command(
    name = "osmforge",
    about = "OpenStreetMap import, diff-update, and deployment tooling",
    version
)]
struct Cli {
    /// Pipeline configuration document (JSON).
    #[arg(long, global = true, value_name = "path")]
    config: Option<Utf8PathBuf>,
    /// Mapping document (JSON).
    #[arg(long, global = true, value_name = "path")]
    mapping: Option<Utf8PathBuf>,
    /// Working directory for the element cache.
    #[arg(long, global = true, value_name = "dir", default_value = "cache")]
    cache_dir: Utf8PathBuf,
    /// Working directory for the feature database.
    #[arg(long, global = true, value_name = "dir", default_value = "db")]
    db: Utf8PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Full import from a JSON-lines element stream.
    Import {
        /// Element stream to read.
        #[arg(long, value_name = "path")]
        source: Utf8PathBuf,
    },
    /// Apply a JSON-lines change batch to the production tables.
    Update {
        /// Change stream to read.
        #[arg(long, value_name = "path")]
        changes: Utf8PathBuf,
    },
    /// Inspect cached elements and their dependents.
    Query(QueryArgs),
    /// Promote the import slot to production.
    Deploy,
    /// Restore the previous production generation from backup.
    RevertDeploy,
    /// Drop the backup generation.
    RemoveBackup,
}

/// Arguments of the `query` subcommand.
#[derive(Debug, Args)]
struct QueryArgs {
    /// Node ids to look up.
    #[arg(long = "node", value_name = "id")]
    nodes: Vec<i64>,
    /// Way ids to look up.
    #[arg(long = "way", value_name = "id")]
    ways: Vec<i64>,
    /// Relation ids to look up.
    #[arg(long = "rel", value_name = "id")]
    relations: Vec<i64>,
    /// Include direct dependents from the reverse indices.
    #[arg(long, conflicts_with = "full")]
    deps: bool,
    /// Expand dependents recursively.
    #[arg(long)]
    full: bool,
}

impl Cli {
    fn dispatch(self) -> Result<(), CliError> {
        let config = self.load_config()?;
        let cache_dir = config.cache_dir.clone().unwrap_or_else(|| self.cache_dir.clone());
        match &self.command {
            Command::Import { source } => {
                let mapping = self.load_mapping()?;
                let mut cache = ElementCache::create_fresh(&cache_dir)?;
                let mut store = FeatureStore::open(&self.db)?;
                let reader = open_reader(source)?;
                let summary = run_import(
                    &mut cache,
                    &mut store,
                    &mapping,
                    &config,
                    stream::read_elements(reader),
                )?;
                info!(
                    "imported {} nodes, {} ways, {} relations into {} feature rows",
                    summary.nodes, summary.ways, summary.relations, summary.features
                );
            }
            Command::Update { changes } => {
                let mapping = self.load_mapping()?;
                let mut cache = ElementCache::open(&cache_dir)?;
                let mut store = FeatureStore::open(&self.db)?;
                let reader = open_reader(changes)?;
                let summary = run_update(
                    &mut cache,
                    &mut store,
                    &mapping,
                    &config,
                    Slot::Production,
                    stream::read_changes(reader),
                )?;
                info!(
                    "applied {} changes, re-derived {} elements",
                    summary.changes, summary.re_derived
                );
            }
            Command::Query(args) => {
                let cache = ElementCache::open(&cache_dir)?;
                let report = run_query(&cache, &args.request())?;
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
            Command::Deploy => {
                let mapping = self.load_mapping()?;
                FeatureStore::open(&self.db)?.deploy(&mapping)?;
            }
            Command::RevertDeploy => {
                let mapping = self.load_mapping()?;
                FeatureStore::open(&self.db)?.revert_deploy(&mapping)?;
            }
            Command::RemoveBackup => {
                let mapping = self.load_mapping()?;
                FeatureStore::open(&self.db)?.remove_backup(&mapping)?;
            }
        }
        Ok(())
    }

    fn load_config(&self) -> Result<PipelineConfig, CliError> {
        match &self.config {
            Some(path) => {
                let text = read_to_string(path)?;
                Ok(PipelineConfig::from_json(&text)?)
            }
            None => Ok(PipelineConfig::default()),
        }
    }

    fn load_mapping(&self) -> Result<Mapping, CliError> {
        let path = self.mapping.as_ref().ok_or(CliError::MissingMapping)?;
        let text = read_to_string(path)?;
        Ok(Mapping::from_json(&text)?)
    }
}

impl QueryArgs {
    fn request(&self) -> QueryRequest {
        let expansion = if self.full {
            Expansion::Full
        } else if self.deps {
            Expansion::Deps
        } else {
            Expansion::None
        };
        QueryRequest {
            nodes: self.nodes.clone(),
            ways: self.ways.clone(),
            relations: self.relations.clone(),
            expansion,
        }
    }
}

fn read_to_string(path: &Utf8Path) -> Result<String, CliError> {
    std::fs::read_to_string(path.as_std_path()).map_err(|source| CliError::ReadInput {
        path: path.to_owned(),
        source,
    })
}

fn open_reader(path: &Utf8Path) -> Result<BufReader<File>, CliError> {
    File::open(path.as_std_path())
        .map(BufReader::new)
        .map_err(|source| CliError::ReadInput {
            path: path.to_owned(),
            source,
        })
}
