use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use strata_api::{
    ComputeEmbeddingRequest, ComputeSignalRequest, CreateDatasetRequest, DatasetService,
    DeleteSignalRequest, MediaRequest, SelectRowsSchemaRequest, SourceRequest, StatsRequest,
};
use strata_core::{Path, SignalDescriptor};
use strata_pipeline::TaskStatus;
use strata_query::{SelectGroupsOptions, SelectRowsOptions};
use strata_storage::DatasetSettings;

/// Curate nested datasets and materialize signal columns
#[derive(Parser, Debug)]
#[command(name = "strata")]
#[command(about = "A dataset curation engine", long_about = None)]
struct Args {
    /// Path to the data directory
    #[arg(short, long, default_value = "./data")]
    data_dir: PathBuf,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a dataset from a source, e.g. '{"source_name": "json", "filepaths": ["rows.jsonl"]}'
    Create {
        namespace: String,
        name: String,
        #[arg(long)]
        source: String,
    },
    /// List datasets
    Datasets,
    /// Print the manifest of a dataset
    Manifest { namespace: String, name: String },
    /// Print the persisted config of a dataset
    Config { namespace: String, name: String },
    /// Print the settings of a dataset
    Settings { namespace: String, name: String },
    /// Replace the settings of a dataset with a JSON object
    UpdateSettings {
        namespace: String,
        name: String,
        settings: String,
    },
    /// Compute a signal over a leaf, e.g. '{"signal_name": "substring_search", "query": "hi"}'
    ComputeSignal {
        namespace: String,
        name: String,
        leaf_path: String,
        signal: String,
    },
    /// Compute an embedding over a leaf
    ComputeEmbedding {
        namespace: String,
        name: String,
        leaf_path: String,
        embedding: String,
    },
    /// Delete a materialized signal by its output path
    DeleteSignal {
        namespace: String,
        name: String,
        signal_path: String,
    },
    /// Delete a dataset
    Delete { namespace: String, name: String },
    /// Statistics of a leaf
    Stats {
        namespace: String,
        name: String,
        leaf_path: String,
    },
    /// Query rows with JSON options
    SelectRows {
        namespace: String,
        name: String,
        #[arg(default_value = "{}")]
        options: String,
    },
    /// Schema of a row query
    SelectRowsSchema {
        namespace: String,
        name: String,
        #[arg(default_value = "{}")]
        options: String,
    },
    /// Value or bin counts of a leaf, e.g. '{"leaf_path": "label"}'
    SelectGroups {
        namespace: String,
        name: String,
        options: String,
    },
    /// Write the bytes of a binary leaf
    Media {
        namespace: String,
        name: String,
        item_id: String,
        leaf_path: String,
        /// Output file, stdout when absent
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List registered signals
    Signals,
}

fn parse_json<T: DeserializeOwned>(what: &str, raw: &str) -> anyhow::Result<T> {
    serde_json::from_str(raw).with_context(|| format!("invalid {} JSON", what))
}

fn print<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run(service: &DatasetService, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Create {
            namespace,
            name,
            source,
        } => {
            let source: SourceRequest = parse_json("source", &source)?;
            let manifest = service.create_dataset(CreateDatasetRequest {
                namespace,
                dataset_name: name,
                source,
            })?;
            print(&manifest)
        }
        Command::Datasets => print(&service.list_datasets()?),
        Command::Manifest { namespace, name } => print(&service.manifest(&namespace, &name)?),
        Command::Config { namespace, name } => print(&service.config(&namespace, &name)?),
        Command::Settings { namespace, name } => print(&service.settings(&namespace, &name)?),
        Command::UpdateSettings {
            namespace,
            name,
            settings,
        } => {
            let settings: DatasetSettings = parse_json("settings", &settings)?;
            service.update_settings(&namespace, &name, settings)?;
            print(&service.settings(&namespace, &name)?)
        }
        Command::ComputeSignal {
            namespace,
            name,
            leaf_path,
            signal,
        } => {
            let signal: SignalDescriptor = parse_json("signal", &signal)?;
            let response = service.compute_signal(
                &namespace,
                &name,
                ComputeSignalRequest {
                    signal,
                    leaf_path: Path::parse(&leaf_path)?,
                },
            )?;
            wait(service, &response.task_id)
        }
        Command::ComputeEmbedding {
            namespace,
            name,
            leaf_path,
            embedding,
        } => {
            let response = service.compute_embedding(
                &namespace,
                &name,
                ComputeEmbeddingRequest {
                    embedding,
                    leaf_path: Path::parse(&leaf_path)?,
                },
            )?;
            wait(service, &response.task_id)
        }
        Command::DeleteSignal {
            namespace,
            name,
            signal_path,
        } => {
            let response = service.delete_signal(
                &namespace,
                &name,
                DeleteSignalRequest {
                    signal_path: Path::parse(&signal_path)?,
                },
            )?;
            print(&response)
        }
        Command::Delete { namespace, name } => {
            service.delete_dataset(&namespace, &name)?;
            info!("Deleted {}/{}", namespace, name);
            Ok(())
        }
        Command::Stats {
            namespace,
            name,
            leaf_path,
        } => {
            let request = StatsRequest {
                leaf_path: Path::parse(&leaf_path)?,
            };
            print(&service.stats(&namespace, &name, request)?)
        }
        Command::SelectRows {
            namespace,
            name,
            options,
        } => {
            let options: SelectRowsOptions = parse_json("select rows options", &options)?;
            print(&service.select_rows(&namespace, &name, &options)?)
        }
        Command::SelectRowsSchema {
            namespace,
            name,
            options,
        } => {
            let request: SelectRowsSchemaRequest =
                parse_json("select rows schema options", &options)?;
            print(&service.select_rows_schema(&namespace, &name, request)?)
        }
        Command::SelectGroups {
            namespace,
            name,
            options,
        } => {
            let options: SelectGroupsOptions = parse_json("select groups options", &options)?;
            print(&service.select_groups(&namespace, &name, &options)?)
        }
        Command::Media {
            namespace,
            name,
            item_id,
            leaf_path,
            output,
        } => {
            let bytes = service.media(&namespace, &name, &MediaRequest { item_id, leaf_path })?;
            match output {
                Some(path) => std::fs::write(&path, &bytes)
                    .with_context(|| format!("failed to write {}", path.display()))?,
                None => std::io::stdout().write_all(&bytes)?,
            }
            Ok(())
        }
        Command::Signals => print(&service.signals()),
    }
}

/// Materializations are queued; the CLI blocks on the task before exiting.
fn wait(service: &DatasetService, task_id: &str) -> anyhow::Result<()> {
    let task = service.wait(task_id)?;
    print(&task)?;
    if task.status == TaskStatus::Error {
        anyhow::bail!("task {} failed: {}", task_id, task.error.unwrap_or_default());
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting strata v{}", env!("CARGO_PKG_VERSION"));
    info!("Data directory: {:?}", args.data_dir);

    let service = DatasetService::open(&args.data_dir)?;
    run(&service, args.command)
}
