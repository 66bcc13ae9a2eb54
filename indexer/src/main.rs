use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use komodo_core::{DocumentInput, Komodo, KomodoConfig, ParseResult, QueryClause, SearchQuery};
use serde::Deserialize;
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// One document to index, as produced by an upstream parser.
#[derive(Debug, Deserialize)]
struct InputRecord {
    #[serde(default)]
    document: DocumentInput,
    parse_result: ParseResult,
}

#[derive(Parser)]
#[command(name = "komodo-indexer")]
#[command(about = "Create indices, add parsed documents and query them", long_about = None)]
struct Cli {
    /// Catalog directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an empty index
    CreateIndex { name: String },
    /// Delete an index with all of its documents and terms
    DeleteIndex { name: String },
    /// List indices
    ListIndices,
    /// Add parsed documents from a JSON/JSONL file or a directory of them
    Add {
        #[arg(long)]
        index: String,
        /// Input path (file or directory)
        #[arg(long)]
        input: PathBuf,
        /// Create the index if it does not exist
        #[arg(long, default_value_t = false)]
        create: bool,
    },
    /// Print catalog statistics
    Stats {
        #[arg(long)]
        index: Option<String>,
    },
    /// Search an index by terms
    Search {
        #[arg(long)]
        index: String,
        #[arg(long = "required", short = 'r')]
        required: Vec<String>,
        #[arg(long = "optional", short = 'o')]
        optional: Vec<String>,
        #[arg(long = "exclude", short = 'x')]
        exclude: Vec<String>,
        #[arg(long, default_value_t = 0)]
        start: usize,
        #[arg(long, default_value_t = 10)]
        max: usize,
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
}

fn load_config(cli: &Cli) -> Result<KomodoConfig> {
    let mut config = match &cli.config {
        Some(path) => KomodoConfig::from_file(path)?,
        None => KomodoConfig::default(),
    };
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    Ok(config)
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();
    let komodo = Komodo::open(load_config(&cli)?)?;

    match cli.command {
        Commands::CreateIndex { name } => {
            let record = komodo.create_index(&name)?;
            print_json(&record)?;
        }
        Commands::DeleteIndex { name } => komodo.delete_index(&name)?,
        Commands::ListIndices => print_json(&komodo.list_indices()?)?,
        Commands::Add { index, input, create } => {
            if create && komodo.get_index(&index).is_err() {
                komodo.create_index(&index)?;
            }
            add_path(&komodo, &index, &input)?;
        }
        Commands::Stats { index } => print_json(&komodo.stats(index.as_deref())?)?,
        Commands::Search { index, required, optional, exclude, start, max, timeout_ms } => {
            let query = SearchQuery {
                required: QueryClause::terms(required),
                optional: QueryClause::terms(optional),
                exclude: QueryClause::terms(exclude),
                start_index: start,
                max_results: max,
                include_metadata: true,
                timeout_ms,
            };
            print_json(&komodo.search(&index, &query)?)?;
        }
    }
    komodo.flush()?;
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn add_path(komodo: &Komodo, index: &str, input: &Path) -> Result<()> {
    let mut files: Vec<PathBuf> = Vec::new();
    if input.is_dir() {
        for entry in WalkDir::new(input).into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() {
                if let Some(ext) = p.extension().and_then(|s| s.to_str()) {
                    if matches!(ext, "json" | "jsonl") {
                        files.push(p.to_path_buf());
                    }
                }
            }
        }
        files.sort();
    } else if input.is_file() {
        files.push(input.to_path_buf());
    } else {
        bail!("input path does not exist: {}", input.display());
    }

    let mut added = 0usize;
    for file in files {
        let records = if file.extension().and_then(|s| s.to_str()) == Some("jsonl") {
            read_jsonl(&file)?
        } else {
            read_json(&file)?
        };
        for record in records {
            let result = komodo.add(index, record.document, record.parse_result)?;
            tracing::debug!(file = %file.display(), document = %result.source_document.guid, "indexed");
            added += 1;
        }
    }
    tracing::info!(index, added, "ingest complete");
    Ok(())
}

fn read_jsonl(file: &Path) -> Result<Vec<InputRecord>> {
    let reader = BufReader::new(File::open(file)?);
    let mut out = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        out.push(serde_json::from_str(&line)?);
    }
    Ok(out)
}

fn read_json(file: &Path) -> Result<Vec<InputRecord>> {
    let reader = BufReader::new(File::open(file)?);
    let json: serde_json::Value = serde_json::from_reader(reader)?;
    match json {
        serde_json::Value::Array(arr) => {
            let mut out = Vec::with_capacity(arr.len());
            for v in arr {
                out.push(serde_json::from_value(v)?);
            }
            Ok(out)
        }
        serde_json::Value::Object(_) => Ok(vec![serde_json::from_value(json)?]),
        _ => bail!("expected a JSON object or array in {}", file.display()),
    }
}
