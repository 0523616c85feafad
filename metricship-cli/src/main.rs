//! CLI for metricship.
//!
//! Provides commands for inspecting fallback spools and computing
//! destination names.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use metricship::{DestinationNamer, FallbackStore, RotationFrequency, ShipperConfig};
use tracing_subscriber::EnvFilter;

/// metricship — buffered metric shipper CLI.
#[derive(Parser)]
#[command(name = "metricship", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// List fallback files in a spool directory with their document counts.
    Inspect {
        /// Path to the fallback directory.
        dir: PathBuf,

        /// Output format.
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },

    /// Print the destination a batch shipped right now would go to.
    Destination {
        /// Destination prefix. Overrides the config file.
        #[arg(long)]
        prefix: Option<String>,

        /// Rotation frequency (daily, weekly, monthly, yearly, never).
        /// Overrides the config file.
        #[arg(long)]
        rotation: Option<RotationFrequency>,

        /// JSON shipper config to take prefix and rotation from.
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

/// Output format for `inspect`.
#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// One line per file.
    Text,
    /// JSON array of objects.
    Json,
}

/// Summary of one fallback file.
struct SpoolEntry {
    path: PathBuf,
    documents: Result<usize, String>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Inspect { dir, format } => cmd_inspect(&dir, &format),
        Commands::Destination {
            prefix,
            rotation,
            config,
        } => cmd_destination(prefix, rotation, config.as_deref()),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Implements `metricship inspect <dir>`.
fn cmd_inspect(dir: &Path, format: &OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    if !dir.is_dir() {
        return Err(format!("No fallback directory at '{}'", dir.display()).into());
    }

    let entries = scan_spool(dir)?;
    match format {
        OutputFormat::Text => print!("{}", render_text(dir, &entries)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&render_json(&entries))?),
    }
    Ok(())
}

/// Reads every fallback file in `dir`. Unreadable files are reported, not fatal.
fn scan_spool(dir: &Path) -> Result<Vec<SpoolEntry>, Box<dyn std::error::Error>> {
    let files = FallbackStore::new(dir).list()?;
    tracing::debug!(dir = %dir.display(), files = files.len(), "scanned fallback directory");

    Ok(files
        .into_iter()
        .map(|path| {
            let documents = FallbackStore::read_batch(&path)
                .map(|docs| docs.len())
                .map_err(|e| e.to_string());
            if let Err(e) = &documents {
                tracing::warn!(path = %path.display(), error = %e, "unreadable fallback file");
            }
            SpoolEntry { path, documents }
        })
        .collect())
}

fn render_text(dir: &Path, entries: &[SpoolEntry]) -> String {
    let mut out = format!("Fallback directory: {}\n", dir.display());
    if entries.is_empty() {
        out.push_str("No fallback files.\n");
        return out;
    }

    let mut total = 0;
    let mut unreadable = 0;
    for entry in entries {
        let name = entry
            .path
            .file_name()
            .map_or_else(|| entry.path.display().to_string(), |n| n.to_string_lossy().into_owned());
        match &entry.documents {
            Ok(count) => {
                total += count;
                out.push_str(&format!("  {name}  {count} document(s)\n"));
            }
            Err(e) => {
                unreadable += 1;
                out.push_str(&format!("  {name}  unreadable: {e}\n"));
            }
        }
    }

    out.push_str(&format!(
        "\n{} file(s), {total} document(s)",
        entries.len()
    ));
    if unreadable > 0 {
        out.push_str(&format!(", {unreadable} unreadable"));
    }
    out.push('\n');
    out
}

fn render_json(entries: &[SpoolEntry]) -> serde_json::Value {
    entries
        .iter()
        .map(|entry| {
            let mut obj = serde_json::Map::new();
            obj.insert(
                "path".to_string(),
                serde_json::Value::String(entry.path.display().to_string()),
            );
            match &entry.documents {
                Ok(count) => {
                    obj.insert("documents".to_string(), serde_json::json!(count));
                }
                Err(e) => {
                    obj.insert("error".to_string(), serde_json::json!(e));
                }
            }
            serde_json::Value::Object(obj)
        })
        .collect()
}

/// Implements `metricship destination`.
fn cmd_destination(
    prefix: Option<String>,
    rotation: Option<RotationFrequency>,
    config: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", resolve_namer(prefix, rotation, config)?.name_now());
    Ok(())
}

/// Builds a namer from an optional config file with command-line overrides.
fn resolve_namer(
    prefix: Option<String>,
    rotation: Option<RotationFrequency>,
    config: Option<&Path>,
) -> Result<DestinationNamer, Box<dyn std::error::Error>> {
    let mut config = match config {
        Some(path) => ShipperConfig::from_json_file(path)?,
        None => ShipperConfig::default(),
    };
    if let Some(prefix) = prefix {
        config.index_prefix = prefix;
    }
    if let Some(rotation) = rotation {
        config.rotation = rotation;
    }
    config.validate()?;
    Ok(config.namer())
}
