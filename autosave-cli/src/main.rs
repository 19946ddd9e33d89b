/*!
Autosave CLI - inspect and maintain autosave directories.

Lists save files, shows their decoded entries, verifies that they decode,
and lists or prunes their backups.
*/

use autosave_core::backup::{self, BackupEntry};
use autosave_core::codec::{codec_for, SnapshotCodec};
use autosave_core::config::PRIMARY_SUFFIX;
use autosave_core::{AutosaveError, Format, LocalFileStorage, Snapshot, StorageAdapter};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tabled::{Table, Tabled};
use tracing::{debug, error, info};

#[derive(Parser)]
#[command(name = "autosave")]
#[command(about = "Inspect and maintain autosave directories")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Autosave directory
    #[arg(short, long, global = true, env = "AUTOSAVE_DIR", default_value = ".")]
    dir: PathBuf,

    /// Encoding of the save files
    #[arg(short, long, global = true, value_enum, default_value = "yaml")]
    format: FileFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum FileFormat {
    Json,
    Yaml,
}

impl From<FileFormat> for Format {
    fn from(format: FileFormat) -> Self {
        match format {
            FileFormat::Json => Format::Json,
            FileFormat::Yaml => Format::Yaml,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List the save files in the directory
    List,
    /// Show the entries of a save file
    Show {
        /// Save-file name, without suffix
        name: String,
    },
    /// Check that a save file decodes
    Verify {
        /// Save-file name, without suffix
        name: String,
    },
    /// List the backups of a save file
    Backups {
        /// Save-file name, without suffix
        name: String,
    },
    /// Delete all but the newest timestamped backups of a save file
    Prune {
        /// Save-file name, without suffix
        name: String,
        /// Number of timestamped backups to keep
        #[arg(short, long)]
        keep: usize,
        /// Skip confirmation prompt
        #[arg(long)]
        force: bool,
    },
}

#[derive(Tabled)]
struct SaveFileInfo {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Entries")]
    entries: String,
    #[tabled(rename = "Size")]
    size: String,
    #[tabled(rename = "Modified")]
    modified: String,
}

#[derive(Tabled)]
struct EntryInfo {
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Value")]
    value: String,
}

#[derive(Tabled)]
struct BackupInfo {
    #[tabled(rename = "File")]
    file: String,
    #[tabled(rename = "Taken")]
    taken: String,
    #[tabled(rename = "Size")]
    size: String,
}

/// Shared context for all commands
struct Context {
    storage: LocalFileStorage,
    codec: Box<dyn SnapshotCodec>,
}

impl Context {
    fn new(cli: &Cli) -> Self {
        Self {
            storage: LocalFileStorage::with_base_dir(&cli.dir),
            codec: codec_for(cli.format.into()),
        }
    }

    fn decode(&self, name: &str) -> Result<Snapshot, AutosaveError> {
        let data = self.storage.load(&backup::canonical_name(name))?;
        self.codec.decode(&data)
    }

    fn size_of(&self, file_name: &str) -> String {
        match std::fs::metadata(self.storage.resolve_path(file_name)) {
            Ok(meta) => format_size(meta.len()),
            Err(_) => "Unknown".to_string(),
        }
    }

    fn modified_of(&self, file_name: &str) -> String {
        std::fs::metadata(self.storage.resolve_path(file_name))
            .and_then(|meta| meta.modified())
            .map(|time| {
                chrono::DateTime::<chrono::Local>::from(time)
                    .format("%Y-%m-%d %H:%M:%S")
                    .to_string()
            })
            .unwrap_or_else(|_| "Unknown".to_string())
    }
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    if !cli.dir.is_dir() {
        return Err(anyhow::anyhow!(
            "autosave directory not found: {}",
            cli.dir.display()
        ));
    }
    let ctx = Context::new(&cli);
    debug!(dir = %cli.dir.display(), format = ctx.codec.format_name(), "using autosave directory");

    match cli.command {
        Commands::List => list_save_files(&ctx).await?,
        Commands::Show { name } => show_save_file(&ctx, &name).await?,
        Commands::Verify { name } => verify_save_file(&ctx, &name).await?,
        Commands::Backups { name } => list_backups(&ctx, &name).await?,
        Commands::Prune { name, keep, force } => prune_backups(&ctx, &name, keep, force).await?,
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug"))
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Save-file names of the canonical files in a directory listing
fn save_file_names(files: &[String]) -> Vec<String> {
    let suffix = format!(".{PRIMARY_SUFFIX}");
    files
        .iter()
        .filter(|file| !file.starts_with('.'))
        .filter_map(|file| file.strip_suffix(&suffix))
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

async fn list_save_files(ctx: &Context) -> Result<(), anyhow::Error> {
    let mut rows = Vec::new();
    for name in save_file_names(&ctx.storage.list()?) {
        let canonical = backup::canonical_name(&name);
        let entries = match ctx.decode(&name) {
            Ok(snapshot) => snapshot.len().to_string(),
            Err(e) => {
                debug!(file = %name, error = %e, "cannot decode save file");
                "unreadable".to_string()
            }
        };
        rows.push(SaveFileInfo {
            entries,
            size: ctx.size_of(&canonical),
            modified: ctx.modified_of(&canonical),
            name,
        });
    }

    if rows.is_empty() {
        println!("No save files found");
    } else {
        println!("{}", Table::new(rows));
    }
    Ok(())
}

async fn show_save_file(ctx: &Context, name: &str) -> Result<(), anyhow::Error> {
    let snapshot = ctx.decode(name)?;
    if snapshot.is_empty() {
        println!("Save file '{name}' has no entries");
        return Ok(());
    }

    let rows: Vec<EntryInfo> = snapshot
        .iter()
        .map(|(key, value)| EntryInfo {
            key: key.to_string(),
            kind: value.kind().to_string(),
            value: value.to_string(),
        })
        .collect();
    println!("{}", Table::new(rows));
    Ok(())
}

async fn verify_save_file(ctx: &Context, name: &str) -> Result<(), anyhow::Error> {
    info!(file = %name, "verifying save file");
    match ctx.decode(name) {
        Ok(snapshot) => {
            println!(
                "✓ {} decodes as {} with {} entries",
                backup::canonical_name(name),
                ctx.codec.format_name(),
                snapshot.len()
            );
            Ok(())
        }
        Err(e) => {
            error!("✗ Failed to verify save file: {}", e);
            Err(e.into())
        }
    }
}

async fn list_backups(ctx: &Context, name: &str) -> Result<(), anyhow::Error> {
    let backups = backup::list_backups(&ctx.storage, name)?;
    if backups.is_empty() {
        println!("No backups found for '{name}'");
        return Ok(());
    }

    let rows: Vec<BackupInfo> = backups
        .iter()
        .map(|entry| BackupInfo {
            file: entry.file_name.clone(),
            taken: describe_taken(entry),
            size: ctx.size_of(&entry.file_name),
        })
        .collect();
    println!("{}", Table::new(rows));
    Ok(())
}

async fn prune_backups(
    ctx: &Context,
    name: &str,
    keep: usize,
    force: bool,
) -> Result<(), anyhow::Error> {
    if !force {
        print!("Delete all but the newest {keep} timestamped backups of '{name}'? (y/N): ");
        use std::io::{self, Write};
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;

        if !input.trim().to_lowercase().starts_with('y') {
            println!("Prune cancelled");
            return Ok(());
        }
    }

    let deleted = backup::prune_backups(&ctx.storage, name, keep)?;
    info!(file = %name, deleted = deleted.len(), "pruned backups");
    println!("✓ Deleted {} backup(s)", deleted.len());
    Ok(())
}

fn describe_taken(entry: &BackupEntry) -> String {
    match entry.taken_at {
        Some(taken_at) if entry.sequence > 0 => {
            format!("{} (#{})", taken_at.format("%Y-%m-%d %H:%M:%S"), entry.sequence)
        }
        Some(taken_at) => taken_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => "rotating".to_string(),
    }
}

fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}
