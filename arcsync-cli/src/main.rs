//! arcsync — Archive record synchronization tool.
//!
//! Reconciles a local directory of data files against the latest published
//! version of a record on a content-addressed archive, producing a new
//! version whose linked files match the directory.
//!
//! # Usage
//!
//! ```bash
//! # Print the checksum index of a local directory
//! arcsync index data/upload
//!
//! # Draft a new version of a record from ./data/upload
//! arcsync new-version --config config.yaml --previous xxxxx-yyyyy --dir data/upload
//!
//! # Same, but drop files that disappeared locally and publish the result
//! arcsync new-version --config config.yaml --previous xxxxx-yyyyy --dir data/upload \
//!     --discard-missing --publish
//! ```

use anyhow::{Context, Result};
use arcsync_core::{
    checksum, ArchiveConfig, ReconcileRequest, Reconciler, RetentionPolicy, VersionStatus,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "arcsync")]
#[command(author = "Arcsync Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Archive record version synchronization tool")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a new version of a published record from a local directory
    #[command(name = "new-version")]
    NewVersion {
        /// Path to the YAML configuration file (domain name, access token)
        #[arg(short, long, default_value = "config.yaml")]
        config: PathBuf,

        /// Id of the latest published version of the record
        #[arg(short, long)]
        previous: String,

        /// Directory holding the data files for the new version
        #[arg(short, long)]
        dir: PathBuf,

        /// Metadata document (YAML or JSON) to write into the draft
        #[arg(short, long)]
        metadata: Option<PathBuf>,

        /// Drop previously linked files that are absent from the directory
        #[arg(long)]
        discard_missing: bool,

        /// Publish the new version instead of leaving it as a draft
        #[arg(long)]
        publish: bool,
    },

    /// Print the checksum index of a local directory
    Index {
        /// Directory to index
        dir: PathBuf,

        /// File names to exclude from the index
        #[arg(long)]
        exclude: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("arcsync=info".parse().unwrap())
                .add_directive("arcsync_core=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::NewVersion {
            config,
            previous,
            dir,
            metadata,
            discard_missing,
            publish,
        } => cmd_new_version(config, previous, dir, metadata, discard_missing, publish).await,

        Commands::Index { dir, exclude } => cmd_index(dir, exclude),
    }
}

async fn cmd_new_version(
    config_path: PathBuf,
    previous: String,
    dir: PathBuf,
    metadata_path: Option<PathBuf>,
    discard_missing: bool,
    publish: bool,
) -> Result<()> {
    let config = ArchiveConfig::load(&config_path)?;
    let client = config.create_client();

    let mut exclude = Vec::new();
    let metadata = match metadata_path {
        Some(path) => {
            // A metadata descriptor living inside the upload directory must
            // not be indexed as a data file.
            if let (Some(parent), Some(name)) = (path.parent(), path.file_name()) {
                if parent == dir.as_path() {
                    exclude.push(name.to_string_lossy().into_owned());
                }
            }
            Some(load_metadata_document(&path)?)
        }
        None => None,
    };

    let request = ReconcileRequest {
        previous_id: previous,
        local_dir: dir,
        exclude,
        metadata,
        policy: RetentionPolicy { discard_missing },
        publish,
    };

    println!("Reconciling new version...");
    println!("  Previous:  {}", request.previous_id);
    println!("  Directory: {}", request.local_dir.display());

    let reconciler = Reconciler::new(&client);
    let report = reconciler.run(&request).await?;

    println!("\nReconciliation completed:");
    println!("  Version id: {}", report.version.id);
    println!("  Status:     {}", report.version.status);
    println!("  Kept:       {} link(s)", report.plan.keep.len());
    println!("  Dropped:    {} link(s)", report.plan.drop.len());
    println!("  Uploaded:   {} file(s)", report.plan.upload.len());

    match report.version.status {
        VersionStatus::Published => println!(
            "\nPlease visit https://{}/records/{}",
            config.domain_name, report.version.id
        ),
        VersionStatus::Draft => println!(
            "\nDraft left open; please visit https://{}/uploads/{}",
            config.domain_name, report.version.id
        ),
    }

    Ok(())
}

fn cmd_index(dir: PathBuf, exclude: Vec<String>) -> Result<()> {
    let set = checksum::index_directory(&dir, &exclude)
        .with_context(|| format!("Failed to index {}", dir.display()))?;

    if set.is_empty() {
        println!("No data files in {}", dir.display());
        return Ok(());
    }

    for file in set.iter() {
        println!("{}  {}", file.checksum, file.name);
    }

    Ok(())
}

/// Read a ready-made metadata section from a YAML or JSON file. YAML is a
/// superset of JSON, so one parser covers both.
fn load_metadata_document(path: &std::path::Path) -> Result<serde_json::Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read metadata file {}", path.display()))?;
    serde_yaml::from_str(&text)
        .with_context(|| format!("Failed to parse metadata file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_document_accepts_yaml_and_json() {
        let dir = tempfile::TempDir::new().unwrap();

        let yaml_path = dir.path().join("metadata.yaml");
        std::fs::write(&yaml_path, "title: record title\nkeywords:\n  - one\n").unwrap();
        let doc = load_metadata_document(&yaml_path).unwrap();
        assert_eq!(doc["title"], "record title");

        let json_path = dir.path().join("metadata.json");
        std::fs::write(&json_path, r#"{"title": "record title"}"#).unwrap();
        let doc = load_metadata_document(&json_path).unwrap();
        assert_eq!(doc["title"], "record title");
    }
}
