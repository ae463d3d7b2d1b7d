//! The `tessera ingest` command.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tessera_core::{BoardSet, Config, EntryId, IngestError, IngestMetadata, PuritySet, Tessera};
use tokio::task::JoinSet;

/// Arguments for the `ingest` command.
#[derive(Args, Debug)]
pub struct IngestArgs {
    /// Image files to ingest
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Boards the entries belong to (comma-separated, or `all`)
    #[arg(long, default_value = "general")]
    pub board: BoardSet,

    /// Purity levels of the entries (comma-separated)
    #[arg(long, default_value = "sfw")]
    pub purity: PuritySet,

    /// Tag to attach; repeat for several
    #[arg(short, long = "tag")]
    pub tags: Vec<String>,

    /// Mark the entries as featured
    #[arg(long)]
    pub featured: bool,

    /// Declared mimetype; guessed from the file extension when omitted
    #[arg(long)]
    pub mimetype: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum FileOutcome {
    Ingested { file: PathBuf, id: EntryId },
    Duplicate { file: PathBuf, existing_id: EntryId },
    Failed { file: PathBuf, error: String },
}

/// Execute the ingest command.
pub async fn execute(config: Config, args: IngestArgs) -> anyhow::Result<()> {
    let in_flight = config.processing.parallel_workers * 2;
    let tessera = Arc::new(super::open_catalog(config)?);
    let metadata = IngestMetadata {
        boards: args.board,
        purity: args.purity,
        tags: args.tags,
        featured: args.featured,
    };

    let total = args.files.len();
    let progress = (total > 1).then(|| create_progress_bar(total as u64));
    let mut tasks = JoinSet::new();
    let mut pending = args.files.into_iter();
    let (mut ingested, mut duplicates, mut failed) = (0usize, 0usize, 0usize);

    loop {
        while tasks.len() < in_flight {
            let Some(file) = pending.next() else { break };
            let tessera = tessera.clone();
            let metadata = metadata.clone();
            let mimetype = args.mimetype.clone();
            tasks.spawn(async move { ingest_file(&tessera, file, mimetype, metadata).await });
        }

        let Some(joined) = tasks.join_next().await else { break };
        let outcome = joined?;
        match &outcome {
            FileOutcome::Ingested { .. } => ingested += 1,
            FileOutcome::Duplicate { .. } => duplicates += 1,
            FileOutcome::Failed { file, error } => {
                failed += 1;
                tracing::error!("Failed to ingest {:?}: {}", file, error);
            }
        }

        let line = serde_json::to_string(&outcome)?;
        match &progress {
            Some(pb) => {
                pb.suspend(|| println!("{line}"));
                pb.inc(1);
            }
            None => println!("{line}"),
        }
    }

    if let Some(pb) = progress {
        pb.finish_and_clear();
    }
    tracing::info!(
        "Ingested {} of {} files ({} duplicates, {} failed)",
        ingested,
        total,
        duplicates,
        failed
    );

    if failed > 0 {
        anyhow::bail!("{failed} of {total} files failed to ingest");
    }
    Ok(())
}

async fn ingest_file(
    tessera: &Tessera,
    file: PathBuf,
    mimetype: Option<String>,
    metadata: IngestMetadata,
) -> FileOutcome {
    let bytes = match tokio::fs::read(&file).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return FileOutcome::Failed {
                error: format!("read failed: {e}"),
                file,
            }
        }
    };
    let mimetype = mimetype.unwrap_or_else(|| mimetype_for(&file).to_string());

    match tessera.ingest(&bytes, &mimetype, metadata).await {
        Ok(entry) => FileOutcome::Ingested { file, id: entry.id },
        Err(IngestError::DuplicateContent { existing_id }) => {
            FileOutcome::Duplicate { file, existing_id }
        }
        Err(e) => FileOutcome::Failed {
            error: e.to_string(),
            file,
        },
    }
}

/// Mimetype implied by the file extension. Unknown extensions map to a type
/// the validator refuses.
fn mimetype_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

fn create_progress_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::default_bar()
        .template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");
    pb.set_style(style);
    pb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mimetype_for_extension() {
        assert_eq!(mimetype_for(Path::new("a/b.JPG")), "image/jpeg");
        assert_eq!(mimetype_for(Path::new("b.jpeg")), "image/jpeg");
        assert_eq!(mimetype_for(Path::new("b.webp")), "image/webp");
        assert_eq!(mimetype_for(Path::new("b.tiff")), "application/octet-stream");
        assert_eq!(mimetype_for(Path::new("noext")), "application/octet-stream");
    }

    #[test]
    fn test_outcome_serializes_with_status_tag() {
        let outcome = FileOutcome::Duplicate {
            file: PathBuf::from("a.png"),
            existing_id: EntryId(7),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "duplicate");
        assert_eq!(json["existing_id"], 7);
    }
}
