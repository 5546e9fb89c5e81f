//! Load stage — raw CSV snapshots into the partitioned dataset, then archive.
//!
//! Per file: read → clean → write partitions → move to the processed
//! directory. Each file succeeds or fails on its own; a failed file stays in
//! the raw directory and is retried on the next run.
//!
//! The dataset write and the archive move are two separate steps. A crash
//! between them leaves the file in the raw directory, so the next run loads
//! it again; overwrite-partition makes that repeat harmless.

use super::clean::{partition_table, CleanError};
use super::snapshot::{is_snapshot_file, read_snapshot, SnapshotError};
use super::store::{DatasetStore, PartitionWrite, StoreError};
use crate::config::PipelineConfig;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("read snapshot: {0}")]
    Read(#[from] SnapshotError),

    #[error("clean: {0}")]
    Clean(#[from] CleanError),

    #[error("write dataset: {0}")]
    Store(#[from] StoreError),

    #[error(
        "written to the dataset but not archived to {}: {source}{}",
        .dest.display(),
        rename_note(.rename)
    )]
    Archive {
        dest: PathBuf,
        source: io::Error,
        /// Why the rename was abandoned for copy and remove, if it was.
        rename: Option<io::Error>,
    },
}

fn rename_note(rename: &Option<io::Error>) -> String {
    rename
        .as_ref()
        .map(|e| format!(" (after rename failed: {e})"))
        .unwrap_or_default()
}

/// Why a file was left alone without counting as a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    MissingDateColumn,
}

#[derive(Debug)]
pub enum FileOutcome {
    Loaded {
        partitions: Vec<PartitionWrite>,
        archived_to: PathBuf,
    },
    Skipped {
        reason: SkipReason,
    },
    Failed {
        error: LoadError,
    },
}

/// What happened to one raw file.
#[derive(Debug)]
pub struct FileReport {
    pub file: PathBuf,
    pub outcome: FileOutcome,
}

impl FileReport {
    pub fn file_name(&self) -> String {
        self.file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.file.display().to_string())
    }
}

/// Summary of one loader run.
#[derive(Debug)]
pub enum LoadSummary {
    /// The raw directory does not exist.
    RawDirMissing { dir: PathBuf },
    /// The raw directory could not be listed.
    ScanFailed { dir: PathBuf, error: io::Error },
    /// No `.csv` files to load.
    Empty { dir: PathBuf },
    Processed { reports: Vec<FileReport> },
}

impl LoadSummary {
    pub fn reports(&self) -> &[FileReport] {
        match self {
            LoadSummary::Processed { reports } => reports,
            _ => &[],
        }
    }

    pub fn loaded(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Loaded { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Failed { .. }))
    }

    /// Skips are not failures; a missing or empty raw directory is not either.
    pub fn all_succeeded(&self) -> bool {
        !matches!(self, LoadSummary::ScanFailed { .. }) && self.failed() == 0
    }

    fn count(&self, pred: impl Fn(&FileOutcome) -> bool) -> usize {
        self.reports().iter().filter(|r| pred(&r.outcome)).count()
    }
}

/// `.csv` files in `dir`, sorted by file name.
pub fn scan_raw_dir(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if is_snapshot_file(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Load every raw snapshot in `config.raw_dir` into `store`.
pub fn load_raw_files(config: &PipelineConfig, store: &DatasetStore) -> LoadSummary {
    let dir = config.raw_dir.clone();
    if !dir.is_dir() {
        tracing::warn!(dir = %dir.display(), "raw directory not found, run the fetcher first");
        return LoadSummary::RawDirMissing { dir };
    }

    let files = match scan_raw_dir(&dir) {
        Ok(files) => files,
        Err(error) => {
            tracing::error!(dir = %dir.display(), %error, "could not list raw directory");
            return LoadSummary::ScanFailed { dir, error };
        }
    };

    if files.is_empty() {
        tracing::info!(dir = %dir.display(), "no CSV files to load");
        return LoadSummary::Empty { dir };
    }

    tracing::info!(
        files = files.len(),
        dataset = store.location(),
        "loading raw snapshots"
    );

    let reports = files
        .into_iter()
        .map(|file| {
            let outcome = load_file(&file, store, &config.processed_dir);
            log_outcome(&file, &outcome);
            FileReport { file, outcome }
        })
        .collect();

    LoadSummary::Processed { reports }
}

/// Run one file through the pipeline. Never panics, never propagates.
pub fn load_file(file: &Path, store: &DatasetStore, processed_dir: &Path) -> FileOutcome {
    let partitions = match read_and_write(file, store) {
        Ok(partitions) => partitions,
        Err(LoadError::Clean(CleanError::MissingDateColumn)) => {
            return FileOutcome::Skipped {
                reason: SkipReason::MissingDateColumn,
            }
        }
        Err(error) => return FileOutcome::Failed { error },
    };

    match archive_file(file, processed_dir) {
        Ok(archived_to) => FileOutcome::Loaded {
            partitions,
            archived_to,
        },
        Err(error) => FileOutcome::Failed { error },
    }
}

fn read_and_write(file: &Path, store: &DatasetStore) -> Result<Vec<PartitionWrite>, LoadError> {
    let table = read_snapshot(file)?;
    let partitions = partition_table(&table)?;

    let mut writes = Vec::with_capacity(partitions.len());
    for partition in &partitions {
        writes.push(store.write_partition(partition)?);
    }
    Ok(writes)
}

/// Move `file` into `processed_dir`, keeping its name. Rename first, copy and
/// remove when the rename cannot cross filesystems.
///
/// On error the file is left in the raw directory only.
pub fn archive_file(file: &Path, processed_dir: &Path) -> Result<PathBuf, LoadError> {
    let dest = processed_dir.join(file.file_name().unwrap_or_default());

    if let Err(source) = fs::create_dir_all(processed_dir) {
        return Err(LoadError::Archive {
            dest,
            source,
            rename: None,
        });
    }

    let rename = match fs::rename(file, &dest) {
        Ok(()) => return Ok(dest),
        Err(e) => e,
    };
    tracing::debug!(file = %file.display(), error = %rename, "rename failed, copying");

    match fs::copy(file, &dest).and_then(|_| fs::remove_file(file)) {
        Ok(()) => Ok(dest),
        Err(source) => {
            let _ = fs::remove_file(&dest);
            Err(LoadError::Archive {
                dest,
                source,
                rename: Some(rename),
            })
        }
    }
}

fn log_outcome(file: &Path, outcome: &FileOutcome) {
    let file = file.display();
    match outcome {
        FileOutcome::Loaded {
            partitions,
            archived_to,
        } => {
            let rows: usize = partitions.iter().map(|p| p.rows).sum();
            tracing::info!(
                %file,
                partitions = partitions.len(),
                rows,
                archived_to = %archived_to.display(),
                "loaded"
            );
        }
        FileOutcome::Skipped { reason } => {
            tracing::warn!(%file, ?reason, "skipped, left in raw directory");
        }
        FileOutcome::Failed { error } => {
            tracing::error!(%file, %error, "failed, left for the next run");
        }
    }
}
