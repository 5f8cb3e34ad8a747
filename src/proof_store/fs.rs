// ============================================================================
// Filesystem Proof Store
// ============================================================================
//
// One file per fingerprint: `{dir}/{hex}.ots`, holding the serialized proof.
//
// Write path:
//   1. write `{dir}/.tmp-{hex}-{uuid}` and fsync it
//   2. hard_link the temp file to the final name (fails if it exists)
//   3. remove the temp file, fsync the directory
//
// hard_link never replaces an existing file, so two concurrent writers for
// the same fingerprint resolve to exactly one winner, and readers only ever
// see complete files. The record's created_at is the file's mtime.
//
// ============================================================================

use super::{ProofStore, PutOutcome};
use async_trait::async_trait;
use blocketch_error::{StampError, StampResult};
use blocketch_types::{Fingerprint, ProofRecord};
use chrono::{DateTime, Utc};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const TEMP_PREFIX: &str = ".tmp-";

#[derive(Debug, Clone)]
pub struct FsProofStore {
    dir: PathBuf,
}

impl FsProofStore {
    /// Open (creating if needed) a store rooted at `dir`.
    ///
    /// Temp files left behind by a crash mid-write are removed; they were
    /// never published, so no record is lost.
    pub fn open(dir: impl Into<PathBuf>) -> StampResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| {
            StampError::storage(format!("cannot create proof dir {}: {}", dir.display(), e))
        })?;

        let removed = remove_stale_temp_files(&dir)?;
        if removed > 0 {
            warn!(dir = %dir.display(), removed, "Removed unpublished proof temp files");
        }

        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Final path of the record for `fingerprint`
    pub fn path_for(&self, fingerprint: &Fingerprint) -> PathBuf {
        record_path(&self.dir, fingerprint)
    }

    async fn run_blocking<T, F>(&self, task: F) -> StampResult<T>
    where
        T: Send + 'static,
        F: FnOnce(PathBuf) -> io::Result<T> + Send + 'static,
    {
        let dir = self.dir.clone();
        tokio::task::spawn_blocking(move || task(dir))
            .await
            .map_err(|e| StampError::internal(format!("storage task failed: {}", e)))?
            .map_err(StampError::from)
    }
}

#[async_trait]
impl ProofStore for FsProofStore {
    async fn put_if_absent(
        &self,
        fingerprint: &Fingerprint,
        proof: Vec<u8>,
    ) -> StampResult<PutOutcome> {
        let fingerprint = *fingerprint;
        let outcome = self
            .run_blocking(move |dir| put_blocking(&dir, &fingerprint, &proof))
            .await?;

        debug!(
            fingerprint = %fingerprint.short(),
            outcome = outcome.as_str(),
            "Proof store write"
        );
        Ok(outcome)
    }

    async fn get(&self, fingerprint: &Fingerprint) -> StampResult<Option<ProofRecord>> {
        let fingerprint = *fingerprint;
        self.run_blocking(move |dir| read_record(&record_path(&dir, &fingerprint), &fingerprint))
            .await
    }

    async fn ping(&self) -> StampResult<()> {
        self.run_blocking(|dir| {
            let marker = dir.join(format!("{}ping-{}", TEMP_PREFIX, uuid::Uuid::new_v4().simple()));
            write_synced(&marker, b"ping")?;
            fs::remove_file(&marker)
        })
        .await
    }
}

fn record_path(dir: &Path, fingerprint: &Fingerprint) -> PathBuf {
    dir.join(ProofRecord::file_name_for(fingerprint))
}

fn put_blocking(dir: &Path, fingerprint: &Fingerprint, proof: &[u8]) -> io::Result<PutOutcome> {
    put_with_sync(dir, fingerprint, proof, sync_dir)
}

/// Every Ok return happens after a successful `sync` of `dir`, so a record
/// is only reported once its directory entry is durable. This holds for
/// `Existing` too: a retry after a failed directory sync must not succeed
/// without syncing.
fn put_with_sync<F>(
    dir: &Path,
    fingerprint: &Fingerprint,
    proof: &[u8],
    sync: F,
) -> io::Result<PutOutcome>
where
    F: Fn(&Path) -> io::Result<()>,
{
    let final_path = record_path(dir, fingerprint);
    if let Some(existing) = read_record(&final_path, fingerprint)? {
        sync(dir)?;
        return Ok(PutOutcome::Existing(existing));
    }

    let tmp_path = dir.join(format!(
        "{}{}-{}",
        TEMP_PREFIX,
        fingerprint.to_hex(),
        uuid::Uuid::new_v4().simple()
    ));

    let published = write_synced(&tmp_path, proof).and_then(|_| fs::hard_link(&tmp_path, &final_path));
    // The temp name is never visible to readers; drop it whatever happened
    let _ = fs::remove_file(&tmp_path);

    match published {
        Ok(()) => {
            sync(dir)?;
            let created_at = modified_at(&final_path)?;
            Ok(PutOutcome::Created(ProofRecord {
                fingerprint: *fingerprint,
                serialized_proof: proof.to_vec(),
                created_at,
            }))
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            // Lost the race to a concurrent writer
            let existing = read_record(&final_path, fingerprint)?
                .ok_or_else(|| io::Error::other("proof record vanished after link conflict"))?;
            sync(dir)?;
            Ok(PutOutcome::Existing(existing))
        }
        Err(e) => Err(e),
    }
}

fn read_record(path: &Path, fingerprint: &Fingerprint) -> io::Result<Option<ProofRecord>> {
    let serialized_proof = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    Ok(Some(ProofRecord {
        fingerprint: *fingerprint,
        serialized_proof,
        created_at: modified_at(path)?,
    }))
}

fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

fn modified_at(path: &Path) -> io::Result<DateTime<Utc>> {
    Ok(DateTime::<Utc>::from(fs::metadata(path)?.modified()?))
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    fs::File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}

fn remove_stale_temp_files(dir: &Path) -> StampResult<usize> {
    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_name().to_string_lossy().starts_with(TEMP_PREFIX) {
            fs::remove_file(entry.path())?;
            removed += 1;
        }
    }
    Ok(removed)
}
