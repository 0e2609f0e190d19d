//! Single-slot record of the job that is currently active.
//!
//! The poll loop re-reads the slot on every tick; whoever empties or
//! overwrites the slot cancels the loop watching the old id. Writes are
//! last-write-wins and there is no history.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use easel_core::JobId;
use easel_logging::{easel_debug, easel_warn};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::ChannelError;

/// Durable backing for the slot.
pub trait SlotStore: Send + Sync {
    fn load(&self) -> Result<Option<JobId>, ChannelError>;
    fn store(&self, job: Option<&JobId>) -> Result<(), ChannelError>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct SlotRecord {
    job_id: Option<JobId>,
    updated_at: Option<DateTime<Utc>>,
}

/// Slot kept in a small RON file, replaced atomically on every write so a
/// concurrent reader sees either the old or the new record.
#[derive(Debug, Clone)]
pub struct FileSlotStore {
    path: PathBuf,
}

impl FileSlotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn dir(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }
}

impl SlotStore for FileSlotStore {
    fn load(&self) -> Result<Option<JobId>, ChannelError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&self.path)?;
        if text.trim().is_empty() {
            return Ok(None);
        }
        let record: SlotRecord =
            ron::from_str(&text).map_err(|err| ChannelError::Corrupt(err.to_string()))?;
        Ok(record.job_id)
    }

    fn store(&self, job: Option<&JobId>) -> Result<(), ChannelError> {
        let record = SlotRecord {
            job_id: job.cloned(),
            updated_at: Some(Utc::now()),
        };
        let text = ron::ser::to_string_pretty(&record, ron::ser::PrettyConfig::default())
            .map_err(|err| ChannelError::Encode(err.to_string()))?;

        let dir = self.dir();
        fs::create_dir_all(dir)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(text.as_bytes())?;
        tmp.flush()?;
        tmp.as_file_mut().sync_all()?;
        tmp.persist(&self.path).map_err(|err| ChannelError::Io(err.error))?;
        Ok(())
    }
}

/// Volatile slot, for tests and single-process use.
#[derive(Debug, Default)]
pub struct MemorySlotStore {
    slot: Mutex<Option<JobId>>,
}

impl MemorySlotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SlotStore for MemorySlotStore {
    fn load(&self) -> Result<Option<JobId>, ChannelError> {
        Ok(lock(&self.slot).clone())
    }

    fn store(&self, job: Option<&JobId>) -> Result<(), ChannelError> {
        *lock(&self.slot) = job.cloned();
        Ok(())
    }
}

/// The slot plus an in-memory mirror.
///
/// When the durable store fails the channel turns degraded and serves the
/// mirror, so cancellation keeps working inside this process.
pub struct CancellationChannel {
    store: Arc<dyn SlotStore>,
    mirror: Mutex<Option<JobId>>,
    degraded: AtomicBool,
}

impl CancellationChannel {
    pub fn new(store: Arc<dyn SlotStore>) -> Self {
        Self {
            store,
            mirror: Mutex::new(None),
            degraded: AtomicBool::new(false),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemorySlotStore::new()))
    }

    /// Track `job` as the active job, superseding whatever was tracked.
    ///
    /// The in-memory mirror is always updated; an error means only the
    /// durable write failed.
    pub fn record_job(&self, job: &JobId) -> Result<(), ChannelError> {
        *lock(&self.mirror) = Some(job.clone());
        self.write_through(Some(job))
    }

    pub fn clear(&self) {
        *lock(&self.mirror) = None;
        if let Err(err) = self.write_through(None) {
            easel_warn!("failed to clear durable job slot: {}", err);
        }
    }

    /// Clear only while the slot still tracks `job`. Returns whether it did.
    pub fn clear_if(&self, job: &JobId) -> bool {
        if self.is_current_job(job) {
            self.clear();
            true
        } else {
            false
        }
    }

    pub fn current_job(&self) -> Option<JobId> {
        if self.is_degraded() {
            return lock(&self.mirror).clone();
        }
        match self.store.load() {
            Ok(job) => {
                *lock(&self.mirror) = job.clone();
                job
            }
            Err(err) => {
                easel_warn!("failed to read durable job slot, using in-memory copy: {}", err);
                lock(&self.mirror).clone()
            }
        }
    }

    pub fn is_current_job(&self, job: &JobId) -> bool {
        self.current_job().as_ref() == Some(job)
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Acquire)
    }

    fn write_through(&self, job: Option<&JobId>) -> Result<(), ChannelError> {
        match self.store.store(job) {
            Ok(()) => {
                if self.degraded.swap(false, Ordering::AcqRel) {
                    easel_debug!("durable job slot writable again");
                }
                Ok(())
            }
            Err(err) => {
                self.degraded.store(true, Ordering::Release);
                Err(err)
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
