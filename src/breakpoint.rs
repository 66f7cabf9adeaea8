//! Persistent checkpoint enabling resume across process restarts.
//!
//! One JSON file per job, stored next to the output file:
//! `{"filesize": .., "etag": .., "position": .., "tasks": [{"start", "end"}]}`.
//! `filesize` + `etag` define resource identity; a checkpoint from a changed
//! resource is discarded. `position` is the first byte no block has been
//! carved out for yet.

use crate::block::Block;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// In-memory checkpoint for one job.
///
/// The task list is mutex-guarded because the partitioner appends while
/// workers advance individual block cursors and the ticker exports.
#[derive(Debug)]
pub struct Breakpoint {
    filesize: u64,
    etag: String,
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    position: u64,
    tasks: Vec<Arc<Block>>,
}

/// Serialized form of the checkpoint file.
#[derive(Debug, Serialize, Deserialize)]
struct BreakpointRecord {
    filesize: u64,
    etag: String,
    position: u64,
    tasks: Vec<TaskRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TaskRecord {
    start: u64,
    end: u64,
}

impl Breakpoint {
    /// Fresh checkpoint seeded with the probed resource identity.
    pub fn new(filesize: u64, etag: impl Into<String>) -> Self {
        Breakpoint {
            filesize,
            etag: etag.into(),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Parse a checkpoint file. Every loaded task counts as started: it was
    /// dispatched in the run that wrote the file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read(path)?;
        let record: BreakpointRecord =
            serde_json::from_slice(&data).map_err(|e| std::io::Error::from(e))?;
        let tasks = record
            .tasks
            .iter()
            .map(|t| {
                let b = Arc::new(Block::new(t.start, t.end));
                b.mark_started();
                b
            })
            .collect();
        Ok(Breakpoint {
            filesize: record.filesize,
            etag: record.etag,
            inner: Mutex::new(Inner {
                position: record.position,
                tasks,
            }),
        })
    }

    pub fn filesize(&self) -> u64 {
        self.filesize
    }

    pub fn etag(&self) -> &str {
        &self.etag
    }

    /// Same resource: declared size and ETag both equal.
    pub fn compatible_with(&self, other: &Breakpoint) -> bool {
        self.filesize == other.filesize && self.etag == other.etag
    }

    /// First byte not yet covered by any task.
    pub fn position(&self) -> u64 {
        self.inner.lock().unwrap().position
    }

    pub fn set_position(&self, position: u64) {
        self.inner.lock().unwrap().position = position;
    }

    /// Append a freshly partitioned task.
    pub fn push_task(&self, task: Arc<Block>) {
        self.inner.lock().unwrap().tasks.push(task);
    }

    /// Snapshot of the current task list.
    pub fn tasks(&self) -> Vec<Arc<Block>> {
        self.inner.lock().unwrap().tasks.clone()
    }

    /// Take over position and tasks from a checkpoint loaded off disk.
    pub fn adopt(&self, loaded: Breakpoint) {
        let loaded = loaded.inner.into_inner().unwrap();
        let mut inner = self.inner.lock().unwrap();
        inner.position = loaded.position;
        inner.tasks = loaded.tasks;
    }

    /// Bytes already on disk: the partitioned prefix minus what the
    /// unfinished tasks still owe.
    pub fn completed_size(&self) -> u64 {
        let inner = self.inner.lock().unwrap();
        let owed: u64 = inner.tasks.iter().map(|t| t.uncompleted()).sum();
        inner.position.saturating_sub(owed)
    }

    /// Write the checkpoint file: truncate, write, fsync.
    ///
    /// Finished tasks and tasks never handed to a worker are omitted.
    /// Dispatch is in task order, so the never-started tasks form a suffix;
    /// the exported position stops at the first of them, returning their
    /// range to the un-partitioned zone a resumed job carves up again. With
    /// every task dispatched, position is the end of the partitioned region.
    /// Nothing is written while the task list is empty.
    pub fn export(&self, path: &Path, perm: u32) -> Result<()> {
        let record = {
            let inner = self.inner.lock().unwrap();
            let Some(last) = inner.tasks.last() else {
                return Ok(());
            };
            let position = inner
                .tasks
                .iter()
                .find(|t| !t.is_started())
                .map(|t| t.start())
                .unwrap_or(last.end() + 1);
            BreakpointRecord {
                filesize: self.filesize,
                etag: self.etag.clone(),
                position,
                tasks: inner
                    .tasks
                    .iter()
                    .filter(|t| t.is_started() && !t.is_finished())
                    .map(|t| TaskRecord {
                        start: t.start(),
                        end: t.end(),
                    })
                    .collect(),
            }
        };
        let data = serde_json::to_vec(&record).map_err(std::io::Error::from)?;
        let mut opts = fs::OpenOptions::new();
        opts.create(true).write(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            opts.mode(perm);
        }
        #[cfg(not(unix))]
        let _ = perm;
        use std::io::Write;
        let mut file = opts.open(path)?;
        file.write_all(&data)?;
        file.sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(start: u64, end: u64, started: bool) -> Arc<Block> {
        let b = Arc::new(Block::new(start, end));
        if started {
            b.mark_started();
        }
        b
    }

    #[test]
    fn completed_size_subtracts_unfinished() {
        let bp = Breakpoint::new(100, "x");
        bp.set_position(100);
        let a = block(0, 49, true);
        a.advance(50); // finished
        let b = block(50, 99, true);
        b.advance(10); // 40 still owed
        bp.push_task(a);
        bp.push_task(b);
        assert_eq!(bp.completed_size(), 60);
    }

    #[test]
    fn compatibility_needs_both_fields() {
        let a = Breakpoint::new(10, "e1");
        assert!(a.compatible_with(&Breakpoint::new(10, "e1")));
        assert!(!a.compatible_with(&Breakpoint::new(10, "e2")));
        assert!(!a.compatible_with(&Breakpoint::new(11, "e1")));
    }

    #[test]
    fn export_then_load_drops_finished_and_unstarted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin.temp.rain");

        let bp = Breakpoint::new(300, "etag-1");
        bp.set_position(300);
        let done = block(0, 99, true);
        done.advance(100);
        let partial = block(100, 199, true);
        partial.advance(25);
        let untouched = block(200, 299, false);
        bp.push_task(done);
        bp.push_task(partial);
        bp.push_task(untouched);

        bp.export(&path, 0o600).unwrap();
        let loaded = Breakpoint::load(&path).unwrap();

        assert_eq!(loaded.filesize(), 300);
        assert_eq!(loaded.etag(), "etag-1");
        // position falls back to the first never-dispatched task, so its
        // range is re-partitioned on resume instead of assumed complete
        assert_eq!(loaded.position(), 200);
        let tasks = loaded.tasks();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].start(), 125);
        assert_eq!(tasks[0].end(), 199);
        assert!(tasks[0].is_started());
        // bytes on disk: finished 0-99 plus 25 of the partial task
        assert_eq!(loaded.completed_size(), 125);
    }

    #[test]
    fn export_with_all_tasks_dispatched_keeps_full_position() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("full.temp.rain");
        let bp = Breakpoint::new(200, "e");
        bp.set_position(200);
        bp.push_task(block(0, 99, true));
        bp.push_task(block(100, 199, true));
        bp.export(&path, 0o600).unwrap();
        let loaded = Breakpoint::load(&path).unwrap();
        assert_eq!(loaded.position(), 200);
        assert_eq!(loaded.tasks().len(), 2);
    }

    #[test]
    fn export_without_tasks_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.temp.rain");
        let bp = Breakpoint::new(10, "e");
        bp.export(&path, 0o600).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn load_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.temp.rain");
        fs::write(&path, b"not json").unwrap();
        assert!(Breakpoint::load(&path).is_err());
    }
}
