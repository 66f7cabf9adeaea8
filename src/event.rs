//! Progress events: snapshots, listener traits and the sampling reporter.

use crate::error::DownloadError;
use crate::status::Status;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Duration;

/// Snapshot handed to basic listeners.
#[derive(Debug, Clone)]
pub struct Stat {
    pub status: Status,
    /// Declared resource size; 0 when unknown.
    pub total_length: u64,
    pub completed_length: u64,
    /// Whole percent in 0..=100; 0 while the total is unknown.
    pub progress: u32,
    pub outpath: PathBuf,
    pub error: Option<DownloadError>,
}

/// Snapshot handed to extended listeners: adds rate and ETA.
#[derive(Debug, Clone)]
pub struct StatExtend {
    pub stat: Stat,
    /// Bytes moved across the last five samples. Samples are 200 ms apart,
    /// so this is bytes in the last second.
    pub download_speed: u64,
    /// Remaining bytes at the current speed; zero while the speed is zero.
    pub estimated_time: Duration,
}

/// Basic progress consumer: one callback per sample.
pub trait ProgressListener: Send {
    fn change(&mut self, stat: &Stat);
}

/// Extended progress consumer with distinct lifecycle callbacks.
pub trait ProgressListenerExtend: Send {
    fn change(&mut self, stat: &StatExtend);
    fn close(&mut self, stat: &StatExtend);
    fn error(&mut self, stat: &StatExtend);
    fn finish(&mut self, stat: &StatExtend);
}

/// Inputs for one sample, read off the running job.
#[derive(Debug, Clone)]
pub(crate) struct Snapshot {
    pub status: Status,
    pub total: u64,
    pub completed: u64,
    pub outpath: PathBuf,
    pub error: Option<DownloadError>,
}

/// Samples the job counters and fans snapshots out to every listener.
///
/// Keeps the last five per-sample deltas; their sum is the reported speed.
pub(crate) struct Reporter {
    listeners: Vec<Box<dyn ProgressListener>>,
    extends: Vec<Box<dyn ProgressListenerExtend>>,
    ring: VecDeque<u64>,
    prev_completed: Option<u64>,
}

impl Reporter {
    pub fn new() -> Self {
        Reporter {
            listeners: Vec::new(),
            extends: Vec::new(),
            ring: VecDeque::with_capacity(5),
            prev_completed: None,
        }
    }

    pub fn add_listener(&mut self, l: Box<dyn ProgressListener>) {
        self.listeners.push(l);
    }

    pub fn add_extend(&mut self, l: Box<dyn ProgressListenerExtend>) {
        self.extends.push(l);
    }

    pub fn has_listeners(&self) -> bool {
        !self.listeners.is_empty() || !self.extends.is_empty()
    }

    /// Periodic sample: dispatch a change to everyone.
    pub fn tick(&mut self, snap: Snapshot) {
        let stat = self.measure(snap);
        for l in &mut self.listeners {
            l.change(&stat.stat);
        }
        for l in &mut self.extends {
            l.change(&stat);
        }
    }

    /// Final sample: dispatched once, synchronously, when the job ends.
    pub fn terminal(&mut self, snap: Snapshot) {
        let status = snap.status;
        let stat = self.measure(snap);
        for l in &mut self.listeners {
            l.change(&stat.stat);
        }
        for l in &mut self.extends {
            match status {
                Status::Close => l.close(&stat),
                Status::Error => l.error(&stat),
                Status::Finish => l.finish(&stat),
                _ => l.change(&stat),
            }
        }
    }

    fn measure(&mut self, snap: Snapshot) -> StatExtend {
        let delta = snap
            .completed
            .saturating_sub(self.prev_completed.unwrap_or(snap.completed));
        self.prev_completed = Some(snap.completed);
        if self.ring.len() == 5 {
            self.ring.pop_front();
        }
        self.ring.push_back(delta);
        let speed: u64 = self.ring.iter().sum();

        let remaining = snap.total.saturating_sub(snap.completed);
        let estimated_time = if speed > 0 && remaining > 0 {
            Duration::from_secs(remaining / speed)
        } else {
            Duration::ZERO
        };
        let progress = if snap.total > 0 {
            ((snap.completed * 100 / snap.total) as u32).min(100)
        } else {
            0
        };

        StatExtend {
            stat: Stat {
                status: snap.status,
                total_length: snap.total,
                completed_length: snap.completed,
                progress,
                outpath: snap.outpath,
                error: snap.error,
            },
            download_speed: speed,
            estimated_time,
        }
    }
}
