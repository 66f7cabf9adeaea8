use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default block size handed to one worker (20 MiB).
pub const DEFAULT_ROUTINE_SIZE: u64 = 20 * 1024 * 1024;
/// Default per-worker write-buffer cap (16 MiB).
pub const DEFAULT_DISK_CACHE: usize = 16 * 1024 * 1024;
/// Default checkpoint file suffix.
pub const DEFAULT_BREAKPOINT_EXT: &str = ".temp.rain";

/// Per-job configuration.
///
/// Every field has a working default; a `Downloader` clones its config into
/// each job it creates, and individual jobs may be tuned before `start()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Maximum parallel workers for one job.
    pub routine_count: usize,
    /// Block size in bytes when the resource is split across workers.
    pub routine_size: u64,
    /// Per-worker write-buffer cap in bytes.
    pub disk_cache: usize,
    /// Download speed limit in bytes per second; 0 disables the limiter.
    pub speed_limit: u64,
    /// Create the output directory when it is missing.
    pub create_dir: bool,
    /// Replace an existing output file on conflict.
    pub allow_overwrite: bool,
    /// Persist a checkpoint file so an interrupted job can resume.
    pub breakpoint_resume: bool,
    /// Rename to `<stem>.<k><ext>` on conflict when overwriting is off.
    pub auto_file_renaming: bool,
    /// Strip illegal characters from inferred filenames.
    pub auto_filter_filename: bool,
    /// Interval between checkpoint exports while the job runs.
    pub auto_save_interval: Duration,
    /// Wall-clock limit for the whole job; zero means no limit.
    pub timeout: Duration,
    /// Attempts per HTTP request (including the first).
    pub retry_number: u32,
    /// Pause between attempts.
    pub retry_time: Duration,
    /// Suffix appended to the output path to form the checkpoint path.
    pub breakpoint_ext: String,
    /// Skip TLS certificate verification. Off unless explicitly enabled.
    pub accept_invalid_certs: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            routine_count: 1,
            routine_size: DEFAULT_ROUTINE_SIZE,
            disk_cache: DEFAULT_DISK_CACHE,
            speed_limit: 0,
            create_dir: true,
            allow_overwrite: true,
            breakpoint_resume: true,
            auto_file_renaming: true,
            auto_filter_filename: true,
            auto_save_interval: Duration::from_secs(1),
            timeout: Duration::from_secs(10 * 60),
            retry_number: 5,
            retry_time: Duration::ZERO,
            breakpoint_ext: DEFAULT_BREAKPOINT_EXT.to_string(),
            accept_invalid_certs: false,
        }
    }
}
