//! Resumable multi-worker HTTP file downloader.
//!
//! One [`Job`] downloads one URI: the resource is probed for size and range
//! support, partitioned into blocks, and streamed by parallel workers to the
//! destination file at exact offsets. A JSON checkpoint next to the output
//! lets an interrupted job resume across process restarts; a shared token
//! bucket caps throughput and can be swapped mid-flight; listeners observe
//! progress, speed and lifecycle events.

pub mod bar;
pub mod block;
pub mod breakpoint;
pub mod cancel;
pub mod config;
pub mod downloader;
pub mod error;
pub mod event;
pub mod filename;
pub mod job;
pub mod limiter;
pub mod request;
pub mod resource;
pub mod sink;
pub mod status;
pub mod util;

pub use bar::Bar;
pub use config::Config;
pub use downloader::Downloader;
pub use error::DownloadError;
pub use event::{ProgressListener, ProgressListenerExtend, Stat, StatExtend};
pub use job::Job;
pub use request::ReplayBody;
pub use resource::ResourceInfo;
pub use status::Status;
