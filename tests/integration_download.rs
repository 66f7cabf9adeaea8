//! End-to-end scenarios against a local range-capable HTTP server.

mod common;

use common::range_server::{self, RangeServerOptions};
use rainfall::cancel::CancelToken;
use rainfall::event::{ProgressListenerExtend, StatExtend};
use rainfall::request::Requester;
use rainfall::{DownloadError, Downloader, Status};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::tempdir;

fn body(len: usize) -> Vec<u8> {
    (1u8..=251).cycle().take(len).collect()
}

fn read(path: &std::path::Path) -> Vec<u8> {
    std::fs::read(path).unwrap()
}

#[test]
fn single_worker_download_matches() {
    common::init_logging();
    let data = body(512 * 1024);
    let url = range_server::start(data.clone());
    let dir = tempdir().unwrap();

    let mut dl = Downloader::new();
    dl.set_outdir(dir.path());
    let mut job = dl.new_job(&url);
    job.run().expect("download");

    assert_eq!(job.status(), Status::Finish);
    let outpath = job.outpath().unwrap();
    assert_eq!(read(&outpath), data);
    assert!(!job.bpfilepath().unwrap().exists());
}

#[test]
fn multi_worker_download_matches() {
    common::init_logging();
    let data = body(300_000);
    let url = range_server::start(data.clone());
    let dir = tempdir().unwrap();

    let mut dl = Downloader::new();
    dl.set_outdir(dir.path());
    dl.set_routine_count(3);
    dl.set_routine_size(64 * 1024);
    let mut job = dl.new_job(&url);
    job.run().expect("download");

    assert_eq!(job.status(), Status::Finish);
    assert_eq!(read(&job.outpath().unwrap()), data);
    // checkpoint removed on success
    assert!(!job.bpfilepath().unwrap().exists());
    assert_eq!(job.completed(), data.len() as u64);
}

#[test]
fn cancel_then_restart_resumes_to_identical_file() {
    common::init_logging();
    let data = body(256 * 1024);
    let url = range_server::start(data.clone());
    let dir = tempdir().unwrap();

    let mut dl = Downloader::new();
    dl.set_outdir(dir.path());
    dl.set_routine_count(3);
    dl.set_routine_size(64 * 1024);
    dl.set_speed_limit(64 * 1024);
    let mut job = dl.new_job(&url);

    job.start().expect("start");
    std::thread::sleep(Duration::from_millis(600));
    job.close();

    assert_eq!(job.status(), Status::Close);
    assert!(job.error().is_none(), "close is not an error");
    let outpath = job.outpath().unwrap();
    let bppath = job.bpfilepath().unwrap();
    assert!(bppath.exists(), "checkpoint persists after close");
    assert_ne!(read(&outpath), data, "file must still be partial");

    // second run of the same job completes the remainder
    job.set_speed_limit(0);
    job.run().expect("restart");
    assert_eq!(job.status(), Status::Finish);
    assert_eq!(read(&outpath), data);
    assert!(!bppath.exists(), "checkpoint removed after finish");
}

#[test]
fn restart_across_job_instances_uses_checkpoint_file() {
    common::init_logging();
    let data = body(256 * 1024);
    let url = range_server::start(data.clone());
    let dir = tempdir().unwrap();

    let mut dl = Downloader::new();
    dl.set_outdir(dir.path());
    dl.set_routine_count(2);
    dl.set_routine_size(64 * 1024);
    dl.set_speed_limit(64 * 1024);

    let mut first = dl.new_job(&url);
    first.start().expect("start");
    std::thread::sleep(Duration::from_millis(600));
    first.close();
    let outpath = first.outpath().unwrap();
    assert!(first.bpfilepath().unwrap().exists());
    drop(first);

    // a brand-new job (fresh process, conceptually) picks the checkpoint up
    dl.set_speed_limit(0);
    let mut second = dl.new_job(&url);
    second.run().expect("resumed download");
    assert_eq!(second.status(), Status::Finish);
    assert_eq!(read(&outpath), data);
    assert!(!second.bpfilepath().unwrap().exists());
}

#[test]
fn auto_rename_on_conflict() {
    common::init_logging();
    let data = body(64 * 1024);
    let url = range_server::start(data.clone());
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("data.bin"), b"").unwrap();

    let mut dl = Downloader::new();
    dl.set_outdir(dir.path());
    dl.config_mut().allow_overwrite = false;
    dl.config_mut().auto_file_renaming = true;
    let mut job = dl.new_job(&url);
    job.set_outname("data.bin");
    job.run().expect("download");

    let outpath = job.outpath().unwrap();
    assert_eq!(outpath.file_name().unwrap(), "data.1.bin");
    assert_eq!(read(&outpath), data);
    // the conflicting original is untouched
    assert_eq!(read(&dir.path().join("data.bin")), b"");
}

#[test]
fn file_exists_without_rename_or_overwrite_fails() {
    common::init_logging();
    let url = range_server::start(body(1024));
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("data.bin"), b"x").unwrap();

    let mut dl = Downloader::new();
    dl.set_outdir(dir.path());
    dl.config_mut().allow_overwrite = false;
    dl.config_mut().auto_file_renaming = false;
    let mut job = dl.new_job(&url);
    job.set_outname("data.bin");

    let err = job.start().unwrap_err();
    assert!(matches!(err, DownloadError::FileExists(_)));
    // init failure leaves the job retryable
    assert_eq!(job.status(), Status::NotStarted);
}

#[test]
fn speed_limit_hot_swap_mid_flight() {
    common::init_logging();
    let data = body(192 * 1024);
    let url = range_server::start(data.clone());
    let dir = tempdir().unwrap();

    let mut dl = Downloader::new();
    dl.set_outdir(dir.path());
    dl.set_speed_limit(1); // raised to the 32 KiB floor
    let mut job = dl.new_job(&url);
    job.start().expect("start");

    std::thread::sleep(Duration::from_millis(300));
    assert!(
        job.status().is_any(&[Status::Begin, Status::Running]),
        "crawling at the floor rate, cannot be done yet"
    );

    job.set_speed_limit(10 * 1024 * 1024);
    job.wait().expect("finish after unthrottling");
    assert_eq!(job.status(), Status::Finish);
    assert_eq!(read(&job.outpath().unwrap()), data);
}

#[test]
fn timeout_ends_in_error_with_checkpoint() {
    common::init_logging();
    let data = body(128 * 1024);
    let url = range_server::start_with_options(
        data,
        RangeServerOptions {
            data_delay: Duration::from_secs(3),
            ..RangeServerOptions::default()
        },
    );
    let dir = tempdir().unwrap();

    let mut dl = Downloader::new();
    dl.set_outdir(dir.path());
    dl.set_timeout(Duration::from_millis(500));
    let mut job = dl.new_job(&url);

    let err = job.run().unwrap_err();
    assert!(matches!(err, DownloadError::Timeout(_)), "got: {err}");
    assert!(err.to_string().starts_with("timeout:"));
    assert_eq!(job.status(), Status::Error);
    assert!(job.error().is_some());
    assert!(job.bpfilepath().unwrap().exists());
}

#[test]
fn server_without_ranges_downloads_single_stream() {
    common::init_logging();
    let data = body(96 * 1024);
    let url = range_server::start_with_options(
        data.clone(),
        RangeServerOptions {
            support_ranges: false,
            advertise_ranges: false,
            ..RangeServerOptions::default()
        },
    );
    let dir = tempdir().unwrap();

    let mut dl = Downloader::new();
    dl.set_outdir(dir.path());
    dl.set_routine_count(3); // must collapse to one worker
    let mut job = dl.new_job(&url);
    job.run().expect("download");

    assert_eq!(job.status(), Status::Finish);
    assert_eq!(read(&job.outpath().unwrap()), data);
    assert!(
        !job.bpfilepath().unwrap().exists(),
        "no checkpoint without range support"
    );
}

#[test]
fn probe_reports_resource_metadata() {
    common::init_logging();
    let data = body(500_000);
    let url = range_server::start(data);

    let requester = Requester::new(&url);
    let info = requester
        .probe(&CancelToken::new(Duration::ZERO))
        .expect("probe");
    assert_eq!(info.filesize, 500_000);
    assert!(info.multithread);
    assert_eq!(info.etag, "it-test-etag");
}

#[test]
fn content_disposition_names_the_output() {
    common::init_logging();
    let data = body(32 * 1024);
    let url = range_server::start_with_options(
        data.clone(),
        RangeServerOptions {
            content_disposition: "attachment; filename=\"named.bin\"".to_string(),
            ..RangeServerOptions::default()
        },
    );
    let dir = tempdir().unwrap();

    let mut dl = Downloader::new();
    dl.set_outdir(dir.path());
    let mut job = dl.new_job(&url);
    job.run().expect("download");

    let outpath = job.outpath().unwrap();
    assert_eq!(outpath.file_name().unwrap(), "named.bin");
    assert_eq!(read(&outpath), data);
}

#[derive(Default)]
struct RecordingListener {
    events: Arc<Mutex<Vec<(String, u32)>>>,
}

impl ProgressListenerExtend for RecordingListener {
    fn change(&mut self, stat: &StatExtend) {
        self.events
            .lock()
            .unwrap()
            .push(("change".into(), stat.stat.progress));
    }
    fn close(&mut self, stat: &StatExtend) {
        self.events
            .lock()
            .unwrap()
            .push(("close".into(), stat.stat.progress));
    }
    fn error(&mut self, stat: &StatExtend) {
        self.events
            .lock()
            .unwrap()
            .push(("error".into(), stat.stat.progress));
    }
    fn finish(&mut self, stat: &StatExtend) {
        self.events
            .lock()
            .unwrap()
            .push(("finish".into(), stat.stat.progress));
    }
}

#[test]
fn listeners_observe_lifecycle() {
    common::init_logging();
    let data = body(64 * 1024);
    let url = range_server::start(data);
    let dir = tempdir().unwrap();

    let mut dl = Downloader::new();
    dl.set_outdir(dir.path());
    let mut job = dl.new_job(&url);
    let events = Arc::new(Mutex::new(Vec::new()));
    job.on_progress_extend(Box::new(RecordingListener {
        events: Arc::clone(&events),
    }));
    job.run().expect("download");

    let events = events.lock().unwrap();
    let (last_kind, last_progress) = events.last().expect("at least the terminal event");
    assert_eq!(last_kind, "finish");
    assert_eq!(*last_progress, 100);
    // progress never decreases
    let progresses: Vec<u32> = events.iter().map(|(_, p)| *p).collect();
    assert!(progresses.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn start_twice_is_an_invalid_state() {
    common::init_logging();
    let data = body(512 * 1024);
    let url = range_server::start(data);
    let dir = tempdir().unwrap();

    let mut dl = Downloader::new();
    dl.set_outdir(dir.path());
    dl.set_speed_limit(64 * 1024); // keep it running long enough
    let mut job = dl.new_job(&url);
    job.start().expect("start");

    let err = job.start().unwrap_err();
    assert!(matches!(err, DownloadError::InvalidState(_)));
    job.close();
}

#[test]
fn finished_job_cannot_be_restarted() {
    common::init_logging();
    let data = body(8 * 1024);
    let url = range_server::start(data);
    let dir = tempdir().unwrap();

    let mut dl = Downloader::new();
    dl.set_outdir(dir.path());
    let mut job = dl.new_job(&url);
    job.run().expect("download");
    assert_eq!(job.status(), Status::Finish);

    let err = job.start().unwrap_err();
    assert!(matches!(err, DownloadError::InvalidState(Status::Finish)));
}
