//! One download job: state machine, public operations, shared run state.

mod init;
mod task;
mod worker;

use crate::breakpoint::Breakpoint;
use crate::cancel::CancelToken;
use crate::config::Config;
use crate::error::{DownloadError, Result};
use crate::event::{ProgressListener, ProgressListenerExtend, Reporter, Snapshot};
use crate::limiter::SpeedLimiter;
use crate::request::{ReplayBody, Requester};
use crate::status::Status;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicU64;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;

/// One active download of one URI.
///
/// A job owns its checkpoint, destination file handle and worker pool. It is
/// created idle (`NotStarted`), driven by [`start`](Job::start) /
/// [`run`](Job::run), observed through listeners, and may be restarted after
/// `Close` or `Error`.
pub struct Job {
    pub(crate) config: Config,
    pub(crate) requester: Requester,
    pub(crate) outdir: PathBuf,
    pub(crate) outname: Option<String>,
    pub(crate) perm: u32,

    pub(crate) shared: Arc<Shared>,
    pub(crate) plan: Option<Arc<Plan>>,
    run: Option<RunHandle>,
    done_rx: Option<mpsc::Receiver<Option<DownloadError>>>,
}

/// State shared between the job handle, workers and the ticker.
pub(crate) struct Shared {
    state: Mutex<StateCell>,
    pub(crate) completed: AtomicU64,
    pub(crate) limiter: SpeedLimiter,
    pub(crate) reporter: Mutex<Reporter>,
}

struct StateCell {
    status: Status,
    error: Option<DownloadError>,
}

/// Everything Init resolves; survives across restarts of the same job.
pub(crate) struct Plan {
    pub(crate) total_size: u64,
    pub(crate) multithread: bool,
    pub(crate) resume: bool,
    pub(crate) outpath: PathBuf,
    pub(crate) bpfilepath: PathBuf,
    pub(crate) breakpoint: Breakpoint,
}

struct RunHandle {
    cancel: Arc<CancelToken>,
    join: thread::JoinHandle<()>,
}

impl Shared {
    fn new() -> Self {
        Shared {
            state: Mutex::new(StateCell {
                status: Status::NotStarted,
                error: None,
            }),
            completed: AtomicU64::new(0),
            limiter: SpeedLimiter::default(),
            reporter: Mutex::new(Reporter::new()),
        }
    }

    pub(crate) fn status(&self) -> Status {
        self.state.lock().unwrap().status
    }

    pub(crate) fn set_status(&self, status: Status) {
        self.state.lock().unwrap().status = status;
    }

    pub(crate) fn error(&self) -> Option<DownloadError> {
        self.state.lock().unwrap().error.clone()
    }

    pub(crate) fn set_error(&self, error: Option<DownloadError>) {
        self.state.lock().unwrap().error = error;
    }

    /// Atomically latch the terminal state and its error.
    pub(crate) fn set_terminal(&self, status: Status, error: Option<DownloadError>) {
        let mut cell = self.state.lock().unwrap();
        cell.status = status;
        cell.error = error;
    }

    pub(crate) fn snapshot(&self, total: u64, outpath: &Path) -> Snapshot {
        let cell = self.state.lock().unwrap();
        Snapshot {
            status: cell.status,
            total,
            completed: self.completed.load(std::sync::atomic::Ordering::Relaxed),
            outpath: outpath.to_path_buf(),
            error: cell.error.clone(),
        }
    }
}

impl Job {
    /// New job for `uri` with default configuration, writing to the current
    /// directory. Most callers go through a
    /// [`Downloader`](crate::Downloader) instead.
    pub fn new(uri: impl Into<String>) -> Self {
        Job {
            config: Config::default(),
            requester: Requester::new(uri),
            outdir: PathBuf::from("."),
            outname: None,
            perm: 0o600,
            shared: Arc::new(Shared::new()),
            plan: None,
            run: None,
            done_rx: None,
        }
    }

    /// Job built from a downloader's defaults; the requester already
    /// carries the URI and request shape.
    pub(crate) fn with_defaults(
        config: Config,
        requester: Requester,
        outdir: PathBuf,
        perm: u32,
    ) -> Self {
        Job {
            config,
            requester,
            outdir,
            outname: None,
            perm,
            shared: Arc::new(Shared::new()),
            plan: None,
            run: None,
            done_rx: None,
        }
    }

    // -- configuration (effective before start) --------------------------

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    pub fn set_outdir(&mut self, dir: impl Into<PathBuf>) {
        self.outdir = dir.into();
    }

    pub fn set_outname(&mut self, name: impl Into<String>) {
        self.outname = Some(name.into());
    }

    /// Unix permission bits for created files.
    pub fn set_perm(&mut self, perm: u32) {
        self.perm = perm;
    }

    pub fn set_method(&mut self, method: impl Into<String>) {
        self.requester.set_method(method);
    }

    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.requester.set_header(name, value);
    }

    pub fn replace_headers(&mut self, headers: Vec<(String, String)>) {
        self.requester.replace_headers(headers);
    }

    pub fn set_body(&mut self, body: Option<ReplayBody>) {
        self.requester.set_body(body);
    }

    /// Register a basic progress listener.
    pub fn on_progress(&self, listener: Box<dyn ProgressListener>) {
        self.shared.reporter.lock().unwrap().add_listener(listener);
    }

    /// Register an extended progress listener (speed, ETA, lifecycle).
    pub fn on_progress_extend(&self, listener: Box<dyn ProgressListenerExtend>) {
        self.shared.reporter.lock().unwrap().add_extend(listener);
    }

    /// Attach the stock terminal progress bar.
    pub fn with_bar(&self) {
        self.on_progress_extend(Box::new(crate::bar::Bar::new()));
    }

    // -- operations ------------------------------------------------------

    /// Begin (or restart) the download without blocking.
    ///
    /// Fails immediately with [`DownloadError::InvalidState`] when invoked
    /// while the job runs or after `Finish`, or with the init error when
    /// probing/opening fails — in which case the job returns to
    /// `NotStarted` and may be started again.
    pub fn start(&mut self) -> Result<()> {
        let before = self.status();
        if !before.restartable() {
            return Err(DownloadError::InvalidState(before));
        }
        self.shared.set_status(Status::Begin);
        self.shared.set_error(None);

        self.requester
            .set_retry(self.config.retry_number, self.config.retry_time);
        self.requester
            .set_accept_invalid_certs(self.config.accept_invalid_certs);

        let cancel = Arc::new(CancelToken::new(self.config.timeout));

        let reuse = before != Status::NotStarted && self.plan.is_some();
        let outfile = if reuse {
            // The in-memory breakpoint is authoritative on restart: no new
            // probe, no conflict handling, just a fresh handle and deadline.
            let plan = self.plan.as_ref().unwrap();
            match init::open_output(&plan.outpath, self.perm) {
                Ok(f) => f,
                Err(e) => {
                    self.shared.set_status(Status::NotStarted);
                    return Err(e);
                }
            }
        } else {
            match init::run(self, &cancel) {
                Ok((plan, file)) => {
                    self.plan = Some(Arc::new(plan));
                    file
                }
                Err(e) => {
                    self.shared.set_status(Status::NotStarted);
                    return Err(e);
                }
            }
        };

        let (done_tx, done_rx) = mpsc::sync_channel(1);
        self.done_rx = Some(done_rx);

        let ctx = task::RunCtx {
            shared: Arc::clone(&self.shared),
            plan: Arc::clone(self.plan.as_ref().unwrap()),
            cancel: Arc::clone(&cancel),
            requester: self.requester.clone(),
            config: self.config.clone(),
            outfile: Arc::new(outfile),
            perm: self.perm,
            done: done_tx,
        };
        let join = thread::Builder::new()
            .name("rainfall-job".to_string())
            .spawn(move || task::run(ctx))
            .map_err(DownloadError::from)?;
        self.run = Some(RunHandle { cancel, join });
        Ok(())
    }

    /// Start and block until the job terminates.
    pub fn run(&mut self) -> Result<()> {
        self.start()?;
        self.wait()
    }

    /// Block until the running job delivers its completion signal. `Ok` on
    /// `Finish` and on `Close`; otherwise the terminal error.
    pub fn wait(&mut self) -> Result<()> {
        if let Some(rx) = self.done_rx.take() {
            let outcome = match rx.recv() {
                Ok(outcome) => outcome,
                // orchestrator died without a signal; fall back to the latch
                Err(_) => self.error(),
            };
            if let Some(run) = self.run.take() {
                let _ = run.join.join();
            }
            return match outcome {
                Some(e) => Err(e),
                None => Ok(()),
            };
        }
        match self.error() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Request cancellation and block until the run has drained. After a
    /// plain close the state is `Close` and `error()` is empty.
    pub fn close(&mut self) {
        let Some(run) = self.run.take() else {
            return;
        };
        {
            let mut cell = self.shared.state.lock().unwrap();
            if cell.status.is_any(&[Status::Begin, Status::Running]) {
                cell.status = Status::Close;
            }
        }
        run.cancel.cancel();
        let _ = run.join.join();
    }

    /// Hot-swap the shared rate limiter; 0 disables limiting. Takes effect
    /// for every wait that follows.
    pub fn set_speed_limit(&self, bytes_per_sec: u64) {
        self.shared.limiter.set(bytes_per_sec);
    }

    /// Last terminal error; empty after `Finish` or a plain `Close`.
    pub fn error(&self) -> Option<DownloadError> {
        self.shared.error()
    }

    /// Absolute destination path. Known once init has run.
    pub fn outpath(&self) -> Option<PathBuf> {
        self.plan.as_ref().map(|p| p.outpath.clone())
    }

    /// Checkpoint file path. Known once init has run.
    pub fn bpfilepath(&self) -> Option<PathBuf> {
        self.plan.as_ref().map(|p| p.bpfilepath.clone())
    }

    pub fn status(&self) -> Status {
        self.shared.status()
    }

    /// Bytes downloaded so far.
    pub fn completed(&self) -> u64 {
        self.shared
            .completed
            .load(std::sync::atomic::Ordering::Relaxed)
    }

    /// Declared resource size; 0 before init or when unknown.
    pub fn total(&self) -> u64 {
        self.plan.as_ref().map(|p| p.total_size).unwrap_or(0)
    }
}

impl Drop for Job {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_job_state() {
        let job = Job::new("http://example.com/f.bin");
        assert_eq!(job.status(), Status::NotStarted);
        assert!(job.error().is_none());
        assert!(job.outpath().is_none());
        assert_eq!(job.total(), 0);
        assert_eq!(job.completed(), 0);
    }

    #[test]
    fn wait_without_start_reflects_state() {
        let mut job = Job::new("http://example.com/f.bin");
        assert!(job.wait().is_ok());
        job.shared
            .set_terminal(Status::Error, Some(DownloadError::Http(500)));
        assert!(matches!(job.wait(), Err(DownloadError::Http(500))));
    }

    #[test]
    fn close_before_start_is_a_noop() {
        let mut job = Job::new("http://example.com/f.bin");
        job.close();
        assert_eq!(job.status(), Status::NotStarted);
    }
}
