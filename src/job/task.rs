//! Task orchestration: block partitioning, dispatch, ticker, finish.

use super::worker::Worker;
use super::{Plan, Shared};
use crate::block::Block;
use crate::breakpoint::Breakpoint;
use crate::cancel::CancelToken;
use crate::config::Config;
use crate::error::DownloadError;
use crate::request::Requester;
use crate::status::Status;
use crate::util::file_exists;
use std::fs::File;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Sampling period of the progress ticker.
const TICK: Duration = Duration::from_millis(200);

/// Pause between dispatch attempts while every worker is busy.
const DISPATCH_SLICE: Duration = Duration::from_millis(10);

/// Everything one run of the orchestrator needs.
pub(super) struct RunCtx {
    pub shared: Arc<Shared>,
    pub plan: Arc<Plan>,
    pub cancel: Arc<CancelToken>,
    pub requester: Requester,
    pub config: Config,
    pub outfile: Arc<File>,
    pub perm: u32,
    pub done: mpsc::SyncSender<Option<DownloadError>>,
}

/// Orchestrator body, run on its own thread by `Job::start`.
pub(super) fn run(ctx: RunCtx) {
    ctx.shared.set_status(Status::Running);

    let blocks = load_blocks(&ctx);
    let pending = blocks.iter().filter(|b| !b.is_finished()).count();
    if pending == 0 {
        finish(&ctx, None);
        return;
    }
    let thread_count = ctx.config.routine_count.max(1).min(pending);

    let (task_tx, task_rx) = mpsc::sync_channel::<Arc<Block>>(0);
    let task_rx = Arc::new(Mutex::new(task_rx));
    let (result_tx, result_rx) = mpsc::channel::<Option<DownloadError>>();

    let mut handles = Vec::with_capacity(thread_count);
    for id in 0..thread_count {
        let worker = Worker {
            id,
            requester: ctx.requester.clone(),
            file: Arc::clone(&ctx.outfile),
            shared: Arc::clone(&ctx.shared),
            cancel: Arc::clone(&ctx.cancel),
            disk_cache: ctx.config.disk_cache,
            total_size: ctx.plan.total_size,
            multithread: ctx.plan.multithread,
        };
        let rx = Arc::clone(&task_rx);
        let tx = result_tx.clone();
        handles.push(thread::spawn(move || {
            let _ = tx.send(worker.run(rx));
        }));
    }
    drop(result_tx);

    let ticker = spawn_ticker(&ctx);

    // Hand blocks to workers over the rendezvous channel; a block counts as
    // started only once a worker accepted it.
    'dispatch: for block in &blocks {
        if block.is_finished() {
            continue;
        }
        loop {
            if ctx.cancel.is_cancelled() {
                break 'dispatch;
            }
            match task_tx.try_send(Arc::clone(block)) {
                Ok(()) => {
                    block.mark_started();
                    continue 'dispatch;
                }
                Err(TrySendError::Full(_)) => thread::sleep(DISPATCH_SLICE),
                Err(TrySendError::Disconnected(_)) => break 'dispatch,
            }
        }
    }
    drop(task_tx);

    // One result per worker; the first real error wins, a bare cancellation
    // only counts when nothing else went wrong.
    let mut first_err: Option<DownloadError> = None;
    for outcome in result_rx.iter() {
        if let Some(e) = outcome {
            match &first_err {
                None => first_err = Some(e),
                Some(cur) if cur.is_cancelled() && !e.is_cancelled() => first_err = Some(e),
                _ => {}
            }
        }
    }
    for handle in handles {
        let _ = handle.join();
    }
    ticker.stop();

    finish(&ctx, first_err);
}

/// Build the block list: adopt a compatible on-disk checkpoint on a fresh
/// run, then partition the un-carved remainder. Unfinished checkpoint tasks
/// sit ahead of freshly partitioned ones.
fn load_blocks(ctx: &RunCtx) -> Vec<Arc<Block>> {
    let bp = &ctx.plan.breakpoint;
    let fresh = bp.tasks().is_empty();
    if ctx.plan.resume && fresh && file_exists(&ctx.plan.bpfilepath) {
        match Breakpoint::load(&ctx.plan.bpfilepath) {
            Ok(loaded) if bp.compatible_with(&loaded) => {
                let completed = loaded.completed_size();
                bp.adopt(loaded);
                ctx.shared.completed.fetch_add(completed, Ordering::Relaxed);
                tracing::info!(completed, "resuming from checkpoint");
            }
            Ok(_) => {
                tracing::debug!("checkpoint belongs to a different resource, ignoring");
            }
            Err(e) => {
                tracing::warn!(error = %e, "unreadable checkpoint, starting over");
            }
        }
    }
    partition(ctx);
    bp.tasks()
}

/// Carve `[position, total)` into blocks per the configuration.
fn partition(ctx: &RunCtx) {
    let bp = &ctx.plan.breakpoint;
    let total = ctx.plan.total_size;
    let mut position = bp.position();

    let single = total == 0 || !ctx.plan.multithread || ctx.config.routine_count <= 1;
    if single {
        // One block for the whole remainder; [position, 0] with an unknown
        // total means stream until EOF.
        if position < total || (total == 0 && bp.tasks().is_empty()) {
            let end = if total == 0 { 0 } else { total - 1 };
            bp.push_task(Arc::new(Block::new(position, end)));
            bp.set_position(if total == 0 { 1 } else { total });
        }
        return;
    }

    let size = ctx.config.routine_size.max(1);
    while position < total {
        let end = (position + size - 1).min(total - 1);
        bp.push_task(Arc::new(Block::new(position, end)));
        position = end + 1;
    }
    bp.set_position(position);
}

/// Progress sampling + periodic checkpoint export on one extra thread.
struct Ticker {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Ticker {
    fn stop(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

fn spawn_ticker(ctx: &RunCtx) -> Ticker {
    let stop = Arc::new(AtomicBool::new(false));
    let has_listeners = ctx.shared.reporter.lock().unwrap().has_listeners();
    if !has_listeners && !ctx.plan.resume {
        return Ticker { stop, handle: None };
    }

    let shared = Arc::clone(&ctx.shared);
    let plan = Arc::clone(&ctx.plan);
    let cancel = Arc::clone(&ctx.cancel);
    let outfile = Arc::clone(&ctx.outfile);
    let perm = ctx.perm;
    let save_every = ctx.config.auto_save_interval.max(TICK);
    let stop_flag = Arc::clone(&stop);

    let handle = thread::spawn(move || {
        let mut since_save = Duration::ZERO;
        while !stop_flag.load(Ordering::Relaxed) && !cancel.is_cancelled() {
            thread::sleep(TICK);
            if has_listeners {
                let snap = shared.snapshot(plan.total_size, &plan.outpath);
                shared.reporter.lock().unwrap().tick(snap);
            }
            since_save += TICK;
            if plan.resume && since_save >= save_every {
                since_save = Duration::ZERO;
                export_checkpoint(&plan, &outfile, perm);
            }
        }
    });
    Ticker {
        stop,
        handle: Some(handle),
    }
}

/// Sync the data file, then rewrite the checkpoint so it never claims bytes
/// the file may not hold.
fn export_checkpoint(plan: &Plan, outfile: &File, perm: u32) {
    if let Err(e) = outfile.sync_data() {
        tracing::warn!(error = %e, "output sync failed, skipping checkpoint export");
        return;
    }
    if let Err(e) = plan.breakpoint.export(&plan.bpfilepath, perm) {
        tracing::warn!(error = %e, "checkpoint export failed");
    }
}

/// Terminal phase: map the error, settle the checkpoint file, close the
/// output, latch the state, fire the final event, deliver the signal.
fn finish(ctx: &RunCtx, mut err: Option<DownloadError>) {
    let user_closed = ctx.shared.status() == Status::Close;
    if user_closed {
        if let Some(e) = &err {
            if e.is_cancelled() {
                err = None;
            }
        }
    } else if ctx.cancel.deadline_exceeded() {
        // A drain that raced the deadline and still completed every block is
        // a finish, not a timeout.
        let unfinished = ctx
            .plan
            .breakpoint
            .tasks()
            .iter()
            .any(|b| !b.is_finished());
        if err.is_some() || (unfinished && ctx.plan.total_size > 0) {
            let cause = err.take().unwrap_or(DownloadError::Cancelled);
            err = Some(DownloadError::Timeout(Box::new(cause)));
        }
    }

    ctx.cancel.cancel();

    if err.is_none() && !user_closed {
        if let Err(e) = ctx.outfile.sync_all() {
            err = Some(e.into());
        }
    }

    if ctx.plan.resume {
        if err.is_none() && !user_closed {
            if file_exists(&ctx.plan.bpfilepath) {
                let _ = std::fs::remove_file(&ctx.plan.bpfilepath);
            }
        } else {
            export_checkpoint(&ctx.plan, &ctx.outfile, ctx.perm);
        }
    }

    let status = if err.is_some() {
        Status::Error
    } else if user_closed {
        Status::Close
    } else {
        Status::Finish
    };
    ctx.shared.set_terminal(status, err.clone());

    match &err {
        Some(e) => tracing::info!(status = %status, error = %e, "job finished"),
        None => tracing::info!(status = %status, "job finished"),
    }

    {
        let mut reporter = ctx.shared.reporter.lock().unwrap();
        if reporter.has_listeners() {
            let snap = ctx
                .shared
                .snapshot(ctx.plan.total_size, &ctx.plan.outpath);
            reporter.terminal(snap);
        }
    }

    let _ = ctx.done.send(err);
}
