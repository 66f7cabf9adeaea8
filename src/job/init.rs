//! Ordered init sequence: probe, paths, conflict handling, file open.

use super::{Job, Plan};
use crate::breakpoint::Breakpoint;
use crate::cancel::CancelToken;
use crate::error::{DownloadError, Result};
use crate::filename::filter_filename;
use crate::sink::preallocate;
use crate::util::{auto_file_renaming, file_exists};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;

/// Run the full init contract. Any failure leaves the job untouched apart
/// from its status, which the caller resets to `NotStarted`.
pub(super) fn run(job: &mut Job, cancel: &CancelToken) -> Result<(Plan, File)> {
    let info = job.requester.probe(cancel)?;

    let breakpoint = Breakpoint::new(info.filesize, info.etag.clone());
    job.shared.limiter.set(job.config.speed_limit);

    let multithread = info.multithread;
    let resume = multithread && job.config.breakpoint_resume && info.filesize > 0;

    if !file_exists(&job.outdir) {
        if job.config.create_dir {
            fs::create_dir_all(&job.outdir)?;
        } else {
            return Err(DownloadError::DirNotFound(job.outdir.clone()));
        }
    }

    let mut outname = match &job.outname {
        Some(name) => name.clone(),
        None => info.filename(),
    };
    if job.config.auto_filter_filename {
        outname = filter_filename(&outname);
    }

    let mut outpath = absolute(&job.outdir.join(&outname))?;
    let mut bpfilepath = with_ext(&outpath, &job.config.breakpoint_ext);

    // Conflict handling. An existing file is only kept when a matching
    // checkpoint could continue it.
    let resumable_here = resume && file_exists(&bpfilepath);
    if file_exists(&outpath) && !resumable_here {
        if job.config.allow_overwrite {
            fs::remove_file(&outpath)?;
            if file_exists(&bpfilepath) {
                let _ = fs::remove_file(&bpfilepath);
            }
        } else if job.config.auto_file_renaming {
            let (renamed, name) = auto_file_renaming(&job.outdir, &outname);
            outpath = absolute(&renamed)?;
            outname = name;
            bpfilepath = with_ext(&outpath, &job.config.breakpoint_ext);
        } else {
            return Err(DownloadError::FileExists(outpath));
        }
    } else if !file_exists(&outpath) && file_exists(&bpfilepath) {
        // checkpoint without its data file is worthless
        let _ = fs::remove_file(&bpfilepath);
    }
    job.outname = Some(outname);

    let file = open_output(&outpath, job.perm)?;
    if info.filesize > 0 {
        preallocate(&file, info.filesize)?;
    }

    job.shared.completed.store(0, Ordering::Relaxed);

    tracing::info!(
        outpath = %outpath.display(),
        filesize = info.filesize,
        multithread,
        resume,
        "job initialised"
    );

    Ok((
        Plan {
            total_size: info.filesize,
            multithread,
            resume,
            outpath,
            bpfilepath,
            breakpoint,
        },
        file,
    ))
}

/// Open the destination for create + read/write without truncation, so a
/// resumed file keeps its bytes.
pub(super) fn open_output(path: &Path, perm: u32) -> Result<File> {
    let mut opts = File::options();
    opts.create(true).read(true).write(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(perm);
    }
    #[cfg(not(unix))]
    let _ = perm;
    Ok(opts.open(path)?)
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

/// `<outpath><ext>`, e.g. `file.iso` -> `file.iso.temp.rain`.
fn with_ext(outpath: &Path, ext: &str) -> PathBuf {
    let mut os = outpath.as_os_str().to_owned();
    os.push(ext);
    PathBuf::from(os)
}
