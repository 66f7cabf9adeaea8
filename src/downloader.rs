//! Downloader factory: shared defaults that stamp out initialised jobs.

use crate::config::Config;
use crate::job::Job;
use crate::request::Requester;
use std::path::PathBuf;
use std::time::Duration;

/// Holds default configuration, request headers, output directory and file
/// permissions. Its one job (literally) is producing correctly-initialised
/// [`Job`]s; the same factory can stamp out any number of them.
///
/// ```no_run
/// use rainfall::Downloader;
///
/// let dl = Downloader::new();
/// let mut job = dl.new_job("https://example.com/big.iso");
/// job.with_bar();
/// job.run().unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct Downloader {
    config: Config,
    method: String,
    headers: Vec<(String, String)>,
    outdir: PathBuf,
    perm: u32,
}

impl Downloader {
    /// Factory with stock defaults: GET, browser-style headers, current
    /// directory, 0o600 files.
    pub fn new() -> Self {
        Downloader {
            config: Config::default(),
            method: "GET".to_string(),
            headers: Vec::new(),
            outdir: PathBuf::from("."),
            perm: 0o600,
        }
    }

    /// Create a job for `uri` carrying this factory's defaults.
    pub fn new_job(&self, uri: impl Into<String>) -> Job {
        let mut requester = Requester::new(uri);
        requester.set_method(self.method.clone());
        for (name, value) in &self.headers {
            requester.set_header(name.clone(), value.clone());
        }
        Job::with_defaults(
            self.config.clone(),
            requester,
            self.outdir.clone(),
            self.perm,
        )
    }

    // -- default shaping -------------------------------------------------

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    pub fn set_method(&mut self, method: impl Into<String>) {
        self.method = method.into();
    }

    /// Add or override one default request header.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push((name.into(), value.into()));
    }

    pub fn set_outdir(&mut self, dir: impl Into<PathBuf>) {
        self.outdir = dir.into();
    }

    pub fn set_perm(&mut self, perm: u32) {
        self.perm = perm;
    }

    pub fn set_routine_count(&mut self, n: usize) {
        self.config.routine_count = n;
    }

    pub fn set_routine_size(&mut self, bytes: u64) {
        self.config.routine_size = bytes;
    }

    pub fn set_disk_cache(&mut self, bytes: usize) {
        self.config.disk_cache = bytes;
    }

    pub fn set_speed_limit(&mut self, bytes_per_sec: u64) {
        self.config.speed_limit = bytes_per_sec;
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.config.timeout = timeout;
    }

    pub fn set_breakpoint_resume(&mut self, on: bool) {
        self.config.breakpoint_resume = on;
    }
}

impl Default for Downloader {
    fn default() -> Self {
        Downloader::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jobs_inherit_factory_defaults() {
        let mut dl = Downloader::new();
        dl.set_outdir("/tmp/downloads");
        dl.set_routine_count(4);
        dl.set_header("x-api-key", "secret");

        let job = dl.new_job("http://example.com/f.bin");
        assert_eq!(job.config().routine_count, 4);
        assert_eq!(job.config().routine_size, crate::config::DEFAULT_ROUTINE_SIZE);
    }

    #[test]
    fn factory_changes_do_not_leak_into_existing_jobs() {
        let mut dl = Downloader::new();
        let job = dl.new_job("http://example.com/f.bin");
        dl.set_routine_count(9);
        assert_eq!(job.config().routine_count, 1);
    }
}
