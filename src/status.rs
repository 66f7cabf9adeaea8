//! Job lifecycle states.

use std::fmt;

/// Lifecycle state of a [`Job`](crate::Job).
///
/// Transitions: `NotStarted -> Begin` on the first `start()`, `Begin ->
/// Running` once init succeeds (back to `NotStarted` when it fails, so the
/// caller may retry), `Running` -> one of `Finish` / `Close` / `Error`, and
/// `Close`/`Error` -> `Begin` when a terminated job is started again.
/// `Finish` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Never started, or the last init attempt failed.
    NotStarted,
    /// `start()` accepted; init in progress.
    Begin,
    /// Workers are transferring.
    Running,
    /// Cancelled by `close()`.
    Close,
    /// Terminated by an error.
    Error,
    /// All blocks drained successfully.
    Finish,
}

impl Status {
    /// True if this state equals any of the given states.
    pub fn is_any(self, states: &[Status]) -> bool {
        states.iter().any(|s| *s == self)
    }

    /// True for states a finished-or-stopped job can be restarted from.
    pub fn restartable(self) -> bool {
        self.is_any(&[Status::NotStarted, Status::Close, Status::Error])
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::NotStarted => "not_started",
            Status::Begin => "begin",
            Status::Running => "running",
            Status::Close => "close",
            Status::Error => "error",
            Status::Finish => "finish",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
