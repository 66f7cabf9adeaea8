//! Terminal progress bar: a stock extended listener.

use crate::event::{ProgressListenerExtend, StatExtend};
use crate::util::format_bytes;
use std::io::Write;

const BAR_WIDTH: usize = 30;

/// Renders download progress to stderr on one line.
///
/// ```text
/// file.iso  42% [============>                 ] 3.15 MiB/s 00:27
/// ```
#[derive(Debug, Default)]
pub struct Bar {
    _private: (),
}

impl Bar {
    pub fn new() -> Self {
        Bar::default()
    }

    fn line(stat: &StatExtend) -> String {
        let name = stat
            .stat
            .outpath
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let percent = stat.stat.progress.min(100) as usize;
        let filled = percent * BAR_WIDTH / 100;
        let mut cells = String::with_capacity(BAR_WIDTH);
        for i in 0..BAR_WIDTH {
            cells.push(if i < filled {
                '='
            } else if i == filled && percent < 100 {
                '>'
            } else {
                ' '
            });
        }
        let eta = stat.estimated_time.as_secs();
        format!(
            "{}  {:>3}% [{}] {}/s {:02}:{:02}",
            name,
            percent,
            cells,
            format_bytes(stat.download_speed),
            eta / 60,
            eta % 60,
        )
    }

    fn redraw(&self, stat: &StatExtend) {
        let mut err = std::io::stderr().lock();
        let _ = write!(err, "\r\x1b[K{}", Self::line(stat));
        let _ = err.flush();
    }

    fn end(&self, stat: &StatExtend, note: &str) {
        let mut err = std::io::stderr().lock();
        let _ = writeln!(err, "\r\x1b[K{} {}", Self::line(stat), note);
    }
}

impl ProgressListenerExtend for Bar {
    fn change(&mut self, stat: &StatExtend) {
        self.redraw(stat);
    }

    fn close(&mut self, stat: &StatExtend) {
        self.end(stat, "(stopped)");
    }

    fn error(&mut self, stat: &StatExtend) {
        let note = stat
            .stat
            .error
            .as_ref()
            .map(|e| format!("(error: {e})"))
            .unwrap_or_else(|| "(error)".to_string());
        self.end(stat, &note);
    }

    fn finish(&mut self, stat: &StatExtend) {
        self.end(stat, "(done)");
    }
}
