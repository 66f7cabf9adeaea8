//! Output-name sanitisation.

/// Longest accepted filename, in Unicode code points.
const NAME_MAX: usize = 255;

/// Characters stripped from inferred filenames: unsafe on at least one
/// mainstream filesystem.
const ILLEGAL: &[char] = &['?', '\\', '/', '*', '"', '<', '>', '|', ':'];

/// Clean an output filename: drop leading whitespace, remove illegal
/// characters, cap at 255 code points.
pub fn filter_filename(name: &str) -> String {
    name.trim_start()
        .chars()
        .filter(|c| !ILLEGAL.contains(c) && !c.is_control())
        .take(NAME_MAX)
        .collect()
}
