//! Small filesystem and formatting helpers.

use rand::Rng;
use std::path::{Path, PathBuf};

/// True when the path exists (file or directory).
pub fn file_exists(path: &Path) -> bool {
    path.symlink_metadata().is_ok()
}

/// Find a non-conflicting name by probing `<stem>.<k><ext>` for k = 1, 2, …
/// Returns (path, filename) of the first free candidate.
pub fn auto_file_renaming(dir: &Path, name: &str) -> (PathBuf, String) {
    let (stem, ext) = split_extension(name);
    let mut k = 1u32;
    loop {
        let candidate = format!("{stem}.{k}{ext}");
        let path = dir.join(&candidate);
        if !file_exists(&path) {
            return (path, candidate);
        }
        k += 1;
    }
}

/// Split `name` into (stem, extension-with-dot). No extension yields an
/// empty second part; a leading dot (hidden file) is part of the stem.
pub fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(i) if i > 0 => (&name[..i], &name[i..]),
        _ => (name, ""),
    }
}

/// Random alphanumeric string of `len` lowercase letters and digits.
pub fn random_alnum(len: usize) -> String {
    const POOL: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| POOL[rng.gen_range(0..POOL.len())] as char)
        .collect()
}

/// Byte count as a human string with two decimals in binary units.
pub fn format_bytes(n: u64) -> String {
    const UNITS: [(&str, u64); 5] = [
        ("TiB", 1 << 40),
        ("GiB", 1 << 30),
        ("MiB", 1 << 20),
        ("KiB", 1 << 10),
        ("B", 1),
    ];
    for (unit, size) in UNITS {
        if n >= size || size == 1 {
            return format!("{:.2} {}", n as f64 / size as f64, unit);
        }
    }
    unreachable!()
}
