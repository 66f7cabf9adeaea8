//! Magic-byte sniffing of the probe body.
//!
//! The probe requests the first 262 bytes: enough for every signature below,
//! including the `ustar` magic that sits at offset 257 of a tar archive.

/// Guess a file extension from leading magic bytes. Returns `None` for
/// unrecognised or plain-text content.
pub fn sniff_extension(body: &[u8]) -> Option<&'static str> {
    if body.len() >= 262 && &body[257..262] == b"ustar" {
        return Some("tar");
    }
    if body.len() >= 12 && &body[..4] == b"RIFF" {
        let kind = &body[8..12];
        return if kind == b"WEBP" {
            Some("webp")
        } else if kind == b"WAVE" {
            Some("wav")
        } else if kind == b"AVI " {
            Some("avi")
        } else {
            None
        };
    }
    if body.len() >= 12 && &body[4..8] == b"ftyp" {
        return Some("mp4");
    }
    const PREFIXES: [(&[u8], &str); 15] = [
        (b"\x89PNG\r\n\x1a\n", "png"),
        (b"\xff\xd8\xff", "jpg"),
        (b"GIF87a", "gif"),
        (b"GIF89a", "gif"),
        (b"%PDF-", "pdf"),
        (b"PK\x03\x04", "zip"),
        (b"\x1f\x8b", "gz"),
        (b"BZh", "bz2"),
        (b"\xfd7zXZ\x00", "xz"),
        (b"7z\xbc\xaf\x27\x1c", "7z"),
        (b"Rar!\x1a\x07", "rar"),
        (b"OggS", "ogg"),
        (b"fLaC", "flac"),
        (b"ID3", "mp3"),
        (b"\x00asm", "wasm"),
    ];
    PREFIXES
        .iter()
        .find(|(magic, _)| body.starts_with(magic))
        .map(|(_, ext)| *ext)
}
