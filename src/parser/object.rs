use flate2::read::MultiGzDecoder;
use std::borrow::Cow;
use std::io::Read;
use thiserror::Error;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Debug, Error)]
pub enum DecompressError {
    #[error("failed to gunzip log object: {0}")]
    Gzip(#[from] std::io::Error),
}

/// Gunzip `data` when it carries the gzip magic bytes, otherwise borrow it as-is.
pub fn decompress(data: &[u8]) -> Result<Cow<'_, [u8]>, DecompressError> {
    if !data.starts_with(&GZIP_MAGIC) {
        return Ok(Cow::Borrowed(data));
    }

    let mut decoder = MultiGzDecoder::new(data);
    let mut out = Vec::with_capacity(data.len() * 4);
    decoder.read_to_end(&mut out)?;
    Ok(Cow::Owned(out))
}

/// Derive a log group name from an object key.
///
/// The group is every path segment except the file name, joined with `/` and
/// always starting with `/`.
pub fn log_group_from_key(key: &str) -> String {
    let dir = match key.rfind('/') {
        Some(idx) => &key[..idx],
        None => "",
    };

    if dir.starts_with('/') {
        dir.to_string()
    } else {
        format!("/{}", dir)
    }
}

/// Render a byte count with binary units, e.g. `1.5 KiB`.
pub fn format_bytes(bytes: u64) -> String {
    const UNIT: u64 = 1024;
    if bytes < UNIT {
        return format!("{} B", bytes);
    }

    let mut div = UNIT;
    let mut exp = 0;
    let mut n = bytes / UNIT;
    while n >= UNIT {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }

    let prefix = ['K', 'M', 'G', 'T', 'P', 'E'][exp];
    format!("{:.1} {}iB", bytes as f64 / div as f64, prefix)
}
