use serde::Serialize;
use std::fmt::Write as _;
use std::path::Path;
use tokio::io::AsyncReadExt;

pub const PREVIEW_LIMIT: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "content", rename_all = "snake_case")]
pub enum PreviewContent {
    Text(String),
    /// Hex dump, 16 bytes per line
    Binary(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilePreview {
    pub path: String,
    pub bytes_read: usize,
    pub truncated: bool,
    pub content: PreviewContent,
}

impl FilePreview {
    pub fn is_binary(&self) -> bool {
        matches!(self.content, PreviewContent::Binary(_))
    }
}

/// NUL anywhere, or more than 10% of bytes outside printable ASCII + tab/LF/CR.
pub fn looks_binary(bytes: &[u8]) -> bool {
    if bytes.is_empty() {
        return false;
    }
    if bytes.contains(&0) {
        return true;
    }
    let non_printable = bytes
        .iter()
        .filter(|&&b| !matches!(b, b'\t' | b'\n' | b'\r' | 0x20..=0x7e))
        .count();
    non_printable * 10 > bytes.len()
}

pub fn hex_dump(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (row, chunk) in bytes.chunks(16).enumerate() {
        let _ = write!(out, "{:08x} ", row * 16);
        for b in chunk {
            let _ = write!(out, " {:02x}", b);
        }
        out.push('\n');
    }
    out
}

pub async fn read_preview(path: &Path) -> std::io::Result<FilePreview> {
    let file = tokio::fs::File::open(path).await?;
    let metadata = file.metadata().await?;
    if !metadata.is_file() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "Path is not a file",
        ));
    }
    let len = metadata.len();
    let mut buf = Vec::with_capacity(PREVIEW_LIMIT.min(len as usize));
    file.take(PREVIEW_LIMIT as u64).read_to_end(&mut buf).await?;

    let content = if looks_binary(&buf) {
        PreviewContent::Binary(hex_dump(&buf))
    } else {
        PreviewContent::Text(String::from_utf8_lossy(&buf).into_owned())
    };

    Ok(FilePreview {
        path: path.to_string_lossy().into_owned(),
        bytes_read: buf.len(),
        truncated: len > buf.len() as u64,
        content,
    })
}
