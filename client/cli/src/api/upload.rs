use crate::error::ApiResult;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

/// Size of the pieces the request body is streamed in; progress ticks once per piece.
const PIECE_SIZE: usize = 64 * 1024;

/// A file selected for upload.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingFile {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
}

impl PendingFile {
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let meta = std::fs::metadata(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "file.pdf".to_string());
        Ok(Self {
            path: path.to_path_buf(),
            name,
            size: meta.len(),
        })
    }
}

/// Counts body bytes handed to the transport and reports whole-request progress.
struct ProgressCounter {
    sent: AtomicU64,
    total: u64,
    last: AtomicU8,
    callback: Box<dyn Fn(u8) + Send + Sync>,
}

impl ProgressCounter {
    fn advance(&self, n: usize) {
        let sent = self.sent.fetch_add(n as u64, Ordering::Relaxed) + n as u64;
        let percent = if self.total == 0 {
            100
        } else {
            ((sent * 100 + self.total / 2) / self.total).min(100) as u8
        };
        if self.last.swap(percent, Ordering::Relaxed) != percent {
            (self.callback)(percent);
        }
    }
}

/// Views of `data` at most `PIECE_SIZE` long, sharing its buffer.
fn pieces(data: Bytes) -> impl Iterator<Item = Bytes> {
    let len = data.len();
    (0..len)
        .step_by(PIECE_SIZE)
        .map(move |start| data.slice(start..(start + PIECE_SIZE).min(len)))
}

pub(super) async fn progress_form<F>(
    files: &[PendingFile],
    folder: &str,
    on_progress: F,
) -> ApiResult<Form>
where
    F: Fn(u8) + Send + Sync + 'static,
{
    let mut contents = Vec::with_capacity(files.len());
    for file in files {
        let data = Bytes::from(tokio::fs::read(&file.path).await?);
        contents.push((file.name.clone(), data));
    }
    let total = contents.iter().map(|(_, data)| data.len() as u64).sum();
    let counter = Arc::new(ProgressCounter {
        sent: AtomicU64::new(0),
        total,
        last: AtomicU8::new(0),
        callback: Box::new(on_progress),
    });

    let mut form = Form::new();
    for (name, data) in contents {
        let len = data.len() as u64;
        let counter = counter.clone();
        let stream = tokio_stream::iter(pieces(data).map(move |piece| {
            counter.advance(piece.len());
            Ok::<_, std::io::Error>(piece)
        }));
        let part = Part::stream_with_length(reqwest::Body::wrap_stream(stream), len)
            .file_name(name)
            .mime_str("application/pdf")?;
        form = form.part("files[]", part);
    }
    if total == 0 {
        counter.advance(0);
    }
    Ok(form.text("folder", folder.to_string()))
}
