use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Local;
use ssverify_core::error::AppError;
use ssverify_core::models::Response;
use ssverify_core::traits::Fetcher;

/// Fetcher wrapper that keeps a raw copy of every request on disk.
///
/// Each request produces `<stamp>-<seq>-get.txt` holding `url status` (or
/// `url error` for failures) and, when a body was received,
/// `<stamp>-<seq>-get.html` holding it. `seq` is shared by all clones, so
/// requests finishing in the same millisecond still get their own pair.
/// Recording failures are logged and never fail the fetch.
#[derive(Clone)]
pub struct RecordingFetcher<F: Fetcher> {
    inner: F,
    dir: PathBuf,
    seq: Arc<AtomicU64>,
}

impl<F: Fetcher> RecordingFetcher<F> {
    pub fn new(inner: F, dir: impl Into<PathBuf>) -> Self {
        Self {
            inner,
            dir: dir.into(),
            seq: Arc::new(AtomicU64::new(0)),
        }
    }

    async fn record(&self, url: &str, result: &Result<Response, AppError>) -> Result<(), AppError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let stamp = format!("{}-{seq:06}", Local::now().format("%Y%m%d %H %M %S %3f"));

        let summary = match result {
            Ok(response) => format!("{url} {}", response.status),
            Err(e) => format!("{url} {e}"),
        };
        tokio::fs::write(self.dir.join(format!("{stamp}-get.txt")), summary).await?;

        if let Ok(response) = result {
            tokio::fs::write(self.dir.join(format!("{stamp}-get.html")), &response.body).await?;
        }
        Ok(())
    }
}

impl<F: Fetcher> Fetcher for RecordingFetcher<F> {
    async fn fetch(&self, url: &str) -> Result<Response, AppError> {
        let result = self.inner.fetch(url).await;
        if let Err(e) = self.record(url, &result).await {
            tracing::warn!(%url, dir = %self.dir.display(), error = %e, "Failed to record request");
        }
        result
    }
}
