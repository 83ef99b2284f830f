//! One thumbnail run: probe, capture every frame in parallel, assemble,
//! publish.
//!
//! Each run owns a scratch directory that is removed on every exit path.
//! The finished GIF is staged next to its final path and renamed into place,
//! so concurrent readers never observe a partial file.

use super::processor::MediaProcessor;
use crate::domain::thumbnail::{frame_pattern, plan_snapshots, PipelineRequest, Snapshot, Stage};
use crate::error::ThumbError;
use crate::ports::runner::CommandRunner;
use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Upper bound for a single frame capture.
pub const DEFAULT_FRAME_TIMEOUT: Duration = Duration::from_secs(60);

/// Published GIFs are world-readable so other processes can serve the cache.
pub const CACHE_FILE_MODE: u32 = 0o644;

#[derive(Clone, Debug)]
pub struct PipelineSettings {
    pub frame_timeout: Duration,
    /// Parent for per-run scratch directories; the system temp dir if unset.
    pub scratch_root: Option<PathBuf>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            frame_timeout: DEFAULT_FRAME_TIMEOUT,
            scratch_root: None,
        }
    }
}

pub struct ThumbnailPipeline<R> {
    processor: Arc<MediaProcessor<R>>,
    settings: PipelineSettings,
}

impl<R: CommandRunner + 'static> ThumbnailPipeline<R> {
    pub fn new(processor: Arc<MediaProcessor<R>>, settings: PipelineSettings) -> Self {
        Self {
            processor,
            settings,
        }
    }

    pub fn processor(&self) -> &MediaProcessor<R> {
        &self.processor
    }

    /// Runs the whole pipeline for `request`, leaving the GIF at
    /// `request.output_path` on success and nothing on failure.
    pub async fn run(
        &self,
        token: &CancellationToken,
        request: &PipelineRequest,
    ) -> Result<(), ThumbError> {
        let scratch = self.scratch_dir().await?;
        debug!(
            url = %request.source_url,
            workdir = %scratch.path().display(),
            "scratch directory ready"
        );

        let result = self.run_in(token, request, scratch.path()).await;

        if let Err(e) = blocking(move || scratch.close()).await {
            warn!(error = %e, "failed to remove scratch directory");
        }
        result
    }

    async fn run_in(
        &self,
        token: &CancellationToken,
        request: &PipelineRequest,
        scratch: &Path,
    ) -> Result<(), ThumbError> {
        let url = &request.source_url;

        info!(url = %url, stage = %Stage::Probe, "getting duration");
        let duration = self.processor.probe_duration(token, url).await?;
        info!(url = %url, duration, "got duration");

        let snapshots = plan_snapshots(scratch, duration, request.snapshot_count);
        info!(url = %url, stage = %Stage::Capture, count = snapshots.len(), "getting snapshots");
        self.capture_all(token, request, &snapshots).await?;
        info!(url = %url, "got all snapshots");

        info!(url = %url, stage = %Stage::Assemble, "creating gif");
        self.assemble_and_publish(token, request, scratch).await?;
        info!(url = %url, output = %request.output_path.display(), "published gif");

        Ok(())
    }

    /// Captures every snapshot concurrently and waits for all of them before
    /// looking at any result. The first failure by index wins.
    async fn capture_all(
        &self,
        token: &CancellationToken,
        request: &PipelineRequest,
        snapshots: &[Snapshot],
    ) -> Result<(), ThumbError> {
        let captures = token.child_token();
        // Stops every capture if this future is dropped mid-flight.
        let _abort_on_drop = captures.clone().drop_guard();

        let handles: Vec<_> = snapshots
            .iter()
            .cloned()
            .map(|snapshot| {
                let processor = self.processor.clone();
                let token = captures.child_token();
                let url = request.source_url.clone();
                let height = request.thumb_height;
                let frame_timeout = self.settings.frame_timeout;
                tokio::spawn(async move {
                    processor
                        .capture_frame(&token, &url, &snapshot, height, Some(frame_timeout))
                        .await
                })
            })
            .collect();

        let results = futures::future::join_all(handles).await;

        if token.is_cancelled() {
            return Err(ThumbError::Cancelled);
        }

        let mut first_error = None;
        for (snapshot, joined) in snapshots.iter().zip(results) {
            let result = joined.unwrap_or_else(|e| {
                Err(ThumbError::CaptureFailed {
                    index: snapshot.index,
                    timestamp: snapshot.timestamp_seconds,
                    cause: format!("capture task failed: {}", e),
                })
            });
            match result {
                Ok(()) => debug!(
                    index = snapshot.index,
                    timestamp = snapshot.timestamp_seconds,
                    file = %snapshot.file_path.display(),
                    "got snapshot"
                ),
                Err(e) => {
                    warn!(index = snapshot.index, error = %e, "error getting snapshot");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn assemble_and_publish(
        &self,
        token: &CancellationToken,
        request: &PipelineRequest,
        scratch: &Path,
    ) -> Result<(), ThumbError> {
        let output_dir = request
            .output_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();

        // Staged in the destination directory so the final rename cannot
        // cross filesystems. Removed on drop unless persisted.
        let staged = blocking(move || {
            tempfile::Builder::new()
                .prefix(".")
                .suffix(".gif")
                .tempfile_in(output_dir)
        })
        .await?;

        let assembly = token.child_token();
        let pattern = frame_pattern(scratch);
        self.processor
            .assemble_gif(&assembly, &pattern, request.gif_framerate, staged.path())
            .await?;

        if token.is_cancelled() {
            return Err(ThumbError::Cancelled);
        }

        let output_path = request.output_path.clone();
        blocking(move || {
            fs::set_permissions(staged.path(), fs::Permissions::from_mode(CACHE_FILE_MODE))?;
            staged.persist(&output_path).map_err(|e| e.error)?;
            Ok(())
        })
        .await?;
        Ok(())
    }

    async fn scratch_dir(&self) -> Result<TempDir, ThumbError> {
        let root = self.settings.scratch_root.clone();
        let dir = blocking(move || {
            let mut builder = tempfile::Builder::new();
            builder.prefix("thumb-");
            match root {
                Some(root) => builder.tempdir_in(root),
                None => builder.tempdir(),
            }
        })
        .await?;
        Ok(dir)
    }
}

/// Runs filesystem work on the blocking pool.
async fn blocking<T, F>(work: F) -> io::Result<T>
where
    F: FnOnce() -> io::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(io::Error::other)?
}
