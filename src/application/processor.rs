//! The three ffmpeg/ffprobe operations behind the pipeline.
//!
//! Every call holds one [`ProcessSlot`](super::gate::ProcessSlot) for as long
//! as the external process runs, and gives it back on every exit path.

use super::gate::ProcessGate;
use crate::domain::thumbnail::Snapshot;
use crate::error::ThumbError;
use crate::ports::runner::{CommandRunner, Invocation};
use std::future::Future;
use std::io;
use std::path::Path;
use std::process::Output;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub const FFPROBE: &str = "ffprobe";
pub const FFMPEG: &str = "ffmpeg";

pub fn probe_invocation(url: &str) -> Invocation {
    Invocation::new(
        FFPROBE,
        [
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
            url,
        ],
    )
}

/// Seeks to `timestamp`, scales to `height` keeping the aspect ratio (even
/// width) and writes exactly one frame.
pub fn capture_invocation(url: &str, timestamp: f64, height: u32, out: &Path) -> Invocation {
    Invocation::new(
        FFMPEG,
        [
            "-y".to_string(),
            "-ss".to_string(),
            format!("{:.6}", timestamp),
            "-i".to_string(),
            url.to_string(),
            "-vf".to_string(),
            format!("scale=-2:{}", height),
            "-vframes".to_string(),
            "1".to_string(),
            out.to_string_lossy().into_owned(),
        ],
    )
}

/// Composes numbered frames into an infinitely looping GIF.
pub fn assemble_invocation(pattern: &Path, framerate: u32, out: &Path) -> Invocation {
    Invocation::new(
        FFMPEG,
        [
            "-y".to_string(),
            "-framerate".to_string(),
            framerate.to_string(),
            "-i".to_string(),
            pattern.to_string_lossy().into_owned(),
            "-loop".to_string(),
            "0".to_string(),
            "-f".to_string(),
            "gif".to_string(),
            out.to_string_lossy().into_owned(),
        ],
    )
}

/// Parses ffprobe's bare `format=duration` output.
pub fn parse_duration(stdout: &str) -> Result<f64, String> {
    let trimmed = stdout.trim();
    let duration = trimmed
        .parse::<f64>()
        .map_err(|e| format!("failed to parse ffprobe output {:?}: {}", trimmed, e))?;
    if !duration.is_finite() || duration < 0.0 {
        return Err(format!("ffprobe reported an invalid duration: {}", trimmed));
    }
    Ok(duration)
}

enum RunFailure {
    Cancelled,
    Failed(String),
}

impl RunFailure {
    fn into_error(self, wrap: impl FnOnce(String) -> ThumbError) -> ThumbError {
        match self {
            RunFailure::Cancelled => ThumbError::Cancelled,
            RunFailure::Failed(cause) => wrap(cause),
        }
    }
}

pub struct MediaProcessor<R> {
    runner: R,
    gate: ProcessGate,
}

impl<R: CommandRunner> MediaProcessor<R> {
    pub fn new(runner: R, gate: ProcessGate) -> Self {
        Self { runner, gate }
    }

    pub fn gate(&self) -> &ProcessGate {
        &self.gate
    }

    pub async fn probe_duration(
        &self,
        token: &CancellationToken,
        url: &str,
    ) -> Result<f64, ThumbError> {
        let wrap = |cause| ThumbError::ProbeFailed { cause };
        let output = self
            .execute(token, probe_invocation(url), None)
            .await
            .map_err(|failure| failure.into_error(wrap))?;

        parse_duration(&String::from_utf8_lossy(&output.stdout)).map_err(wrap)
    }

    /// Captures one frame. `limit` bounds the ffmpeg process itself, not the
    /// wait for a gate slot.
    pub async fn capture_frame(
        &self,
        token: &CancellationToken,
        url: &str,
        snapshot: &Snapshot,
        height: u32,
        limit: Option<Duration>,
    ) -> Result<(), ThumbError> {
        let wrap = |cause| ThumbError::CaptureFailed {
            index: snapshot.index,
            timestamp: snapshot.timestamp_seconds,
            cause,
        };
        let invocation =
            capture_invocation(url, snapshot.timestamp_seconds, height, &snapshot.file_path);

        let result = match self.execute(token, invocation, limit).await {
            Ok(_) if !file_exists(&snapshot.file_path).await => Err(wrap(
                "ffmpeg exited successfully but produced no frame".to_string(),
            )),
            Ok(_) => Ok(()),
            Err(failure) => Err(failure.into_error(wrap)),
        };
        if result.is_err() {
            discard(&snapshot.file_path).await;
        }
        result
    }

    pub async fn assemble_gif(
        &self,
        token: &CancellationToken,
        pattern: &Path,
        framerate: u32,
        out: &Path,
    ) -> Result<(), ThumbError> {
        let result = self
            .execute(token, assemble_invocation(pattern, framerate, out), None)
            .await
            .map(|_| ())
            .map_err(|failure| failure.into_error(|cause| ThumbError::AssembleFailed { cause }));
        if result.is_err() {
            discard(out).await;
        }
        result
    }

    /// Runs one invocation under a gate slot. Cancellation drops the runner
    /// future, which kills the process. `limit` starts once the slot is held.
    async fn execute(
        &self,
        token: &CancellationToken,
        invocation: Invocation,
        limit: Option<Duration>,
    ) -> Result<Output, RunFailure> {
        let slot = self
            .gate
            .acquire(token)
            .await
            .map_err(|_| RunFailure::Cancelled)?;
        debug!(command = %invocation, "running");

        let program = invocation.program.clone();
        let result = tokio::select! {
            biased;
            _ = token.cancelled() => Err(RunFailure::Cancelled),
            output = run_within(self.runner.run(invocation), limit) => match output {
                Ok(Ok(output)) if output.status.success() => Ok(output),
                Ok(Ok(output)) => Err(RunFailure::Failed(format!(
                    "{} {}: {}",
                    program,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ))),
                Ok(Err(e)) => Err(RunFailure::Failed(format!("failed to run {}: {}", program, e))),
                Err(limit) => Err(RunFailure::Failed(format!("timed out after {:?}", limit))),
            },
        };
        slot.release();
        result
    }
}

/// Drops `run` (killing the process) once `limit` elapses.
async fn run_within<F>(run: F, limit: Option<Duration>) -> Result<io::Result<Output>, Duration>
where
    F: Future<Output = io::Result<Output>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, run).await.map_err(|_| limit),
        None => Ok(run.await),
    }
}

async fn file_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

/// Best-effort removal of partial output.
async fn discard(path: &Path) {
    let _ = tokio::fs::remove_file(path).await;
}
