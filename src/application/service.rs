use super::coalescer::{RequestCoalescer, Role, RunOutcome};
use super::gate::ProcessGate;
use super::pipeline::{PipelineSettings, ThumbnailPipeline};
use super::processor::MediaProcessor;
use crate::adapters::cache::FsCache;
use crate::config::Config;
use crate::domain::thumbnail::{PipelineRequest, RunKey};
use crate::error::ThumbError;
use crate::ports::runner::CommandRunner;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use url::Url;

/// How a thumbnail request was satisfied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Already on disk; nothing was run.
    CacheHit(PathBuf),
    /// This request led the run that produced it.
    Generated(PathBuf),
    /// Another request's run produced it while this one waited.
    Coalesced(PathBuf),
    /// This request's own deadline ended while another run was still working.
    StillProcessing,
}

impl Delivery {
    pub fn path(&self) -> Option<&Path> {
        match self {
            Delivery::CacheHit(p) | Delivery::Generated(p) | Delivery::Coalesced(p) => Some(p),
            Delivery::StillProcessing => None,
        }
    }
}

/// Cache lookup, request coalescing and pipeline runs for one service.
pub struct ThumbnailService<R> {
    cache: FsCache,
    coalescer: RequestCoalescer,
    pipeline: ThumbnailPipeline<R>,
    snapshot_count: usize,
    thumb_height: u32,
    gif_framerate: u32,
}

impl<R: CommandRunner + 'static> ThumbnailService<R> {
    pub fn new(config: &Config, runner: R) -> Self {
        let gate = ProcessGate::new(config.max_processes);
        let processor = Arc::new(MediaProcessor::new(runner, gate));
        let pipeline = ThumbnailPipeline::new(
            processor,
            PipelineSettings {
                frame_timeout: config.frame_timeout(),
                scratch_root: config.scratch_dir.clone(),
            },
        );

        Self {
            cache: FsCache::new(&config.cache_dir),
            coalescer: RequestCoalescer::new(),
            pipeline,
            snapshot_count: config.n_snapshots,
            thumb_height: config.thumb_height,
            gif_framerate: config.gif_framerate,
        }
    }

    pub fn cache(&self) -> &FsCache {
        &self.cache
    }

    pub fn coalescer(&self) -> &RequestCoalescer {
        &self.coalescer
    }

    pub fn pipeline(&self) -> &ThumbnailPipeline<R> {
        &self.pipeline
    }

    /// Returns the cached GIF for `url`, generating it if needed. Concurrent
    /// calls for the same URL share one run.
    pub async fn thumbnail(
        &self,
        token: &CancellationToken,
        url: &Url,
    ) -> Result<Delivery, ThumbError> {
        let key = self.cache.key_for(url.as_str());
        let path = self.cache.path(&key);

        if self.cache.exists(&key).await {
            info!(url = %url, path = %path.display(), "serving cached gif");
            return Ok(Delivery::CacheHit(path));
        }

        let run_key = RunKey::from(url);
        loop {
            match self.coalescer.try_become_leader(&run_key) {
                Role::Leader(ticket) => {
                    // A run may have published between the lookup and the claim.
                    if self.cache.exists(&key).await {
                        ticket.finish(RunOutcome::Published);
                        return Ok(Delivery::CacheHit(path));
                    }

                    info!(url = %url, path = %path.display(), "creating gif");
                    let request = PipelineRequest {
                        source_url: url.to_string(),
                        output_path: path.clone(),
                        snapshot_count: self.snapshot_count,
                        thumb_height: self.thumb_height,
                        gif_framerate: self.gif_framerate,
                    };

                    return match self.pipeline.run(token, &request).await {
                        Ok(()) => {
                            ticket.finish(RunOutcome::Published);
                            Ok(Delivery::Generated(path))
                        }
                        Err(ThumbError::Cancelled) => {
                            info!(url = %url, "run cancelled");
                            ticket.finish(RunOutcome::Abandoned);
                            Err(ThumbError::Cancelled)
                        }
                        Err(e) => {
                            let stage = e.stage().map(|s| s.to_string()).unwrap_or_default();
                            error!(url = %url, stage = %stage, error = %e, "error creating gif");
                            ticket.finish(RunOutcome::Failed(e.to_string()));
                            Err(e)
                        }
                    };
                }
                Role::Follower(follower) => {
                    info!(url = %url, "waiting for run in progress");
                    match follower.wait(token).await {
                        Some(RunOutcome::Published) => return Ok(Delivery::Coalesced(path)),
                        Some(RunOutcome::Failed(message)) => {
                            return Err(ThumbError::LeaderFailed(message))
                        }
                        // The leader went away; take over unless we are done too.
                        Some(RunOutcome::Abandoned) | Some(RunOutcome::Running)
                            if !token.is_cancelled() =>
                        {
                            continue
                        }
                        _ => {
                            if self.cache.exists(&key).await {
                                return Ok(Delivery::Coalesced(path));
                            }
                            info!(url = %url, "stopped waiting; run still in progress");
                            return Ok(Delivery::StillProcessing);
                        }
                    }
                }
            }
        }
    }
}
