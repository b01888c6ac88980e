//! The video pipeline: probe, extract, enhance, rebuild.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::commands::{self, FRAME_EXTENSION};
use super::encoder::{EncoderCapabilities, VideoEncoder};
use super::probe::{parse_frame_rate, DEFAULT_FRAME_RATE};
use super::stage::StageTracker;
use crate::config::VideoConfig;
use crate::models;
use crate::pipeline::{
    parent_dir, run_to_completion, EventSink, OutputTail, PipelineError, PipelineEvent,
    PipelineStage, RunControl, VideoJob, VideoResult,
};
use crate::process::{ProcessEvent, ProcessRunner, ToolPaths};
use crate::progress::{
    count_matching, last_percentage, ProgressEvent, ProgressWatcher, WatchError, WatchSettings,
};
use crate::workspace::TempWorkspace;

/// Enhancer lines kept for error messages.
const TAIL_LINES: usize = 20;

/// Timing and placement settings of a [`VideoPipeline`].
#[derive(Debug, Clone, PartialEq)]
pub struct VideoSettings {
    pub watch: WatchSettings,
    pub probe_timeout: Duration,
    pub terminate_grace: Duration,
    /// Parent of the scratch workspace; next to the input when `None`.
    pub workspace_root: Option<PathBuf>,
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self::from(&VideoConfig::default())
    }
}

impl From<&VideoConfig> for VideoSettings {
    fn from(config: &VideoConfig) -> Self {
        Self {
            watch: config.watch_settings(),
            probe_timeout: config.probe_timeout(),
            terminate_grace: config.terminate_grace(),
            workspace_root: config.workspace_root.clone(),
        }
    }
}

/// Upscales a video by enhancing its frames one directory at a time.
///
/// Stages run strictly in order: `Probing`, `ExtractingFrames`,
/// `EnhancingFrames`, `Rebuilding`, then `Done`. Any stage may end the run
/// as `Failed` or `Cancelled`. The scratch workspace is removed on every
/// path before the final event is sent.
pub struct VideoPipeline<R: ProcessRunner> {
    runner: Arc<R>,
    tools: ToolPaths,
    settings: VideoSettings,
    control: RunControl,
}

impl<R: ProcessRunner> VideoPipeline<R> {
    pub fn new(runner: Arc<R>, tools: ToolPaths, settings: VideoSettings) -> Self {
        Self {
            runner,
            tools,
            settings,
            control: RunControl::default(),
        }
    }

    pub fn settings(&self) -> &VideoSettings {
        &self.settings
    }

    /// Cancels the active run, if any.
    pub fn cancel(&self) {
        self.control.cancel();
    }

    /// Token that cancels the current (or next) run when triggered.
    pub fn cancel_token(&self) -> CancellationToken {
        self.control.token()
    }

    pub fn is_running(&self) -> bool {
        self.control.is_running()
    }

    /// Runs `job` to completion, failure or cancellation.
    pub async fn run(
        &self,
        job: VideoJob,
        events: impl Into<EventSink>,
    ) -> Result<VideoResult, PipelineError> {
        let events = events.into();
        let (_guard, cancel) = match self.control.begin() {
            Ok(run) => run,
            Err(e) => {
                warn!("Video pipeline is already running");
                events
                    .emit(PipelineEvent::Failed {
                        kind: e.kind(),
                        message: e.to_string(),
                    })
                    .await;
                return Err(e);
            }
        };

        let mut run = VideoRun {
            runner: self.runner.as_ref(),
            tools: &self.tools,
            settings: &self.settings,
            job: &job,
            events: &events,
            cancel,
            stages: StageTracker::new(),
            workspace: None,
            started: Instant::now(),
        };
        let result = run.execute().await;
        run.finish(result).await
    }
}

impl<R: ProcessRunner> Drop for VideoPipeline<R> {
    fn drop(&mut self) {
        self.control.cancel();
    }
}

/// State of one run. Only the run's own task touches it.
struct VideoRun<'a, R: ProcessRunner> {
    runner: &'a R,
    tools: &'a ToolPaths,
    settings: &'a VideoSettings,
    job: &'a VideoJob,
    events: &'a EventSink,
    cancel: CancellationToken,
    stages: StageTracker,
    workspace: Option<TempWorkspace>,
    started: Instant,
}

impl<R: ProcessRunner> VideoRun<'_, R> {
    async fn execute(&mut self) -> Result<VideoResult, PipelineError> {
        let job = self.job;
        info!(
            input = %job.input_path.display(),
            model = %job.model_name,
            scale = job.scale_factor,
            "Starting video upscaling"
        );
        self.events
            .emit(PipelineEvent::StageChanged {
                stage: PipelineStage::Probing,
            })
            .await;

        if !job.input_path.exists() {
            return Err(PipelineError::InputNotFound {
                path: job.input_path.clone(),
            });
        }
        models::warn_if_unknown(&job.model_name);

        let workspace =
            TempWorkspace::for_input(&job.input_path, self.settings.workspace_root.as_deref())?;
        let frame_dir = workspace.frame_dir().to_path_buf();
        let enhanced_dir = workspace.enhanced_dir().to_path_buf();
        self.workspace = Some(workspace);

        self.status("Reading video metadata").await;
        let frame_rate = self.probe_frame_rate().await?;

        self.enter(PipelineStage::ExtractingFrames).await?;
        self.status("Extracting frames").await;
        self.extract_frames(&frame_dir).await?;

        self.enter(PipelineStage::EnhancingFrames).await?;
        let total_frames = self.enhance_frames(&frame_dir, &enhanced_dir).await?;

        self.enter(PipelineStage::Rebuilding).await?;
        let encoder = self.select_encoder().await?;
        self.status(&format!("Rebuilding video with {encoder}")).await;
        let output_path = self.rebuild(&enhanced_dir, &frame_rate, encoder).await?;

        self.enter(PipelineStage::Done).await?;
        Ok(VideoResult {
            output_path,
            frame_rate,
            total_frames,
            encoder: encoder.to_string(),
            duration_ms: self.started.elapsed().as_millis() as u64,
        })
    }

    /// Releases the workspace, then reports the outcome exactly once.
    async fn finish(
        mut self,
        result: Result<VideoResult, PipelineError>,
    ) -> Result<VideoResult, PipelineError> {
        let last_stage = self.stages.current();
        match &result {
            Ok(_) => {}
            Err(PipelineError::Cancelled) => self.stages.finish_with(PipelineStage::Cancelled),
            Err(_) => self.stages.finish_with(PipelineStage::Failed),
        }

        if let Some(mut workspace) = self.workspace.take() {
            if let Err(e) = workspace.cleanup() {
                warn!(root = %workspace.root().display(), error = %e, "Failed to remove workspace");
            }
        }

        match result {
            Ok(result) => {
                info!(
                    output = %result.output_path.display(),
                    frames = result.total_frames,
                    encoder = %result.encoder,
                    duration_ms = result.duration_ms,
                    "Video upscaling finished"
                );
                if self.job.open_output_dir {
                    self.events
                        .emit(PipelineEvent::RevealRequested {
                            directory: parent_dir(&result.output_path),
                        })
                        .await;
                }
                self.events
                    .emit(PipelineEvent::VideoFinished {
                        output: result.output_path.clone(),
                    })
                    .await;
                Ok(result)
            }
            Err(PipelineError::Cancelled) => {
                info!(stage = %last_stage, "Video upscaling cancelled");
                self.events
                    .emit(PipelineEvent::StageChanged {
                        stage: PipelineStage::Cancelled,
                    })
                    .await;
                self.events.emit(PipelineEvent::Cancelled).await;
                Err(PipelineError::Cancelled)
            }
            Err(e) => {
                error!(stage = %last_stage, error = %e, "Video upscaling failed");
                self.events
                    .emit(PipelineEvent::StageChanged {
                        stage: PipelineStage::Failed,
                    })
                    .await;
                self.events
                    .emit(PipelineEvent::Failed {
                        kind: e.kind(),
                        message: e.to_string(),
                    })
                    .await;
                Err(e)
            }
        }
    }

    fn checkpoint(&self) -> Result<(), PipelineError> {
        if self.cancel.is_cancelled() {
            Err(PipelineError::Cancelled)
        } else {
            Ok(())
        }
    }

    async fn enter(&mut self, stage: PipelineStage) -> Result<(), PipelineError> {
        self.checkpoint()?;
        self.stages.advance(stage)?;
        self.events.emit(PipelineEvent::StageChanged { stage }).await;
        Ok(())
    }

    async fn status(&self, message: &str) {
        self.events
            .emit(PipelineEvent::Status {
                message: message.to_string(),
            })
            .await;
    }

    /// Frame rate for the muxer. Only a failure to start ffprobe is an error;
    /// anything else falls back to the default rate.
    async fn probe_frame_rate(&self) -> Result<String, PipelineError> {
        self.checkpoint()?;
        let spec = commands::probe_frame_rate(&self.tools.ffprobe, &self.job.input_path);
        let mut handle = self
            .runner
            .start(&spec)
            .await
            .map_err(|e| PipelineError::metadata(e.to_string()))?;

        let probe_timeout = self.settings.probe_timeout;
        let outcome = tokio::select! {
            outcome = tokio::time::timeout(probe_timeout, handle.wait_with_output()) => outcome,
            _ = self.cancel.cancelled() => {
                handle.shutdown(self.settings.terminate_grace).await;
                return Err(PipelineError::Cancelled);
            }
        };

        let frame_rate = match outcome {
            Ok(completed) => {
                if !completed.exit.success() {
                    warn!(
                        code = ?completed.exit.code,
                        stderr = %completed.stderr.trim(),
                        "ffprobe failed, using default frame rate"
                    );
                }
                parse_frame_rate(&completed.stdout)
            }
            Err(_) => {
                warn!(
                    timeout_secs = self.settings.probe_timeout.as_secs(),
                    "Frame rate probe timed out, using default frame rate"
                );
                handle.shutdown(self.settings.terminate_grace).await;
                DEFAULT_FRAME_RATE.to_string()
            }
        };

        info!(frame_rate = %frame_rate, "Frame rate");
        Ok(frame_rate)
    }

    async fn extract_frames(&self, frame_dir: &Path) -> Result<usize, PipelineError> {
        let spec = commands::extract_frames(&self.tools.ffmpeg, &self.job.input_path, frame_dir);
        let completed =
            run_to_completion(self.runner, &spec, &self.cancel, self.settings.terminate_grace)
                .await?;
        if !completed.exit.success() {
            return Err(PipelineError::Extraction {
                code: completed.exit.code,
                stderr: completed.stderr.trim().to_string(),
            });
        }

        let frames = count_matching(frame_dir, FRAME_EXTENSION);
        if frames == 0 {
            return Err(PipelineError::Extraction {
                code: completed.exit.code,
                stderr: "no frames extracted".to_string(),
            });
        }
        info!(frames, "Extracted frames");
        Ok(frames)
    }

    /// Runs the enhancer over the whole frame directory while the watcher
    /// counts its output.
    async fn enhance_frames(
        &self,
        frame_dir: &Path,
        enhanced_dir: &Path,
    ) -> Result<usize, PipelineError> {
        let job = self.job;
        let extension = job.frame_format.enhancer_format();
        let total = count_matching(frame_dir, FRAME_EXTENSION);

        let spec = commands::enhance_frames(
            &self.tools.enhancer,
            frame_dir,
            enhanced_dir,
            &job.model_name,
            job.scale_factor,
            job.frame_format,
        );
        let mut handle = self.runner.start(&spec).await?;
        let mut watcher = ProgressWatcher::new(enhanced_dir, extension, total, self.settings.watch);
        let mut tail = OutputTail::new(TAIL_LINES);

        self.events.progress(0.0, format!("Processed 0/{total} frames"));

        let exit = loop {
            tokio::select! {
                event = handle.next_event() => match event {
                    ProcessEvent::Output(line) => {
                        if let Some(percent) = last_percentage(&line.text) {
                            // Informational only; file counts drive progress.
                            debug!(percent, "enhancer progress");
                        } else {
                            debug!(line = %line.text, "enhancer");
                            tail.push(line.text);
                        }
                    }
                    ProcessEvent::Exited(exit) => break exit,
                },
                watched = watcher.next_event(), if !watcher.is_stopped() => match watched {
                    Some(Ok(progress)) => self.report_frames(progress),
                    Some(Err(WatchError::Stalled { idle_secs, .. })) => {
                        error!(
                            processed = watcher.processed(),
                            total,
                            idle_secs,
                            "Enhancer stalled, shutting it down"
                        );
                        handle.shutdown(self.settings.terminate_grace).await;
                        return Err(PipelineError::StallTimeout { idle_secs });
                    }
                    None => {}
                },
                _ = self.cancel.cancelled() => {
                    watcher.stop();
                    handle.shutdown(self.settings.terminate_grace).await;
                    return Err(PipelineError::Cancelled);
                }
            }
        };

        if let Some(progress) = watcher.poll_now() {
            self.report_frames(progress);
        }
        watcher.stop();
        self.checkpoint()?;

        if !exit.success() {
            return Err(PipelineError::Enhancement {
                code: exit.code,
                output: tail.joined(),
            });
        }

        let actual = count_matching(enhanced_dir, extension);
        if actual != total {
            return Err(PipelineError::FrameCountMismatch {
                expected: total,
                actual,
            });
        }
        info!(frames = total, "Enhanced frames");
        Ok(total)
    }

    fn report_frames(&self, progress: ProgressEvent) {
        debug!(
            processed = progress.processed,
            total = progress.total,
            "Enhanced frame count"
        );
        self.events.progress(
            progress.percent(),
            format!("Processed {}/{} frames", progress.processed, progress.total),
        );
    }

    async fn select_encoder(&self) -> Result<VideoEncoder, PipelineError> {
        let spec = commands::list_encoders(&self.tools.ffmpeg);
        let completed =
            run_to_completion(self.runner, &spec, &self.cancel, self.settings.terminate_grace)
                .await?;

        let encoder = EncoderCapabilities::from_listing(&completed.stdout).preferred();
        if encoder != VideoEncoder::Libx264 {
            warn!(encoder = %encoder, "libx264 not available, falling back");
        }
        Ok(encoder)
    }

    async fn rebuild(
        &self,
        enhanced_dir: &Path,
        frame_rate: &str,
        encoder: VideoEncoder,
    ) -> Result<PathBuf, PipelineError> {
        let job = self.job;
        let output = job.output_path();
        let spec = commands::rebuild_video(
            &self.tools.ffmpeg,
            frame_rate,
            enhanced_dir,
            job.frame_format,
            &job.input_path,
            encoder,
            &output,
        );
        let completed =
            run_to_completion(self.runner, &spec, &self.cancel, self.settings.terminate_grace)
                .await?;
        if !completed.exit.success() {
            return Err(PipelineError::Rebuild {
                code: completed.exit.code,
                stderr: completed.stderr.trim().to_string(),
            });
        }
        Ok(output)
    }
}
