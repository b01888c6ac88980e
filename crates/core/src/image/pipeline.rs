//! Sequential image queue: enhance, then transcode when needed.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::commands::{self, ImageOutputs};
use crate::models;
use crate::pipeline::{
    parent_dir, run_to_completion, EventSink, ImageFormat, ImageJob, OutputManifest, OutputTail,
    PipelineError, PipelineEvent, RunControl,
};
use crate::process::{CommandSpec, ProcessEvent, ProcessExit, ProcessRunner, ToolPaths};
use crate::progress::parse_percentages;

const DEFAULT_TERMINATE_GRACE: Duration = Duration::from_secs(1);

/// Enhancer lines kept for error messages.
const TAIL_LINES: usize = 20;

/// Removes the enhancer's intermediate file on every exit path.
struct TempFile(PathBuf);

impl Drop for TempFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.0) {
            Ok(()) => debug!(path = %self.0.display(), "Removed temporary image"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %self.0.display(), error = %e, "Failed to remove temporary image")
            }
        }
    }
}

/// Upscales a list of images one at a time.
///
/// Each input is enhanced into `<stem>_temp.png` next to it and then either
/// renamed (PNG) or transcoded to `<stem>-ENLARGE.<ext>`. The first error
/// stops the whole queue.
pub struct ImagePipeline<R: ProcessRunner> {
    runner: Arc<R>,
    tools: ToolPaths,
    terminate_grace: Duration,
    control: RunControl,
}

impl<R: ProcessRunner> ImagePipeline<R> {
    pub fn new(runner: Arc<R>, tools: ToolPaths) -> Self {
        Self {
            runner,
            tools,
            terminate_grace: DEFAULT_TERMINATE_GRACE,
            control: RunControl::default(),
        }
    }

    /// Time a tool gets to exit after a terminate request before it is killed.
    pub fn with_terminate_grace(mut self, grace: Duration) -> Self {
        self.terminate_grace = grace;
        self
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

    /// Processes every input of `job` in order.
    ///
    /// Emits one `FileCompleted` per finished input, then either
    /// `ImagesFinished` with the manifest, `Failed`, or `Cancelled`.
    pub async fn run(
        &self,
        job: ImageJob,
        events: impl Into<EventSink>,
    ) -> Result<OutputManifest, PipelineError> {
        let events = events.into();
        let (_guard, cancel) = match self.control.begin() {
            Ok(run) => run,
            Err(e) => {
                warn!("Image pipeline is already running");
                report_failure(&events, &e).await;
                return Err(e);
            }
        };

        let started = Instant::now();
        info!(
            inputs = job.inputs.len(),
            model = %job.model_name,
            format = %job.output_format,
            "Starting image upscaling"
        );
        models::warn_if_unknown(&job.model_name);

        match self.process_queue(&job, &events, &cancel).await {
            Ok(manifest) => {
                info!(
                    outputs = manifest.len(),
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Image upscaling finished"
                );
                if job.open_output_dir {
                    if let Some(last) = manifest.last() {
                        events
                            .emit(PipelineEvent::RevealRequested {
                                directory: parent_dir(last),
                            })
                            .await;
                    }
                }
                events
                    .emit(PipelineEvent::ImagesFinished {
                        manifest: manifest.clone(),
                    })
                    .await;
                Ok(manifest)
            }
            Err(e) => {
                report_failure(&events, &e).await;
                Err(e)
            }
        }
    }

    async fn process_queue(
        &self,
        job: &ImageJob,
        events: &EventSink,
        cancel: &CancellationToken,
    ) -> Result<OutputManifest, PipelineError> {
        if job.inputs.is_empty() {
            return Err(PipelineError::NoInputs);
        }

        let total = job.inputs.len();
        let mut manifest = OutputManifest::new();

        for (index, input) in job.inputs.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }

            events
                .emit(PipelineEvent::Status {
                    message: format!(
                        "Processing file {}/{}: {}",
                        index + 1,
                        total,
                        input.display()
                    ),
                })
                .await;

            let output = self
                .process_one(job, index, total, input, events, cancel)
                .await?;

            info!(
                input = %input.display(),
                output = %output.display(),
                "Image upscaled"
            );
            manifest.push(output.clone());
            events
                .emit(PipelineEvent::FileCompleted {
                    index,
                    total,
                    input: input.clone(),
                    output,
                })
                .await;
        }

        Ok(manifest)
    }

    async fn process_one(
        &self,
        job: &ImageJob,
        index: usize,
        total: usize,
        input: &Path,
        events: &EventSink,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, PipelineError> {
        if !input.exists() {
            return Err(PipelineError::InputNotFound {
                path: input.to_path_buf(),
            });
        }

        let outputs = ImageOutputs::for_input(input, job.output_format);
        if !outputs.dir.exists() {
            tokio::fs::create_dir_all(&outputs.dir)
                .await
                .map_err(|source| PipelineError::DirectoryCreate {
                    path: outputs.dir.clone(),
                    source,
                })?;
        }

        let _temp = TempFile(outputs.temp.clone());

        let spec = commands::enhance(&self.tools.enhancer, input, &outputs.temp, &job.model_name);
        let (exit, output) = self.enhance(&spec, index, total, events, cancel).await?;
        if !exit.success() {
            return Err(PipelineError::Enhancement {
                code: exit.code,
                output,
            });
        }

        match commands::transcode(
            &self.tools.ffmpeg,
            &outputs.temp,
            &outputs.final_path,
            job.output_format,
        ) {
            None => {
                tokio::fs::rename(&outputs.temp, &outputs.final_path)
                    .await
                    .map_err(|source| PipelineError::Rename {
                        from: outputs.temp.clone(),
                        to: outputs.final_path.clone(),
                        source,
                    })?;
            }
            Some(spec) => {
                self.transcode(&spec, &outputs, job.output_format, cancel)
                    .await?;
            }
        }

        Ok(outputs.final_path)
    }

    /// Runs the enhancer, turning printed percentages into overall progress.
    async fn enhance(
        &self,
        spec: &CommandSpec,
        index: usize,
        total: usize,
        events: &EventSink,
        cancel: &CancellationToken,
    ) -> Result<(ProcessExit, String), PipelineError> {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let mut handle = self.runner.start(spec).await?;
        let mut tail = OutputTail::new(TAIL_LINES);
        let status = format!("Processing file {}/{}", index + 1, total);

        loop {
            tokio::select! {
                event = handle.next_event() => match event {
                    ProcessEvent::Output(line) => {
                        let percentages = parse_percentages(&line.text);
                        if percentages.is_empty() {
                            debug!(line = %line.text, "enhancer");
                            tail.push(line.text);
                        }
                        for current in percentages {
                            let overall = (index as f64 * 100.0 + current) / total as f64;
                            events.progress(overall, status.clone());
                        }
                    }
                    ProcessEvent::Exited(exit) => {
                        if cancel.is_cancelled() {
                            return Err(PipelineError::Cancelled);
                        }
                        return Ok((exit, tail.joined()));
                    }
                },
                _ = cancel.cancelled() => {
                    handle.shutdown(self.terminate_grace).await;
                    return Err(PipelineError::Cancelled);
                }
            }
        }
    }

    /// One transcode, plus the scaled-down retry for JPEG targets.
    async fn transcode(
        &self,
        spec: &CommandSpec,
        outputs: &ImageOutputs,
        format: ImageFormat,
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError> {
        let completed =
            run_to_completion(self.runner.as_ref(), spec, cancel, self.terminate_grace).await?;
        if completed.exit.success() {
            return Ok(());
        }

        if !format.is_jpeg() {
            return Err(PipelineError::Transcode {
                format,
                code: completed.exit.code,
                stderr: completed.stderr,
                fallback_attempted: false,
            });
        }

        warn!(
            output = %outputs.final_path.display(),
            code = ?completed.exit.code,
            "JPEG encode failed, retrying at reduced resolution"
        );
        let fallback =
            commands::jpeg_fallback(&self.tools.ffmpeg, &outputs.temp, &outputs.final_path);
        let completed =
            run_to_completion(self.runner.as_ref(), &fallback, cancel, self.terminate_grace)
                .await?;
        if completed.exit.success() {
            return Ok(());
        }

        Err(PipelineError::Transcode {
            format,
            code: completed.exit.code,
            stderr: completed.stderr,
            fallback_attempted: true,
        })
    }
}

impl<R: ProcessRunner> Drop for ImagePipeline<R> {
    fn drop(&mut self) {
        self.control.cancel();
    }
}

async fn report_failure(events: &EventSink, err: &PipelineError) {
    match err {
        PipelineError::Cancelled => {
            info!("Image upscaling cancelled");
            events.emit(PipelineEvent::Cancelled).await;
        }
        err => {
            error!(error = %err, "Image upscaling failed");
            events
                .emit(PipelineEvent::Failed {
                    kind: err.kind(),
                    message: err.to_string(),
                })
                .await;
        }
    }
}
