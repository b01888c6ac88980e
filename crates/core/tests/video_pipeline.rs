//! Video pipeline integration tests.
//!
//! These tests drive the video pipeline with a scripted runner:
//! - Stage order and the final event
//! - Frame rate probing and its fallbacks
//! - Extraction, enhancement, frame count and rebuild failures
//! - Stall detection and cancellation, including process shutdown
//! - Workspace cleanup on every path

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::mpsc;

use upscaler_core::{
    testing::{fixtures, Script, ScriptedRunner},
    ErrorKind, EventSink, ImageFormat, PipelineError, PipelineEvent, PipelineStage, ToolPaths,
    VideoJob, VideoPipeline, VideoResult, VideoSettings, WatchSettings,
};

const FRAMES: usize = 4;

/// Test helper wiring a video pipeline to a scripted runner whose tools all
/// succeed by default.
struct TestHarness {
    pipeline: Arc<VideoPipeline<ScriptedRunner>>,
    runner: ScriptedRunner,
    video_dir: TempDir,
    input: PathBuf,
}

impl TestHarness {
    async fn new() -> Self {
        Self::with_settings(FRAMES, Self::fast_settings()).await
    }

    async fn with_frames(frames: usize) -> Self {
        Self::with_settings(frames, Self::fast_settings()).await
    }

    fn fast_settings() -> VideoSettings {
        VideoSettings {
            watch: WatchSettings {
                poll_interval: Duration::from_millis(50),
                stall_timeout: Duration::from_secs(30),
            },
            ..VideoSettings::default()
        }
    }

    async fn with_settings(frames: usize, settings: VideoSettings) -> Self {
        let video_dir = TempDir::new().expect("Failed to create video dir");
        let input = video_dir.path().join("clip.mp4");
        std::fs::write(&input, b"not really a video").expect("Failed to write input");

        let runner = ScriptedRunner::new();
        runner
            .on_program("ffprobe", Script::success().stdout_line("30000/1001"))
            .await;
        runner
            .on(
                |s| s.has_arg("-qscale:v"),
                Script::success().with_files(fixtures::extract_frames(frames)),
            )
            .await;
        runner
            .on_program(
                "enhancer",
                Script::success()
                    .stderr_line("[0 llvmpipe] queueC=0[1]")
                    .with_files(fixtures::enhance_directory(None)),
            )
            .await;
        runner
            .on(
                |s| s.has_arg("-encoders"),
                Script::success()
                    .stdout_line(" V....D libx264              libx264 H.264 / AVC")
                    .stdout_line(" V.S... mpeg4                MPEG-4 part 2"),
            )
            .await;
        runner
            .on(
                |s| s.has_arg("-map"),
                Script::success().with_files(fixtures::write_last_arg()),
            )
            .await;

        let pipeline = VideoPipeline::new(
            Arc::new(runner.clone()),
            ToolPaths::new("enhancer", "ffmpeg", "ffprobe"),
            settings,
        );

        Self {
            pipeline: Arc::new(pipeline),
            runner,
            video_dir,
            input,
        }
    }

    fn job(&self) -> VideoJob {
        VideoJob::new(&self.input, "realesr-animevideov3-x2")
    }

    async fn run(
        &self,
        job: VideoJob,
    ) -> (Result<VideoResult, PipelineError>, Vec<PipelineEvent>) {
        let (tx, mut rx) = mpsc::channel(1024);
        let result = self.pipeline.run(job, tx).await;
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        (result, events)
    }

    fn workspaces(&self) -> Vec<PathBuf> {
        workspaces_in(self.video_dir.path())
    }

    async fn mux_args(&self) -> Vec<String> {
        self.runner
            .commands()
            .await
            .into_iter()
            .find(|c| c.spec.has_arg("-map"))
            .map(|c| c.spec.args)
            .expect("rebuild was not launched")
    }

    /// Cancels the run as soon as the enhancer has been started.
    fn cancel_once_enhancing(&self) -> tokio::task::JoinHandle<()> {
        let runner = self.runner.clone();
        let token = self.pipeline.cancel_token();
        tokio::spawn(async move {
            while runner.commands_for("enhancer").await.is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            token.cancel();
        })
    }
}

fn workspaces_in(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .map(|e| e.path())
                .filter(|p| {
                    p.file_name()
                        .map(|n| n.to_string_lossy().starts_with("tmp_"))
                        .unwrap_or(false)
                })
                .collect()
        })
        .unwrap_or_default()
}

fn stages(events: &[PipelineEvent]) -> Vec<PipelineStage> {
    events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::StageChanged { stage } => Some(*stage),
            _ => None,
        })
        .collect()
}

fn progress_percents(events: &[PipelineEvent]) -> Vec<f64> {
    events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::Progress { percent, .. } => Some(*percent),
            _ => None,
        })
        .collect()
}

fn terminal_events(events: &[PipelineEvent]) -> Vec<&PipelineEvent> {
    events.iter().filter(|e| e.is_terminal()).collect()
}

// =============================================================================
// Success path
// =============================================================================

#[tokio::test]
async fn test_successful_run() {
    let harness = TestHarness::new().await;

    let (result, events) = harness.run(harness.job()).await;
    let result = result.expect("run failed");

    assert_eq!(
        result.output_path,
        harness.video_dir.path().join("clip_enhanced.mp4")
    );
    assert!(result.output_path.exists());
    assert_eq!(result.frame_rate, "29.97");
    assert_eq!(result.total_frames, FRAMES);
    assert_eq!(result.encoder, "libx264");

    assert_eq!(
        stages(&events),
        vec![
            PipelineStage::Probing,
            PipelineStage::ExtractingFrames,
            PipelineStage::EnhancingFrames,
            PipelineStage::Rebuilding,
            PipelineStage::Done,
        ]
    );
    assert_eq!(terminal_events(&events).len(), 1);
    assert_eq!(
        events.last(),
        Some(&PipelineEvent::VideoFinished {
            output: result.output_path.clone()
        })
    );

    assert!(harness.workspaces().is_empty(), "workspace left behind");
    assert!(!harness.pipeline.is_running());
}

#[tokio::test]
async fn test_commands_follow_tool_contracts() {
    let harness = TestHarness::new().await;
    let job = harness.job().with_scale(3);

    let (result, _) = harness.run(job).await;
    result.expect("run failed");

    let commands = harness.runner.commands().await;
    let programs: Vec<String> = commands.iter().map(|c| c.spec.program_name()).collect();
    assert_eq!(
        programs,
        vec!["ffprobe", "ffmpeg", "enhancer", "ffmpeg", "ffmpeg"]
    );

    let extract = &commands[1].spec;
    let frames_arg = extract.args.last().unwrap();
    assert!(frames_arg.ends_with("frames/frame%08d.png"));

    let enhance = &commands[2].spec;
    assert_eq!(enhance.arg_after("-n"), Some("realesr-animevideov3-x2"));
    assert_eq!(enhance.arg_after("-s"), Some("3"));
    assert_eq!(enhance.arg_after("-f"), Some("png"));
    assert!(enhance.arg_after("-i").unwrap().ends_with("frames"));
    assert!(enhance.arg_after("-o").unwrap().ends_with("enhanced"));

    let mux = harness.mux_args().await;
    assert_eq!(mux[..3], ["-y", "-r", "29.97"]);
    assert!(mux.contains(&"1:a:0?".to_string()));
    assert!(mux.contains(&"libx264".to_string()));
    assert!(mux.contains(&"yuv420p".to_string()));
}

#[tokio::test]
async fn test_frame_format_flows_through_stages() {
    let harness = TestHarness::new().await;
    let job = harness.job().with_frame_format(ImageFormat::Webp);

    let (result, _) = harness.run(job).await;
    result.expect("run failed");

    let enhancer = &harness.runner.commands_for("enhancer").await[0];
    assert_eq!(enhancer.spec.arg_after("-f"), Some("webp"));
    let mux = harness.mux_args().await;
    assert!(mux.iter().any(|a| a.ends_with("enhanced/frame%08d.webp")));
}

#[tokio::test]
async fn test_jpeg_frame_format_uses_jpg_files() {
    let harness = TestHarness::new().await;
    let job = harness.job().with_frame_format(ImageFormat::Jpeg);

    let (result, _) = harness.run(job).await;
    assert_eq!(result.expect("run failed").total_frames, FRAMES);

    let enhancer = &harness.runner.commands_for("enhancer").await[0];
    assert_eq!(enhancer.spec.arg_after("-f"), Some("jpg"));
    let mux = harness.mux_args().await;
    assert!(mux.iter().any(|a| a.ends_with("enhanced/frame%08d.jpg")));
    assert!(harness.workspaces().is_empty());
}

#[tokio::test]
async fn test_reveal_requested_before_finish() {
    let harness = TestHarness::new().await;
    let job = harness.job().with_open_output_dir(true);

    let (result, events) = harness.run(job).await;
    result.expect("run failed");

    let n = events.len();
    assert_eq!(
        events[n - 2],
        PipelineEvent::RevealRequested {
            directory: harness.video_dir.path().to_path_buf()
        }
    );
    assert!(matches!(events[n - 1], PipelineEvent::VideoFinished { .. }));
}

#[tokio::test]
async fn test_mpeg4_fallback_without_libx264() {
    let harness = TestHarness::new().await;
    harness
        .runner
        .on(
            |s| s.has_arg("-encoders"),
            Script::success().stdout_line(" V.S... mpeg4                MPEG-4 part 2"),
        )
        .await;

    let (result, _) = harness.run(harness.job()).await;
    assert_eq!(result.expect("run failed").encoder, "mpeg4");

    let mux = harness.mux_args().await;
    assert!(mux.contains(&"mpeg4".to_string()));
    assert!(!mux.contains(&"libx264".to_string()));
    let q = mux.iter().position(|a| a == "-q:v").expect("missing -q:v");
    assert_eq!(mux[q + 1], "2");
}

#[tokio::test]
async fn test_workspace_root_override() {
    let scratch = TempDir::new().unwrap();
    let settings = VideoSettings {
        workspace_root: Some(scratch.path().to_path_buf()),
        ..TestHarness::fast_settings()
    };
    let harness = TestHarness::with_settings(FRAMES, settings).await;

    let (result, _) = harness.run(harness.job()).await;
    result.expect("run failed");

    let extract = harness
        .runner
        .commands()
        .await
        .into_iter()
        .find(|c| c.spec.has_arg("-qscale:v"))
        .unwrap();
    assert!(extract.spec.args.last().unwrap().starts_with(&*scratch.path().to_string_lossy()));
    assert!(workspaces_in(scratch.path()).is_empty());
    assert!(harness.workspaces().is_empty());
}

// =============================================================================
// Progress
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_progress_is_monotonic_and_bounded() {
    let harness = TestHarness::with_frames(8).await;
    harness
        .runner
        .on_program(
            "enhancer",
            Script::success().with_steps(8, Duration::from_millis(200), fixtures::enhance_frame),
        )
        .await;

    let (result, events) = harness.run(harness.job()).await;
    result.expect("run failed");

    let percents = progress_percents(&events);
    assert!(percents.len() >= 3, "too few progress events: {percents:?}");
    assert!(percents.windows(2).all(|w| w[0] <= w[1]), "{percents:?}");
    assert!(percents.iter().all(|p| (0.0..=100.0).contains(p)));
    assert_eq!(percents.first(), Some(&0.0));
    assert_eq!(percents.last(), Some(&100.0));

    let statuses: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::Progress { status, .. } => Some(status.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(statuses.last(), Some(&"Processed 8/8 frames"));
}

// =============================================================================
// Probing
// =============================================================================

#[tokio::test]
async fn test_invalid_frame_rate_falls_back_to_30() {
    for output in ["0/1", "N/A", ""] {
        let harness = TestHarness::new().await;
        harness
            .runner
            .on_program("ffprobe", Script::success().stdout_line(output))
            .await;

        let (result, _) = harness.run(harness.job()).await;
        assert_eq!(result.expect("run failed").frame_rate, "30");
        assert_eq!(harness.mux_args().await[..3], ["-y", "-r", "30"]);
    }
}

#[tokio::test(start_paused = true)]
async fn test_probe_timeout_falls_back_to_30() {
    let harness = TestHarness::new().await;
    harness.runner.on_program("ffprobe", Script::hang()).await;

    let (result, _) = harness.run(harness.job()).await;
    assert_eq!(result.expect("run failed").frame_rate, "30");

    let probe = &harness.runner.commands_for("ffprobe").await[0];
    assert!(probe.was_terminated());
    assert!(probe.exit.is_some());
}

#[tokio::test]
async fn test_probe_launch_failure_is_metadata_error() {
    let harness = TestHarness::new().await;
    harness
        .runner
        .on_program("ffprobe", Script::launch_failure())
        .await;

    let (result, events) = harness.run(harness.job()).await;
    let err = result.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Metadata);
    assert!(matches!(
        events.last(),
        Some(PipelineEvent::Failed {
            kind: ErrorKind::Metadata,
            ..
        })
    ));
    assert!(harness.workspaces().is_empty());
}

#[tokio::test]
async fn test_missing_input() {
    let harness = TestHarness::new().await;
    let job = VideoJob::new(
        harness.video_dir.path().join("missing.mp4"),
        "realesr-animevideov3-x2",
    );

    let (result, events) = harness.run(job).await;
    assert!(matches!(result, Err(PipelineError::InputNotFound { .. })));
    assert!(harness.runner.commands().await.is_empty());
    assert!(harness.workspaces().is_empty());
    assert_eq!(
        stages(&events),
        vec![PipelineStage::Probing, PipelineStage::Failed]
    );
}

// =============================================================================
// Stage failures
// =============================================================================

#[tokio::test]
async fn test_extraction_failure_carries_stderr() {
    let harness = TestHarness::new().await;
    harness
        .runner
        .on(
            |s| s.has_arg("-qscale:v"),
            Script::exit(1).stderr_line("clip.mp4: Invalid data found when processing input"),
        )
        .await;

    let (result, events) = harness.run(harness.job()).await;
    match result {
        Err(PipelineError::Extraction { code, stderr }) => {
            assert_eq!(code, Some(1));
            assert!(stderr.contains("Invalid data found"));
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(harness.runner.commands_for("enhancer").await.is_empty());
    assert_eq!(terminal_events(&events).len(), 1);
    assert!(harness.workspaces().is_empty());
}

#[tokio::test]
async fn test_zero_extracted_frames_is_extraction_error() {
    let harness = TestHarness::with_frames(0).await;

    let (result, _) = harness.run(harness.job()).await;
    match result {
        Err(PipelineError::Extraction { stderr, .. }) => {
            assert!(stderr.contains("no frames extracted"));
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(harness.runner.commands_for("enhancer").await.is_empty());
}

#[tokio::test]
async fn test_enhancer_failure_carries_output() {
    let harness = TestHarness::new().await;
    harness
        .runner
        .on_program(
            "enhancer",
            Script::exit(255).stderr_line("vkCreateInstance failed -9"),
        )
        .await;

    let (result, events) = harness.run(harness.job()).await;
    match result {
        Err(PipelineError::Enhancement { code, output }) => {
            assert_eq!(code, Some(255));
            assert!(output.contains("vkCreateInstance failed"));
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(matches!(
        events.last(),
        Some(PipelineEvent::Failed {
            kind: ErrorKind::Enhancement,
            ..
        })
    ));
    assert!(harness.workspaces().is_empty());
}

#[tokio::test]
async fn test_frame_count_mismatch_despite_exit_zero() {
    let harness = TestHarness::new().await;
    harness
        .runner
        .on_program(
            "enhancer",
            Script::success().with_files(fixtures::enhance_directory(Some(FRAMES - 1))),
        )
        .await;

    let (result, _) = harness.run(harness.job()).await;
    assert!(matches!(
        result,
        Err(PipelineError::FrameCountMismatch {
            expected: FRAMES,
            actual
        }) if actual == FRAMES - 1
    ));
    assert!(harness
        .runner
        .commands()
        .await
        .iter()
        .all(|c| !c.spec.has_arg("-map")));
    assert!(harness.workspaces().is_empty());
}

#[tokio::test]
async fn test_rebuild_failure() {
    let harness = TestHarness::new().await;
    harness
        .runner
        .on(
            |s| s.has_arg("-map"),
            Script::exit(1).stderr_line("Conversion failed!"),
        )
        .await;

    let (result, events) = harness.run(harness.job()).await;
    match result {
        Err(PipelineError::Rebuild { code, stderr }) => {
            assert_eq!(code, Some(1));
            assert_eq!(stderr, "Conversion failed!");
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(stages(&events).last(), Some(&PipelineStage::Failed));
    assert!(harness.workspaces().is_empty());
}

// =============================================================================
// Stall and cancellation
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_stall_times_out_and_terminates_enhancer() {
    let harness = TestHarness::new().await;
    harness
        .runner
        .on_program(
            "enhancer",
            Script::hang().with_files(fixtures::enhance_directory(Some(2))),
        )
        .await;

    let started = tokio::time::Instant::now();
    let (result, events) = harness.run(harness.job()).await;

    assert!(matches!(
        result,
        Err(PipelineError::StallTimeout { idle_secs: 30 })
    ));
    assert!(started.elapsed() >= Duration::from_secs(30));

    let enhancer = &harness.runner.commands_for("enhancer").await[0];
    assert!(enhancer.was_terminated());
    assert_eq!(harness.runner.running_count().await, 0);
    assert!(harness.workspaces().is_empty());
    assert!(matches!(
        events.last(),
        Some(PipelineEvent::Failed {
            kind: ErrorKind::StallTimeout,
            ..
        })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_stubborn_enhancer_is_killed_after_grace() {
    let harness = TestHarness::new().await;
    harness
        .runner
        .on_program("enhancer", Script::hang().ignoring_terminate())
        .await;

    let (result, _) = harness.run(harness.job()).await;
    assert!(matches!(result, Err(PipelineError::StallTimeout { .. })));

    let enhancer = &harness.runner.commands_for("enhancer").await[0];
    assert!(enhancer.was_terminated());
    assert!(enhancer.was_killed());
    assert_eq!(harness.runner.running_count().await, 0);
}

#[tokio::test]
async fn test_cancel_during_enhancement() {
    let harness = TestHarness::new().await;
    harness.runner.on_program("enhancer", Script::hang()).await;

    let canceller = harness.cancel_once_enhancing();
    let (result, events) = harness.run(harness.job()).await;
    canceller.await.unwrap();

    assert!(matches!(result, Err(PipelineError::Cancelled)));
    assert_eq!(harness.runner.running_count().await, 0);
    assert!(harness.runner.commands_for("enhancer").await[0].was_terminated());
    assert!(harness.workspaces().is_empty());

    assert_eq!(
        stages(&events).last(),
        Some(&PipelineStage::Cancelled)
    );
    assert_eq!(events.last(), Some(&PipelineEvent::Cancelled));
    assert_eq!(terminal_events(&events).len(), 1);
    assert!(harness
        .runner
        .commands()
        .await
        .iter()
        .all(|c| !c.spec.has_arg("-map")));
}

#[tokio::test]
async fn test_cancel_before_probe_completes() {
    let harness = TestHarness::new().await;
    harness.runner.on_program("ffprobe", Script::hang()).await;

    let runner = harness.runner.clone();
    let token = harness.pipeline.cancel_token();
    let canceller = tokio::spawn(async move {
        while runner.commands_for("ffprobe").await.is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        token.cancel();
    });

    let (result, _) = harness.run(harness.job()).await;
    canceller.await.unwrap();

    assert!(matches!(result, Err(PipelineError::Cancelled)));
    assert_eq!(harness.runner.commands().await.len(), 1);
    assert_eq!(harness.runner.running_count().await, 0);
    assert!(harness.workspaces().is_empty());
}

#[tokio::test]
async fn test_extraction_finishing_after_cancel_is_discarded() {
    let harness = TestHarness::new().await;
    let token = harness.pipeline.cancel_token();
    let extract = fixtures::extract_frames(FRAMES);
    harness
        .runner
        .on(
            |s| s.has_arg("-qscale:v"),
            Script::success().with_files(move |spec| {
                token.cancel();
                extract(spec)
            }),
        )
        .await;

    let (result, events) = harness.run(harness.job()).await;

    assert!(matches!(result, Err(PipelineError::Cancelled)));
    let extraction = harness
        .runner
        .commands()
        .await
        .into_iter()
        .find(|c| c.spec.has_arg("-qscale:v"))
        .expect("extraction was not launched");
    assert_eq!(extraction.exit.map(|e| e.code), Some(Some(0)));

    assert!(harness.runner.commands_for("enhancer").await.is_empty());
    assert!(harness
        .runner
        .commands()
        .await
        .iter()
        .all(|c| !c.spec.has_arg("-map") && !c.spec.has_arg("-encoders")));
    assert!(harness.workspaces().is_empty());
    assert_eq!(events.last(), Some(&PipelineEvent::Cancelled));
    assert!(!stages(&events).contains(&PipelineStage::EnhancingFrames));
}

#[tokio::test]
async fn test_enhancer_finishing_after_cancel_is_discarded() {
    let harness = TestHarness::new().await;
    let token = harness.pipeline.cancel_token();
    let enhance = fixtures::enhance_directory(None);
    harness
        .runner
        .on_program(
            "enhancer",
            Script::success().with_files(move |spec| {
                token.cancel();
                enhance(spec)
            }),
        )
        .await;

    let (result, events) = harness.run(harness.job()).await;

    assert!(matches!(result, Err(PipelineError::Cancelled)));
    let enhancer = &harness.runner.commands_for("enhancer").await[0];
    assert_eq!(enhancer.exit.map(|e| e.code), Some(Some(0)));
    assert!(harness
        .runner
        .commands()
        .await
        .iter()
        .all(|c| !c.spec.has_arg("-map")));
    assert_eq!(harness.runner.running_count().await, 0);
    assert!(harness.workspaces().is_empty());
    assert_eq!(stages(&events).last(), Some(&PipelineStage::Cancelled));
}

#[tokio::test]
async fn test_second_run_rejected_while_running() {
    let harness = TestHarness::new().await;
    harness.runner.on_program("enhancer", Script::hang()).await;

    let pipeline = Arc::clone(&harness.pipeline);
    let job = harness.job();
    let first = tokio::spawn(async move { pipeline.run(job, EventSink::none()).await });

    while harness.runner.commands_for("enhancer").await.is_empty() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(harness.pipeline.is_running());

    let second = harness.pipeline.run(harness.job(), EventSink::none()).await;
    assert!(matches!(second, Err(PipelineError::AlreadyRunning)));

    harness.pipeline.cancel();
    let first = first.await.unwrap();
    assert!(matches!(first, Err(PipelineError::Cancelled)));
    assert!(!harness.pipeline.is_running());

    // A fresh token is used for the next run.
    harness
        .runner
        .on_program(
            "enhancer",
            Script::success().with_files(fixtures::enhance_directory(None)),
        )
        .await;
    let (third, _) = harness.run(harness.job()).await;
    assert!(third.is_ok());
}
