//! Printing pipeline events to the terminal.

use tokio::sync::mpsc;
use tracing::warn;

use upscaler_core::{reveal::reveal_directory, PipelineEvent};

/// Prints events until the pipeline drops its sender.
///
/// `RevealRequested` opens the folder in the file manager in both modes.
pub async fn print_events(mut rx: mpsc::Receiver<PipelineEvent>, json: bool) {
    while let Some(event) = rx.recv().await {
        if let PipelineEvent::RevealRequested { directory } = &event {
            reveal_directory(directory);
        }

        if json {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!("Failed to serialize event: {}", e),
            }
            continue;
        }

        match &event {
            PipelineEvent::Failed { .. } => eprintln!("{}", describe(&event)),
            _ => println!("{}", describe(&event)),
        }
    }
}

/// One human-readable line for `event`.
pub fn describe(event: &PipelineEvent) -> String {
    match event {
        PipelineEvent::StageChanged { stage } => format!("==> {stage}"),
        PipelineEvent::Status { message } => message.clone(),
        PipelineEvent::Progress { percent, status } => format!("[{percent:5.1}%] {status}"),
        PipelineEvent::FileCompleted {
            index,
            total,
            output,
            ..
        } => format!("({}/{}) {}", index + 1, total, output.display()),
        PipelineEvent::ImagesFinished { manifest } => {
            format!("Done: {} image(s) upscaled", manifest.len())
        }
        PipelineEvent::VideoFinished { output } => format!("Done: {}", output.display()),
        PipelineEvent::RevealRequested { directory } => {
            format!("Opening {}", directory.display())
        }
        PipelineEvent::Failed { message, .. } => format!("Error: {message}"),
        PipelineEvent::Cancelled => "Cancelled".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use upscaler_core::{ErrorKind, OutputManifest, PipelineStage};

    #[test]
    fn test_describe_progress() {
        let event = PipelineEvent::Progress {
            percent: 7.31,
            status: "Processed 29/400 frames".to_string(),
        };
        assert_eq!(describe(&event), "[  7.3%] Processed 29/400 frames");
    }

    #[test]
    fn test_describe_file_completed_is_one_based() {
        let event = PipelineEvent::FileCompleted {
            index: 0,
            total: 2,
            input: PathBuf::from("/pics/a.png"),
            output: PathBuf::from("/pics/a-ENLARGE.png"),
        };
        assert_eq!(describe(&event), "(1/2) /pics/a-ENLARGE.png");
    }

    #[test]
    fn test_describe_terminal_events() {
        let mut manifest = OutputManifest::new();
        manifest.push(PathBuf::from("a-ENLARGE.png"));
        assert_eq!(
            describe(&PipelineEvent::ImagesFinished { manifest }),
            "Done: 1 image(s) upscaled"
        );
        assert_eq!(
            describe(&PipelineEvent::Failed {
                kind: ErrorKind::NoInputs,
                message: "No input files".to_string(),
            }),
            "Error: No input files"
        );
        assert_eq!(describe(&PipelineEvent::Cancelled), "Cancelled");
        assert!(describe(&PipelineEvent::StageChanged {
            stage: PipelineStage::Rebuilding
        })
        .starts_with("==> "));
    }
}
