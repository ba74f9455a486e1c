use std::fmt;
use std::io::{self, IsTerminal};
use std::path::PathBuf;

use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tracing::{info, warn};

use crate::error::RunError;
use crate::settings::EffectiveSettings;
use crate::sink::PngSequenceSink;
use crate::source::discover_frames;
use crate::stage::writer::FrameOutcome;
use crate::stage::{PipelineConfig, PipelineOutputs, build_pipeline};

/// Everything needed to process one input directory.
pub struct ExecutionPlan {
    pub settings: EffectiveSettings,
    pub input: PathBuf,
    /// Show a progress bar and stop cleanly on Ctrl-C.
    pub interactive: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub processed: u64,
    pub skipped: u64,
    pub low_confidence: u64,
    /// Frames whose label came from scoring every template.
    pub fallback_classified: u64,
    pub cancelled: bool,
}

impl RunSummary {
    pub fn record(&mut self, outcome: &FrameOutcome) {
        match outcome {
            FrameOutcome::Written {
                alignment,
                exhaustive,
                ..
            } => {
                self.processed += 1;
                if alignment.is_low_confidence() {
                    self.low_confidence += 1;
                }
                if *exhaustive {
                    self.fallback_classified += 1;
                }
            }
            FrameOutcome::Skipped { .. } => self.skipped += 1,
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "processed {} frame(s), skipped {}, low-confidence {}, fallback-classified {}",
            self.processed, self.skipped, self.low_confidence, self.fallback_classified
        )?;
        if self.cancelled {
            f.write_str(" (interrupted)")?;
        }
        Ok(())
    }
}

pub async fn execute(plan: ExecutionPlan) -> Result<RunSummary, RunError> {
    let ExecutionPlan {
        settings,
        input,
        interactive,
    } = plan;

    let pipeline = PipelineConfig::from_settings(&settings)?;
    let frames = discover_frames(&input, &settings.input).map_err(|source| {
        RunError::Discovery {
            path: input.clone(),
            source,
        }
    })?;
    if frames.is_empty() {
        warn!(input = %input.display(), "no frames matched the input filters");
    } else {
        info!(frames = frames.len(), input = %input.display(), "discovered frames");
    }

    let sequence_dir = &settings.output.sequence_dir;
    let sink = PngSequenceSink::create(sequence_dir).map_err(|source| RunError::Sink {
        path: sequence_dir.clone(),
        source,
    })?;

    let PipelineOutputs {
        mut stream,
        total_frames,
        handle,
    } = build_pipeline(frames, &pipeline, Box::new(sink));

    if interactive {
        let handle = handle.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, finishing frames already in progress");
                handle.cancel();
            }
        });
    }

    let progress = progress_bar(total_frames.unwrap_or(0), interactive);
    let mut summary = RunSummary::default();
    while let Some(outcome) = stream.next().await {
        summary.record(&outcome);
        progress.set_message(outcome.meta().frame_id());
        progress.inc(1);
    }
    progress.finish_and_clear();

    summary.cancelled = handle.is_cancelled();
    info!(
        sequence = %sequence_dir.display(),
        processed = summary.processed,
        skipped = summary.skipped,
        "run finished"
    );
    Ok(summary)
}

fn progress_bar(total: u64, interactive: bool) -> ProgressBar {
    if !interactive || !io::stderr().is_terminal() {
        return ProgressBar::with_draw_target(Some(total), ProgressDrawTarget::hidden());
    }
    let progress = ProgressBar::new(total);
    progress.set_style(
        ProgressStyle::with_template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-"),
    );
    progress
}

#[cfg(test)]
mod tests {
    use super::*;
    use degrid_types::{AlignmentResult, CaptureTime, Confidence, FrameMeta, SubpointLabel};

    use crate::error::FrameError;

    fn meta() -> FrameMeta {
        FrameMeta {
            satellite: "32A".into(),
            capture: CaptureTime {
                year: 1977,
                day_of_year: 1,
                seconds_of_day: 0,
            },
            band: "VS".into(),
        }
    }

    fn written(confidence: Confidence, exhaustive: bool) -> FrameOutcome {
        FrameOutcome::Written {
            meta: meta(),
            label: SubpointLabel::new("5N"),
            alignment: AlignmentResult::identity(confidence),
            exhaustive,
            sequence_path: PathBuf::from("frame_000001.png"),
        }
    }

    #[test]
    fn summary_counts_outcomes() {
        let mut summary = RunSummary::default();
        summary.record(&written(Confidence::Normal, false));
        summary.record(&written(Confidence::Low, true));
        summary.record(&FrameOutcome::Skipped {
            meta: meta(),
            reason: FrameError::NoRecognizedText,
        });

        assert_eq!(
            summary,
            RunSummary {
                processed: 2,
                skipped: 1,
                low_confidence: 1,
                fallback_classified: 1,
                cancelled: false,
            }
        );
        assert_eq!(
            summary.to_string(),
            "processed 2 frame(s), skipped 1, low-confidence 1, fallback-classified 1"
        );
    }

    #[test]
    fn interrupted_runs_say_so() {
        let summary = RunSummary {
            cancelled: true,
            ..RunSummary::default()
        };
        assert!(summary.to_string().ends_with("(interrupted)"));
    }
}
