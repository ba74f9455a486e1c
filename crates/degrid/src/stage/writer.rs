use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use degrid_types::{AlignmentResult, FrameMeta, SubpointLabel};
use futures_util::StreamExt;
use image::{GrayImage, RgbImage};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::warn;

use super::StreamBundle;
use super::heal::{HealOutcome, HealedFrame};
use crate::background::with_alpha;
use crate::error::FrameError;
use crate::settings::OutputSettings;
use crate::sink::FrameSink;

const WRITER_CHANNEL_CAPACITY: usize = 4;

pub const ALIGNED_IMAGE: &str = "aligned_with_grid";
pub const MARKED_IMAGE: &str = "artifact_marked";
pub const ALIGNMENT_RECORD: &str = "alignment.json";

#[derive(Debug)]
pub enum FrameOutcome {
    Written {
        meta: FrameMeta,
        label: SubpointLabel,
        alignment: AlignmentResult,
        exhaustive: bool,
        sequence_path: PathBuf,
    },
    Skipped {
        meta: FrameMeta,
        reason: FrameError,
    },
}

impl FrameOutcome {
    pub fn meta(&self) -> &FrameMeta {
        match self {
            FrameOutcome::Written { meta, .. } | FrameOutcome::Skipped { meta, .. } => meta,
        }
    }
}

#[derive(Serialize)]
struct AlignmentRecord<'a> {
    frame: String,
    label: &'a str,
    #[serde(flatten)]
    alignment: &'a AlignmentResult,
    exhaustive: bool,
    recenter: Option<[f32; 2]>,
    variants: Vec<VariantRecord<'a>>,
}

#[derive(Serialize)]
struct VariantRecord<'a> {
    backend: &'a str,
    file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    substituted_by: Option<&'static str>,
}

/// The single consumer of healed frames: per-frame artifacts plus the ordered sequence.
pub struct FrameWriter {
    output: OutputSettings,
    sink: Box<dyn FrameSink>,
}

impl FrameWriter {
    pub fn new(output: OutputSettings, sink: Box<dyn FrameSink>) -> Self {
        Self { output, sink }
    }

    pub fn attach(self, input: StreamBundle<HealOutcome>) -> StreamBundle<FrameOutcome> {
        let StreamBundle {
            mut stream,
            total_frames,
        } = input;

        let (in_tx, mut in_rx) = mpsc::channel::<HealOutcome>(WRITER_CHANNEL_CAPACITY);
        let (out_tx, out_rx) = mpsc::channel::<FrameOutcome>(WRITER_CHANNEL_CAPACITY);

        tokio::spawn(async move {
            while let Some(outcome) = stream.next().await {
                if in_tx.send(outcome).await.is_err() {
                    break;
                }
            }
        });

        let Self { output, mut sink } = self;
        tokio::task::spawn_blocking(move || {
            while let Some(HealOutcome { meta, result }) = in_rx.blocking_recv() {
                let written = result.and_then(|healed| write_frame(&output, &mut *sink, healed));
                let outcome = match written {
                    Ok(outcome) => outcome,
                    Err(reason) => {
                        warn!(frame = %meta.frame_id(), reason = %reason, "frame skipped");
                        FrameOutcome::Skipped { meta, reason }
                    }
                };
                if out_tx.blocking_send(outcome).is_err() {
                    break;
                }
            }
            if let Err(err) = sink.finish() {
                warn!(error = %err, "failed to finalize output sequence");
            }
        });

        let stream = Box::pin(futures_util::stream::unfold(out_rx, |mut receiver| async {
            receiver.recv().await.map(|item| (item, receiver))
        }));

        StreamBundle::new(stream, total_frames)
    }
}

fn write_frame(
    output: &OutputSettings,
    sink: &mut dyn FrameSink,
    healed: HealedFrame,
) -> Result<FrameOutcome, FrameError> {
    let frame_id = healed.meta.frame_id();
    let dir = output.dir.join(&frame_id);
    fs::create_dir_all(&dir).map_err(|source| FrameError::Io {
        path: dir.clone(),
        source,
    })?;

    let alpha = healed.alpha.as_ref();
    save_variant(&dir, ALIGNED_IMAGE, &healed.aligned, alpha)?;
    save_variant(&dir, MARKED_IMAGE, &healed.marked, alpha)?;
    let mut variants = Vec::with_capacity(healed.filled.len());
    for variant in &healed.filled {
        let stem = format!("filled_{}", variant.backend);
        save_variant(&dir, &stem, &variant.image, alpha)?;
        variants.push(VariantRecord {
            backend: &variant.backend,
            file: format!("{stem}.png"),
            substituted_by: variant.substituted_by,
        });
    }

    let record = AlignmentRecord {
        frame: frame_id,
        label: healed.label.as_str(),
        alignment: &healed.alignment,
        exhaustive: healed.exhaustive,
        recenter: healed.recenter.map(|(dx, dy)| [dx, dy]),
        variants,
    };
    write_record(&dir.join(ALIGNMENT_RECORD), &record)?;

    if let Some(debug) = &healed.debug {
        save_gray(&dir.join("frame_mask.png"), &debug.frame_mask.to_luma())?;
        save_gray(&dir.join("artifact_mask.png"), &debug.artifact_mask.to_luma())?;
    }

    let sequence_image = healed
        .filled
        .first()
        .map(|variant| &variant.image)
        .unwrap_or(&healed.aligned);
    let sequence_path = sink.append(sequence_image)?;

    Ok(FrameOutcome::Written {
        meta: healed.meta,
        label: healed.label,
        alignment: healed.alignment,
        exhaustive: healed.exhaustive,
        sequence_path,
    })
}

/// `<stem>.png`, plus `<stem>_nobg.png` carrying the background alpha when there is one.
fn save_variant(
    dir: &Path,
    stem: &str,
    image: &RgbImage,
    alpha: Option<&GrayImage>,
) -> Result<(), FrameError> {
    let path = dir.join(format!("{stem}.png"));
    image.save(&path).map_err(|source| FrameError::Encode {
        path: path.clone(),
        source,
    })?;
    if let Some(alpha) = alpha {
        let path = dir.join(format!("{stem}_nobg.png"));
        with_alpha(image, alpha)
            .save(&path)
            .map_err(|source| FrameError::Encode {
                path: path.clone(),
                source,
            })?;
    }
    Ok(())
}

fn save_gray(path: &Path, image: &GrayImage) -> Result<(), FrameError> {
    image.save(path).map_err(|source| FrameError::Encode {
        path: path.to_path_buf(),
        source,
    })
}

fn write_record(path: &Path, record: &AlignmentRecord<'_>) -> Result<(), FrameError> {
    let io_error = |source: io::Error| FrameError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = File::create(path).map_err(io_error)?;
    serde_json::to_writer_pretty(BufWriter::new(file), record)
        .map_err(|err| io_error(io::Error::from(err)))
}
