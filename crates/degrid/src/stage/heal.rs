use std::sync::Arc;
use std::time::{Duration, Instant};

use degrid_aligner::{
    FrameAligner, PreparedFrame, RigidTransform, recenter_offset, to_scan_frame,
    to_template_frame, warp_bilinear, warp_mask_nearest,
};
use degrid_classifier::SubpointClassifier;
use degrid_inpaint::{InpaintEngine, NeighborFillEngine, dilate, mark_artifact};
use degrid_types::{
    AlignmentResult, BinaryMask, FrameMeta, SatelliteFrame, Subpoint, SubpointLabel,
};
use futures_util::StreamExt;
use image::imageops::{self, FilterType};
use image::{GrayImage, RgbImage};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{EngineSlot, StreamBundle};
use crate::background::BackgroundRemover;
use crate::error::FrameError;
use crate::registry::{GridTemplate, TemplateRegistry};
use crate::settings::{FallbackPolicy, MissingTextPolicy, OutputFrame};
use crate::sidecar::read_sidecar;
use crate::source::FrameSource;

const HEAL_CHANNEL_CAPACITY: usize = 2;

/// Immutable state shared by every worker.
pub struct HealContext {
    pub registry: TemplateRegistry,
    pub classifier: SubpointClassifier,
    pub aligner: FrameAligner,
    pub engines: Vec<EngineSlot>,
    pub fallback: FallbackPolicy,
    pub dilate: u32,
    pub geometry: OutputFrame,
    pub missing_text: MissingTextPolicy,
    pub background: Option<Box<dyn BackgroundRemover>>,
    pub frame_timeout: Option<Duration>,
    pub keep_debug: bool,
}

/// One reconstructed image and the engine behind it.
pub struct FilledVariant {
    pub backend: String,
    /// Engine that actually produced the image when the requested one failed.
    pub substituted_by: Option<&'static str>,
    pub image: RgbImage,
}

pub struct DebugMasks {
    pub frame_mask: BinaryMask,
    pub artifact_mask: BinaryMask,
}

pub struct HealedFrame {
    pub meta: FrameMeta,
    pub label: SubpointLabel,
    /// The label came from scoring every template rather than from the text.
    pub exhaustive: bool,
    pub alignment: AlignmentResult,
    pub recenter: Option<(f32, f32)>,
    pub aligned: RgbImage,
    pub marked: RgbImage,
    pub filled: Vec<FilledVariant>,
    /// Background-removal alpha in the output geometry.
    pub alpha: Option<GrayImage>,
    pub debug: Option<DebugMasks>,
}

pub struct HealOutcome {
    pub meta: FrameMeta,
    pub result: Result<HealedFrame, FrameError>,
}

/// Runs frames on a bounded set of blocking workers and re-emits them in input order.
pub struct Healer {
    context: Arc<HealContext>,
    workers: usize,
}

impl Healer {
    pub fn new(context: Arc<HealContext>, workers: usize) -> Self {
        Self {
            context,
            workers: workers.max(1),
        }
    }

    pub fn attach(self, input: StreamBundle<FrameSource>) -> StreamBundle<HealOutcome> {
        let StreamBundle {
            stream,
            total_frames,
        } = input;

        let (tx, rx) = mpsc::channel::<HealOutcome>(HEAL_CHANNEL_CAPACITY);
        let context = self.context;
        let workers = self.workers;

        tokio::spawn(async move {
            let mut ordered = stream
                .map(move |source| {
                    let context = Arc::clone(&context);
                    async move {
                        let meta = source.meta.clone();
                        let result =
                            tokio::task::spawn_blocking(move || heal_frame(&context, &source))
                                .await
                                .unwrap_or(Err(FrameError::Interrupted));
                        HealOutcome { meta, result }
                    }
                })
                .buffered(workers);

            while let Some(outcome) = ordered.next().await {
                if tx.send(outcome).await.is_err() {
                    break;
                }
            }
        });

        let stream = Box::pin(futures_util::stream::unfold(rx, |mut receiver| async {
            receiver.recv().await.map(|item| (item, receiver))
        }));

        StreamBundle::new(stream, total_frames)
    }
}

/// Load, classify, align and reconstruct one frame.
pub fn heal_frame(context: &HealContext, source: &FrameSource) -> Result<HealedFrame, FrameError> {
    let texts = match &source.sidecar_path {
        Some(path) => read_sidecar(path)?,
        None => Vec::new(),
    };
    if texts.is_empty() && context.missing_text == MissingTextPolicy::Skip {
        return Err(FrameError::NoRecognizedText);
    }

    let mut frame = load_frame(source, texts)?;
    let (width, height) = context.registry.dimensions();
    if frame.dimensions() != (width, height) {
        debug!(
            frame = %frame.meta.frame_id(),
            from = ?frame.dimensions(),
            to = ?(width, height),
            "resizing frame to template size"
        );
        frame.image = imageops::resize(&frame.image, width, height, FilterType::Triangle);
        frame.alpha = frame
            .alpha
            .map(|alpha| imageops::resize(&alpha, width, height, FilterType::Triangle));
    }

    let subpoint = context.classifier.classify(&frame.texts);

    if frame.alpha.is_none()
        && let Some(remover) = &context.background
    {
        frame.alpha = Some(remover.alpha(&frame.image));
    }

    let prepared = context.aligner.prepare(&frame.gray());
    let deadline = context.frame_timeout.map(|limit| Instant::now() + limit);
    let (template, alignment, exhaustive) = match &subpoint {
        Subpoint::Known(label) => {
            let template = context
                .registry
                .get(label.as_str())
                .ok_or_else(|| FrameError::NoTemplate(label.to_string()))?;
            let alignment = prepared.align(&template.mask, deadline)?;
            (template, alignment, false)
        }
        Subpoint::Unknown => {
            let (template, alignment) = best_template(&context.registry, &prepared, deadline)?;
            info!(
                frame = %frame.meta.frame_id(),
                label = %template.label,
                score = alignment.score,
                "subpoint not recognized, picked best-scoring template"
            );
            (template, alignment, true)
        }
    };
    if alignment.is_low_confidence() {
        warn!(
            frame = %frame.meta.frame_id(),
            label = %template.label,
            score = alignment.score,
            "low-confidence alignment"
        );
    }

    let (mut aligned, mut alpha, mut grid) = match context.geometry {
        OutputFrame::Template => (
            to_template_frame(&frame.image, &alignment),
            frame
                .alpha
                .as_ref()
                .map(|alpha| to_template_frame(alpha, &alignment)),
            template.mask.clone(),
        ),
        OutputFrame::Scan => (
            frame.image.clone(),
            frame.alpha.clone(),
            to_scan_frame(&template.mask, &alignment),
        ),
    };

    let config = context.aligner.config();
    let recenter = if config.recenter_disk {
        // Prefer the background-removal alpha as the disk foreground.
        match &alpha {
            Some(alpha) => recenter_offset(alpha, config.disk_threshold),
            None => recenter_offset(&imageops::grayscale(&aligned), config.disk_threshold),
        }
    } else {
        None
    };
    if let Some((dx, dy)) = recenter {
        let shift = RigidTransform::translation(dx, dy);
        aligned = warp_bilinear(&aligned, &shift);
        alpha = alpha.map(|alpha| warp_bilinear(&alpha, &shift));
        grid = warp_mask_nearest(&grid, &shift);
    }

    let artifact = dilate(&grid, context.dilate);
    let marked = mark_artifact(&aligned, &artifact)?;
    let filled = reconstruct(context, &frame.meta, &aligned, &artifact);

    info!(
        frame = %frame.meta.frame_id(),
        label = %template.label,
        angle = alignment.angle,
        dx = alignment.dx,
        dy = alignment.dy,
        score = alignment.score,
        "frame healed"
    );

    let debug = context.keep_debug.then(|| DebugMasks {
        frame_mask: prepared.mask().clone(),
        artifact_mask: artifact,
    });
    Ok(HealedFrame {
        meta: frame.meta,
        label: template.label.clone(),
        exhaustive,
        alignment,
        recenter,
        aligned,
        marked,
        filled,
        alpha,
        debug,
    })
}

fn load_frame(source: &FrameSource, texts: Vec<String>) -> Result<SatelliteFrame, FrameError> {
    let path = &source.image_path;
    if !path.is_file() {
        return Err(FrameError::MissingInput { path: path.clone() });
    }
    let decoded = image::open(path).map_err(|source| FrameError::CorruptImage {
        path: path.clone(),
        source,
    })?;
    let alpha = decoded.color().has_alpha().then(|| {
        let rgba = decoded.to_rgba8();
        GrayImage::from_fn(rgba.width(), rgba.height(), |x, y| {
            image::Luma([rgba.get_pixel(x, y).0[3]])
        })
    });
    Ok(SatelliteFrame {
        meta: source.meta.clone(),
        image: decoded.to_rgb8(),
        alpha,
        texts,
    })
}

/// Align against every template and keep the highest score; ties keep registry order.
fn best_template<'r>(
    registry: &'r TemplateRegistry,
    prepared: &PreparedFrame<'_>,
    deadline: Option<Instant>,
) -> Result<(&'r GridTemplate, AlignmentResult), FrameError> {
    let mut best: Option<(&GridTemplate, AlignmentResult)> = None;
    for template in registry.iter() {
        let result = prepared.align(&template.mask, deadline)?;
        debug!(label = %template.label, score = result.score, "scored template");
        if best
            .as_ref()
            .is_none_or(|(_, current)| result.score > current.score)
        {
            best = Some((template, result));
        }
    }
    best.ok_or_else(|| FrameError::NoTemplate(Subpoint::Unknown.to_string()))
}

fn reconstruct(
    context: &HealContext,
    meta: &FrameMeta,
    aligned: &RgbImage,
    artifact: &BinaryMask,
) -> Vec<FilledVariant> {
    let mut filled = Vec::with_capacity(context.engines.len());
    for slot in &context.engines {
        let substituted_by = slot.substituted.then(|| slot.engine.name());
        match slot.engine.inpaint(aligned, artifact) {
            Ok(image) => filled.push(FilledVariant {
                backend: slot.backend.to_string(),
                substituted_by,
                image,
            }),
            Err(err) => {
                warn!(
                    frame = %meta.frame_id(),
                    backend = %slot.backend,
                    error = %err,
                    "inpainting failed"
                );
                if context.fallback == FallbackPolicy::Omit {
                    continue;
                }
                match NeighborFillEngine.inpaint(aligned, artifact) {
                    Ok(image) => filled.push(FilledVariant {
                        backend: slot.backend.to_string(),
                        substituted_by: Some(NeighborFillEngine.name()),
                        image,
                    }),
                    Err(err) => warn!(
                        frame = %meta.frame_id(),
                        error = %err,
                        "neighbor fill failed, variant omitted"
                    ),
                }
            }
        }
    }
    filled
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    use degrid_aligner::{AlignerConfig, disk_center};
    use degrid_classifier::ClassifierTable;
    use degrid_inpaint::{Backend, InpaintError};
    use degrid_types::CaptureTime;
    use image::Rgb;

    use crate::background::build_remover;
    use crate::settings::BackgroundMode;

    const SIZE: u32 = 64;
    const BACKGROUND: u8 = 60;

    struct Broken;

    impl InpaintEngine for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn inpaint(&self, _: &RgbImage, _: &BinaryMask) -> Result<RgbImage, InpaintError> {
            Err(InpaintError::UnknownBackend("broken".into()))
        }
    }

    fn rect_mask(x0: u32, y0: u32, w: u32, h: u32) -> BinaryMask {
        let mut mask = BinaryMask::new(SIZE, SIZE);
        for y in y0..y0 + h {
            for x in x0..x0 + w {
                mask.set(x, y, true);
            }
        }
        mask
    }

    fn template(label: &str, mask: BinaryMask) -> GridTemplate {
        GridTemplate {
            label: SubpointLabel::new(label),
            mask,
            path: format!("mask.{label}.png").into(),
        }
    }

    fn context(templates: Vec<GridTemplate>, engines: Vec<EngineSlot>) -> HealContext {
        let aligner = FrameAligner::new(AlignerConfig {
            max_angle: 0.0,
            min_confident_score: 1,
            ..AlignerConfig::default()
        })
        .unwrap();
        HealContext {
            registry: TemplateRegistry::from_templates(templates).unwrap(),
            classifier: SubpointClassifier::new(ClassifierTable::default()),
            aligner,
            engines,
            fallback: FallbackPolicy::NeighborFill,
            dilate: 5,
            geometry: OutputFrame::Template,
            missing_text: MissingTextPolicy::Skip,
            background: None,
            frame_timeout: None,
            keep_debug: false,
        }
    }

    fn neighbor_slot() -> EngineSlot {
        EngineSlot {
            backend: Backend::NeighborFill,
            engine: Box::new(NeighborFillEngine),
            substituted: false,
        }
    }

    fn square_context() -> HealContext {
        context(
            vec![template("5N", rect_mask(24, 24, 8, 8))],
            vec![neighbor_slot()],
        )
    }

    /// Dark frame with the bright square drawn at `(x0, y0)`.
    fn write_frame(dir: &Path, seconds: u32, x0: u32, y0: u32, text: Option<&str>) -> FrameSource {
        let image = RgbImage::from_fn(SIZE, SIZE, |x, y| {
            if (x0..x0 + 8).contains(&x) && (y0..y0 + 8).contains(&y) {
                Rgb([255, 255, 255])
            } else {
                Rgb([BACKGROUND; 3])
            }
        });
        write_image(dir, seconds, &image, text)
    }

    /// Disk of gray 100 around `(26, 28)` over `background`, with the template square on top.
    fn off_center_disk(background: u8) -> RgbImage {
        RgbImage::from_fn(SIZE, SIZE, |x, y| {
            let (dx, dy) = (x as f32 - 26.0, y as f32 - 28.0);
            if (24..32).contains(&x) && (24..32).contains(&y) {
                Rgb([255, 255, 255])
            } else if (dx * dx + dy * dy).sqrt() <= 14.0 {
                Rgb([100; 3])
            } else {
                Rgb([background; 3])
            }
        })
    }

    fn write_image(dir: &Path, seconds: u32, image: &RgbImage, text: Option<&str>) -> FrameSource {
        let meta = FrameMeta {
            satellite: "32A".into(),
            capture: CaptureTime {
                year: 1977,
                day_of_year: 1,
                seconds_of_day: seconds,
            },
            band: "VS".into(),
        };
        let image_path = dir.join(format!("{}.png", meta.frame_id()));
        image.save(&image_path).unwrap();
        let sidecar_path = text.map(|text| {
            let path = dir.join(format!("{}.json", meta.frame_id()));
            fs::write(&path, format!(r#"{{"lines": ["{text}"]}}"#)).unwrap();
            path
        });
        FrameSource {
            meta,
            image_path,
            sidecar_path,
        }
    }

    #[test]
    fn known_label_is_aligned_and_filled() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_frame(dir.path(), 1, 28, 26, Some("5N 1977"));
        let healed = heal_frame(&square_context(), &source).unwrap();

        assert_eq!(healed.label.as_str(), "5N");
        assert!(!healed.exhaustive);
        assert!((healed.alignment.dx - 4.0).abs() < 0.5);
        assert!((healed.alignment.dy - 2.0).abs() < 0.5);
        assert!(!healed.alignment.is_low_confidence());

        assert_eq!(healed.marked.get_pixel(28, 28), &Rgb([0, 255, 0]));
        assert_eq!(healed.filled.len(), 1);
        let filled = &healed.filled[0];
        assert_eq!(filled.backend, "neighbor-fill");
        assert!(filled.substituted_by.is_none());
        let center = filled.image.get_pixel(28, 28).0[0];
        assert!(center.abs_diff(BACKGROUND) <= 2, "center was {center}");
        assert!(healed.debug.is_none());
    }

    #[test]
    fn missing_text_skips_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_frame(dir.path(), 2, 24, 24, None);
        let result = heal_frame(&square_context(), &source);
        assert!(matches!(result, Err(FrameError::NoRecognizedText)));
    }

    #[test]
    fn unknown_text_scores_every_template() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_frame(dir.path(), 3, 26, 25, Some("GARBLED"));
        let mut ctx = context(
            vec![
                template("0N", rect_mask(10, 40, 30, 2)),
                template("5N", rect_mask(24, 24, 8, 8)),
            ],
            vec![neighbor_slot()],
        );
        ctx.missing_text = MissingTextPolicy::Exhaustive;

        let healed = heal_frame(&ctx, &source).unwrap();
        assert!(healed.exhaustive);
        assert_eq!(healed.label.as_str(), "5N");
    }

    #[test]
    fn label_without_template_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_frame(dir.path(), 4, 24, 24, Some("5S"));
        let result = heal_frame(&square_context(), &source);
        assert!(matches!(result, Err(FrameError::NoTemplate(label)) if label == "5S"));
    }

    #[test]
    fn corrupt_image_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = write_frame(dir.path(), 5, 24, 24, Some("5N"));
        fs::write(&source.image_path, b"not a png").unwrap();
        assert!(matches!(
            heal_frame(&square_context(), &source),
            Err(FrameError::CorruptImage { .. })
        ));

        source.image_path = dir.path().join("gone.png");
        assert!(matches!(
            heal_frame(&square_context(), &source),
            Err(FrameError::MissingInput { .. })
        ));
    }

    #[test]
    fn scan_geometry_keeps_original_pixels_outside_the_grid() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_frame(dir.path(), 6, 30, 30, Some("5N"));
        let mut ctx = square_context();
        ctx.geometry = OutputFrame::Scan;
        ctx.keep_debug = true;

        let healed = heal_frame(&ctx, &source).unwrap();
        assert_eq!(healed.aligned.get_pixel(33, 33), &Rgb([255, 255, 255]));
        assert_eq!(healed.marked.get_pixel(33, 33), &Rgb([0, 255, 0]));
        assert_eq!(healed.marked.get_pixel(2, 60), &Rgb([BACKGROUND; 3]));
        let debug = healed.debug.unwrap();
        assert!(debug.artifact_mask.get(33, 33));
        assert!(debug.frame_mask.get(33, 33));
    }

    #[test]
    fn failing_engine_falls_back_or_is_omitted() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_frame(dir.path(), 7, 24, 24, Some("5N"));
        let broken = || EngineSlot {
            backend: Backend::Telea,
            engine: Box::new(Broken),
            substituted: false,
        };

        let ctx = context(vec![template("5N", rect_mask(24, 24, 8, 8))], vec![broken()]);
        let healed = heal_frame(&ctx, &source).unwrap();
        assert_eq!(healed.filled.len(), 1);
        assert_eq!(healed.filled[0].backend, "telea");
        assert_eq!(healed.filled[0].substituted_by, Some("neighbor-fill"));

        let mut ctx = context(vec![template("5N", rect_mask(24, 24, 8, 8))], vec![broken()]);
        ctx.fallback = FallbackPolicy::Omit;
        let healed = heal_frame(&ctx, &source).unwrap();
        assert!(healed.filled.is_empty());
    }

    #[test]
    fn background_alpha_follows_the_output_geometry() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_frame(dir.path(), 8, 24, 24, Some("5N"));
        let mut ctx = square_context();
        ctx.background = build_remover(BackgroundMode::LumaKey, 100);

        let healed = heal_frame(&ctx, &source).unwrap();
        let alpha = healed.alpha.unwrap();
        assert_eq!(alpha.dimensions(), (SIZE, SIZE));
        assert_eq!(alpha.get_pixel(27, 27).0[0], 255);
        assert_eq!(alpha.get_pixel(2, 60).0[0], 0);
    }

    #[test]
    fn recentering_moves_disk_and_grid_together() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_image(dir.path(), 20, &off_center_disk(0), Some("5N"));
        let mut ctx = square_context();
        ctx.aligner = FrameAligner::new(AlignerConfig {
            max_angle: 0.0,
            min_confident_score: 1,
            recenter_disk: true,
            ..AlignerConfig::default()
        })
        .unwrap();
        ctx.keep_debug = true;

        let healed = heal_frame(&ctx, &source).unwrap();
        assert!(healed.alignment.dx.abs() < 0.5 && healed.alignment.dy.abs() < 0.5);
        let (dx, dy) = healed.recenter.unwrap();
        assert!((dx - 6.0).abs() < 0.5, "dx = {dx}");
        assert!((dy - 4.0).abs() < 0.5, "dy = {dy}");

        let (cx, cy) = disk_center(&imageops::grayscale(&healed.aligned), 10).unwrap();
        assert!((cx - 32.0).abs() < 0.5 && (cy - 32.0).abs() < 0.5, "center = ({cx}, {cy})");

        // The square moved from (24, 24) to (30, 28) and the grid followed it.
        assert_eq!(healed.aligned.get_pixel(33, 31), &Rgb([255, 255, 255]));
        assert_eq!(healed.marked.get_pixel(33, 31), &Rgb([0, 255, 0]));
        let debug = healed.debug.unwrap();
        assert!(debug.artifact_mask.get(33, 31));
        assert!(debug.artifact_mask.get(39, 37));
        assert!(!debug.artifact_mask.get(25, 25));
    }

    #[test]
    fn recentering_prefers_background_alpha() {
        let dir = tempfile::tempdir().unwrap();
        // A gray threshold would take the whole canvas as the disk here.
        let source = write_image(dir.path(), 21, &off_center_disk(BACKGROUND), Some("5N"));
        let mut ctx = square_context();
        ctx.aligner = FrameAligner::new(AlignerConfig {
            max_angle: 0.0,
            min_confident_score: 1,
            recenter_disk: true,
            ..AlignerConfig::default()
        })
        .unwrap();
        ctx.background = build_remover(BackgroundMode::LumaKey, 80);

        let healed = heal_frame(&ctx, &source).unwrap();
        let (dx, dy) = healed.recenter.unwrap();
        assert!((dx - 6.0).abs() < 0.5, "dx = {dx}");
        assert!((dy - 4.0).abs() < 0.5, "dy = {dy}");

        let alpha = healed.alpha.unwrap();
        assert_eq!(alpha.get_pixel(45, 32).0[0], 255);
        assert_eq!(alpha.get_pixel(13, 28).0[0], 0);
        let (cx, cy) = disk_center(&alpha, 10).unwrap();
        assert!((cx - 32.0).abs() < 0.5 && (cy - 32.0).abs() < 0.5, "center = ({cx}, {cy})");
    }

    #[tokio::test]
    async fn healer_preserves_input_order() {
        let dir = tempfile::tempdir().unwrap();
        let frames = vec![
            write_frame(dir.path(), 10, 24, 24, Some("5N")),
            write_frame(dir.path(), 11, 24, 24, None),
            write_frame(dir.path(), 12, 25, 24, Some("5N")),
            write_frame(dir.path(), 13, 26, 24, Some("5N")),
        ];
        let expected: Vec<String> = frames.iter().map(|f| f.meta.frame_id()).collect();
        let input = StreamBundle::new(
            Box::pin(futures_util::stream::iter(frames)),
            Some(expected.len() as u64),
        );

        let healed = Healer::new(Arc::new(square_context()), 3).attach(input);
        assert_eq!(healed.total_frames, Some(4));
        let outcomes: Vec<HealOutcome> = healed.stream.collect().await;
        let ids: Vec<String> = outcomes.iter().map(|o| o.meta.frame_id()).collect();
        assert_eq!(ids, expected);
        assert!(outcomes[0].result.is_ok());
        assert!(matches!(outcomes[1].result, Err(FrameError::NoRecognizedText)));
        assert!(outcomes[3].result.is_ok());
    }
}
