pub mod feeder;
pub mod heal;
pub mod writer;

use std::pin::Pin;
use std::sync::Arc;

use degrid_aligner::FrameAligner;
use degrid_classifier::SubpointClassifier;
use degrid_inpaint::{Backend, InpaintEngine, NeighborFillEngine};
use futures_util::Stream;
use tokio::sync::watch;
use tracing::warn;

use crate::background::build_remover;
use crate::error::RunError;
use crate::registry::TemplateRegistry;
use crate::settings::{EffectiveSettings, FallbackPolicy, OutputSettings};
use crate::sink::FrameSink;
use crate::source::FrameSource;
use feeder::FrameFeeder;
use heal::{HealContext, Healer};
use writer::{FrameOutcome, FrameWriter};

pub struct StreamBundle<T> {
    pub stream: Pin<Box<dyn Stream<Item = T> + Send>>,
    pub total_frames: Option<u64>,
}

impl<T> StreamBundle<T> {
    pub fn new(stream: Pin<Box<dyn Stream<Item = T> + Send>>, total_frames: Option<u64>) -> Self {
        Self {
            stream,
            total_frames,
        }
    }
}

/// One requested inpainting variant and the engine that will produce it.
pub struct EngineSlot {
    pub backend: Backend,
    pub engine: Box<dyn InpaintEngine>,
    /// Set when the requested engine could not be built and the fill stands in for it.
    pub substituted: bool,
}

#[derive(Clone)]
pub struct PipelineConfig {
    pub heal: Arc<HealContext>,
    pub workers: usize,
    pub output: OutputSettings,
}

impl PipelineConfig {
    /// Load templates and build every engine. Fails before any frame is touched.
    pub fn from_settings(settings: &EffectiveSettings) -> Result<Self, RunError> {
        let registry = TemplateRegistry::load(&settings.templates)?;
        let classifier = SubpointClassifier::new(settings.classifier.clone());
        for label in classifier.labels() {
            if registry.get(label.as_str()).is_none() {
                warn!(label = %label, "classifier label has no grid template");
            }
        }
        let aligner = FrameAligner::new(settings.alignment.clone())?;
        let engines = build_engines(
            &settings.inpaint.backends,
            settings.inpaint.radius,
            settings.inpaint.fallback,
        );

        let heal = HealContext {
            registry,
            classifier,
            aligner,
            engines,
            fallback: settings.inpaint.fallback,
            dilate: settings.inpaint.dilate,
            geometry: settings.output.frame,
            missing_text: settings.pipeline.missing_text,
            background: build_remover(
                settings.pipeline.background,
                settings.pipeline.key_threshold,
            ),
            frame_timeout: settings.pipeline.frame_timeout,
            keep_debug: settings.output.write_debug,
        };
        Ok(Self {
            heal: Arc::new(heal),
            workers: settings.pipeline.workers.max(1),
            output: settings.output.clone(),
        })
    }
}

fn build_engines(backends: &[Backend], radius: u32, fallback: FallbackPolicy) -> Vec<EngineSlot> {
    let mut slots = Vec::with_capacity(backends.len());
    for &backend in backends {
        match backend.create_engine(radius) {
            Ok(engine) => slots.push(EngineSlot {
                backend,
                engine,
                substituted: false,
            }),
            Err(err) => match fallback {
                FallbackPolicy::NeighborFill => {
                    warn!(backend = %backend, error = %err, "engine unavailable, using neighbor fill");
                    slots.push(EngineSlot {
                        backend,
                        engine: Box::new(NeighborFillEngine),
                        substituted: true,
                    });
                }
                FallbackPolicy::Omit => {
                    warn!(backend = %backend, error = %err, "engine unavailable, variant omitted");
                }
            },
        }
    }
    slots
}

pub struct PipelineOutputs {
    pub stream: Pin<Box<dyn Stream<Item = FrameOutcome> + Send>>,
    pub total_frames: Option<u64>,
    pub handle: PipelineHandle,
}

/// Stops the feeder; frames already handed to workers still finish and are written.
#[derive(Clone)]
pub struct PipelineHandle {
    cancel_tx: watch::Sender<bool>,
}

impl PipelineHandle {
    pub fn cancel(&self) {
        let _ = self.cancel_tx.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel_tx.borrow()
    }
}

pub fn build_pipeline(
    frames: Vec<FrameSource>,
    pipeline: &PipelineConfig,
    sink: Box<dyn FrameSink>,
) -> PipelineOutputs {
    let (cancel_tx, cancel_rx) = watch::channel(false);

    let fed = FrameFeeder::new(frames, cancel_rx).attach();
    let healed = Healer::new(Arc::clone(&pipeline.heal), pipeline.workers).attach(fed);
    let written = FrameWriter::new(pipeline.output.clone(), sink).attach(healed);

    PipelineOutputs {
        stream: written.stream,
        total_frames: written.total_frames,
        handle: PipelineHandle { cancel_tx },
    }
}
