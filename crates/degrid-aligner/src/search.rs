use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use degrid_types::{AlignmentResult, BinaryMask, Confidence};
use image::GrayImage;
use rayon::prelude::*;
use tracing::debug;

use crate::warp::{RigidTransform, center, warp_mask_nearest};
use crate::{AlignError, AlignerConfig, PhaseCorrelator};

/// Evenly spaced angles from `-max_angle` up to `max_angle`, in ascending order.
///
/// The count is derived from the bound and step once, so accumulated float error never adds
/// or drops the last candidate. `max_angle == 0` yields the single angle `0`.
pub fn candidate_angles(max_angle: f32, step: f32) -> Vec<f32> {
    let max = f64::from(max_angle);
    let step = f64::from(step);
    if max <= 0.0 || step <= 0.0 {
        return vec![0.0];
    }
    let intervals = (2.0 * max / step + 1e-4).floor() as usize;
    (0..=intervals)
        .map(|i| (-max + i as f64 * step).clamp(-max, max) as f32)
        .collect()
}

#[derive(Clone, Copy, Debug)]
struct Candidate {
    angle: f32,
    dx: f32,
    dy: f32,
    score: u64,
}

#[derive(Clone, Debug)]
pub struct FrameAligner {
    config: AlignerConfig,
    angles: Vec<f32>,
}

impl FrameAligner {
    pub fn new(config: AlignerConfig) -> Result<Self, AlignError> {
        config.validate()?;
        let angles = candidate_angles(config.max_angle, config.angle_step);
        Ok(Self { config, angles })
    }

    pub fn config(&self) -> &AlignerConfig {
        &self.config
    }

    pub fn angles(&self) -> &[f32] {
        &self.angles
    }

    /// Pixels strictly brighter than the configured threshold.
    pub fn bright_mask(&self, gray: &GrayImage) -> BinaryMask {
        BinaryMask::from_luma_threshold(gray, self.config.bright_threshold)
    }

    /// Threshold the frame and precompute its spectrum for repeated alignment.
    pub fn prepare(&self, gray: &GrayImage) -> PreparedFrame<'_> {
        let mask = self.bright_mask(gray);
        let header = self.config.header_rows(mask.height());
        let correlator = PhaseCorrelator::new(&mask, header);
        PreparedFrame {
            aligner: self,
            mask,
            header,
            correlator,
        }
    }

    pub fn align(
        &self,
        gray: &GrayImage,
        template: &BinaryMask,
        deadline: Option<Instant>,
    ) -> Result<AlignmentResult, AlignError> {
        self.prepare(gray).align(template, deadline)
    }
}

/// A thresholded frame ready to be aligned against one or more templates.
pub struct PreparedFrame<'a> {
    aligner: &'a FrameAligner,
    mask: BinaryMask,
    header: u32,
    correlator: PhaseCorrelator,
}

impl PreparedFrame<'_> {
    pub fn mask(&self) -> &BinaryMask {
        &self.mask
    }

    pub fn header_rows(&self) -> u32 {
        self.header
    }

    /// Search every candidate angle and keep the highest-scoring transform.
    ///
    /// Ties go to the earliest angle in ascending order. A frame without bright pixels below
    /// the header yields the identity transform flagged low-confidence. The deadline is
    /// checked before each candidate.
    pub fn align(
        &self,
        template: &BinaryMask,
        deadline: Option<Instant>,
    ) -> Result<AlignmentResult, AlignError> {
        template.ensure_size(self.mask.width(), self.mask.height())?;
        if self.mask.overlap(&self.mask, self.header) == 0 {
            debug!("frame has no bright features below the header");
            return Ok(AlignmentResult::identity(Confidence::Low));
        }

        let angles = self.aligner.angles();
        let evaluated = AtomicUsize::new(0);
        let candidates: Vec<Option<Candidate>> = angles
            .par_iter()
            .map(|&angle| {
                if deadline.is_some_and(|limit| Instant::now() >= limit) {
                    return None;
                }
                evaluated.fetch_add(1, Ordering::Relaxed);
                Some(self.evaluate(template, angle))
            })
            .collect();
        if candidates.iter().any(Option::is_none) {
            return Err(AlignError::DeadlineExceeded {
                evaluated: evaluated.into_inner(),
                total: angles.len(),
            });
        }

        let best = candidates
            .into_iter()
            .flatten()
            .fold(None::<Candidate>, |best, candidate| match best {
                Some(current) if current.score >= candidate.score => Some(current),
                _ => Some(candidate),
            });
        let Some(best) = best.filter(|candidate| candidate.score > 0) else {
            debug!("no candidate angle overlapped the frame");
            return Ok(AlignmentResult::identity(Confidence::Low));
        };

        let confidence = if best.score < self.aligner.config.min_confident_score {
            Confidence::Low
        } else {
            Confidence::Normal
        };
        debug!(
            angle = best.angle,
            dx = best.dx,
            dy = best.dy,
            score = best.score,
            candidates = angles.len(),
            "alignment search finished"
        );
        Ok(AlignmentResult {
            angle: best.angle,
            dx: best.dx,
            dy: best.dy,
            score: best.score,
            confidence,
        })
    }

    fn evaluate(&self, template: &BinaryMask, angle: f32) -> Candidate {
        let (cx, cy) = center(template.width(), template.height());
        let rotated = warp_mask_nearest(template, &RigidTransform::rotation_about(angle, cx, cy));
        let (dx, dy) = self.correlator.shift(&rotated);
        let limit = self.aligner.config.max_shift;
        let dx = dx.clamp(-limit, limit);
        let dy = dy.clamp(-limit, limit);
        let placed = warp_mask_nearest(&rotated, &RigidTransform::translation(dx, dy));
        Candidate {
            angle,
            dx,
            dy,
            score: placed.overlap(&self.mask, self.header),
        }
    }
}
