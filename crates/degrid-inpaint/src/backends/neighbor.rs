use degrid_types::BinaryMask;
use image::{Rgb, RgbImage};
use tracing::debug;

use crate::{InpaintEngine, InpaintError};

/// Outcome of an iterative neighbor fill.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FillReport {
    /// Full passes run, including a final pass that changed nothing.
    pub passes: u32,
    pub filled: u64,
    /// Masked pixels left because no unmasked pixel was ever reachable.
    pub remaining: u64,
}

/// Fill masked pixels from the mean of their unmasked 8-neighbors, pass by pass.
///
/// Each pass reads the mask as it stood when the pass began; pixels filled in a pass leave the
/// mask only once the pass ends. Stops when a pass changes nothing or the mask is empty.
pub fn fill_neighbors(
    image: &RgbImage,
    mask: &BinaryMask,
) -> Result<(RgbImage, FillReport), InpaintError> {
    let (width, height) = image.dimensions();
    mask.ensure_size(width, height)?;

    let mut working = image.clone();
    let mut pending = mask.clone();
    let mut report = FillReport {
        passes: 0,
        filled: 0,
        remaining: pending.count(),
    };

    while report.remaining > 0 {
        report.passes += 1;
        let mut updates = Vec::new();
        for y in 0..height {
            for x in 0..width {
                if !pending.get(x, y) {
                    continue;
                }
                if let Some(value) = neighbor_mean(&working, &pending, x, y) {
                    updates.push((x, y, value));
                }
            }
        }
        if updates.is_empty() {
            break;
        }
        report.filled += updates.len() as u64;
        report.remaining -= updates.len() as u64;
        for (x, y, value) in updates {
            working.put_pixel(x, y, value);
            pending.set(x, y, false);
        }
    }

    Ok((working, report))
}

fn neighbor_mean(image: &RgbImage, pending: &BinaryMask, x: u32, y: u32) -> Option<Rgb<u8>> {
    let (width, height) = image.dimensions();
    let mut sum = [0u32; 3];
    let mut count = 0u32;
    for ny in y.saturating_sub(1)..=(y + 1).min(height - 1) {
        for nx in x.saturating_sub(1)..=(x + 1).min(width - 1) {
            if (nx, ny) == (x, y) || pending.get(nx, ny) {
                continue;
            }
            let pixel = image.get_pixel(nx, ny);
            for (total, channel) in sum.iter_mut().zip(pixel.0) {
                *total += u32::from(channel);
            }
            count += 1;
        }
    }
    if count == 0 {
        return None;
    }
    Some(Rgb(sum.map(|total| ((total + count / 2) / count) as u8)))
}

/// Iterative neighbor-average fill. Never fails on a correctly sized mask.
#[derive(Clone, Copy, Debug, Default)]
pub struct NeighborFillEngine;

impl InpaintEngine for NeighborFillEngine {
    fn name(&self) -> &'static str {
        "neighbor-fill"
    }

    fn inpaint(&self, image: &RgbImage, mask: &BinaryMask) -> Result<RgbImage, InpaintError> {
        let (filled, report) = fill_neighbors(image, mask)?;
        debug!(
            passes = report.passes,
            filled = report.filled,
            remaining = report.remaining,
            "neighbor fill finished"
        );
        Ok(filled)
    }
}
