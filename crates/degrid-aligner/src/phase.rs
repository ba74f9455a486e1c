use std::sync::Arc;

use degrid_types::BinaryMask;
use rustfft::num_complex::Complex32;
use rustfft::{Fft, FftPlanner};

const MAGNITUDE_EPSILON: f32 = 1e-9;
const CENTROID_RADIUS: isize = 2;

struct Plan {
    row_forward: Arc<dyn Fft<f32>>,
    col_forward: Arc<dyn Fft<f32>>,
    row_inverse: Arc<dyn Fft<f32>>,
    col_inverse: Arc<dyn Fft<f32>>,
}

/// Phase correlation against a fixed reference mask.
///
/// The reference spectrum is computed once, so many moving masks (one per candidate angle, or
/// one per template) can be correlated against the same frame. Rows above `first_row` are
/// ignored on both sides.
pub struct PhaseCorrelator {
    width: usize,
    height: usize,
    first_row: u32,
    plan: Option<Plan>,
    reference: Vec<Complex32>,
}

impl PhaseCorrelator {
    pub fn new(reference: &BinaryMask, first_row: u32) -> Self {
        let first_row = first_row.min(reference.height());
        let width = reference.width() as usize;
        let height = (reference.height() - first_row) as usize;
        if width == 0 || height == 0 {
            return Self {
                width,
                height,
                first_row,
                plan: None,
                reference: Vec::new(),
            };
        }

        let mut planner = FftPlanner::<f32>::new();
        let plan = Plan {
            row_forward: planner.plan_fft_forward(width),
            col_forward: planner.plan_fft_forward(height),
            row_inverse: planner.plan_fft_inverse(width),
            col_inverse: planner.plan_fft_inverse(height),
        };
        let mut spectrum = load_rows(reference, first_row);
        transform_2d(&mut spectrum, width, height, &plan.row_forward, &plan.col_forward);

        Self {
            width,
            height,
            first_row,
            plan: Some(plan),
            reference: spectrum,
        }
    }

    /// Sub-pixel `(dx, dy)` that moves `moving` onto the reference.
    ///
    /// `moving` must have the reference's dimensions. Blank inputs give `(0, 0)`.
    pub fn shift(&self, moving: &BinaryMask) -> (f32, f32) {
        let Some(plan) = &self.plan else {
            return (0.0, 0.0);
        };
        let (width, height) = (self.width, self.height);

        let mut surface = load_rows(moving, self.first_row);
        transform_2d(&mut surface, width, height, &plan.row_forward, &plan.col_forward);
        for (value, reference) in surface.iter_mut().zip(&self.reference) {
            let cross = reference * value.conj();
            let magnitude = cross.norm();
            *value = if magnitude > MAGNITUDE_EPSILON {
                cross / magnitude
            } else {
                Complex32::new(0.0, 0.0)
            };
        }
        transform_2d(&mut surface, width, height, &plan.row_inverse, &plan.col_inverse);

        let (peak, _) = surface.iter().enumerate().fold(
            (0usize, f32::NEG_INFINITY),
            |best, (idx, value)| if value.re > best.1 { (idx, value.re) } else { best },
        );
        let (cx, cy) = weighted_centroid(&surface, width, height, peak);
        (wrap_signed(cx, width), wrap_signed(cy, height))
    }
}

fn load_rows(mask: &BinaryMask, first_row: u32) -> Vec<Complex32> {
    (first_row..mask.height())
        .flat_map(|y| mask.row(y).iter())
        .map(|&bit| Complex32::new(f32::from(bit), 0.0))
        .collect()
}

fn transform_2d(
    data: &mut Vec<Complex32>,
    width: usize,
    height: usize,
    rows: &Arc<dyn Fft<f32>>,
    cols: &Arc<dyn Fft<f32>>,
) {
    rows.process(data);
    let mut columns = transpose(data, width, height);
    cols.process(&mut columns);
    *data = transpose(&columns, height, width);
}

fn transpose(data: &[Complex32], width: usize, height: usize) -> Vec<Complex32> {
    let mut out = vec![Complex32::new(0.0, 0.0); data.len()];
    for y in 0..height {
        for x in 0..width {
            out[x * height + y] = data[y * width + x];
        }
    }
    out
}

/// Centroid of the positive response in a 5x5 window around `peak`, with wrap-around.
fn weighted_centroid(surface: &[Complex32], width: usize, height: usize, peak: usize) -> (f32, f32) {
    let px = (peak % width) as isize;
    let py = (peak / width) as isize;
    let (w, h) = (width as isize, height as isize);
    let mut total = 0.0f32;
    let mut sum_x = 0.0f32;
    let mut sum_y = 0.0f32;
    for oy in -CENTROID_RADIUS..=CENTROID_RADIUS {
        for ox in -CENTROID_RADIUS..=CENTROID_RADIUS {
            let x = (px + ox).rem_euclid(w) as usize;
            let y = (py + oy).rem_euclid(h) as usize;
            let value = surface[y * width + x].re.max(0.0);
            total += value;
            sum_x += value * ox as f32;
            sum_y += value * oy as f32;
        }
    }
    if total <= 0.0 {
        return (px as f32, py as f32);
    }
    (px as f32 + sum_x / total, py as f32 + sum_y / total)
}

/// Map a circular coordinate in `[0, len)` to a signed shift in `(-len/2, len/2]`.
fn wrap_signed(value: f32, len: usize) -> f32 {
    let len = len as f32;
    let value = value.rem_euclid(len);
    if value > len / 2.0 { value - len } else { value }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(width: u32, height: u32, x0: u32, y0: u32, size: u32) -> BinaryMask {
        let mut mask = BinaryMask::new(width, height);
        for y in y0..y0 + size {
            for x in x0..x0 + size {
                mask.set(x, y, true);
            }
        }
        mask
    }

    #[test]
    fn recovers_positive_shift() {
        let frame = square(64, 48, 30, 25, 6);
        let template = square(64, 48, 18, 18, 6);
        let (dx, dy) = PhaseCorrelator::new(&frame, 0).shift(&template);
        assert!((dx - 12.0).abs() < 0.5, "dx = {dx}");
        assert!((dy - 7.0).abs() < 0.5, "dy = {dy}");
    }

    #[test]
    fn recovers_negative_shift() {
        let frame = square(50, 50, 10, 30, 5);
        let template = square(50, 50, 15, 27, 5);
        let (dx, dy) = PhaseCorrelator::new(&frame, 0).shift(&template);
        assert!((dx + 5.0).abs() < 0.5, "dx = {dx}");
        assert!((dy - 3.0).abs() < 0.5, "dy = {dy}");
    }

    #[test]
    fn header_rows_are_ignored() {
        let mut frame = square(40, 40, 20, 20, 4);
        let template = square(40, 40, 17, 18, 4);
        for x in 0..40 {
            frame.set(x, 1, true);
        }
        let (dx, dy) = PhaseCorrelator::new(&frame, 5).shift(&template);
        assert!((dx - 3.0).abs() < 0.5, "dx = {dx}");
        assert!((dy - 2.0).abs() < 0.5, "dy = {dy}");
    }

    #[test]
    fn blank_inputs_do_not_move() {
        let blank = BinaryMask::new(16, 16);
        let (dx, dy) = PhaseCorrelator::new(&blank, 0).shift(&blank);
        assert_eq!((dx, dy), (0.0, 0.0));
    }

    #[test]
    fn wrap_signed_maps_upper_half_negative() {
        assert_eq!(wrap_signed(3.0, 10), 3.0);
        assert_eq!(wrap_signed(7.0, 10), -3.0);
        assert_eq!(wrap_signed(-0.25, 10), -0.25);
    }
}
