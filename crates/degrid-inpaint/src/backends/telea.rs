use std::cmp::Ordering;
use std::collections::BinaryHeap;

use degrid_types::BinaryMask;
use image::{Rgb, RgbImage};

use crate::{InpaintEngine, InpaintError};

const UNREACHED: f32 = 1.0e6;

#[derive(Clone, Copy, PartialEq, Eq)]
enum State {
    Known,
    Band,
    Inside,
}

/// Min-heap entry ordered by arrival time, then index.
#[derive(Clone, Copy)]
struct Front {
    time: f32,
    idx: usize,
}

impl PartialEq for Front {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Front {}

impl PartialOrd for Front {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Front {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time
            .total_cmp(&self.time)
            .then_with(|| other.idx.cmp(&self.idx))
    }
}

/// Fast-marching inpainting: masked pixels are filled in order of distance from the mask
/// boundary, each from a weighted average of already known pixels within `radius`.
///
/// Weights favour pixels along the marching direction, close by, and on a similar level set.
#[derive(Clone, Copy, Debug)]
pub struct TeleaEngine {
    radius: u32,
}

impl TeleaEngine {
    pub fn new(radius: u32) -> Self {
        Self {
            radius: radius.max(1),
        }
    }

    pub fn radius(&self) -> u32 {
        self.radius
    }
}

struct March<'a> {
    width: usize,
    height: usize,
    radius: i64,
    state: Vec<State>,
    time: Vec<f32>,
    pixels: Vec<[f32; 3]>,
    heap: BinaryHeap<Front>,
    source: &'a RgbImage,
}

impl March<'_> {
    fn at(&self, x: i64, y: i64) -> Option<usize> {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return None;
        }
        Some(y as usize * self.width + x as usize)
    }

    fn state_at(&self, x: i64, y: i64) -> State {
        self.at(x, y).map_or(State::Inside, |idx| self.state[idx])
    }

    fn time_at(&self, x: i64, y: i64) -> f32 {
        self.at(x, y).map_or(UNREACHED, |idx| self.time[idx])
    }

    fn solve(&self, a: (i64, i64), b: (i64, i64)) -> f32 {
        let (ta, tb) = (self.time_at(a.0, a.1), self.time_at(b.0, b.1));
        let a_known = self.state_at(a.0, a.1) != State::Inside;
        let b_known = self.state_at(b.0, b.1) != State::Inside;
        match (a_known, b_known) {
            (true, true) if (ta - tb).abs() >= 1.0 => 1.0 + ta.min(tb),
            (true, true) => (ta + tb + (2.0 - (ta - tb) * (ta - tb)).sqrt()) * 0.5,
            (true, false) => 1.0 + ta,
            (false, true) => 1.0 + tb,
            (false, false) => 1.0 + ta.min(tb),
        }
    }

    fn arrival(&self, x: i64, y: i64) -> f32 {
        [
            self.solve((x, y - 1), (x - 1, y)),
            self.solve((x, y + 1), (x - 1, y)),
            self.solve((x, y - 1), (x + 1, y)),
            self.solve((x, y + 1), (x + 1, y)),
        ]
        .into_iter()
        .fold(UNREACHED, f32::min)
    }

    fn time_gradient(&self, x: i64, y: i64) -> (f32, f32) {
        let axis = |prev: (i64, i64), next: (i64, i64)| {
            let center = self.time_at(x, y);
            let prev_known = self.state_at(prev.0, prev.1) != State::Inside;
            let next_known = self.state_at(next.0, next.1) != State::Inside;
            match (prev_known, next_known) {
                (true, true) => {
                    (self.time_at(next.0, next.1) - self.time_at(prev.0, prev.1)) * 0.5
                }
                (false, true) => self.time_at(next.0, next.1) - center,
                (true, false) => center - self.time_at(prev.0, prev.1),
                (false, false) => 0.0,
            }
        };
        (axis((x - 1, y), (x + 1, y)), axis((x, y - 1), (x, y + 1)))
    }

    fn reconstruct(&self, x: i64, y: i64) -> Option<[f32; 3]> {
        let here = self.time_at(x, y);
        let (gx, gy) = self.time_gradient(x, y);
        let limit = (self.radius * self.radius) as f32;
        let mut sum = [0.0f32; 3];
        let mut total = 0.0f32;
        for ky in y - self.radius..=y + self.radius {
            for kx in x - self.radius..=x + self.radius {
                let Some(idx) = self.at(kx, ky) else {
                    continue;
                };
                if self.state[idx] == State::Inside {
                    continue;
                }
                let (rx, ry) = ((x - kx) as f32, (y - ky) as f32);
                let len_sq = rx * rx + ry * ry;
                if len_sq == 0.0 || len_sq > limit {
                    continue;
                }
                let mut direction = (rx * gx + ry * gy).abs();
                if direction == 0.0 {
                    direction = 1e-6;
                }
                let distance = 1.0 / (len_sq * len_sq.sqrt());
                let level = 1.0 / (1.0 + (self.time[idx] - here).abs());
                let weight = direction * distance * level;
                for (acc, value) in sum.iter_mut().zip(self.pixels[idx]) {
                    *acc += weight * value;
                }
                total += weight;
            }
        }
        (total > 0.0).then(|| sum.map(|acc| acc / total))
    }

    fn run(&mut self) {
        while let Some(Front { idx, .. }) = self.heap.pop() {
            if self.state[idx] == State::Known {
                continue;
            }
            self.state[idx] = State::Known;
            let (x, y) = ((idx % self.width) as i64, (idx / self.width) as i64);
            for (nx, ny) in [(x, y - 1), (x - 1, y), (x + 1, y), (x, y + 1)] {
                let Some(next) = self.at(nx, ny) else {
                    continue;
                };
                if self.state[next] != State::Inside {
                    continue;
                }
                let time = self.arrival(nx, ny);
                self.time[next] = time;
                if let Some(value) = self.reconstruct(nx, ny) {
                    self.pixels[next] = value;
                }
                self.state[next] = State::Band;
                self.heap.push(Front { time, idx: next });
            }
        }
    }

    fn into_image(self, mask: &BinaryMask) -> RgbImage {
        let mut out = self.source.clone();
        for (x, y, pixel) in out.enumerate_pixels_mut() {
            if mask.get(x, y) {
                let value = self.pixels[y as usize * self.width + x as usize];
                *pixel = Rgb(value.map(|channel| channel.round().clamp(0.0, 255.0) as u8));
            }
        }
        out
    }
}

impl InpaintEngine for TeleaEngine {
    fn name(&self) -> &'static str {
        "telea"
    }

    fn inpaint(&self, image: &RgbImage, mask: &BinaryMask) -> Result<RgbImage, InpaintError> {
        let (width, height) = image.dimensions();
        mask.ensure_size(width, height)?;
        if mask.is_blank() {
            return Ok(image.clone());
        }

        let (w, h) = (width as usize, height as usize);
        let mut march = March {
            width: w,
            height: h,
            radius: i64::from(self.radius),
            state: mask
                .as_raw()
                .iter()
                .map(|&bit| if bit != 0 { State::Inside } else { State::Known })
                .collect(),
            time: mask
                .as_raw()
                .iter()
                .map(|&bit| if bit != 0 { UNREACHED } else { 0.0 })
                .collect(),
            pixels: image.pixels().map(|pixel| pixel.0.map(f32::from)).collect(),
            heap: BinaryHeap::new(),
            source: image,
        };

        for idx in 0..w * h {
            if march.state[idx] != State::Known {
                continue;
            }
            let (x, y) = ((idx % w) as i64, (idx / w) as i64);
            let borders_mask = [(x, y - 1), (x - 1, y), (x + 1, y), (x, y + 1)]
                .into_iter()
                .any(|(nx, ny)| {
                    march
                        .at(nx, ny)
                        .is_some_and(|next| march.state[next] == State::Inside)
                });
            if borders_mask {
                march.state[idx] = State::Band;
                march.heap.push(Front { time: 0.0, idx });
            }
        }

        march.run();
        Ok(march.into_image(mask))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stripes(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |_, y| {
            if y < height / 2 {
                Rgb([200, 40, 40])
            } else {
                Rgb([20, 20, 160])
            }
        })
    }

    #[test]
    fn leaves_unmasked_pixels_untouched() {
        let image = stripes(24, 24);
        let mut mask = BinaryMask::new(24, 24);
        for y in 4..20 {
            mask.set(11, y, true);
            mask.set(12, y, true);
        }
        let filled = TeleaEngine::new(5).inpaint(&image, &mask).unwrap();
        for (x, y, pixel) in filled.enumerate_pixels() {
            if !mask.get(x, y) {
                assert_eq!(pixel, image.get_pixel(x, y));
            }
        }
    }

    #[test]
    fn reconstructs_flat_regions_exactly() {
        let image = RgbImage::from_pixel(16, 16, Rgb([90, 120, 150]));
        let mut mask = BinaryMask::new(16, 16);
        for y in 5..11 {
            for x in 5..11 {
                mask.set(x, y, true);
            }
        }
        let filled = TeleaEngine::new(3).inpaint(&image, &mask).unwrap();
        assert_eq!(filled, image);
    }

    #[test]
    fn follows_the_surrounding_colour() {
        let image = stripes(24, 24);
        let mut mask = BinaryMask::new(24, 24);
        for x in 8..16 {
            mask.set(x, 3, true);
            mask.set(x, 20, true);
        }
        let filled = TeleaEngine::new(4).inpaint(&image, &mask).unwrap();
        assert_eq!(*filled.get_pixel(10, 3), Rgb([200, 40, 40]));
        assert_eq!(*filled.get_pixel(10, 20), Rgb([20, 20, 160]));
    }

    #[test]
    fn full_mask_returns_the_input() {
        let image = stripes(6, 6);
        let full = BinaryMask::from_raw(6, 6, vec![1; 36]).unwrap();
        assert_eq!(TeleaEngine::new(5).inpaint(&image, &full).unwrap(), image);
    }
}
