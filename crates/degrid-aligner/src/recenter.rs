use std::collections::VecDeque;

use image::GrayImage;

/// Centroid of the largest 8-connected region brighter than `threshold`.
///
/// Returns `None` when no pixel exceeds the threshold. Equal-sized regions resolve to the one
/// found first in raster order.
pub fn disk_center(gray: &GrayImage, threshold: u8) -> Option<(f32, f32)> {
    let (width, height) = gray.dimensions();
    let (w, h) = (width as usize, height as usize);
    let lit: Vec<bool> = gray.pixels().map(|pixel| pixel.0[0] > threshold).collect();
    let mut seen = vec![false; lit.len()];
    let mut queue = VecDeque::new();
    let mut best: Option<(u64, f64, f64)> = None;

    for start in 0..lit.len() {
        if !lit[start] || seen[start] {
            continue;
        }
        seen[start] = true;
        queue.push_back(start);
        let (mut count, mut sum_x, mut sum_y) = (0u64, 0.0f64, 0.0f64);
        while let Some(idx) = queue.pop_front() {
            let (x, y) = (idx % w, idx / w);
            count += 1;
            sum_x += x as f64;
            sum_y += y as f64;
            for ny in y.saturating_sub(1)..=(y + 1).min(h - 1) {
                for nx in x.saturating_sub(1)..=(x + 1).min(w - 1) {
                    let next = ny * w + nx;
                    if lit[next] && !seen[next] {
                        seen[next] = true;
                        queue.push_back(next);
                    }
                }
            }
        }
        if best.is_none_or(|(largest, _, _)| count > largest) {
            best = Some((count, sum_x, sum_y));
        }
    }

    best.map(|(count, sum_x, sum_y)| {
        let n = count as f64;
        ((sum_x / n) as f32, (sum_y / n) as f32)
    })
}

/// Translation that moves the disk centroid onto the canvas center, if a disk is found.
pub fn recenter_offset(gray: &GrayImage, threshold: u8) -> Option<(f32, f32)> {
    let (cx, cy) = disk_center(gray, threshold)?;
    let (width, height) = gray.dimensions();
    Some((width as f32 / 2.0 - cx, height as f32 / 2.0 - cy))
}
