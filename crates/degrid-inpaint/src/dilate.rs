use degrid_types::BinaryMask;

/// Binary dilation with a `size` x `size` rectangle anchored at its center (`size / 2`).
///
/// Sizes 0 and 1 return the mask unchanged. Pixels outside the image never contribute.
pub fn dilate(mask: &BinaryMask, size: u32) -> BinaryMask {
    if size <= 1 {
        return mask.clone();
    }
    let anchor = i64::from(size / 2);
    let reach = (-anchor, i64::from(size) - 1 - anchor);
    let (width, height) = mask.dimensions();

    let mut rows = BinaryMask::new(width, height);
    for y in 0..height {
        for x in 0..width {
            if any_in(reach, i64::from(x), width, |sx| mask.get(sx, y)) {
                rows.set(x, y, true);
            }
        }
    }
    let mut out = BinaryMask::new(width, height);
    for y in 0..height {
        for x in 0..width {
            if any_in(reach, i64::from(y), height, |sy| rows.get(x, sy)) {
                out.set(x, y, true);
            }
        }
    }
    out
}

fn any_in(reach: (i64, i64), at: i64, len: u32, set: impl Fn(u32) -> bool) -> bool {
    let lo = (at + reach.0).max(0);
    let hi = (at + reach.1).min(i64::from(len) - 1);
    (lo..=hi).any(|source| set(source as u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_a_point_into_a_square() {
        let mut mask = BinaryMask::new(11, 11);
        mask.set(5, 5, true);
        let grown = dilate(&mask, 5);
        assert_eq!(grown.count(), 25);
        assert!(grown.get(3, 3) && grown.get(7, 7));
        assert!(!grown.get(2, 5) && !grown.get(8, 5));
    }

    #[test]
    fn clips_at_the_border() {
        let mut mask = BinaryMask::new(6, 6);
        mask.set(0, 0, true);
        assert_eq!(dilate(&mask, 3).count(), 4);
    }

    #[test]
    fn even_kernel_reaches_further_before_the_anchor() {
        let mut mask = BinaryMask::new(9, 1);
        mask.set(4, 0, true);
        let grown = dilate(&mask, 4);
        let lit: Vec<u32> = (0..9).filter(|&x| grown.get(x, 0)).collect();
        assert_eq!(lit, vec![3, 4, 5, 6]);
    }

    #[test]
    fn unit_kernel_is_identity() {
        let mut mask = BinaryMask::new(4, 4);
        mask.set(2, 1, true);
        assert_eq!(dilate(&mask, 1), mask);
    }
}
