use degrid_types::{AlignmentResult, BinaryMask};
use image::{GrayImage, ImageBuffer, Luma, Pixel};
use imageproc::geometric_transformations::{Interpolation, Projection, warp};

/// Rotation about a fixed point followed by a translation, in pixel coordinates.
///
/// `angle` is in degrees, counter-clockwise as seen on screen (y down). Converted to an
/// imageproc [`Projection`] for resampling.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RigidTransform {
    pub angle: f32,
    pub center: (f32, f32),
    pub dx: f32,
    pub dy: f32,
}

impl RigidTransform {
    pub fn identity() -> Self {
        Self::translation(0.0, 0.0)
    }

    pub fn translation(dx: f32, dy: f32) -> Self {
        Self {
            angle: 0.0,
            center: (0.0, 0.0),
            dx,
            dy,
        }
    }

    pub fn rotation_about(degrees: f32, cx: f32, cy: f32) -> Self {
        Self {
            angle: degrees,
            center: (cx, cy),
            dx: 0.0,
            dy: 0.0,
        }
    }

    /// Template-to-scan transform described by an alignment: rotate about the image center,
    /// then translate.
    pub fn from_alignment(result: &AlignmentResult, width: u32, height: u32) -> Self {
        let (cx, cy) = center(width, height);
        Self {
            angle: result.angle,
            center: (cx, cy),
            dx: result.dx,
            dy: result.dy,
        }
    }

    pub fn projection(&self) -> Projection {
        let (cx, cy) = self.center;
        // imageproc rotates clockwise on screen for positive angles.
        Projection::translate(cx + self.dx, cy + self.dy)
            * Projection::rotate(-self.angle.to_radians())
            * Projection::translate(-cx, -cy)
    }

    pub fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        self.projection() * (x, y)
    }
}

pub(crate) fn center(width: u32, height: u32) -> (f32, f32) {
    (width as f32 / 2.0, height as f32 / 2.0)
}

/// Resample a mask under `transform` with nearest-neighbour lookup; outside pixels are clear.
pub fn warp_mask_nearest(mask: &BinaryMask, transform: &RigidTransform) -> BinaryMask {
    let warped: GrayImage = warp(
        &mask.to_luma(),
        &transform.projection(),
        Interpolation::Nearest,
        Luma([0]),
    );
    BinaryMask::from_luma_threshold(&warped, 0)
}

/// Resample an 8-bit image under `transform` with bilinear interpolation and a black border.
pub fn warp_bilinear<P>(
    image: &ImageBuffer<P, Vec<u8>>,
    transform: &RigidTransform,
) -> ImageBuffer<P, Vec<u8>>
where
    P: Pixel<Subpixel = u8> + Send + Sync,
{
    warp_projected(image, &transform.projection())
}

fn warp_projected<P>(
    image: &ImageBuffer<P, Vec<u8>>,
    projection: &Projection,
) -> ImageBuffer<P, Vec<u8>>
where
    P: Pixel<Subpixel = u8> + Send + Sync,
{
    let black = [0u8; 4];
    let background = *P::from_slice(&black[..usize::from(P::CHANNEL_COUNT)]);
    warp(image, projection, Interpolation::Bilinear, background)
}

/// Move scanned imagery into the template's reference frame: translate by `(-dx, -dy)`, then
/// rotate by `-angle` about the image center.
pub fn to_template_frame<P>(
    image: &ImageBuffer<P, Vec<u8>>,
    result: &AlignmentResult,
) -> ImageBuffer<P, Vec<u8>>
where
    P: Pixel<Subpixel = u8> + Send + Sync,
{
    let (width, height) = image.dimensions();
    let back = RigidTransform::from_alignment(result, width, height)
        .projection()
        .invert();
    warp_projected(image, &back)
}

/// Place a template where the alignment found it on the scan.
///
/// Uses the same two nearest-neighbour passes as the search, so the result matches the mask
/// that was scored.
pub fn to_scan_frame(template: &BinaryMask, result: &AlignmentResult) -> BinaryMask {
    let (cx, cy) = center(template.width(), template.height());
    let rotation = RigidTransform::rotation_about(result.angle, cx, cy);
    let rotated = warp_mask_nearest(template, &rotation);
    warp_mask_nearest(&rotated, &RigidTransform::translation(result.dx, result.dy))
}
