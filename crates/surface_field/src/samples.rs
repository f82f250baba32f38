//! Pixel rays to surface samples.
//!
//! Every pixel with a non-zero depth is lifted to its world-space surface
//! point and paired with the unit direction from the camera centre to that
//! point. Pixels are always addressed in row-major order (`v * W + u`), so
//! the colour buffer, the depth buffer and the validity mask stay aligned.

use crate::camera::{CameraRecord, ImageSize};
use crate::depth::DepthMap;
use crate::error::{Error, Result};
use glam::Vec3;
use log::warn;
use rand::Rng;

/// Position (xyz) followed by view direction (xyz).
pub const FEATURE_DIM: usize = 6;

pub type Feature = [f32; FEATURE_DIM];
pub type Rgb = [f32; 3];

/// Row-major RGB image with channels in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorImage {
    pub size: ImageSize,
    pub pixels: Vec<Rgb>,
}

impl ColorImage {
    pub fn from_pixels(size: ImageSize, pixels: Vec<Rgb>) -> Option<Self> {
        (pixels.len() == size.pixels()).then_some(Self { size, pixels })
    }

    pub fn filled(size: ImageSize, color: Rgb) -> Self {
        Self {
            size,
            pixels: vec![color; size.pixels()],
        }
    }
}

/// Decoded colours and rendered depth for one identifier.
#[derive(Debug, Clone)]
pub struct ImageSample {
    pub id: String,
    pub color: ColorImage,
    pub depth: DepthMap,
}

/// Surface points, view directions and colour labels for the retained pixels of one image.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceSample {
    size: ImageSize,
    features: Vec<Feature>,
    labels: Vec<Rgb>,
    mask: Vec<bool>,
}

impl SurfaceSample {
    /// Number of retained pixels.
    #[inline]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn size(&self) -> ImageSize {
        self.size
    }

    /// `[x, y, z, dx, dy, dz]` per retained pixel.
    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    /// Colours of the retained pixels, aligned with [`features`](Self::features).
    pub fn labels(&self) -> &[Rgb] {
        &self.labels
    }

    /// One flag per pixel of the full image.
    pub fn mask(&self) -> &[bool] {
        &self.mask
    }

    pub fn positions(&self) -> impl Iterator<Item = Vec3> + '_ {
        self.features.iter().map(|f| Vec3::new(f[0], f[1], f[2]))
    }

    pub fn directions(&self) -> impl Iterator<Item = Vec3> + '_ {
        self.features.iter().map(|f| Vec3::new(f[3], f[4], f[5]))
    }

    /// Spread per-sample colours back over a full-resolution image; masked-out
    /// pixels get `background`. Returns `None` if `values` is not aligned with the samples.
    pub fn scatter(&self, values: &[Rgb], background: Rgb) -> Option<ColorImage> {
        if values.len() != self.len() {
            return None;
        }

        let mut out = ColorImage::filled(self.size, background);
        let retained = self
            .mask
            .iter()
            .enumerate()
            .filter_map(|(i, &keep)| keep.then_some(i));

        for (pixel, value) in retained.zip(values) {
            out.pixels[pixel] = *value;
        }

        Some(out)
    }
}

/// Number of uniform draws (with replacement) over `pixels` positions after
/// which a given pixel survives with probability `limit / base`.
pub fn thinning_draws(base: usize, limit: usize, pixels: usize) -> usize {
    if limit == 0 || limit >= base || pixels < 2 {
        return 0;
    }

    let keep = (limit as f64 / base as f64).ln();
    let miss = (-1.0 / pixels as f64).ln_1p();

    (keep / miss).floor() as usize
}

/// Thin `mask` towards `limit` set entries. Approximate: the surviving count
/// is centred near `limit`, not equal to it. Returns the number of draws made.
pub fn thin_mask<R: Rng + ?Sized>(mask: &mut [bool], limit: usize, rng: &mut R) -> usize {
    let base = mask.iter().filter(|&&m| m).count();
    let draws = thinning_draws(base, limit, mask.len());

    for _ in 0..draws {
        mask[rng.gen_range(0..mask.len())] = false;
    }

    draws
}

#[inline]
fn has_surface(depth: f32) -> bool {
    depth.is_finite() && depth > 0.0
}

/// Build surface samples for one image.
///
/// `limit`, when set, bounds the expected number of retained pixels; it must be positive.
pub fn build_samples<R: Rng + ?Sized>(
    color: &ColorImage,
    depth: &DepthMap,
    camera: &CameraRecord,
    limit: Option<usize>,
    rng: &mut R,
) -> Result<SurfaceSample> {
    if color.size != depth.size
        || color.pixels.len() != color.size.pixels()
        || depth.values.len() != depth.size.pixels()
    {
        return Err(Error::ShapeMismatch {
            id: None,
            color_width: color.size.width,
            color_height: color.size.height,
            depth_width: depth.size.width,
            depth_height: depth.size.height,
        });
    }
    if limit == Some(0) {
        return Err(Error::InvalidLimit);
    }

    let pixel_to_world = camera
        .pixel_to_world()
        .ok_or(Error::SingularIntrinsic { id: None })?;
    let origin = camera.origin();
    let width = depth.size.width;

    let mut mask: Vec<bool> = depth.values.iter().map(|&d| has_surface(d)).collect();
    if let Some(limit) = limit {
        thin_mask(&mut mask, limit, rng);
    }

    let retained = mask.iter().filter(|&&m| m).count();
    let mut features = Vec::with_capacity(retained);
    let mut labels = Vec::with_capacity(retained);
    let mut degenerate = 0usize;

    for (i, keep) in mask.iter_mut().enumerate() {
        if !*keep {
            continue;
        }

        let d = depth.values[i];
        let (u, v) = ((i % width) as f32, (i / width) as f32);
        let position = pixel_to_world * Vec3::new(u * d, v * d, d) + origin;

        let Some(direction) = (position - origin).try_normalize() else {
            *keep = false;
            degenerate += 1;
            continue;
        };

        features.push([
            position.x,
            position.y,
            position.z,
            direction.x,
            direction.y,
            direction.z,
        ]);
        labels.push(color.pixels[i]);
    }

    if degenerate > 0 {
        warn!(
            "dropped {} samples whose surface point coincides with the camera origin",
            degenerate
        );
    }

    Ok(SurfaceSample {
        size: depth.size,
        features,
        labels,
        mask,
    })
}
