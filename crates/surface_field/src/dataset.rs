//! Eagerly assembled, index-addressable collection of per-view surface samples.

use crate::camera::{CameraRecord, ImageSize, TargetSize};
use crate::config::DatasetConfig;
use crate::depth::{DepthMap, DepthProvider};
use crate::error::{Error, Result};
use crate::manifest::Manifest;
use crate::samples::{build_samples, ColorImage, Feature, ImageSample, Rgb, SurfaceSample};
use image::imageops::{self, FilterType};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Everything cached for one identifier.
#[derive(Debug, Clone)]
pub struct View {
    pub image_path: PathBuf,
    pub camera: CameraRecord,
    pub image: ImageSample,
    pub sample: SurfaceSample,
}

impl View {
    pub fn id(&self) -> &str {
        &self.image.id
    }
}

/// One dataset item: features and labels of the retained pixels, plus the full-image mask.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DatasetItem<'a> {
    pub features: &'a [Feature],
    pub labels: &'a [Rgb],
    pub mask: &'a [bool],
}

#[derive(Debug, Clone)]
pub struct SurfaceDataset {
    size: TargetSize,
    limit: Option<usize>,
    views: Vec<View>,
}

/// Independent stream per view so results do not depend on scheduling.
fn view_rng(seed: Option<u64>, index: usize) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed ^ (index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)),
        None => StdRng::from_entropy(),
    }
}

/// Decode to `[0, 1]` floats, resizing with a linear filter when the target differs.
fn read_color(id: &str, path: &Path, target: ImageSize) -> Result<ColorImage> {
    let decoded = image::open(path).map_err(|source| Error::Image {
        id: id.to_owned(),
        path: path.to_path_buf(),
        source,
    })?;

    let mut rgb = decoded.to_rgb32f();
    if (rgb.width() as usize, rgb.height() as usize) != (target.width, target.height) {
        rgb = imageops::resize(&rgb, target.width as u32, target.height as u32, FilterType::Triangle);
    }

    let pixels = rgb.pixels().map(|p| p.0).collect();
    ColorImage::from_pixels(target, pixels).ok_or_else(|| Error::ShapeMismatch {
        id: Some(id.to_owned()),
        color_width: rgb.width() as usize,
        color_height: rgb.height() as usize,
        depth_width: target.width,
        depth_height: target.height,
    })
}

fn load_view<D, R>(
    id: &str,
    image_path: PathBuf,
    camera: CameraRecord,
    size: ImageSize,
    limit: Option<usize>,
    provider: &D,
    rng: &mut R,
) -> Result<View>
where
    D: DepthProvider + ?Sized,
    R: Rng + ?Sized,
{
    let color = read_color(id, &image_path, size)?;

    let mut depth = DepthMap::zeros(size);
    provider
        .render_depth(&camera.pose, &camera.intrinsic, &mut depth)
        .map_err(|source| Error::Depth {
            id: id.to_owned(),
            source,
        })?;

    let sample = build_samples(&color, &depth, &camera, limit, rng).map_err(|e| e.for_id(id))?;
    debug!("{}: {} samples of {} pixels", id, sample.len(), size.pixels());

    Ok(View {
        image_path,
        camera,
        image: ImageSample {
            id: id.to_owned(),
            color,
            depth,
        },
        sample,
    })
}

impl SurfaceDataset {
    /// Read the manifest, then decode, render and sample every configured view.
    ///
    /// Any failing view aborts construction. When several fail, the error of the
    /// lowest-indexed one is returned regardless of scheduling.
    pub fn load<D>(config: &DatasetConfig, provider: &D) -> Result<Self>
    where
        D: DepthProvider + Sync + ?Sized,
    {
        if config.limit == Some(0) {
            return Err(Error::InvalidLimit);
        }

        let start = Instant::now();
        let manifest = Manifest::open(&config.data_dir, &config.profile)?;

        let Some(first) = config.ids.first() else {
            let size = config.target_size.unwrap_or(ImageSize::new(0, 0));
            info!("no identifiers configured; dataset is empty");
            return Ok(Self {
                size: TargetSize::native(size),
                limit: config.limit,
                views: Vec::new(),
            });
        };

        let native = manifest.probe_size(first)?;
        let size = TargetSize {
            native,
            target: config.target_size.unwrap_or(native),
        };
        info!(
            "loading {} views from {} (native {}, target {})",
            config.ids.len(),
            config.data_dir.display(),
            size.native,
            size.target
        );

        let mut inputs = Vec::with_capacity(config.ids.len());
        for id in &config.ids {
            inputs.push((id.as_str(), manifest.image_path(id)?, manifest.camera(id, &size)?));
        }

        let loaded: Vec<Result<View>> = inputs
            .into_par_iter()
            .enumerate()
            .map(|(index, (id, image_path, camera))| {
                let mut rng = view_rng(config.seed, index);
                load_view(id, image_path, camera, size.target, config.limit, provider, &mut rng)
            })
            .collect();
        let views = loaded.into_iter().collect::<Result<Vec<_>>>()?;

        let total: usize = views.iter().map(|v| v.sample.len()).sum();
        info!(
            "loaded {} views, {} samples in {:.2?}",
            views.len(),
            total,
            start.elapsed()
        );

        Ok(Self {
            size,
            limit: config.limit,
            views,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.views.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<DatasetItem<'_>> {
        let sample = &self.views.get(index)?.sample;
        Some(DatasetItem {
            features: sample.features(),
            labels: sample.labels(),
            mask: sample.mask(),
        })
    }

    pub fn view(&self, index: usize) -> Option<&View> {
        self.views.get(index)
    }

    pub fn views(&self) -> &[View] {
        &self.views
    }

    pub fn by_id(&self, id: &str) -> Option<&View> {
        self.views.iter().find(|v| v.id() == id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.views.iter().map(View::id)
    }

    /// Resolution samples were built at.
    pub fn image_size(&self) -> ImageSize {
        self.size.target
    }

    pub fn native_size(&self) -> ImageSize {
        self.size.native
    }

    pub fn camera(&self, index: usize) -> Option<&CameraRecord> {
        self.views.get(index).map(|v| &v.camera)
    }

    /// Re-thin view `index` from its cached colours and depth.
    pub fn resample<R: Rng + ?Sized>(&mut self, index: usize, rng: &mut R) -> Result<Option<&SurfaceSample>> {
        let limit = self.limit;
        let Some(view) = self.views.get_mut(index) else {
            return Ok(None);
        };

        view.sample = build_samples(&view.image.color, &view.image.depth, &view.camera, limit, rng)
            .map_err(|e| e.for_id(&view.image.id))?;
        Ok(Some(&view.sample))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_rng_is_per_index() {
        let a: u64 = view_rng(Some(3), 0).gen();
        let b: u64 = view_rng(Some(3), 1).gen();
        let c: u64 = view_rng(Some(3), 0).gen();

        assert_ne!(a, b);
        assert_eq!(a, c);
    }
}
