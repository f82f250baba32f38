//! Depth buffers and the provider interface that fills them.

use crate::camera::ImageSize;
use glam::{Mat3, Mat4};
use thiserror::Error;

/// Failure reported by a depth provider.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct DepthError(pub String);

/// Row-major `width * height` depth values; `0` marks background.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthMap {
    pub size: ImageSize,
    pub values: Vec<f32>,
}

impl DepthMap {
    /// A zero-filled buffer.
    pub fn zeros(size: ImageSize) -> Self {
        Self {
            size,
            values: vec![0.0; size.pixels()],
        }
    }

    pub fn from_values(size: ImageSize, values: Vec<f32>) -> Option<Self> {
        (values.len() == size.pixels()).then_some(Self { size, values })
    }

    #[inline]
    pub fn get(&self, u: usize, v: usize) -> f32 {
        self.values[v * self.size.width + u]
    }
}

/// Renders per-pixel depth for a camera. Implementations write only into `out_depth`
/// and must report failure instead of leaving the buffer zeroed.
pub trait DepthProvider {
    fn render_depth(
        &self,
        pose: &Mat4,
        intrinsic: &Mat3,
        out_depth: &mut DepthMap,
    ) -> Result<(), DepthError>;
}

impl<F> DepthProvider for F
where
    F: Fn(&Mat4, &Mat3, &mut DepthMap) -> Result<(), DepthError>,
{
    fn render_depth(
        &self,
        pose: &Mat4,
        intrinsic: &Mat3,
        out_depth: &mut DepthMap,
    ) -> Result<(), DepthError> {
        self(pose, intrinsic, out_depth)
    }
}
