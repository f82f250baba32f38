//! Surface light field training data.
//!
//! Posed images are combined with rendered depth to produce per-pixel
//! `(surface point, view direction) -> colour` samples, and Fourier-feature
//! frequency bases are built (or resumed from a checkpoint) to encode them.
//!
//! ```no_run
//! use surface_field::{DatasetConfig, DepthError, DepthMap, SurfaceDataset};
//! use glam::{Mat3, Mat4};
//!
//! let flat = |_: &Mat4, _: &Mat3, out: &mut DepthMap| -> Result<(), DepthError> {
//!     out.values.fill(2.0);
//!     Ok(())
//! };
//! let config = DatasetConfig::new("data/scene", "profile.txt", vec!["r_0".into()]).with_seed(0);
//! let dataset = SurfaceDataset::load(&config, &flat)?;
//! println!("{} views at {}", dataset.len(), dataset.image_size());
//! # Ok::<(), surface_field::Error>(())
//! ```

pub mod camera;
pub mod checkpoint;
pub mod config;
pub mod dataset;
pub mod depth;
pub mod error;
pub mod frequency;
pub mod manifest;
pub mod samples;

pub use camera::{CameraRecord, ImageSize, TargetSize};
pub use checkpoint::{resume_or_build, Checkpoint};
pub use config::{BasisConfig, DatasetConfig};
pub use dataset::{DatasetItem, SurfaceDataset, View};
pub use depth::{DepthError, DepthMap, DepthProvider};
pub use error::{Error, Result};
pub use frequency::{BasisKind, FrequencyBasis, FrequencySampler, SpectralSampler};
pub use manifest::Manifest;
pub use samples::{build_samples, ColorImage, SurfaceSample};
