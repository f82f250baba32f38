//! Explicit configuration handed to the dataset and basis constructors.

use crate::camera::ImageSize;
use crate::error::Result;
use crate::frequency::{BasisKind, FrequencyBasis, FrequencySampler};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;

/// Deterministic RNG when `seed` is set, OS entropy otherwise.
pub fn rng_from_seed(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Where a dataset lives and how its views are sampled.
#[derive(Debug, Clone)]
pub struct DatasetConfig {
    /// Root directory; every manifest path is relative to it.
    pub data_dir: PathBuf,
    /// Profile file (relative to `data_dir`) naming the camera and image list files.
    pub profile: PathBuf,
    /// Identifiers to load, in dataset order.
    pub ids: Vec<String>,
    /// Upper bound on the expected retained pixels per view. `None` keeps every pixel.
    pub limit: Option<usize>,
    /// Resolution samples are built at. `None` keeps the probed native size.
    pub target_size: Option<ImageSize>,
    /// Seed for per-view subsampling.
    pub seed: Option<u64>,
}

impl DatasetConfig {
    pub fn new(data_dir: impl Into<PathBuf>, profile: impl Into<PathBuf>, ids: Vec<String>) -> Self {
        Self {
            data_dir: data_dir.into(),
            profile: profile.into(),
            ids,
            limit: None,
            target_size: None,
            seed: None,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_target_size(mut self, size: ImageSize) -> Self {
        self.target_size = Some(size);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Which frequency basis to build and with what parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BasisConfig {
    Gaussian {
        map_size: usize,
        scale: f32,
    },
    Importance {
        map_size: usize,
        pos_scale: f32,
        dir_scale: f32,
    },
}

impl BasisConfig {
    pub const fn default_gaussian() -> Self {
        BasisConfig::Gaussian {
            map_size: 1024,
            scale: 10.0,
        }
    }

    pub const fn default_importance() -> Self {
        BasisConfig::Importance {
            map_size: 4096,
            pos_scale: 1000.0,
            dir_scale: 6.0,
        }
    }

    pub fn kind(&self) -> BasisKind {
        match self {
            BasisConfig::Gaussian { .. } => BasisKind::Gaussian,
            BasisConfig::Importance { .. } => BasisKind::Importance,
        }
    }

    pub fn map_size(&self) -> usize {
        match *self {
            BasisConfig::Gaussian { map_size, .. } | BasisConfig::Importance { map_size, .. } => {
                map_size
            }
        }
    }

    /// Build a fresh basis. `sampler` is only consulted for the importance kind.
    pub fn build<S: FrequencySampler + ?Sized>(
        &self,
        sampler: &S,
        seed: Option<u64>,
    ) -> Result<FrequencyBasis> {
        let mut rng = rng_from_seed(seed);

        match *self {
            BasisConfig::Gaussian { map_size, scale } => {
                FrequencyBasis::gaussian(map_size, scale, &mut rng)
            }
            BasisConfig::Importance {
                map_size,
                pos_scale,
                dir_scale,
            } => FrequencyBasis::importance(sampler, pos_scale, dir_scale, map_size, &mut rng),
        }
    }
}

impl Default for BasisConfig {
    fn default() -> Self {
        Self::default_gaussian()
    }
}
