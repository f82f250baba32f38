//! Frequency bases for Fourier-feature encodings of `(position, direction)`.
//!
//! Two kinds are built here:
//! - a Gaussian basis, `N x 6` standard normals times a fixed scale;
//! - an importance-sampled basis whose rows come from a [`FrequencySampler`]
//!   shaped by a positional and a directional scale, plus `N` phases drawn
//!   uniformly from `[0, 2π)`.
//!
//! A basis is immutable once built and can be shared across threads.

use crate::error::{Error, Result};
use crate::samples::{Feature, FEATURE_DIM};
use log::warn;
use rand::{Rng, RngCore};
use rand_distr::{Distribution, StandardNormal};
use std::f32::consts::TAU;

pub use slfc::BasisKind;

/// Input dimensionality of the encoding (position + direction).
pub const INPUT_DIM: usize = FEATURE_DIM;

/// Re-draw attempts per degenerate row before giving up.
pub const MAX_REDRAWS: usize = 64;

pub type FrequencyRow = [f32; INPUT_DIM];

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct SamplerError(pub String);

/// Source of importance-sampled frequency vectors.
///
/// Implementations draw `n` rows of `INPUT_DIM` coefficients from a spectral
/// density shaped by `pos_scale` (spread over the positional block) and
/// `dir_scale` (spread over the directional block).
pub trait FrequencySampler {
    fn sample_frequencies(
        &self,
        pos_scale: f32,
        dir_scale: f32,
        n: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<FrequencyRow>, SamplerError>;

    /// Frequencies plus `n` phase offsets uniform in `[0, 2π)`.
    fn sample_directional_positional_frequencies(
        &self,
        pos_scale: f32,
        dir_scale: f32,
        n: usize,
        rng: &mut dyn RngCore,
    ) -> Result<(Vec<FrequencyRow>, Vec<f32>), SamplerError> {
        let rows = self.sample_frequencies(pos_scale, dir_scale, n, rng)?;
        let phases = (0..n).map(|_| rng.gen_range(0.0..TAU)).collect();
        Ok((rows, phases))
    }
}

/// Draws from the spectrum of `exp(-pos_scale·|Δx|²/2) · exp(dir_scale·(d·d' − 1))`.
///
/// For unit directions `d·d' − 1 = −|d − d'|²/2`, so both factors are
/// isotropic Gaussians and the spectrum is Gaussian with standard deviation
/// `sqrt(pos_scale)` on xyz and `sqrt(dir_scale)` on the direction block.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpectralSampler;

impl FrequencySampler for SpectralSampler {
    fn sample_frequencies(
        &self,
        pos_scale: f32,
        dir_scale: f32,
        n: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<FrequencyRow>, SamplerError> {
        if !(pos_scale > 0.0 && pos_scale.is_finite()) {
            return Err(SamplerError(format!("pos_scale must be positive, got {pos_scale}")));
        }
        if !(dir_scale > 0.0 && dir_scale.is_finite()) {
            return Err(SamplerError(format!("dir_scale must be positive, got {dir_scale}")));
        }

        let (sp, sd) = (pos_scale.sqrt(), dir_scale.sqrt());
        let rows = (0..n)
            .map(|_| {
                let mut row = [0.0f32; INPUT_DIM];
                for (k, w) in row.iter_mut().enumerate() {
                    let z: f32 = StandardNormal.sample(&mut *rng);
                    *w = if k < 3 { sp * z } else { sd * z };
                }
                row
            })
            .collect();

        Ok(rows)
    }
}

#[inline]
fn is_zero_row(row: &FrequencyRow) -> bool {
    row.iter().all(|&w| w == 0.0)
}

/// Replace all-zero rows with fresh draws; fails after [`MAX_REDRAWS`] attempts on one row.
fn redraw_degenerate<F>(rows: &mut [FrequencyRow], mut draw: F) -> Result<()>
where
    F: FnMut() -> Result<FrequencyRow>,
{
    let total = rows.len();

    for (index, row) in rows.iter_mut().enumerate() {
        if !is_zero_row(row) {
            continue;
        }

        warn!("frequency row {} of {} is all zero; re-drawing", index, total);

        let mut attempts = 0;
        while is_zero_row(row) {
            if attempts == MAX_REDRAWS {
                return Err(Error::DegenerateBasis {
                    rows: total,
                    attempts,
                });
            }
            *row = draw()?;
            attempts += 1;
        }
    }

    Ok(())
}

fn gaussian_row<R: Rng + ?Sized>(scale: f32, rng: &mut R) -> FrequencyRow {
    let mut row = [0.0f32; INPUT_DIM];
    for w in row.iter_mut() {
        let z: f32 = StandardNormal.sample(rng);
        *w = z * scale;
    }
    row
}

/// Projection matrix (and phases, for the importance kind) used to encode samples.
#[derive(Debug, Clone, PartialEq)]
pub struct FrequencyBasis {
    kind: BasisKind,
    rows: Vec<FrequencyRow>,
    phases: Option<Vec<f32>>,
}

impl FrequencyBasis {
    /// `map_size x 6` standard normals scaled by `scale`.
    pub fn gaussian<R: Rng + ?Sized>(map_size: usize, scale: f32, rng: &mut R) -> Result<Self> {
        if map_size == 0 {
            return Err(Error::InvalidBasis("map size must be positive".into()));
        }
        if !scale.is_finite() || scale == 0.0 {
            return Err(Error::InvalidBasis(format!("scale must be finite and non-zero, got {scale}")));
        }

        let mut rows: Vec<FrequencyRow> = (0..map_size).map(|_| gaussian_row(scale, &mut *rng)).collect();
        redraw_degenerate(&mut rows, || Ok(gaussian_row(scale, &mut *rng)))?;

        Ok(Self {
            kind: BasisKind::Gaussian,
            rows,
            phases: None,
        })
    }

    /// `map_size` rows from `sampler` plus uniform phases in `[0, 2π)`.
    pub fn importance<S: FrequencySampler + ?Sized>(
        sampler: &S,
        pos_scale: f32,
        dir_scale: f32,
        map_size: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Self> {
        if map_size == 0 {
            return Err(Error::InvalidBasis("map size must be positive".into()));
        }

        let (mut rows, phases) =
            sampler.sample_directional_positional_frequencies(pos_scale, dir_scale, map_size, rng)?;

        if rows.len() != map_size {
            return Err(Error::InvalidBasis(format!(
                "sampler returned {} rows, {} requested",
                rows.len(),
                map_size
            )));
        }
        if phases.len() != map_size {
            return Err(Error::InvalidBasis(format!(
                "sampler returned {} phases, {} requested",
                phases.len(),
                map_size
            )));
        }

        redraw_degenerate(&mut rows, || {
            sampler
                .sample_frequencies(pos_scale, dir_scale, 1, &mut *rng)?
                .into_iter()
                .next()
                .ok_or_else(|| Error::InvalidBasis("sampler returned no row on re-draw".into()))
        })?;

        Self::validated(BasisKind::Importance, rows, Some(phases))
    }

    /// Rebuild a basis from a stored row-major matrix, e.g. a checkpoint.
    ///
    /// Zero rows are reported but kept, so the basis stays identical to the stored one.
    pub fn from_parts(
        kind: BasisKind,
        cols: usize,
        matrix: &[f32],
        phases: Option<Vec<f32>>,
    ) -> Result<Self> {
        if cols != INPUT_DIM {
            return Err(Error::InvalidBasis(format!(
                "expected {INPUT_DIM} columns, found {cols}"
            )));
        }
        if matrix.is_empty() || matrix.len() % INPUT_DIM != 0 {
            return Err(Error::InvalidBasis(format!(
                "matrix of {} values is not a whole number of {INPUT_DIM}-wide rows",
                matrix.len()
            )));
        }

        let rows: Vec<FrequencyRow> = matrix
            .chunks_exact(INPUT_DIM)
            .map(|c| [c[0], c[1], c[2], c[3], c[4], c[5]])
            .collect();

        let zero_rows = rows.iter().filter(|r| is_zero_row(r)).count();
        if zero_rows > 0 {
            warn!("stored frequency basis has {} all-zero rows", zero_rows);
        }

        Self::validated(kind, rows, phases)
    }

    fn validated(kind: BasisKind, rows: Vec<FrequencyRow>, phases: Option<Vec<f32>>) -> Result<Self> {
        if rows.iter().flatten().any(|w| !w.is_finite()) {
            return Err(Error::InvalidBasis("matrix holds non-finite values".into()));
        }

        match (kind, phases.as_ref()) {
            (BasisKind::Gaussian, Some(_)) => {
                return Err(Error::InvalidBasis("gaussian basis carries no phases".into()))
            }
            (BasisKind::Importance, None) => {
                return Err(Error::InvalidBasis("importance basis needs phases".into()))
            }
            (BasisKind::Importance, Some(p)) if p.len() != rows.len() => {
                return Err(Error::InvalidBasis(format!(
                    "{} phases for {} rows",
                    p.len(),
                    rows.len()
                )))
            }
            (BasisKind::Importance, Some(p)) if p.iter().any(|b| !b.is_finite()) => {
                return Err(Error::InvalidBasis("phases hold non-finite values".into()))
            }
            _ => {}
        }

        Ok(Self { kind, rows, phases })
    }

    pub fn kind(&self) -> BasisKind {
        self.kind
    }

    /// `N`.
    pub fn rows(&self) -> usize {
        self.rows.len()
    }

    /// `D`.
    pub fn cols(&self) -> usize {
        INPUT_DIM
    }

    pub fn row(&self, index: usize) -> Option<&FrequencyRow> {
        self.rows.get(index)
    }

    pub fn matrix(&self) -> &[FrequencyRow] {
        &self.rows
    }

    pub fn phases(&self) -> Option<&[f32]> {
        self.phases.as_deref()
    }

    /// Row-major copy of the matrix.
    pub fn to_row_major(&self) -> Vec<f32> {
        self.rows.iter().flatten().copied().collect()
    }

    /// Width of the encoded vector.
    pub fn encoded_len(&self) -> usize {
        match self.kind {
            BasisKind::Gaussian => 2 * self.rows.len(),
            BasisKind::Importance => self.rows.len(),
        }
    }

    /// Encode one sample into `out` (cleared first).
    ///
    /// Gaussian: `[sin(2π·Bx), cos(2π·Bx)]`. Importance: `sqrt(2/N)·cos(Wx + b)`.
    pub fn encode_into(&self, x: &Feature, out: &mut Vec<f32>) {
        out.clear();
        out.reserve(self.encoded_len());

        let dot = |row: &FrequencyRow| row.iter().zip(x).map(|(w, v)| w * v).sum::<f32>();

        match (&self.kind, self.phases.as_deref()) {
            (BasisKind::Importance, Some(phases)) => {
                let norm = (2.0 / self.rows.len() as f32).sqrt();
                out.extend(
                    self.rows
                        .iter()
                        .zip(phases)
                        .map(|(row, b)| norm * (dot(row) + b).cos()),
                );
            }
            _ => {
                out.extend(self.rows.iter().map(|row| (TAU * dot(row)).sin()));
                out.extend(self.rows.iter().map(|row| (TAU * dot(row)).cos()));
            }
        }
    }

    pub fn encode(&self, x: &Feature) -> Vec<f32> {
        let mut out = Vec::new();
        self.encode_into(x, &mut out);
        out
    }
}
