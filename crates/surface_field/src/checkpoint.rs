//! Saving and resuming the frequency basis alongside a step counter and opaque model state.

use crate::error::{Error, Result};
use crate::frequency::{BasisKind, FrequencyBasis, INPUT_DIM};
use log::{debug, info};
use slfc::SlfcCheckpoint;
use std::fs;
use std::path::{Path, PathBuf};

pub const CHECKPOINT_EXT: &str = "slfc";
pub const FINAL_FILE_NAME: &str = "model_final.slfc";

/// `model_epoch_0007.slfc` for epoch 7. Zero padding keeps lexicographic order chronological.
pub fn epoch_file_name(epoch: u32) -> String {
    format!("model_epoch_{epoch:04}.{CHECKPOINT_EXT}")
}

#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    pub basis: FrequencyBasis,
    pub step: u64,
    /// Serialized network state; the basis layer never interprets it.
    pub model_state: Option<Vec<u8>>,
}

impl Checkpoint {
    pub fn new(basis: FrequencyBasis) -> Self {
        Self {
            basis,
            step: 0,
            model_state: None,
        }
    }

    fn to_slfc(&self) -> Result<SlfcCheckpoint> {
        let rows = u32::try_from(self.basis.rows())
            .map_err(|_| Error::InvalidBasis(format!("{} rows do not fit a checkpoint", self.basis.rows())))?;

        Ok(SlfcCheckpoint {
            kind: self.basis.kind(),
            step: self.step,
            rows,
            cols: INPUT_DIM as u32,
            matrix: self.basis.to_row_major(),
            phases: self.basis.phases().map(<[f32]>::to_vec),
            model_state: self.model_state.clone(),
        })
    }

    fn from_slfc(raw: SlfcCheckpoint) -> Result<Self> {
        let basis = FrequencyBasis::from_parts(raw.kind, raw.cols as usize, &raw.matrix, raw.phases)?;
        Ok(Self {
            basis,
            step: raw.step,
            model_state: raw.model_state,
        })
    }

    /// Write to `path`, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }

        slfc::write_file(path, &self.to_slfc()?).map_err(|e| Error::io(path, e))?;
        debug!("wrote checkpoint {} (step {})", path.display(), self.step);
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = slfc::read_file(path).map_err(|e| Error::io(path, e))?;
        Self::from_slfc(raw)
    }
}

/// Lexicographically last `.slfc` file in `dir`, if any. A missing directory has none.
pub fn latest_checkpoint(dir: impl AsRef<Path>) -> Result<Option<PathBuf>> {
    let dir = dir.as_ref();
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::io(dir, e)),
    };

    let mut found = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| Error::io(dir, e))?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == CHECKPOINT_EXT) {
            found.push(path);
        }
    }

    found.sort();
    Ok(found.pop())
}

/// Reload the latest checkpoint in `dir` unless `restart` is set or none exists;
/// otherwise call `build` for a fresh basis at step 0.
///
/// Returns the checkpoint and the file it came from, if any.
pub fn resume_or_build<F>(
    dir: impl AsRef<Path>,
    restart: bool,
    expected: BasisKind,
    build: F,
) -> Result<(Checkpoint, Option<PathBuf>)>
where
    F: FnOnce() -> Result<FrequencyBasis>,
{
    let dir = dir.as_ref();

    if !restart {
        if let Some(path) = latest_checkpoint(dir)? {
            let ckpt = Checkpoint::load(&path)?;
            if ckpt.basis.kind() != expected {
                return Err(Error::CheckpointKind {
                    path,
                    expected,
                    found: ckpt.basis.kind(),
                });
            }

            info!(
                "resuming from {} (step {}, {} frequencies)",
                path.display(),
                ckpt.step,
                ckpt.basis.rows()
            );
            return Ok((ckpt, Some(path)));
        }
    }

    info!("building a fresh {:?} frequency basis", expected);
    Ok((Checkpoint::new(build()?), None))
}
