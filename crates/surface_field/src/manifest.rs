//! Dataset manifest: the profile file and the per-identifier tables it points to.
//!
//! Profile (`key: value` per line, paths relative to the data directory):
//!
//! ```text
//! camera_pose: cameras/extrinsic.txt
//! camera_intrinsic: cameras/intrinsic.txt
//! image_list: images.txt
//! ```
//!
//! Tables hold one `<id> <payload>` record per line: a relative image path for
//! the image list, 16 floats for extrinsics, 9 floats for intrinsics.

use crate::camera::{load_camera, CameraPart, CameraRecord, ImageSize, TargetSize};
use crate::error::{Error, Result};
use log::debug;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

const KEY_CAMERA_POSE: &str = "camera_pose";
const KEY_CAMERA_INTRINSIC: &str = "camera_intrinsic";
const KEY_IMAGE_LIST: &str = "image_list";

/// Resolved paths named by a profile file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub camera_pose: PathBuf,
    pub camera_intrinsic: PathBuf,
    pub image_list: PathBuf,
}

impl Profile {
    /// Parse profile text; relative paths are joined onto `data_dir`.
    pub fn parse(text: &str, file: &Path, data_dir: &Path) -> Result<Self> {
        let mut camera_pose = None;
        let mut camera_intrinsic = None;
        let mut image_list = None;

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let Some((key, value)) = line.split_once(':') else {
                return Err(Error::Parse {
                    id: None,
                    file: file.to_path_buf(),
                    reason: format!("expected `key: value`, found {line:?}"),
                });
            };

            let slot = match key.trim() {
                KEY_CAMERA_POSE => &mut camera_pose,
                KEY_CAMERA_INTRINSIC => &mut camera_intrinsic,
                KEY_IMAGE_LIST => &mut image_list,
                other => {
                    debug!("{}: ignoring profile key {:?}", file.display(), other);
                    continue;
                }
            };
            *slot = Some(data_dir.join(value.trim()));
        }

        let require = |value: Option<PathBuf>, key: &str| {
            value.ok_or_else(|| Error::Parse {
                id: None,
                file: file.to_path_buf(),
                reason: format!("missing `{key}` entry"),
            })
        };

        Ok(Self {
            camera_pose: require(camera_pose, KEY_CAMERA_POSE)?,
            camera_intrinsic: require(camera_intrinsic, KEY_CAMERA_INTRINSIC)?,
            image_list: require(image_list, KEY_IMAGE_LIST)?,
        })
    }

    pub fn read(data_dir: &Path, profile_file: &Path) -> Result<Self> {
        let path = data_dir.join(profile_file);
        let text = fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
        Self::parse(&text, &path, data_dir)
    }
}

/// `<id> <payload>` records from one file. The first record for an id wins.
#[derive(Debug, Clone)]
pub struct IdTable {
    file: PathBuf,
    entries: HashMap<String, String>,
}

impl IdTable {
    pub fn parse(text: &str, file: &Path) -> Self {
        let mut entries = HashMap::new();

        for line in text.lines() {
            let line = line.trim();
            let mut parts = line.splitn(2, char::is_whitespace);
            let Some(id) = parts.next().filter(|id| !id.is_empty()) else {
                continue;
            };
            let payload = parts.next().unwrap_or("").trim();

            entries
                .entry(id.to_owned())
                .or_insert_with(|| payload.to_owned());
        }

        Self {
            file: file.to_path_buf(),
            entries,
        }
    }

    pub fn read(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Ok(Self::parse(&text, path))
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Payload for `id`, or a parse error naming the id and this file.
    pub fn get(&self, id: &str) -> Result<&str> {
        match self.entries.get(id) {
            Some(payload) if !payload.is_empty() => Ok(payload),
            Some(_) => Err(Error::Parse {
                id: Some(id.to_owned()),
                file: self.file.clone(),
                reason: "record has no payload".into(),
            }),
            None => Err(Error::Parse {
                id: Some(id.to_owned()),
                file: self.file.clone(),
                reason: "no record for this id".into(),
            }),
        }
    }
}

/// Profile plus the three tables it references, read once.
#[derive(Debug, Clone)]
pub struct Manifest {
    data_dir: PathBuf,
    profile: Profile,
    images: IdTable,
    extrinsics: IdTable,
    intrinsics: IdTable,
}

impl Manifest {
    pub fn open(data_dir: impl AsRef<Path>, profile_file: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        let profile = Profile::read(&data_dir, profile_file.as_ref())?;

        let images = IdTable::read(&profile.image_list)?;
        let extrinsics = IdTable::read(&profile.camera_pose)?;
        let intrinsics = IdTable::read(&profile.camera_intrinsic)?;

        debug!(
            "manifest {}: {} images, {} extrinsics, {} intrinsics",
            data_dir.display(),
            images.len(),
            extrinsics.len(),
            intrinsics.len()
        );

        Ok(Self {
            data_dir,
            profile,
            images,
            extrinsics,
            intrinsics,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    /// Absolute path of the image for `id`; the file must exist.
    pub fn image_path(&self, id: &str) -> Result<PathBuf> {
        let path = self.data_dir.join(self.images.get(id)?);
        if !path.is_file() {
            return Err(Error::MissingFile {
                id: Some(id.to_owned()),
                path,
            });
        }
        Ok(path)
    }

    /// Native resolution of the image for `id`, read from its header.
    pub fn probe_size(&self, id: &str) -> Result<ImageSize> {
        let path = self.image_path(id)?;
        let (width, height) = image::image_dimensions(&path).map_err(|source| Error::Image {
            id: id.to_owned(),
            path: path.clone(),
            source,
        })?;
        Ok(ImageSize::new(width as usize, height as usize))
    }

    /// Camera for `id` with intrinsics scaled to `size.target`.
    ///
    /// A singular intrinsic matrix is reported against the intrinsic file.
    pub fn camera(&self, id: &str, size: &TargetSize) -> Result<CameraRecord> {
        let extrinsic = self.extrinsics.get(id)?;
        let intrinsic = self.intrinsics.get(id)?;

        let camera = load_camera(id, extrinsic, intrinsic, size).map_err(|e| Error::Parse {
            id: Some(id.to_owned()),
            file: match e.part {
                CameraPart::Extrinsic => self.extrinsics.file().to_path_buf(),
                CameraPart::Intrinsic => self.intrinsics.file().to_path_buf(),
            },
            reason: e.to_string(),
        })?;

        if camera.pixel_to_world().is_none() {
            return Err(Error::Parse {
                id: Some(id.to_owned()),
                file: self.intrinsics.file().to_path_buf(),
                reason: format!("{}: matrix is singular", CameraPart::Intrinsic),
            });
        }
        Ok(camera)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_keys_and_colons_in_values() {
        let text = "camera_pose: cams/ext.txt\n\n camera_intrinsic : cams/int.txt\nimage_list: C:/list.txt\nnote: ignored\n";
        let profile = Profile::parse(text, Path::new("profile.txt"), Path::new("/data")).unwrap();

        assert_eq!(profile.camera_pose, Path::new("/data/cams/ext.txt"));
        assert_eq!(profile.camera_intrinsic, Path::new("/data/cams/int.txt"));
        assert_eq!(profile.image_list, Path::new("/data/C:/list.txt"));
    }

    #[test]
    fn test_profile_missing_key_names_the_file() {
        let err = Profile::parse(
            "camera_pose: a\nimage_list: b\n",
            Path::new("scene/profile.txt"),
            Path::new("scene"),
        )
        .unwrap_err();

        let msg = err.to_string();
        assert!(msg.contains("scene/profile.txt"), "{msg}");
        assert!(msg.contains("camera_intrinsic"), "{msg}");
    }

    #[test]
    fn test_profile_line_without_separator() {
        let err = Profile::parse("camera_pose a\n", Path::new("p.txt"), Path::new(".")).unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }

    #[test]
    fn test_id_table_first_record_wins() {
        let table = IdTable::parse(
            "r_0 train/r_0.png\n\nr_1   train/r_1.png \nr_0 other.png\nlonely\n",
            Path::new("images.txt"),
        );

        assert_eq!(table.len(), 3);
        assert_eq!(table.get("r_0").unwrap(), "train/r_0.png");
        assert_eq!(table.get("r_1").unwrap(), "train/r_1.png");
    }

    #[test]
    fn test_id_table_errors_name_id_and_file() {
        let table = IdTable::parse("r_0 a.png\nlonely\n", Path::new("images.txt"));

        let msg = table.get("r_9").unwrap_err().to_string();
        assert!(msg.contains("r_9") && msg.contains("images.txt"), "{msg}");

        let msg = table.get("lonely").unwrap_err().to_string();
        assert!(msg.contains("no payload"), "{msg}");
    }
}
