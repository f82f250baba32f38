use approx::assert_relative_eq;
use glam::{Mat3, Mat4};
use image::{Rgb, RgbImage};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs;
use std::path::Path;
use surface_field::{DatasetConfig, DepthError, DepthMap, Error, ImageSize, SurfaceDataset};

// Row-major camera-to-world with the y and z columns pre-flipped, so after
// loading the camera sits at (0, 0, -2) looking down +z.
const FRONTAL_POSE: &str = "1 0 0 0  0 -1 0 0  0 0 -1 -2  0 0 0 1";
const FRONTAL_K: &str = "4 0 2  0 4 2  0 0 1";

const HOLE: usize = 5;

fn write_scene(dir: &Path, ids: &[&str]) {
    fs::create_dir_all(dir.join("images")).unwrap();
    fs::create_dir_all(dir.join("cams")).unwrap();

    fs::write(
        dir.join("profile.txt"),
        "camera_pose: cams/extrinsic.txt\ncamera_intrinsic: cams/intrinsic.txt\nimage_list: list.txt\n",
    )
    .unwrap();

    let mut list = String::new();
    let mut ext = String::new();
    let mut int = String::new();
    for (k, id) in ids.iter().enumerate() {
        let img = RgbImage::from_fn(4, 4, |x, y| Rgb([(x * 60) as u8, (y * 60) as u8, (k * 100) as u8]));
        img.save(dir.join("images").join(format!("{id}.png"))).unwrap();

        list.push_str(&format!("{id} images/{id}.png\n"));
        ext.push_str(&format!("{id} {FRONTAL_POSE}\n"));
        int.push_str(&format!("{id} {FRONTAL_K}\n"));
    }

    fs::write(dir.join("list.txt"), list).unwrap();
    fs::write(dir.join("cams/extrinsic.txt"), ext).unwrap();
    fs::write(dir.join("cams/intrinsic.txt"), int).unwrap();
}

fn ids(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn plane_with_hole(_: &Mat4, _: &Mat3, out: &mut DepthMap) -> Result<(), DepthError> {
    out.values.fill(2.0);
    if let Some(v) = out.values.get_mut(HOLE) {
        *v = 0.0;
    }
    Ok(())
}

#[test]
fn test_load_frontal_scene() {
    let dir = tempfile::tempdir().unwrap();
    write_scene(dir.path(), &["r_0", "r_1"]);

    let config = DatasetConfig::new(dir.path(), "profile.txt", ids(&["r_0", "r_1"])).with_seed(7);
    let dataset = SurfaceDataset::load(&config, &plane_with_hole).unwrap();

    assert_eq!(dataset.len(), 2);
    assert_eq!(dataset.image_size(), ImageSize::new(4, 4));
    assert_eq!(dataset.ids().collect::<Vec<_>>(), ["r_0", "r_1"]);
    assert!(dataset.get(2).is_none());

    let item = dataset.get(0).unwrap();
    assert_eq!(item.features.len(), 15);
    assert_eq!(item.labels.len(), 15);
    assert_eq!(item.mask.len(), 16);
    assert!(!item.mask[HOLE]);

    for f in item.features {
        assert_relative_eq!(f[2], 0.0, epsilon = 1e-5);
        assert!(f[5] > 0.0);
        let norm = (f[3] * f[3] + f[4] * f[4] + f[5] * f[5]).sqrt();
        assert_relative_eq!(norm, 1.0, epsilon = 1e-5);
    }

    // Pixel (1, 0) is the second retained sample: colour (60, 0, 0) / 255.
    assert_relative_eq!(item.labels[1][0], 60.0 / 255.0, epsilon = 1e-6);
    assert_relative_eq!(item.labels[1][1], 0.0);

    let second = dataset.by_id("r_1").unwrap();
    assert_relative_eq!(second.sample.labels()[0][2], 100.0 / 255.0, epsilon = 1e-6);
    assert_relative_eq!(dataset.camera(1).unwrap().origin().z, -2.0);
}

#[test]
fn test_seeded_thinning_is_reproducible() {
    let dir = tempfile::tempdir().unwrap();
    write_scene(dir.path(), &["a", "b", "c"]);

    let config = DatasetConfig::new(dir.path(), "profile.txt", ids(&["a", "b", "c"]))
        .with_limit(6)
        .with_seed(11);

    let first = SurfaceDataset::load(&config, &plane_with_hole).unwrap();
    let second = SurfaceDataset::load(&config, &plane_with_hole).unwrap();

    for i in 0..3 {
        let (x, y) = (first.get(i).unwrap(), second.get(i).unwrap());
        assert_eq!(x, y);
        assert!(x.features.len() < 15);
        assert_eq!(x.mask.iter().filter(|&&m| m).count(), x.features.len());
    }
}

#[test]
fn test_resample_redraws_one_view() {
    let dir = tempfile::tempdir().unwrap();
    write_scene(dir.path(), &["r_0"]);

    let config = DatasetConfig::new(dir.path(), "profile.txt", ids(&["r_0"]))
        .with_limit(4)
        .with_seed(0);
    let mut dataset = SurfaceDataset::load(&config, &plane_with_hole).unwrap();

    let mut rng = StdRng::seed_from_u64(99);
    let sample = dataset.resample(0, &mut rng).unwrap().unwrap().clone();
    assert!(!sample.mask()[HOLE]);
    assert_eq!(dataset.get(0).unwrap().features, sample.features());

    assert!(dataset.resample(1, &mut rng).unwrap().is_none());
}

#[test]
fn test_target_size_rescales_images_and_intrinsics() {
    let dir = tempfile::tempdir().unwrap();
    write_scene(dir.path(), &["r_0"]);

    let config = DatasetConfig::new(dir.path(), "profile.txt", ids(&["r_0"]))
        .with_target_size(ImageSize::new(2, 2));

    let provider = |_: &Mat4, k: &Mat3, out: &mut DepthMap| -> Result<(), DepthError> {
        if out.size != ImageSize::new(2, 2) || k.x_axis.x != 2.0 {
            return Err(DepthError(format!("unexpected buffer {} or focal {}", out.size, k.x_axis.x)));
        }
        out.values.fill(1.0);
        Ok(())
    };
    let dataset = SurfaceDataset::load(&config, &provider).unwrap();

    assert_eq!(dataset.native_size(), ImageSize::new(4, 4));
    assert_eq!(dataset.image_size(), ImageSize::new(2, 2));

    let k = dataset.camera(0).unwrap().intrinsic;
    assert_relative_eq!(k.x_axis.x, 2.0);
    assert_relative_eq!(k.z_axis.x, 1.0);
    assert_relative_eq!(k.z_axis.z, 1.0);

    let item = dataset.get(0).unwrap();
    assert_eq!(item.features.len(), 4);
    assert!(item.labels.iter().flatten().all(|c| (0.0..=1.0).contains(c)));
}

#[test]
fn test_unknown_id_names_id_and_file() {
    let dir = tempfile::tempdir().unwrap();
    write_scene(dir.path(), &["r_0"]);

    let config = DatasetConfig::new(dir.path(), "profile.txt", ids(&["r_0", "r_7"]));
    let err = SurfaceDataset::load(&config, &plane_with_hole).unwrap_err();

    let msg = err.to_string();
    assert!(matches!(err, Error::Parse { .. }), "{msg}");
    assert!(msg.contains("r_7"), "{msg}");
    assert!(msg.contains("list.txt"), "{msg}");
}

#[test]
fn test_bad_extrinsic_names_camera_file() {
    let dir = tempfile::tempdir().unwrap();
    write_scene(dir.path(), &["r_0"]);
    fs::write(dir.path().join("cams/extrinsic.txt"), "r_0 1 0 0 0 0 1\n").unwrap();

    let config = DatasetConfig::new(dir.path(), "profile.txt", ids(&["r_0"]));
    let msg = SurfaceDataset::load(&config, &plane_with_hole).unwrap_err().to_string();

    assert!(msg.contains("extrinsic.txt"), "{msg}");
    assert!(msg.contains("r_0"), "{msg}");
}

#[test]
fn test_missing_image_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    write_scene(dir.path(), &["r_0", "r_1"]);
    fs::remove_file(dir.path().join("images/r_1.png")).unwrap();

    let config = DatasetConfig::new(dir.path(), "profile.txt", ids(&["r_0", "r_1"]));
    let err = SurfaceDataset::load(&config, &plane_with_hole).unwrap_err();

    match err {
        Error::MissingFile { id, path } => {
            assert_eq!(id.as_deref(), Some("r_1"));
            assert!(path.ends_with("images/r_1.png"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_missing_profile_is_reported() {
    let dir = tempfile::tempdir().unwrap();

    let config = DatasetConfig::new(dir.path(), "profile.txt", ids(&["r_0"]));
    let err = SurfaceDataset::load(&config, &plane_with_hole).unwrap_err();

    assert!(matches!(err, Error::MissingFile { .. }));
}

#[test]
fn test_failing_provider_aborts_load() {
    let dir = tempfile::tempdir().unwrap();
    write_scene(dir.path(), &["r_0", "r_1"]);

    let provider = |_: &Mat4, _: &Mat3, _: &mut DepthMap| -> Result<(), DepthError> {
        Err(DepthError("renderer unavailable".into()))
    };

    let config = DatasetConfig::new(dir.path(), "profile.txt", ids(&["r_0", "r_1"]));
    let err = SurfaceDataset::load(&config, &provider).unwrap_err();

    assert!(matches!(err, Error::Depth { .. }));
}

#[test]
fn test_zero_limit_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    write_scene(dir.path(), &["r_0"]);

    let config = DatasetConfig::new(dir.path(), "profile.txt", ids(&["r_0"])).with_limit(0);
    assert!(matches!(
        SurfaceDataset::load(&config, &plane_with_hole),
        Err(Error::InvalidLimit)
    ));
}

#[test]
fn test_singular_intrinsic_names_intrinsic_file() {
    let dir = tempfile::tempdir().unwrap();
    write_scene(dir.path(), &["r_0"]);
    fs::write(dir.path().join("cams/intrinsic.txt"), "r_0 0 0 0  0 0 0  0 0 1\n").unwrap();

    let config = DatasetConfig::new(dir.path(), "profile.txt", ids(&["r_0"]));
    let err = SurfaceDataset::load(&config, &plane_with_hole).unwrap_err();

    let msg = err.to_string();
    assert!(matches!(err, Error::Parse { .. }), "{msg}");
    assert!(msg.contains("intrinsic.txt"), "{msg}");
    assert!(msg.contains("r_0"), "{msg}");
    assert!(msg.contains("singular"), "{msg}");
}

#[test]
fn test_lowest_failing_view_is_reported() {
    let names: Vec<String> = (0..12).map(|k| format!("v_{k:02}")).collect();
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();

    let dir = tempfile::tempdir().unwrap();
    write_scene(dir.path(), &refs);

    // Shift each camera along x by its index so the provider can tell views apart.
    let ext: String = refs
        .iter()
        .enumerate()
        .map(|(k, id)| format!("{id} 1 0 0 {k}  0 -1 0 0  0 0 -1 -2  0 0 0 1\n"))
        .collect();
    fs::write(dir.path().join("cams/extrinsic.txt"), ext).unwrap();

    let provider = |pose: &Mat4, _: &Mat3, out: &mut DepthMap| -> Result<(), DepthError> {
        let x = pose.w_axis.x;
        if x >= 3.0 && x as usize % 2 == 1 {
            return Err(DepthError(format!("no depth at x = {x}")));
        }
        out.values.fill(2.0);
        Ok(())
    };

    let config = DatasetConfig::new(dir.path(), "profile.txt", names.clone());
    for _ in 0..8 {
        match SurfaceDataset::load(&config, &provider).unwrap_err() {
            Error::Depth { id, .. } => assert_eq!(id, "v_03"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
