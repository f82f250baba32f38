use glam::{Mat3, Mat4, Vec3};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraPart {
    Extrinsic,
    Intrinsic,
}

impl std::fmt::Display for CameraPart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            CameraPart::Extrinsic => "extrinsic",
            CameraPart::Intrinsic => "intrinsic",
        })
    }
}

/// A malformed camera line, before it is attributed to an identifier and file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{part}: {reason}")]
pub struct ParseError {
    pub part: CameraPart,
    pub reason: String,
}

/// Width and height of an image in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageSize {
    pub width: usize,
    pub height: usize,
}

impl ImageSize {
    pub const fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    #[inline]
    pub fn pixels(&self) -> usize {
        self.width * self.height
    }
}

impl std::fmt::Display for ImageSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Native resolution of the source images and the resolution samples are built at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetSize {
    pub native: ImageSize,
    pub target: ImageSize,
}

impl TargetSize {
    /// Keep the native resolution.
    pub fn native(size: ImageSize) -> Self {
        Self {
            native: size,
            target: size,
        }
    }

    /// `(W_target / W_native, H_target / H_native)`.
    pub fn scale(&self) -> (f32, f32) {
        if self.native == self.target {
            return (1.0, 1.0);
        }
        (
            self.target.width as f32 / self.native.width as f32,
            self.target.height as f32 / self.native.height as f32,
        )
    }
}

/// Camera-to-world pose and pixel intrinsics for one image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraRecord {
    /// Camera-to-world transform with the y and z camera axes flipped
    /// relative to the input files.
    pub pose: Mat4,
    /// Intrinsics scaled to the target resolution.
    pub intrinsic: Mat3,
}

impl CameraRecord {
    pub fn new(pose: Mat4, intrinsic: Mat3) -> Self {
        Self { pose, intrinsic }
    }

    /// Camera centre in world space (the pose's translation column).
    #[inline]
    pub fn origin(&self) -> Vec3 {
        self.pose.w_axis.truncate()
    }

    /// Rotation block of the camera-to-world pose.
    #[inline]
    pub fn rotation(&self) -> Mat3 {
        Mat3::from_mat4(self.pose)
    }

    /// `R · K⁻¹`, or `None` when the intrinsic matrix cannot be inverted.
    pub fn pixel_to_world(&self) -> Option<Mat3> {
        let det = self.intrinsic.determinant();
        if !det.is_finite() || det.abs() < f32::MIN_POSITIVE {
            return None;
        }
        Some(self.rotation() * self.intrinsic.inverse())
    }

    /// Lift pixel `(u, v)` at depth `d` into world space.
    pub fn unproject(&self, u: f32, v: f32, depth: f32) -> Option<Vec3> {
        let m = self.pixel_to_world()?;
        Some(m * Vec3::new(u * depth, v * depth, depth) + self.origin())
    }

    /// Project a world point to `(u, v, depth)`; `None` when it lies behind the camera.
    pub fn project(&self, point: Vec3) -> Option<(f32, f32, f32)> {
        let cam = self.rotation().transpose() * (point - self.origin());
        let p = self.intrinsic * cam;
        if p.z <= 0.0 {
            return None;
        }
        Some((p.x / p.z, p.y / p.z, p.z))
    }
}

fn parse_floats<const N: usize>(text: &str, part: CameraPart) -> Result<[f32; N], ParseError> {
    let mut values = [0.0f32; N];
    let mut tokens = text.split_whitespace();

    for (index, slot) in values.iter_mut().enumerate() {
        let token = tokens.next().ok_or_else(|| ParseError {
            part,
            reason: format!("needs {N} values, found {index}"),
        })?;
        *slot = token.parse().map_err(|_| ParseError {
            part,
            reason: format!("value {index} is not a number: {token:?}"),
        })?;
    }

    Ok(values)
}

/// Parse a row-major 4x4 camera-to-world matrix and flip its y and z axes.
pub fn parse_extrinsic(text: &str) -> Result<Mat4, ParseError> {
    let rows: [f32; 16] = parse_floats(text, CameraPart::Extrinsic)?;

    // glam is column-major; the file is row-major.
    let mut pose = Mat4::from_cols_array(&rows).transpose();
    pose.y_axis = -pose.y_axis;
    pose.z_axis = -pose.z_axis;

    Ok(pose)
}

/// Parse a row-major 3x3 intrinsic matrix, rescaling rows 0 and 1.
pub fn parse_intrinsic(text: &str, scale: (f32, f32)) -> Result<Mat3, ParseError> {
    let mut rows: [f32; 9] = parse_floats(text, CameraPart::Intrinsic)?;

    let (sx, sy) = scale;
    rows[0..3].iter_mut().for_each(|v| *v *= sx);
    rows[3..6].iter_mut().for_each(|v| *v *= sy);

    Ok(Mat3::from_cols_array(&rows).transpose())
}

/// Build the camera record for `id` from its extrinsic and intrinsic lines.
pub fn load_camera(
    id: &str,
    extrinsic_text: &str,
    intrinsic_text: &str,
    size: &TargetSize,
) -> Result<CameraRecord, ParseError> {
    let pose = parse_extrinsic(extrinsic_text)?;
    let intrinsic = parse_intrinsic(intrinsic_text, size.scale())?;

    log::trace!("camera {}: origin {:?}", id, pose.w_axis.truncate());

    Ok(CameraRecord { pose, intrinsic })
}
