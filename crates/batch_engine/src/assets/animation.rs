//! `.anim` skeletal animation
//!
//! ```text
//! MeshAnim <version> <frames> <joints> <frame rate>
//! <frames * joints matrices, 16 floats each>
//! ```
//!
//! Matrices are stored frame-major: all joints of frame 0, then frame 1, and
//! so on.

use std::path::Path;

use super::tokens::TokenReader;
use super::{read_source, AssetError, AssetResult};
use crate::foundation::math::Mat4;

const MAGIC: &str = "MeshAnim";
const VERSION: i32 = 1;

/// Per-frame joint matrices of one animation clip
#[derive(Debug, Clone, PartialEq)]
pub struct Animation {
    joint_count: usize,
    frame_count: usize,
    frame_rate: f32,
    joints: Vec<Mat4>,
}

impl Animation {
    /// Build a clip from frame-major joint matrices
    ///
    /// Trailing matrices that do not fill a whole frame are dropped.
    pub fn new(joint_count: usize, frame_rate: f32, mut joints: Vec<Mat4>) -> Self {
        let frame_count = if joint_count == 0 { 0 } else { joints.len() / joint_count };
        if joints.len() != frame_count * joint_count {
            log::warn!(
                "Animation has {} matrices, not a multiple of {} joints",
                joints.len(),
                joint_count
            );
            joints.truncate(frame_count * joint_count);
        }
        Self {
            joint_count,
            frame_count,
            frame_rate,
            joints,
        }
    }

    /// Load a `.anim` file
    pub fn from_file(path: impl AsRef<Path>) -> AssetResult<Self> {
        let path = path.as_ref();
        let source = read_source(path)?;
        let animation = Self::parse(path, &source).map_err(|e| {
            log::error!("Failed to load animation {}: {}", path.display(), e);
            e
        })?;
        log::info!(
            "Loaded animation {} ({} frames, {} joints, {} fps)",
            path.display(),
            animation.frame_count,
            animation.joint_count,
            animation.frame_rate
        );
        Ok(animation)
    }

    /// Parse `.anim` text; `path` is only used in error messages
    pub fn parse(path: &Path, source: &str) -> AssetResult<Self> {
        let mut reader = TokenReader::new(path, source);

        let magic = reader.token("file type")?;
        if magic != MAGIC {
            return Err(reader.format_error(format!("expected '{MAGIC}', found '{magic}'")));
        }
        let version: i32 = reader.parse("version")?;
        if version != VERSION {
            return Err(reader.format_error(format!("unsupported version {version}")));
        }

        let frame_count: usize = reader.parse("frame count")?;
        let joint_count: usize = reader.parse("joint count")?;
        let frame_rate: f32 = reader.parse("frame rate")?;

        let total = frame_count.checked_mul(joint_count).ok_or_else(|| {
            reader.format_error(format!("{frame_count} frames of {joint_count} joints overflow"))
        })?;
        let mut joints = Vec::with_capacity(total.min(1 << 20));
        for _ in 0..total {
            joints.push(reader.mat4("joint matrix")?);
        }

        Ok(Self {
            joint_count,
            frame_count,
            frame_rate,
            joints,
        })
    }

    /// Joints animated per frame
    pub const fn joint_count(&self) -> usize {
        self.joint_count
    }

    /// Number of frames
    pub const fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Frames per second
    pub const fn frame_rate(&self) -> f32 {
        self.frame_rate
    }

    /// Exactly [`Self::joint_count`] matrices for `frame`
    ///
    /// Asking for a frame past the end is a caller bug and returns
    /// [`AssetError::IndexOutOfRange`].
    pub fn joint_data(&self, frame: usize) -> AssetResult<&[Mat4]> {
        if frame >= self.frame_count {
            return Err(AssetError::IndexOutOfRange {
                index: frame,
                len: self.frame_count,
            });
        }
        let start = frame * self.joint_count;
        Ok(&self.joints[start..start + self.joint_count])
    }

    /// Every joint matrix, frame-major
    pub fn all_joints(&self) -> &[Mat4] {
        &self.joints
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;

    fn clip() -> Animation {
        let frames = (0..6)
            .map(|i| Mat4::new_translation(&Vec3::new(i as f32, 0.0, 0.0)))
            .collect();
        Animation::new(2, 24.0, frames)
    }

    #[test]
    fn test_joint_data_per_frame() {
        let anim = clip();
        assert_eq!(anim.frame_count(), 3);
        for frame in 0..3 {
            let joints = anim.joint_data(frame).unwrap();
            assert_eq!(joints.len(), 2);
            assert_eq!(joints[0][(0, 3)], (frame * 2) as f32);
        }
        assert!(matches!(
            anim.joint_data(3),
            Err(AssetError::IndexOutOfRange { index: 3, len: 3 })
        ));
    }

    #[test]
    fn test_parse_clip() {
        let source = "MeshAnim 1 2 1 30\n\
            1 0 0 0 0 1 0 0 0 0 1 0 0 0 0 1\n\
            1 0 0 0 0 1 0 0 0 0 1 0 0 2 0 1\n";
        let anim = Animation::parse(Path::new("clip.anim"), source).unwrap();
        assert_eq!(anim.joint_count(), 1);
        assert_eq!(anim.frame_rate(), 30.0);
        assert_eq!(anim.joint_data(1).unwrap()[0][(1, 3)], 2.0);
    }

    #[test]
    fn test_parse_rejects_other_files() {
        let err = Animation::parse(Path::new("x"), "MeshGeometry 1").unwrap_err();
        assert!(matches!(err, AssetError::Format { .. }));

        let err = Animation::parse(Path::new("x"), "MeshAnim 1 2 1 30\n1 0 0").unwrap_err();
        assert!(matches!(err, AssetError::Parse { .. }));
    }

    #[test]
    fn test_parse_rejects_unsupported_version() {
        let source = "MeshAnim 99 1 1 30\n1 0 0 0 0 1 0 0 0 0 1 0 0 0 0 1\n";
        let err = Animation::parse(Path::new("clip.anim"), source).unwrap_err();
        assert!(matches!(err, AssetError::Format { .. }));
    }

    #[test]
    fn test_parse_rejects_oversized_header() {
        let source = format!("MeshAnim 1 {} 2 30\n", usize::MAX);
        let err = Animation::parse(Path::new("clip.anim"), &source).unwrap_err();
        assert!(matches!(err, AssetError::Format { .. }));
    }
}
