//! Image loading utilities for texture data
//!
//! Images are decoded with the `image` crate into tightly packed RGBA8 and
//! flipped so the first row is the bottom of the image, matching the texture
//! coordinate origin of the GPU.

use std::path::Path;

use super::AssetResult;

/// Decoded image data ready for GPU upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    /// Raw RGBA pixel data
    pub data: Vec<u8>,
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
}

impl ImageData {
    /// Load an image from a file path
    pub fn from_file<P: AsRef<Path>>(path: P, flip: bool) -> AssetResult<Self> {
        let path = path.as_ref();
        log::debug!("Loading image from: {:?}", path);

        let img = image::open(path).map_err(|e| {
            log::error!("Failed to load image {}: {}", path.display(), e);
            e
        })?;
        let img = if flip { img.flipv() } else { img };
        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();

        log::info!("Loaded image {}x{} from {:?}", width, height, path);
        Ok(Self {
            data: rgba.into_raw(),
            width,
            height,
        })
    }

    /// Load an image from encoded bytes
    pub fn from_bytes(bytes: &[u8], flip: bool) -> AssetResult<Self> {
        let img = image::load_from_memory(bytes)?;
        let img = if flip { img.flipv() } else { img };
        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        Ok(Self {
            data: rgba.into_raw(),
            width,
            height,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba, RgbaImage};

    fn two_row_png() -> Vec<u8> {
        let mut img = RgbaImage::new(1, 2);
        img.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        img.put_pixel(0, 1, Rgba([0, 0, 255, 255]));
        let mut bytes = std::io::Cursor::new(Vec::new());
        img.write_to(&mut bytes, ImageFormat::Png).unwrap();
        bytes.into_inner()
    }

    #[test]
    fn test_flip_moves_bottom_row_first() {
        let png = two_row_png();
        let upright = ImageData::from_bytes(&png, false).unwrap();
        let flipped = ImageData::from_bytes(&png, true).unwrap();

        assert_eq!((flipped.width, flipped.height), (1, 2));
        assert_eq!(&upright.data[..4], &[255, 0, 0, 255]);
        assert_eq!(&flipped.data[..4], &[0, 0, 255, 255]);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(ImageData::from_file("does/not/exist.png", true).is_err());
    }
}
