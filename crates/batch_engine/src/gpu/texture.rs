//! Textures and bindless handles

use bytemuck::{Pod, Zeroable};

use super::TextureId;

/// Texture filtering mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    /// Nearest texel
    Nearest,
    /// Bilinear
    Linear,
    /// Trilinear across mip levels
    LinearMipmapLinear,
}

/// Parameters for creating a 2D RGBA8 texture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureDescriptor {
    /// Debug label
    pub label: String,
    /// Width in texels
    pub width: u32,
    /// Height in texels
    pub height: u32,
    /// Number of mip levels, `None` for a full chain
    pub mip_levels: Option<u32>,
    /// Minification filter
    pub min_filter: Filter,
    /// Magnification filter
    pub mag_filter: Filter,
}

impl TextureDescriptor {
    /// Descriptor with a full mip chain and trilinear minification
    pub fn mipmapped(label: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            label: label.into(),
            width,
            height,
            mip_levels: None,
            min_filter: Filter::LinearMipmapLinear,
            mag_filter: Filter::Linear,
        }
    }

    /// Descriptor with a single level and bilinear filtering
    pub fn single_level(label: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            label: label.into(),
            width,
            height,
            mip_levels: Some(1),
            min_filter: Filter::Linear,
            mag_filter: Filter::Linear,
        }
    }

    /// Number of mip levels actually allocated
    pub fn level_count(&self) -> u32 {
        self.mip_levels
            .unwrap_or_else(|| 32 - self.width.max(self.height).max(1).leading_zeros())
    }
}

/// Opaque 64-bit handle a shader samples through without a bound unit
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Pod, Zeroable)]
pub struct TextureHandle(pub u64);

impl TextureHandle {
    /// Handle value meaning "no texture"
    pub const NONE: Self = Self(0);

    /// Whether this handle refers to a texture
    pub const fn is_some(self) -> bool {
        self.0 != 0
    }
}

/// Per-sub-mesh texture handles as laid out in the texture buffer
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
pub struct TextureHandleSet {
    /// Base colour
    pub diffuse: TextureHandle,
    /// Normal/bump map
    pub bump: TextureHandle,
    /// Material parameters (roughness, metalness...)
    pub material: TextureHandle,
}

const _: () = assert!(std::mem::size_of::<TextureHandleSet>() == 24);

/// GPU texture object
#[derive(Debug)]
pub struct Texture {
    id: TextureId,
    descriptor: TextureDescriptor,
    handle: Option<TextureHandle>,
}

impl Texture {
    /// Wrap a created texture name
    pub const fn new(id: TextureId, descriptor: TextureDescriptor) -> Self {
        Self {
            id,
            descriptor,
            handle: None,
        }
    }

    /// Texture name
    pub const fn id(&self) -> TextureId {
        self.id
    }

    /// Creation parameters
    pub const fn descriptor(&self) -> &TextureDescriptor {
        &self.descriptor
    }

    /// Bindless handle, once the texture has been made resident
    pub const fn handle(&self) -> Option<TextureHandle> {
        self.handle
    }

    /// Record the handle returned by the device
    pub fn set_handle(&mut self, handle: TextureHandle) {
        self.handle = Some(handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_mip_chain_length() {
        assert_eq!(TextureDescriptor::mipmapped("a", 256, 64).level_count(), 9);
        assert_eq!(TextureDescriptor::mipmapped("b", 1, 1).level_count(), 1);
        assert_eq!(TextureDescriptor::single_level("c", 512, 512).level_count(), 1);
    }
}
