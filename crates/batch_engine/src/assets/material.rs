//! `.mat` mesh materials
//!
//! ```text
//! MeshMat 1 <materials> <sub-meshes>
//! <name> <entries> <channel>:<path> ...
//! ...
//! <material index per sub-mesh>
//! ```
//!
//! Channel paths are relative to a base directory chosen by the caller.

use std::collections::BTreeMap;
use std::path::Path;

use super::image_loader::ImageData;
use super::tokens::TokenReader;
use super::{read_source, AssetError, AssetResult};
use crate::gpu::{GpuDevice, Texture, TextureDescriptor, TextureHandleSet};

const MAGIC: &str = "MeshMat";
const VERSION: u32 = 1;

/// Channel holding the base colour map
pub const DIFFUSE: &str = "Diffuse";
/// Channel holding the normal/bump map
pub const BUMP: &str = "Bump";
/// Channel holding the material parameter map
pub const MATERIAL: &str = "Material";

/// One named material: a set of `channel -> texture path` entries
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MaterialEntry {
    /// Material name
    pub name: String,
    entries: BTreeMap<String, String>,
}

/// GPU textures of one material and their resident handles
#[derive(Debug)]
pub struct TextureSet {
    /// Base colour texture
    pub diffuse: Texture,
    /// Normal/bump texture
    pub bump: Option<Texture>,
    /// Material parameter texture
    pub material: Option<Texture>,
    /// Bindless handles in shader layout
    pub handles: TextureHandleSet,
}

impl MaterialEntry {
    /// Empty material called `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: BTreeMap::new(),
        }
    }

    /// Add or replace a channel
    pub fn with_entry(mut self, channel: impl Into<String>, path: impl Into<String>) -> Self {
        self.entries.insert(channel.into(), path.into());
        self
    }

    /// Texture path of `channel`
    pub fn entry(&self, channel: &str) -> Option<&str> {
        self.entries.get(channel).map(String::as_str)
    }

    /// Every `(channel, path)` pair
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(c, p)| (c.as_str(), p.as_str()))
    }

    /// Decode and upload this material's textures, making each resident
    ///
    /// The diffuse channel is required; bump and material maps are optional.
    pub fn load_textures<D>(&self, base_dir: &Path, device: &mut D) -> AssetResult<TextureSet>
    where
        D: GpuDevice + ?Sized,
    {
        let diffuse_path = self
            .entry(DIFFUSE)
            .ok_or_else(|| AssetError::MissingChannel(DIFFUSE.to_string()))?;
        let diffuse = upload(device, base_dir, diffuse_path, true)?;
        let bump = self
            .entry(BUMP)
            .map(|path| upload(device, base_dir, path, false))
            .transpose()?;
        let material = self
            .entry(MATERIAL)
            .map(|path| upload(device, base_dir, path, true))
            .transpose()?;

        let handles = TextureHandleSet {
            diffuse: diffuse.handle().unwrap_or_default(),
            bump: bump.as_ref().and_then(Texture::handle).unwrap_or_default(),
            material: material.as_ref().and_then(Texture::handle).unwrap_or_default(),
        };

        log::debug!("Loaded textures for material '{}'", self.name);
        Ok(TextureSet {
            diffuse,
            bump,
            material,
            handles,
        })
    }
}

fn upload<D>(device: &mut D, base_dir: &Path, file: &str, mipmapped: bool) -> AssetResult<Texture>
where
    D: GpuDevice + ?Sized,
{
    let path = base_dir.join(file);
    let image = ImageData::from_file(&path, true)?;
    let label = path.display().to_string();
    let descriptor = if mipmapped {
        TextureDescriptor::mipmapped(label, image.width, image.height)
    } else {
        TextureDescriptor::single_level(label, image.width, image.height)
    };

    let mut texture = device.create_texture(&descriptor, &image.data)?;
    device.make_texture_resident(&mut texture)?;
    Ok(texture)
}

/// Materials of a mesh and which one each sub-mesh uses
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MeshMaterial {
    materials: Vec<MaterialEntry>,
    layers: Vec<usize>,
}

impl MeshMaterial {
    /// Build from materials and per-sub-mesh material indices
    pub fn new(materials: Vec<MaterialEntry>, layers: Vec<usize>) -> AssetResult<Self> {
        if let Some(&bad) = layers.iter().find(|&&layer| layer >= materials.len()) {
            return Err(AssetError::IndexOutOfRange {
                index: bad,
                len: materials.len(),
            });
        }
        Ok(Self { materials, layers })
    }

    /// Load a `.mat` file
    pub fn from_file(path: impl AsRef<Path>) -> AssetResult<Self> {
        let path = path.as_ref();
        let source = read_source(path)?;
        let material = Self::parse(path, &source).map_err(|e| {
            log::error!("Failed to load material {}: {}", path.display(), e);
            e
        })?;
        log::info!(
            "Loaded material {} ({} materials, {} layers)",
            path.display(),
            material.materials.len(),
            material.layers.len()
        );
        Ok(material)
    }

    /// Parse `.mat` text; `path` is only used in error messages
    pub fn parse(path: &Path, source: &str) -> AssetResult<Self> {
        let mut reader = TokenReader::new(path, source);

        let magic = reader.token("file type")?;
        if magic != MAGIC {
            return Err(reader.format_error(format!("expected '{MAGIC}', found '{magic}'")));
        }
        let version: u32 = reader.parse("version")?;
        if version != VERSION {
            return Err(reader.format_error(format!("unsupported version {version}")));
        }

        let material_count: usize = reader.parse("material count")?;
        let layer_count: usize = reader.parse("sub-mesh count")?;

        let mut materials = Vec::with_capacity(material_count.min(1024));
        for _ in 0..material_count {
            let mut material = MaterialEntry::new(reader.token("material name")?);
            let entry_count: usize = reader.parse("entry count")?;
            for _ in 0..entry_count {
                let entry = reader.token("material entry")?;
                let Some((channel, file)) = entry.split_once(':') else {
                    return Err(reader.format_error(format!("entry '{entry}' is not channel:path")));
                };
                material.entries.insert(channel.to_string(), file.to_string());
            }
            materials.push(material);
        }

        let mut layers = Vec::with_capacity(layer_count.min(1024));
        for _ in 0..layer_count {
            let layer: usize = reader.parse("material index")?;
            if layer >= materials.len() {
                return Err(reader.format_error(format!(
                    "material index {layer} out of range ({} materials)",
                    materials.len()
                )));
            }
            layers.push(layer);
        }

        Ok(Self { materials, layers })
    }

    /// Material used by sub-mesh `layer`
    pub fn material_for_layer(&self, layer: usize) -> Option<&MaterialEntry> {
        self.layers.get(layer).map(|&index| &self.materials[index])
    }

    /// Number of sub-meshes with an assigned material
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Every material
    pub fn materials(&self) -> &[MaterialEntry] {
        &self.materials
    }

    /// Load the texture set of every layer, in layer order
    pub fn load_layer_textures<D>(&self, base_dir: &Path, device: &mut D) -> AssetResult<Vec<TextureSet>>
    where
        D: GpuDevice + ?Sized,
    {
        (0..self.layers.len())
            .filter_map(|layer| self.material_for_layer(layer))
            .map(|material| material.load_textures(base_dir, device))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::HeadlessDevice;
    use image::{Rgba, RgbaImage};

    const SOURCE: &str = "MeshMat 1 2 3\n\
        body 2 Diffuse:body.png Bump:body_n.png\n\
        eyes 1 Diffuse:eyes.png\n\
        0 1 0\n";

    #[test]
    fn test_parse_layers() {
        let material = MeshMaterial::parse(Path::new("m.mat"), SOURCE).unwrap();
        assert_eq!(material.layer_count(), 3);
        assert_eq!(material.material_for_layer(1).unwrap().name, "eyes");
        assert_eq!(material.material_for_layer(2).unwrap().entry(BUMP), Some("body_n.png"));
        assert!(material.material_for_layer(3).is_none());
    }

    #[test]
    fn test_bad_layer_index() {
        let source = "MeshMat 1 1 1\nonly 0\n4\n";
        assert!(matches!(
            MeshMaterial::parse(Path::new("m.mat"), source),
            Err(AssetError::Format { .. })
        ));
        assert!(MeshMaterial::new(vec![MaterialEntry::new("a")], vec![1]).is_err());
    }

    #[test]
    fn test_load_textures() {
        let dir = tempfile::tempdir().unwrap();
        RgbaImage::from_pixel(4, 4, Rgba([10, 20, 30, 255]))
            .save(dir.path().join("d.png"))
            .unwrap();
        RgbaImage::from_pixel(2, 2, Rgba([128, 128, 255, 255]))
            .save(dir.path().join("n.png"))
            .unwrap();

        let mut device = HeadlessDevice::default();
        let entry = MaterialEntry::new("m")
            .with_entry(DIFFUSE, "d.png")
            .with_entry(BUMP, "n.png");
        let set = entry.load_textures(dir.path(), &mut device).unwrap();

        assert!(set.handles.diffuse.is_some());
        assert!(set.handles.bump.is_some());
        assert!(!set.handles.material.is_some());
        assert_eq!(set.diffuse.descriptor().level_count(), 3);
        assert_eq!(set.bump.as_ref().map(|t| t.descriptor().level_count()), Some(1));

        let missing = MaterialEntry::new("x").with_entry(BUMP, "n.png");
        assert!(matches!(
            missing.load_textures(dir.path(), &mut device),
            Err(AssetError::MissingChannel(_))
        ));
    }
}
