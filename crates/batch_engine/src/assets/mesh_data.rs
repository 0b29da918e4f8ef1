//! `.msh` mesh geometry
//!
//! ```text
//! MeshGeometry
//! 1
//! <sub-meshes> <vertices> <indices> <chunks>
//! <tag> <payload>
//! ...
//! ```
//!
//! Per-vertex chunks hold exactly `<vertices>` records, the index chunk
//! `<indices>` values and the sub-mesh chunks `<sub-meshes>` entries. Joint
//! names, joint parents and the two rig poses carry their own count prefix.
//! Tags this loader does not know are skipped without consuming a payload.

use std::path::Path;

use super::tokens::TokenReader;
use super::{read_source, AssetResult};
use crate::foundation::math::{Mat4, Vec2, Vec3, Vec4};

const MAGIC: &str = "MeshGeometry";
const VERSION: u32 = 1;

/// Chunk identifiers of the `.msh` format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ChunkTag {
    /// `vec3` positions
    Positions = 1,
    /// `vec3` normals
    Normals = 2,
    /// `vec4` tangents
    Tangents = 4,
    /// `vec4` colours
    Colors = 8,
    /// First `vec2` texture coordinate set
    TexCoords0 = 16,
    /// Second `vec2` texture coordinate set
    TexCoords1 = 32,
    /// `vec4` skin weights
    WeightValues = 64,
    /// `ivec4` skin joint indices
    WeightIndices = 128,
    /// `u32` triangle indices
    Indices = 256,
    /// Counted list of joint names
    JointNames = 512,
    /// Counted list of parent joint indices
    JointParents = 1024,
    /// Counted list of bind pose matrices
    BindPose = 2048,
    /// Counted list of inverse bind pose matrices
    BindPoseInv = 4096,
    /// `(start, count)` index ranges
    SubMeshes = 1 << 14,
    /// One sub-mesh name per line
    SubMeshNames = 1 << 15,
    /// Material reference, carries no payload
    Material = 1 << 16,
}

impl ChunkTag {
    /// Map a numeric tag to a chunk, `None` for unknown tags
    pub const fn from_raw(raw: i64) -> Option<Self> {
        Some(match raw {
            1 => Self::Positions,
            2 => Self::Normals,
            4 => Self::Tangents,
            8 => Self::Colors,
            16 => Self::TexCoords0,
            32 => Self::TexCoords1,
            64 => Self::WeightValues,
            128 => Self::WeightIndices,
            256 => Self::Indices,
            512 => Self::JointNames,
            1024 => Self::JointParents,
            2048 => Self::BindPose,
            4096 => Self::BindPoseInv,
            16384 => Self::SubMeshes,
            32768 => Self::SubMeshNames,
            65536 => Self::Material,
            _ => return None,
        })
    }
}

/// Contiguous index range drawn with one material
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SubMesh {
    /// First index of the range
    pub start: u32,
    /// Number of indices
    pub count: u32,
}

/// Immutable CPU-side mesh geometry
#[derive(Debug, Clone, Default)]
pub struct MeshData {
    positions: Vec<Vec3>,
    colors: Vec<Vec4>,
    tex_coords: Vec<Vec2>,
    tex_coords1: Vec<Vec2>,
    normals: Vec<Vec3>,
    tangents: Vec<Vec4>,
    weights: Vec<Vec4>,
    weight_indices: Vec<[i32; 4]>,
    indices: Vec<u32>,
    bind_pose: Vec<Mat4>,
    inverse_bind_pose: Vec<Mat4>,
    joint_names: Vec<String>,
    joint_parents: Vec<i32>,
    sub_meshes: Vec<SubMesh>,
    sub_mesh_names: Vec<String>,
}

impl MeshData {
    /// Geometry with positions and triangle indices only
    pub fn new(positions: Vec<Vec3>, indices: Vec<u32>) -> Self {
        Self {
            positions,
            indices,
            ..Self::default()
        }
    }

    /// Set the first texture coordinate set
    pub fn with_tex_coords(mut self, tex_coords: Vec<Vec2>) -> Self {
        self.tex_coords = tex_coords;
        self
    }

    /// Set vertex normals
    pub fn with_normals(mut self, normals: Vec<Vec3>) -> Self {
        self.normals = normals;
        self
    }

    /// Set vertex tangents
    pub fn with_tangents(mut self, tangents: Vec<Vec4>) -> Self {
        self.tangents = tangents;
        self
    }

    /// Set vertex colours
    pub fn with_colors(mut self, colors: Vec<Vec4>) -> Self {
        self.colors = colors;
        self
    }

    /// Set skin weights and the joints they refer to
    pub fn with_skin(mut self, weights: Vec<Vec4>, weight_indices: Vec<[i32; 4]>) -> Self {
        self.weights = weights;
        self.weight_indices = weight_indices;
        self
    }

    /// Set the skeleton
    pub fn with_joints(
        mut self,
        names: Vec<String>,
        parents: Vec<i32>,
        bind_pose: Vec<Mat4>,
        inverse_bind_pose: Vec<Mat4>,
    ) -> Self {
        self.joint_names = names;
        self.joint_parents = parents;
        self.bind_pose = bind_pose;
        self.inverse_bind_pose = inverse_bind_pose;
        self
    }

    /// Set sub-mesh ranges and their names
    pub fn with_sub_meshes(mut self, sub_meshes: Vec<SubMesh>, names: Vec<String>) -> Self {
        self.sub_meshes = sub_meshes;
        self.sub_mesh_names = names;
        self
    }

    /// Load a `.msh` file
    pub fn from_file(path: impl AsRef<Path>) -> AssetResult<Self> {
        let path = path.as_ref();
        let source = read_source(path)?;
        let data = Self::parse(path, &source).map_err(|e| {
            log::error!("Failed to load mesh {}: {}", path.display(), e);
            e
        })?;
        data.validate();
        log::info!(
            "Loaded mesh {} ({} vertices, {} indices, {} sub-meshes)",
            path.display(),
            data.vertex_count(),
            data.indices.len(),
            data.sub_meshes.len()
        );
        Ok(data)
    }

    /// Parse `.msh` text; `path` is only used in error messages
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

        let sub_mesh_count: usize = reader.parse("sub-mesh count")?;
        let vertex_count: usize = reader.parse("vertex count")?;
        let index_count: usize = reader.parse("index count")?;
        let chunk_count: usize = reader.parse("chunk count")?;

        let mut data = Self::default();
        for _ in 0..chunk_count {
            let raw: i64 = reader.parse("chunk tag")?;
            let Some(tag) = ChunkTag::from_raw(raw) else {
                log::debug!("Skipping unknown chunk tag {} in {}", raw, path.display());
                continue;
            };

            match tag {
                ChunkTag::Positions => {
                    data.positions = read_records(&mut reader, vertex_count, TokenReader::vec3, "position")?;
                }
                ChunkTag::Normals => {
                    data.normals = read_records(&mut reader, vertex_count, TokenReader::vec3, "normal")?;
                }
                ChunkTag::Tangents => {
                    data.tangents = read_records(&mut reader, vertex_count, TokenReader::vec4, "tangent")?;
                }
                ChunkTag::Colors => {
                    data.colors = read_records(&mut reader, vertex_count, TokenReader::vec4, "colour")?;
                }
                ChunkTag::TexCoords0 => {
                    data.tex_coords = read_records(&mut reader, vertex_count, TokenReader::vec2, "texcoord")?;
                }
                ChunkTag::TexCoords1 => {
                    data.tex_coords1 = read_records(&mut reader, vertex_count, TokenReader::vec2, "texcoord")?;
                }
                ChunkTag::WeightValues => {
                    data.weights = read_records(&mut reader, vertex_count, TokenReader::vec4, "weight")?;
                }
                ChunkTag::WeightIndices => {
                    data.weight_indices =
                        read_records(&mut reader, vertex_count, TokenReader::ivec4, "weight index")?;
                }
                ChunkTag::Indices => {
                    data.indices = read_records(&mut reader, index_count, |r, what| r.parse(what), "index")?;
                }
                ChunkTag::JointNames => {
                    let count: usize = reader.parse("joint name count")?;
                    data.joint_names = read_records(
                        &mut reader,
                        count,
                        |r, what| r.token(what).map(str::to_string),
                        "joint name",
                    )?;
                }
                ChunkTag::JointParents => {
                    let count: usize = reader.parse("joint parent count")?;
                    data.joint_parents = read_records(&mut reader, count, |r, what| r.parse(what), "joint parent")?;
                }
                ChunkTag::BindPose => {
                    let count: usize = reader.parse("bind pose count")?;
                    data.bind_pose = read_records(&mut reader, count, TokenReader::mat4, "bind pose")?;
                }
                ChunkTag::BindPoseInv => {
                    let count: usize = reader.parse("inverse bind pose count")?;
                    data.inverse_bind_pose =
                        read_records(&mut reader, count, TokenReader::mat4, "inverse bind pose")?;
                }
                ChunkTag::SubMeshes => {
                    data.sub_meshes = read_records(
                        &mut reader,
                        sub_mesh_count,
                        |r, what| {
                            Ok(SubMesh {
                                start: r.parse(what)?,
                                count: r.parse(what)?,
                            })
                        },
                        "sub-mesh range",
                    )?;
                }
                ChunkTag::SubMeshNames => {
                    reader.skip_line();
                    data.sub_mesh_names = read_records(
                        &mut reader,
                        sub_mesh_count,
                        |r, what| r.line(what).map(str::to_string),
                        "sub-mesh name",
                    )?;
                }
                ChunkTag::Material => {
                    log::debug!("Ignoring material chunk in {}", path.display());
                }
            }
        }

        if data.positions.len() != vertex_count {
            log::warn!(
                "{} declares {} vertices but has {} positions",
                path.display(),
                vertex_count,
                data.positions.len()
            );
        }
        Ok(data)
    }

    /// Check array lengths against the vertex and index counts
    ///
    /// Every inconsistency is logged as a warning; returns whether the data is
    /// fully consistent.
    pub fn validate(&self) -> bool {
        let vertices = self.vertex_count();
        let mut consistent = true;

        let per_vertex = [
            ("colors", self.colors.len()),
            ("tex_coords", self.tex_coords.len()),
            ("tex_coords1", self.tex_coords1.len()),
            ("normals", self.normals.len()),
            ("tangents", self.tangents.len()),
            ("weights", self.weights.len()),
            ("weight_indices", self.weight_indices.len()),
        ];
        for (name, len) in per_vertex {
            if len != 0 && len != vertices {
                log::warn!("Mesh {} has {} entries for {} vertices", name, len, vertices);
                consistent = false;
            }
        }

        if self.weights.len() != self.weight_indices.len() {
            log::warn!(
                "Mesh has {} weights but {} weight indices",
                self.weights.len(),
                self.weight_indices.len()
            );
            consistent = false;
        }

        let index_count = self.indices.len();
        for (i, sub_mesh) in self.sub_meshes.iter().enumerate() {
            if sub_mesh.start as usize + sub_mesh.count as usize > index_count {
                log::warn!(
                    "Sub-mesh {} range {}+{} exceeds {} indices",
                    i,
                    sub_mesh.start,
                    sub_mesh.count,
                    index_count
                );
                consistent = false;
            }
        }

        if let Some(&max) = self.indices.iter().max() {
            if max as usize >= vertices {
                log::warn!("Mesh index {} references past {} vertices", max, vertices);
                consistent = false;
            }
        }

        consistent
    }

    /// Number of vertices
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Number of joints in the skeleton
    pub fn joint_count(&self) -> usize {
        self.joint_names.len()
    }

    /// Index of the joint called `name`
    pub fn joint_index(&self, name: &str) -> Option<usize> {
        self.joint_names.iter().position(|joint| joint == name)
    }

    /// Parent of joint `index`, `None` for roots and unknown joints
    pub fn joint_parent(&self, index: usize) -> Option<usize> {
        self.joint_parents
            .get(index)
            .and_then(|&parent| usize::try_from(parent).ok())
    }

    /// Name of sub-mesh `index`
    pub fn sub_mesh_name(&self, index: usize) -> Option<&str> {
        self.sub_mesh_names.get(index).map(String::as_str)
    }

    /// Vertex positions
    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    /// Vertex colours
    pub fn colors(&self) -> &[Vec4] {
        &self.colors
    }

    /// First texture coordinate set
    pub fn tex_coords(&self) -> &[Vec2] {
        &self.tex_coords
    }

    /// Second texture coordinate set
    pub fn tex_coords1(&self) -> &[Vec2] {
        &self.tex_coords1
    }

    /// Vertex normals
    pub fn normals(&self) -> &[Vec3] {
        &self.normals
    }

    /// Vertex tangents
    pub fn tangents(&self) -> &[Vec4] {
        &self.tangents
    }

    /// Skin weights
    pub fn weights(&self) -> &[Vec4] {
        &self.weights
    }

    /// Skin joint indices, parallel to [`Self::weights`]
    pub fn weight_indices(&self) -> &[[i32; 4]] {
        &self.weight_indices
    }

    /// Triangle indices
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Bind pose joint matrices
    pub fn bind_pose(&self) -> &[Mat4] {
        &self.bind_pose
    }

    /// Inverse bind pose joint matrices
    pub fn inverse_bind_pose(&self) -> &[Mat4] {
        &self.inverse_bind_pose
    }

    /// Joint names
    pub fn joint_names(&self) -> &[String] {
        &self.joint_names
    }

    /// Parent joint indices, `-1` for roots
    pub fn joint_parents(&self) -> &[i32] {
        &self.joint_parents
    }

    /// Sub-mesh ranges
    pub fn sub_meshes(&self) -> &[SubMesh] {
        &self.sub_meshes
    }

    /// Sub-mesh names
    pub fn sub_mesh_names(&self) -> &[String] {
        &self.sub_mesh_names
    }
}

fn read_records<'a, T>(
    reader: &mut TokenReader<'a>,
    count: usize,
    mut read: impl FnMut(&mut TokenReader<'a>, &str) -> AssetResult<T>,
    what: &str,
) -> AssetResult<Vec<T>> {
    let mut records = Vec::with_capacity(count.min(1 << 20));
    for _ in 0..count {
        records.push(read(reader, what)?);
    }
    Ok(records)
}
