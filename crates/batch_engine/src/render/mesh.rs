//! # Arena-resident mesh
//!
//! A [`Mesh`] is the GPU side of one loaded asset. It never owns buffer
//! storage: its caller hands it a mapping of a shared arena together with the
//! lease it may write into, and the mesh remembers where its data landed.
//!
//! ## Write order
//!
//! 1. [`Mesh::write_vertex_data`] establishes the vertex offset
//! 2. [`Mesh::write_index_data`] stores the index offset (in indices)
//! 3. [`Mesh::write_joint_data`] bakes `joint * inverse_bind_pose` per frame
//!
//! Index and draw writes are relative to the vertices already written and
//! fail with [`RenderError::VerticesNotWritten`] when called first.
//!
//! Inconsistent input (misaligned offsets, too many joints, short arrays) is
//! logged and tolerated.

use std::mem::size_of;
use std::ops::{Add, AddAssign};

use super::layout::{GpuVertex, JOINT_MATRIX_SIZE, VERTEX_STRIDE};
use super::{RenderError, RenderResult};
use crate::assets::{Animation, MeshData, SubMesh, TextureSet};
use crate::foundation::math::{to_gpu_mat4, Mat4};
use crate::gpu::{DrawElementsIndirectCommand, Mapping, MappingCursor, TextureHandleSet};

/// Joints the skinning shader supports per mesh
pub const MAX_JOINTS: usize = 128;

/// Per-frame buffer space needed to draw a mesh once, summed over a scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrawParams {
    /// Instance records
    pub instances: u32,
    /// Indirect draw commands, one texture handle set each
    pub max_indirect_cmds: u32,
    /// Skinned vertices
    pub max_vertices: u32,
}

impl Add for DrawParams {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            instances: self.instances + rhs.instances,
            max_indirect_cmds: self.max_indirect_cmds + rhs.max_indirect_cmds,
            max_vertices: self.max_vertices + rhs.max_vertices,
        }
    }
}

impl AddAssign for DrawParams {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl std::iter::Sum for DrawParams {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

/// GPU-resident geometry of one asset inside the shared arena
#[derive(Debug)]
pub struct Mesh {
    vertex_offset: Option<u32>,
    vertex_count: u32,
    index_offset: u32,
    index_count: u32,
    start_joint_index: u32,
    joint_count: u32,
    frame_count: u32,
    frame_rate: f32,
    one_over_frame_rate: f32,
    sub_meshes: Vec<SubMesh>,
    sub_mesh_names: Vec<String>,
    texture_sets: Vec<TextureSet>,
}

impl Mesh {
    /// Describe `data` without writing anything yet
    ///
    /// A file that declares no sub-meshes is treated as one sub-mesh covering
    /// every index.
    pub fn new(data: &MeshData) -> Self {
        let index_count = data.indices().len() as u32;
        let sub_meshes = if data.sub_meshes().is_empty() {
            vec![SubMesh {
                start: 0,
                count: index_count,
            }]
        } else {
            data.sub_meshes().to_vec()
        };

        Self {
            vertex_offset: None,
            vertex_count: data.vertex_count() as u32,
            index_offset: 0,
            index_count,
            start_joint_index: 0,
            joint_count: 0,
            frame_count: 0,
            frame_rate: 0.0,
            one_over_frame_rate: 0.0,
            sub_meshes,
            sub_mesh_names: data.sub_mesh_names().to_vec(),
            texture_sets: Vec::new(),
        }
    }

    /// Size of one vertex record
    pub const fn vertex_stride() -> usize {
        VERTEX_STRIDE
    }

    /// Bytes of vertex data [`Self::write_vertex_data`] writes for `data`
    pub fn vertex_bytes(data: &MeshData) -> usize {
        data.vertex_count() * VERTEX_STRIDE
    }

    /// Bytes of index data [`Self::write_index_data`] writes for `data`
    pub fn index_bytes(data: &MeshData) -> usize {
        data.indices().len() * size_of::<u32>()
    }

    /// Bytes of joint data [`Self::write_joint_data`] writes for `animation`
    ///
    /// Counted from the matrices the clip actually holds, so the product is
    /// bounded by memory already allocated.
    pub fn joint_bytes(animation: &Animation) -> usize {
        animation.all_joints().len() * JOINT_MATRIX_SIZE
    }

    /// Write every vertex of `data` starting at vertex `vertex_start`
    ///
    /// `mapping` covers the whole vertex arena. Returns the vertex index
    /// following the last one written, ready for the next mesh.
    pub fn write_vertex_data(
        &mut self,
        data: &MeshData,
        vertex_start: u32,
        mapping: &mut Mapping<'_>,
    ) -> RenderResult<u32> {
        let count = data.vertex_count();
        for (name, len) in [
            ("tex coords", data.tex_coords().len()),
            ("normals", data.normals().len()),
            ("tangents", data.tangents().len()),
            ("weights", data.weights().len()),
            ("weight indices", data.weight_indices().len()),
        ] {
            if len > count {
                log::warn!("Mesh {} count {} greater than vertex count {}", name, len, count);
            }
        }

        let mut cursor = mapping.cursor_at(vertex_start as usize * VERTEX_STRIDE);
        for i in 0..count {
            cursor.write_pod(&GpuVertex::from_mesh_data(data, i))?;
        }

        self.vertex_offset = Some(vertex_start);
        self.vertex_count = count as u32;
        log::trace!("Wrote {} vertices at vertex {}", count, vertex_start);
        Ok(vertex_start + count as u32)
    }

    /// Write the indices of `data` at `byte_offset` into the index arena
    ///
    /// The offset should be a multiple of four; a misaligned offset is
    /// reported and the write goes ahead. Returns the byte offset following
    /// the indices.
    pub fn write_index_data(
        &mut self,
        data: &MeshData,
        byte_offset: usize,
        mapping: &mut Mapping<'_>,
    ) -> RenderResult<usize> {
        if self.vertex_offset.is_none() {
            return Err(RenderError::VerticesNotWritten("write_index_data"));
        }
        if byte_offset % size_of::<u32>() != 0 {
            log::warn!("Index offset {} is not a multiple of {}", byte_offset, size_of::<u32>());
        }

        mapping.write_slice(data.indices(), byte_offset)?;
        self.index_offset = (byte_offset / size_of::<u32>()) as u32;
        self.index_count = data.indices().len() as u32;
        Ok(byte_offset + Self::index_bytes(data))
    }

    /// Bake the joint matrices of every frame of `animation`
    ///
    /// Each matrix written is `joint * inverse_bind_pose`. `byte_offset` must
    /// be a multiple of the device's uniform-buffer offset `alignment`; a
    /// misaligned offset is reported and the write goes ahead. Returns the
    /// byte offset following the joint data.
    pub fn write_joint_data(
        &mut self,
        data: &MeshData,
        animation: &Animation,
        mapping: &mut Mapping<'_>,
        byte_offset: usize,
        alignment: usize,
    ) -> RenderResult<usize> {
        if alignment > 1 && byte_offset % alignment != 0 {
            log::warn!(
                "Joint offset {} is not aligned to the uniform buffer offset alignment {}",
                byte_offset,
                alignment
            );
        }

        let joint_count = animation.joint_count();
        if joint_count > MAX_JOINTS {
            log::warn!("Joint count {} exceeds maximum of {}", joint_count, MAX_JOINTS);
        }
        let inverse_bind_pose = data.inverse_bind_pose();
        if inverse_bind_pose.len() < joint_count {
            log::warn!(
                "Mesh has {} inverse bind poses for {} animated joints, using identity for the rest",
                inverse_bind_pose.len(),
                joint_count
            );
        }

        let mut cursor = mapping.cursor_at(byte_offset);
        for frame in 0..animation.frame_count() {
            let joints = animation.joint_data(frame)?;
            for (j, joint) in joints.iter().enumerate() {
                let inverse = inverse_bind_pose.get(j).copied().unwrap_or_else(Mat4::identity);
                cursor.write_pod(&to_gpu_mat4(&(joint * inverse)))?;
            }
        }

        let written = cursor.offset() - byte_offset;
        let expected = Self::joint_bytes(animation);
        if written != expected {
            log::warn!("Joint data size mismatch (expected {}, got {})", expected, written);
        }

        self.start_joint_index = (byte_offset / JOINT_MATRIX_SIZE) as u32;
        self.joint_count = joint_count as u32;
        self.frame_count = animation.frame_count() as u32;
        self.frame_rate = animation.frame_rate();
        self.one_over_frame_rate = if self.frame_rate > 0.0 { 1.0 / self.frame_rate } else { 0.0 };
        Ok(byte_offset + written)
    }

    /// Emit one indexed indirect command per sub-mesh at the cursor
    ///
    /// Returns the number of commands written.
    pub fn write_batched_draws(
        &self,
        cursor: &mut MappingCursor<'_, '_>,
        base_vertex: u32,
        instances: u32,
        base_instance: u32,
    ) -> RenderResult<u32> {
        if self.vertex_offset.is_none() {
            return Err(RenderError::VerticesNotWritten("write_batched_draws"));
        }

        for sub_mesh in &self.sub_meshes {
            cursor.write_pod(&DrawElementsIndirectCommand {
                count: sub_mesh.count,
                instance_count: instances,
                first_index: sub_mesh.start + self.index_offset,
                base_vertex,
                base_instance,
            })?;
        }
        Ok(self.sub_meshes.len() as u32)
    }

    /// Emit one texture handle set per sub-mesh at the cursor
    ///
    /// Sub-meshes without a loaded set get null handles. Returns the number
    /// of sets written.
    pub fn write_texture_sets(&self, cursor: &mut MappingCursor<'_, '_>) -> RenderResult<u32> {
        for i in 0..self.sub_meshes.len() {
            let handles = self
                .texture_sets
                .get(i)
                .map_or_else(TextureHandleSet::default, |set| set.handles);
            cursor.write_pod(&handles)?;
        }
        Ok(self.sub_meshes.len() as u32)
    }

    /// Attach per-sub-mesh textures, in sub-mesh order
    pub fn set_texture_sets(&mut self, sets: Vec<TextureSet>) {
        if !sets.is_empty() && sets.len() != self.sub_meshes.len() {
            log::warn!(
                "Mesh has {} sub-meshes but {} texture sets",
                self.sub_meshes.len(),
                sets.len()
            );
        }
        self.texture_sets = sets;
    }

    /// Attached texture sets
    pub fn texture_sets(&self) -> &[TextureSet] {
        &self.texture_sets
    }

    /// Sub-mesh `index`
    pub fn sub_mesh(&self, index: usize) -> Option<&SubMesh> {
        self.sub_meshes.get(index)
    }

    /// Sub-mesh called `name`
    pub fn sub_mesh_by_name(&self, name: &str) -> Option<&SubMesh> {
        self.sub_mesh_names
            .iter()
            .position(|n| n == name)
            .and_then(|i| self.sub_meshes.get(i))
    }

    /// Every sub-mesh
    pub fn sub_meshes(&self) -> &[SubMesh] {
        &self.sub_meshes
    }

    /// Number of sub-meshes
    pub fn sub_mesh_count(&self) -> usize {
        self.sub_meshes.len()
    }

    /// Buffer space one instance of this mesh needs per frame
    pub fn draw_params(&self) -> DrawParams {
        DrawParams {
            instances: 1,
            max_indirect_cmds: self.sub_meshes.len() as u32,
            max_vertices: self.vertex_count,
        }
    }

    /// Number of vertices
    pub const fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    /// Number of indices
    pub const fn index_count(&self) -> u32 {
        self.index_count
    }

    /// First vertex in the arena, `None` before the vertices are written
    pub const fn vertex_offset(&self) -> Option<u32> {
        self.vertex_offset
    }

    /// First index in the index arena, counted in indices
    pub const fn index_offset(&self) -> u32 {
        self.index_offset
    }

    /// First joint matrix in the joint arena
    pub const fn start_joint_index(&self) -> u32 {
        self.start_joint_index
    }

    /// Joints per frame
    pub const fn joint_count(&self) -> u32 {
        self.joint_count
    }

    /// Animation frames baked into the joint arena
    pub const fn frame_count(&self) -> u32 {
        self.frame_count
    }

    /// Animation frames per second
    pub const fn frame_rate(&self) -> f32 {
        self.frame_rate
    }

    /// Seconds per animation frame
    pub const fn one_over_frame_rate(&self) -> f32 {
        self.one_over_frame_rate
    }

    /// Whether joint data has been written
    pub const fn is_animated(&self) -> bool {
        self.frame_count > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{Vec2, Vec3, Vec4};
    use crate::gpu::{Buffer, BufferId, BufferUsage, MapAccess};

    fn buffer(size: usize) -> Buffer {
        let mut buffer = Buffer::new(BufferId(1), "arena");
        buffer.init(size, None, BufferUsage::persistent_write()).unwrap();
        buffer
    }

    fn triangle() -> MeshData {
        MeshData::new(
            vec![Vec3::new(0.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 1.0, 0.0)],
            vec![0, 1, 2],
        )
    }

    #[test]
    fn test_vertex_round_trip_with_defaults() {
        let data = triangle()
            .with_normals(vec![Vec3::x(), Vec3::y(), Vec3::z()])
            .with_tex_coords(vec![Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0), Vec2::new(0.5, 1.0)])
            .with_skin(vec![Vec4::new(0.75, 0.25, 0.0, 0.0); 3], vec![[2, 5, 0, 0]; 3]);
        let mut mesh = Mesh::new(&data);
        let mut arena = buffer(VERTEX_STRIDE * 8);
        let mut mapping = arena.map(MapAccess::persistent_write(), 0, None).unwrap();

        let next = mesh.write_vertex_data(&data, 2, &mut mapping).unwrap();
        assert_eq!(next, 5);
        assert_eq!(mesh.vertex_offset(), Some(2));

        let positions = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
        let normals = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        let tex_coords = [[0.0, 0.0], [1.0, 0.0], [0.5, 1.0]];
        for i in 0..3 {
            let vertex: GpuVertex = mapping.read_pod((2 + i) * VERTEX_STRIDE).unwrap();
            assert_eq!(vertex.position, positions[i]);
            assert_eq!(vertex.normal, normals[i]);
            assert_eq!(vertex.tex_coord, tex_coords[i]);
            assert_eq!(vertex.tangent, [1.0, 0.0, 0.0, 1.0]);
            assert_eq!(vertex.weights, [0.75, 0.25, 0.0, 0.0]);
            assert_eq!(vertex.joints, [2, 5, 0, 0]);
        }
        let untouched: GpuVertex = mapping.read_pod(0).unwrap();
        assert_eq!(untouched.normal, [0.0; 3]);
    }

    #[test]
    fn test_vertex_defaults_for_bare_positions() {
        let data = triangle();
        let mut mesh = Mesh::new(&data);
        let mut arena = buffer(VERTEX_STRIDE * 3);
        let mut mapping = arena.map(MapAccess::persistent_write(), 0, None).unwrap();
        mesh.write_vertex_data(&data, 0, &mut mapping).unwrap();

        let vertex: GpuVertex = mapping.read_pod(VERTEX_STRIDE).unwrap();
        assert_eq!(vertex.position, [1.0, 0.0, 0.0]);
        assert_eq!(vertex.tex_coord, [0.0, 0.0]);
        assert_eq!(vertex.normal, [0.0, 0.0, 1.0]);
        assert_eq!(vertex.tangent, [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(vertex.weights, [0.0; 4]);
        assert_eq!(vertex.joints, [0; 4]);
    }

    #[test]
    fn test_indices_require_vertices_first() {
        let data = triangle();
        let mut mesh = Mesh::new(&data);
        let mut arena = buffer(64);
        let mut mapping = arena.map(MapAccess::persistent_write(), 0, None).unwrap();

        assert!(matches!(
            mesh.write_index_data(&data, 0, &mut mapping),
            Err(RenderError::VerticesNotWritten(_))
        ));
    }

    #[test]
    fn test_index_offset_is_counted_in_indices() {
        let data = triangle().with_sub_meshes(
            vec![SubMesh { start: 0, count: 3 }, SubMesh { start: 1, count: 2 }],
            vec!["a".to_string(), "b".to_string()],
        );
        let mut mesh = Mesh::new(&data);
        let mut vertices = buffer(VERTEX_STRIDE * 3);
        mesh.write_vertex_data(&data, 0, &mut vertices.map(MapAccess::WRITE, 0, None).unwrap())
            .unwrap();

        let mut indices = buffer(64);
        let mut mapping = indices.map(MapAccess::persistent_write(), 0, None).unwrap();
        assert_eq!(mesh.write_index_data(&data, 16, &mut mapping).unwrap(), 28);
        assert_eq!(mesh.index_offset(), 4);
        assert_eq!(mapping.read_pod::<u32>(24).unwrap(), 2);

        let mut commands = buffer(64);
        let mut mapping = commands.map(MapAccess::persistent_write(), 0, None).unwrap();
        let mut cursor = mapping.cursor();
        assert_eq!(mesh.write_batched_draws(&mut cursor, 10, 1, 3).unwrap(), 2);
        assert_eq!(cursor.offset(), 40);

        let second: DrawElementsIndirectCommand = mapping.read_pod(20).unwrap();
        assert_eq!(
            second,
            DrawElementsIndirectCommand {
                count: 2,
                instance_count: 1,
                first_index: 5,
                base_vertex: 10,
                base_instance: 3,
            }
        );
        assert_eq!(mesh.sub_mesh_by_name("b"), Some(&SubMesh { start: 1, count: 2 }));
    }

    #[test]
    fn test_implicit_sub_mesh() {
        let mesh = Mesh::new(&triangle());
        assert_eq!(mesh.sub_mesh_count(), 1);
        assert_eq!(mesh.sub_mesh(0), Some(&SubMesh { start: 0, count: 3 }));
    }

    #[test]
    fn test_joint_data_is_baked_per_frame() {
        let inverse = Mat4::new_translation(&Vec3::new(0.0, -1.0, 0.0));
        let data = triangle()
            .with_skin(vec![Vec4::new(1.0, 0.0, 0.0, 0.0); 3], vec![[0, 0, 0, 0]; 3])
            .with_joints(vec!["root".to_string()], vec![-1], vec![Mat4::identity()], vec![inverse]);
        let frames = vec![
            Mat4::identity(),
            Mat4::new_translation(&Vec3::new(2.0, 0.0, 0.0)),
        ];
        let animation = Animation::new(1, 10.0, frames);

        let mut mesh = Mesh::new(&data);
        let mut joints = buffer(1024);
        let mut mapping = joints.map(MapAccess::persistent_write(), 0, None).unwrap();
        let end = mesh
            .write_joint_data(&data, &animation, &mut mapping, 256, 256)
            .unwrap();

        assert_eq!(end, 256 + 2 * JOINT_MATRIX_SIZE);
        assert_eq!(mesh.start_joint_index(), 4);
        assert_eq!(mesh.frame_count(), 2);
        assert!((mesh.one_over_frame_rate() - 0.1).abs() < 1e-6);

        let second: [[f32; 4]; 4] = mapping.read_pod(256 + JOINT_MATRIX_SIZE).unwrap();
        assert_eq!(second[3], [2.0, -1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_joint_bytes_follow_stored_matrices() {
        let animation = Animation::new(2, 30.0, vec![Mat4::identity(); 7]);
        assert_eq!(animation.frame_count(), 3);
        assert_eq!(Mesh::joint_bytes(&animation), 6 * JOINT_MATRIX_SIZE);
        assert_eq!(Mesh::joint_bytes(&Animation::new(0, 30.0, Vec::new())), 0);
    }

    #[test]
    fn test_texture_sets_fill_every_sub_mesh() {
        let mesh = Mesh::new(&triangle());
        let mut textures = buffer(48);
        let mut mapping = textures.map(MapAccess::persistent_write(), 0, None).unwrap();
        let mut cursor = mapping.cursor();
        assert_eq!(mesh.write_texture_sets(&mut cursor).unwrap(), 1);
        assert_eq!(cursor.offset(), 24);
        assert_eq!(mapping.read_pod::<TextureHandleSet>(0).unwrap(), TextureHandleSet::default());
    }
}
