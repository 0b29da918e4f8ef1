//! GPU record layouts
//!
//! Structs in this module are copied byte for byte into buffers read by
//! shaders, so field offsets are part of the shader contract. Every float
//! vector starts on a 16-byte boundary to satisfy std430 rules:
//!
//! | field          | type    | offset |
//! |----------------|---------|--------|
//! | position       | `vec3`  | 0      |
//! | texcoord       | `vec2`  | 16     |
//! | normal         | `vec3`  | 32     |
//! | tangent        | `vec4`  | 48     |
//! | joint weights  | `vec4`  | 64     |
//! | joint indices  | `ivec4` | 80     |

use bytemuck::{Pod, Zeroable};
use std::mem::{offset_of, size_of};

use crate::assets::MeshData;
use crate::foundation::math::{to_gpu_mat4, GpuMat4, Mat4};

/// Size of one [`GpuVertex`] in bytes
pub const VERTEX_STRIDE: usize = size_of::<GpuVertex>();

/// Size of one joint matrix in the joint arena
pub const JOINT_MATRIX_SIZE: usize = size_of::<GpuMat4>();

/// One vertex as stored in the geometry arena and the skinned output buffer
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GpuVertex {
    /// Object-space position
    pub position: [f32; 3],
    _pad0: f32,
    /// First texture coordinate set
    pub tex_coord: [f32; 2],
    _pad1: [f32; 2],
    /// Object-space normal
    pub normal: [f32; 3],
    _pad2: f32,
    /// Tangent with handedness in `w`
    pub tangent: [f32; 4],
    /// Skin weights
    pub weights: [f32; 4],
    /// Joints the weights refer to
    pub joints: [i32; 4],
}

const _: () = {
    assert!(size_of::<GpuVertex>() == 96);
    assert!(offset_of!(GpuVertex, position) == 0);
    assert!(offset_of!(GpuVertex, tex_coord) == 16);
    assert!(offset_of!(GpuVertex, normal) == 32);
    assert!(offset_of!(GpuVertex, tangent) == 48);
    assert!(offset_of!(GpuVertex, weights) == 64);
    assert!(offset_of!(GpuVertex, joints) == 80);
};

impl Default for GpuVertex {
    fn default() -> Self {
        Self {
            position: [0.0; 3],
            _pad0: 0.0,
            tex_coord: [0.0; 2],
            _pad1: [0.0; 2],
            normal: [0.0, 0.0, 1.0],
            _pad2: 0.0,
            tangent: [1.0, 0.0, 0.0, 1.0],
            weights: [0.0; 4],
            joints: [0; 4],
        }
    }
}

impl GpuVertex {
    /// Vertex `index` of `data`, with defaults for absent attributes
    ///
    /// Missing texture coordinates are zero, the normal defaults to `+Z`, the
    /// tangent to `+X` and weights and joints to zero.
    pub fn from_mesh_data(data: &MeshData, index: usize) -> Self {
        let mut vertex = Self::default();
        if let Some(p) = data.positions().get(index) {
            vertex.position = [p.x, p.y, p.z];
        }
        if let Some(t) = data.tex_coords().get(index) {
            vertex.tex_coord = [t.x, t.y];
        }
        if let Some(n) = data.normals().get(index) {
            vertex.normal = [n.x, n.y, n.z];
        }
        if let Some(t) = data.tangents().get(index) {
            vertex.tangent = [t.x, t.y, t.z, t.w];
        }
        if let Some(w) = data.weights().get(index) {
            vertex.weights = [w.x, w.y, w.z, w.w];
        }
        if let Some(j) = data.weight_indices().get(index) {
            vertex.joints = *j;
        }
        vertex
    }
}

/// Per-instance record read by the batched vertex shader
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct InstanceData {
    /// World matrix including the node's scale
    pub model: GpuMat4,
    /// Index of the instance's first texture handle set
    pub texture_base: u32,
    _pad: [u32; 3],
}

const _: () = assert!(size_of::<InstanceData>() == 80);

impl InstanceData {
    /// Record for a node drawn with `model` whose textures start at `texture_base`
    pub fn new(model: &Mat4, texture_base: u32) -> Self {
        Self {
            model: to_gpu_mat4(model),
            texture_base,
            _pad: [0; 3],
        }
    }
}

/// Skinning shader uniform holding [`SkinningParams::to_uvec4`]
pub const SKINNING_PARAMS_LOCATION: u32 = 0;

/// Skinning shader uniform holding the animation frame
pub const SKINNING_FRAME_LOCATION: u32 = 1;

/// Uniform block of the skinning compute shader at location 0
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkinningParams {
    /// First vertex of the mesh in the geometry arena
    pub vertex_offset: u32,
    /// First joint matrix of the mesh in the joint arena
    pub start_joint_index: u32,
    /// Frames in the mesh's animation
    pub frame_count: u32,
    /// First vertex written in the skinned output buffer
    pub base_vertex: u32,
}

impl SkinningParams {
    /// Pack as the `uvec4` uniform
    pub const fn to_uvec4(self) -> [u32; 4] {
        [
            self.vertex_offset,
            self.start_joint_index,
            self.frame_count,
            self.base_vertex,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{Vec2, Vec3, Vec4};

    #[test]
    fn test_defaults_for_missing_attributes() {
        let data = MeshData::new(vec![Vec3::new(1.0, 2.0, 3.0)], vec![0]);
        let vertex = GpuVertex::from_mesh_data(&data, 0);
        assert_eq!(vertex.position, [1.0, 2.0, 3.0]);
        assert_eq!(vertex.tex_coord, [0.0, 0.0]);
        assert_eq!(vertex.normal, [0.0, 0.0, 1.0]);
        assert_eq!(vertex.tangent, [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(vertex.weights, [0.0; 4]);
        assert_eq!(vertex.joints, [0; 4]);
    }

    #[test]
    fn test_bytes_land_at_shader_offsets() {
        let data = MeshData::new(vec![Vec3::new(1.0, 2.0, 3.0)], vec![0])
            .with_tex_coords(vec![Vec2::new(0.25, 0.75)])
            .with_skin(vec![Vec4::new(0.5, 0.5, 0.0, 0.0)], vec![[3, 7, 0, 0]]);
        let vertex = GpuVertex::from_mesh_data(&data, 0);
        let bytes = bytemuck::bytes_of(&vertex);

        let read_f32 = |offset: usize| f32::from_ne_bytes(bytes[offset..offset + 4].try_into().unwrap());
        let read_i32 = |offset: usize| i32::from_ne_bytes(bytes[offset..offset + 4].try_into().unwrap());
        assert_eq!(read_f32(8), 3.0);
        assert_eq!(read_f32(20), 0.75);
        assert_eq!(read_f32(40), 1.0);
        assert_eq!(read_f32(48), 1.0);
        assert_eq!(read_f32(64), 0.5);
        assert_eq!(read_i32(84), 7);
    }

    #[test]
    fn test_instance_texture_base_follows_matrix() {
        let record = InstanceData::new(&Mat4::identity(), 9);
        let bytes = bytemuck::bytes_of(&record);
        assert_eq!(u32::from_ne_bytes(bytes[64..68].try_into().unwrap()), 9);
    }
}
