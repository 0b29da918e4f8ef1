//! Scene nodes
//!
//! A node is a transform plus an optional mesh. Its contribution to a frame
//! is split into three steps, each writing only the node itself:
//!
//! 1. [`Node::skin`]: dispatch the skinning shader into the skinned vertex
//!    buffer and remember where the output landed
//! 2. [`Node::write_instance`]: append the model matrix and texture handles
//!    and remember the instance index
//! 3. [`Node::write_draws`]: emit indirect draws referring to both
//!
//! Recursion over children is the graph's job.

use std::sync::Arc;

use bitflags::bitflags;

use crate::foundation::math::{Mat4, Vec3};
use crate::gpu::{GpuDevice, MappingCursor};
use crate::render::layout::{
    InstanceData, SkinningParams, SKINNING_FRAME_LOCATION, SKINNING_PARAMS_LOCATION,
};
use crate::render::{DrawParams, Mesh, RenderResult};

bitflags! {
    /// Render classification of a node
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct NodeFlags: u8 {
        /// Drawn from skinned vertices in the lit pass
        const LIT = 1 << 0;
        /// Drawn back to front after opaque geometry
        const TRANSPARENT = 1 << 1;
        /// Contributes draws at all
        const DRAWABLE = 1 << 2;
    }
}

/// Bucket a drawable node is sorted into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderClass {
    /// Arena vertices, front to back
    Opaque,
    /// Arena vertices, back to front
    Transparent,
    /// Skinned vertices, front to back
    Lit,
}

impl NodeFlags {
    /// Bucket for these flags; transparency wins over lighting
    pub const fn render_class(self) -> RenderClass {
        if self.contains(Self::TRANSPARENT) {
            RenderClass::Transparent
        } else if self.contains(Self::LIT) {
            RenderClass::Lit
        } else {
            RenderClass::Opaque
        }
    }
}

/// What a node draws
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// Transform only
    Group,
    /// Mesh without animation
    StaticMesh(Arc<Mesh>),
    /// Skinned mesh and its current animation frame
    AnimatedMesh {
        /// Mesh with baked joint data
        mesh: Arc<Mesh>,
        /// Fractional frame, in `[0, frame_count)`
        frame: f32,
    },
}

impl NodeKind {
    /// Mesh drawn by this node, if any
    pub fn mesh(&self) -> Option<&Arc<Mesh>> {
        match self {
            Self::Group => None,
            Self::StaticMesh(mesh) | Self::AnimatedMesh { mesh, .. } => Some(mesh),
        }
    }
}

/// One entry of the scene graph
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) kind: NodeKind,
    pub(crate) flags: NodeFlags,
    pub(crate) local: Mat4,
    pub(crate) world: Mat4,
    pub(crate) scale: Vec3,
    pub(crate) bounding_radius: f32,
    pub(crate) abs_bounding_radius: f32,
    pub(crate) parent: Option<super::NodeId>,
    pub(crate) children: Vec<super::NodeId>,
    base_vertex: u32,
    base_instance: u32,
}

impl Node {
    /// Create a node of `kind` with `flags`
    pub fn new(kind: NodeKind, flags: NodeFlags) -> Self {
        Self {
            kind,
            flags,
            local: Mat4::identity(),
            world: Mat4::identity(),
            scale: Vec3::new(1.0, 1.0, 1.0),
            bounding_radius: 1.0,
            abs_bounding_radius: 1.0,
            parent: None,
            children: Vec::new(),
            base_vertex: 0,
            base_instance: 0,
        }
    }

    /// Invisible transform node
    pub fn group() -> Self {
        Self::new(NodeKind::Group, NodeFlags::empty())
    }

    /// Lit, drawable node for `mesh`; animated when the mesh has joint data
    pub fn mesh(mesh: Arc<Mesh>) -> Self {
        let kind = if mesh.is_animated() {
            NodeKind::AnimatedMesh { mesh, frame: 0.0 }
        } else {
            NodeKind::StaticMesh(mesh)
        };
        Self::new(kind, NodeFlags::LIT | NodeFlags::DRAWABLE)
    }

    /// Replace the flags
    #[must_use]
    pub fn with_flags(mut self, flags: NodeFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Set the local transform
    #[must_use]
    pub fn with_transform(mut self, local: Mat4) -> Self {
        self.local = local;
        self.world = local;
        self
    }

    /// Set the scale applied to the mesh only
    #[must_use]
    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    /// Set the node's own bounding radius
    #[must_use]
    pub fn with_bounding_radius(mut self, radius: f32) -> Self {
        self.bounding_radius = radius;
        self.abs_bounding_radius = radius;
        self
    }

    /// What the node draws
    pub const fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Render classification
    pub const fn flags(&self) -> NodeFlags {
        self.flags
    }

    /// Whether the node contributes draws
    pub const fn is_drawable(&self) -> bool {
        self.flags.contains(NodeFlags::DRAWABLE)
    }

    /// Transform relative to the parent
    pub const fn local(&self) -> &Mat4 {
        &self.local
    }

    /// Transform relative to the world, as of the last update
    pub const fn world(&self) -> &Mat4 {
        &self.world
    }

    /// Mesh scale
    pub const fn scale(&self) -> Vec3 {
        self.scale
    }

    /// Set the mesh scale
    pub fn set_scale(&mut self, scale: Vec3) {
        self.scale = scale;
    }

    /// The node's own bounding radius
    pub const fn own_bounding_radius(&self) -> f32 {
        self.bounding_radius
    }

    /// Radius enclosing the node and every descendant
    pub const fn bounding_radius(&self) -> f32 {
        self.abs_bounding_radius
    }

    /// Parent node, `None` for roots
    pub const fn parent(&self) -> Option<super::NodeId> {
        self.parent
    }

    /// Child nodes in insertion order
    pub fn children(&self) -> &[super::NodeId] {
        &self.children
    }

    /// Model matrix including the mesh scale
    pub fn model_matrix(&self) -> Mat4 {
        self.world * Mat4::new_nonuniform_scaling(&self.scale)
    }

    /// Current animation frame, `None` for non-animated nodes
    pub const fn frame(&self) -> Option<f32> {
        match self.kind {
            NodeKind::AnimatedMesh { frame, .. } => Some(frame),
            _ => None,
        }
    }

    /// Jump to animation frame `frame`; ignored by non-animated nodes
    pub fn set_frame(&mut self, new_frame: f32) {
        match &mut self.kind {
            NodeKind::AnimatedMesh { mesh, frame } => {
                *frame = wrap_frame(new_frame, mesh.frame_count());
            }
            _ => log::debug!("set_frame on a node without animation"),
        }
    }

    /// Advance the animation by `dt` seconds
    pub fn advance_animation(&mut self, dt: f32) {
        if let NodeKind::AnimatedMesh { mesh, frame } = &mut self.kind {
            *frame = wrap_frame(*frame + dt * mesh.frame_rate(), mesh.frame_count());
        }
    }

    /// Buffer space this node alone needs
    pub fn draw_params(&self) -> DrawParams {
        match self.kind.mesh() {
            Some(mesh) if self.is_drawable() => mesh.draw_params(),
            _ => DrawParams::default(),
        }
    }

    /// First vertex of this node's geometry in the buffer its draws read
    pub const fn base_vertex(&self) -> u32 {
        self.base_vertex
    }

    /// Instance index assigned by the last [`Self::write_instance`]
    pub const fn base_instance(&self) -> u32 {
        self.base_instance
    }

    /// Skin this node's vertices into the skinned buffer at `base_vertex`
    ///
    /// The skinning program and buffers must already be bound. Advances
    /// `base_vertex` past the vertices written. Group nodes do nothing.
    pub fn skin<D>(&mut self, device: &mut D, base_vertex: &mut u32) -> RenderResult<()>
    where
        D: GpuDevice + ?Sized,
    {
        let Some(mesh) = self.kind.mesh() else {
            return Ok(());
        };
        let params = SkinningParams {
            vertex_offset: mesh.vertex_offset().unwrap_or(0),
            start_joint_index: mesh.start_joint_index(),
            frame_count: mesh.frame_count(),
            base_vertex: *base_vertex,
        };
        let vertex_count = mesh.vertex_count();

        device.set_uniform_uvec4(SKINNING_PARAMS_LOCATION, params.to_uvec4());
        device.set_uniform_f32(SKINNING_FRAME_LOCATION, self.frame().unwrap_or(0.0));
        device.dispatch_compute(vertex_count, 1, 1)?;

        self.base_vertex = *base_vertex;
        *base_vertex += vertex_count;
        Ok(())
    }

    /// Use the mesh's own vertices in the geometry arena instead of skinned ones
    pub fn use_arena_vertices(&mut self) {
        if let Some(mesh) = self.kind.mesh() {
            self.base_vertex = mesh.vertex_offset().unwrap_or(0);
        }
    }

    /// Append this node's instance record and texture handle sets
    ///
    /// The instance record points at the first texture set written here.
    /// Advances both counters. Group nodes do nothing.
    pub fn write_instance(
        &mut self,
        instances: &mut MappingCursor<'_, '_>,
        textures: &mut MappingCursor<'_, '_>,
        instance_counter: &mut u32,
        texture_counter: &mut u32,
    ) -> RenderResult<()> {
        let Some(mesh) = self.kind.mesh() else {
            return Ok(());
        };
        instances.write_pod(&InstanceData::new(&self.model_matrix(), *texture_counter))?;
        *texture_counter += mesh.write_texture_sets(textures)?;

        self.base_instance = *instance_counter;
        *instance_counter += 1;
        Ok(())
    }

    /// Emit this node's indirect draws; returns how many were written
    pub fn write_draws(&self, commands: &mut MappingCursor<'_, '_>) -> RenderResult<u32> {
        match self.kind.mesh() {
            Some(mesh) => mesh.write_batched_draws(commands, self.base_vertex, 1, self.base_instance),
            None => Ok(0),
        }
    }
}

fn wrap_frame(frame: f32, frame_count: u32) -> f32 {
    if frame_count == 0 {
        0.0
    } else {
        frame.rem_euclid(frame_count as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{Animation, MeshData};
    use crate::core::ArenaConfig;
    use crate::gpu::{Buffer, BufferId, BufferUsage, DrawElementsIndirectCommand, HeadlessDevice, MapAccess, RecordedCommand};
    use crate::render::GeometryArena;
    use approx::assert_relative_eq;

    fn meshes() -> (Arc<Mesh>, Arc<Mesh>) {
        let mut device = HeadlessDevice::default();
        let mut arena = GeometryArena::new(&mut device, &ArenaConfig::new().with_vertex_capacity(64)).unwrap();
        let data = MeshData::new(vec![Vec3::zeros(); 4], vec![0, 1, 2, 0, 2, 3]);
        let animation = Animation::new(1, 10.0, vec![Mat4::identity(); 4]);
        let first = arena.upload(&data, None).unwrap();
        let skinned = arena.upload(&data, Some(&animation)).unwrap();
        (Arc::new(first), Arc::new(skinned))
    }

    fn stream(size: usize) -> Buffer {
        let mut buffer = Buffer::new(BufferId(9), "stream");
        buffer.init(size, None, BufferUsage::persistent_write()).unwrap();
        buffer
    }

    #[test]
    fn test_transparent_beats_lit() {
        let both = NodeFlags::LIT | NodeFlags::TRANSPARENT;
        assert_eq!(both.render_class(), RenderClass::Transparent);
        assert_eq!(NodeFlags::LIT.render_class(), RenderClass::Lit);
        assert_eq!(NodeFlags::DRAWABLE.render_class(), RenderClass::Opaque);
    }

    #[test]
    fn test_mesh_node_kind_follows_animation() {
        let (plain, skinned) = meshes();
        assert!(matches!(Node::mesh(plain).kind(), NodeKind::StaticMesh(_)));
        let node = Node::mesh(skinned);
        assert_eq!(node.frame(), Some(0.0));
        assert_eq!(node.draw_params(), DrawParams { instances: 1, max_indirect_cmds: 1, max_vertices: 4 });
        assert_eq!(Node::group().draw_params(), DrawParams::default());
    }

    #[test]
    fn test_animation_wraps() {
        let (_, skinned) = meshes();
        let mut node = Node::mesh(skinned);
        node.advance_animation(0.25);
        assert_relative_eq!(node.frame().unwrap(), 2.5);
        node.advance_animation(0.2);
        assert_relative_eq!(node.frame().unwrap(), 0.5, epsilon = 1e-5);
        node.set_frame(-1.0);
        assert_relative_eq!(node.frame().unwrap(), 3.0);
    }

    #[test]
    fn test_skin_dispatches_per_vertex() {
        let (_, skinned) = meshes();
        let mut device = HeadlessDevice::default();
        let mut node = Node::mesh(skinned);
        node.set_frame(1.5);

        let mut base_vertex = 10;
        node.skin(&mut device, &mut base_vertex).unwrap();
        assert_eq!(base_vertex, 14);
        assert_eq!(node.base_vertex(), 10);
        assert_eq!(
            device.commands(),
            &[
                RecordedCommand::UniformUvec4 { location: 0, value: [4, 0, 4, 10] },
                RecordedCommand::UniformF32 { location: 1, value: 1.5 },
                RecordedCommand::Dispatch { x: 4, y: 1, z: 1 },
            ]
        );

        let mut group = Node::group();
        group.skin(&mut device, &mut base_vertex).unwrap();
        assert_eq!(base_vertex, 14);
    }

    #[test]
    fn test_instance_and_draws_share_base_instance() {
        let (plain, _) = meshes();
        let mut node = Node::mesh(plain)
            .with_transform(Mat4::new_translation(&Vec3::new(1.0, 2.0, 3.0)))
            .with_scale(Vec3::new(2.0, 2.0, 2.0));
        node.use_arena_vertices();

        let mut instances = stream(256);
        let mut textures = stream(256);
        let mut commands = stream(256);
        let mut instance_map = instances.map(MapAccess::persistent_write(), 0, None).unwrap();
        let mut texture_map = textures.map(MapAccess::persistent_write(), 0, None).unwrap();
        let mut command_map = commands.map(MapAccess::persistent_write(), 0, None).unwrap();

        let (mut instance_counter, mut texture_counter) = (3, 7);
        {
            let mut instance_cursor = instance_map.cursor();
            let mut texture_cursor = texture_map.cursor();
            node.write_instance(&mut instance_cursor, &mut texture_cursor, &mut instance_counter, &mut texture_counter)
                .unwrap();
        }
        assert_eq!((instance_counter, texture_counter), (4, 8));

        let record: InstanceData = instance_map.read_pod(0).unwrap();
        assert_eq!(record.texture_base, 7);
        assert_eq!(record.model[0][0], 2.0);
        assert_eq!(record.model[3], [1.0, 2.0, 3.0, 1.0]);

        let mut cursor = command_map.cursor();
        assert_eq!(node.write_draws(&mut cursor).unwrap(), 1);
        let draw: DrawElementsIndirectCommand = command_map.read_pod(0).unwrap();
        assert_eq!(draw.base_instance, 3);
        assert_eq!(draw.base_vertex, 0);
        assert_eq!(draw.count, 6);
    }
}
