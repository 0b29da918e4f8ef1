//! Scene graph
//!
//! Nodes live in a [`SlotMap`] and refer to each other by [`NodeId`]: a parent
//! owns its children's ids, a child keeps its parent's id. Removing a node
//! removes its whole subtree.
//!
//! ## Bounding radius
//!
//! Every node keeps its own radius and an absolute radius enclosing its
//! subtree:
//!
//! ```text
//! abs(n) = max(own(n), max over children c of |c.local.translation| + abs(c))
//! ```
//!
//! Any change to a radius, a local transform or the child list re-evaluates
//! this upwards, stopping at the first ancestor whose value is unchanged.

use slotmap::{new_key_type, SlotMap};

use super::node::{Node, RenderClass};
use super::{SceneError, SceneResult};
use crate::foundation::math::{Mat4, Mat4Ext, Vec3};
use crate::foundation::time::FrameInfo;
use crate::gpu::{GpuDevice, MappingCursor};
use crate::render::{DrawParams, Frustum, RenderResult};

new_key_type! {
    /// Handle to a node in a [`SceneGraph`]
    pub struct NodeId;
}

/// A visible node and its squared distance to the camera
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeEntry {
    /// Node
    pub id: NodeId,
    /// Squared distance from the camera to the node's origin
    pub distance_sq: f32,
}

/// Visible drawable nodes sorted per render bucket
#[derive(Debug, Clone, Default)]
pub struct NodeLists {
    /// Front to back
    pub opaque: Vec<NodeEntry>,
    /// Back to front
    pub transparent: Vec<NodeEntry>,
    /// Front to back
    pub lit: Vec<NodeEntry>,
    /// Subtrees rejected by the frustum test
    pub culled: u32,
}

impl NodeLists {
    /// Empty lists
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all buckets, keeping their allocations
    pub fn clear(&mut self) {
        self.opaque.clear();
        self.transparent.clear();
        self.lit.clear();
        self.culled = 0;
    }

    /// Entries of one bucket
    pub fn bucket(&self, class: RenderClass) -> &[NodeEntry] {
        match class {
            RenderClass::Opaque => &self.opaque,
            RenderClass::Transparent => &self.transparent,
            RenderClass::Lit => &self.lit,
        }
    }

    /// Nodes across all buckets
    pub fn visible_count(&self) -> usize {
        self.opaque.len() + self.transparent.len() + self.lit.len()
    }

    fn bucket_mut(&mut self, class: RenderClass) -> &mut Vec<NodeEntry> {
        match class {
            RenderClass::Opaque => &mut self.opaque,
            RenderClass::Transparent => &mut self.transparent,
            RenderClass::Lit => &mut self.lit,
        }
    }

    fn sort(&mut self) {
        self.opaque.sort_by(|a, b| a.distance_sq.total_cmp(&b.distance_sq));
        self.lit.sort_by(|a, b| a.distance_sq.total_cmp(&b.distance_sq));
        self.transparent
            .sort_by(|a, b| b.distance_sq.total_cmp(&a.distance_sq));
    }
}

/// Hierarchy of transform and mesh nodes
#[derive(Debug, Default)]
pub struct SceneGraph {
    nodes: SlotMap<NodeId, Node>,
    roots: Vec<NodeId>,
}

impl SceneGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Top-level nodes in insertion order
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Whether `id` refers to a live node
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Node `id`
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Node `id`, mutably
    ///
    /// Transforms and radii are changed through the graph so the hierarchy
    /// stays consistent.
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    /// Node `id`, or [`SceneError::NodeNotFound`]
    pub fn node(&self, id: NodeId) -> SceneResult<&Node> {
        self.nodes.get(id).ok_or(SceneError::NodeNotFound(id))
    }

    fn node_mut(&mut self, id: NodeId) -> SceneResult<&mut Node> {
        self.nodes.get_mut(id).ok_or(SceneError::NodeNotFound(id))
    }

    /// Every node with its id, in storage order
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter()
    }

    /// Add a top-level node
    pub fn add_root(&mut self, mut node: Node) -> NodeId {
        node.parent = None;
        node.children.clear();
        node.world = node.local;
        let id = self.nodes.insert(node);
        self.roots.push(id);
        id
    }

    /// Add `node` under `parent` and grow the ancestors' bounding radii
    pub fn add_child(&mut self, parent: NodeId, mut node: Node) -> SceneResult<NodeId> {
        let parent_world = self.node(parent)?.world;
        node.parent = Some(parent);
        node.children.clear();
        node.world = parent_world * node.local;

        let id = self.nodes.insert(node);
        self.node_mut(parent)?.children.push(id);
        self.propagate_radius(parent);
        Ok(id)
    }

    /// Remove `id` and everything below it; returns the number of nodes removed
    pub fn remove_node(&mut self, id: NodeId) -> SceneResult<usize> {
        let parent = self.node(id)?.parent;
        match parent {
            Some(parent) => self.node_mut(parent)?.children.retain(|child| *child != id),
            None => self.roots.retain(|root| *root != id),
        }

        let subtree = self.subtree(id);
        for removed in &subtree {
            self.nodes.remove(*removed);
        }
        if let Some(parent) = parent {
            self.propagate_radius(parent);
        }
        log::trace!("Removed {} scene nodes", subtree.len());
        Ok(subtree.len())
    }

    /// Replace the local transform of `id` and refresh its subtree
    pub fn set_transform(&mut self, id: NodeId, local: Mat4) -> SceneResult<()> {
        let parent = {
            let node = self.node_mut(id)?;
            node.local = local;
            node.parent
        };
        let parent_world = match parent {
            Some(parent) => self.node(parent)?.world,
            None => Mat4::identity(),
        };
        self.update_worlds(id, parent_world, 0.0);
        if let Some(parent) = parent {
            self.propagate_radius(parent);
        }
        Ok(())
    }

    /// Set the mesh scale of `id`
    pub fn set_scale(&mut self, id: NodeId, scale: Vec3) -> SceneResult<()> {
        self.node_mut(id)?.set_scale(scale);
        Ok(())
    }

    /// Set the own bounding radius of `id`
    pub fn set_bounding_radius(&mut self, id: NodeId, radius: f32) -> SceneResult<()> {
        self.node_mut(id)?.bounding_radius = radius;
        self.propagate_radius(id);
        Ok(())
    }

    /// Jump the animation of `id` to `frame`
    pub fn set_frame(&mut self, id: NodeId, frame: f32) -> SceneResult<()> {
        self.node_mut(id)?.set_frame(frame);
        Ok(())
    }

    /// Recompute world transforms top-down and advance animations
    pub fn update(&mut self, frame: &FrameInfo) {
        let roots = self.roots.clone();
        for root in roots {
            self.update_worlds(root, Mat4::identity(), frame.frame_delta);
        }
    }

    fn update_worlds(&mut self, id: NodeId, parent_world: Mat4, dt: f32) {
        let mut stack = vec![(id, parent_world)];
        while let Some((id, parent_world)) = stack.pop() {
            let Some(node) = self.nodes.get_mut(id) else {
                continue;
            };
            node.world = parent_world * node.local;
            node.advance_animation(dt);
            let world = node.world;
            stack.extend(node.children.iter().map(|child| (*child, world)));
        }
    }

    /// Cull against `frustum`, bucket the visible drawable nodes and sort them
    ///
    /// A node failing the sphere test hides its entire subtree, even
    /// descendants whose own sphere would pass.
    pub fn build_node_lists(&self, frustum: &Frustum, camera_position: &Vec3) -> NodeLists {
        let mut lists = NodeLists::new();
        self.build_node_lists_into(frustum, camera_position, &mut lists);
        lists
    }

    /// [`Self::build_node_lists`] reusing the allocations of `lists`
    pub fn build_node_lists_into(&self, frustum: &Frustum, camera_position: &Vec3, lists: &mut NodeLists) {
        lists.clear();

        let mut stack: Vec<NodeId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            let Some(node) = self.nodes.get(id) else {
                continue;
            };
            let center = node.world.translation_part();
            if !frustum.sphere_in_frustum(&center, node.abs_bounding_radius) {
                lists.culled += 1;
                continue;
            }

            if node.is_drawable() && node.kind.mesh().is_some() {
                lists.bucket_mut(node.flags.render_class()).push(NodeEntry {
                    id,
                    distance_sq: (center - camera_position).norm_squared(),
                });
            }
            stack.extend(node.children.iter().rev().copied());
        }

        lists.sort();
    }

    /// Buffer space needed to draw every drawable node once
    pub fn draw_params(&self) -> DrawParams {
        self.nodes.values().map(Node::draw_params).sum()
    }

    /// Buffer space needed to draw the subtree at `id`
    pub fn subtree_draw_params(&self, id: NodeId) -> SceneResult<DrawParams> {
        self.node(id)?;
        Ok(self
            .subtree(id)
            .into_iter()
            .filter_map(|id| self.nodes.get(id))
            .map(Node::draw_params)
            .sum())
    }

    /// Skin the nodes of `entries` into consecutive ranges of the skinned buffer
    ///
    /// The skinning program and buffers must already be bound. Each node's
    /// range starts at `base_vertex`, which is advanced past it. Entries whose
    /// node has since been removed are skipped.
    pub fn skin_vertices<D>(&mut self, entries: &[NodeEntry], device: &mut D, base_vertex: &mut u32) -> RenderResult<()>
    where
        D: GpuDevice + ?Sized,
    {
        for entry in entries {
            if let Some(node) = self.nodes.get_mut(entry.id) {
                node.skin(device, base_vertex)?;
            }
        }
        Ok(())
    }

    /// Point the nodes of `entries` at their unskinned arena vertices
    pub fn use_arena_vertices(&mut self, entries: &[NodeEntry]) {
        for entry in entries {
            if let Some(node) = self.nodes.get_mut(entry.id) {
                node.use_arena_vertices();
            }
        }
    }

    /// Write instance records and texture sets for the nodes of `entries`
    ///
    /// Each node takes the next instance index as its base instance.
    pub fn write_instance_data(
        &mut self,
        entries: &[NodeEntry],
        instances: &mut MappingCursor<'_, '_>,
        textures: &mut MappingCursor<'_, '_>,
        instance_counter: &mut u32,
        texture_counter: &mut u32,
    ) -> RenderResult<()> {
        for entry in entries {
            if let Some(node) = self.nodes.get_mut(entry.id) {
                node.write_instance(instances, textures, instance_counter, texture_counter)?;
            }
        }
        Ok(())
    }

    /// Write the indirect draws of the nodes of `entries`
    ///
    /// Uses the base vertex and instance assigned by the skinning and instance
    /// passes. Adds the number of commands written to `draw_counter`.
    pub fn write_batched_draws(
        &self,
        entries: &[NodeEntry],
        commands: &mut MappingCursor<'_, '_>,
        draw_counter: &mut u32,
    ) -> RenderResult<()> {
        for entry in entries {
            if let Some(node) = self.nodes.get(entry.id) {
                *draw_counter += node.write_draws(commands)?;
            }
        }
        Ok(())
    }

    // `id` followed by its descendants, depth-first
    fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            if let Some(node) = self.nodes.get(id) {
                order.push(id);
                stack.extend(node.children.iter().rev().copied());
            }
        }
        order
    }

    fn subtree_radius(&self, id: NodeId) -> Option<f32> {
        let node = self.nodes.get(id)?;
        let reach = node
            .children
            .iter()
            .filter_map(|child| self.nodes.get(*child))
            .map(|child| child.local.translation_part().norm() + child.abs_bounding_radius)
            .fold(node.bounding_radius, f32::max);
        Some(reach)
    }

    fn propagate_radius(&mut self, start: NodeId) {
        let mut current = Some(start);
        while let Some(id) = current {
            let Some(radius) = self.subtree_radius(id) else {
                return;
            };
            let Some(node) = self.nodes.get_mut(id) else {
                return;
            };
            if node.abs_bounding_radius == radius && id != start {
                return;
            }
            node.abs_bounding_radius = radius;
            current = node.parent;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{Animation, MeshData};
    use crate::core::ArenaConfig;
    use crate::foundation::math::Quat;
    use crate::gpu::{
        Buffer, BufferId, BufferUsage, DrawElementsIndirectCommand, HeadlessDevice, MapAccess, RecordedCommand,
        DRAW_ELEMENTS_STRIDE,
    };
    use crate::render::{GeometryArena, Mesh};
    use crate::scene::NodeFlags;
    use approx::assert_relative_eq;
    use std::sync::Arc;

    fn quad() -> Arc<Mesh> {
        let mut device = HeadlessDevice::default();
        let mut arena = GeometryArena::new(&mut device, &ArenaConfig::new().with_vertex_capacity(16)).unwrap();
        let data = MeshData::new(vec![Vec3::zeros(); 4], vec![0, 1, 2, 0, 2, 3]);
        Arc::new(arena.upload(&data, None).unwrap())
    }

    fn at(x: f32, y: f32, z: f32) -> Mat4 {
        Mat4::new_translation(&Vec3::new(x, y, z))
    }

    // Clip space scaled down so the frustum spans [-100, 100] on every axis
    fn wide_frustum() -> Frustum {
        Frustum::from_matrix(&Mat4::new_nonuniform_scaling(&Vec3::new(0.01, 0.01, 0.01)))
    }

    fn stream(size: usize) -> Buffer {
        let mut buffer = Buffer::new(BufferId(9), "stream");
        buffer.init(size, None, BufferUsage::persistent_write()).unwrap();
        buffer
    }

    #[test]
    fn test_world_is_parent_world_times_local() {
        let mut graph = SceneGraph::new();
        let spin = Quat::from_axis_angle(&Vec3::y_axis(), 0.5).to_homogeneous();
        let root = graph.add_root(Node::group().with_transform(at(1.0, 0.0, 0.0) * spin));
        let child = graph.add_child(root, Node::group().with_transform(at(0.0, 2.0, 0.0))).unwrap();
        let leaf = graph.add_child(child, Node::group().with_transform(at(0.0, 0.0, -3.0))).unwrap();

        graph.set_transform(root, at(-4.0, 0.0, 0.0)).unwrap();
        graph.update(&FrameInfo::new(0, 0.016));

        for id in [child, leaf] {
            let node = graph.get(id).unwrap();
            let parent = graph.get(node.parent().unwrap()).unwrap();
            assert_relative_eq!(*node.world(), parent.world() * node.local());
        }
        let root_node = graph.get(root).unwrap();
        assert_eq!(root_node.world(), root_node.local());
        assert_relative_eq!(
            graph.get(leaf).unwrap().world().translation_part(),
            Vec3::new(-4.0, 2.0, -3.0)
        );
    }

    #[test]
    fn test_ancestors_enclose_descendants() {
        let mut graph = SceneGraph::new();
        let root = graph.add_root(Node::group().with_bounding_radius(0.5));
        let child = graph
            .add_child(root, Node::group().with_transform(at(3.0, 4.0, 0.0)).with_bounding_radius(2.0))
            .unwrap();
        let leaf = graph
            .add_child(child, Node::group().with_transform(at(0.0, 0.0, 10.0)).with_bounding_radius(1.0))
            .unwrap();

        assert_relative_eq!(graph.get(child).unwrap().bounding_radius(), 11.0);
        assert_relative_eq!(graph.get(root).unwrap().bounding_radius(), 16.0);

        let mut id = leaf;
        while let Some(parent) = graph.get(id).unwrap().parent() {
            let node = graph.get(id).unwrap();
            let reach = node.local().translation_part().norm() + node.own_bounding_radius();
            assert!(graph.get(parent).unwrap().bounding_radius() >= reach);
            id = parent;
        }

        graph.remove_node(leaf).unwrap();
        assert_relative_eq!(graph.get(child).unwrap().bounding_radius(), 2.0);
        assert_relative_eq!(graph.get(root).unwrap().bounding_radius(), 7.0);

        graph.set_bounding_radius(child, 5.0).unwrap();
        assert_relative_eq!(graph.get(root).unwrap().bounding_radius(), 10.0);
    }

    #[test]
    fn test_remove_drops_subtree() {
        let mut graph = SceneGraph::new();
        let root = graph.add_root(Node::group());
        let child = graph.add_child(root, Node::group()).unwrap();
        let leaf = graph.add_child(child, Node::group()).unwrap();

        assert_eq!(graph.remove_node(child).unwrap(), 2);
        assert!(!graph.contains(leaf));
        assert!(graph.get(root).unwrap().children().is_empty());
        assert!(matches!(graph.remove_node(leaf), Err(SceneError::NodeNotFound(_))));

        graph.remove_node(root).unwrap();
        assert!(graph.is_empty());
        assert!(graph.roots().is_empty());
    }

    #[test]
    fn test_buckets_are_sorted_by_distance() {
        let mesh = quad();
        let mut graph = SceneGraph::new();
        let opaque = NodeFlags::DRAWABLE;
        let transparent = NodeFlags::DRAWABLE | NodeFlags::TRANSPARENT;
        for z in [-20.0, -5.0, -10.0] {
            graph.add_root(Node::mesh(mesh.clone()).with_flags(opaque).with_transform(at(0.0, 0.0, z)));
            graph.add_root(Node::mesh(mesh.clone()).with_flags(transparent).with_transform(at(1.0, 0.0, z)));
            graph.add_root(Node::mesh(mesh.clone()).with_transform(at(-1.0, 0.0, z)));
        }
        graph.update(&FrameInfo::default());

        let lists = graph.build_node_lists(&wide_frustum(), &Vec3::zeros());
        assert_eq!(lists.visible_count(), 9);
        assert_eq!(lists.culled, 0);

        let distances = |entries: &[NodeEntry]| entries.iter().map(|e| e.distance_sq).collect::<Vec<_>>();
        assert_eq!(distances(&lists.opaque), vec![25.0, 100.0, 400.0]);
        assert_eq!(distances(&lists.lit), vec![26.0, 101.0, 401.0]);
        assert_eq!(distances(&lists.transparent), vec![401.0, 101.0, 26.0]);
    }

    #[test]
    fn test_non_drawable_nodes_are_never_listed() {
        let mesh = quad();
        let mut graph = SceneGraph::new();
        let group = graph.add_root(Node::group());
        graph.add_child(group, Node::mesh(mesh.clone()).with_flags(NodeFlags::LIT)).unwrap();
        let drawn = graph.add_child(group, Node::mesh(mesh)).unwrap();

        let lists = graph.build_node_lists(&wide_frustum(), &Vec3::zeros());
        assert_eq!(lists.visible_count(), 1);
        assert_eq!(lists.lit[0].id, drawn);
        assert_eq!(graph.draw_params().instances, 1);
    }

    #[test]
    fn test_culled_ancestor_hides_visible_descendant() {
        let mesh = quad();
        let mut graph = SceneGraph::new();
        let scaled = at(5.0, 0.0, 0.0) * Mat4::new_nonuniform_scaling(&Vec3::new(10.0, 10.0, 10.0));
        let parent = graph.add_root(Node::group().with_transform(scaled).with_bounding_radius(0.1));
        let child = graph
            .add_child(parent, Node::mesh(mesh).with_transform(at(-0.5, 0.0, 0.0)).with_bounding_radius(0.1))
            .unwrap();
        graph.update(&FrameInfo::default());

        let frustum = Frustum::from_matrix(&Mat4::identity());
        let child_node = graph.get(child).unwrap();
        assert!(frustum.sphere_in_frustum(&child_node.world().translation_part(), child_node.bounding_radius()));

        let lists = graph.build_node_lists(&frustum, &Vec3::zeros());
        assert_eq!(lists.visible_count(), 0);
        assert_eq!(lists.culled, 1);
    }

    #[test]
    fn test_update_advances_animation() {
        let mut device = HeadlessDevice::default();
        let mut arena = GeometryArena::new(&mut device, &ArenaConfig::new().with_vertex_capacity(16)).unwrap();
        let data = MeshData::new(vec![Vec3::zeros(); 3], vec![0, 1, 2]);
        let animation = Animation::new(1, 10.0, vec![Mat4::identity(); 3]);
        let mesh = Arc::new(arena.upload(&data, Some(&animation)).unwrap());

        let mut graph = SceneGraph::new();
        let id = graph.add_root(Node::mesh(mesh));
        graph.update(&FrameInfo::new(0, 0.25));
        assert_relative_eq!(graph.get(id).unwrap().frame().unwrap(), 2.5);
        graph.set_frame(id, 4.0).unwrap();
        assert_relative_eq!(graph.get(id).unwrap().frame().unwrap(), 1.0);
    }

    #[test]
    fn test_draw_params_sum_over_subtree() {
        let mesh = quad();
        let mut graph = SceneGraph::new();
        let root = graph.add_root(Node::mesh(mesh.clone()));
        let group = graph.add_child(root, Node::group()).unwrap();
        graph.add_child(group, Node::mesh(mesh.clone())).unwrap();
        graph.add_root(Node::mesh(mesh));

        let expected = DrawParams {
            instances: 2,
            max_indirect_cmds: 2,
            max_vertices: 8,
        };
        assert_eq!(graph.subtree_draw_params(root).unwrap(), expected);
        assert_eq!(graph.draw_params().instances, 3);
    }

    #[test]
    fn test_skin_vertices_packs_lit_bucket_by_distance() {
        let mesh = quad();
        let mut graph = SceneGraph::new();
        let far = graph.add_root(Node::mesh(mesh.clone()).with_transform(at(0.0, 0.0, -10.0)));
        let near = graph.add_root(Node::mesh(mesh.clone()).with_transform(at(0.0, 0.0, -5.0)));
        let opaque = graph.add_root(Node::mesh(mesh).with_flags(NodeFlags::DRAWABLE).with_transform(at(0.0, 0.0, -3.0)));
        graph.update(&FrameInfo::default());
        let lists = graph.build_node_lists(&wide_frustum(), &Vec3::zeros());

        let mut device = HeadlessDevice::default();
        let mut base_vertex = 0;
        graph.skin_vertices(&lists.lit, &mut device, &mut base_vertex).unwrap();
        assert_eq!(base_vertex, 8);
        assert_eq!(graph.get(near).unwrap().base_vertex(), 0);
        assert_eq!(graph.get(far).unwrap().base_vertex(), 4);
        let dispatches = |device: &HeadlessDevice| {
            device.commands().iter().filter(|command| matches!(command, RecordedCommand::Dispatch { .. })).count()
        };
        assert_eq!(dispatches(&device), 2);

        graph.remove_node(near).unwrap();
        let mut base_vertex = 0;
        graph.skin_vertices(&lists.lit, &mut device, &mut base_vertex).unwrap();
        assert_eq!(base_vertex, 4);
        assert_eq!(graph.get(far).unwrap().base_vertex(), 0);
        assert_eq!(dispatches(&device), 3);

        graph.use_arena_vertices(&lists.opaque);
        let node = graph.get(opaque).unwrap();
        let offset = node.kind().mesh().unwrap().vertex_offset().unwrap();
        assert_eq!(node.base_vertex(), offset);
    }

    #[test]
    fn test_instances_and_draws_follow_bucket_order() {
        let mesh = quad();
        let mut graph = SceneGraph::new();
        let opaque = NodeFlags::DRAWABLE;
        let far = graph.add_root(Node::mesh(mesh.clone()).with_flags(opaque).with_transform(at(0.0, 0.0, -10.0)));
        let near = graph.add_root(Node::mesh(mesh.clone()).with_flags(opaque).with_transform(at(0.0, 0.0, -5.0)));
        let lit = graph.add_root(Node::mesh(mesh).with_transform(at(0.0, 0.0, -1.0)));
        graph.update(&FrameInfo::default());
        let lists = graph.build_node_lists(&wide_frustum(), &Vec3::zeros());
        graph.use_arena_vertices(&lists.opaque);

        let mut instances = stream(1024);
        let mut textures = stream(1024);
        let mut commands = stream(1024);
        let mut instance_map = instances.map(MapAccess::persistent_write(), 0, None).unwrap();
        let mut texture_map = textures.map(MapAccess::persistent_write(), 0, None).unwrap();
        let mut command_map = commands.map(MapAccess::persistent_write(), 0, None).unwrap();

        let (mut instance_counter, mut texture_counter, mut draw_counter) = (0, 0, 0);
        {
            let mut instance_cursor = instance_map.cursor();
            let mut texture_cursor = texture_map.cursor();
            let mut command_cursor = command_map.cursor();
            graph
                .write_instance_data(
                    &lists.opaque,
                    &mut instance_cursor,
                    &mut texture_cursor,
                    &mut instance_counter,
                    &mut texture_counter,
                )
                .unwrap();
            graph.write_batched_draws(&lists.opaque, &mut command_cursor, &mut draw_counter).unwrap();
        }

        assert_eq!((instance_counter, draw_counter), (2, 2));
        assert_eq!(graph.get(near).unwrap().base_instance(), 0);
        assert_eq!(graph.get(far).unwrap().base_instance(), 1);
        assert_eq!(graph.get(lit).unwrap().base_instance(), 0);

        let first: DrawElementsIndirectCommand = command_map.read_pod(0).unwrap();
        let second: DrawElementsIndirectCommand = command_map.read_pod(DRAW_ELEMENTS_STRIDE as usize).unwrap();
        assert_eq!((first.base_instance, second.base_instance), (0, 1));
        assert_eq!((first.count, second.count), (6, 6));
    }
}
