//! # Batch Renderer
//!
//! Turns a culled scene into at most three multi-draw-indirect calls, one per
//! render bucket. All per-frame data goes through buffers the renderer owns:
//!
//! - **instances**: one [`InstanceData`] per visible node
//! - **texture sets**: one [`TextureHandleSet`] per drawn sub-mesh
//! - **indirect**: one [`DrawElementsIndirectCommand`] per drawn sub-mesh
//! - **skinned vertices**: compute output read by the lit pass, GPU only
//!
//! The first three are persistently mapped and coherent, so the CPU writes
//! land without a flush. They are single-buffered: each frame waits on the
//! previous frame's fence before rewriting them.
//!
//! ## Frame
//!
//! 1. cull and sort the graph into buckets
//! 2. skin every lit node into consecutive ranges of the skinned buffer
//! 3. barrier so vertex fetch and indirect reads see the compute writes
//! 4. write instances, texture sets and draws bucket by bucket
//! 5. one multi-draw-indirect per non-empty bucket: opaque, lit, transparent

use std::mem::size_of;
use std::time::Duration;

use super::camera::{Camera, Projection};
use super::geometry_arena::GeometryArena;
use super::layout::{InstanceData, VERTEX_STRIDE};
use super::{RenderError, RenderResult};
use crate::core::ArenaConfig;
use crate::gpu::{
    BarrierFlags, Buffer, BufferTarget, BufferUsage, DrawElementsIndirectCommand, Fence, GpuDevice,
    MapAccess, ProgramId, TextureHandleSet, DRAW_ELEMENTS_STRIDE,
};
use crate::scene::{Node, NodeEntry, NodeLists, RenderClass, SceneGraph};

/// Buffer binding points shared with the shaders
pub mod bindings {
    /// Camera matrix block (uniform)
    pub const CAMERA: u32 = 0;
    /// Instance records (storage)
    pub const INSTANCES: u32 = 1;
    /// Texture handle sets (storage)
    pub const TEXTURE_SETS: u32 = 2;
    /// Arena vertices read by the skinning shader (storage)
    pub const SKIN_SOURCE: u32 = 3;
    /// Skinned vertices written by the skinning shader (storage)
    pub const SKIN_TARGET: u32 = 4;
    /// Baked joint matrices (storage)
    pub const JOINTS: u32 = 5;
}

const FENCE_TIMEOUT: Duration = Duration::from_secs(1);

// Submission order of the buckets
const PASSES: [RenderClass; 3] = [RenderClass::Opaque, RenderClass::Lit, RenderClass::Transparent];

/// Programs used by the batch renderer, linked elsewhere
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPrograms {
    /// Compute program skinning one vertex per invocation
    pub skinning: ProgramId,
    /// Program for opaque geometry
    pub opaque: ProgramId,
    /// Program for skinned, lit geometry
    pub lit: ProgramId,
    /// Program for blended geometry
    pub transparent: ProgramId,
}

impl BatchPrograms {
    const fn for_class(&self, class: RenderClass) -> ProgramId {
        match class {
            RenderClass::Opaque => self.opaque,
            RenderClass::Lit => self.lit,
            RenderClass::Transparent => self.transparent,
        }
    }
}

/// Statistics of one rendered frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Visible opaque nodes
    pub opaque_nodes: usize,
    /// Visible transparent nodes
    pub transparent_nodes: usize,
    /// Visible lit nodes
    pub lit_nodes: usize,
    /// Subtrees rejected by the frustum
    pub culled: u32,
    /// Indirect draw commands written
    pub draw_commands: u32,
    /// Multi-draw-indirect calls issued
    pub multi_draws: u32,
    /// Vertices written by the skinning shader
    pub skinned_vertices: u32,
}

impl FrameStats {
    /// Visible nodes across all buckets
    pub const fn visible_nodes(&self) -> usize {
        self.opaque_nodes + self.transparent_nodes + self.lit_nodes
    }

    /// Average indirect commands per multi-draw call
    pub fn avg_commands_per_draw(&self) -> f32 {
        if self.multi_draws == 0 {
            0.0
        } else {
            self.draw_commands as f32 / self.multi_draws as f32
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct PassRange {
    class: RenderClass,
    first_command: u32,
    command_count: u32,
}

/// Per-frame skinning, buffer writes and indirect submission
#[derive(Debug)]
pub struct BatchRenderer {
    programs: BatchPrograms,
    instances: Buffer,
    texture_sets: Buffer,
    indirect: Buffer,
    skinned_vertices: Buffer,
    max_instances: usize,
    max_texture_sets: usize,
    max_draw_commands: usize,
    max_skinned_vertices: usize,
    lists: NodeLists,
    frame_fence: Option<Fence>,
}

impl BatchRenderer {
    /// Allocate and map the per-frame buffers sized by `config`
    pub fn new<D>(device: &mut D, config: &ArenaConfig, programs: BatchPrograms) -> RenderResult<Self>
    where
        D: GpuDevice + ?Sized,
    {
        let usage = BufferUsage::persistent_write();
        let mut instances = device.create_buffer_with(
            "batch_instances",
            config.max_instances * size_of::<InstanceData>(),
            None,
            usage,
        )?;
        let mut texture_sets = device.create_buffer_with(
            "batch_texture_sets",
            config.max_texture_sets * size_of::<TextureHandleSet>(),
            None,
            usage,
        )?;
        let mut indirect = device.create_buffer_with(
            "batch_indirect",
            config.max_draw_commands * size_of::<DrawElementsIndirectCommand>(),
            None,
            usage,
        )?;
        let skinned_vertices = device.create_buffer_with(
            "batch_skinned_vertices",
            config.max_skinned_vertices * VERTEX_STRIDE,
            None,
            BufferUsage::empty(),
        )?;

        instances.map(MapAccess::persistent_write(), 0, None)?;
        texture_sets.map(MapAccess::persistent_write(), 0, None)?;
        indirect.map(MapAccess::persistent_write(), 0, None)?;

        log::info!(
            "Batch renderer: {} instances, {} draw commands, {} texture sets, {} skinned vertices",
            config.max_instances,
            config.max_draw_commands,
            config.max_texture_sets,
            config.max_skinned_vertices
        );

        Ok(Self {
            programs,
            instances,
            texture_sets,
            indirect,
            skinned_vertices,
            max_instances: config.max_instances,
            max_texture_sets: config.max_texture_sets,
            max_draw_commands: config.max_draw_commands,
            max_skinned_vertices: config.max_skinned_vertices,
            lists: NodeLists::new(),
            frame_fence: None,
        })
    }

    /// Draw the scene as seen by `camera`
    ///
    /// The graph must have been updated this frame. Fails with
    /// [`RenderError::CapacityExceeded`] before touching any buffer when the
    /// visible scene does not fit.
    pub fn render<D, P>(
        &mut self,
        device: &mut D,
        graph: &mut SceneGraph,
        arena: &GeometryArena,
        camera: &Camera<P>,
    ) -> RenderResult<FrameStats>
    where
        D: GpuDevice + ?Sized,
        P: Projection,
    {
        graph.build_node_lists_into(camera.frustum(), &camera.position(), &mut self.lists);
        let lists = std::mem::take(&mut self.lists);
        let result = self.render_lists(device, graph, arena, camera, &lists);
        self.lists = lists;
        result
    }

    fn render_lists<D, P>(
        &mut self,
        device: &mut D,
        graph: &mut SceneGraph,
        arena: &GeometryArena,
        camera: &Camera<P>,
        lists: &NodeLists,
    ) -> RenderResult<FrameStats>
    where
        D: GpuDevice + ?Sized,
        P: Projection,
    {
        self.check_capacity(graph, lists)?;
        self.wait_for_previous_frame(device);

        let mut stats = FrameStats {
            opaque_nodes: lists.opaque.len(),
            transparent_nodes: lists.transparent.len(),
            lit_nodes: lists.lit.len(),
            culled: lists.culled,
            ..FrameStats::default()
        };

        stats.skinned_vertices = self.skin(device, graph, arena, &lists.lit)?;
        graph.use_arena_vertices(&lists.opaque);
        graph.use_arena_vertices(&lists.transparent);

        let passes = self.write_frame_data(graph, lists)?;
        stats.draw_commands = passes.iter().map(|pass| pass.command_count).sum();

        camera.bind_matrix_buffer(device, bindings::CAMERA)?;
        device.bind_buffer(BufferTarget::ShaderStorage, bindings::INSTANCES, &self.instances)?;
        device.bind_buffer(BufferTarget::ShaderStorage, bindings::TEXTURE_SETS, &self.texture_sets)?;
        device.bind_buffer(BufferTarget::DrawIndirect, 0, &self.indirect)?;

        for pass in passes.iter().filter(|pass| pass.command_count > 0) {
            let vertices = match pass.class {
                RenderClass::Lit => &self.skinned_vertices,
                RenderClass::Opaque | RenderClass::Transparent => arena.vertices(),
            };
            device.use_program(self.programs.for_class(pass.class));
            device.bind_vertex_source(vertices, VERTEX_STRIDE as u32, Some(arena.indices()))?;
            device.multi_draw_elements_indirect(
                &self.indirect,
                pass.first_command as usize * DRAW_ELEMENTS_STRIDE as usize,
                pass.command_count,
                DRAW_ELEMENTS_STRIDE,
            )?;
            stats.multi_draws += 1;
        }

        self.frame_fence = Some(device.fence_sync());
        log::trace!("Batch frame: {:?}", stats);
        Ok(stats)
    }

    fn check_capacity(&self, graph: &SceneGraph, lists: &NodeLists) -> RenderResult<()> {
        let mut draws = 0usize;
        let mut skinned = 0usize;
        for class in PASSES {
            for entry in lists.bucket(class) {
                let Some(params) = graph.get(entry.id).map(Node::draw_params) else {
                    continue;
                };
                draws += params.max_indirect_cmds as usize;
                if class == RenderClass::Lit {
                    skinned += params.max_vertices as usize;
                }
            }
        }

        let checks = [
            ("instance", lists.visible_count(), self.max_instances),
            ("draw command", draws, self.max_draw_commands),
            ("texture set", draws, self.max_texture_sets),
            ("skinned vertex", skinned, self.max_skinned_vertices),
        ];
        for (what, requested, capacity) in checks {
            if requested > capacity {
                log::error!("Frame needs {} {}s but only {} fit", requested, what, capacity);
                return Err(RenderError::CapacityExceeded {
                    what,
                    requested,
                    capacity,
                });
            }
        }
        Ok(())
    }

    fn wait_for_previous_frame<D>(&mut self, device: &mut D)
    where
        D: GpuDevice + ?Sized,
    {
        if let Some(fence) = self.frame_fence.take() {
            if !device.client_wait(&fence, FENCE_TIMEOUT) {
                log::warn!("Previous frame fence {} not signalled, overwriting in-flight buffers", fence.id());
            }
        }
    }

    fn skin<D>(
        &self,
        device: &mut D,
        graph: &mut SceneGraph,
        arena: &GeometryArena,
        lit: &[NodeEntry],
    ) -> RenderResult<u32>
    where
        D: GpuDevice + ?Sized,
    {
        if lit.is_empty() {
            return Ok(0);
        }

        device.use_program(self.programs.skinning);
        device.bind_buffer(BufferTarget::ShaderStorage, bindings::SKIN_SOURCE, arena.vertices())?;
        device.bind_buffer(BufferTarget::ShaderStorage, bindings::SKIN_TARGET, &self.skinned_vertices)?;
        device.bind_buffer(BufferTarget::ShaderStorage, bindings::JOINTS, arena.joints())?;

        let mut base_vertex = 0;
        graph.skin_vertices(lit, device, &mut base_vertex)?;
        device.memory_barrier(BarrierFlags::skinning_to_draw());
        Ok(base_vertex)
    }

    fn write_frame_data(&mut self, graph: &mut SceneGraph, lists: &NodeLists) -> RenderResult<Vec<PassRange>> {
        let mut instance_mapping = self.instances.mapping()?;
        let mut texture_mapping = self.texture_sets.mapping()?;
        let mut command_mapping = self.indirect.mapping()?;
        let mut instances = instance_mapping.cursor();
        let mut textures = texture_mapping.cursor();
        let mut commands = command_mapping.cursor();

        let mut instance_counter = 0;
        let mut texture_counter = 0;
        let mut command_counter = 0;
        let mut passes = Vec::with_capacity(PASSES.len());

        for class in PASSES {
            let first_command = command_counter;
            let entries = lists.bucket(class);
            graph.write_instance_data(entries, &mut instances, &mut textures, &mut instance_counter, &mut texture_counter)?;
            graph.write_batched_draws(entries, &mut commands, &mut command_counter)?;
            passes.push(PassRange {
                class,
                first_command,
                command_count: command_counter - first_command,
            });
        }
        Ok(passes)
    }

    /// Programs used per pass
    pub const fn programs(&self) -> &BatchPrograms {
        &self.programs
    }

    /// Instance record buffer
    pub const fn instance_buffer(&self) -> &Buffer {
        &self.instances
    }

    /// Texture handle set buffer
    pub const fn texture_set_buffer(&self) -> &Buffer {
        &self.texture_sets
    }

    /// Indirect command buffer
    pub const fn indirect_buffer(&self) -> &Buffer {
        &self.indirect
    }

    /// Skinning output buffer
    pub const fn skinned_vertex_buffer(&self) -> &Buffer {
        &self.skinned_vertices
    }

    /// Lists built by the last [`Self::render`]
    pub const fn node_lists(&self) -> &NodeLists {
        &self.lists
    }
}
