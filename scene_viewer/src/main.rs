//! Scene viewer
//!
//! Headless demo of the batch pipeline. Loads a mesh, an optional animation
//! clip and an optional material named on the command line, or builds a
//! generated scene, then renders a fixed number of frames against the
//! recording device and logs what each frame cost.
//!
//! ```text
//! scene_viewer [--config viewer.toml] [ASSET]...
//! ```

use std::f32::consts::TAU;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use batch_engine::foundation::logging;
use batch_engine::foundation::math::Vec4;
use batch_engine::prelude::*;
use batch_engine::render::{ActiveSide, BasicMesh, Perspective, RenderResult};
use clap::Parser;

const PROGRAMS: BatchPrograms = BatchPrograms {
    skinning: ProgramId(1),
    opaque: ProgramId(2),
    lit: ProgramId(3),
    transparent: ProgramId(4),
};

const GIZMO_PROGRAM: ProgramId = ProgramId(5);

const DEFAULT_CONFIG: &str = "scene_viewer.toml";
const DEFAULT_FRAMES: u32 = 240;
const DEFAULT_DELTA: f32 = 1.0 / 60.0;

/// Command line
#[derive(Parser, Debug)]
#[command(name = "scene_viewer", about = "Render a scene headlessly through the batch pipeline")]
struct Cli {
    /// Viewer configuration file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Mesh (.msh), animation clip (.anim) and material (.mat) to load
    #[arg(value_name = "ASSET")]
    assets: Vec<PathBuf>,
}

/// Assets named on the command line, sorted by kind
#[derive(Debug, Default, PartialEq)]
struct Args {
    config: Option<PathBuf>,
    mesh: Option<PathBuf>,
    clip: Option<PathBuf>,
    material: Option<PathBuf>,
}

impl TryFrom<Cli> for Args {
    type Error = String;

    fn try_from(cli: Cli) -> Result<Self, Self::Error> {
        let mut parsed = Self {
            config: cli.config,
            ..Self::default()
        };

        for path in cli.assets {
            let slot = match path.extension().and_then(|ext| ext.to_str()) {
                Some("msh") => &mut parsed.mesh,
                Some("anim") => &mut parsed.clip,
                Some("mat") => &mut parsed.material,
                _ => return Err(format!("unrecognised asset '{}'", path.display())),
            };
            if let Some(previous) = slot.replace(path) {
                return Err(format!("'{}' given twice", previous.display()));
            }
        }

        if parsed.mesh.is_none() && (parsed.clip.is_some() || parsed.material.is_some()) {
            return Err("a clip or material needs a .msh file".to_string());
        }
        Ok(parsed)
    }
}

struct SceneViewer {
    device: HeadlessDevice,
    arena: GeometryArena,
    cameras: SplitCamera<Perspective, Perspective>,
    renderer: BatchRenderer,
    graph: SceneGraph,
    input: InputState,
    gizmo: BasicMesh,
    frame_limit: u32,
    history: Vec<FrameStats>,
}

impl SceneViewer {
    fn new(config: &ApplicationConfig, args: &Args) -> Result<Self, AppError> {
        let mut device = HeadlessDevice::default();
        let mut arena = GeometryArena::new(&mut device, &config.arena)?;

        let left = Camera::perspective(&mut device, &config.camera)?;
        let right = Camera::perspective(&mut device, &config.camera)?;
        let mut cameras = SplitCamera::new(left, right, config.camera.width, config.camera.height)?;
        cameras.set_split_ratio(0.5)?;
        cameras.left_mut().set_position(Vec3::new(0.0, 1.0, 0.0));
        cameras.right_mut().set_position(Vec3::new(0.0, 6.0, 4.0));
        cameras.right_mut().pitch(-30.0);

        let renderer = BatchRenderer::new(&mut device, &config.arena, PROGRAMS)?;
        let gizmo = ground_grid(&mut device)?;

        let mut graph = SceneGraph::new();
        match &args.mesh {
            Some(mesh) => load_scene(&mut device, &mut arena, &mut graph, mesh, args)?,
            None => generate_scene(&mut arena, &mut graph)?,
        }
        log::info!(
            "Scene ready: {} nodes, {} meshes, {} vertices",
            graph.len(),
            arena.mesh_count(),
            arena.vertices_used()
        );

        Ok(Self {
            device,
            arena,
            cameras,
            renderer,
            graph,
            input: InputState::new(),
            gizmo,
            frame_limit: config.engine.frame_limit.unwrap_or(DEFAULT_FRAMES),
            history: Vec::new(),
        })
    }

    // Walk forward for the first quarter, look from the other camera for
    // the second half.
    fn script_input(&mut self, frame_index: u32) {
        let quarter = self.frame_limit / 4;
        if frame_index == 0 {
            self.input.handle_key_input(KeyCode::W, true);
        } else if frame_index == quarter {
            self.input.handle_key_input(KeyCode::W, false);
        } else if frame_index == quarter * 2 {
            self.input.handle_key_input(KeyCode::Tab, true);
        } else if frame_index == quarter * 2 + 1 {
            self.input.handle_key_input(KeyCode::Tab, false);
        }
    }

    fn log_summary(&self) {
        let frames = self.history.len().max(1) as f32;
        let total = |f: fn(&FrameStats) -> f32| self.history.iter().map(f).sum::<f32>() / frames;
        log::info!(
            "Per frame: {:.1} visible ({:.1} opaque, {:.1} lit, {:.1} transparent), {:.1} culled",
            total(|s| s.visible_nodes() as f32),
            total(|s| s.opaque_nodes as f32),
            total(|s| s.lit_nodes as f32),
            total(|s| s.transparent_nodes as f32),
            total(|s| s.culled as f32),
        );
        log::info!(
            "Per frame: {:.1} multi-draws, {:.1} commands per draw, {:.1} skinned vertices",
            total(|s| s.multi_draws as f32),
            total(FrameStats::avg_commands_per_draw),
            total(|s| s.skinned_vertices as f32),
        );
    }
}

impl Application for SceneViewer {
    fn update(&mut self, frame: &FrameInfo) -> Result<(), AppError> {
        self.script_input(frame.frame_index);
        self.cameras.update(&self.input, frame.frame_delta, true)?;
        self.graph.update(frame);
        Ok(())
    }

    fn render(&mut self, frame: &FrameInfo) -> Result<(), AppError> {
        let stats = match self.cameras.active() {
            ActiveSide::Left => self.renderer.render(
                &mut self.device,
                &mut self.graph,
                &self.arena,
                self.cameras.left(),
            )?,
            ActiveSide::Right => self.renderer.render(
                &mut self.device,
                &mut self.graph,
                &self.arena,
                self.cameras.right(),
            )?,
        };

        self.device.use_program(GIZMO_PROGRAM);
        self.gizmo.draw(&mut self.device)?;

        log::debug!(
            "Frame {}: {} visible, {} culled, {} commands in {} draws",
            frame.frame_index,
            stats.visible_nodes(),
            stats.culled,
            stats.draw_commands,
            stats.multi_draws
        );
        self.history.push(stats);
        Ok(())
    }

    fn post_render(&mut self, _frame: &FrameInfo) {
        let recorded = self.device.take_commands();
        log::trace!("Recorded {} device commands", recorded.len());
        self.input.frame_end();
    }

    fn should_close(&self) -> bool {
        self.input.is_key_down(KeyCode::Escape)
    }
}

fn load_scene(
    device: &mut HeadlessDevice,
    arena: &mut GeometryArena,
    graph: &mut SceneGraph,
    mesh_path: &Path,
    args: &Args,
) -> Result<(), AppError> {
    let data = MeshData::from_file(mesh_path)?;
    let clip = args.clip.as_deref().map(Animation::from_file).transpose()?;
    let mut mesh = arena.upload(&data, clip.as_ref())?;

    if let Some(material_path) = &args.material {
        let material = MeshMaterial::from_file(material_path)?;
        let base_dir = material_path.parent().unwrap_or_else(|| Path::new("."));
        mesh.set_texture_sets(material.load_layer_textures(base_dir, device)?);
    }

    let radius = enclosing_radius(data.positions());
    let mesh = Arc::new(mesh);
    let root = graph.add_root(Node::group().with_transform(Mat4::new_translation(&Vec3::new(0.0, 0.0, -4.0 * radius))));
    for x in [-1.5, 0.0, 1.5] {
        let local = Mat4::new_translation(&Vec3::new(x * 2.5 * radius, 0.0, 0.0));
        graph.add_child(
            root,
            Node::mesh(mesh.clone()).with_transform(local).with_bounding_radius(radius),
        )?;
    }
    Ok(())
}

// A ring of opaque cubes, a row of spinning lit cubes, transparent panes in
// front and a cluster behind the camera that is always culled.
fn generate_scene(arena: &mut GeometryArena, graph: &mut SceneGraph) -> Result<(), AppError> {
    let cube = cube_data();
    let radius = enclosing_radius(cube.positions());
    let static_cube = Arc::new(arena.upload(&cube, None)?);

    let spin = spin_clip(24, 12.0);
    let spinning_cube = Arc::new(arena.upload(&skinned(cube), Some(&spin))?);

    let ring = graph.add_root(Node::group().with_transform(Mat4::new_translation(&Vec3::new(0.0, 0.0, -15.0))));
    for i in 0..12 {
        let angle = TAU * i as f32 / 12.0;
        let local = Transform::from_position_rotation(
            Vec3::new(6.0 * angle.cos(), 0.0, 6.0 * angle.sin()),
            Quat::from_axis_angle(&Vec3::y_axis(), -angle),
        )
        .to_matrix();
        graph.add_child(
            ring,
            Node::mesh(static_cube.clone())
                .with_flags(NodeFlags::DRAWABLE)
                .with_transform(local)
                .with_bounding_radius(radius),
        )?;
    }

    for (i, x) in [-4.0, 0.0, 4.0].into_iter().enumerate() {
        let id = graph.add_root(
            Node::mesh(spinning_cube.clone())
                .with_transform(Mat4::new_translation(&Vec3::new(x, 2.5, -10.0)))
                .with_bounding_radius(radius),
        );
        graph.set_frame(id, i as f32 * 8.0)?;
    }

    for x in [-2.0, 2.0] {
        graph.add_root(
            Node::mesh(static_cube.clone())
                .with_flags(NodeFlags::DRAWABLE | NodeFlags::TRANSPARENT)
                .with_transform(Mat4::new_translation(&Vec3::new(x, 0.0, -6.0)))
                .with_scale(Vec3::new(1.5, 1.5, 0.1))
                .with_bounding_radius(radius * 1.5),
        );
    }

    let behind = graph.add_root(Node::group().with_transform(Mat4::new_translation(&Vec3::new(0.0, 0.0, 30.0))));
    for x in [-1.0, 1.0] {
        graph.add_child(
            behind,
            Node::mesh(static_cube.clone())
                .with_flags(NodeFlags::DRAWABLE)
                .with_transform(Mat4::new_translation(&Vec3::new(x * 2.0, 0.0, 0.0)))
                .with_bounding_radius(radius),
        )?;
    }
    Ok(())
}

fn enclosing_radius(positions: &[Vec3]) -> f32 {
    positions.iter().map(Vec3::norm).fold(0.0, f32::max).max(f32::EPSILON)
}

fn cube_data() -> MeshData {
    let positions = vec![
        Vec3::new(-0.5, -0.5, 0.5),
        Vec3::new(0.5, -0.5, 0.5),
        Vec3::new(0.5, 0.5, 0.5),
        Vec3::new(-0.5, 0.5, 0.5),
        Vec3::new(-0.5, -0.5, -0.5),
        Vec3::new(0.5, -0.5, -0.5),
        Vec3::new(0.5, 0.5, -0.5),
        Vec3::new(-0.5, 0.5, -0.5),
    ];
    let normals = positions.iter().map(|p| p.normalize()).collect();
    let indices = vec![
        0, 1, 2, 2, 3, 0, // front
        5, 4, 7, 7, 6, 5, // back
        4, 0, 3, 3, 7, 4, // left
        1, 5, 6, 6, 2, 1, // right
        3, 2, 6, 6, 7, 3, // top
        4, 5, 1, 1, 0, 4, // bottom
    ];
    MeshData::new(positions, indices).with_normals(normals)
}

// Every vertex fully bound to a single root joint
fn skinned(data: MeshData) -> MeshData {
    let vertices = data.vertex_count();
    data.with_skin(vec![Vec4::new(1.0, 0.0, 0.0, 0.0); vertices], vec![[0; 4]; vertices])
        .with_joints(
            vec!["root".to_string()],
            vec![-1],
            vec![Mat4::identity()],
            vec![Mat4::identity()],
        )
}

fn spin_clip(frames: usize, frame_rate: f32) -> Animation {
    let joints = (0..frames)
        .map(|frame| Mat4::from_axis_angle(&Vec3::y_axis(), TAU * frame as f32 / frames as f32))
        .collect();
    Animation::new(1, frame_rate, joints)
}

fn ground_grid(device: &mut HeadlessDevice) -> RenderResult<BasicMesh> {
    const HALF: i32 = 10;
    let mut positions = Vec::new();
    for i in -HALF..=HALF {
        let (i, half) = (i as f32, HALF as f32);
        positions.extend([
            Vec3::new(i, 0.0, -half),
            Vec3::new(i, 0.0, half),
            Vec3::new(-half, 0.0, i),
            Vec3::new(half, 0.0, i),
        ]);
    }
    BasicMesh::new(device, "ground_grid", &positions, &[])
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::try_from(Cli::parse())?;

    let config_path = args.config.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    let mut config = ApplicationConfig::load_validated(&config_path)?;
    logging::init_with_level(&config.engine.log_level);

    if config.engine.frame_limit.is_none() {
        config.engine.frame_limit = Some(DEFAULT_FRAMES);
    }
    if config.engine.fixed_delta.is_none() {
        config.engine.fixed_delta = Some(DEFAULT_DELTA);
    }

    let mut viewer = SceneViewer::new(&config, &args)?;
    let mut engine = Engine::new(config.engine.clone())?;
    let run = engine.run(&mut viewer)?;

    log::info!("Rendered {} frames ({:.1} simulated fps)", run.frames, run.average_fps());
    viewer.log_summary();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Result<Args, String> {
        let cli = Cli::try_parse_from(std::iter::once("scene_viewer").chain(list.iter().copied()))
            .map_err(|err| err.to_string())?;
        Args::try_from(cli)
    }

    #[test]
    fn test_assets_are_sorted_by_extension() {
        let parsed = args(&["clip.anim", "--config", "v.ron", "ship.msh", "ship.mat"]).unwrap();
        assert_eq!(parsed.mesh, Some(PathBuf::from("ship.msh")));
        assert_eq!(parsed.clip, Some(PathBuf::from("clip.anim")));
        assert_eq!(parsed.material, Some(PathBuf::from("ship.mat")));
        assert_eq!(parsed.config, Some(PathBuf::from("v.ron")));
    }

    #[test]
    fn test_bad_arguments_are_rejected() {
        assert!(args(&["ship.obj"]).unwrap_err().contains("unrecognised asset"));
        assert!(args(&["a.msh", "b.msh"]).unwrap_err().contains("given twice"));
        assert!(args(&["clip.anim"]).unwrap_err().contains("needs a .msh"));
        assert!(args(&["--config"]).is_err());
        assert!(args(&["--frames", "3"]).is_err());
        assert_eq!(args(&[]).unwrap(), Args::default());
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_generated_scene_renders_every_bucket() {
        let config = ApplicationConfig::new();
        let mut viewer = SceneViewer::new(&config, &Args::default()).unwrap();
        let frame = FrameInfo::new(0, DEFAULT_DELTA);
        viewer.update(&frame).unwrap();
        viewer.render(&frame).unwrap();

        let stats = viewer.history[0];
        assert!(stats.opaque_nodes > 0);
        assert_eq!(stats.lit_nodes, 3);
        assert_eq!(stats.transparent_nodes, 2);
        assert!(stats.culled > 0);
        assert_eq!(viewer.device.hazards(), 0);
    }

    #[test]
    fn test_run_stops_at_frame_limit() {
        let mut config = ApplicationConfig::new();
        config.engine = EngineConfig::new().with_frame_limit(8).with_fixed_delta(DEFAULT_DELTA);
        let mut viewer = SceneViewer::new(&config, &Args::default()).unwrap();
        let run = Engine::new(config.engine.clone()).unwrap().run(&mut viewer).unwrap();
        assert_eq!(run.frames, 8);
        assert_eq!(viewer.history.len(), 8);
    }
}
