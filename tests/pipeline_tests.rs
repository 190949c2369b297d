//! End-to-end tests running full frames through the deferred pipeline

use deferred_pipeline::backend::types::TextureFormat;
use deferred_pipeline::backend::{BackendError, GraphicsBackend};
use deferred_pipeline::pipeline::{
    AoConfig, BlurKernel, BoneTable, CompositeConfig, DeferredConfig, LightingConfig, LightingPass,
    PostProcess, ShadowConfig,
};
use deferred_pipeline::render_graph::{
    GraphError, PassError, PassExecuteContext, PassSetupContext, Program, RenderGraphBuilder,
    RenderPass, RenderTargetDesc, ResourceId, ResourceUsage, TextureSize,
};
use deferred_pipeline::resources::{Material, Mesh, TextureData};
use deferred_pipeline::scene::{
    Camera, DirectionalLight, Projection, RenderObject, Scene, SceneError, ShadowCaster, Transform,
};
use deferred_pipeline::{ConfigError, Engine, EngineConfig, EngineError};
use glam::{Mat4, Quat, Vec3, Vec4};
use std::any::Any;
use rstest::rstest;

const SIZE: u32 = 64;
const BASE: Vec3 = Vec3::new(0.8, 0.4, 0.2);

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Camera at the origin looking down -Z
fn camera() -> Camera {
    Camera::new(Vec3::ZERO, Vec3::new(0.0, 0.0, -1.0))
        .with_projection(Projection::perspective(60.0, 0.1, 100.0))
}

/// Unlit-ambient pipeline so pixel values are exactly `albedo · N·L`
fn exact_pipeline() -> DeferredConfig {
    DeferredConfig::minimal()
        .with_composite(CompositeConfig::default().with_tone_divisor(1.0).with_ambient_scale(0.0))
}

/// Flat-colored quad at z = -3 turned 30 degrees about Y, lit head-on
fn tilted_quad_scene() -> Scene {
    let mut scene = Scene::new();
    scene.camera = camera();
    let mesh = scene.add_mesh(Mesh::quad());
    let material = scene.add_material(Material::matte(BASE));
    let transform = Transform::from_position(Vec3::new(0.0, 0.0, -3.0))
        .with_rotation(Quat::from_rotation_y(30f32.to_radians()))
        .with_scale(Vec3::splat(2.0));
    scene.add_object(RenderObject::new(mesh, material).with_transform(transform));
    scene.add_directional_light(DirectionalLight::new(Vec3::new(0.0, 0.0, -1.0), Vec3::ONE, 1.0));
    scene
}

fn assert_color(actual: Vec4, expected: Vec3, tolerance: f32) {
    let diff = (actual.truncate() - expected).abs().max_element();
    assert!(
        diff < tolerance,
        "expected {:?}, got {:?}",
        expected,
        actual
    );
}

#[rstest]
#[case::plain(PostProcess::None, None)]
#[case::fxaa(PostProcess::Fxaa, None)]
#[case::blur(PostProcess::Blur(BlurKernel::Taps14), None)]
#[case::shadows_without_caster(PostProcess::None, Some(ShadowConfig::default()))]
#[case::hard_shadows_without_caster(PostProcess::None, Some(ShadowConfig::hard()))]
fn test_lit_quad_is_lambert(#[case] post_process: PostProcess, #[case] shadows: Option<ShadowConfig>) {
    init_logging();
    let pipeline = exact_pipeline()
        .with_post_process(post_process)
        .with_shadows(shadows);
    let mut engine = Engine::configure(EngineConfig::new(SIZE, SIZE).with_pipeline(pipeline)).unwrap();

    let image = engine.render_frame(&tilted_quad_scene()).unwrap();
    let expected = BASE * 30f32.to_radians().cos();
    assert_color(image.pixel(SIZE / 2, SIZE / 2), expected, 0.01);
}

#[test]
fn test_background_takes_clear_color() {
    let clear = Vec4::new(0.1, 0.2, 0.3, 1.0);
    let pipeline = exact_pipeline().with_clear_color(clear);
    let mut engine = Engine::configure(EngineConfig::new(SIZE, SIZE).with_pipeline(pipeline)).unwrap();

    let image = engine.render_frame(&tilted_quad_scene()).unwrap();
    assert_color(image.pixel(0, 0), clear.truncate(), 0.01);
    assert_eq!(image.pixel(0, 0).w, 1.0);
}

#[test]
fn test_specular_highlight_adds_light() {
    let mut scene = Scene::new();
    scene.camera = camera();
    let mesh = scene.add_mesh(Mesh::quad());
    let material = scene.add_material(Material::glossy(BASE));
    scene.add_object(
        RenderObject::new(mesh, material)
            .with_position(Vec3::new(0.0, 0.0, -3.0))
            .with_scale(Vec3::splat(2.0)),
    );
    scene.add_directional_light(DirectionalLight::new(Vec3::new(0.0, 0.0, -1.0), Vec3::ONE, 1.0));

    let pipeline = exact_pipeline().with_lighting(LightingConfig::default().with_specular_exponent(1.0));
    let mut engine = Engine::configure(EngineConfig::new(SIZE, SIZE).with_pipeline(pipeline)).unwrap();
    let image = engine.render_frame(&scene).unwrap();

    // Head-on light on a glossy surface accumulates a full-strength highlight
    let lit = image.pixel(SIZE / 2, SIZE / 2).truncate();
    assert!(lit.x > BASE.x - 0.01);
    let light = engine.attachment("light.accum").unwrap();
    assert!(light.load((SIZE / 2) as i64, (SIZE / 2) as i64).w > 0.9);
}

#[test]
fn test_transparent_quad_blends_over_opaque() {
    let mut scene = Scene::new();
    scene.camera = camera();
    let mesh = scene.add_mesh(Mesh::quad());
    let opaque = scene.add_material(Material::matte(BASE));
    let glass = scene.add_material(Material::glass(0.5));
    scene.add_object(
        RenderObject::new(mesh, opaque)
            .with_position(Vec3::new(0.0, 0.0, -5.0))
            .with_scale(Vec3::splat(8.0)),
    );
    scene.add_object(
        RenderObject::new(mesh, glass)
            .with_position(Vec3::new(0.0, 0.0, -3.0))
            .with_scale(Vec3::splat(1.0)),
    );
    scene.add_directional_light(DirectionalLight::new(Vec3::new(0.0, 0.0, -1.0), Vec3::ONE, 1.0));

    let pipeline = exact_pipeline().with_transparents(true);
    let mut engine = Engine::configure(EngineConfig::new(SIZE, SIZE).with_pipeline(pipeline)).unwrap();
    let image = engine.render_frame(&scene).unwrap();

    let glass_color = Vec3::new(0.8, 0.9, 1.0);
    assert_color(image.pixel(SIZE / 2, SIZE / 2), BASE.lerp(glass_color, 0.5), 0.01);
    // Outside the glass only the opaque quad shows
    assert_color(image.pixel(SIZE / 2, 4), BASE, 0.01);
}

#[test]
fn test_object_picking() {
    let mut engine = Engine::configure(EngineConfig::new(SIZE, SIZE).with_pipeline(exact_pipeline())).unwrap();
    let scene = tilted_quad_scene();
    engine.render_frame(&scene).unwrap();

    let pick = engine.object_at(SIZE / 2, SIZE / 2).unwrap().unwrap();
    assert_eq!(pick.object_id, scene.objects[0].object_id);
    assert!(pick.depth > 0.0 && pick.depth < 1.0);
    assert_eq!(engine.object_at(0, 0).unwrap(), None);
}

#[test]
fn test_all_features_render() {
    init_logging();
    let pipeline = DeferredConfig::default()
        .with_ambient_occlusion(Some(AoConfig::default().with_blur(BlurKernel::Taps4)))
        .with_post_process(PostProcess::Fxaa);
    let mut engine = Engine::configure(EngineConfig::new(48, 32).with_pipeline(pipeline)).unwrap();

    let mut scene = tilted_quad_scene();
    let floor = scene.add_mesh(Mesh::plane(10.0, 10.0, 2));
    let material = scene.add_material(Material::matte(Vec3::splat(0.6)));
    scene.add_object(RenderObject::new(floor, material).with_position(Vec3::new(0.0, -1.0, 0.0)));
    scene.add_directional_light(
        DirectionalLight::new(Vec3::new(0.0, -1.0, -0.2), Vec3::ONE, 1.0).with_shadow(
            ShadowCaster::orthographic(Vec3::new(0.0, 0.0, -3.0), Vec3::new(0.0, -1.0, -0.2), Vec3::Z, 6.0, 20.0),
        ),
    );

    let image = engine.render_frame(&scene).unwrap();
    assert_eq!((image.width(), image.height()), (48, 32));

    for name in ["gbuffer.normal", "ao.visibility", "ao_blur_v.color", "shadow_map.map", "shadow.factor", "light.accum", "frame.color"] {
        assert!(engine.attachment(name).is_some(), "missing attachment {}", name);
    }
    let ao = engine.attachment("ao_blur_v.color").unwrap();
    for y in 0..ao.height() {
        for x in 0..ao.width() {
            let v = ao.load(x as i64, y as i64).x;
            assert!((0.0..=1.0).contains(&v));
        }
    }
}

#[test]
fn test_resize_reuses_fixed_size_targets() {
    let pipeline = exact_pipeline().with_shadows(Some(ShadowConfig::default().with_map_size(64)));
    let mut engine = Engine::configure(EngineConfig::new(SIZE, SIZE).with_pipeline(pipeline)).unwrap();
    let scene = tilted_quad_scene();
    engine.render_frame(&scene).unwrap();
    let live = engine.backend().live_texture_count();

    engine.resize(32, 24).unwrap();
    assert_eq!(engine.size(), (32, 24));
    assert_eq!(engine.backend().live_texture_count(), live);
    assert_eq!(engine.attachment("shadow_map.map").unwrap().width(), 64);

    let image = engine.render_frame(&scene).unwrap();
    assert_eq!((image.width(), image.height()), (32, 24));

    assert!(matches!(
        engine.resize(0, 24),
        Err(EngineError::Config(ConfigError::InvalidResolution { .. }))
    ));
    assert_eq!(engine.size(), (32, 24));
}

#[test]
fn test_memory_budget_exhaustion() {
    let config = EngineConfig::new(SIZE, SIZE).with_memory_budget(1024);
    assert!(matches!(
        Engine::configure(config),
        Err(EngineError::Backend(BackendError::OutOfMemory))
    ));
}

#[test]
fn test_invalid_configuration_fails_fast() {
    let shadows = ShadowConfig::default().with_map_size(0);
    let config = EngineConfig::new(SIZE, SIZE).with_pipeline(DeferredConfig::default().with_shadows(Some(shadows)));
    assert!(matches!(Engine::configure(config), Err(EngineError::Config(_))));

    let ao = AoConfig::default().with_sample_count(0);
    let config = EngineConfig::new(SIZE, SIZE)
        .with_pipeline(DeferredConfig::default().with_ambient_occlusion(Some(ao)));
    assert!(matches!(Engine::configure(config), Err(EngineError::Config(_))));
}

#[test]
fn test_dangling_mesh_rejects_frame() {
    let mut engine = Engine::configure(EngineConfig::new(16, 16).with_pipeline(exact_pipeline())).unwrap();
    let mut scene = Scene::new();
    let material = scene.add_material(Material::matte(BASE));
    scene.add_object(RenderObject::new(7, material));

    assert!(matches!(
        engine.render_frame(&scene),
        Err(EngineError::InvalidScene(SceneError::UnknownMesh { mesh: 7, .. }))
    ));
    // The engine stays usable
    engine.render_frame(&Scene::new()).unwrap();
}

/// Declares a G-buffer target but leaves writing it to another pass
#[derive(Default)]
struct GBufferLayout {
    normal: Option<ResourceId>,
    position: Option<ResourceId>,
}

impl RenderPass for GBufferLayout {
    fn name(&self) -> &str {
        "gbuffer_layout"
    }

    fn program(&self) -> Program {
        Program::fullscreen("layout", "default")
    }

    fn setup(&mut self, ctx: &mut PassSetupContext) {
        let target = ctx.create_render_target(
            RenderTargetDesc::new("gbuffer", TextureSize::full_screen())
                .attachment("normal", TextureFormat::Rgba16Float)
                .attachment("position", TextureFormat::Rgba32Float),
        );
        self.normal = target.attachment("normal");
        self.position = target.attachment("position");
    }

    fn execute(&self, _ctx: &mut PassExecuteContext) -> Result<(), PassError> {
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Fills declared G-buffer attachments with a camera-facing surface
struct GBufferFill {
    normal: ResourceId,
    position: ResourceId,
}

impl RenderPass for GBufferFill {
    fn name(&self) -> &str {
        "gbuffer_fill"
    }

    fn program(&self) -> Program {
        Program::fullscreen("fill", "default")
    }

    fn setup(&mut self, ctx: &mut PassSetupContext) {
        ctx.write(self.normal, ResourceUsage::RenderTarget);
        ctx.write(self.position, ResourceUsage::RenderTarget);
    }

    fn execute(&self, ctx: &mut PassExecuteContext) -> Result<(), PassError> {
        ctx.output(self.normal)?.clear(Vec4::new(0.0, 0.0, 1.0, 0.0));
        ctx.output(self.position)?.clear(Vec4::new(0.0, 0.0, -3.0, 1.0));
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[test]
fn test_lighting_before_geometry_is_rejected() {
    let mut builder = RenderGraphBuilder::new(SIZE, SIZE);
    let (normal, position) = builder
        .pass_with(GBufferLayout::default(), |p| (p.normal, p.position))
        .unwrap();
    let (normal, position) = (normal.unwrap(), position.unwrap());

    // Nothing has written the G-buffer yet
    let result = builder.pass(LightingPass::new(LightingConfig::default(), normal, position));
    assert!(matches!(
        result,
        Err(GraphError::ReadBeforeWrite { ref pass, ref resource })
            if pass == "Lighting Pass" && resource == "gbuffer.normal"
    ));
    assert_eq!(builder.graph().pass_nodes().len(), 1);

    // Once a pass writes it, the same lighting pass is accepted and runs after it
    let fill = builder.pass(GBufferFill { normal, position }).unwrap();
    let lighting = builder
        .pass(LightingPass::new(LightingConfig::default(), normal, position))
        .unwrap();
    let compiled = builder.build().compile().unwrap();
    let order = &compiled.pass_order;
    let index = |id| order.iter().position(|p| *p == id).unwrap();
    assert!(index(fill) < index(lighting));
}

/// Quad bound to bone 0 of a table that shifts it 1.2 units to the right
fn skinned_quad_scene() -> Scene {
    let mut scene = Scene::new();
    scene.camera = camera();
    let mut quad = Mesh::quad();
    for vertex in &mut quad.vertices {
        *vertex = vertex.with_skin([0, 0], [1.0, 0.0]);
    }
    let mesh = scene.add_mesh(quad);
    let material = scene.add_material(Material::matte(BASE));
    let bones = BoneTable::from_matrices(&[Mat4::from_translation(Vec3::new(1.2, 0.0, 0.0))]).unwrap();
    scene.add_object(
        RenderObject::new(mesh, material)
            .with_position(Vec3::new(0.0, 0.0, -3.0))
            .with_skeleton(bones),
    );
    scene.add_directional_light(DirectionalLight::new(Vec3::new(0.0, 0.0, -1.0), Vec3::ONE, 1.0));
    scene
}

#[rstest]
#[case::skinned(true, 54, 32)]
#[case::bind_pose(false, 32, 54)]
fn test_skinning_moves_coverage(#[case] skinning: bool, #[case] covered_x: u32, #[case] empty_x: u32) {
    let pipeline = exact_pipeline().with_skinning(skinning);
    let mut engine = Engine::configure(EngineConfig::new(SIZE, SIZE).with_pipeline(pipeline)).unwrap();
    let scene = skinned_quad_scene();
    engine.render_frame(&scene).unwrap();

    let pick = engine.object_at(covered_x, SIZE / 2).unwrap();
    assert_eq!(pick.map(|p| p.object_id), Some(scene.objects[0].object_id));
    assert_eq!(engine.object_at(empty_x, SIZE / 2).unwrap(), None);
}

/// Largest deviation from the flat +Z normal along the centre row of the quad
fn detail_normal_deviation(detail_map: bool) -> f32 {
    let mut scene = Scene::new();
    scene.camera = camera();
    let mesh = scene.add_mesh(Mesh::quad());
    let ripples = scene.add_texture(TextureData::ripples(64, 4.0));
    let material = scene.add_material(Material::matte(BASE).with_detail_texture(ripples, 2.0));
    scene.add_object(
        RenderObject::new(mesh, material)
            .with_position(Vec3::new(0.0, 0.0, -3.0))
            .with_scale(Vec3::splat(2.0)),
    );

    let pipeline = exact_pipeline().with_detail_map(detail_map);
    let mut engine = Engine::configure(EngineConfig::new(SIZE, SIZE).with_pipeline(pipeline)).unwrap();
    engine.render_frame(&scene).unwrap();

    let normals = engine.attachment("gbuffer.normal").unwrap();
    (18..46)
        .map(|x| (normals.load(x, (SIZE / 2) as i64).truncate() - Vec3::Z).length())
        .fold(0.0, f32::max)
}

#[test]
fn test_detail_map_perturbs_gbuffer_normal() {
    assert!(detail_normal_deviation(false) < 1e-2);
    assert!(detail_normal_deviation(true) > 0.1);
}
