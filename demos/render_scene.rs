//! Render a small demo scene to a PNG file
//!
//! Usage: `cargo run --example render_scene -- --output frame.png --aa fxaa`

use clap::{Parser, ValueEnum};
use deferred_pipeline::pipeline::{
    AoConfig, AoFalloff, AoResolve, AoVariant, BlurKernel, DeferredConfig, PostProcess, ShadowConfig,
};
use deferred_pipeline::resources::{Material, Mesh, TextureData};
use deferred_pipeline::scene::{Camera, DirectionalLight, PointLight, RenderObject, Scene, ShadowCaster};
use deferred_pipeline::{Engine, EngineConfig};
use glam::{Vec3, Vec4};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
enum CliPostProcess {
    None,
    #[default]
    Fxaa,
    Blur,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
enum CliShadows {
    Off,
    Hard,
    #[default]
    Variance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
enum CliAo {
    Off,
    #[default]
    Spiral,
    /// Spiral sampling with the `1/occlusion` resolve
    Reciprocal,
    Legacy,
}

/// Render the demo scene through the deferred pipeline.
#[derive(Parser, Debug)]
#[command(name = "render_scene", about = "Deferred pipeline demo renderer", version)]
struct Args {
    /// Output image width in pixels.
    #[arg(long, default_value = "640")]
    width: u32,

    /// Output image height in pixels.
    #[arg(long, default_value = "480")]
    height: u32,

    /// PNG file to write.
    #[arg(long, short, default_value = "frame.png")]
    output: PathBuf,

    /// Post-process technique.
    #[arg(long, default_value = "fxaa", value_enum)]
    aa: CliPostProcess,

    /// Shadow comparison.
    #[arg(long, default_value = "variance", value_enum)]
    shadows: CliShadows,

    /// Ambient occlusion variant.
    #[arg(long, default_value = "spiral", value_enum)]
    ao: CliAo,

    /// Blur the AO target before lighting.
    #[arg(long)]
    ao_blur: bool,

    /// Also write every intermediate attachment next to the output.
    #[arg(long)]
    dump_attachments: bool,
}

fn pipeline_config(args: &Args) -> DeferredConfig {
    let ao = match args.ao {
        CliAo::Off => None,
        CliAo::Spiral => Some(AoConfig::default()),
        CliAo::Reciprocal => Some(AoConfig::default().with_variant(AoVariant::Spiral {
            falloff: AoFalloff::SmoothCubic,
            resolve: AoResolve::Reciprocal,
        })),
        CliAo::Legacy => Some(AoConfig::default().with_variant(AoVariant::LegacyDepth)),
    }
    .map(|ao| {
        if args.ao_blur {
            ao.with_blur(BlurKernel::Taps8)
        } else {
            ao
        }
    });

    let shadows = match args.shadows {
        CliShadows::Off => None,
        CliShadows::Hard => Some(ShadowConfig::hard()),
        CliShadows::Variance => Some(ShadowConfig::default()),
    };

    let post_process = match args.aa {
        CliPostProcess::None => PostProcess::None,
        CliPostProcess::Fxaa => PostProcess::Fxaa,
        CliPostProcess::Blur => PostProcess::Blur(BlurKernel::Taps14),
    };

    DeferredConfig::default()
        .with_clear_color(Vec4::new(0.05, 0.06, 0.09, 1.0))
        .with_detail_map(true)
        .with_ambient_occlusion(ao)
        .with_shadows(shadows)
        .with_post_process(post_process)
}

fn build_scene() -> Scene {
    let mut scene = Scene::new();
    scene.camera = Camera::new(Vec3::new(0.0, 2.5, 6.0), Vec3::new(0.0, 0.5, 0.0));

    let checker = scene.add_texture(TextureData::checkerboard(64, [220, 220, 220, 255], [90, 90, 90, 255]));
    let ripples = scene.add_texture(TextureData::ripples(128, 12.0));

    let plane = scene.add_mesh(Mesh::plane(12.0, 12.0, 4));
    let cube = scene.add_mesh(Mesh::cube());
    let sphere = scene.add_mesh(Mesh::sphere(32, 16));

    let floor = scene.add_material(
        Material::matte(Vec3::ONE)
            .with_diffuse_texture(checker)
            .with_texture_scale(glam::Vec2::splat(0.25)),
    );
    let red = scene.add_material(Material::glossy(Vec3::new(0.8, 0.15, 0.1)).with_detail_texture(ripples, 0.5));
    let blue = scene.add_material(Material::matte(Vec3::new(0.15, 0.3, 0.8)));
    let glass = scene.add_material(Material::glass(0.4));

    scene.add_object(RenderObject::new(plane, floor));
    scene.add_object(RenderObject::new(cube, red).with_position(Vec3::new(-1.2, 0.5, 0.0)));
    scene.add_object(RenderObject::new(sphere, blue).with_position(Vec3::new(1.2, 0.6, -0.5)).with_scale(Vec3::splat(1.2)));
    scene.add_object(
        RenderObject::new(cube, glass)
            .with_position(Vec3::new(0.2, 0.6, 1.6))
            .with_scale(Vec3::new(1.5, 1.2, 0.1)),
    );

    let sun_direction = Vec3::new(-0.4, -1.0, -0.3);
    scene.add_directional_light(
        DirectionalLight::new(sun_direction, Vec3::new(1.0, 0.95, 0.85), 1.0).with_shadow(ShadowCaster::orthographic(
            Vec3::ZERO,
            sun_direction,
            Vec3::Y,
            7.0,
            20.0,
        )),
    );
    scene.add_point_light(PointLight::new(Vec3::new(2.0, 2.0, 2.0), Vec3::new(0.4, 0.6, 1.0), 0.6));
    scene
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = EngineConfig::new(args.width, args.height).with_pipeline(pipeline_config(&args));
    let mut engine = Engine::configure(config)?;
    let scene = build_scene();

    let image = engine.render_frame(&scene)?;
    image.save_png(&args.output)?;
    log::info!("Wrote {}x{} frame to {}", image.width(), image.height(), args.output.display());

    if let Some(pick) = engine.object_at(args.width / 2, args.height / 2)? {
        log::info!("Object {} is under the centre pixel at depth {:.4}", pick.object_id, pick.depth);
    }

    if args.dump_attachments {
        let stem = args
            .output
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("frame")
            .to_string();
        let names: Vec<String> = engine
            .graph()
            .resources()
            .iter()
            .filter(|r| !r.is_external())
            .map(|r| r.name().to_string())
            .collect();
        for name in names {
            if let Some(texture) = engine.attachment(&name) {
                let path = args.output.with_file_name(format!("{}.{}.png", stem, name));
                texture.to_rgba8().save(&path)?;
                log::info!("Wrote attachment {} to {}", name, path.display());
            }
        }
    }

    engine.dispose();
    Ok(())
}
