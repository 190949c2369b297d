//! Transparents pass
//!
//! Drawables with opacity below 1 skip the G-buffer. They are sorted back to
//! front, shaded with a simple ambient plus Lambert model and blended "over"
//! into their own buffer, which the composite mixes on top of the lit frame.
//! The buffer stores straight (non-premultiplied) color and coverage alpha.

use crate::backend::software::{Rasterizer, Texture};
use crate::backend::types::*;
use crate::pipeline::vertex_stage::{DrawStats, MeshTransform};
use crate::render_graph::pass::*;
use crate::render_graph::resource::*;
use crate::scene::{RenderObject, Scene, ViewLight};
use glam::{Mat4, Vec3, Vec4};
use std::any::Any;

/// Blend straight-alpha `src` over straight-alpha `dst`
pub fn blend_over(dst: Vec4, src: Vec3, alpha: f32) -> Vec4 {
    let out_alpha = alpha + dst.w * (1.0 - alpha);
    if out_alpha <= 0.0 {
        return Vec4::ZERO;
    }
    let premultiplied = src * alpha + dst.truncate() * dst.w * (1.0 - alpha);
    (premultiplied / out_alpha).extend(out_alpha)
}

/// View-space depth used to order a drawable; more negative is farther
fn view_depth(scene: &Scene, object: &RenderObject, view: Mat4) -> f32 {
    let center = scene
        .meshes
        .get(object.mesh_id)
        .and_then(|mesh| mesh.bounds())
        .map_or(Vec3::ZERO, |(min, max)| (min + max) * 0.5);
    (view * object.transform.matrix()).transform_point3(center).z
}

fn shade(albedo: Vec3, normal: Vec3, position: Vec3, lights: &[ViewLight], ambient: f32) -> Vec3 {
    let diffuse = lights.iter().fold(Vec3::ZERO, |sum, light| {
        sum + light.color * normal.dot(light.direction_from(position)).max(0.0)
    });
    albedo * (Vec3::splat(ambient) + diffuse)
}

/// Sorted, blended rendering of translucent drawables
pub struct TransparentPass {
    skinning: bool,
    ambient_scale: f32,
    depth: ResourceId,
    output: Option<ResourceId>,
}

impl TransparentPass {
    pub fn new(skinning: bool, ambient_scale: f32, depth: ResourceId) -> Self {
        Self {
            skinning,
            ambient_scale,
            depth,
            output: None,
        }
    }

    pub fn output(&self) -> Option<ResourceId> {
        self.output
    }
}

impl RenderPass for TransparentPass {
    fn name(&self) -> &str {
        "Transparents Pass"
    }

    fn program(&self) -> Program {
        Program::mesh(self.skinning, "transparent", "over")
    }

    fn setup(&mut self, ctx: &mut PassSetupContext) {
        ctx.read("depth", self.depth, ResourceUsage::DepthStencilRead);
        let target = ctx.create_render_target(
            RenderTargetDesc::new("transparents", TextureSize::full_screen())
                .attachment("color", TextureFormat::Rgba16Float),
        );
        self.output = target.attachment("color");
        if let Some(output) = self.output {
            ctx.write(output, ResourceUsage::RenderTarget);
        }
        ctx.set_parameter("ambient_scale", self.ambient_scale);
    }

    fn execute(&self, ctx: &mut PassExecuteContext) -> Result<(), PassError> {
        let output = self
            .output
            .ok_or_else(|| PassError::MissingInput("transparents".into()))?;
        let depth = ctx.input("depth")?;
        let view = ctx.mat4("view")?;
        let transform = MeshTransform::new(view, ctx.mat4("projection")?, self.skinning);
        let ambient = ctx.float("ambient_scale")?;
        let frame = ctx.frame;
        let scene = frame.scene;

        let mut drawables = Vec::new();
        for object in &scene.objects {
            let material = scene
                .object_material(object)
                .map_err(|err| PassError::InvalidDrawable(err.to_string()))?;
            if material.is_transparent() {
                drawables.push((view_depth(scene, object, view), object, material));
            }
        }
        drawables.sort_by(|a, b| a.0.total_cmp(&b.0));

        let target = ctx.output(output)?;
        target.clear(Vec4::ZERO);
        if drawables.is_empty() {
            return Ok(());
        }

        let rasterizer = Rasterizer::new(target.width(), target.height());
        let mut stats = DrawStats::default();
        for (_, object, material) in drawables {
            let mesh = scene
                .object_mesh(object)
                .map_err(|err| PassError::InvalidDrawable(err.to_string()))?;
            let diffuse: Option<&Texture> = material.diffuse_texture.and_then(|id| scene.textures.get(id));
            let scale = material.parameters().vec2("texture_scale")?;
            let alpha = material.opacity.clamp(0.0, 1.0);

            let vertices = transform.vertices(scene, object)?;
            stats.merge(transform.draw(&rasterizer, &mesh.indices, &vertices, |_, fragment| {
                let (x, y) = (fragment.pixel.x, fragment.pixel.y);
                let opaque = depth.load(x as i64, y as i64).x;
                if !CompareFunction::LessEqual.passes(fragment.depth, opaque) {
                    return;
                }

                let varying = fragment.varying;
                let mut normal = varying.normal.normalize_or_zero();
                if !fragment.front_facing {
                    normal = -normal;
                }
                let base = material.diffuse_color.truncate();
                let albedo = match diffuse {
                    Some(texture) => {
                        let sample = texture.sample(varying.uv / scale, SamplerDescriptor::LINEAR_REPEAT);
                        base.lerp(sample.truncate(), sample.w)
                    }
                    None => base,
                };
                let color = shade(albedo, normal, varying.position, &frame.lights, ambient);
                let dst = target.load(x as i64, y as i64);
                target.store(x, y, blend_over(dst, color, alpha));
            }));
        }

        if stats.behind_eye > 0 {
            log::warn!(
                "Transparents dropped {} triangles crossing the camera plane",
                stats.behind_eye
            );
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{Material, Mesh};

    #[test]
    fn test_blend_over_empty_keeps_source() {
        let out = blend_over(Vec4::ZERO, Vec3::new(1.0, 0.5, 0.0), 0.4);
        assert!((out - Vec4::new(1.0, 0.5, 0.0, 0.4)).length() < 1e-6);
    }

    #[test]
    fn test_blend_over_matches_sequential_mix() {
        // Mixing the composite with the buffer equals blending each layer in turn
        let background = Vec3::new(0.2, 0.2, 0.2);
        let (far, near) = (Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 0.0, 1.0));
        let buffer = blend_over(blend_over(Vec4::ZERO, far, 0.5), near, 0.25);

        let expected = background.lerp(far, 0.5).lerp(near, 0.25);
        let actual = background.lerp(buffer.truncate(), buffer.w);
        assert!((expected - actual).length() < 1e-6);
    }

    #[test]
    fn test_drawables_sort_back_to_front() {
        let mut scene = Scene::new();
        let mesh = scene.add_mesh(Mesh::quad());
        let material = scene.add_material(Material::glass(0.5));
        let near = RenderObject::new(mesh, material).with_position(Vec3::new(0.0, 0.0, -2.0));
        let far = RenderObject::new(mesh, material).with_position(Vec3::new(0.0, 0.0, -8.0));
        assert!(view_depth(&scene, &far, Mat4::IDENTITY) < view_depth(&scene, &near, Mat4::IDENTITY));
    }
}
