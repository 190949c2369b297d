//! G-Buffer generation pass for deferred rendering
//!
//! Renders opaque geometry to multiple render targets (MRT):
//! - View-space normal (RGBA16F, w = 0)
//! - View-space position (RGBA32F, w = 1 where covered)
//! - Albedo (RGBA8, alpha = specular intensity)
//! - Object id (RGBA8: id high byte, id low byte, depth integer and fractional parts)
//! - Depth buffer

use crate::backend::software::{Fragment, Rasterizer, Texture};
use crate::backend::types::*;
use crate::pipeline::vertex_stage::{DrawStats, MeshTransform, SurfaceTriangle, SurfaceVarying};
use crate::render_graph::pass::*;
use crate::render_graph::resource::*;
use crate::resources::Material;
use glam::{Vec2, Vec3, Vec4};
use std::any::Any;

/// Attachment ids of the G-buffer target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GBufferTargets {
    pub normal: ResourceId,
    pub position: ResourceId,
    pub albedo: ResourceId,
    pub object_id: ResourceId,
    pub depth: ResourceId,
}

/// G-Buffer generation pass for deferred rendering
pub struct GBufferPass {
    skinning: bool,
    detail_map: bool,
    targets: Option<GBufferTargets>,
}

impl GBufferPass {
    pub fn new(skinning: bool, detail_map: bool) -> Self {
        Self {
            skinning,
            detail_map,
            targets: None,
        }
    }

    pub fn targets(&self) -> Option<GBufferTargets> {
        self.targets
    }
}

impl Default for GBufferPass {
    fn default() -> Self {
        Self::new(false, false)
    }
}

/// Pack an object id and NDC depth into an 8-bit RGBA texel
pub fn encode_object_id(id: u16, depth: f32) -> Vec4 {
    let scaled = depth.clamp(0.0, 1.0) * 255.0;
    Vec4::new(
        (id >> 8) as f32 / 255.0,
        (id & 0xff) as f32 / 255.0,
        scaled.floor() / 255.0,
        scaled.fract(),
    )
}

/// Inverse of [`encode_object_id`]; depth keeps roughly 16 bits of precision
pub fn decode_object_id(texel: Vec4) -> (u16, f32) {
    let byte = |v: f32| (v * 255.0).round() as u16;
    let id = (byte(texel.x) << 8) | byte(texel.y);
    (id, texel.z + texel.w / 255.0)
}

/// View-space tangent and bitangent of a triangle from its texture coordinates
fn tangent_frame(triangle: &SurfaceTriangle) -> Option<(Vec3, Vec3)> {
    let [a, b, c] = triangle.map(|v| v.varying);
    let e1 = b.position - a.position;
    let e2 = c.position - a.position;
    let d1 = b.uv - a.uv;
    let d2 = c.uv - a.uv;
    let r = d1.x * d2.y - d2.x * d1.y;
    if r.abs() <= f32::EPSILON {
        return None;
    }
    let tangent = ((e1 * d2.y - e2 * d1.y) / r).try_normalize()?;
    let bitangent = ((e2 * d1.x - e1 * d2.x) / r).try_normalize()?;
    Some((tangent, bitangent))
}

/// Perturb a normal by the height gradient of a detail map
fn apply_detail(normal: Vec3, frame: (Vec3, Vec3), height: &Texture, uv: Vec2, strength: f32) -> Vec3 {
    let texel = height.texel_size();
    let h = |uv: Vec2| height.sample(uv, SamplerDescriptor::LINEAR_REPEAT).x;
    let center = h(uv);
    let du = h(uv + Vec2::new(texel.x, 0.0)) - center;
    let dv = h(uv + Vec2::new(0.0, texel.y)) - center;
    (normal - (frame.0 * du + frame.1 * dv) * strength)
        .try_normalize()
        .unwrap_or(normal)
}

struct SurfaceInputs<'a> {
    material: &'a Material,
    diffuse: Option<&'a Texture>,
    detail: Option<&'a Texture>,
    texture_scale: Vec2,
}

impl SurfaceInputs<'_> {
    fn albedo(&self, uv: Vec2) -> Vec4 {
        let color = self.material.diffuse_color.truncate();
        let color = match self.diffuse {
            Some(texture) => {
                let sample = texture.sample(uv / self.texture_scale, SamplerDescriptor::LINEAR_REPEAT);
                color.lerp(sample.truncate(), sample.w)
            }
            None => color,
        };
        color.extend(self.material.specular_intensity())
    }
}

impl RenderPass for GBufferPass {
    fn name(&self) -> &str {
        "G-Buffer Pass"
    }

    fn program(&self) -> Program {
        let variant = if self.detail_map { "detail-map" } else { "default" };
        Program::mesh(self.skinning, "gbuffer", variant)
    }

    fn setup(&mut self, ctx: &mut PassSetupContext) {
        let target = ctx.create_render_target(
            RenderTargetDesc::new("gbuffer", TextureSize::full_screen())
                .attachment("normal", TextureFormat::Rgba16Float)
                .attachment("position", TextureFormat::Rgba32Float)
                .attachment("albedo", TextureFormat::Rgba8Unorm)
                .attachment("object_id", TextureFormat::Rgba8Unorm)
                .attachment("depth", TextureFormat::Depth32Float),
        );

        let (Some(normal), Some(position), Some(albedo), Some(object_id), Some(depth)) = (
            target.attachment("normal"),
            target.attachment("position"),
            target.attachment("albedo"),
            target.attachment("object_id"),
            target.attachment("depth"),
        ) else {
            return;
        };

        for color in [normal, position, albedo, object_id] {
            ctx.write(color, ResourceUsage::RenderTarget);
        }
        ctx.write(depth, ResourceUsage::DepthStencilWrite);

        self.targets = Some(GBufferTargets {
            normal,
            position,
            albedo,
            object_id,
            depth,
        });
    }

    fn execute(&self, ctx: &mut PassExecuteContext) -> Result<(), PassError> {
        let targets = self
            .targets
            .ok_or_else(|| PassError::MissingInput("gbuffer".into()))?;
        let transform = MeshTransform::new(ctx.mat4("view")?, ctx.mat4("projection")?, self.skinning);
        let scene = ctx.scene();

        let [normal_tex, position_tex, albedo_tex, id_tex, depth_tex] = ctx.outputs.many_mut([
            targets.normal,
            targets.position,
            targets.albedo,
            targets.object_id,
            targets.depth,
        ])?;
        normal_tex.clear(Vec4::ZERO);
        position_tex.clear(Vec4::ZERO);
        albedo_tex.clear(Vec4::ZERO);
        id_tex.clear(Vec4::ZERO);
        depth_tex.clear(Vec4::ONE);

        let rasterizer = Rasterizer::new(depth_tex.width(), depth_tex.height());
        let mut stats = DrawStats::default();

        for object in &scene.objects {
            let material = scene
                .object_material(object)
                .map_err(|err| PassError::InvalidDrawable(err.to_string()))?;
            if material.is_transparent() {
                continue;
            }
            let mesh = scene
                .object_mesh(object)
                .map_err(|err| PassError::InvalidDrawable(err.to_string()))?;

            let params = material.parameters();
            let surface = SurfaceInputs {
                material,
                diffuse: material.diffuse_texture.and_then(|id| scene.textures.get(id)),
                detail: material
                    .detail_texture
                    .filter(|_| self.detail_map)
                    .and_then(|id| scene.textures.get(id)),
                texture_scale: params.vec2("texture_scale")?,
            };

            let vertices = transform.vertices(scene, object)?;
            let draw = transform.draw(
                &rasterizer,
                &mesh.indices,
                &vertices,
                |triangle, fragment: Fragment<SurfaceVarying>| {
                    let (x, y) = (fragment.pixel.x, fragment.pixel.y);
                    if !CompareFunction::LessEqual.passes(fragment.depth, depth_tex.load(x as i64, y as i64).x) {
                        return;
                    }

                    let varying = fragment.varying;
                    let mut normal = varying.normal.try_normalize().unwrap_or(Vec3::Z);
                    if !fragment.front_facing {
                        normal = -normal;
                    }
                    if let (Some(height), Some(frame)) = (surface.detail, tangent_frame(triangle)) {
                        let uv = varying.uv / surface.texture_scale;
                        normal = apply_detail(normal, frame, height, uv, material.detail_strength);
                    }

                    depth_tex.store(x, y, Vec4::splat(fragment.depth));
                    normal_tex.store(x, y, normal.extend(0.0));
                    position_tex.store(x, y, varying.position.extend(1.0));
                    albedo_tex.store(x, y, surface.albedo(varying.uv));
                    id_tex.store(x, y, encode_object_id(object.object_id, fragment.depth));
                },
            );
            stats.merge(draw);
        }

        if stats.behind_eye > 0 {
            log::warn!(
                "G-buffer dropped {} triangles crossing the camera plane",
                stats.behind_eye
            );
        }
        log::trace!("G-buffer drew {} triangles", stats.drawn);
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
    use crate::backend::software::RasterVertex;

    #[test]
    fn test_object_id_encoding() {
        let texel = TextureFormat::Rgba8Unorm.store(encode_object_id(0x1234, 0.6));
        let (id, depth) = decode_object_id(texel);
        assert_eq!(id, 0x1234);
        assert!((depth - 0.6).abs() < 1.0 / 255.0 / 255.0);

        assert_eq!(decode_object_id(Vec4::ZERO), (0, 0.0));
    }

    #[test]
    fn test_tangent_frame_follows_uv_axes() {
        let vertex = |position: Vec3, uv: Vec2| RasterVertex {
            clip: Vec4::ONE,
            varying: SurfaceVarying {
                position,
                normal: Vec3::Z,
                uv,
            },
        };
        let triangle = [
            vertex(Vec3::ZERO, Vec2::ZERO),
            vertex(Vec3::new(2.0, 0.0, 0.0), Vec2::new(1.0, 0.0)),
            vertex(Vec3::new(0.0, -2.0, 0.0), Vec2::new(0.0, 1.0)),
        ];
        let (tangent, bitangent) = tangent_frame(&triangle).unwrap();
        assert!((tangent - Vec3::X).length() < 1e-6);
        assert!((bitangent + Vec3::Y).length() < 1e-6);
    }

    #[test]
    fn test_flat_detail_map_keeps_normal() {
        let flat = Texture::from_rgba8("flat", 2, 2, &[128; 16]);
        let normal = apply_detail(Vec3::Z, (Vec3::X, Vec3::Y), &flat, Vec2::splat(0.25), 4.0);
        assert_eq!(normal, Vec3::Z);
    }
}
