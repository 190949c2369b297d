//! Triangle rasterizer for the software backend
//!
//! Vertices arrive in clip space. Triangles are projected, bounded, and
//! scanned at pixel centres; attributes are interpolated perspective-correctly
//! and depth linearly in screen space. There is no near-plane clipping:
//! triangles with a vertex at or behind the eye are dropped whole.

use crate::backend::types::CullMode;
use glam::{UVec2, Vec2, Vec3, Vec4};

/// Vertices with a clip-space `w` at or below this value are treated as behind the eye
pub const MIN_CLIP_W: f32 = 1e-5;

/// Map normalized device coordinates to texture coordinates (y down)
pub fn ndc_to_uv(ndc: Vec2) -> Vec2 {
    Vec2::new(ndc.x * 0.5 + 0.5, 0.5 - ndc.y * 0.5)
}

/// Map texture coordinates back to normalized device coordinates
pub fn uv_to_ndc(uv: Vec2) -> Vec2 {
    Vec2::new(uv.x * 2.0 - 1.0, 1.0 - uv.y * 2.0)
}

/// Per-vertex data that can be blended across a triangle
pub trait Varying: Copy {
    fn weighted_sum(values: [Self; 3], weights: [f32; 3]) -> Self;
}

impl Varying for () {
    fn weighted_sum(_: [Self; 3], _: [f32; 3]) -> Self {}
}

impl Varying for f32 {
    fn weighted_sum(v: [Self; 3], w: [f32; 3]) -> Self {
        v[0] * w[0] + v[1] * w[1] + v[2] * w[2]
    }
}

impl Varying for Vec2 {
    fn weighted_sum(v: [Self; 3], w: [f32; 3]) -> Self {
        v[0] * w[0] + v[1] * w[1] + v[2] * w[2]
    }
}

impl Varying for Vec3 {
    fn weighted_sum(v: [Self; 3], w: [f32; 3]) -> Self {
        v[0] * w[0] + v[1] * w[1] + v[2] * w[2]
    }
}

impl Varying for Vec4 {
    fn weighted_sum(v: [Self; 3], w: [f32; 3]) -> Self {
        v[0] * w[0] + v[1] * w[1] + v[2] * w[2]
    }
}

/// A vertex after the vertex stage
#[derive(Debug, Clone, Copy)]
pub struct RasterVertex<V> {
    pub clip: Vec4,
    pub varying: V,
}

/// A covered pixel produced by the rasterizer
#[derive(Debug, Clone, Copy)]
pub struct Fragment<V> {
    pub pixel: UVec2,
    /// NDC depth in [0, 1]
    pub depth: f32,
    pub varying: V,
    pub front_facing: bool,
}

/// Outcome of submitting one triangle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriangleOutcome {
    Drawn,
    Culled,
    Degenerate,
    /// A vertex lies at or behind the eye plane
    BehindEye,
}

/// Rasterizer bound to one viewport
#[derive(Debug, Clone, Copy)]
pub struct Rasterizer {
    width: u32,
    height: u32,
    cull_mode: CullMode,
}

fn edge(a: Vec2, b: Vec2, c: Vec2) -> f32 {
    (b - a).perp_dot(c - a)
}

impl Rasterizer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            cull_mode: CullMode::None,
        }
    }

    pub fn with_cull_mode(mut self, cull_mode: CullMode) -> Self {
        self.cull_mode = cull_mode;
        self
    }

    pub fn viewport(&self) -> UVec2 {
        UVec2::new(self.width, self.height)
    }

    /// Scan-convert one triangle and hand every covered pixel to `emit`
    pub fn draw_triangle<V, F>(&self, triangle: &[RasterVertex<V>; 3], mut emit: F) -> TriangleOutcome
    where
        V: Varying,
        F: FnMut(Fragment<V>),
    {
        if self.width == 0 || self.height == 0 {
            return TriangleOutcome::Degenerate;
        }
        if triangle.iter().any(|v| v.clip.w <= MIN_CLIP_W) {
            return TriangleOutcome::BehindEye;
        }

        let size = Vec2::new(self.width as f32, self.height as f32);
        let ndc = triangle.map(|v| v.clip.truncate() / v.clip.w);
        let screen = ndc.map(|p| ndc_to_uv(p.truncate()) * size);

        let area = edge(screen[0], screen[1], screen[2]);
        if area.abs() <= f32::EPSILON {
            return TriangleOutcome::Degenerate;
        }
        // y is flipped on screen, so counter-clockwise NDC winding has negative area
        let front_facing = area < 0.0;
        match self.cull_mode {
            CullMode::Back if !front_facing => return TriangleOutcome::Culled,
            CullMode::Front if front_facing => return TriangleOutcome::Culled,
            _ => {}
        }

        let min = screen[0].min(screen[1]).min(screen[2]).floor().max(Vec2::ZERO);
        let max = screen[0]
            .max(screen[1])
            .max(screen[2])
            .ceil()
            .min(size - Vec2::ONE);
        if min.x > max.x || min.y > max.y {
            return TriangleOutcome::Drawn;
        }

        let inv_w = triangle.map(|v| 1.0 / v.clip.w);
        let varyings = triangle.map(|v| v.varying);

        for y in min.y as u32..=max.y as u32 {
            for x in min.x as u32..=max.x as u32 {
                let p = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
                let b = [
                    edge(screen[1], screen[2], p) / area,
                    edge(screen[2], screen[0], p) / area,
                    edge(screen[0], screen[1], p) / area,
                ];
                if b.iter().any(|&w| w < 0.0) {
                    continue;
                }

                let depth = b[0] * ndc[0].z + b[1] * ndc[1].z + b[2] * ndc[2].z;
                if !(0.0..=1.0).contains(&depth) {
                    continue;
                }

                let perspective = [b[0] * inv_w[0], b[1] * inv_w[1], b[2] * inv_w[2]];
                let total = perspective[0] + perspective[1] + perspective[2];
                let weights = perspective.map(|w| w / total);

                emit(Fragment {
                    pixel: UVec2::new(x, y),
                    depth,
                    varying: V::weighted_sum(varyings, weights),
                    front_facing,
                });
            }
        }

        TriangleOutcome::Drawn
    }
}
