//! Vertex stage shared by the mesh passes (G-buffer, shadow map, transparents)

use crate::backend::software::{Fragment, RasterVertex, Rasterizer, TriangleOutcome, Varying};
use crate::pipeline::skinning::blend_vertex;
use crate::render_graph::pass::PassError;
use crate::scene::{RenderObject, Scene};
use glam::{Mat4, Vec2, Vec3};

/// Attributes interpolated across a mesh triangle, in camera view space
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SurfaceVarying {
    pub position: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
}

impl Varying for SurfaceVarying {
    fn weighted_sum(v: [Self; 3], w: [f32; 3]) -> Self {
        Self {
            position: Vec3::weighted_sum(v.map(|s| s.position), w),
            normal: Vec3::weighted_sum(v.map(|s| s.normal), w),
            uv: Vec2::weighted_sum(v.map(|s| s.uv), w),
        }
    }
}

pub type SurfaceTriangle = [RasterVertex<SurfaceVarying>; 3];

/// Triangle counts from one draw
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrawStats {
    pub drawn: usize,
    pub culled: usize,
    pub behind_eye: usize,
}

impl DrawStats {
    fn record(&mut self, outcome: TriangleOutcome) {
        match outcome {
            TriangleOutcome::Drawn => self.drawn += 1,
            TriangleOutcome::Culled | TriangleOutcome::Degenerate => self.culled += 1,
            TriangleOutcome::BehindEye => self.behind_eye += 1,
        }
    }

    pub fn merge(&mut self, other: DrawStats) {
        self.drawn += other.drawn;
        self.culled += other.culled;
        self.behind_eye += other.behind_eye;
    }
}

/// Camera and skinning state for transforming drawables
#[derive(Debug, Clone, Copy)]
pub struct MeshTransform {
    pub view: Mat4,
    pub projection: Mat4,
    pub skinning: bool,
}

impl MeshTransform {
    pub fn new(view: Mat4, projection: Mat4, skinning: bool) -> Self {
        Self {
            view,
            projection,
            skinning,
        }
    }

    /// Run the vertex stage for every vertex of an object's mesh
    pub fn vertices(
        &self,
        scene: &Scene,
        object: &RenderObject,
    ) -> Result<Vec<RasterVertex<SurfaceVarying>>, PassError> {
        let mesh = scene
            .object_mesh(object)
            .map_err(|err| PassError::InvalidDrawable(err.to_string()))?;

        let model_view = self.view * object.transform.matrix();
        let normal_matrix = object.transform.normal_matrix(self.view);
        let skeleton = object.skeleton.as_ref().filter(|_| self.skinning);

        mesh.vertices
            .iter()
            .map(|vertex| {
                let (position, normal) = match skeleton {
                    Some(table) => blend_vertex(table, vertex).map_err(|err| {
                        PassError::InvalidDrawable(format!("object {}: {}", object.object_id, err))
                    })?,
                    None => (vertex.position, vertex.normal),
                };
                let view_position = model_view.transform_point3(position);
                Ok(RasterVertex {
                    clip: self.projection * view_position.extend(1.0),
                    varying: SurfaceVarying {
                        position: view_position,
                        normal: normal_matrix * normal,
                        uv: vertex.uv,
                    },
                })
            })
            .collect()
    }

    /// Rasterize an indexed mesh whose vertices went through [`MeshTransform::vertices`]
    pub fn draw<F>(
        &self,
        rasterizer: &Rasterizer,
        indices: &[u32],
        vertices: &[RasterVertex<SurfaceVarying>],
        mut emit: F,
    ) -> DrawStats
    where
        F: FnMut(&SurfaceTriangle, Fragment<SurfaceVarying>),
    {
        let mut stats = DrawStats::default();
        for tri in indices.chunks_exact(3) {
            let (Some(a), Some(b), Some(c)) = (
                vertices.get(tri[0] as usize),
                vertices.get(tri[1] as usize),
                vertices.get(tri[2] as usize),
            ) else {
                stats.culled += 1;
                continue;
            };
            let triangle = [*a, *b, *c];
            let outcome = rasterizer.draw_triangle(&triangle, |fragment| emit(&triangle, fragment));
            stats.record(outcome);
        }
        stats
    }
}
