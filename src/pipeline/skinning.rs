//! Two-bone linear blend skinning
//!
//! Each vertex carries two bone influences. The blended position is
//! `M0·p·w0 + M1·p·w1` and the normal uses the inverse-transpose matrices the
//! same way. Weights are expected to sum to 1; they are not renormalized.

use crate::backend::types::Vertex;
use glam::{Mat3, Mat4, Vec3};
use thiserror::Error;

/// Largest bone table a drawable may carry
pub const MAX_BONES: usize = 60;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SkinningError {
    #[error("Bone table has {0} entries, the limit is {MAX_BONES}")]
    TooManyBones(usize),
    #[error("Vertex references bone {bone} but the table has {bones} entries")]
    BoneOutOfRange { bone: usize, bones: usize },
}

/// One bone transform with its matching normal matrix
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BonePose {
    pub position: Mat4,
    pub normal: Mat3,
}

impl BonePose {
    pub fn new(position: Mat4) -> Self {
        Self {
            position,
            normal: Mat3::from_mat4(position).inverse().transpose(),
        }
    }
}

/// Bone transforms for one drawable
#[derive(Debug, Clone, PartialEq)]
pub struct BoneTable {
    bones: Vec<BonePose>,
}

impl BoneTable {
    pub fn new(bones: Vec<BonePose>) -> Result<Self, SkinningError> {
        if bones.len() > MAX_BONES {
            return Err(SkinningError::TooManyBones(bones.len()));
        }
        Ok(Self { bones })
    }

    pub fn from_matrices(matrices: &[Mat4]) -> Result<Self, SkinningError> {
        Self::new(matrices.iter().copied().map(BonePose::new).collect())
    }

    pub fn len(&self) -> usize {
        self.bones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    pub fn get(&self, bone: usize) -> Result<&BonePose, SkinningError> {
        self.bones.get(bone).ok_or(SkinningError::BoneOutOfRange {
            bone,
            bones: self.bones.len(),
        })
    }
}

/// The two influences unpacked from [`Vertex::skin`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkinWeights {
    pub bones: [usize; 2],
    pub weights: [f32; 2],
}

impl SkinWeights {
    pub fn from_vertex(vertex: &Vertex) -> Self {
        Self {
            bones: [vertex.skin.x as usize, vertex.skin.y as usize],
            weights: [vertex.skin.z, vertex.skin.w],
        }
    }
}

/// Blend a vertex position and normal through its two bones.
///
/// Influences with a zero weight are skipped, so their bone index is not
/// checked against the table.
pub fn blend_vertex(table: &BoneTable, vertex: &Vertex) -> Result<(Vec3, Vec3), SkinningError> {
    let skin = SkinWeights::from_vertex(vertex);
    let mut position = Vec3::ZERO;
    let mut normal = Vec3::ZERO;

    for (bone, weight) in skin.bones.into_iter().zip(skin.weights) {
        if weight == 0.0 {
            continue;
        }
        let pose = table.get(bone)?;
        position += pose.position.transform_point3(vertex.position) * weight;
        normal += (pose.normal * vertex.normal) * weight;
    }

    Ok((position, normal))
}
