//! Scene management
//!
//! A [`Scene`] is the per-frame snapshot handed to the pipeline: camera,
//! lights, and drawables referencing meshes, materials and textures by index.

mod camera;
mod light;
mod transform;

pub use camera::*;
pub use light::*;
pub use transform::*;

use crate::backend::software::Texture;
use crate::pipeline::skinning::{BoneTable, MAX_BONES};
use crate::render_graph::params::ParameterBlock;
use crate::resources::{Material, Mesh, TextureData};
use glam::Vec3;
use thiserror::Error;

/// Scene contents the pipeline cannot draw
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SceneError {
    #[error("Object {object} references unknown mesh {mesh}")]
    UnknownMesh { object: u16, mesh: usize },
    #[error("Object {object} references unknown material {material}")]
    UnknownMaterial { object: u16, material: usize },
    #[error("Material '{material}' references unknown texture {texture}")]
    UnknownTexture { material: String, texture: usize },
    #[error("Object {object} uses bone {bone} but its bone table has {bones} entries")]
    BoneOutOfRange { object: u16, bone: usize, bones: usize },
    #[error("Object id 0 is reserved for the background")]
    ReservedObjectId,
}

/// A renderable object in the scene
#[derive(Debug, Clone)]
pub struct RenderObject {
    /// Identifier written to the object-id attachment; 0 means background
    pub object_id: u16,
    pub mesh_id: usize,
    pub material_id: usize,
    pub transform: Transform,
    pub skeleton: Option<BoneTable>,
}

impl RenderObject {
    pub fn new(mesh_id: usize, material_id: usize) -> Self {
        Self {
            object_id: 0,
            mesh_id,
            material_id,
            transform: Transform::default(),
            skeleton: None,
        }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.transform.position = position;
        self
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.transform.scale = scale;
        self
    }

    pub fn with_skeleton(mut self, skeleton: BoneTable) -> Self {
        self.skeleton = Some(skeleton);
        self
    }
}

/// The scene containing all renderable content
#[derive(Debug, Clone, Default)]
pub struct Scene {
    pub camera: Camera,
    pub lights: Vec<Light>,
    pub objects: Vec<RenderObject>,
    pub meshes: Vec<Mesh>,
    pub materials: Vec<Material>,
    pub textures: Vec<Texture>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_mesh(&mut self, mesh: Mesh) -> usize {
        self.meshes.push(mesh);
        self.meshes.len() - 1
    }

    pub fn add_material(&mut self, material: Material) -> usize {
        self.materials.push(material);
        self.materials.len() - 1
    }

    pub fn add_texture(&mut self, texture: TextureData) -> usize {
        self.textures.push(texture.into_texture());
        self.textures.len() - 1
    }

    /// Add a render object; objects without an id get the next free one
    pub fn add_object(&mut self, mut object: RenderObject) -> u16 {
        if object.object_id == 0 {
            object.object_id = self
                .objects
                .iter()
                .map(|o| o.object_id)
                .max()
                .unwrap_or(0)
                .saturating_add(1);
        }
        let id = object.object_id;
        self.objects.push(object);
        id
    }

    /// Add a point light to the scene
    pub fn add_point_light(&mut self, light: PointLight) {
        self.lights.push(Light::Point(light));
    }

    /// Add a directional light to the scene
    pub fn add_directional_light(&mut self, light: DirectionalLight) {
        self.lights.push(Light::Directional(light));
    }

    /// The first light that casts shadows, with its index
    pub fn shadow_caster(&self) -> Option<(usize, &ShadowCaster)> {
        self.lights
            .iter()
            .enumerate()
            .find_map(|(index, light)| light.shadow().map(|caster| (index, caster)))
    }

    pub fn object_mesh(&self, object: &RenderObject) -> Result<&Mesh, SceneError> {
        self.meshes
            .get(object.mesh_id)
            .ok_or(SceneError::UnknownMesh {
                object: object.object_id,
                mesh: object.mesh_id,
            })
    }

    pub fn object_material(&self, object: &RenderObject) -> Result<&Material, SceneError> {
        self.materials
            .get(object.material_id)
            .ok_or(SceneError::UnknownMaterial {
                object: object.object_id,
                material: object.material_id,
            })
    }

    /// Check every reference in the scene before it is rendered
    pub fn validate(&self) -> Result<(), SceneError> {
        for material in &self.materials {
            for texture in [material.diffuse_texture, material.detail_texture]
                .into_iter()
                .flatten()
            {
                if texture >= self.textures.len() {
                    return Err(SceneError::UnknownTexture {
                        material: material.name.clone(),
                        texture,
                    });
                }
            }
        }

        for object in &self.objects {
            if object.object_id == 0 {
                return Err(SceneError::ReservedObjectId);
            }
            let mesh = self.object_mesh(object)?;
            self.object_material(object)?;

            if let Some(skeleton) = &object.skeleton {
                if let Some(bone) = mesh.max_bone_index() {
                    if bone >= skeleton.len() || bone >= MAX_BONES {
                        return Err(SceneError::BoneOutOfRange {
                            object: object.object_id,
                            bone,
                            bones: skeleton.len(),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

/// Everything a pass may read about the frame being rendered
pub struct FrameData<'a> {
    pub scene: &'a Scene,
    /// Per-frame parameters (camera matrices, light-space transform, viewport)
    pub params: ParameterBlock,
    /// Scene lights converted to view space
    pub lights: Vec<ViewLight>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::skinning::BonePose;
    use glam::Mat4;

    #[test]
    fn test_object_ids_are_assigned() {
        let mut scene = Scene::new();
        let mesh = scene.add_mesh(Mesh::quad());
        let material = scene.add_material(Material::default());
        assert_eq!(scene.add_object(RenderObject::new(mesh, material)), 1);
        let mut explicit = RenderObject::new(mesh, material);
        explicit.object_id = 300;
        assert_eq!(scene.add_object(explicit), 300);
        assert_eq!(scene.add_object(RenderObject::new(mesh, material)), 301);
        assert!(scene.validate().is_ok());
    }

    #[test]
    fn test_validate_dangling_references() {
        let mut scene = Scene::new();
        scene.add_object(RenderObject::new(3, 0));
        assert_eq!(
            scene.validate(),
            Err(SceneError::UnknownMesh { object: 1, mesh: 3 })
        );

        let mut scene = Scene::new();
        scene.add_material(Material::default().with_diffuse_texture(2));
        assert!(matches!(
            scene.validate(),
            Err(SceneError::UnknownTexture { texture: 2, .. })
        ));
    }

    #[test]
    fn test_validate_bone_range() {
        let mut scene = Scene::new();
        let mut mesh = Mesh::quad();
        for vertex in &mut mesh.vertices {
            *vertex = vertex.with_skin([0, 2], [0.5, 0.5]);
        }
        let mesh = scene.add_mesh(mesh);
        let material = scene.add_material(Material::default());
        let bones = BoneTable::new(vec![BonePose::new(Mat4::IDENTITY); 2]).unwrap();
        scene.add_object(RenderObject::new(mesh, material).with_skeleton(bones));
        assert_eq!(
            scene.validate(),
            Err(SceneError::BoneOutOfRange {
                object: 1,
                bone: 2,
                bones: 2
            })
        );
    }

    #[test]
    fn test_shadow_caster_is_first_shadowed_light() {
        let mut scene = Scene::new();
        scene.add_point_light(PointLight::new(Vec3::ZERO, Vec3::ONE, 1.0));
        scene.add_point_light(
            PointLight::new(Vec3::Y, Vec3::ONE, 1.0).with_shadow(-Vec3::Y, 0.1, 10.0),
        );
        assert_eq!(scene.shadow_caster().map(|(i, _)| i), Some(1));
    }
}
