//! Resource management
//!
//! Meshes, materials and texture loading consumed by the geometry stage.

mod material;
mod mesh;
mod texture;

pub use material::*;
pub use mesh::*;
pub use texture::*;
