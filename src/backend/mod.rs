//! Backend abstraction layer
//!
//! Provides the storage trait used by the render graph and the CPU backend implementing it.

pub mod software;
pub mod traits;
pub mod types;

pub use software::{SoftwareBackend, Texture};
pub use traits::*;
pub use types::*;
