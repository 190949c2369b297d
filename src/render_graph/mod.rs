//! Render Graph System
//!
//! A declarative system for defining render passes as a directed acyclic graph (DAG).
//! The graph validates pass ordering, plans resource lifetimes and drives execution.

pub mod executor;
pub mod graph;
pub mod params;
pub mod pass;
pub mod resource;

pub use executor::*;
pub use graph::*;
pub use params::*;
pub use pass::*;
pub use resource::*;
