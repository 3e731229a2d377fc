//! Mesh data structures: base geometry and the cloth extension.

pub mod cloth;
pub mod data;
pub mod geometry;

pub use cloth::{ClothEdgeData, ClothMesh, ClothTriangleData, ClothVertexData};
pub use data::Mesh;
pub use geometry::{grid, validate_topology, Edge, Triangle};
