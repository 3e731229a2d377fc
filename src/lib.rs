//! Cloth Engine - host-side cloth mesh core with dual device mirrors
//!
//! This crate owns the host representation of a simulated cloth surface
//! and keeps its two device images consistent: a render domain that draws
//! the mesh and a compute domain that an external position-based-dynamics
//! solver runs kernels against. The same device memory backs both domains
//! through buffer interop, so the solver writes what the renderer reads
//! without copies.
//!
//! # Features
//! - [`Mesh`]: shared geometry (vertices, edges, triangles) mirrored into
//!   render buffers, with compute views over the same memory
//! - [`ClothMesh`]: per-element simulation state, solver-write buffers,
//!   and solver-private compute buffers layered over a base mesh
//! - Headless [`WgpuDevice`] implementing both device domains over one
//!   GPU, plus a [`DummyDevice`] for GPU-free tests
//! - Role-keyed [`SolverBinding`] set handed to the external solver
//!
//! # Lifecycle
//!
//! ```ignore
//! let mut device = WgpuDevice::new_headless(&OffscreenConfig::default())?;
//! let mut cloth = ClothMesh::grid(32, 32, 1.0, 1.0, 0.05, 0.9)?;
//! cloth.upload_host_data(&mut device)?;
//! cloth.generate_compute_buffers(&mut device)?;
//! cloth.clear_host_data();
//!
//! let shader = device.create_shader(&ShaderDescriptor::new(BASIC_SHADER))?;
//! cloth.render(&mut device, shader, view_proj, model)?;
//! device.flush_frame()?;
//!
//! for binding in cloth.compute_bindings() {
//!     // hand binding.memory to the solver, keyed by binding.role
//! }
//! ```
//!
//! The solver and renderer share buffers, so the caller must order solver
//! dispatch and drawing; on the wgpu realization, submission order on the
//! shared queue provides that barrier.

pub mod backend;
pub mod error;
pub mod mesh;

pub use backend::{
    BackendError, BufferDescriptor, BufferHandle, BufferRole, BufferUsage, BufferUsageHint,
    ComputeBufferHandle, ComputeDevice, ComputeMemory, ComputeViewHandle, DummyDevice,
    MeshTransforms, RenderDevice, ShaderDescriptor, ShaderHandle, SolverBinding, Vertex,
    VertexArrayHandle, WgpuDevice, BASIC_SHADER,
};
pub use error::{MeshError, MeshResult};
pub use mesh::{ClothEdgeData, ClothMesh, ClothTriangleData, ClothVertexData, Edge, Mesh, Triangle};

/// Offscreen render target configuration for the headless device.
#[derive(Debug, Clone)]
pub struct OffscreenConfig {
    /// Label applied to the device and its target textures
    pub label: String,
    /// Render target width in pixels
    pub width: u32,
    /// Render target height in pixels
    pub height: u32,
}

impl Default for OffscreenConfig {
    fn default() -> Self {
        Self {
            label: "cloth-engine".to_string(),
            width: 1280,
            height: 720,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Mat4;

    #[test]
    fn test_offscreen_config_default() {
        let config = OffscreenConfig::default();
        assert_eq!((config.width, config.height), (1280, 720));
    }

    #[test]
    fn test_cloth_lifecycle_smoke() {
        let _ = env_logger::builder().is_test(true).try_init();

        let mut device = DummyDevice::new();
        let mut cloth = ClothMesh::grid(4, 4, 1.0, 1.0, 0.05, 0.9).unwrap();
        cloth.upload_host_data(&mut device).unwrap();
        cloth.generate_compute_buffers(&mut device).unwrap();
        cloth.clear_host_data();

        let shader = device
            .create_shader(&ShaderDescriptor::new(BASIC_SHADER).with_label("basic"))
            .unwrap();
        cloth
            .render(&mut device, shader, Mat4::IDENTITY, Mat4::IDENTITY)
            .unwrap();
        assert_eq!(device.draws().len(), 1);
        assert_eq!(
            device.draws()[0].index_count,
            3 * cloth.num_triangles() as u32
        );

        assert_eq!(cloth.compute_bindings().len(), 11);

        cloth.destroy(&mut device);
        assert_eq!(device.live_buffers(), 0);
        assert_eq!(device.live_views(), 0);
        assert_eq!(device.live_compute_buffers(), 0);
        assert_eq!(device.live_vertex_arrays(), 0);
    }
}
