//! Backend abstraction layer
//!
//! Provides the render- and compute-domain traits, the shared types, the
//! headless wgpu device implementing both domains over one GPU, and a
//! dummy device for GPU-free tests.

pub mod dummy;
pub mod traits;
pub mod types;
pub mod wgpu_backend;

pub use dummy::{DrawRecord, DummyDevice};
pub use traits::{
    BackendError, BackendResult, BufferHandle, ComputeBufferHandle, ComputeDevice,
    ComputeViewHandle, RenderDevice, ShaderHandle, VertexArrayHandle,
};
pub use types::{
    BufferDescriptor, BufferRole, BufferUsage, BufferUsageHint, ComputeMemory, MeshTransforms,
    ShaderDescriptor, SolverBinding, Vertex, VertexAttribute, VertexBufferLayout, VertexFormat,
    VertexStepMode,
};
pub use wgpu_backend::{WgpuDevice, BASIC_SHADER};
