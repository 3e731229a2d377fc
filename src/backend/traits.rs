//! Core device abstraction traits
//!
//! The mesh core talks to two device domains: a render domain that draws
//! geometry and a compute domain that runs solver kernels over the same
//! memory. [`RenderDevice`] owns creation and destruction of everything
//! the rasterizer touches; [`ComputeDevice`] wraps render buffers into
//! non-owning views and allocates the solver-private buffers that have no
//! render counterpart. One device may implement both.

use thiserror::Error;

use crate::backend::types::{
    BufferDescriptor, BufferRole, MeshTransforms, ShaderDescriptor, VertexBufferLayout,
};

/// Backend error type
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("failed to initialize device: {0}")]
    InitializationFailed(String),
    #[error("failed to create buffer: {0}")]
    BufferCreationFailed(String),
    #[error("failed to create shader: {0}")]
    ShaderCreationFailed(String),
    #[error("buffer interop unsupported: {0}")]
    InteropUnsupported(String),
    #[error("unknown resource handle: {0}")]
    UnknownHandle(&'static str),
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Handle to a render-device buffer. Owned by whoever created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub(crate) u64);

/// Handle to a render-device vertex array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexArrayHandle(pub(crate) u64);

/// Handle to a compiled shader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderHandle(pub(crate) u64);

/// Non-owning compute-domain alias of a render buffer. Must be released
/// before the render buffer it wraps is destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComputeViewHandle(pub(crate) u64);

/// Compute-owned buffer with no render-domain counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComputeBufferHandle(pub(crate) u64);

/// Render-domain device operations.
pub trait RenderDevice {
    /// Create an empty vertex array.
    fn create_vertex_array(&mut self) -> BackendResult<VertexArrayHandle>;

    /// Record how `buffer` is interpreted as vertex attributes when drawn
    /// through `vertex_array`. Reconfiguring with the same layout is a
    /// supported no-op.
    fn configure_vertex_attributes(
        &mut self,
        vertex_array: VertexArrayHandle,
        buffer: BufferHandle,
        layout: &VertexBufferLayout,
    ) -> BackendResult<()>;

    /// Create a buffer. Contents start zeroed.
    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BackendResult<BufferHandle>;

    /// Create a buffer with initial data.
    fn create_buffer_init(&mut self, desc: &BufferDescriptor, data: &[u8])
        -> BackendResult<BufferHandle>;

    /// Write data to a buffer.
    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]);

    /// Compile a shader.
    fn create_shader(&mut self, desc: &ShaderDescriptor) -> BackendResult<ShaderHandle>;

    /// Issue one indexed draw of `index_count` indices from `index_buffer`
    /// over the vertex array, with `transforms` bound as the per-draw
    /// uniform block.
    fn draw_indexed(
        &mut self,
        vertex_array: VertexArrayHandle,
        shader: ShaderHandle,
        index_buffer: BufferHandle,
        index_count: u32,
        transforms: &MeshTransforms,
    ) -> BackendResult<()>;

    /// Destroy a buffer. Any compute view over it must already be released.
    fn destroy_buffer(&mut self, buffer: BufferHandle);

    /// Destroy a vertex array.
    fn destroy_vertex_array(&mut self, vertex_array: VertexArrayHandle);
}

/// Compute-domain device operations.
pub trait ComputeDevice {
    /// Expose `buffer` to the compute domain without copying. The returned
    /// view aliases the render buffer's memory; the render buffer stays the
    /// owner. Fails with [`BackendError::InteropUnsupported`] when the
    /// buffer cannot be shared across domains.
    fn wrap_render_buffer(
        &mut self,
        buffer: BufferHandle,
        role: BufferRole,
    ) -> BackendResult<ComputeViewHandle>;

    /// Allocate a compute-owned buffer. Contents start zeroed.
    fn create_compute_buffer(
        &mut self,
        desc: &BufferDescriptor,
    ) -> BackendResult<ComputeBufferHandle>;

    /// Release a view. The underlying render buffer is untouched.
    fn release_view(&mut self, view: ComputeViewHandle);

    /// Destroy a compute-owned buffer.
    fn destroy_compute_buffer(&mut self, buffer: ComputeBufferHandle);
}
