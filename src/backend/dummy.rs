//! Dummy device for testing and development.
//!
//! Implements both device domains over plain byte vectors without touching
//! GPU hardware. Records draw calls and live-resource counts, and can
//! inject a single interop failure for rollback tests.

use std::collections::HashMap;

use crate::backend::traits::*;
use crate::backend::types::*;

struct DummyBuffer {
    data: Vec<u8>,
    usage: BufferUsage,
    #[allow(dead_code)]
    hint: BufferUsageHint,
}

#[derive(Default)]
struct DummyVertexArray {
    buffer: Option<BufferHandle>,
    layout: Option<VertexBufferLayout>,
}

struct DummyView {
    buffer: u64,
    #[allow(dead_code)]
    role: BufferRole,
}

/// Recorded indexed draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawRecord {
    pub index_count: u32,
}

/// Dummy device implementing both device domains.
pub struct DummyDevice {
    buffers: HashMap<u64, DummyBuffer>,
    vertex_arrays: HashMap<u64, DummyVertexArray>,
    shaders: HashMap<u64, Option<String>>,
    compute_views: HashMap<u64, DummyView>,
    compute_buffers: HashMap<u64, Vec<u8>>,

    next_buffer_id: u64,
    next_vertex_array_id: u64,
    next_shader_id: u64,
    next_view_id: u64,
    next_compute_buffer_id: u64,

    draws: Vec<DrawRecord>,
    fail_wrap_for: Option<BufferRole>,
}

impl DummyDevice {
    pub fn new() -> Self {
        Self {
            buffers: HashMap::new(),
            vertex_arrays: HashMap::new(),
            shaders: HashMap::new(),
            compute_views: HashMap::new(),
            compute_buffers: HashMap::new(),
            next_buffer_id: 1,
            next_vertex_array_id: 1,
            next_shader_id: 1,
            next_view_id: 1,
            next_compute_buffer_id: 1,
            draws: Vec::new(),
            fail_wrap_for: None,
        }
    }

    /// Make the next `wrap_render_buffer` call for `role` fail, once.
    pub fn fail_next_wrap(&mut self, role: BufferRole) {
        self.fail_wrap_for = Some(role);
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_vertex_arrays(&self) -> usize {
        self.vertex_arrays.len()
    }

    pub fn live_views(&self) -> usize {
        self.compute_views.len()
    }

    pub fn live_compute_buffers(&self) -> usize {
        self.compute_buffers.len()
    }

    pub fn draws(&self) -> &[DrawRecord] {
        &self.draws
    }

    pub fn buffer_size(&self, buffer: BufferHandle) -> Option<u64> {
        self.buffers.get(&buffer.0).map(|b| b.data.len() as u64)
    }

    pub fn buffer_data(&self, buffer: BufferHandle) -> Option<&[u8]> {
        self.buffers.get(&buffer.0).map(|b| b.data.as_slice())
    }

    /// The render buffer a view resolves to, for aliasing assertions.
    pub fn view_target(&self, view: ComputeViewHandle) -> Option<BufferHandle> {
        self.compute_views.get(&view.0).map(|v| BufferHandle(v.buffer))
    }

    pub fn compute_buffer_size(&self, buffer: ComputeBufferHandle) -> Option<u64> {
        self.compute_buffers.get(&buffer.0).map(|b| b.len() as u64)
    }
}

impl Default for DummyDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderDevice for DummyDevice {
    fn create_vertex_array(&mut self) -> BackendResult<VertexArrayHandle> {
        let id = self.next_vertex_array_id;
        self.next_vertex_array_id += 1;
        self.vertex_arrays.insert(id, DummyVertexArray::default());
        log::trace!("DummyDevice: creating vertex array {id}");
        Ok(VertexArrayHandle(id))
    }

    fn configure_vertex_attributes(
        &mut self,
        vertex_array: VertexArrayHandle,
        buffer: BufferHandle,
        layout: &VertexBufferLayout,
    ) -> BackendResult<()> {
        if !self.buffers.contains_key(&buffer.0) {
            return Err(BackendError::UnknownHandle("buffer"));
        }
        let entry = self
            .vertex_arrays
            .get_mut(&vertex_array.0)
            .ok_or(BackendError::UnknownHandle("vertex array"))?;
        entry.buffer = Some(buffer);
        entry.layout = Some(layout.clone());
        log::trace!(
            "DummyDevice: vertex array {} reads buffer {} ({} attributes)",
            vertex_array.0,
            buffer.0,
            layout.attributes.len()
        );
        Ok(())
    }

    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BackendResult<BufferHandle> {
        let id = self.next_buffer_id;
        self.next_buffer_id += 1;
        self.buffers.insert(
            id,
            DummyBuffer {
                data: vec![0u8; desc.size as usize],
                usage: desc.usage,
                hint: desc.hint,
            },
        );
        log::trace!(
            "DummyDevice: creating buffer {:?} (size: {})",
            desc.label,
            desc.size
        );
        Ok(BufferHandle(id))
    }

    fn create_buffer_init(
        &mut self,
        desc: &BufferDescriptor,
        data: &[u8],
    ) -> BackendResult<BufferHandle> {
        let id = self.next_buffer_id;
        self.next_buffer_id += 1;
        self.buffers.insert(
            id,
            DummyBuffer {
                data: data.to_vec(),
                usage: desc.usage,
                hint: desc.hint,
            },
        );
        log::trace!(
            "DummyDevice: creating buffer {:?} with {} initial bytes",
            desc.label,
            data.len()
        );
        Ok(BufferHandle(id))
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) {
        if let Some(entry) = self.buffers.get_mut(&buffer.0) {
            let end = offset as usize + data.len();
            if entry.data.len() < end {
                entry.data.resize(end, 0);
            }
            entry.data[offset as usize..end].copy_from_slice(data);
            log::trace!(
                "DummyDevice: write_buffer {} offset={} len={}",
                buffer.0,
                offset,
                data.len()
            );
        }
    }

    fn create_shader(&mut self, desc: &ShaderDescriptor) -> BackendResult<ShaderHandle> {
        let id = self.next_shader_id;
        self.next_shader_id += 1;
        self.shaders.insert(id, desc.label.clone());
        log::trace!("DummyDevice: creating shader {:?}", desc.label);
        Ok(ShaderHandle(id))
    }

    fn draw_indexed(
        &mut self,
        vertex_array: VertexArrayHandle,
        shader: ShaderHandle,
        index_buffer: BufferHandle,
        index_count: u32,
        _transforms: &MeshTransforms,
    ) -> BackendResult<()> {
        let entry = self
            .vertex_arrays
            .get(&vertex_array.0)
            .ok_or(BackendError::UnknownHandle("vertex array"))?;
        if entry.layout.is_none() {
            return Err(BackendError::UnknownHandle("vertex array has no attribute layout"));
        }
        if entry.buffer.map_or(true, |b| !self.buffers.contains_key(&b.0)) {
            return Err(BackendError::UnknownHandle("vertex array buffer"));
        }
        if !self.shaders.contains_key(&shader.0) {
            return Err(BackendError::UnknownHandle("shader"));
        }
        if !self.buffers.contains_key(&index_buffer.0) {
            return Err(BackendError::UnknownHandle("index buffer"));
        }
        self.draws.push(DrawRecord { index_count });
        log::trace!("DummyDevice: draw_indexed {} indices", index_count);
        Ok(())
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        if self.buffers.remove(&buffer.0).is_some() {
            log::trace!("DummyDevice: destroying buffer {}", buffer.0);
        }
    }

    fn destroy_vertex_array(&mut self, vertex_array: VertexArrayHandle) {
        if self.vertex_arrays.remove(&vertex_array.0).is_some() {
            log::trace!("DummyDevice: destroying vertex array {}", vertex_array.0);
        }
    }
}

impl ComputeDevice for DummyDevice {
    fn wrap_render_buffer(
        &mut self,
        buffer: BufferHandle,
        role: BufferRole,
    ) -> BackendResult<ComputeViewHandle> {
        let entry = self
            .buffers
            .get(&buffer.0)
            .ok_or(BackendError::UnknownHandle("buffer"))?;
        if self.fail_wrap_for == Some(role) {
            self.fail_wrap_for = None;
            return Err(BackendError::InteropUnsupported(format!(
                "injected interop failure for {role:?}"
            )));
        }
        if !entry.usage.contains(BufferUsage::STORAGE) {
            return Err(BackendError::InteropUnsupported(format!(
                "{role:?} buffer was created without STORAGE usage"
            )));
        }
        let id = self.next_view_id;
        self.next_view_id += 1;
        self.compute_views.insert(id, DummyView { buffer: buffer.0, role });
        log::trace!("DummyDevice: wrapping buffer {} as {role:?} view {id}", buffer.0);
        Ok(ComputeViewHandle(id))
    }

    fn create_compute_buffer(
        &mut self,
        desc: &BufferDescriptor,
    ) -> BackendResult<ComputeBufferHandle> {
        let id = self.next_compute_buffer_id;
        self.next_compute_buffer_id += 1;
        self.compute_buffers.insert(id, vec![0u8; desc.size as usize]);
        log::trace!(
            "DummyDevice: creating compute buffer {:?} (size: {})",
            desc.label,
            desc.size
        );
        Ok(ComputeBufferHandle(id))
    }

    fn release_view(&mut self, view: ComputeViewHandle) {
        if self.compute_views.remove(&view.0).is_some() {
            log::trace!("DummyDevice: releasing view {}", view.0);
        }
    }

    fn destroy_compute_buffer(&mut self, buffer: ComputeBufferHandle) {
        if self.compute_buffers.remove(&buffer.0).is_some() {
            log::trace!("DummyDevice: destroying compute buffer {}", buffer.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_lifecycle() {
        let mut device = DummyDevice::new();
        let buffer = device
            .create_buffer(&BufferDescriptor::new(64, BufferUsage::STORAGE))
            .unwrap();
        assert_eq!(device.buffer_size(buffer), Some(64));
        assert!(device.buffer_data(buffer).unwrap().iter().all(|&b| b == 0));
        device.destroy_buffer(buffer);
        assert_eq!(device.live_buffers(), 0);
    }

    #[test]
    fn test_wrap_requires_storage_usage() {
        let mut device = DummyDevice::new();
        let buffer = device
            .create_buffer(&BufferDescriptor::new(64, BufferUsage::VERTEX))
            .unwrap();
        let err = device
            .wrap_render_buffer(buffer, BufferRole::Position)
            .unwrap_err();
        assert!(matches!(err, BackendError::InteropUnsupported(_)));
    }

    #[test]
    fn test_injected_wrap_failure_is_one_shot() {
        let mut device = DummyDevice::new();
        let buffer = device
            .create_buffer(&BufferDescriptor::new(64, BufferUsage::STORAGE))
            .unwrap();
        device.fail_next_wrap(BufferRole::Position);
        assert!(device.wrap_render_buffer(buffer, BufferRole::Position).is_err());
        assert!(device.wrap_render_buffer(buffer, BufferRole::Position).is_ok());
    }

    #[test]
    fn test_view_aliases_buffer() {
        let mut device = DummyDevice::new();
        let buffer = device
            .create_buffer(&BufferDescriptor::new(64, BufferUsage::STORAGE))
            .unwrap();
        let view = device.wrap_render_buffer(buffer, BufferRole::Position).unwrap();
        assert_eq!(device.view_target(view), Some(buffer));
        device.release_view(view);
        assert_eq!(device.live_buffers(), 1);
    }
}
