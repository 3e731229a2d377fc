//! Base mesh: host geometry mirrored into render-device buffers, with
//! compute-domain views over the same memory.

use bytemuck::cast_slice;
use glam::Mat4;

use crate::backend::traits::{
    BufferHandle, ComputeDevice, ComputeViewHandle, RenderDevice, ShaderHandle, VertexArrayHandle,
};
use crate::backend::types::{
    BufferDescriptor, BufferRole, BufferUsage, BufferUsageHint, ComputeMemory, MeshTransforms,
    SolverBinding, Vertex,
};
use crate::error::{MeshError, MeshResult};
use crate::mesh::geometry::{validate_topology, Edge, Triangle};

/// Host arrays, dropped as one unit by `clear_host_data`.
#[derive(Debug)]
pub(crate) struct HostGeometry {
    pub(crate) vertices: Vec<Vertex>,
    pub(crate) edges: Vec<Edge>,
    pub(crate) triangles: Vec<Triangle>,
}

/// Render-device resources created by `upload_host_data`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RenderBuffers {
    pub(crate) vertex_array: VertexArrayHandle,
    pub(crate) vertex_buffer: BufferHandle,
    pub(crate) edge_buffer: BufferHandle,
    pub(crate) triangle_buffer: BufferHandle,
}

/// Compute-domain views over the render buffers. Non-owning; released
/// before the buffers they alias are destroyed.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ComputeViews {
    pub(crate) vertex: ComputeViewHandle,
    pub(crate) edge: ComputeViewHandle,
    pub(crate) triangle: ComputeViewHandle,
}

/// Host representation of a triangle mesh and its two device mirrors.
///
/// Lifecycle: construct from host arrays, [`upload_host_data`] to the
/// render device, [`generate_compute_buffers`] to expose the same memory
/// to the compute domain, optionally [`clear_host_data`] once the device
/// copies are authoritative, [`render`] each frame, [`destroy`] on
/// teardown. Element counts are cached at construction and stay valid
/// after the host arrays are cleared.
///
/// The solver and the renderer address the same device memory through the
/// compute views; the caller must order solver dispatch and drawing so
/// only one domain touches a buffer at a time.
///
/// [`upload_host_data`]: Mesh::upload_host_data
/// [`generate_compute_buffers`]: Mesh::generate_compute_buffers
/// [`clear_host_data`]: Mesh::clear_host_data
/// [`render`]: Mesh::render
/// [`destroy`]: Mesh::destroy
#[derive(Debug)]
pub struct Mesh {
    pub(crate) host: Option<HostGeometry>,
    usage_hint: BufferUsageHint,
    num_vertices: usize,
    num_edges: usize,
    num_triangles: usize,
    pub(crate) render: Option<RenderBuffers>,
    pub(crate) views: Option<ComputeViews>,
}

impl Mesh {
    /// Takes ownership of the host arrays. Fails with
    /// [`MeshError::InvalidTopology`] if any edge or triangle references a
    /// vertex outside the vertex array. No device is touched.
    pub fn new(
        vertices: Vec<Vertex>,
        edges: Vec<Edge>,
        triangles: Vec<Triangle>,
        usage_hint: BufferUsageHint,
    ) -> MeshResult<Self> {
        validate_topology(vertices.len(), &edges, &triangles)?;
        Ok(Self {
            num_vertices: vertices.len(),
            num_edges: edges.len(),
            num_triangles: triangles.len(),
            host: Some(HostGeometry {
                vertices,
                edges,
                triangles,
            }),
            usage_hint,
            render: None,
            views: None,
        })
    }

    pub fn num_vertices(&self) -> usize {
        self.num_vertices
    }

    pub fn num_edges(&self) -> usize {
        self.num_edges
    }

    pub fn num_triangles(&self) -> usize {
        self.num_triangles
    }

    pub(crate) fn usage_hint(&self) -> BufferUsageHint {
        self.usage_hint
    }

    /// Host vertex array, if not yet cleared.
    pub fn vertices(&self) -> MeshResult<&[Vertex]> {
        self.host
            .as_ref()
            .map(|h| h.vertices.as_slice())
            .ok_or(MeshError::HostDataUnavailable)
    }

    /// Host edge array, if not yet cleared.
    pub fn edges(&self) -> MeshResult<&[Edge]> {
        self.host
            .as_ref()
            .map(|h| h.edges.as_slice())
            .ok_or(MeshError::HostDataUnavailable)
    }

    /// Host triangle array, if not yet cleared.
    pub fn triangles(&self) -> MeshResult<&[Triangle]> {
        self.host
            .as_ref()
            .map(|h| h.triangles.as_slice())
            .ok_or(MeshError::HostDataUnavailable)
    }

    /// Transfers the host arrays into render-device buffers and records
    /// the vertex attribute layout.
    ///
    /// The first call creates the vertex array and buffers; later calls
    /// rewrite the buffers in place, so handle values stay stable and any
    /// existing compute views keep aliasing the same memory. Fails with
    /// [`MeshError::HostDataUnavailable`] after `clear_host_data`.
    pub fn upload_host_data<D: RenderDevice>(&mut self, device: &mut D) -> MeshResult<()> {
        let host = self.host.as_ref().ok_or(MeshError::HostDataUnavailable)?;

        if let Some(buffers) = &self.render {
            device.write_buffer(buffers.vertex_buffer, 0, cast_slice(&host.vertices));
            device.write_buffer(buffers.edge_buffer, 0, cast_slice(&host.edges));
            device.write_buffer(buffers.triangle_buffer, 0, cast_slice(&host.triangles));
            log::debug!("re-uploaded mesh data ({} vertices)", self.num_vertices);
            return Ok(());
        }

        let vertex_bytes: &[u8] = cast_slice(&host.vertices);
        let edge_bytes: &[u8] = cast_slice(&host.edges);
        let triangle_bytes: &[u8] = cast_slice(&host.triangles);

        let interop = BufferUsage::STORAGE | BufferUsage::COPY_DST;

        let vertex_buffer = device.create_buffer_init(
            &BufferDescriptor::new(vertex_bytes.len() as u64, BufferUsage::VERTEX | interop)
                .with_label("mesh-vertices")
                .with_hint(self.usage_hint),
            vertex_bytes,
        )?;
        let edge_buffer = match device.create_buffer_init(
            &BufferDescriptor::new(edge_bytes.len() as u64, BufferUsage::VERTEX | interop)
                .with_label("mesh-edges")
                .with_hint(self.usage_hint),
            edge_bytes,
        ) {
            Ok(buffer) => buffer,
            Err(err) => {
                device.destroy_buffer(vertex_buffer);
                return Err(err.into());
            }
        };
        let triangle_buffer = match device.create_buffer_init(
            &BufferDescriptor::new(triangle_bytes.len() as u64, BufferUsage::INDEX | interop)
                .with_label("mesh-triangles")
                .with_hint(self.usage_hint),
            triangle_bytes,
        ) {
            Ok(buffer) => buffer,
            Err(err) => {
                device.destroy_buffer(vertex_buffer);
                device.destroy_buffer(edge_buffer);
                return Err(err.into());
            }
        };
        let vertex_array = match device.create_vertex_array() {
            Ok(vertex_array) => vertex_array,
            Err(err) => {
                device.destroy_buffer(vertex_buffer);
                device.destroy_buffer(edge_buffer);
                device.destroy_buffer(triangle_buffer);
                return Err(err.into());
            }
        };
        if let Err(err) =
            device.configure_vertex_attributes(vertex_array, vertex_buffer, &Vertex::layout())
        {
            device.destroy_vertex_array(vertex_array);
            device.destroy_buffer(vertex_buffer);
            device.destroy_buffer(edge_buffer);
            device.destroy_buffer(triangle_buffer);
            return Err(err.into());
        }

        self.render = Some(RenderBuffers {
            vertex_array,
            vertex_buffer,
            edge_buffer,
            triangle_buffer,
        });
        log::debug!(
            "uploaded mesh data ({} vertices, {} edges, {} triangles)",
            self.num_vertices,
            self.num_edges,
            self.num_triangles
        );
        Ok(())
    }

    /// Wraps the render buffers as compute-domain views over the same
    /// memory.
    ///
    /// All-or-nothing: if any wrap fails, views created earlier in the
    /// call are released and the mesh stays in the no-compute-views state.
    /// Fails with [`MeshError::UninitializedBuffer`] before
    /// `upload_host_data`; a second call after success is a no-op.
    pub fn generate_compute_buffers<D: ComputeDevice>(&mut self, compute: &mut D) -> MeshResult<()> {
        if self.views.is_some() {
            return Ok(());
        }
        let buffers = self.render.as_ref().ok_or(MeshError::UninitializedBuffer(
            "render buffers missing; call upload_host_data first",
        ))?;

        let targets = [
            (buffers.vertex_buffer, BufferRole::Position),
            (buffers.edge_buffer, BufferRole::Edge),
            (buffers.triangle_buffer, BufferRole::Triangle),
        ];
        let mut views = Vec::with_capacity(targets.len());
        for (buffer, role) in targets {
            match compute.wrap_render_buffer(buffer, role) {
                Ok(view) => views.push(view),
                Err(source) => {
                    for view in views {
                        compute.release_view(view);
                    }
                    return Err(MeshError::DeviceInterop { role, source });
                }
            }
        }

        self.views = Some(ComputeViews {
            vertex: views[0],
            edge: views[1],
            triangle: views[2],
        });
        log::debug!("generated compute views for mesh buffers");
        Ok(())
    }

    /// Releases the host arrays. Element counts remain valid; device
    /// buffers are untouched. Idempotent.
    pub fn clear_host_data(&mut self) {
        if self.host.take().is_some() {
            log::debug!("cleared mesh host data");
        }
    }

    /// Compute-domain handles for the external solver, keyed by role.
    /// Empty until `generate_compute_buffers` has run; that is a valid
    /// state the solver must check, not an error.
    pub fn compute_bindings(&self) -> Vec<SolverBinding> {
        match &self.views {
            Some(views) => vec![
                SolverBinding {
                    role: BufferRole::Position,
                    memory: ComputeMemory::View(views.vertex),
                },
                SolverBinding {
                    role: BufferRole::Edge,
                    memory: ComputeMemory::View(views.edge),
                },
                SolverBinding {
                    role: BufferRole::Triangle,
                    memory: ComputeMemory::View(views.triangle),
                },
            ],
            None => Vec::new(),
        }
    }

    /// Issues one indexed draw over the triangle buffer with the given
    /// transforms. Fails with [`MeshError::UninitializedBuffer`] before
    /// `upload_host_data`.
    pub fn render<D: RenderDevice>(
        &self,
        device: &mut D,
        shader: ShaderHandle,
        view_proj: Mat4,
        model: Mat4,
    ) -> MeshResult<()> {
        let buffers = self.render.as_ref().ok_or(MeshError::UninitializedBuffer(
            "render buffers missing; call upload_host_data first",
        ))?;
        let transforms = MeshTransforms { view_proj, model };
        device.draw_indexed(
            buffers.vertex_array,
            shader,
            buffers.triangle_buffer,
            (self.num_triangles * 3) as u32,
            &transforms,
        )?;
        Ok(())
    }

    /// Negates every vertex normal and swaps the winding of every triangle
    /// so the rendered front face follows the new normal direction.
    ///
    /// Pure host operation: device buffers are untouched, and the change
    /// reaches the renderer only through a subsequent `upload_host_data`.
    /// Applying it twice restores the original data.
    pub fn flip_normals(&mut self) -> MeshResult<()> {
        let host = self.host.as_mut().ok_or(MeshError::HostDataUnavailable)?;
        for vertex in &mut host.vertices {
            vertex.normal = -vertex.normal;
        }
        for triangle in &mut host.triangles {
            triangle.vertices.swap(1, 2);
        }
        Ok(())
    }

    /// Releases compute views first (they alias render memory), then
    /// destroys the owned render buffers and vertex array. Idempotent.
    pub fn destroy<D: RenderDevice + ComputeDevice>(&mut self, device: &mut D) {
        self.release_compute_views(device);
        if let Some(buffers) = self.render.take() {
            device.destroy_buffer(buffers.vertex_buffer);
            device.destroy_buffer(buffers.edge_buffer);
            device.destroy_buffer(buffers.triangle_buffer);
            device.destroy_vertex_array(buffers.vertex_array);
            log::debug!("destroyed mesh device resources");
        }
    }

    pub(crate) fn has_compute_views(&self) -> bool {
        self.views.is_some()
    }

    pub(crate) fn release_compute_views<D: ComputeDevice>(&mut self, compute: &mut D) {
        if let Some(views) = self.views.take() {
            compute.release_view(views.vertex);
            compute.release_view(views.edge);
            compute.release_view(views.triangle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::DummyDevice;
    use glam::{Vec2, Vec3};

    fn quad() -> (Vec<Vertex>, Vec<Edge>, Vec<Triangle>) {
        let positions = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ];
        let vertices = positions
            .iter()
            .map(|&position| Vertex {
                position,
                normal: Vec3::Z,
                uv: Vec2::new(position.x, position.y),
            })
            .collect();
        let edges = vec![
            Edge::new(0, 1),
            Edge::new(1, 2),
            Edge::new(2, 3),
            Edge::new(3, 0),
            Edge::new(0, 2),
        ];
        let triangles = vec![Triangle::new(0, 1, 2), Triangle::new(0, 2, 3)];
        (vertices, edges, triangles)
    }

    fn quad_mesh() -> Mesh {
        let (vertices, edges, triangles) = quad();
        Mesh::new(vertices, edges, triangles, BufferUsageHint::Static).unwrap()
    }

    #[test]
    fn test_construction_caches_counts() {
        let mesh = quad_mesh();
        assert_eq!(mesh.num_vertices(), 4);
        assert_eq!(mesh.num_edges(), 5);
        assert_eq!(mesh.num_triangles(), 2);
    }

    #[test]
    fn test_construction_rejects_dangling_index() {
        let (vertices, mut edges, triangles) = quad();
        edges.push(Edge::new(2, 4));
        let err = Mesh::new(vertices, edges, triangles, BufferUsageHint::Static).unwrap_err();
        assert!(matches!(err, MeshError::InvalidTopology(_)));
    }

    #[test]
    fn test_counts_survive_clear_but_host_reads_fail() {
        let mut device = DummyDevice::new();
        let mut mesh = quad_mesh();
        mesh.upload_host_data(&mut device).unwrap();
        mesh.clear_host_data();
        mesh.clear_host_data(); // idempotent

        assert_eq!(mesh.num_vertices(), 4);
        assert_eq!(mesh.num_edges(), 5);
        assert_eq!(mesh.num_triangles(), 2);
        assert!(matches!(mesh.vertices(), Err(MeshError::HostDataUnavailable)));
        assert!(matches!(mesh.edges(), Err(MeshError::HostDataUnavailable)));
        assert!(matches!(mesh.triangles(), Err(MeshError::HostDataUnavailable)));
    }

    #[test]
    fn test_upload_after_clear_fails() {
        let mut device = DummyDevice::new();
        let mut mesh = quad_mesh();
        mesh.clear_host_data();
        let err = mesh.upload_host_data(&mut device).unwrap_err();
        assert!(matches!(err, MeshError::HostDataUnavailable));
    }

    #[test]
    fn test_flip_normals_is_involution() {
        let mut mesh = quad_mesh();
        let normals_before: Vec<Vec3> =
            mesh.vertices().unwrap().iter().map(|v| v.normal).collect();
        let triangles_before = mesh.triangles().unwrap().to_vec();

        mesh.flip_normals().unwrap();
        for (vertex, original) in mesh.vertices().unwrap().iter().zip(&normals_before) {
            assert_eq!(vertex.normal, -*original);
        }
        assert_ne!(mesh.triangles().unwrap(), triangles_before.as_slice());

        mesh.flip_normals().unwrap();
        for (vertex, original) in mesh.vertices().unwrap().iter().zip(&normals_before) {
            assert_eq!(vertex.normal, *original);
        }
        assert_eq!(mesh.triangles().unwrap(), triangles_before.as_slice());
    }

    #[test]
    fn test_flip_normals_after_clear_fails() {
        let mut mesh = quad_mesh();
        mesh.clear_host_data();
        assert!(matches!(
            mesh.flip_normals(),
            Err(MeshError::HostDataUnavailable)
        ));
    }

    #[test]
    fn test_generate_before_upload_fails() {
        let mut device = DummyDevice::new();
        let mut mesh = quad_mesh();
        let err = mesh.generate_compute_buffers(&mut device).unwrap_err();
        assert!(matches!(err, MeshError::UninitializedBuffer(_)));
        assert_eq!(device.live_views(), 0);
    }

    #[test]
    fn test_bindings_empty_before_generate_then_three() {
        let mut device = DummyDevice::new();
        let mut mesh = quad_mesh();
        assert!(mesh.compute_bindings().is_empty());

        mesh.upload_host_data(&mut device).unwrap();
        assert!(mesh.compute_bindings().is_empty());

        mesh.generate_compute_buffers(&mut device).unwrap();
        let bindings = mesh.compute_bindings();
        assert_eq!(bindings.len(), 3);
        assert_eq!(bindings[0].role, BufferRole::Position);
        assert!(bindings
            .iter()
            .all(|b| matches!(b.memory, ComputeMemory::View(_))));
    }

    #[test]
    fn test_views_alias_render_buffers() {
        let mut device = DummyDevice::new();
        let mut mesh = quad_mesh();
        mesh.upload_host_data(&mut device).unwrap();
        mesh.generate_compute_buffers(&mut device).unwrap();

        let views = mesh.views.unwrap();
        let buffers = mesh.render.unwrap();
        assert_eq!(device.view_target(views.vertex), Some(buffers.vertex_buffer));
        assert_eq!(device.view_target(views.edge), Some(buffers.edge_buffer));
        assert_eq!(
            device.view_target(views.triangle),
            Some(buffers.triangle_buffer)
        );
    }

    #[test]
    fn test_interop_failure_rolls_back() {
        let mut device = DummyDevice::new();
        let mut mesh = quad_mesh();
        mesh.upload_host_data(&mut device).unwrap();

        device.fail_next_wrap(BufferRole::Triangle);
        let err = mesh.generate_compute_buffers(&mut device).unwrap_err();
        assert!(matches!(
            err,
            MeshError::DeviceInterop {
                role: BufferRole::Triangle,
                ..
            }
        ));
        assert!(mesh.compute_bindings().is_empty());
        assert_eq!(device.live_views(), 0);

        // the failure was transient; a retry succeeds
        mesh.generate_compute_buffers(&mut device).unwrap();
        assert_eq!(mesh.compute_bindings().len(), 3);
    }

    #[test]
    fn test_reupload_keeps_handles_stable() {
        let mut device = DummyDevice::new();
        let mut mesh = quad_mesh();
        mesh.upload_host_data(&mut device).unwrap();
        let before = mesh.render.unwrap();

        mesh.flip_normals().unwrap();
        mesh.upload_host_data(&mut device).unwrap();
        let after = mesh.render.unwrap();

        assert_eq!(before.vertex_array, after.vertex_array);
        assert_eq!(before.vertex_buffer, after.vertex_buffer);
        assert_eq!(before.edge_buffer, after.edge_buffer);
        assert_eq!(before.triangle_buffer, after.triangle_buffer);
        assert_eq!(device.live_buffers(), 3);
    }

    #[test]
    fn test_render_before_upload_fails() {
        let mut device = DummyDevice::new();
        let mesh = quad_mesh();
        let shader = device
            .create_shader(&crate::backend::types::ShaderDescriptor::new(""))
            .unwrap();
        let err = mesh
            .render(&mut device, shader, Mat4::IDENTITY, Mat4::IDENTITY)
            .unwrap_err();
        assert!(matches!(err, MeshError::UninitializedBuffer(_)));
    }

    #[test]
    fn test_render_draws_all_triangle_indices() {
        let mut device = DummyDevice::new();
        let mut mesh = quad_mesh();
        mesh.upload_host_data(&mut device).unwrap();
        let shader = device
            .create_shader(&crate::backend::types::ShaderDescriptor::new(""))
            .unwrap();
        mesh.render(&mut device, shader, Mat4::IDENTITY, Mat4::IDENTITY)
            .unwrap();
        assert_eq!(device.draws().len(), 1);
        assert_eq!(device.draws()[0].index_count, 6);
    }

    #[test]
    fn test_destroy_releases_everything_once() {
        let mut device = DummyDevice::new();
        let mut mesh = quad_mesh();
        mesh.upload_host_data(&mut device).unwrap();
        mesh.generate_compute_buffers(&mut device).unwrap();

        mesh.destroy(&mut device);
        assert_eq!(device.live_views(), 0);
        assert_eq!(device.live_buffers(), 0);
        assert_eq!(device.live_vertex_arrays(), 0);

        // idempotent
        mesh.destroy(&mut device);
        assert_eq!(device.live_buffers(), 0);
    }
}
