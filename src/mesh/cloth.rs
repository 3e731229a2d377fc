//! Cloth mesh: base geometry plus per-element simulation state.
//!
//! Extends [`Mesh`] by composition with parallel attribute arrays and the
//! extra device buffers the position-based-dynamics solver works in:
//! render-interoperable write targets (velocity, predicted position,
//! position correction) and solver-private compute buffers with no render
//! counterpart (per-edge and per-triangle rest state, a distance scratch
//! buffer, a spatial-binning buffer).

use bytemuck::{cast_slice, Pod, Zeroable};
use glam::Mat4;

use crate::backend::traits::{
    BufferHandle, ComputeBufferHandle, ComputeDevice, ComputeViewHandle, RenderDevice,
    ShaderHandle,
};
use crate::backend::types::{
    BufferDescriptor, BufferRole, BufferUsage, BufferUsageHint, ComputeMemory, SolverBinding,
    Vertex,
};
use crate::error::{MeshError, MeshResult};
use crate::mesh::data::Mesh;
use crate::mesh::geometry::{self, Edge, Triangle};

/// Per-vertex simulation attributes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ClothVertexData {
    pub mass: f32,
    /// Zero pins the vertex: the solver never moves it.
    pub inv_mass: f32,
}

impl ClothVertexData {
    /// Movable vertex with the given mass.
    pub fn new(mass: f32) -> Self {
        debug_assert!(mass > 0.0);
        Self {
            mass,
            inv_mass: 1.0 / mass,
        }
    }

    /// Pinned vertex: infinite effective mass.
    pub fn pinned(mass: f32) -> Self {
        Self { mass, inv_mass: 0.0 }
    }
}

/// Per-edge rest state for distance constraints.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ClothEdgeData {
    pub rest_length: f32,
    pub stiffness: f32,
}

impl ClothEdgeData {
    pub fn new(rest_length: f32, stiffness: f32) -> Self {
        Self {
            rest_length,
            stiffness,
        }
    }
}

/// Per-triangle rest state.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ClothTriangleData {
    pub rest_area: f32,
    pub mass: f32,
}

impl ClothTriangleData {
    pub fn new(rest_area: f32, mass: f32) -> Self {
        Self { rest_area, mass }
    }
}

/// Cloth attribute arrays, parallel to the base geometry arrays.
#[derive(Debug)]
struct ClothHostData {
    vertex_data: Vec<ClothVertexData>,
    edge_data: Vec<ClothEdgeData>,
    triangle_data: Vec<ClothTriangleData>,
}

/// Render buffers beyond the base set: the cloth vertex attributes plus
/// the three solver-write targets, all storage-capable for interop.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ClothRenderBuffers {
    pub(crate) cloth_vertex_buffer: BufferHandle,
    pub(crate) velocity_buffer: BufferHandle,
    pub(crate) predicted_position_buffer: BufferHandle,
    pub(crate) position_correction_buffer: BufferHandle,
}

/// Compute-domain resources: views over the cloth render buffers plus the
/// solver-private buffers the compute domain owns outright.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ClothComputeBuffers {
    pub(crate) cloth_vertex_view: ComputeViewHandle,
    pub(crate) velocity_view: ComputeViewHandle,
    pub(crate) predicted_position_view: ComputeViewHandle,
    pub(crate) position_correction_view: ComputeViewHandle,
    pub(crate) edge_data_buffer: ComputeBufferHandle,
    pub(crate) triangle_data_buffer: ComputeBufferHandle,
    pub(crate) edge_distance_buffer: ComputeBufferHandle,
    pub(crate) spatial_bin_buffer: ComputeBufferHandle,
}

/// Host representation of a cloth mesh and its device mirrors.
///
/// Same lifecycle as [`Mesh`], with each step extended: upload also
/// creates the cloth attribute buffer and zero-initialized solver-write
/// buffers, compute generation also wraps those and allocates the
/// solver-private set, and [`compute_bindings`](ClothMesh::compute_bindings)
/// exposes the full eleven-buffer roster the solver binds across its
/// kernel stages.
#[derive(Debug)]
pub struct ClothMesh {
    mesh: Mesh,
    cloth_host: Option<ClothHostData>,
    cloth_render: Option<ClothRenderBuffers>,
    cloth_views: Option<ClothComputeBuffers>,
}

impl ClothMesh {
    /// Construct from raw geometry and parallel cloth attribute arrays.
    ///
    /// Fails with [`MeshError::InvalidTopology`] on a dangling index or on
    /// any attribute array whose length differs from its geometry array.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        vertices: Vec<Vertex>,
        cloth_vertex_data: Vec<ClothVertexData>,
        edges: Vec<Edge>,
        cloth_edge_data: Vec<ClothEdgeData>,
        triangles: Vec<Triangle>,
        cloth_triangle_data: Vec<ClothTriangleData>,
        usage_hint: BufferUsageHint,
    ) -> MeshResult<Self> {
        let mesh = Mesh::new(vertices, edges, triangles, usage_hint)?;
        Self::from_mesh(mesh, cloth_vertex_data, cloth_edge_data, cloth_triangle_data)
    }

    /// Adopt an existing [`Mesh`] by move, attaching cloth attributes.
    ///
    /// Lengths are validated against the mesh's cached counts, so adoption
    /// works even after the base host data was cleared (a later upload
    /// then fails with [`MeshError::HostDataUnavailable`] as usual).
    pub fn from_mesh(
        mesh: Mesh,
        cloth_vertex_data: Vec<ClothVertexData>,
        cloth_edge_data: Vec<ClothEdgeData>,
        cloth_triangle_data: Vec<ClothTriangleData>,
    ) -> MeshResult<Self> {
        check_parallel("vertex", cloth_vertex_data.len(), mesh.num_vertices())?;
        check_parallel("edge", cloth_edge_data.len(), mesh.num_edges())?;
        check_parallel("triangle", cloth_triangle_data.len(), mesh.num_triangles())?;
        Ok(Self {
            mesh,
            cloth_host: Some(ClothHostData {
                vertex_data: cloth_vertex_data,
                edge_data: cloth_edge_data,
                triangle_data: cloth_triangle_data,
            }),
            cloth_render: None,
            cloth_views: None,
        })
    }

    /// Cloth patch of `cols` x `rows` cells with derived rest state: edges
    /// take their rest length from the generated geometry, triangles their
    /// rest area, and mass is distributed uniformly per vertex.
    pub fn grid(
        cols: u32,
        rows: u32,
        width: f32,
        height: f32,
        vertex_mass: f32,
        stiffness: f32,
    ) -> MeshResult<Self> {
        let (vertices, edges, triangles) = geometry::grid(cols, rows, width, height);

        let cloth_vertex_data = vec![ClothVertexData::new(vertex_mass); vertices.len()];
        let cloth_edge_data = edges
            .iter()
            .map(|edge| {
                let [a, b] = edge.vertices;
                let rest_length = vertices[a as usize]
                    .position
                    .distance(vertices[b as usize].position);
                ClothEdgeData::new(rest_length, stiffness)
            })
            .collect();
        let total_mass = vertex_mass * vertices.len() as f32;
        let total_area = width * height;
        let cloth_triangle_data = triangles
            .iter()
            .map(|triangle| {
                let [a, b, c] = triangle.vertices;
                let ab = vertices[b as usize].position - vertices[a as usize].position;
                let ac = vertices[c as usize].position - vertices[a as usize].position;
                let rest_area = 0.5 * ab.cross(ac).length();
                ClothTriangleData::new(rest_area, total_mass * rest_area / total_area)
            })
            .collect();

        Self::new(
            vertices,
            cloth_vertex_data,
            edges,
            cloth_edge_data,
            triangles,
            cloth_triangle_data,
            BufferUsageHint::Dynamic,
        )
    }

    pub fn num_vertices(&self) -> usize {
        self.mesh.num_vertices()
    }

    pub fn num_edges(&self) -> usize {
        self.mesh.num_edges()
    }

    pub fn num_triangles(&self) -> usize {
        self.mesh.num_triangles()
    }

    pub fn base(&self) -> &Mesh {
        &self.mesh
    }

    /// Mutable base access, e.g. for `flip_normals` before a re-upload.
    pub fn base_mut(&mut self) -> &mut Mesh {
        &mut self.mesh
    }

    /// Host cloth vertex attributes, if not yet cleared.
    pub fn cloth_vertex_data(&self) -> MeshResult<&[ClothVertexData]> {
        self.cloth_host
            .as_ref()
            .map(|h| h.vertex_data.as_slice())
            .ok_or(MeshError::HostDataUnavailable)
    }

    /// Host cloth edge attributes, if not yet cleared.
    pub fn cloth_edge_data(&self) -> MeshResult<&[ClothEdgeData]> {
        self.cloth_host
            .as_ref()
            .map(|h| h.edge_data.as_slice())
            .ok_or(MeshError::HostDataUnavailable)
    }

    /// Host cloth triangle attributes, if not yet cleared.
    pub fn cloth_triangle_data(&self) -> MeshResult<&[ClothTriangleData]> {
        self.cloth_host
            .as_ref()
            .map(|h| h.triangle_data.as_slice())
            .ok_or(MeshError::HostDataUnavailable)
    }

    /// Base upload, then the cloth attribute buffer and the three
    /// zero-initialized solver-write buffers (velocity, predicted
    /// position, position correction). All four are storage-capable so
    /// the compute domain can wrap them and the renderer can visualize
    /// solver output. Re-upload rewrites in place, keeping handles stable.
    pub fn upload_host_data<D: RenderDevice>(&mut self, device: &mut D) -> MeshResult<()> {
        self.mesh.upload_host_data(device)?;

        let num_vertices = self.mesh.num_vertices() as u64;
        let hint = self.mesh.usage_hint();
        let cloth = self.cloth_host.as_ref().ok_or(MeshError::HostDataUnavailable)?;

        if let Some(buffers) = &self.cloth_render {
            device.write_buffer(buffers.cloth_vertex_buffer, 0, cast_slice(&cloth.vertex_data));
            log::debug!("re-uploaded cloth vertex attributes");
            return Ok(());
        }

        let attr_bytes: &[u8] = cast_slice(&cloth.vertex_data);
        let interop = BufferUsage::VERTEX | BufferUsage::STORAGE | BufferUsage::COPY_DST;

        let cloth_vertex_buffer = device.create_buffer_init(
            &BufferDescriptor::new(attr_bytes.len() as u64, interop)
                .with_label("cloth-vertex-data")
                .with_hint(hint),
            attr_bytes,
        )?;
        let velocity_buffer = match device.create_buffer(&solver_write_desc(
            num_vertices,
            BufferRole::Velocity,
            "cloth-velocities",
        )) {
            Ok(buffer) => buffer,
            Err(err) => {
                device.destroy_buffer(cloth_vertex_buffer);
                return Err(err.into());
            }
        };
        let predicted_position_buffer = match device.create_buffer(&solver_write_desc(
            num_vertices,
            BufferRole::PredictedPosition,
            "cloth-predicted-positions",
        )) {
            Ok(buffer) => buffer,
            Err(err) => {
                device.destroy_buffer(cloth_vertex_buffer);
                device.destroy_buffer(velocity_buffer);
                return Err(err.into());
            }
        };
        let position_correction_buffer = match device.create_buffer(&solver_write_desc(
            num_vertices,
            BufferRole::PositionCorrection,
            "cloth-position-corrections",
        )) {
            Ok(buffer) => buffer,
            Err(err) => {
                device.destroy_buffer(cloth_vertex_buffer);
                device.destroy_buffer(velocity_buffer);
                device.destroy_buffer(predicted_position_buffer);
                return Err(err.into());
            }
        };

        self.cloth_render = Some(ClothRenderBuffers {
            cloth_vertex_buffer,
            velocity_buffer,
            predicted_position_buffer,
            position_correction_buffer,
        });
        log::debug!(
            "uploaded cloth attributes and allocated solver-write buffers for {} vertices",
            num_vertices
        );
        Ok(())
    }

    /// Wraps the base and cloth render buffers as compute views (seven in
    /// total), then allocates the four solver-private buffers the compute
    /// domain owns.
    ///
    /// All-or-nothing across the whole set: any failure releases every
    /// view and private buffer created by this call and leaves the mesh in
    /// the no-compute-buffers state.
    pub fn generate_compute_buffers<D: ComputeDevice>(&mut self, compute: &mut D) -> MeshResult<()> {
        if self.cloth_views.is_some() {
            return Ok(());
        }
        let buffers = match &self.cloth_render {
            Some(buffers) => *buffers,
            None => {
                return Err(MeshError::UninitializedBuffer(
                    "cloth buffers missing; call upload_host_data first",
                ))
            }
        };

        let had_base_views = self.mesh.has_compute_views();
        self.mesh.generate_compute_buffers(compute)?;

        let targets = [
            (buffers.cloth_vertex_buffer, BufferRole::ClothVertexData),
            (buffers.velocity_buffer, BufferRole::Velocity),
            (buffers.predicted_position_buffer, BufferRole::PredictedPosition),
            (buffers.position_correction_buffer, BufferRole::PositionCorrection),
        ];
        let mut views = Vec::with_capacity(targets.len());
        for (buffer, role) in targets {
            match compute.wrap_render_buffer(buffer, role) {
                Ok(view) => views.push(view),
                Err(source) => {
                    for view in views {
                        compute.release_view(view);
                    }
                    if !had_base_views {
                        self.mesh.release_compute_views(compute);
                    }
                    return Err(MeshError::DeviceInterop { role, source });
                }
            }
        }

        let num_vertices = self.mesh.num_vertices() as u64;
        let private_targets = [
            (
                self.mesh.num_edges() as u64,
                BufferRole::ClothEdgeData,
                "cloth-edge-data",
            ),
            (
                self.mesh.num_triangles() as u64,
                BufferRole::ClothTriangleData,
                "cloth-triangle-data",
            ),
            (num_vertices, BufferRole::EdgeDistanceScratch, "cloth-edge-distances"),
            (num_vertices, BufferRole::SpatialBin, "cloth-spatial-bins"),
        ];
        let mut owned = Vec::with_capacity(private_targets.len());
        for (count, role, label) in private_targets {
            let desc = BufferDescriptor::new(
                count * role.bytes_per_element(),
                BufferUsage::STORAGE | BufferUsage::COPY_DST,
            )
            .with_label(label);
            match compute.create_compute_buffer(&desc) {
                Ok(buffer) => owned.push(buffer),
                Err(err) => {
                    for buffer in owned {
                        compute.destroy_compute_buffer(buffer);
                    }
                    for view in views {
                        compute.release_view(view);
                    }
                    if !had_base_views {
                        self.mesh.release_compute_views(compute);
                    }
                    return Err(err.into());
                }
            }
        }

        self.cloth_views = Some(ClothComputeBuffers {
            cloth_vertex_view: views[0],
            velocity_view: views[1],
            predicted_position_view: views[2],
            position_correction_view: views[3],
            edge_data_buffer: owned[0],
            triangle_data_buffer: owned[1],
            edge_distance_buffer: owned[2],
            spatial_bin_buffer: owned[3],
        });
        log::debug!("generated cloth compute views and solver-private buffers");
        Ok(())
    }

    /// Releases the base and cloth host arrays. Idempotent.
    pub fn clear_host_data(&mut self) {
        self.mesh.clear_host_data();
        if self.cloth_host.take().is_some() {
            log::debug!("cleared cloth host data");
        }
    }

    /// The complete buffer set the solver binds across its kernel stages:
    /// three base views, four cloth views, four compute-owned private
    /// buffers. Empty until `generate_compute_buffers` has run.
    pub fn compute_bindings(&self) -> Vec<SolverBinding> {
        let Some(views) = &self.cloth_views else {
            return Vec::new();
        };
        let mut bindings = self.mesh.compute_bindings();
        bindings.extend([
            SolverBinding {
                role: BufferRole::ClothVertexData,
                memory: ComputeMemory::View(views.cloth_vertex_view),
            },
            SolverBinding {
                role: BufferRole::Velocity,
                memory: ComputeMemory::View(views.velocity_view),
            },
            SolverBinding {
                role: BufferRole::PredictedPosition,
                memory: ComputeMemory::View(views.predicted_position_view),
            },
            SolverBinding {
                role: BufferRole::PositionCorrection,
                memory: ComputeMemory::View(views.position_correction_view),
            },
            SolverBinding {
                role: BufferRole::ClothEdgeData,
                memory: ComputeMemory::Owned(views.edge_data_buffer),
            },
            SolverBinding {
                role: BufferRole::ClothTriangleData,
                memory: ComputeMemory::Owned(views.triangle_data_buffer),
            },
            SolverBinding {
                role: BufferRole::EdgeDistanceScratch,
                memory: ComputeMemory::Owned(views.edge_distance_buffer),
            },
            SolverBinding {
                role: BufferRole::SpatialBin,
                memory: ComputeMemory::Owned(views.spatial_bin_buffer),
            },
        ]);
        bindings
    }

    /// Same contract as [`Mesh::render`]; a cloth-aware shader (e.g. one
    /// visualizing velocity or correction fields) is just another shader
    /// handle.
    pub fn render<D: RenderDevice>(
        &self,
        device: &mut D,
        shader: ShaderHandle,
        view_proj: Mat4,
        model: Mat4,
    ) -> MeshResult<()> {
        self.mesh.render(device, shader, view_proj, model)
    }

    /// Destroys compute-owned private buffers, releases views (base and
    /// cloth), destroys the cloth render buffers, then tears down the
    /// base. Idempotent.
    pub fn destroy<D: RenderDevice + ComputeDevice>(&mut self, device: &mut D) {
        if let Some(views) = self.cloth_views.take() {
            compute_teardown(device, &views);
        }
        if let Some(buffers) = self.cloth_render.take() {
            device.destroy_buffer(buffers.cloth_vertex_buffer);
            device.destroy_buffer(buffers.velocity_buffer);
            device.destroy_buffer(buffers.predicted_position_buffer);
            device.destroy_buffer(buffers.position_correction_buffer);
            log::debug!("destroyed cloth device resources");
        }
        self.mesh.destroy(device);
    }
}

fn check_parallel(kind: &str, data_len: usize, geometry_len: usize) -> MeshResult<()> {
    if data_len != geometry_len {
        return Err(MeshError::InvalidTopology(format!(
            "cloth {kind} data length ({data_len}) != {kind} count ({geometry_len})"
        )));
    }
    Ok(())
}

/// Zero-initialized solver write target, render-visible for visualization.
fn solver_write_desc(num_vertices: u64, role: BufferRole, label: &str) -> BufferDescriptor {
    BufferDescriptor::new(
        num_vertices * role.bytes_per_element(),
        BufferUsage::VERTEX | BufferUsage::STORAGE | BufferUsage::COPY_DST,
    )
    .with_label(label)
    .with_hint(BufferUsageHint::Dynamic)
}

fn compute_teardown<D: ComputeDevice>(compute: &mut D, views: &ClothComputeBuffers) {
    compute.release_view(views.cloth_vertex_view);
    compute.release_view(views.velocity_view);
    compute.release_view(views.predicted_position_view);
    compute.release_view(views.position_correction_view);
    compute.destroy_compute_buffer(views.edge_data_buffer);
    compute.destroy_compute_buffer(views.triangle_data_buffer);
    compute.destroy_compute_buffer(views.edge_distance_buffer);
    compute.destroy_compute_buffer(views.spatial_bin_buffer);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::DummyDevice;
    use crate::backend::types::ShaderDescriptor;
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

    fn quad_cloth() -> ClothMesh {
        let (vertices, edges, triangles) = quad();
        let vertex_data = vec![ClothVertexData::new(0.1); vertices.len()];
        let edge_data = vec![ClothEdgeData::new(1.0, 0.9); edges.len()];
        let triangle_data = vec![ClothTriangleData::new(0.5, 0.2); triangles.len()];
        ClothMesh::new(
            vertices,
            vertex_data,
            edges,
            edge_data,
            triangles,
            triangle_data,
            BufferUsageHint::Dynamic,
        )
        .unwrap()
    }

    #[test]
    fn test_parallel_array_mismatch_fails() {
        let (vertices, edges, triangles) = quad();
        let vertex_data = vec![ClothVertexData::new(0.1); vertices.len() - 1];
        let edge_data = vec![ClothEdgeData::new(1.0, 0.9); edges.len()];
        let triangle_data = vec![ClothTriangleData::new(0.5, 0.2); triangles.len()];
        let err = ClothMesh::new(
            vertices,
            vertex_data,
            edges,
            edge_data,
            triangles,
            triangle_data,
            BufferUsageHint::Static,
        )
        .unwrap_err();
        assert!(matches!(err, MeshError::InvalidTopology(_)));
    }

    #[test]
    fn test_attribute_sizes_match_role_strides() {
        assert_eq!(
            std::mem::size_of::<ClothVertexData>() as u64,
            BufferRole::ClothVertexData.bytes_per_element()
        );
        assert_eq!(
            std::mem::size_of::<ClothEdgeData>() as u64,
            BufferRole::ClothEdgeData.bytes_per_element()
        );
        assert_eq!(
            std::mem::size_of::<ClothTriangleData>() as u64,
            BufferRole::ClothTriangleData.bytes_per_element()
        );
    }

    #[test]
    fn test_quad_end_to_end_binding_roster() {
        let mut device = DummyDevice::new();
        let mut cloth = quad_cloth();
        cloth.upload_host_data(&mut device).unwrap();
        cloth.generate_compute_buffers(&mut device).unwrap();

        assert_eq!(cloth.num_triangles(), 2);
        let bindings = cloth.compute_bindings();
        assert_eq!(bindings.len(), 11);

        let views = bindings
            .iter()
            .filter(|b| matches!(b.memory, ComputeMemory::View(_)))
            .count();
        assert_eq!(views, 7);
        assert_eq!(bindings.len() - views, 4);

        // every role appears exactly once
        let roles: std::collections::HashSet<BufferRole> =
            bindings.iter().map(|b| b.role).collect();
        assert_eq!(roles.len(), 11);
        assert_eq!(bindings[0].role, BufferRole::Position);
    }

    #[test]
    fn test_bindings_empty_before_generate() {
        let mut device = DummyDevice::new();
        let mut cloth = quad_cloth();
        assert!(cloth.compute_bindings().is_empty());
        cloth.upload_host_data(&mut device).unwrap();
        assert!(cloth.compute_bindings().is_empty());
    }

    #[test]
    fn test_generate_before_upload_fails() {
        let mut device = DummyDevice::new();
        let mut cloth = quad_cloth();
        let err = cloth.generate_compute_buffers(&mut device).unwrap_err();
        assert!(matches!(err, MeshError::UninitializedBuffer(_)));
        assert_eq!(device.live_views(), 0);
        assert_eq!(device.live_compute_buffers(), 0);
    }

    #[test]
    fn test_solver_write_buffers_start_zeroed() {
        let mut device = DummyDevice::new();
        let mut cloth = quad_cloth();
        cloth.upload_host_data(&mut device).unwrap();

        let buffers = cloth.cloth_render.unwrap();
        for buffer in [
            buffers.velocity_buffer,
            buffers.predicted_position_buffer,
            buffers.position_correction_buffer,
        ] {
            assert_eq!(device.buffer_size(buffer), Some(4 * 16));
            assert!(device.buffer_data(buffer).unwrap().iter().all(|&b| b == 0));
        }
    }

    #[test]
    fn test_private_buffer_sizes_follow_element_counts() {
        let mut device = DummyDevice::new();
        let mut cloth = quad_cloth();
        cloth.upload_host_data(&mut device).unwrap();
        cloth.generate_compute_buffers(&mut device).unwrap();

        let views = cloth.cloth_views.unwrap();
        assert_eq!(device.compute_buffer_size(views.edge_data_buffer), Some(5 * 8));
        assert_eq!(device.compute_buffer_size(views.triangle_data_buffer), Some(2 * 8));
        assert_eq!(device.compute_buffer_size(views.edge_distance_buffer), Some(4 * 4));
        assert_eq!(device.compute_buffer_size(views.spatial_bin_buffer), Some(4 * 4));
    }

    #[test]
    fn test_interop_failure_rolls_back_entire_set() {
        let mut device = DummyDevice::new();
        let mut cloth = quad_cloth();
        cloth.upload_host_data(&mut device).unwrap();

        device.fail_next_wrap(BufferRole::PredictedPosition);
        let err = cloth.generate_compute_buffers(&mut device).unwrap_err();
        assert!(matches!(
            err,
            MeshError::DeviceInterop {
                role: BufferRole::PredictedPosition,
                ..
            }
        ));
        assert!(cloth.compute_bindings().is_empty());
        assert_eq!(device.live_views(), 0);
        assert_eq!(device.live_compute_buffers(), 0);

        cloth.generate_compute_buffers(&mut device).unwrap();
        assert_eq!(cloth.compute_bindings().len(), 11);
    }

    #[test]
    fn test_base_wrap_failure_reported_with_role() {
        let mut device = DummyDevice::new();
        let mut cloth = quad_cloth();
        cloth.upload_host_data(&mut device).unwrap();

        device.fail_next_wrap(BufferRole::Edge);
        let err = cloth.generate_compute_buffers(&mut device).unwrap_err();
        assert!(matches!(
            err,
            MeshError::DeviceInterop {
                role: BufferRole::Edge,
                ..
            }
        ));
        assert_eq!(device.live_views(), 0);
    }

    #[test]
    fn test_from_mesh_adopts_counts() {
        let (vertices, edges, triangles) = quad();
        let mesh = Mesh::new(vertices, edges, triangles, BufferUsageHint::Static).unwrap();
        let cloth = ClothMesh::from_mesh(
            mesh,
            vec![ClothVertexData::new(0.1); 4],
            vec![ClothEdgeData::new(1.0, 0.9); 5],
            vec![ClothTriangleData::new(0.5, 0.2); 2],
        )
        .unwrap();
        assert_eq!(cloth.num_vertices(), 4);
        assert_eq!(cloth.num_edges(), 5);
        assert_eq!(cloth.num_triangles(), 2);
    }

    #[test]
    fn test_from_mesh_rejects_length_mismatch() {
        let (vertices, edges, triangles) = quad();
        let mesh = Mesh::new(vertices, edges, triangles, BufferUsageHint::Static).unwrap();
        let err = ClothMesh::from_mesh(
            mesh,
            vec![ClothVertexData::new(0.1); 4],
            vec![ClothEdgeData::new(1.0, 0.9); 3],
            vec![ClothTriangleData::new(0.5, 0.2); 2],
        )
        .unwrap_err();
        assert!(matches!(err, MeshError::InvalidTopology(_)));
    }

    #[test]
    fn test_grid_derives_rest_state() {
        let cloth = ClothMesh::grid(2, 2, 1.0, 1.0, 0.05, 0.9).unwrap();
        assert_eq!(cloth.num_vertices(), 9);
        assert_eq!(cloth.num_triangles(), 8);

        let edge_data = cloth.cloth_edge_data().unwrap();
        // first structural edge spans one cell horizontally
        assert!((edge_data[0].rest_length - 0.5).abs() < 1e-6);
        assert!(edge_data.iter().all(|e| e.rest_length > 0.0));

        let triangle_data = cloth.cloth_triangle_data().unwrap();
        let total_area: f32 = triangle_data.iter().map(|t| t.rest_area).sum();
        assert!((total_area - 1.0).abs() < 1e-5);
        let total_mass: f32 = triangle_data.iter().map(|t| t.mass).sum();
        assert!((total_mass - 0.05 * 9.0).abs() < 1e-5);

        let vertex_data = cloth.cloth_vertex_data().unwrap();
        assert!((vertex_data[0].inv_mass - 1.0 / 0.05).abs() < 1e-4);
    }

    #[test]
    fn test_clear_drops_both_attribute_sets() {
        let mut device = DummyDevice::new();
        let mut cloth = quad_cloth();
        cloth.upload_host_data(&mut device).unwrap();
        cloth.clear_host_data();
        cloth.clear_host_data(); // idempotent

        assert_eq!(cloth.num_vertices(), 4);
        assert!(matches!(
            cloth.cloth_vertex_data(),
            Err(MeshError::HostDataUnavailable)
        ));
        assert!(matches!(
            cloth.base().vertices(),
            Err(MeshError::HostDataUnavailable)
        ));
        let err = cloth.upload_host_data(&mut device).unwrap_err();
        assert!(matches!(err, MeshError::HostDataUnavailable));
    }

    #[test]
    fn test_reupload_after_flip_keeps_handles() {
        let mut device = DummyDevice::new();
        let mut cloth = quad_cloth();
        cloth.upload_host_data(&mut device).unwrap();
        cloth.generate_compute_buffers(&mut device).unwrap();
        let before = cloth.cloth_render.unwrap();

        cloth.base_mut().flip_normals().unwrap();
        cloth.upload_host_data(&mut device).unwrap();
        let after = cloth.cloth_render.unwrap();

        assert_eq!(before.cloth_vertex_buffer, after.cloth_vertex_buffer);
        assert_eq!(before.velocity_buffer, after.velocity_buffer);
        assert_eq!(cloth.compute_bindings().len(), 11);
    }

    #[test]
    fn test_render_delegates_to_base() {
        let mut device = DummyDevice::new();
        let mut cloth = quad_cloth();
        cloth.upload_host_data(&mut device).unwrap();
        let shader = device.create_shader(&ShaderDescriptor::new("")).unwrap();
        cloth
            .render(&mut device, shader, Mat4::IDENTITY, Mat4::IDENTITY)
            .unwrap();
        assert_eq!(device.draws().len(), 1);
        assert_eq!(device.draws()[0].index_count, 6);
    }

    #[test]
    fn test_destroy_releases_all_device_resources() {
        let mut device = DummyDevice::new();
        let mut cloth = quad_cloth();
        cloth.upload_host_data(&mut device).unwrap();
        cloth.generate_compute_buffers(&mut device).unwrap();
        assert_eq!(device.live_buffers(), 7);
        assert_eq!(device.live_views(), 7);
        assert_eq!(device.live_compute_buffers(), 4);

        cloth.destroy(&mut device);
        assert_eq!(device.live_buffers(), 0);
        assert_eq!(device.live_views(), 0);
        assert_eq!(device.live_compute_buffers(), 0);
        assert_eq!(device.live_vertex_arrays(), 0);

        cloth.destroy(&mut device); // idempotent
        assert_eq!(device.live_buffers(), 0);
    }
}
