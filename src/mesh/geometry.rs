//! Host-side geometry types and generation

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

use crate::backend::types::Vertex;
use crate::error::{MeshError, MeshResult};

/// Undirected pair of vertex indices, used for structural and shear
/// constraints.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct Edge {
    pub vertices: [u32; 2],
}

impl Edge {
    pub fn new(a: u32, b: u32) -> Self {
        Self { vertices: [a, b] }
    }
}

/// Triple of vertex indices defining a face. Counter-clockwise winding
/// faces the viewer under back-face culling.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct Triangle {
    pub vertices: [u32; 3],
}

impl Triangle {
    pub fn new(a: u32, b: u32, c: u32) -> Self {
        Self { vertices: [a, b, c] }
    }
}

/// Check that every edge and triangle references a valid vertex index.
pub fn validate_topology(
    num_vertices: usize,
    edges: &[Edge],
    triangles: &[Triangle],
) -> MeshResult<()> {
    let limit = num_vertices as u32;
    for (i, edge) in edges.iter().enumerate() {
        if edge.vertices.iter().any(|&v| v >= limit) {
            return Err(MeshError::InvalidTopology(format!(
                "edge {i} references vertex outside 0..{limit}"
            )));
        }
    }
    for (i, triangle) in triangles.iter().enumerate() {
        if triangle.vertices.iter().any(|&v| v >= limit) {
            return Err(MeshError::InvalidTopology(format!(
                "triangle {i} references vertex outside 0..{limit}"
            )));
        }
    }
    Ok(())
}

/// Create a cloth patch of `cols` x `rows` cells in the XY plane, centered
/// at the origin, with +Z normals and UVs spanning the unit square.
///
/// Edges cover structural (horizontal and vertical) plus shear (both cell
/// diagonals) constraints; each cell emits two counter-clockwise triangles.
pub fn grid(cols: u32, rows: u32, width: f32, height: f32) -> (Vec<Vertex>, Vec<Edge>, Vec<Triangle>) {
    debug_assert!(cols > 0 && rows > 0, "grid needs at least one cell");

    let half_width = width / 2.0;
    let half_height = height / 2.0;
    let step_x = width / cols as f32;
    let step_y = height / rows as f32;

    // Generate vertices
    let mut vertices = Vec::with_capacity(((cols + 1) * (rows + 1)) as usize);
    for y in 0..=rows {
        for x in 0..=cols {
            vertices.push(Vertex {
                position: Vec3::new(
                    -half_width + x as f32 * step_x,
                    -half_height + y as f32 * step_y,
                    0.0,
                ),
                normal: Vec3::Z,
                uv: Vec2::new(x as f32 / cols as f32, y as f32 / rows as f32),
            });
        }
    }

    let index = |x: u32, y: u32| y * (cols + 1) + x;

    // Structural edges
    let mut edges = Vec::new();
    for y in 0..=rows {
        for x in 0..cols {
            edges.push(Edge::new(index(x, y), index(x + 1, y)));
        }
    }
    for y in 0..rows {
        for x in 0..=cols {
            edges.push(Edge::new(index(x, y), index(x, y + 1)));
        }
    }

    // Shear edges and triangles, per cell
    let mut triangles = Vec::with_capacity((2 * cols * rows) as usize);
    for y in 0..rows {
        for x in 0..cols {
            let current = index(x, y);
            let right = index(x + 1, y);
            let diagonal = index(x + 1, y + 1);
            let up = index(x, y + 1);

            edges.push(Edge::new(current, diagonal));
            edges.push(Edge::new(right, up));

            triangles.push(Triangle::new(current, right, diagonal));
            triangles.push(Triangle::new(current, diagonal, up));
        }
    }

    (vertices, edges, triangles)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_counts() {
        let (vertices, edges, triangles) = grid(3, 2, 1.5, 1.0);
        assert_eq!(vertices.len(), 4 * 3);
        assert_eq!(triangles.len(), 2 * 3 * 2);
        // structural + shear: cols(rows+1) + rows(cols+1) + 2*cols*rows
        assert_eq!(edges.len(), 3 * 3 + 2 * 4 + 2 * 3 * 2);
    }

    #[test]
    fn test_grid_passes_validation() {
        let (vertices, edges, triangles) = grid(4, 4, 2.0, 2.0);
        assert!(validate_topology(vertices.len(), &edges, &triangles).is_ok());
    }

    #[test]
    fn test_grid_triangles_face_forward() {
        let (vertices, _, triangles) = grid(2, 2, 1.0, 1.0);
        for triangle in &triangles {
            let [a, b, c] = triangle.vertices;
            let ab = vertices[b as usize].position - vertices[a as usize].position;
            let ac = vertices[c as usize].position - vertices[a as usize].position;
            assert!(ab.cross(ac).z > 0.0);
        }
    }

    #[test]
    fn test_grid_uv_corners() {
        let (vertices, _, _) = grid(2, 2, 1.0, 1.0);
        assert_eq!(vertices.first().unwrap().uv, Vec2::new(0.0, 0.0));
        assert_eq!(vertices.last().unwrap().uv, Vec2::new(1.0, 1.0));
    }

    #[test]
    fn test_validate_rejects_out_of_range_index() {
        let edges = vec![Edge::new(0, 4)];
        let err = validate_topology(4, &edges, &[]).unwrap_err();
        assert!(matches!(err, MeshError::InvalidTopology(_)));

        let triangles = vec![Triangle::new(0, 1, 9)];
        let err = validate_topology(4, &[], &triangles).unwrap_err();
        assert!(matches!(err, MeshError::InvalidTopology(_)));
    }

    #[test]
    fn test_index_types_are_tightly_packed() {
        assert_eq!(std::mem::size_of::<Edge>(), 8);
        assert_eq!(std::mem::size_of::<Triangle>(), 12);
    }
}
