//! Common types shared between device domains

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3};

use crate::backend::traits::{ComputeBufferHandle, ComputeViewHandle};

/// Buffer usage flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferUsage(u32);

impl BufferUsage {
    pub const MAP_READ: Self = Self(1 << 0);
    pub const COPY_SRC: Self = Self(1 << 1);
    pub const COPY_DST: Self = Self(1 << 2);
    pub const INDEX: Self = Self(1 << 3);
    pub const VERTEX: Self = Self(1 << 4);
    pub const UNIFORM: Self = Self(1 << 5);
    pub const STORAGE: Self = Self(1 << 6);

    pub fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    pub fn bits(&self) -> u32 {
        self.0
    }
}

impl std::ops::BitOr for BufferUsage {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// Access-pattern hint recorded at buffer creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BufferUsageHint {
    /// Uploaded once, read many times.
    #[default]
    Static,
    /// Rewritten frequently by the host or the solver.
    Dynamic,
}

/// Buffer descriptor
#[derive(Debug, Clone)]
pub struct BufferDescriptor {
    pub label: Option<String>,
    pub size: u64,
    pub usage: BufferUsage,
    pub hint: BufferUsageHint,
}

impl BufferDescriptor {
    pub fn new(size: u64, usage: BufferUsage) -> Self {
        Self {
            label: None,
            size,
            usage,
            hint: BufferUsageHint::Static,
        }
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    pub fn with_hint(mut self, hint: BufferUsageHint) -> Self {
        self.hint = hint;
        self
    }
}

/// Vertex attribute format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexFormat {
    Float32,
    Float32x2,
    Float32x3,
    Float32x4,
    Uint32,
}

impl VertexFormat {
    pub fn size(&self) -> u64 {
        match self {
            VertexFormat::Float32 | VertexFormat::Uint32 => 4,
            VertexFormat::Float32x2 => 8,
            VertexFormat::Float32x3 => 12,
            VertexFormat::Float32x4 => 16,
        }
    }
}

/// Vertex attribute description
#[derive(Debug, Clone)]
pub struct VertexAttribute {
    pub location: u32,
    pub format: VertexFormat,
    pub offset: u64,
}

/// Vertex buffer layout
#[derive(Debug, Clone)]
pub struct VertexBufferLayout {
    pub array_stride: u64,
    pub step_mode: VertexStepMode,
    pub attributes: Vec<VertexAttribute>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexStepMode {
    Vertex,
    Instance,
}

/// Interleaved vertex: position, normal, texture coordinate
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
}

impl Vertex {
    pub fn layout() -> VertexBufferLayout {
        VertexBufferLayout {
            array_stride: std::mem::size_of::<Self>() as u64,
            step_mode: VertexStepMode::Vertex,
            attributes: vec![
                VertexAttribute {
                    location: 0,
                    format: VertexFormat::Float32x3,
                    offset: 0,
                },
                VertexAttribute {
                    location: 1,
                    format: VertexFormat::Float32x3,
                    offset: 12,
                },
                VertexAttribute {
                    location: 2,
                    format: VertexFormat::Float32x2,
                    offset: 24,
                },
            ],
        }
    }
}

/// Per-draw uniform data
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct MeshTransforms {
    pub view_proj: Mat4,
    pub model: Mat4,
}

/// Shader descriptor holding WGSL source
#[derive(Debug, Clone)]
pub struct ShaderDescriptor {
    pub label: Option<String>,
    pub source: String,
}

impl ShaderDescriptor {
    pub fn new(source: &str) -> Self {
        Self {
            label: None,
            source: source.to_string(),
        }
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }
}

/// Role of a device buffer in the solver's kernel bindings.
///
/// Per-element widths are fixed by convention; the solver must assume the
/// stride reported by [`BufferRole::bytes_per_element`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferRole {
    /// Vertex geometry: position, normal, UV interleaved.
    Position,
    /// Vertex index pairs for distance constraints.
    Edge,
    /// Vertex index triples for faces.
    Triangle,
    /// Per-vertex simulation attributes (mass, inverse mass).
    ClothVertexData,
    /// Per-vertex velocity, written by the solver each step.
    Velocity,
    /// Per-vertex predicted position, written during constraint projection.
    PredictedPosition,
    /// Per-vertex accumulated position correction.
    PositionCorrection,
    /// Per-edge rest state (rest length, stiffness).
    ClothEdgeData,
    /// Per-triangle rest state (rest area, mass).
    ClothTriangleData,
    /// Per-vertex scratch for closest-point distance queries.
    EdgeDistanceScratch,
    /// Per-vertex spatial-bin index for neighbor queries.
    SpatialBin,
}

impl BufferRole {
    /// Fixed per-element width in bytes.
    pub fn bytes_per_element(&self) -> u64 {
        match self {
            Self::Position => std::mem::size_of::<Vertex>() as u64,
            Self::Edge | Self::ClothVertexData | Self::ClothEdgeData | Self::ClothTriangleData => 8,
            Self::Triangle => 12,
            Self::Velocity | Self::PredictedPosition | Self::PositionCorrection => 16,
            Self::EdgeDistanceScratch | Self::SpatialBin => 4,
        }
    }
}

/// Compute-domain memory handed to the solver: either a non-owning view
/// over a render buffer or a buffer owned by the compute domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComputeMemory {
    View(ComputeViewHandle),
    Owned(ComputeBufferHandle),
}

/// One entry of the buffer set a mesh exposes to the solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SolverBinding {
    pub role: BufferRole,
    pub memory: ComputeMemory,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_layout() {
        let layout = Vertex::layout();
        assert_eq!(layout.array_stride, 32);
        assert_eq!(layout.attributes.len(), 3);
        assert_eq!(layout.attributes[1].offset, 12);
        assert_eq!(layout.attributes[2].offset, 24);
        let covered: u64 = layout.attributes.iter().map(|a| a.format.size()).sum();
        assert_eq!(covered, layout.array_stride);
    }

    #[test]
    fn test_buffer_usage_flags() {
        let usage = BufferUsage::VERTEX | BufferUsage::STORAGE;
        assert!(usage.contains(BufferUsage::VERTEX));
        assert!(usage.contains(BufferUsage::STORAGE));
        assert!(!usage.contains(BufferUsage::INDEX));
    }

    #[test]
    fn test_buffer_descriptor_builder() {
        let desc = BufferDescriptor::new(1024, BufferUsage::STORAGE)
            .with_label("scratch")
            .with_hint(BufferUsageHint::Dynamic);
        assert_eq!(desc.size, 1024);
        assert_eq!(desc.label.as_deref(), Some("scratch"));
        assert_eq!(desc.hint, BufferUsageHint::Dynamic);
    }

    #[test]
    fn test_position_stride_matches_vertex() {
        assert_eq!(
            BufferRole::Position.bytes_per_element(),
            std::mem::size_of::<Vertex>() as u64
        );
    }
}
