//! Mesh-level error types.

use thiserror::Error;

use crate::backend::traits::BackendError;
use crate::backend::types::BufferRole;

/// Errors reported by [`Mesh`](crate::mesh::Mesh) and
/// [`ClothMesh`](crate::mesh::ClothMesh) operations.
#[derive(Error, Debug)]
pub enum MeshError {
    /// An edge or triangle referenced a vertex outside the vertex array,
    /// or a cloth attribute array did not match its geometry array in
    /// length. Raised at construction; no partial object exists afterward.
    #[error("invalid topology: {0}")]
    InvalidTopology(String),

    /// An operation needed the host arrays after `clear_host_data`.
    #[error("host data has been cleared")]
    HostDataUnavailable,

    /// Wrapping a render buffer for compute access failed. All views
    /// created earlier in the same call have been released.
    #[error("compute interop failed for {role:?} buffer")]
    DeviceInterop {
        role: BufferRole,
        #[source]
        source: BackendError,
    },

    /// A device operation ran before the buffers it needs were created.
    #[error("uninitialized buffer: {0}")]
    UninitializedBuffer(&'static str),

    /// A device-level failure outside the interop path.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

pub type MeshResult<T> = Result<T, MeshError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MeshError::HostDataUnavailable;
        assert_eq!(err.to_string(), "host data has been cleared");

        let err = MeshError::InvalidTopology("edge 3 references vertex outside 0..4".to_string());
        assert_eq!(
            err.to_string(),
            "invalid topology: edge 3 references vertex outside 0..4"
        );
    }

    #[test]
    fn test_interop_error_names_role() {
        let err = MeshError::DeviceInterop {
            role: BufferRole::Velocity,
            source: BackendError::InteropUnsupported("no shared context".to_string()),
        };
        assert!(err.to_string().contains("Velocity"));
    }
}
