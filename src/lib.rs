//! # Unfurl
//!
//! Turns a scanned bottle mesh into a flat label texture.
//!
//! The geometric pipeline runs without manual input:
//!
//! - **Alignment**: estimate the rotational symmetry axis and rotate it onto +Z
//! - **Body extraction**: find the longest run of height bins whose radius is
//!   stable within a tolerance τ and crop the mesh to it
//! - **Seam search**: pick the straightest vertical cut line on the body
//! - **Unwrap**: hand mesh and seam to an external UV-unwrap host
//! - **Resampling**: transfer the original texture onto the new UV layout
//!
//! ## Quick Start
//!
//! ```no_run
//! use unfurl::prelude::*;
//!
//! let config = PipelineConfig::new("out").with_tolerance(0.03);
//! let host = HostOptions::default()
//!     .with_program("blender")
//!     .with_script("seam2uv.py")
//!     .command_host()
//!     .unwrap();
//!
//! let report = unfurl::pipeline::run("bottle.obj", &config, &host).unwrap();
//! println!("body: z {:.2}..{:.2}", report.region.z_min, report.region.z_max);
//! if let Some(warning) = report.warning {
//!     eprintln!("{}", warning);
//! }
//! ```
//!
//! ## Running Stages Individually
//!
//! ```
//! use unfurl::prelude::*;
//! use unfurl::mesh::primitives::cylinder;
//!
//! let mut mesh = cylinder(1.0, 10.0, 48, 20, false).unwrap();
//!
//! let alignment = align(&mut mesh, &AlignOptions::default()).unwrap();
//! let body = extract_body(&mesh, &BodyOptions::new(0.03)).unwrap();
//! let seam = find_seam(&body.mesh, &SeamOptions::default()).unwrap();
//!
//! assert!(alignment.residual < 1e-3);
//! assert!(body.region.height() > 9.0);
//! assert_eq!(seam.len(), seam.vertices.len());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod algo;
pub mod error;
pub mod host;
pub mod io;
pub mod mesh;
pub mod pipeline;

/// Prelude module for convenient imports.
///
/// This module re-exports the most commonly used types and functions:
///
/// ```
/// use unfurl::prelude::*;
/// ```
pub mod prelude {
    pub use crate::algo::{
        align, extract_body, find_seam, resample_texture, AlignOptions, Alignment, Body,
        BodyOptions, ResampleOptions, Resampled, Seam, SeamOptions, StableRegion,
    };
    pub use crate::error::{HostFailure, MappingIncomplete, Result, Stage, UnfurlError};
    pub use crate::host::{CommandHost, HostOptions, UnwrapHost, UnwrapRequest, UnwrapResponse};
    pub use crate::mesh::{build_from_triangles, FaceId, Mesh, UVMap, VertexId};
    pub use crate::pipeline::{PipelineConfig, PipelineReport};
}

// Re-export nalgebra types for convenience
pub use nalgebra;

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use nalgebra::Point3;

    #[test]
    fn test_tetrahedron() {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.5, 1.0, 0.0),
            Point3::new(0.5, 0.5, 1.0),
        ];

        let faces = vec![
            [0, 2, 1], // bottom
            [0, 1, 3], // front
            [1, 2, 3], // right
            [2, 0, 3], // left
        ];

        let mesh: Mesh = build_from_triangles(&vertices, &faces).unwrap();

        assert_eq!(mesh.num_vertices(), 4);
        assert_eq!(mesh.num_faces(), 4);
        assert!(mesh.is_valid());
        assert!(mesh.uvs().is_none());

        // Closed and outward facing: the centroid sees every face from behind
        let c = mesh.surface_centroid().unwrap();
        for f in mesh.face_ids() {
            let [a, _, _] = mesh.face_positions(f);
            assert!(mesh.face_normal(f).dot(&(a - c)) > 0.0);
        }
    }
}
