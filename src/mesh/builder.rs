//! Mesh construction utilities.
//!
//! Functions for building validated meshes from face-vertex lists, as
//! commonly found in mesh file formats, and for converting back.

use nalgebra::Point3;

use super::Mesh;
use crate::error::{Result, UnfurlError};

/// Build a mesh from vertices and triangle faces.
///
/// # Arguments
/// * `vertices` - List of vertex positions
/// * `faces` - List of triangle faces, each as [v0, v1, v2] indices
///
/// # Returns
/// A mesh, or an error if the input is invalid.
///
/// # Example
/// ```
/// use unfurl::mesh::{build_from_triangles, Mesh};
/// use nalgebra::Point3;
///
/// let vertices = vec![
///     Point3::new(0.0, 0.0, 0.0),
///     Point3::new(1.0, 0.0, 0.0),
///     Point3::new(0.5, 1.0, 0.0),
/// ];
/// let faces = vec![[0, 1, 2]];
///
/// let mesh: Mesh = build_from_triangles(&vertices, &faces).unwrap();
/// assert_eq!(mesh.num_vertices(), 3);
/// assert_eq!(mesh.num_faces(), 1);
/// ```
pub fn build_from_triangles(vertices: &[Point3<f64>], faces: &[[usize; 3]]) -> Result<Mesh> {
    if faces.is_empty() {
        return Err(UnfurlError::EmptyMesh);
    }

    validate_faces(vertices.len(), faces)?;

    Ok(Mesh {
        positions: vertices.to_vec(),
        normals: None,
        faces: faces.to_vec(),
        uvs: None,
    })
}

/// Check every face for out-of-range and repeated vertex indices.
pub(crate) fn validate_faces(num_vertices: usize, faces: &[[usize; 3]]) -> Result<()> {
    for (fi, face) in faces.iter().enumerate() {
        for &vi in face {
            if vi >= num_vertices {
                return Err(UnfurlError::InvalidVertexIndex { face: fi, vertex: vi });
            }
        }
        if face[0] == face[1] || face[1] == face[2] || face[0] == face[2] {
            return Err(UnfurlError::DegenerateFace { face: fi });
        }
    }
    Ok(())
}

/// Convert a mesh back to a face-vertex representation.
///
/// Returns (vertices, faces) tuple.
pub fn to_face_vertex(mesh: &Mesh) -> (Vec<Point3<f64>>, Vec<[usize; 3]>) {
    (mesh.positions.clone(), mesh.faces.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_triangles() -> (Vec<Point3<f64>>, Vec<[usize; 3]>) {
        // Two triangles sharing an edge
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.5, 1.0, 0.0),
            Point3::new(0.5, -1.0, 0.0),
        ];
        let faces = vec![[0, 1, 2], [1, 0, 3]];
        (vertices, faces)
    }

    #[test]
    fn test_two_triangles() {
        let (vertices, faces) = two_triangles();
        let mesh = build_from_triangles(&vertices, &faces).unwrap();

        assert_eq!(mesh.num_vertices(), 4);
        assert_eq!(mesh.num_faces(), 2);
        assert!(mesh.is_valid());
        assert!(mesh.normals().is_none());
        assert!(mesh.uvs().is_none());
    }

    #[test]
    fn test_roundtrip() {
        let (vertices, faces) = two_triangles();
        let mesh = build_from_triangles(&vertices, &faces).unwrap();

        let (out_verts, out_faces) = to_face_vertex(&mesh);

        assert_eq!(vertices, out_verts);
        assert_eq!(faces, out_faces);
    }

    #[test]
    fn test_empty_faces() {
        let (vertices, _) = two_triangles();
        assert!(matches!(
            build_from_triangles(&vertices, &[]),
            Err(UnfurlError::EmptyMesh)
        ));
    }

    #[test]
    fn test_invalid_vertex_index() {
        let vertices = vec![Point3::new(0.0, 0.0, 0.0)];
        let faces = vec![[0, 1, 2]]; // Indices 1 and 2 are invalid

        let result = build_from_triangles(&vertices, &faces);
        assert!(matches!(
            result,
            Err(UnfurlError::InvalidVertexIndex { face: 0, vertex: 1 })
        ));
    }

    #[test]
    fn test_degenerate_face() {
        let (vertices, _) = two_triangles();
        let faces = vec![[0, 0, 2]]; // Degenerate: v0 == v1

        let result = build_from_triangles(&vertices, &faces);
        assert!(matches!(result, Err(UnfurlError::DegenerateFace { face: 0 })));
    }
}
