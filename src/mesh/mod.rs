//! Core mesh data structures.
//!
//! The primary type is [`Mesh`], an indexed triangle mesh with optional
//! per-vertex normals and optional texture coordinates ([`UVMap`]).
//!
//! # Index Types
//!
//! Mesh elements are identified by type-safe index wrappers:
//! - [`VertexId`] - Identifies a vertex
//! - [`FaceId`] - Identifies a face
//!
//! # Construction
//!
//! Meshes are typically constructed from file I/O or from face-vertex lists:
//!
//! ```
//! use unfurl::mesh::{build_from_triangles, Mesh};
//! use nalgebra::Point3;
//!
//! let vertices = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(0.5, 1.0, 0.0),
//! ];
//! let faces = vec![[0, 1, 2]];
//!
//! let mesh: Mesh = build_from_triangles(&vertices, &faces).unwrap();
//! assert_eq!(mesh.num_faces(), 1);
//! ```

mod builder;
mod index;
pub mod primitives;
mod uv;

use nalgebra::{Isometry3, Point3, Vector3};

pub use builder::{build_from_triangles, to_face_vertex};
pub use index::{FaceId, VertexId};
pub use uv::UVMap;

use crate::error::{Result, UnfurlError};

/// An indexed triangle mesh.
///
/// Invariants, checked on construction and preserved by every operation in
/// this crate:
/// - every face index is a valid vertex index and no face repeats a vertex;
/// - normals, when present, have one unit-length entry per vertex;
/// - texture coordinates, when present, have one UV triple per face.
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    /// Vertex positions.
    pub(crate) positions: Vec<Point3<f64>>,

    /// Unit per-vertex normals.
    pub(crate) normals: Option<Vec<Vector3<f64>>>,

    /// Triangles as vertex-index triples.
    pub(crate) faces: Vec<[usize; 3]>,

    /// Face-corner texture coordinates.
    pub(crate) uvs: Option<UVMap>,
}

impl Mesh {
    /// Create a new empty mesh.
    pub fn new() -> Self {
        Self::default()
    }

    // ==================== Accessors ====================

    /// Get the number of vertices.
    #[inline]
    pub fn num_vertices(&self) -> usize {
        self.positions.len()
    }

    /// Get the number of faces.
    #[inline]
    pub fn num_faces(&self) -> usize {
        self.faces.len()
    }

    /// Get the position of a vertex.
    #[inline]
    pub fn position(&self, v: VertexId) -> &Point3<f64> {
        &self.positions[v.index()]
    }

    /// All vertex positions.
    #[inline]
    pub fn positions(&self) -> &[Point3<f64>] {
        &self.positions
    }

    /// All faces as vertex-index triples.
    #[inline]
    pub fn faces(&self) -> &[[usize; 3]] {
        &self.faces
    }

    /// Per-vertex normals, if the mesh has them.
    pub fn normals(&self) -> Option<&[Vector3<f64>]> {
        self.normals.as_deref()
    }

    /// Texture coordinates, if the mesh has them.
    pub fn uvs(&self) -> Option<&UVMap> {
        self.uvs.as_ref()
    }

    /// Attach per-vertex normals. Each normal is re-normalized.
    pub fn set_normals(&mut self, normals: Vec<Vector3<f64>>) -> Result<()> {
        if normals.len() != self.positions.len() {
            return Err(UnfurlError::invalid_param(
                "normals",
                normals.len(),
                "must have one normal per vertex",
            ));
        }
        let normals = normals
            .into_iter()
            .enumerate()
            .map(|(i, n)| {
                n.try_normalize(1e-12)
                    .unwrap_or_else(|| self.vertex_normal(VertexId::new(i)))
            })
            .collect();
        self.normals = Some(normals);
        Ok(())
    }

    /// Attach texture coordinates. The map must cover every face.
    pub fn set_uvs(&mut self, uvs: UVMap) -> Result<()> {
        if uvs.num_faces() != self.faces.len() {
            return Err(UnfurlError::FaceCountMismatch {
                old: self.faces.len(),
                new: uvs.num_faces(),
            });
        }
        self.uvs = Some(uvs);
        Ok(())
    }

    /// Remove texture coordinates.
    pub fn clear_uvs(&mut self) {
        self.uvs = None;
    }

    // ==================== Iteration ====================

    /// Iterate over all face IDs.
    pub fn face_ids(&self) -> impl Iterator<Item = FaceId> + '_ {
        (0..self.faces.len()).map(FaceId::new)
    }

    /// Get the positions of the three vertices of a face.
    #[inline]
    pub fn face_positions(&self, f: FaceId) -> [Point3<f64>; 3] {
        self.faces[f.index()].map(|v| self.positions[v])
    }

    // ==================== Geometry ====================

    /// Compute the unnormalized normal of a face (length = twice its area).
    pub fn face_cross(&self, f: FaceId) -> Vector3<f64> {
        let [p0, p1, p2] = self.face_positions(f);
        (p1 - p0).cross(&(p2 - p0))
    }

    /// Compute the unit normal of a face, or zero for a degenerate face.
    pub fn face_normal(&self, f: FaceId) -> Vector3<f64> {
        self.face_cross(f)
            .try_normalize(1e-300)
            .unwrap_or_else(Vector3::zeros)
    }

    /// Compute the area of a face.
    pub fn face_area(&self, f: FaceId) -> f64 {
        0.5 * self.face_cross(f).norm()
    }

    /// Compute the centroid of a face.
    pub fn face_centroid(&self, f: FaceId) -> Point3<f64> {
        let [p0, p1, p2] = self.face_positions(f);
        Point3::from((p0.coords + p1.coords + p2.coords) / 3.0)
    }

    /// Compute the area-weighted normal at a vertex from its incident faces.
    ///
    /// Scans all faces; use for occasional repairs, not in inner loops.
    pub fn vertex_normal(&self, v: VertexId) -> Vector3<f64> {
        let mut normal = Vector3::zeros();
        for f in self.face_ids() {
            if self.faces[f.index()].contains(&v.index()) {
                normal += self.face_cross(f);
            }
        }
        normal.try_normalize(1e-300).unwrap_or_else(Vector3::z)
    }

    /// Compute the bounding box of the mesh.
    pub fn bounding_box(&self) -> Option<(Point3<f64>, Point3<f64>)> {
        let first = *self.positions.first()?;
        let mut min = first;
        let mut max = first;

        for p in &self.positions {
            for i in 0..3 {
                min[i] = min[i].min(p[i]);
                max[i] = max[i].max(p[i]);
            }
        }

        Some((min, max))
    }

    /// Compute the total surface area of the mesh.
    pub fn surface_area(&self) -> f64 {
        self.face_ids().map(|f| self.face_area(f)).sum()
    }

    /// Area-weighted centroid of the surface.
    ///
    /// Falls back to the vertex average when the surface has no area.
    pub fn surface_centroid(&self) -> Option<Point3<f64>> {
        if self.positions.is_empty() {
            return None;
        }
        let mut weighted = Vector3::zeros();
        let mut total = 0.0;
        for f in self.face_ids() {
            let area = self.face_area(f);
            weighted += self.face_centroid(f).coords * area;
            total += area;
        }
        if total > 0.0 {
            return Some(Point3::from(weighted / total));
        }
        let sum: Vector3<f64> = self.positions.iter().map(|p| p.coords).sum();
        Some(Point3::from(sum / self.positions.len() as f64))
    }

    // ==================== Transformation ====================

    /// Apply a rigid transform to every position and normal in place.
    pub fn transform(&mut self, iso: &Isometry3<f64>) {
        for p in &mut self.positions {
            *p = iso * *p;
        }
        if let Some(normals) = &mut self.normals {
            for n in normals.iter_mut() {
                *n = iso.rotation * *n;
            }
        }
    }

    /// Check the structural invariants listed on [`Mesh`].
    pub fn is_valid(&self) -> bool {
        let n = self.positions.len();
        let faces_ok = self
            .faces
            .iter()
            .all(|f| f.iter().all(|&v| v < n) && f[0] != f[1] && f[1] != f[2] && f[0] != f[2]);
        let normals_ok = self.normals.as_ref().map_or(true, |ns| {
            ns.len() == n && ns.iter().all(|v| (v.norm() - 1.0).abs() < 1e-6)
        });
        let uvs_ok = self.uvs.as_ref().map_or(true, |uv| {
            uv.num_faces() == self.faces.len()
                && uv.faces().iter().all(|f| f.iter().all(|&i| i < uv.len()))
        });
        faces_ok && normals_ok && uvs_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Point2, Translation3, UnitQuaternion};
    use std::f64::consts::FRAC_PI_2;

    fn right_triangle() -> Mesh {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        build_from_triangles(&vertices, &[[0, 1, 2]]).unwrap()
    }

    #[test]
    fn test_empty_mesh() {
        let mesh = Mesh::new();
        assert_eq!(mesh.num_vertices(), 0);
        assert_eq!(mesh.num_faces(), 0);
        assert!(mesh.bounding_box().is_none());
        assert!(mesh.surface_centroid().is_none());
        assert!(mesh.is_valid());
    }

    #[test]
    fn test_face_geometry() {
        let mesh = right_triangle();
        let f = FaceId::new(0);
        assert!((mesh.face_area(f) - 0.5).abs() < 1e-12);
        assert!((mesh.face_normal(f) - Vector3::z()).norm() < 1e-12);
        let c = mesh.face_centroid(f);
        assert!((c - Point3::new(1.0 / 3.0, 1.0 / 3.0, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn test_set_normals_normalizes() {
        let mut mesh = right_triangle();
        mesh.set_normals(vec![
            Vector3::new(0.0, 0.0, 2.0),
            Vector3::zeros(),
            Vector3::new(0.0, 0.0, 0.5),
        ])
        .unwrap();
        for n in mesh.normals().unwrap() {
            assert!((n - Vector3::z()).norm() < 1e-12);
        }
        assert!(mesh.is_valid());
    }

    #[test]
    fn test_set_uvs_requires_matching_faces() {
        let mut mesh = right_triangle();
        let uvs = UVMap::per_vertex(vec![Point2::origin(); 3], &[[0, 1, 2], [0, 2, 1]]);
        assert!(mesh.set_uvs(uvs).is_err());
    }

    #[test]
    fn test_transform_rotates_normals() {
        let mut mesh = right_triangle();
        mesh.set_normals(vec![Vector3::z(); 3]).unwrap();
        let iso = Isometry3::from_parts(
            Translation3::new(0.0, 0.0, 5.0),
            UnitQuaternion::from_axis_angle(&Vector3::x_axis(), FRAC_PI_2),
        );
        mesh.transform(&iso);

        assert!((mesh.positions()[0] - Point3::new(0.0, 0.0, 5.0)).norm() < 1e-12);
        assert!((mesh.positions()[2] - Point3::new(0.0, 0.0, 6.0)).norm() < 1e-12);
        for n in mesh.normals().unwrap() {
            assert!((n + Vector3::y()).norm() < 1e-12);
        }
    }
}
