//! UV coordinate storage.
//!
//! This module provides the [`UVMap`] type for storing 2D texture
//! coordinates of a triangle mesh.

use nalgebra::Point2;

use super::index::FaceId;
use crate::error::{Result, UnfurlError};

/// Texture coordinates of a triangle mesh.
///
/// Coordinates are stored once and referenced by a UV-index triple per face,
/// the way OBJ files do it. A vertex that lies on a UV seam keeps a single
/// position but gets a different UV in each face around it, so cutting a
/// surface open in UV space never changes the mesh topology.
///
/// A per-vertex map is the special case where every face's UV triple equals
/// its vertex triple; see [`UVMap::per_vertex`].
///
/// # Example
///
/// ```
/// use unfurl::mesh::{FaceId, UVMap};
/// use nalgebra::Point2;
///
/// let faces = vec![[0, 1, 2]];
/// let uvs = UVMap::per_vertex(
///     vec![Point2::new(0.0, 0.0), Point2::new(1.0, 0.0), Point2::new(0.0, 1.0)],
///     &faces,
/// );
/// assert_eq!(uvs.num_faces(), 1);
/// assert!(uvs.is_per_vertex(&faces));
/// assert_eq!(uvs.corner_uvs(FaceId::new(0))[1], Point2::new(1.0, 0.0));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct UVMap {
    /// UV coordinates, referenced by `faces`.
    coords: Vec<Point2<f64>>,
    /// One UV-index triple per mesh face.
    faces: Vec<[usize; 3]>,
}

impl UVMap {
    /// Create a UV map from coordinates and per-face UV indices.
    ///
    /// Fails if a face references a coordinate that does not exist.
    pub fn new(coords: Vec<Point2<f64>>, faces: Vec<[usize; 3]>) -> Result<Self> {
        for (fi, face) in faces.iter().enumerate() {
            for &ui in face {
                if ui >= coords.len() {
                    return Err(UnfurlError::InvalidVertexIndex { face: fi, vertex: ui });
                }
            }
        }
        Ok(Self { coords, faces })
    }

    /// Create a per-vertex UV map: coordinate `i` belongs to vertex `i`.
    pub fn per_vertex(coords: Vec<Point2<f64>>, faces: &[[usize; 3]]) -> Self {
        Self {
            coords,
            faces: faces.to_vec(),
        }
    }

    /// Get the number of UV coordinates.
    #[inline]
    pub fn len(&self) -> usize {
        self.coords.len()
    }

    /// Check if empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    /// Number of faces this map covers.
    #[inline]
    pub fn num_faces(&self) -> usize {
        self.faces.len()
    }

    /// Get the raw coordinates slice.
    pub fn coords(&self) -> &[Point2<f64>] {
        &self.coords
    }

    /// Get a mutable slice of coordinates.
    pub fn coords_mut(&mut self) -> &mut [Point2<f64>] {
        &mut self.coords
    }

    /// Per-face UV index triples.
    pub fn faces(&self) -> &[[usize; 3]] {
        &self.faces
    }

    /// UV-index triple of a face.
    #[inline]
    pub fn face_indices(&self, f: FaceId) -> [usize; 3] {
        self.faces[f.index()]
    }

    /// The three corner UVs of a face.
    #[inline]
    pub fn corner_uvs(&self, f: FaceId) -> [Point2<f64>; 3] {
        let [a, b, c] = self.faces[f.index()];
        [self.coords[a], self.coords[b], self.coords[c]]
    }

    /// Whether UV indices coincide with vertex indices for every face.
    pub fn is_per_vertex(&self, mesh_faces: &[[usize; 3]]) -> bool {
        self.faces.as_slice() == mesh_faces
    }

    /// Compute the bounding box of the UV coordinates.
    ///
    /// Returns `None` if the UV map is empty.
    pub fn bounding_box(&self) -> Option<(Point2<f64>, Point2<f64>)> {
        let first = *self.coords.first()?;
        let mut min = first;
        let mut max = first;

        for uv in &self.coords {
            min.x = min.x.min(uv.x);
            min.y = min.y.min(uv.y);
            max.x = max.x.max(uv.x);
            max.y = max.y.max(uv.y);
        }

        Some((min, max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> UVMap {
        // Two faces sharing the diagonal, with one duplicated seam coordinate
        let coords = vec![
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(1.0, 1.0),
            Point2::new(0.0, 1.0),
            Point2::new(0.0, 1.0),
        ];
        UVMap::new(coords, vec![[0, 1, 2], [0, 2, 4]]).unwrap()
    }

    #[test]
    fn test_corner_uvs() {
        let uv_map = square();
        assert_eq!(uv_map.len(), 5);
        assert_eq!(uv_map.num_faces(), 2);
        let [a, b, c] = uv_map.corner_uvs(FaceId::new(1));
        assert_eq!(a, Point2::new(0.0, 0.0));
        assert_eq!(b, Point2::new(1.0, 1.0));
        assert_eq!(c, Point2::new(0.0, 1.0));
    }

    #[test]
    fn test_invalid_uv_index() {
        let result = UVMap::new(vec![Point2::origin()], vec![[0, 1, 0]]);
        assert!(matches!(
            result,
            Err(UnfurlError::InvalidVertexIndex { face: 0, vertex: 1 })
        ));
    }

    #[test]
    fn test_uv_map_bounding_box() {
        let coords = vec![
            Point2::new(-1.0, 0.5),
            Point2::new(2.0, -0.5),
            Point2::new(0.5, 3.0),
        ];
        let uv_map = UVMap::per_vertex(coords, &[[0, 1, 2]]);

        let (min, max) = uv_map.bounding_box().unwrap();
        assert_eq!(min, Point2::new(-1.0, -0.5));
        assert_eq!(max, Point2::new(2.0, 3.0));
    }
}
