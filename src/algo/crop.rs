//! Cropping a mesh to a height interval.
//!
//! Faces inside `[z_min, z_max]` are kept as they are, faces outside are
//! dropped, and faces crossing either plane are clipped: the part inside
//! the slab is a convex polygon whose corners are original vertices or
//! points where an original edge meets a plane. Those cut points are shared
//! by the two faces on either side of the edge, so the new rim is closed
//! and contains no duplicate vertices. Positions, normals and texture
//! coordinates of cut points are interpolated along the edge.

use std::collections::HashMap;

use nalgebra::{Point2, Point3, Vector3};

use crate::error::Result;
use crate::mesh::{FaceId, Mesh, UVMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Plane {
    Low,
    High,
}

/// A corner of a clipped polygon, in terms of the input mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Corner {
    Vertex(usize),
    /// Edge `a-b` (with `a < b`) cut by a plane.
    Cut { a: usize, b: usize, plane: Plane },
}

/// A texture-coordinate corner, keyed like [`Corner`] but on UV indices so
/// that UV seams stay open after clipping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum UvCorner {
    Coord(usize),
    /// UV edge `ua-ub` belonging to vertex edge `a-b`, `ua` at vertex `a`.
    Cut {
        ua: usize,
        ub: usize,
        a: usize,
        b: usize,
        plane: Plane,
    },
}

/// Keep the part of `mesh` between heights `z_min` and `z_max`.
///
/// Vertices are renumbered in order of first use. The output is always a
/// valid mesh: faces that collapse to zero area are skipped, and an interval
/// that misses the mesh (or has `z_min > z_max`) gives an empty mesh.
///
/// # Example
///
/// ```
/// use unfurl::algo::crop::crop_to_height;
/// use unfurl::mesh::primitives::cylinder;
///
/// let mesh = cylinder(1.0, 10.0, 16, 10, false).unwrap();
/// let band = crop_to_height(&mesh, -1.3, 2.2).unwrap();
/// assert!(band.is_valid());
/// assert!(band.positions().iter().all(|p| p.z >= -1.3 - 1e-12 && p.z <= 2.2 + 1e-12));
/// ```
pub fn crop_to_height(mesh: &Mesh, z_min: f64, z_max: f64) -> Result<Mesh> {
    let mut clipper = Clipper::new(mesh, z_min, z_max);
    if z_min <= z_max {
        for f in mesh.face_ids() {
            clipper.clip_face(f);
        }
    }
    clipper.finish()
}

struct Clipper<'a> {
    mesh: &'a Mesh,
    lo: f64,
    hi: f64,
    positions: Vec<Point3<f64>>,
    normals: Option<Vec<Vector3<f64>>>,
    faces: Vec<[usize; 3]>,
    vertex_index: HashMap<Corner, usize>,
    uv_coords: Vec<Point2<f64>>,
    uv_faces: Vec<[usize; 3]>,
    uv_index: HashMap<UvCorner, usize>,
}

impl<'a> Clipper<'a> {
    fn new(mesh: &'a Mesh, lo: f64, hi: f64) -> Self {
        Self {
            mesh,
            lo,
            hi,
            positions: Vec::new(),
            normals: mesh.normals().map(|_| Vec::new()),
            faces: Vec::new(),
            vertex_index: HashMap::new(),
            uv_coords: Vec::new(),
            uv_faces: Vec::new(),
            uv_index: HashMap::new(),
        }
    }

    #[inline]
    fn inside(&self, z: f64) -> bool {
        z >= self.lo && z <= self.hi
    }

    fn plane_z(&self, plane: Plane) -> f64 {
        match plane {
            Plane::Low => self.lo,
            Plane::High => self.hi,
        }
    }

    /// Parameter along `a -> b` (with `a < b`) where the edge meets `plane`.
    fn edge_t(&self, a: usize, b: usize, plane: Plane) -> f64 {
        let za = self.mesh.positions[a].z;
        let zb = self.mesh.positions[b].z;
        ((self.plane_z(plane) - za) / (zb - za)).clamp(0.0, 1.0)
    }

    fn clip_face(&mut self, f: FaceId) {
        let verts = self.mesh.faces[f.index()];
        let uvs = self.mesh.uvs().map(|m| m.face_indices(f));

        let mut polygon: Vec<(Corner, Option<UvCorner>)> = Vec::with_capacity(5);
        for k in 0..3 {
            let (p, q) = (verts[k], verts[(k + 1) % 3]);
            let zp = self.mesh.positions[p].z;
            let zq = self.mesh.positions[q].z;

            if self.inside(zp) {
                polygon.push((Corner::Vertex(p), uvs.map(|u| UvCorner::Coord(u[k]))));
            }

            let mut crossings: Vec<(f64, Plane)> = Vec::with_capacity(2);
            for plane in [Plane::Low, Plane::High] {
                let c = self.plane_z(plane);
                if (zp < c && zq > c) || (zp > c && zq < c) {
                    crossings.push(((c - zp) / (zq - zp), plane));
                }
            }
            crossings.sort_by(|x, y| x.0.total_cmp(&y.0));

            for (_, plane) in crossings {
                let (a, b, ka, kb) = if p < q {
                    (p, q, k, (k + 1) % 3)
                } else {
                    (q, p, (k + 1) % 3, k)
                };
                let uv = uvs.map(|u| UvCorner::Cut {
                    ua: u[ka],
                    ub: u[kb],
                    a,
                    b,
                    plane,
                });
                polygon.push((Corner::Cut { a, b, plane }, uv));
            }
        }

        // Fan triangulation of the convex clipped polygon
        for k in 1..polygon.len().saturating_sub(1) {
            let tri = [polygon[0], polygon[k], polygon[k + 1]];
            let corners = tri.map(|c| c.0);
            if corners[0] == corners[1] || corners[1] == corners[2] || corners[0] == corners[2] {
                continue;
            }
            let [p0, p1, p2] = corners.map(|c| self.locate(c));
            if (p1 - p0).cross(&(p2 - p0)).norm_squared() <= 0.0 {
                continue;
            }

            let face = corners.map(|c| self.vertex(c));
            if face[0] == face[1] || face[1] == face[2] || face[0] == face[2] {
                continue;
            }
            self.faces.push(face);
            if let [Some(u0), Some(u1), Some(u2)] = tri.map(|c| c.1) {
                let uv_face = [u0, u1, u2].map(|u| self.uv(u));
                self.uv_faces.push(uv_face);
            }
        }
    }

    fn locate(&self, corner: Corner) -> Point3<f64> {
        match corner {
            Corner::Vertex(v) => self.mesh.positions[v],
            Corner::Cut { a, b, plane } => {
                let t = self.edge_t(a, b, plane);
                let pa = self.mesh.positions[a];
                let pb = self.mesh.positions[b];
                let mut p = pa + (pb - pa) * t;
                // Land exactly on the plane
                p.z = self.plane_z(plane);
                p
            }
        }
    }

    fn vertex(&mut self, corner: Corner) -> usize {
        if let Some(&i) = self.vertex_index.get(&corner) {
            return i;
        }
        let position = self.locate(corner);
        let normal = self.mesh.normals().map(|src| match corner {
            Corner::Vertex(v) => src[v],
            Corner::Cut { a, b, plane } => {
                let t = self.edge_t(a, b, plane);
                (src[a] * (1.0 - t) + src[b] * t)
                    .try_normalize(1e-12)
                    .unwrap_or(src[a])
            }
        });

        let i = self.positions.len();
        self.positions.push(position);
        if let (Some(out), Some(n)) = (self.normals.as_mut(), normal) {
            out.push(n);
        }

        self.vertex_index.insert(corner, i);
        i
    }

    fn uv(&mut self, corner: UvCorner) -> usize {
        if let Some(&i) = self.uv_index.get(&corner) {
            return i;
        }
        let coords = match self.mesh.uvs() {
            Some(map) => map.coords(),
            None => return 0,
        };
        let uv = match corner {
            UvCorner::Coord(u) => coords[u],
            UvCorner::Cut { ua, ub, a, b, plane } => {
                let t = self.edge_t(a, b, plane);
                coords[ua] + (coords[ub] - coords[ua]) * t
            }
        };
        let i = self.uv_coords.len();
        self.uv_coords.push(uv);
        self.uv_index.insert(corner, i);
        i
    }

    fn finish(self) -> Result<Mesh> {
        let uvs = if self.mesh.uvs().is_some() && !self.faces.is_empty() {
            Some(UVMap::new(self.uv_coords, self.uv_faces)?)
        } else {
            None
        };
        Ok(Mesh {
            positions: self.positions,
            normals: self.normals,
            faces: self.faces,
            uvs,
        })
    }
}
