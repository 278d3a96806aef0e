//! Procedural surfaces of revolution.
//!
//! Used by tests and benchmarks, and handy for checking a configuration
//! against a known shape before running it on scans.
//!
//! All generated meshes are centered on the Z axis, have outward-facing
//! triangles, and carry a cylindrical UV layout: `u` follows the angle
//! (with a duplicated seam column at angle 0) and `v` follows the profile
//! from its first to its last point.

use std::f64::consts::TAU;

use nalgebra::{Point2, Point3};

use super::{build_from_triangles, Mesh, UVMap};
use crate::error::{Result, UnfurlError};

/// A closed cylinder wall around the Z axis, centered at the origin.
///
/// `rings` is the number of height subdivisions (`rings + 1` vertex rings).
///
/// ```
/// use unfurl::mesh::primitives::cylinder;
///
/// let mesh = cylinder(1.0, 10.0, 32, 20, false).unwrap();
/// assert_eq!(mesh.num_vertices(), 32 * 21);
/// assert_eq!(mesh.num_faces(), 2 * 32 * 20);
/// ```
pub fn cylinder(
    radius: f64,
    height: f64,
    segments: usize,
    rings: usize,
    capped: bool,
) -> Result<Mesh> {
    if rings == 0 {
        return Err(UnfurlError::invalid_param("rings", rings, "must be at least 1"));
    }
    let profile: Vec<(f64, f64)> = (0..=rings)
        .map(|i| (radius, -0.5 * height + height * i as f64 / rings as f64))
        .collect();
    revolve(&profile, segments, capped)
}

/// Sweep a `(radius, z)` profile around the Z axis.
///
/// Profile points must have positive radius. With `capped`, the first and
/// last rings are closed with triangle fans around a center vertex.
pub fn revolve(profile: &[(f64, f64)], segments: usize, capped: bool) -> Result<Mesh> {
    if profile.len() < 2 {
        return Err(UnfurlError::invalid_param(
            "profile",
            profile.len(),
            "needs at least two points",
        ));
    }
    if segments < 3 {
        return Err(UnfurlError::invalid_param(
            "segments",
            segments,
            "must be at least 3",
        ));
    }
    if let Some(&(r, _)) = profile.iter().find(|(r, _)| *r <= 0.0) {
        return Err(UnfurlError::invalid_param("radius", r, "must be positive"));
    }

    let rings = profile.len();
    let mut vertices = Vec::with_capacity(rings * segments + 2);
    for &(r, z) in profile {
        for j in 0..segments {
            let theta = TAU * j as f64 / segments as f64;
            vertices.push(Point3::new(r * theta.cos(), r * theta.sin(), z));
        }
    }

    // UV grid has one extra column so the seam can be cut open
    let z_first = profile[0].1;
    let z_span = profile[rings - 1].1 - z_first;
    let v_of = |z: f64| {
        if z_span.abs() > 1e-12 {
            (z - z_first) / z_span
        } else {
            0.0
        }
    };
    let mut uv_coords = Vec::with_capacity(rings * (segments + 1) + 2);
    for &(_, z) in profile {
        for j in 0..=segments {
            uv_coords.push(Point2::new(j as f64 / segments as f64, v_of(z)));
        }
    }

    let vid = |i: usize, j: usize| i * segments + (j % segments);
    let uid = |i: usize, j: usize| i * (segments + 1) + j;

    let mut faces = Vec::with_capacity(2 * segments * (rings + 1));
    let mut uv_faces = Vec::with_capacity(faces.capacity());
    for i in 0..rings - 1 {
        for j in 0..segments {
            faces.push([vid(i, j), vid(i, j + 1), vid(i + 1, j + 1)]);
            uv_faces.push([uid(i, j), uid(i, j + 1), uid(i + 1, j + 1)]);
            faces.push([vid(i, j), vid(i + 1, j + 1), vid(i + 1, j)]);
            uv_faces.push([uid(i, j), uid(i + 1, j + 1), uid(i + 1, j)]);
        }
    }

    if capped {
        let last = rings - 1;
        let bottom = vertices.len();
        vertices.push(Point3::new(0.0, 0.0, profile[0].1));
        let top = vertices.len();
        vertices.push(Point3::new(0.0, 0.0, profile[last].1));

        let bottom_uv = uv_coords.len();
        uv_coords.push(Point2::new(0.5, 0.0));
        let top_uv = uv_coords.len();
        uv_coords.push(Point2::new(0.5, 1.0));

        for j in 0..segments {
            faces.push([bottom, vid(0, j + 1), vid(0, j)]);
            uv_faces.push([bottom_uv, uid(0, j + 1), uid(0, j)]);
            faces.push([top, vid(last, j), vid(last, j + 1)]);
            uv_faces.push([top_uv, uid(last, j), uid(last, j + 1)]);
        }
    }

    let mut mesh = build_from_triangles(&vertices, &faces)?;
    mesh.set_uvs(UVMap::new(uv_coords, uv_faces)?)?;
    Ok(mesh)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::FaceId;

    #[test]
    fn test_cylinder_counts_and_radius() {
        let mesh = cylinder(2.0, 4.0, 16, 8, false).unwrap();
        assert_eq!(mesh.num_vertices(), 16 * 9);
        assert_eq!(mesh.num_faces(), 2 * 16 * 8);
        assert!(mesh.is_valid());

        for p in mesh.positions() {
            assert!(((p.x * p.x + p.y * p.y).sqrt() - 2.0).abs() < 1e-12);
            assert!(p.z >= -2.0 - 1e-12 && p.z <= 2.0 + 1e-12);
        }
    }

    #[test]
    fn test_side_normals_point_outward() {
        let mesh = cylinder(1.0, 2.0, 12, 3, true).unwrap();
        for f in mesh.face_ids() {
            let n = mesh.face_normal(f);
            let c = mesh.face_centroid(f);
            // Outward means away from the axis on the wall, away from the middle on caps
            let outward = nalgebra::Vector3::new(c.x, c.y, if n.z.abs() > 0.9 { c.z } else { 0.0 });
            assert!(n.dot(&outward) > 0.0, "face {:?} points inward", f);
        }
    }

    #[test]
    fn test_capped_uvs_cover_every_face() {
        let mesh = cylinder(1.0, 2.0, 8, 2, true).unwrap();
        let uvs = mesh.uvs().unwrap();
        assert_eq!(uvs.num_faces(), mesh.num_faces());
        let [a, b, _] = uvs.corner_uvs(FaceId::new(2 * 8 - 2));
        // Last wall column uses the duplicated seam coordinate u = 1
        assert!((a.x - 7.0 / 8.0).abs() < 1e-12);
        assert!((b.x - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_revolve_rejects_bad_profiles() {
        assert!(revolve(&[(1.0, 0.0)], 8, false).is_err());
        assert!(revolve(&[(1.0, 0.0), (0.0, 1.0)], 8, false).is_err());
        assert!(revolve(&[(1.0, 0.0), (1.0, 1.0)], 2, false).is_err());
    }
}
