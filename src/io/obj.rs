//! Wavefront OBJ format support.
//!
//! OBJ indexes positions, texture coordinates and normals separately for
//! every face corner, which maps directly onto [`UVMap`]. Normals are
//! stored per vertex in [`Mesh`], so on load each vertex takes the normal
//! of the first face corner that references it.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use log::debug;
use nalgebra::{Point2, Point3, Vector3};

use super::{load_error, save_error};
use crate::error::{Result, UnfurlError};
use crate::mesh::{build_from_triangles, Mesh, UVMap};

/// Load a mesh from an OBJ file.
///
/// Polygons are triangulated and all objects in the file are merged.
///
/// # Example
///
/// ```no_run
/// use unfurl::io::obj;
///
/// let mesh = obj::load("bottle.obj").unwrap();
/// println!("{} faces, UVs: {}", mesh.num_faces(), mesh.uvs().is_some());
/// ```
pub fn load<P: AsRef<Path>>(path: P) -> Result<Mesh> {
    let path = path.as_ref();
    let (models, _materials) = tobj::load_obj(
        path,
        &tobj::LoadOptions {
            triangulate: true,
            single_index: false,
            ..Default::default()
        },
    )
    .map_err(|e| load_error(path, e))?;

    let mut positions: Vec<Point3<f64>> = Vec::new();
    let mut faces: Vec<[usize; 3]> = Vec::new();
    let mut normals: Vec<Option<Vector3<f64>>> = Vec::new();
    let mut uv_coords: Vec<Point2<f64>> = Vec::new();
    let mut uv_faces: Vec<[usize; 3]> = Vec::new();
    let mut all_have_uvs = true;
    let mut any_normals = false;

    for model in &models {
        let m = &model.mesh;
        let v_offset = positions.len();
        let uv_offset = uv_coords.len();

        positions.extend(
            m.positions
                .chunks_exact(3)
                .map(|c| Point3::new(c[0] as f64, c[1] as f64, c[2] as f64)),
        );
        normals.resize(positions.len(), None);
        uv_coords.extend(
            m.texcoords
                .chunks_exact(2)
                .map(|c| Point2::new(c[0] as f64, c[1] as f64)),
        );

        let has_uvs = !m.texcoord_indices.is_empty() && m.texcoord_indices.len() == m.indices.len();
        let has_normals = !m.normal_indices.is_empty() && m.normal_indices.len() == m.indices.len();
        all_have_uvs &= has_uvs;
        any_normals |= has_normals;

        for (k, tri) in m.indices.chunks_exact(3).enumerate() {
            faces.push([
                tri[0] as usize + v_offset,
                tri[1] as usize + v_offset,
                tri[2] as usize + v_offset,
            ]);
            if has_uvs {
                let t = &m.texcoord_indices[3 * k..3 * k + 3];
                uv_faces.push([
                    t[0] as usize + uv_offset,
                    t[1] as usize + uv_offset,
                    t[2] as usize + uv_offset,
                ]);
            }
            if has_normals {
                for c in 0..3 {
                    let v = tri[c] as usize + v_offset;
                    let n = m.normal_indices[3 * k + c] as usize * 3;
                    if normals[v].is_none() {
                        if let Some(nn) = m.normals.get(n..n + 3) {
                            let normal = Vector3::new(nn[0] as f64, nn[1] as f64, nn[2] as f64);
                            normals[v] = Some(normal);
                        }
                    }
                }
            }
        }

        debug!(
            "OBJ model '{}': {} vertices, {} faces, uvs: {}, normals: {}",
            model.name,
            m.positions.len() / 3,
            m.indices.len() / 3,
            has_uvs,
            has_normals
        );
    }

    if faces.is_empty() {
        return Err(load_error(path, "OBJ file contains no faces"));
    }

    let mut mesh = build_from_triangles(&positions, &faces).map_err(|e| match e {
        UnfurlError::EmptyMesh => load_error(path, "OBJ file contains no faces"),
        other => other,
    })?;

    if any_normals {
        let normals = normals
            .into_iter()
            .map(|n| n.unwrap_or_else(Vector3::zeros))
            .collect();
        // Zero entries are replaced by face-averaged normals
        mesh.set_normals(normals)?;
    }
    if all_have_uvs && !models.is_empty() {
        mesh.set_uvs(UVMap::new(uv_coords, uv_faces)?)?;
    }

    Ok(mesh)
}

/// Save a mesh to an OBJ file.
///
/// Writes `v`, then `vt` and `vn` when present, and faces as
/// `f v/vt/vn` (or the matching shorter form). Numbers use the shortest
/// representation that reads back to the same `f64`.
pub fn save<P: AsRef<Path>>(mesh: &Mesh, path: P) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    write_obj(mesh, &mut writer).map_err(|e| save_error(path, e))?;
    writer.flush().map_err(|e| save_error(path, e))?;
    Ok(())
}

fn write_obj<W: Write>(mesh: &Mesh, w: &mut W) -> std::io::Result<()> {
    writeln!(w, "# unfurl")?;
    writeln!(w, "# vertices: {}", mesh.num_vertices())?;
    writeln!(w, "# faces: {}", mesh.num_faces())?;

    for p in mesh.positions() {
        writeln!(w, "v {} {} {}", p.x, p.y, p.z)?;
    }
    if let Some(uvs) = mesh.uvs() {
        for uv in uvs.coords() {
            writeln!(w, "vt {} {}", uv.x, uv.y)?;
        }
    }
    if let Some(normals) = mesh.normals() {
        for n in normals {
            writeln!(w, "vn {} {} {}", n.x, n.y, n.z)?;
        }
    }

    let has_normals = mesh.normals().is_some();
    for (fi, face) in mesh.faces().iter().enumerate() {
        write!(w, "f")?;
        for c in 0..3 {
            let v = face[c] + 1;
            match (mesh.uvs(), has_normals) {
                (Some(uvs), true) => write!(w, " {}/{}/{}", v, uvs.faces()[fi][c] + 1, v)?,
                (Some(uvs), false) => write!(w, " {}/{}", v, uvs.faces()[fi][c] + 1)?,
                (None, true) => write!(w, " {}//{}", v, v)?,
                (None, false) => write!(w, " {}", v)?,
            }
        }
        writeln!(w)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::primitives::cylinder;
    use crate::mesh::FaceId;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_face_corner_uvs_survive() {
        let mesh = cylinder(1.5, 4.0, 10, 3, true).unwrap();
        let dir = tempdir().unwrap();
        let path = dir.path().join("cyl.obj");
        save(&mesh, &path).unwrap();

        let back = load(&path).unwrap();
        assert_eq!(back.positions(), mesh.positions());
        assert_eq!(back.faces(), mesh.faces());
        let (a, b) = (mesh.uvs().unwrap(), back.uvs().unwrap());
        assert_eq!(a.len(), b.len());
        for f in mesh.face_ids() {
            assert_eq!(a.corner_uvs(f), b.corner_uvs(f));
        }
        assert!(back.is_valid());
    }

    #[test]
    fn test_normals_round_trip() {
        let mut mesh = cylinder(1.0, 1.0, 6, 1, false).unwrap();
        let normals: Vec<_> = mesh
            .positions()
            .iter()
            .map(|p| Vector3::new(p.x, p.y, 0.0))
            .collect();
        mesh.set_normals(normals).unwrap();

        let dir = tempdir().unwrap();
        let path = dir.path().join("n.obj");
        save(&mesh, &path).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("vn "));
        let face_corner = |l: &str| l.split(' ').nth(1).map(|c| c.split('/').count());
        assert!(text.lines().any(|l| l.starts_with("f ") && face_corner(l) == Some(3)));

        let back = load(&path).unwrap();
        for (n, m) in back.normals().unwrap().iter().zip(mesh.normals().unwrap()) {
            assert!((n - m).norm() < 1e-6);
        }
    }

    #[test]
    fn test_loads_quads_and_plain_faces() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("quad.obj");
        fs::write(
            &path,
            "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\n\
             vt 0 0\nvt 1 0\nvt 1 1\nvt 0 1\n\
             f 1/1 2/2 3/3 4/4\n",
        )
        .unwrap();

        let mesh = load(&path).unwrap();
        assert_eq!(mesh.num_faces(), 2);
        let uvs = mesh.uvs().unwrap();
        assert_eq!(uvs.corner_uvs(FaceId::new(0))[1], Point2::new(1.0, 0.0));
        assert!(mesh.normals().is_none());
    }

    #[test]
    fn test_empty_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.obj");
        fs::write(&path, "# nothing\n").unwrap();
        assert!(matches!(load(&path), Err(UnfurlError::LoadError { .. })));
    }
}
