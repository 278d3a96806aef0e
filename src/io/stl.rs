//! STL (stereolithography) format support.
//!
//! Both binary and ASCII files load; saving writes binary. STL stores
//! positions only, so normals and UVs are dropped on save.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use log::{debug, warn};
use nalgebra::Point3;

use super::{load_error, save_error};
use crate::error::Result;
use crate::mesh::{build_from_triangles, Mesh};

/// Load a mesh from an STL file.
///
/// Coincident corners are merged by the reader; triangles that collapse
/// onto fewer than three distinct vertices are skipped.
///
/// # Example
///
/// ```no_run
/// use unfurl::io::stl;
///
/// let mesh = stl::load("bottle.stl").unwrap();
/// ```
pub fn load<P: AsRef<Path>>(path: P) -> Result<Mesh> {
    let path = path.as_ref();
    let mut file = File::open(path)?;

    let stl = stl_io::read_stl(&mut file).map_err(|e| load_error(path, e))?;

    let vertices: Vec<Point3<f64>> = stl
        .vertices
        .iter()
        .map(|v| Point3::new(v[0] as f64, v[1] as f64, v[2] as f64))
        .collect();

    let faces: Vec<[usize; 3]> = stl
        .faces
        .iter()
        .map(|tri| tri.vertices)
        .filter(|[a, b, c]| a != b && b != c && a != c)
        .collect();

    let skipped = stl.faces.len() - faces.len();
    if skipped > 0 {
        debug!("{}: skipped {} degenerate triangles", path.display(), skipped);
    }

    if faces.is_empty() {
        return Err(load_error(path, "STL file contains no valid triangles"));
    }

    build_from_triangles(&vertices, &faces)
}

/// Save a mesh to a binary STL file.
pub fn save<P: AsRef<Path>>(mesh: &Mesh, path: P) -> Result<()> {
    let path = path.as_ref();
    if mesh.uvs().is_some() || mesh.normals().is_some() {
        warn!("{}: STL stores positions only, dropping normals and UVs", path.display());
    }

    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    let to_f32 = |p: &Point3<f64>| [p.x as f32, p.y as f32, p.z as f32];
    let triangles: Vec<stl_io::Triangle> = mesh
        .face_ids()
        .map(|f| {
            let [p0, p1, p2] = mesh.face_positions(f);
            let n = mesh.face_normal(f);
            stl_io::Triangle {
                normal: stl_io::Normal::new([n.x as f32, n.y as f32, n.z as f32]),
                vertices: [
                    stl_io::Vertex::new(to_f32(&p0)),
                    stl_io::Vertex::new(to_f32(&p1)),
                    stl_io::Vertex::new(to_f32(&p2)),
                ],
            }
        })
        .collect();

    stl_io::write_stl(&mut writer, triangles.iter()).map_err(|e| save_error(path, e))?;
    writer.flush().map_err(|e| save_error(path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::primitives::cylinder;
    use tempfile::tempdir;

    #[test]
    fn test_round_trip_merges_corners() {
        let mesh = cylinder(2.0, 3.0, 16, 4, true).unwrap();
        let dir = tempdir().unwrap();
        let path = dir.path().join("cyl.stl");
        save(&mesh, &path).unwrap();

        let back = load(&path).unwrap();
        assert_eq!(back.num_vertices(), mesh.num_vertices());
        assert_eq!(back.num_faces(), mesh.num_faces());
        assert!(back.uvs().is_none());
        assert!((back.surface_area() - mesh.surface_area()).abs() < 1e-4);
    }
}
