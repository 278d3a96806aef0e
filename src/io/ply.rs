//! PLY (Stanford polygon) format support.
//!
//! Reads positions, optional `nx ny nz` normals and optional per-vertex
//! texture coordinates (`s t`, `u v` or `texture_u texture_v`). Saves in
//! ASCII. PLY has no face-corner UVs, so a seamed UV layout is dropped on
//! save with a warning.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use log::warn;
use nalgebra::{Point2, Point3, Vector3};
use ply_rs::parser::Parser;
use ply_rs::ply::{DefaultElement, Property};

use super::{load_error, save_error};
use crate::error::Result;
use crate::mesh::{build_from_triangles, Mesh, UVMap};

const UV_NAMES: [(&str, &str); 3] = [("s", "t"), ("u", "v"), ("texture_u", "texture_v")];

/// Load a mesh from a PLY file.
///
/// Polygons with more than three corners are fan-triangulated.
///
/// # Example
///
/// ```no_run
/// use unfurl::io::ply;
///
/// let mesh = ply::load("bottle.ply").unwrap();
/// ```
pub fn load<P: AsRef<Path>>(path: P) -> Result<Mesh> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    let parser = Parser::<DefaultElement>::new();
    let ply = parser
        .read_ply(&mut reader)
        .map_err(|e| load_error(path, e))?;

    let vertex_element = ply
        .payload
        .get("vertex")
        .ok_or_else(|| load_error(path, "PLY file has no vertex element"))?;

    let mut vertices: Vec<Point3<f64>> = Vec::with_capacity(vertex_element.len());
    let mut normals: Option<Vec<Vector3<f64>>> = Some(Vec::with_capacity(vertex_element.len()));
    let mut uvs: Option<Vec<Point2<f64>>> = Some(Vec::with_capacity(vertex_element.len()));

    for vertex in vertex_element {
        let coord = |name: &str| {
            get_float_property(vertex, name)
                .ok_or_else(|| load_error(path, format!("vertex missing {} coordinate", name)))
        };
        vertices.push(Point3::new(coord("x")?, coord("y")?, coord("z")?));

        // An attribute missing on any vertex is dropped for all
        if let Some(ns) = normals.as_mut() {
            match (
                get_float_property(vertex, "nx"),
                get_float_property(vertex, "ny"),
                get_float_property(vertex, "nz"),
            ) {
                (Some(x), Some(y), Some(z)) => ns.push(Vector3::new(x, y, z)),
                _ => normals = None,
            }
        }
        if let Some(ts) = uvs.as_mut() {
            let uv = UV_NAMES.iter().find_map(|(u, v)| {
                Some(Point2::new(
                    get_float_property(vertex, u)?,
                    get_float_property(vertex, v)?,
                ))
            });
            match uv {
                Some(uv) => ts.push(uv),
                None => uvs = None,
            }
        }
    }

    let face_element = ply
        .payload
        .get("face")
        .ok_or_else(|| load_error(path, "PLY file has no face element"))?;

    let mut faces: Vec<[usize; 3]> = Vec::with_capacity(face_element.len());
    for face in face_element {
        let indices = get_list_property(face, "vertex_indices")
            .or_else(|| get_list_property(face, "vertex_index"))
            .ok_or_else(|| load_error(path, "face missing vertex_indices property"))?;

        if indices.len() >= 3 {
            for i in 1..indices.len() - 1 {
                faces.push([indices[0], indices[i], indices[i + 1]]);
            }
        }
    }

    if faces.is_empty() {
        return Err(load_error(path, "PLY file contains no faces"));
    }

    let mut mesh = build_from_triangles(&vertices, &faces)?;
    if let Some(ns) = normals.filter(|ns| !ns.is_empty()) {
        mesh.set_normals(ns)?;
    }
    if let Some(ts) = uvs.filter(|ts| !ts.is_empty()) {
        mesh.set_uvs(UVMap::per_vertex(ts, &faces))?;
    }
    Ok(mesh)
}

fn get_float_property(element: &DefaultElement, name: &str) -> Option<f64> {
    match element.get(name)? {
        Property::Float(v) => Some(*v as f64),
        Property::Double(v) => Some(*v),
        Property::Int(v) => Some(*v as f64),
        Property::UInt(v) => Some(*v as f64),
        Property::Short(v) => Some(*v as f64),
        Property::UShort(v) => Some(*v as f64),
        Property::Char(v) => Some(*v as f64),
        Property::UChar(v) => Some(*v as f64),
        _ => None,
    }
}

fn get_list_property(element: &DefaultElement, name: &str) -> Option<Vec<usize>> {
    match element.get(name)? {
        Property::ListInt(v) => Some(v.iter().map(|&x| x as usize).collect()),
        Property::ListUInt(v) => Some(v.iter().map(|&x| x as usize).collect()),
        Property::ListShort(v) => Some(v.iter().map(|&x| x as usize).collect()),
        Property::ListUShort(v) => Some(v.iter().map(|&x| x as usize).collect()),
        Property::ListChar(v) => Some(v.iter().map(|&x| x as usize).collect()),
        Property::ListUChar(v) => Some(v.iter().map(|&x| x as usize).collect()),
        _ => None,
    }
}

/// Save a mesh to an ASCII PLY file.
///
/// Normals are written as `nx ny nz` and per-vertex UVs as `s t`.
pub fn save<P: AsRef<Path>>(mesh: &Mesh, path: P) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    let uvs = match mesh.uvs() {
        Some(uvs) if uvs.is_per_vertex(mesh.faces()) && uvs.len() == mesh.num_vertices() => {
            Some(uvs.coords())
        }
        Some(_) => {
            warn!("{}: PLY cannot store seamed UVs, dropping them", path.display());
            None
        }
        None => None,
    };

    write_ply(mesh, uvs, &mut writer).map_err(|e| save_error(path, e))?;
    writer.flush().map_err(|e| save_error(path, e))?;
    Ok(())
}

fn write_ply<W: Write>(mesh: &Mesh, uvs: Option<&[Point2<f64>]>, w: &mut W) -> std::io::Result<()> {
    let normals = mesh.normals();

    writeln!(w, "ply")?;
    writeln!(w, "format ascii 1.0")?;
    writeln!(w, "comment Generated by unfurl")?;
    writeln!(w, "element vertex {}", mesh.num_vertices())?;
    for axis in ["x", "y", "z"] {
        writeln!(w, "property double {}", axis)?;
    }
    if normals.is_some() {
        for axis in ["nx", "ny", "nz"] {
            writeln!(w, "property double {}", axis)?;
        }
    }
    if uvs.is_some() {
        writeln!(w, "property double s")?;
        writeln!(w, "property double t")?;
    }
    writeln!(w, "element face {}", mesh.num_faces())?;
    writeln!(w, "property list uchar int vertex_indices")?;
    writeln!(w, "end_header")?;

    for (i, p) in mesh.positions().iter().enumerate() {
        write!(w, "{} {} {}", p.x, p.y, p.z)?;
        if let Some(ns) = normals {
            write!(w, " {} {} {}", ns[i].x, ns[i].y, ns[i].z)?;
        }
        if let Some(ts) = uvs {
            write!(w, " {} {}", ts[i].x, ts[i].y)?;
        }
        writeln!(w)?;
    }

    for f in mesh.faces() {
        writeln!(w, "3 {} {} {}", f[0], f[1], f[2])?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::primitives::cylinder;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_reads_normals_and_uvs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tri.ply");
        fs::write(
            &path,
            "ply\nformat ascii 1.0\nelement vertex 4\n\
             property float x\nproperty float y\nproperty float z\n\
             property float nx\nproperty float ny\nproperty float nz\n\
             property float u\nproperty float v\n\
             element face 1\nproperty list uchar int vertex_indices\nend_header\n\
             0 0 0 0 0 1 0 0\n1 0 0 0 0 1 1 0\n1 1 0 0 0 1 1 1\n0 1 0 0 0 1 0 1\n\
             4 0 1 2 3\n",
        )
        .unwrap();

        let mesh = load(&path).unwrap();
        assert_eq!(mesh.num_faces(), 2);
        assert_eq!(mesh.normals().unwrap()[2], Vector3::z());
        let uvs = mesh.uvs().unwrap();
        assert!(uvs.is_per_vertex(mesh.faces()));
        assert_eq!(uvs.coords()[2], Point2::new(1.0, 1.0));
    }

    #[test]
    fn test_seamed_uvs_are_dropped() {
        let mesh = cylinder(1.0, 2.0, 8, 2, false).unwrap();
        assert!(!mesh.uvs().unwrap().is_per_vertex(mesh.faces()));

        let dir = tempdir().unwrap();
        let path = dir.path().join("cyl.ply");
        save(&mesh, &path).unwrap();
        let back = load(&path).unwrap();
        assert!(back.uvs().is_none());
        assert_eq!(back.positions(), mesh.positions());
    }

    #[test]
    fn test_per_vertex_uvs_round_trip() {
        let mut mesh = cylinder(1.0, 2.0, 8, 2, false).unwrap();
        let coords: Vec<_> = mesh.positions().iter().map(|p| Point2::new(p.x, p.z)).collect();
        let faces = mesh.faces().to_vec();
        mesh.set_uvs(UVMap::per_vertex(coords, &faces)).unwrap();

        let dir = tempdir().unwrap();
        let path = dir.path().join("cyl.ply");
        save(&mesh, &path).unwrap();
        let back = load(&path).unwrap();
        assert_eq!(back.uvs().unwrap().coords(), mesh.uvs().unwrap().coords());
    }
}
