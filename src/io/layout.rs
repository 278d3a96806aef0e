//! SVG drawings of UV layouts.
//!
//! The drawing maps the unit UV square onto a `size` × `size` canvas with
//! `v` pointing up, the same way textures are sampled.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use super::save_error;
use crate::error::Result;
use crate::mesh::UVMap;

/// Default canvas size in pixels.
pub const DEFAULT_SIZE: u32 = 1024;

/// Render the UV wireframe as an SVG document.
///
/// Edges shared by two faces are drawn once.
pub fn render(uvs: &UVMap, size: u32) -> String {
    let s = size as f64;
    let mut edges = BTreeSet::new();
    for face in uvs.faces() {
        for k in 0..3 {
            let (a, b) = (face[k], face[(k + 1) % 3]);
            edges.insert((a.min(b), a.max(b)));
        }
    }

    let coords = uvs.coords();
    let mut svg = String::with_capacity(128 + edges.len() * 64);
    svg.push_str(&format!(
        concat!(
            "<svg xmlns=\"http://www.w3.org/2000/svg\" ",
            "width=\"{s}\" height=\"{s}\" viewBox=\"0 0 {s} {s}\">\n"
        ),
        s = size
    ));
    svg.push_str(&format!(
        concat!(
            "<rect width=\"{s}\" height=\"{s}\" fill=\"white\"/>\n",
            "<g stroke=\"black\" stroke-width=\"0.5\" fill=\"none\">\n"
        ),
        s = size
    ));
    for (a, b) in edges {
        let (p, q) = (coords[a], coords[b]);
        svg.push_str(&format!(
            "<line x1=\"{:.3}\" y1=\"{:.3}\" x2=\"{:.3}\" y2=\"{:.3}\"/>\n",
            p.x * s,
            (1.0 - p.y) * s,
            q.x * s,
            (1.0 - q.y) * s
        ));
    }
    svg.push_str("</g>\n</svg>\n");
    svg
}

/// Write the UV wireframe to an SVG file.
pub fn save<P: AsRef<Path>>(uvs: &UVMap, path: P, size: u32) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    writer
        .write_all(render(uvs, size).as_bytes())
        .and_then(|_| writer.flush())
        .map_err(|e| save_error(path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point2;

    #[test]
    fn test_shared_edges_drawn_once() {
        let coords = vec![
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(1.0, 1.0),
            Point2::new(0.0, 1.0),
        ];
        let uvs = UVMap::new(coords, vec![[0, 1, 2], [0, 2, 3]]).unwrap();
        let svg = render(&uvs, 100);

        assert!(svg.starts_with("<svg"));
        assert_eq!(svg.matches("<line").count(), 5);
        // v = 0 sits at the bottom of the canvas
        assert!(svg.contains("x1=\"0.000\" y1=\"100.000\" x2=\"100.000\" y2=\"100.000\""));
    }
}
