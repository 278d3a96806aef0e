//! Seam coordinate lists.
//!
//! A seam file is plain text:
//!
//! ```text
//! # index x y z
//! # angle 1.308996938995747
//! 412 0.2588 0.9659 -4.75
//! 448 0.2588 0.9659 -4.5
//! ```
//!
//! Each data line is a mesh vertex index (`-1` when the point has none)
//! followed by the point's coordinates. Lines starting with `#` are
//! comments; an `# angle` comment carries the seam's angular position in
//! radians.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use nalgebra::Point3;

use super::{load_error, save_error};
use crate::algo::Seam;
use crate::error::Result;

/// A seam read back from a file.
#[derive(Debug, Clone, PartialEq)]
pub struct SeamRecord {
    /// Points from bottom to top.
    pub points: Vec<Point3<f64>>,
    /// Vertex index behind each point, if recorded.
    pub vertices: Vec<Option<usize>>,
    /// Angular position in radians, if recorded.
    pub angle: Option<f64>,
}

/// Write a seam to a text file.
pub fn save<P: AsRef<Path>>(seam: &Seam, path: P) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    write_seam(seam, &mut writer).map_err(|e| save_error(path, e))?;
    writer.flush().map_err(|e| save_error(path, e))?;
    Ok(())
}

fn write_seam<W: Write>(seam: &Seam, w: &mut W) -> std::io::Result<()> {
    writeln!(w, "# index x y z")?;
    writeln!(w, "# angle {}", seam.angle)?;
    for (p, v) in seam.points.iter().zip(&seam.vertices) {
        writeln!(w, "{} {} {} {}", v, p.x, p.y, p.z)?;
    }
    Ok(())
}

/// Read a seam file.
pub fn load<P: AsRef<Path>>(path: P) -> Result<SeamRecord> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)?;
    parse(&text).map_err(|(line, message)| load_error(path, format!("line {}: {}", line, message)))
}

fn parse(text: &str) -> std::result::Result<SeamRecord, (usize, String)> {
    let mut record = SeamRecord {
        points: Vec::new(),
        vertices: Vec::new(),
        angle: None,
    };

    for (n, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(comment) = line.strip_prefix('#') {
            if let Some(angle) = comment.trim().strip_prefix("angle") {
                let angle = angle
                    .trim()
                    .parse::<f64>()
                    .map_err(|e| (n + 1, format!("bad angle: {}", e)))?;
                record.angle = Some(angle);
            }
            continue;
        }

        let fields: Vec<&str> = line.split_whitespace().collect();
        let (index, coords) = match fields.as_slice() {
            [i, x, y, z] => (Some(*i), [*x, *y, *z]),
            [x, y, z] => (None, [*x, *y, *z]),
            _ => return Err((n + 1, format!("expected 3 or 4 fields, found {}", fields.len()))),
        };

        let mut xyz = [0.0; 3];
        for (slot, field) in xyz.iter_mut().zip(coords) {
            *slot = field
                .parse::<f64>()
                .map_err(|e| (n + 1, format!("bad coordinate '{}': {}", field, e)))?;
        }
        let vertex = match index {
            Some(i) => {
                let i = i
                    .parse::<i64>()
                    .map_err(|e| (n + 1, format!("bad index '{}': {}", i, e)))?;
                usize::try_from(i).ok()
            }
            None => None,
        };

        record.points.push(Point3::new(xyz[0], xyz[1], xyz[2]));
        record.vertices.push(vertex);
    }

    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UnfurlError;
    use tempfile::tempdir;

    fn sample() -> Seam {
        Seam {
            points: vec![Point3::new(1.0, 0.0, -1.0), Point3::new(0.5, 0.25, 1.0)],
            vertices: vec![7, 19],
            angle: 0.1,
            score: 0.0,
            candidate: 0,
        }
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("s_seam.txt");
        save(&sample(), &path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("# index x y z\n"));

        let record = load(&path).unwrap();
        assert_eq!(record.points, sample().points);
        assert_eq!(record.vertices, vec![Some(7), Some(19)]);
        assert_eq!(record.angle, Some(0.1));
    }

    #[test]
    fn test_missing_index_and_comments() {
        let record = parse("# hand written\n-1 0 0 0\n\n1 2 3\n").unwrap();
        assert_eq!(record.vertices, vec![None, None]);
        assert_eq!(record.points[1], Point3::new(1.0, 2.0, 3.0));
        assert_eq!(record.angle, None);
    }

    #[test]
    fn test_malformed_line_reports_position() {
        assert_eq!(parse("# index x y z\n1 2\n").unwrap_err().0, 2);

        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.txt");
        fs::write(&path, "0 a b c\n").unwrap();
        assert!(matches!(load(&path), Err(UnfurlError::LoadError { .. })));
    }
}
