//! File I/O.
//!
//! Meshes are loaded and saved by extension:
//!
//! | Format | Extension | Load | Save | Notes |
//! |--------|-----------|------|------|-------|
//! | Wavefront OBJ | `.obj` | ✓ | ✓ | Normals and face-corner UVs |
//! | PLY | `.ply` | ✓ | ✓ | Optional normals and per-vertex UVs |
//! | STL | `.stl` | ✓ | ✓ | Positions only |
//!
//! Besides meshes, this module reads and writes the pipeline's other
//! artifacts: seam coordinate lists ([`seam`]), SVG layout drawings
//! ([`layout`]) and texture images ([`texture`]).
//!
//! ```no_run
//! use unfurl::io::{load, save};
//! use unfurl::mesh::Mesh;
//!
//! let mesh: Mesh = load("bottle.obj").unwrap();
//! save(&mesh, "bottle.ply").unwrap();
//! ```

pub mod layout;
pub mod obj;
pub mod ply;
pub mod seam;
pub mod stl;
pub mod texture;

use std::path::Path;

use crate::error::{Result, UnfurlError};
use crate::mesh::Mesh;

/// Supported mesh file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Wavefront OBJ format.
    Obj,
    /// STL (stereolithography) format.
    Stl,
    /// PLY (Stanford polygon) format.
    Ply,
}

impl Format {
    /// Detect format from file extension.
    pub fn from_extension(ext: &str) -> Option<Format> {
        match ext.to_lowercase().as_str() {
            "obj" => Some(Format::Obj),
            "stl" => Some(Format::Stl),
            "ply" => Some(Format::Ply),
            _ => None,
        }
    }

    /// Detect format from file path.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Option<Format> {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(Format::from_extension)
    }

    fn detect(path: &Path) -> Result<Format> {
        Format::from_path(path).ok_or_else(|| UnfurlError::UnsupportedFormat {
            extension: path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("(none)")
                .to_string(),
        })
    }
}

/// Load a mesh, choosing the format by extension.
pub fn load<P: AsRef<Path>>(path: P) -> Result<Mesh> {
    let path = path.as_ref();
    match Format::detect(path)? {
        Format::Obj => obj::load(path),
        Format::Stl => stl::load(path),
        Format::Ply => ply::load(path),
    }
}

/// Save a mesh, choosing the format by extension.
///
/// Attributes the format cannot store are dropped with a warning.
pub fn save<P: AsRef<Path>>(mesh: &Mesh, path: P) -> Result<()> {
    let path = path.as_ref();
    match Format::detect(path)? {
        Format::Obj => obj::save(mesh, path),
        Format::Stl => stl::save(mesh, path),
        Format::Ply => ply::save(mesh, path),
    }
}

/// Wrap a writer error as a [`UnfurlError::SaveError`].
pub(crate) fn save_error(path: &Path, e: impl std::fmt::Display) -> UnfurlError {
    UnfurlError::SaveError {
        path: path.to_path_buf(),
        message: e.to_string(),
    }
}

/// Wrap a parser error as a [`UnfurlError::LoadError`].
pub(crate) fn load_error(path: &Path, e: impl std::fmt::Display) -> UnfurlError {
    UnfurlError::LoadError {
        path: path.to_path_buf(),
        message: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::primitives::cylinder;
    use tempfile::tempdir;

    #[test]
    fn test_format_detection() {
        assert_eq!(Format::from_path("a/b.OBJ"), Some(Format::Obj));
        assert_eq!(Format::from_path("mesh.ply"), Some(Format::Ply));
        assert_eq!(Format::from_path("mesh.stl"), Some(Format::Stl));
        assert_eq!(Format::from_path("mesh.gltf"), None);
        assert_eq!(Format::from_path("mesh"), None);
    }

    #[test]
    fn test_unsupported_extension() {
        let mesh = cylinder(1.0, 1.0, 8, 1, false).unwrap();
        let dir = tempdir().unwrap();
        let err = save(&mesh, dir.path().join("mesh.fbx")).unwrap_err();
        assert!(matches!(err, UnfurlError::UnsupportedFormat { extension } if extension == "fbx"));
    }

    #[test]
    fn test_dispatch_keeps_topology() {
        let mesh = cylinder(1.0, 2.0, 12, 3, true).unwrap();
        let dir = tempdir().unwrap();
        for name in ["m.obj", "m.ply", "m.stl"] {
            let path = dir.path().join(name);
            save(&mesh, &path).unwrap();
            let back = load(&path).unwrap();
            assert_eq!(back.num_vertices(), mesh.num_vertices(), "{}", name);
            assert_eq!(back.num_faces(), mesh.num_faces(), "{}", name);
        }
    }
}
