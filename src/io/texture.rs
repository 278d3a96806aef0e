//! Texture images.

use std::path::{Path, PathBuf};

use image::{ImageFormat, RgbaImage};

use super::{load_error, save_error};
use crate::error::Result;

/// Extensions tried, in order, when looking for a texture next to a mesh.
pub const TEXTURE_EXTENSIONS: [&str; 3] = ["jpg", "png", "jpeg"];

/// Load an image as 8-bit RGBA.
pub fn load<P: AsRef<Path>>(path: P) -> Result<RgbaImage> {
    let path = path.as_ref();
    let image = image::open(path).map_err(|e| load_error(path, e))?;
    Ok(image.to_rgba8())
}

/// Save an image, choosing the encoding by extension.
pub fn save<P: AsRef<Path>>(image: &RgbaImage, path: P) -> Result<()> {
    let path = path.as_ref();
    let format = ImageFormat::from_path(path).map_err(|e| save_error(path, e))?;
    // JPEG has no alpha channel
    let result = if format == ImageFormat::Jpeg {
        image::DynamicImage::ImageRgba8(image.clone())
            .to_rgb8()
            .save_with_format(path, format)
    } else {
        image.save_with_format(path, format)
    };
    result.map_err(|e| save_error(path, e))
}

/// Find a texture with the mesh's file stem in the mesh's directory.
///
/// `bottle.obj` matches `bottle.jpg`, then `bottle.png`, then
/// `bottle.jpeg`.
pub fn find_beside<P: AsRef<Path>>(mesh_path: P) -> Option<PathBuf> {
    let mesh_path = mesh_path.as_ref();
    TEXTURE_EXTENSIONS
        .iter()
        .map(|ext| mesh_path.with_extension(ext))
        .find(|candidate| candidate.is_file())
}
