//! Texture transfer between two UV layouts of the same mesh.
//!
//! For each output texel, find the face whose triangle in the new layout
//! contains the texel center, express the center in barycentric coordinates
//! of that triangle, apply the same coordinates to the face's triangle in
//! the old layout, and sample the original image there bilinearly.
//!
//! Conventions:
//! - UV `(0, 0)` is the bottom-left corner of an image, so `v` is flipped
//!   when converting to pixel rows.
//! - Texel `(x, y)` is sampled at its center `(x + 0.5, y + 0.5)`.
//! - Bilinear sampling clamps to the image edge.
//! - Texels not covered by any face get [`ResampleOptions::background`]
//!   (transparent black by default).
//! - When several faces cover a texel, the one with the lowest index wins.
//!
//! Rows are processed independently and written back in row order, so the
//! output does not depend on whether rows run in parallel.

use image::{ImageBuffer, Rgba, RgbaImage};
use log::{debug, warn};
use nalgebra::Point2;

use super::partition::map_ranges;
use crate::error::{MappingIncomplete, Result, UnfurlError};
use crate::mesh::{FaceId, UVMap};

/// Rows per work range.
const ROW_CHUNK: usize = 16;

/// Barycentric slack for texels on a shared edge.
const INSIDE_EPS: f64 = 1e-9;

/// Options for texture resampling.
#[derive(Debug, Clone)]
pub struct ResampleOptions {
    /// Output width; defaults to the source width times `scale`.
    pub width: Option<u32>,

    /// Output height; defaults to the source height times `scale`.
    pub height: Option<u32>,

    /// Size factor applied to the source dimensions (default: 1.0).
    pub scale: f64,

    /// Value of texels no face covers.
    pub background: Rgba<u8>,

    /// Uncovered fraction above which a [`MappingIncomplete`] warning is
    /// raised (default: 0.05).
    pub max_uncovered_fraction: f64,

    /// Whether to use parallel execution (default: true).
    pub parallel: bool,
}

impl Default for ResampleOptions {
    fn default() -> Self {
        Self {
            width: None,
            height: None,
            scale: 1.0,
            background: Rgba([0, 0, 0, 0]),
            max_uncovered_fraction: 0.05,
            parallel: true,
        }
    }
}

impl ResampleOptions {
    /// Set an explicit output size.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    /// Set the scale factor.
    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    /// Set the background value.
    pub fn with_background(mut self, background: Rgba<u8>) -> Self {
        self.background = background;
        self
    }

    /// Set the warning threshold.
    pub fn with_max_uncovered_fraction(mut self, fraction: f64) -> Self {
        self.max_uncovered_fraction = fraction;
        self
    }

    /// Set whether to use parallel execution.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Output size for a source image of the given size.
    fn output_size(&self, src_width: u32, src_height: u32) -> Result<(u32, u32)> {
        if !(self.scale > 0.0 && self.scale.is_finite()) {
            return Err(UnfurlError::invalid_param("scale", self.scale, "must be positive"));
        }
        let scaled = |n: u32| ((n as f64 * self.scale).round() as u32).max(1);
        let width = self.width.unwrap_or_else(|| scaled(src_width));
        let height = self.height.unwrap_or_else(|| scaled(src_height));
        if width == 0 || height == 0 {
            return Err(UnfurlError::invalid_param(
                "size",
                format!("{}x{}", width, height),
                "must be positive",
            ));
        }
        Ok((width, height))
    }
}

/// A resampled texture.
#[derive(Debug, Clone)]
pub struct Resampled {
    /// The new image.
    pub image: RgbaImage,
    /// Fraction of texels covered by some face.
    pub coverage: f64,
    /// Set when too many texels were left uncovered.
    pub warning: Option<MappingIncomplete>,
}

/// A face's new-layout triangle in pixel space, with its old UVs.
struct Target {
    p: [Point2<f64>; 3],
    old: [Point2<f64>; 3],
    x_min: f64,
    x_max: f64,
    /// Twice the signed area.
    det: f64,
}

impl Target {
    /// Barycentric coordinates of `q`, if `q` is inside (with slack).
    fn barycentric(&self, q: Point2<f64>) -> Option<[f64; 3]> {
        let [a, b, c] = self.p;
        let l1 = (q - a).perp(&(c - a)) / self.det;
        let l2 = ((b - a).perp(&(q - a))) / self.det;
        let l0 = 1.0 - l1 - l2;
        if l0 < -INSIDE_EPS || l1 < -INSIDE_EPS || l2 < -INSIDE_EPS {
            return None;
        }
        // Clamp edge noise and renormalize
        let l = [l0.max(0.0), l1.max(0.0), l2.max(0.0)];
        let sum = l[0] + l[1] + l[2];
        Some([l[0] / sum, l[1] / sum, l[2] / sum])
    }
}

/// Resample `source`, laid out by `old`, onto the layout `new`.
///
/// `old` and `new` must describe the same faces in the same order.
///
/// # Errors
///
/// [`UnfurlError::FaceCountMismatch`] if the layouts have different face
/// counts, [`UnfurlError::InvalidParameter`] for an empty source image or
/// invalid options.
///
/// # Example
///
/// ```
/// use image::{Rgba, RgbaImage};
/// use nalgebra::Point2;
/// use unfurl::algo::resample::{resample_texture, ResampleOptions};
/// use unfurl::mesh::UVMap;
///
/// let square = UVMap::new(
///     vec![
///         Point2::new(0.0, 0.0),
///         Point2::new(1.0, 0.0),
///         Point2::new(1.0, 1.0),
///         Point2::new(0.0, 1.0),
///     ],
///     vec![[0, 1, 2], [0, 2, 3]],
/// )
/// .unwrap();
/// let source = RgbaImage::from_fn(8, 8, |x, y| Rgba([x as u8 * 30, y as u8 * 30, 0, 255]));
///
/// let out = resample_texture(&source, &square, &square, &ResampleOptions::default()).unwrap();
/// assert_eq!(out.image, source);
/// assert!(out.warning.is_none());
/// ```
pub fn resample_texture(
    source: &RgbaImage,
    old: &UVMap,
    new: &UVMap,
    options: &ResampleOptions,
) -> Result<Resampled> {
    if old.num_faces() != new.num_faces() {
        return Err(UnfurlError::FaceCountMismatch {
            old: old.num_faces(),
            new: new.num_faces(),
        });
    }
    let (src_w, src_h) = source.dimensions();
    if src_w == 0 || src_h == 0 {
        return Err(UnfurlError::invalid_param(
            "source",
            format!("{}x{}", src_w, src_h),
            "image is empty",
        ));
    }
    let (width, height) = options.output_size(src_w, src_h)?;

    let targets = pixel_targets(old, new, width, height);
    let rows = row_buckets(&targets, height);

    let sampled = map_ranges(height as usize, ROW_CHUNK, options.parallel, |range| {
        let mut pixels = Vec::with_capacity(range.len() * width as usize * 4);
        let mut covered = 0usize;
        for y in range {
            let cy = y as f64 + 0.5;
            for x in 0..width {
                let cx = x as f64 + 0.5;
                let hit = rows[y].iter().find_map(|&t| {
                    let target = &targets[t];
                    if cx < target.x_min || cx > target.x_max {
                        return None;
                    }
                    target
                        .barycentric(Point2::new(cx, cy))
                        .map(|l| (target, l))
                });
                let px = match hit {
                    Some((target, l)) => {
                        covered += 1;
                        let uv = Point2::from(
                            target.old[0].coords * l[0]
                                + target.old[1].coords * l[1]
                                + target.old[2].coords * l[2],
                        );
                        sample_bilinear(source, uv)
                    }
                    None => options.background,
                };
                pixels.extend_from_slice(&px.0);
            }
        }
        (pixels, covered)
    });

    let mut buffer = Vec::with_capacity(width as usize * height as usize * 4);
    let mut covered = 0usize;
    for (pixels, c) in sampled {
        buffer.extend_from_slice(&pixels);
        covered += c;
    }
    let image: RgbaImage = ImageBuffer::from_raw(width, height, buffer).ok_or_else(|| {
        UnfurlError::invalid_param("size", format!("{}x{}", width, height), "buffer mismatch")
    })?;

    let total = width as f64 * height as f64;
    let coverage = covered as f64 / total;
    let uncovered = 1.0 - coverage;
    let warning = (uncovered > options.max_uncovered_fraction).then(|| MappingIncomplete {
        uncovered_fraction: uncovered,
        threshold: options.max_uncovered_fraction,
    });
    if let Some(w) = &warning {
        warn!("{}", w);
    }
    debug!(
        "resampled {}x{} -> {}x{}, {} faces, coverage {:.4}",
        src_w,
        src_h,
        width,
        height,
        targets.len(),
        coverage
    );

    Ok(Resampled {
        image,
        coverage,
        warning,
    })
}

/// Pixel-space triangles of the new layout; degenerate ones are dropped.
fn pixel_targets(old: &UVMap, new: &UVMap, width: u32, height: u32) -> Vec<Target> {
    let (w, h) = (width as f64, height as f64);
    (0..new.num_faces())
        .filter_map(|fi| {
            let f = FaceId::new(fi);
            let p = new
                .corner_uvs(f)
                .map(|uv| Point2::new(uv.x * w, (1.0 - uv.y) * h));
            let det = (p[1] - p[0]).perp(&(p[2] - p[0]));
            if det.abs() < 1e-12 || !det.is_finite() {
                return None;
            }
            Some(Target {
                p,
                old: old.corner_uvs(f),
                x_min: p.iter().map(|q| q.x).fold(f64::INFINITY, f64::min),
                x_max: p.iter().map(|q| q.x).fold(f64::NEG_INFINITY, f64::max),
                det,
            })
        })
        .collect()
}

/// For each output row, the targets whose vertical extent reaches the row's
/// texel centers, in face order.
fn row_buckets(targets: &[Target], height: u32) -> Vec<Vec<usize>> {
    let mut rows = vec![Vec::new(); height as usize];
    for (t, target) in targets.iter().enumerate() {
        let y_min = target.p.iter().map(|q| q.y).fold(f64::INFINITY, f64::min);
        let y_max = target.p.iter().map(|q| q.y).fold(f64::NEG_INFINITY, f64::max);
        // Rows whose center y + 0.5 lies in [y_min, y_max]
        let first = (y_min - 0.5).ceil().max(0.0);
        let last = (y_max - 0.5).floor().min(height as f64 - 1.0);
        if first > last {
            continue;
        }
        for y in first as usize..=last as usize {
            rows[y].push(t);
        }
    }
    rows
}

/// Bilinear sample at texture coordinate `uv`, clamped to the edge.
fn sample_bilinear(image: &RgbaImage, uv: Point2<f64>) -> Rgba<u8> {
    let (w, h) = image.dimensions();
    let sx = uv.x * w as f64 - 0.5;
    let sy = (1.0 - uv.y) * h as f64 - 0.5;

    let x0 = sx.floor();
    let y0 = sy.floor();
    let fx = sx - x0;
    let fy = sy - y0;

    let clamp_x = |x: f64| x.clamp(0.0, (w - 1) as f64) as u32;
    let clamp_y = |y: f64| y.clamp(0.0, (h - 1) as f64) as u32;
    let (xa, xb) = (clamp_x(x0), clamp_x(x0 + 1.0));
    let (ya, yb) = (clamp_y(y0), clamp_y(y0 + 1.0));

    let p00 = image.get_pixel(xa, ya).0;
    let p10 = image.get_pixel(xb, ya).0;
    let p01 = image.get_pixel(xa, yb).0;
    let p11 = image.get_pixel(xb, yb).0;

    let mut out = [0u8; 4];
    for c in 0..4 {
        let top = p00[c] as f64 * (1.0 - fx) + p10[c] as f64 * fx;
        let bottom = p01[c] as f64 * (1.0 - fx) + p11[c] as f64 * fx;
        out[c] = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    Rgba(out)
}
